//! Notes AI — resilient LLM generation client and request-rate governor.
//!
//! SYSTEM CONTEXT
//! ==============
//! The notes web layer calls [`rate_limit::RateLimiter::check`] with the
//! caller's address, then [`llm::GenerationService::generate`]. Everything
//! else (persistence of notes, auth, routing) lives outside this crate; the
//! only thing it writes is one telemetry row per generation.

pub mod db;
pub mod error;
pub mod llm;
pub mod rate_limit;
pub mod telemetry;

pub use error::{ErrorCode, ErrorKind, GenerationError};
pub use llm::{
    Completion, GenerationMetadata, GenerationRequest, GenerationResult, GenerationService, ResponseSchema,
    SamplingParameters,
};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter, client_key};
pub use telemetry::{PgTelemetrySink, TelemetryLogger, TelemetryRecord, TelemetrySink};
