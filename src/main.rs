use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use notes_ai::db::DbConfig;
use notes_ai::llm::config::LlmConfig;
use notes_ai::telemetry::TelemetryError;
use notes_ai::{
    GenerationError, GenerationRequest, GenerationService, PgTelemetrySink, ResponseSchema, SamplingParameters,
    TelemetryLogger,
};

/// Upper bound on waiting for detached telemetry writes before exit.
const TELEMETRY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("telemetry database init failed: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("could not read schema file {path}: {source}")]
    SchemaRead { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "notes-ai", about = "Run note generation requests against the configured LLM")]
struct Cli {
    /// Postgres URL for generation telemetry; telemetry is off when unset.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one generation request and print the result as JSON.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long)]
    system: String,

    #[arg(long)]
    user: String,

    /// `provider/model`; defaults to `LLM_MODEL`.
    #[arg(long)]
    model: Option<String>,

    /// Path to a JSON-Schema object the output must match.
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Name sent with the schema.
    #[arg(long, default_value = "response")]
    schema_name: String,

    #[arg(long)]
    temperature: Option<f64>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    user_id: Option<Uuid>,

    #[arg(long)]
    note_id: Option<Uuid>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "notes-ai failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<String, CliError> {
    let telemetry = match &cli.database_url {
        Some(url) => {
            let pool = notes_ai::db::init_pool(url, &DbConfig::from_env()).await?;
            TelemetryLogger::new(Arc::new(PgTelemetrySink::new(pool)))
        }
        None => TelemetryLogger::disabled(),
    };

    let config = LlmConfig::from_env()?;
    let service = GenerationService::from_config(&config, telemetry.clone())?;
    tracing::info!(model = service.default_model(), "LLM client initialized");

    match cli.command {
        Command::Generate(args) => {
            let request = build_request(args)?;
            let outcome = service.generate(&request).await;
            // Success and failure both leave a detached write behind.
            telemetry.drain(TELEMETRY_DRAIN_TIMEOUT).await;
            Ok(serde_json::to_string_pretty(&outcome?)?)
        }
    }
}

fn build_request(args: GenerateArgs) -> Result<GenerationRequest, CliError> {
    let mut request = GenerationRequest::new(args.system, args.user)
        .with_parameters(SamplingParameters {
            temperature: args.temperature,
            max_tokens: args.max_tokens,
            ..SamplingParameters::default()
        })
        .with_correlation(args.user_id, args.note_id);
    if let Some(model) = args.model {
        request = request.with_model(model);
    }
    if let Some(path) = args.schema {
        let raw = std::fs::read_to_string(&path).map_err(|source| CliError::SchemaRead { path, source })?;
        let schema = serde_json::from_str(&raw)?;
        request = request.with_schema(ResponseSchema::new(args.schema_name, schema));
    }
    Ok(request)
}
