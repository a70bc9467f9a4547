use super::*;
use serde_json::json;

#[test]
fn completion_deserializes_full_body() {
    let body = json!({
        "id": "gen-1",
        "model": "openai/gpt-4o-mini",
        "choices": [{
            "message": { "role": "assistant", "content": "Hello!" },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    });
    let completion: ChatCompletion = serde_json::from_value(body).unwrap();
    assert_eq!(completion.id, "gen-1");
    assert_eq!(completion.choices.len(), 1);
    assert_eq!(completion.choices[0].message.content.as_deref(), Some("Hello!"));
    assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("stop"));
    assert_eq!(completion.usage.map(|u| u.total_tokens), Some(15));
}

#[test]
fn completion_tolerates_missing_optional_fields() {
    let body = json!({
        "choices": [{ "message": { "role": "assistant", "content": null } }]
    });
    let completion: ChatCompletion = serde_json::from_value(body).unwrap();
    assert_eq!(completion.model, "");
    assert_eq!(completion.choices[0].message.content, None);
    assert_eq!(completion.choices[0].finish_reason, None);
    assert!(completion.usage.is_none());
}

#[test]
fn request_builder_sets_fields() {
    let user = Uuid::new_v4();
    let req = GenerationRequest::new("sys", "usr")
        .with_model("openai/gpt-4o")
        .with_parameters(SamplingParameters { temperature: Some(0.2), ..SamplingParameters::default() })
        .with_correlation(Some(user), None);
    assert_eq!(req.system_message, "sys");
    assert_eq!(req.user_message, "usr");
    assert_eq!(req.model.as_deref(), Some("openai/gpt-4o"));
    assert_eq!(req.parameters.temperature, Some(0.2));
    assert_eq!(req.correlation.user_id, Some(user));
    assert!(req.response_schema.is_none());
}

#[test]
fn completion_serializes_untagged() {
    assert_eq!(serde_json::to_value(Completion::Text("hi".into())).unwrap(), json!("hi"));
    assert_eq!(serde_json::to_value(Completion::Structured(json!({ "a": 1 }))).unwrap(), json!({ "a": 1 }));
}
