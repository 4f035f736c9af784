//! Contract tests between the HTTP adapters and the core pipeline types.

use serde_json::{json, Value};
use vetting_adapters::exa::parse_search_response;
use vetting_adapters::openai::{build_chat_body, parse_chat_response};
use vetting_adapters::{require_env, OpenAiGeneration};
use vetting_core::{
    ChatMessage, Dimension, GenerationReply, GenerationRequest, QualificationScoreCard, StageKind,
};

/// Walk a JSON Schema and assert every object is closed and fully required,
/// which OpenAI strict structured output demands.
fn assert_strict(schema: &Value, path: &str) {
    if schema["type"] == "object" {
        assert_eq!(
            schema["additionalProperties"],
            json!(false),
            "{path} must set additionalProperties: false"
        );
        let properties = schema["properties"].as_object().expect("properties");
        let required: Vec<&str> = schema["required"]
            .as_array()
            .expect("required")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        for (name, child) in properties {
            assert!(required.contains(&name.as_str()), "{path}.{name} not required");
            assert_strict(child, &format!("{path}.{name}"));
        }
    }
}

fn evaluate_request() -> GenerationRequest {
    GenerationRequest {
        stage: StageKind::Evaluate,
        model: "gpt-4o".to_string(),
        temperature: 0.7,
        system: "You are a Speaker Qualification Specialist.".to_string(),
        messages: vec![ChatMessage::User {
            content: "Evaluate Jane Doe".to_string(),
        }],
        tools: vec![],
        output_schema: Some(QualificationScoreCard::json_schema()),
    }
}

#[test]
fn test_scorecard_schema_is_strict_compatible() {
    let body = build_chat_body(&evaluate_request());
    let schema = &body["response_format"]["json_schema"]["schema"];
    assert_strict(schema, "$");
    for dimension in Dimension::ALL {
        let fields = &schema["properties"][dimension.key()]["properties"];
        assert_eq!(fields["score"]["type"], "integer");
        assert!(fields["reasoning"].get("minLength").is_none());
        assert!(fields["score"].get("maximum").is_none());
    }
}

#[test]
fn test_structured_reply_validates_as_scorecard() {
    let content = json!({
        "technical_expertise": {"score": 8, "reasoning": "Maintains pipeline-kit."},
        "speaking_experience": {"score": 6, "reasoning": "Two meetup talks."},
        "industry_impact": {"score": 7, "reasoning": "Feature store used at Acme."},
        "overall_recommendation": {"score": 7, "reasoning": "Accept."}
    })
    .to_string();
    let body = json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
    .to_string();

    let GenerationReply::Text { content } = parse_chat_response(&body).unwrap() else {
        panic!("expected a text reply");
    };
    let scorecard = QualificationScoreCard::from_json_str(&content).unwrap();
    assert_eq!(scorecard.total(), 28);
}

#[test]
fn test_exa_snippets_serialize_like_search_tool_output() {
    let body = r#"{"results":[{"url":"https://a.example","title":"Talk","text":"Jane"}]}"#;
    let snippets = parse_search_response(body).unwrap();
    let value = serde_json::to_value(&snippets).unwrap();
    assert_eq!(value[0]["url"], "https://a.example");
    assert_eq!(value[0]["title"], "Talk");
}

#[test]
fn test_missing_secret_is_reported_by_name() {
    let err = require_env("SPEAKER_VET_TEST_UNSET_SECRET").unwrap_err();
    assert!(err.to_string().contains("SPEAKER_VET_TEST_UNSET_SECRET"));
}

#[test]
fn test_client_debug_hides_key() {
    let client = OpenAiGeneration::new("sk-secret".to_string())
        .unwrap()
        .with_base_url("http://localhost:8080/v1/");
    let debug = format!("{client:?}");
    assert!(debug.contains("http://localhost:8080/v1"));
    assert!(!debug.contains("sk-secret"));
}
