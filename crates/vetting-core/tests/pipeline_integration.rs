//! Integration tests for the vetting pipeline with in-memory capabilities.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vetting_core::fakes::{
    DeterministicGeneration, FailingSearch, RecordingMessaging, ScriptedGeneration, StaticSearch,
};
use vetting_core::tooling::{FIND_USER_BY_NAME, SEND_MESSAGE};
use vetting_core::{
    ActionKind, Capabilities, CapabilityError, ChatMessage, CrewConfig, Dimension, FailureKind,
    GenerationCapability, GenerationReply, GenerationRequest, Pipeline, PipelineState,
    SearchSnippet, SpeakerProfile, StageKind,
};

fn snippets() -> Vec<SearchSnippet> {
    vec![
        SearchSnippet {
            title: "Jane Doe – Scaling ML Ops at Acme".to_string(),
            url: "https://conf.example.com/talks/jane-doe-mlops".to_string(),
            text: "Jane Doe presented Acme's feature store and model registry.".to_string(),
        },
        SearchSnippet {
            title: "jdoe/pipeline-kit".to_string(),
            url: "https://github.com/jdoe/pipeline-kit".to_string(),
            text: "Open-source ML pipeline toolkit, 2k stars.".to_string(),
        },
    ]
}

fn neutral_snippets() -> Vec<SearchSnippet> {
    vec![SearchSnippet {
        title: "Speaker directory".to_string(),
        url: "https://conf.example.com/speakers".to_string(),
        text: "Past speakers and their sessions.".to_string(),
    }]
}

fn config(recipient: &str) -> CrewConfig {
    let mut config = CrewConfig::default();
    config.delivery.recipient = recipient.to_string();
    config
}

fn alice() -> Arc<RecordingMessaging> {
    Arc::new(RecordingMessaging::new().with_user("alice", "U01ALICE"))
}

fn pipeline(
    config: CrewConfig,
    generation: Arc<dyn GenerationCapability>,
    search: Arc<StaticSearch>,
    messaging: Arc<RecordingMessaging>,
) -> Pipeline {
    Pipeline::from_config(
        config,
        Capabilities {
            search,
            generation,
            messaging,
        },
    )
    .expect("pipeline should build")
}

/// Deterministic model with one stage's reply replaced.
struct OverrideStage {
    inner: DeterministicGeneration,
    stage: StageKind,
    reply: GenerationReply,
}

#[async_trait]
impl GenerationCapability for OverrideStage {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationReply, CapabilityError> {
        if request.stage == self.stage {
            return Ok(self.reply.clone());
        }
        self.inner.generate(request).await
    }
}

/// Looks the recipient up, then sends a placeholder instead of the report.
struct PlaceholderSend {
    inner: DeterministicGeneration,
    text: &'static str,
}

#[async_trait]
impl GenerationCapability for PlaceholderSend {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationReply, CapabilityError> {
        if request.stage != StageKind::Deliver {
            return self.inner.generate(request).await;
        }
        let tool_results = request
            .messages
            .iter()
            .filter(|m| matches!(m, ChatMessage::ToolResult { .. }))
            .count();
        Ok(match tool_results {
            0 => GenerationReply::tool_call(
                "find-1",
                FIND_USER_BY_NAME,
                serde_json::json!({ "name": "alice" }),
            ),
            1 => GenerationReply::tool_call(
                "send-1",
                SEND_MESSAGE,
                serde_json::json!({ "recipient_id": "U01ALICE", "text": self.text }),
            ),
            _ => GenerationReply::text("Report sent to alice."),
        })
    }
}

/// Never answers within a reasonable time.
struct StalledGeneration;

#[async_trait]
impl GenerationCapability for StalledGeneration {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationReply, CapabilityError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(GenerationReply::text("too late"))
    }
}

/// Test: end-to-end run delivers a sealed all-sevens scorecard to alice
#[tokio::test]
async fn test_end_to_end_delivery() {
    let search = Arc::new(StaticSearch::new(snippets()));
    let messaging = alice();
    let pipeline = pipeline(
        config("alice"),
        Arc::new(DeterministicGeneration::new("alice", 7)),
        search.clone(),
        messaging.clone(),
    );

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(result.state, PipelineState::Delivered, "{:?}", result.failure);
    assert!(result.delivered());
    assert_eq!(
        result.transitions,
        vec![
            PipelineState::Pending,
            PipelineState::Researched,
            PipelineState::Evaluated,
            PipelineState::Delivered,
        ]
    );
    assert!(result.failure.is_none());

    let sealed = result.scorecard.as_ref().expect("scorecard attached");
    for dimension in Dimension::ALL {
        assert_eq!(sealed.scorecard().dimension(dimension).score(), 7);
    }

    let receipt = result.receipt.as_ref().expect("receipt attached");
    assert_eq!(receipt.recipient_name, "alice");
    assert_eq!(receipt.recipient_id, "U01ALICE");
    assert_eq!(receipt.scorecard_digest, sealed.digest());

    let sent = messaging.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_id, "U01ALICE");
    assert!(sent[0].text.contains("Jane Doe (ML Ops)"));
    assert!(sent[0].text.contains("Technical Expertise: 7/10"));
    assert!(sent[0].text.contains("Total: 28/40"));

    let queries = search.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("Jane Doe"));

    assert_eq!(result.stages.len(), 3);
    assert!(result.config_digest.is_some());
}

/// Test: messaging outage during send ends in DeliveryFailed, never Delivered
#[tokio::test]
async fn test_failing_send_is_delivery_failed() {
    let messaging = Arc::new(
        RecordingMessaging::new()
            .with_user("alice", "U01ALICE")
            .failing_sends(CapabilityError::Unavailable("503 from slack".to_string())),
    );
    let pipeline = pipeline(
        config("alice"),
        Arc::new(DeterministicGeneration::new("alice", 7)),
        Arc::new(StaticSearch::new(snippets())),
        messaging.clone(),
    );

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(result.state, PipelineState::DeliveryFailed);
    assert!(result.receipt.is_none());
    assert!(result.scorecard.is_some(), "scorecard kept as evidence");
    let failure = result.failure.expect("failure recorded");
    assert_eq!(failure.stage, Some(StageKind::Deliver));
    assert_eq!(failure.kind, FailureKind::ToolUnavailable);
    assert!(messaging.sent().is_empty());
}

/// Test: a rejected send the agent glosses over is caught by the guard
#[tokio::test]
async fn test_rejected_send_is_not_confirmed() {
    let messaging = Arc::new(
        RecordingMessaging::new()
            .with_user("alice", "U01ALICE")
            .failing_sends(CapabilityError::Rejected("not_in_channel".to_string())),
    );
    let pipeline = pipeline(
        config("alice"),
        Arc::new(DeterministicGeneration::new("alice", 7)),
        Arc::new(StaticSearch::new(snippets())),
        messaging,
    );

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(result.state, PipelineState::DeliveryFailed);
    let failure = result.failure.expect("failure recorded");
    assert_eq!(failure.kind, FailureKind::DeliveryNotConfirmed);
    assert!(failure.message.contains("not_in_channel"));
}

/// Test: a messenger that claims success without calling send_message fails
#[tokio::test]
async fn test_claimed_delivery_without_send() {
    let messaging = alice();
    let generation = OverrideStage {
        inner: DeterministicGeneration::new("alice", 7),
        stage: StageKind::Deliver,
        reply: GenerationReply::text("I have sent the report to alice."),
    };
    let pipeline = pipeline(
        config("alice"),
        Arc::new(generation),
        Arc::new(StaticSearch::new(snippets())),
        messaging.clone(),
    );

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(result.state, PipelineState::DeliveryFailed);
    let failure = result.failure.expect("failure recorded");
    assert_eq!(failure.kind, FailureKind::DeliveryNotConfirmed);
    assert!(failure.message.contains("no send_message action was recorded"));
    assert!(messaging.sent().is_empty());
}

/// Test: a message that is not the report is not a delivery, even if Slack
/// accepted it
#[tokio::test]
async fn test_send_without_report_is_not_delivered() {
    let messaging = alice();
    let generation = PlaceholderSend {
        inner: DeterministicGeneration::new("alice", 7),
        text: "Will send the report later",
    };
    let pipeline = pipeline(
        config("alice"),
        Arc::new(generation),
        Arc::new(StaticSearch::new(snippets())),
        messaging.clone(),
    );

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(messaging.sent().len(), 1);
    assert_eq!(result.state, PipelineState::DeliveryFailed);
    assert!(result.receipt.is_none());
    let failure = result.failure.expect("failure recorded");
    assert_eq!(failure.kind, FailureKind::DeliveryNotConfirmed);
    assert!(failure.message.contains("did not carry the report"));
}

/// Test: unknown recipient means nothing is sent and delivery is not confirmed
#[tokio::test]
async fn test_unknown_recipient() {
    let pipeline = pipeline(
        config("bob"),
        Arc::new(DeterministicGeneration::new("bob", 7)),
        Arc::new(StaticSearch::new(snippets())),
        alice(),
    );

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(result.state, PipelineState::DeliveryFailed);
    assert_eq!(
        result.failure.map(|f| f.kind),
        Some(FailureKind::DeliveryNotConfirmed)
    );
}

/// Test: repeated runs with deterministic stubs yield the same scorecard shape
#[tokio::test]
async fn test_repeated_runs_same_shape() {
    let pipeline = pipeline(
        config("alice"),
        Arc::new(DeterministicGeneration::new("alice", 6)),
        Arc::new(StaticSearch::new(snippets())),
        alice(),
    );
    let profile = SpeakerProfile::new("Jane Doe", "ML Ops");

    let first = pipeline.run(profile.clone()).await;
    let second = pipeline.run(profile).await;
    assert_ne!(first.run_id, second.run_id);

    let keys = |result: &vetting_core::PipelineResult| {
        let value = serde_json::to_value(result.scorecard.as_ref().unwrap().scorecard()).unwrap();
        let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    };
    assert_eq!(keys(&first), keys(&second));
    assert_eq!(keys(&first).len(), 4);
}

/// Test: concurrent runs never observe each other's research or scorecard
#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let messaging = alice();
    let pipeline = Arc::new(pipeline(
        config("alice"),
        Arc::new(DeterministicGeneration::new("alice", 8)),
        Arc::new(StaticSearch::new(neutral_snippets())),
        messaging.clone(),
    ));

    let results = pipeline
        .run_many(
            vec![
                SpeakerProfile::new("Jane Doe", "ML Ops"),
                SpeakerProfile::new("Raj Patel", "Vector Databases"),
            ],
            2,
        )
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].profile.name, "Jane Doe");
    assert_eq!(results[1].profile.name, "Raj Patel");

    for (result, own, other) in [
        (&results[0], "Jane Doe", "Raj Patel"),
        (&results[1], "Raj Patel", "Jane Doe"),
    ] {
        assert_eq!(result.state, PipelineState::Delivered, "{:?}", result.failure);
        let reasoning = result
            .scorecard
            .as_ref()
            .unwrap()
            .scorecard()
            .dimension(Dimension::TechnicalExpertise)
            .reasoning()
            .to_string();
        assert!(reasoning.contains(own));
        assert!(!reasoning.contains(other));

        let actions = serde_json::to_string(&result.actions).unwrap();
        assert!(actions.contains(own));
        assert!(!actions.contains(other));
    }
    assert_ne!(results[0].run_id, results[1].run_id);
    assert_eq!(messaging.sent().len(), 2);
}

/// Test: search outage degrades research but still yields a valid scorecard
#[tokio::test]
async fn test_search_failure_still_scores() {
    let generation = Arc::new(DeterministicGeneration::new("alice", 3));
    let pipeline = Pipeline::from_config(
        config("alice"),
        Capabilities {
            search: Arc::new(FailingSearch::new(CapabilityError::Unavailable(
                "exa timeout".to_string(),
            ))),
            generation,
            messaging: alice(),
        },
    )
    .unwrap();

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(result.state, PipelineState::Delivered, "{:?}", result.failure);
    let scorecard = result.scorecard.as_ref().unwrap().scorecard();
    assert_eq!(scorecard.iter().count(), 4);
    assert_eq!(scorecard.total(), 12);
    assert!(result.actions.iter().any(|e| e.stage == StageKind::Research
        && matches!(&e.kind, ActionKind::ToolFailed { tool_name } if tool_name == "web_search")));
}

/// Test: malformed evaluator output aborts before anything is sent
#[tokio::test]
async fn test_malformed_scorecard_aborts() {
    let messaging = alice();
    let generation = OverrideStage {
        inner: DeterministicGeneration::new("alice", 7),
        stage: StageKind::Evaluate,
        reply: GenerationReply::text(
            r#"{"technical_expertise": {"score": 11, "reasoning": "great"},
                "speaking_experience": {"score": 5, "reasoning": "ok"},
                "industry_impact": {"score": 5, "reasoning": "ok"},
                "overall_recommendation": {"score": 5, "reasoning": "ok"}}"#,
        ),
    };
    let pipeline = pipeline(
        config("alice"),
        Arc::new(generation),
        Arc::new(StaticSearch::new(snippets())),
        messaging.clone(),
    );

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(result.state, PipelineState::Aborted);
    assert_eq!(
        result.transitions,
        vec![
            PipelineState::Pending,
            PipelineState::Researched,
            PipelineState::Aborted,
        ]
    );
    let failure = result.failure.expect("failure recorded");
    assert_eq!(failure.stage, Some(StageKind::Evaluate));
    assert_eq!(failure.kind, FailureKind::SchemaViolation);
    assert!(result.scorecard.is_none());
    assert!(result.actions.iter().all(|e| e.stage != StageKind::Deliver));
    assert!(messaging.sent().is_empty());
}

/// Test: a researcher that never stops calling tools hits its iteration budget
#[tokio::test]
async fn test_iteration_budget_aborts() {
    let mut config = config("alice");
    config.agents.researcher.max_iter = 3;
    let generation = Arc::new(ScriptedGeneration::new().with_fallback(
        GenerationReply::tool_call("again", "web_search", serde_json::json!({"query": "more"})),
    ));
    let search = Arc::new(StaticSearch::new(snippets()));
    let pipeline = pipeline(config, generation.clone(), search.clone(), alice());

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(result.state, PipelineState::Aborted);
    let failure = result.failure.expect("failure recorded");
    assert_eq!(failure.kind, FailureKind::IterationBudgetExceeded);
    assert_eq!(failure.stage, Some(StageKind::Research));
    assert_eq!(generation.requests().len(), 3);
    assert_eq!(search.queries().len(), 3);
}

/// Test: a stalled model is cut off by the stage time limit
#[tokio::test(start_paused = true)]
async fn test_execution_time_limit() {
    let mut config = config("alice");
    config.agents.researcher.max_execution_secs = Some(30);
    let pipeline = pipeline(
        config,
        Arc::new(StalledGeneration),
        Arc::new(StaticSearch::new(snippets())),
        alice(),
    );

    let result = pipeline
        .run(SpeakerProfile::new("Jane Doe", "ML Ops"))
        .await;

    assert_eq!(result.state, PipelineState::Aborted);
    assert_eq!(
        result.failure.map(|f| f.kind),
        Some(FailureKind::ExecutionTimeExceeded)
    );
}

/// Test: invalid crew configuration is rejected when the pipeline is built
#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = config("alice");
    config.agents.evaluator.temperature = 5.0;
    let err = Pipeline::from_config(
        config,
        Capabilities {
            search: Arc::new(StaticSearch::new(vec![])),
            generation: Arc::new(ScriptedGeneration::new()),
            messaging: alice(),
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("temperature"));
}
