//! Crew configuration: agent personas, task templates and delivery target.
//!
//! Loaded from TOML. Every section has a default, so an empty file yields the
//! standard crew (`gpt-4o`, temperature 0.7, 25 iterations per agent).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::SpeakerProfile;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_ITER: u32 = 25;
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_iter() -> u32 {
    DEFAULT_MAX_ITER
}

fn default_true() -> bool {
    true
}

/// Persona and runtime limits for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub role: String,
    pub goal: String,
    pub backstory: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Hard cap on generation/tool-call iterations.
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,

    /// Wall-clock cap for the whole stage, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_secs: Option<u64>,

    /// Append today's date to the system prompt.
    #[serde(default = "default_true")]
    pub inject_date: bool,
}

impl AgentConfig {
    fn persona(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
            model: default_model(),
            temperature: DEFAULT_TEMPERATURE,
            max_iter: DEFAULT_MAX_ITER,
            max_execution_secs: None,
            inject_date: true,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.role.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{name}.role must not be empty")));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{name}.model must not be empty")));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "{name}.temperature {} outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.max_iter == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}.max_iter must be at least 1"
            )));
        }
        Ok(())
    }
}

/// Task template for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Supports `{speaker_name}`, `{topic}`, `{affiliation}`, `{event}`, `{recipient}`.
    pub description: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub researcher: AgentConfig,
    pub evaluator: AgentConfig,
    pub messenger: AgentConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            researcher: AgentConfig::persona(
                "AI Speaker Researcher",
                "Uncover the professional background, technical work, speaking history and industry standing of {speaker_name}",
                "You are a meticulous researcher who vets conference speakers. You cross-check claims against public sources and always cite where a finding came from.",
            ),
            evaluator: AgentConfig::persona(
                "Speaker Qualification Specialist",
                "Score {speaker_name} against the {event} speaker bar using only evidence from the research brief",
                "You have reviewed hundreds of talk proposals for technical conferences. You are fair, evidence-driven and never invent facts that are not in the brief.",
            ),
            messenger: AgentConfig::persona(
                "Report Messenger",
                "Deliver the qualification report for {speaker_name} to {recipient} over Slack",
                "You make sure evaluation results reach the program committee. A report that was only drafted and never sent is a failed job.",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub research: TaskConfig,
    pub evaluate: TaskConfig,
    pub deliver: TaskConfig,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            research: TaskConfig {
                description: "Research {speaker_name} ({affiliation}), who proposed a talk on {topic} for {event}.\nFind their technical work, publications or open-source projects, previous talks, and industry recognition. Use web search; if search returns nothing, say so plainly.".to_string(),
                expected_output: "A research brief covering background, technical work, speaking history and industry standing, with source URLs.".to_string(),
            },
            evaluate: TaskConfig {
                description: "Evaluate {speaker_name} as a speaker on {topic} for {event}.\nScore each dimension from 0 (no evidence) to 10 (exceptional) and justify every score with concrete evidence from the brief. Sparse research must lower scores, not remove dimensions.".to_string(),
                expected_output: "A JSON object with technical_expertise, speaking_experience, industry_impact and overall_recommendation, each holding an integer score and a reasoning string.".to_string(),
            },
            deliver: TaskConfig {
                description: "Send the qualification report for {speaker_name} to {recipient} as a Slack direct message.\nFirst look up {recipient} with find_user_by_name, then call send_message with the returned user id and the full report text.".to_string(),
                expected_output: "Confirmation that the report was sent, including the recipient and message id.".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Display name of the person who receives reports.
    pub recipient: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            recipient: "program-committee".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Snippets requested per search call.
    pub max_results: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Complete crew definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrewConfig {
    /// Event name substituted into prompts.
    pub event: String,
    pub agents: AgentsConfig,
    pub tasks: TasksConfig,
    pub delivery: DeliveryConfig,
    pub research: ResearchConfig,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            event: "ODSC AI".to_string(),
            agents: AgentsConfig::default(),
            tasks: TasksConfig::default(),
            delivery: DeliveryConfig::default(),
            research: ResearchConfig::default(),
        }
    }
}

impl CrewConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: CrewConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agents.researcher.validate("agents.researcher")?;
        self.agents.evaluator.validate("agents.evaluator")?;
        self.agents.messenger.validate("agents.messenger")?;
        if self.delivery.recipient.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "delivery.recipient must not be empty".to_string(),
            ));
        }
        if self.research.max_results == 0 {
            return Err(ConfigError::Invalid(
                "research.max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// SHA-256 over the canonical JSON encoding; logged with every run.
    pub fn digest(&self) -> String {
        use sha2::Digest as _;
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(sha2::Sha256::digest(&bytes))
    }

    /// Template variables for a given speaker.
    pub fn template_vars(&self, profile: &SpeakerProfile) -> Vec<(&'static str, String)> {
        vec![
            ("speaker_name", profile.name.clone()),
            ("topic", profile.topic.clone()),
            ("affiliation", profile.affiliation_or_unknown().to_string()),
            ("event", self.event.clone()),
            ("recipient", self.delivery.recipient.clone()),
        ]
    }
}

/// Replace `{name}` placeholders. Unknown placeholders are left as-is.
pub fn interpolate(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_standard_crew() {
        let config = CrewConfig::default();
        assert!(config.validate().is_ok());
        for agent in [
            &config.agents.researcher,
            &config.agents.evaluator,
            &config.agents.messenger,
        ] {
            assert_eq!(agent.model, "gpt-4o");
            assert_eq!(agent.temperature, 0.7);
            assert_eq!(agent.max_iter, 25);
            assert!(agent.max_execution_secs.is_none());
            assert!(agent.inject_date);
        }
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = CrewConfig::from_toml_str("").unwrap();
        assert_eq!(config, CrewConfig::default());
    }

    #[test]
    fn test_partial_agent_override() {
        let text = r#"
            event = "MLConf"

            [agents.evaluator]
            role = "Strict Reviewer"
            goal = "Score harshly"
            backstory = "Seen it all"
            temperature = 0.0
            max_iter = 3

            [delivery]
            recipient = "alice"
        "#;
        let config = CrewConfig::from_toml_str(text).unwrap();
        assert_eq!(config.event, "MLConf");
        assert_eq!(config.agents.evaluator.role, "Strict Reviewer");
        assert_eq!(config.agents.evaluator.model, DEFAULT_MODEL);
        assert_eq!(config.agents.evaluator.max_iter, 3);
        assert_eq!(config.agents.researcher, AgentsConfig::default().researcher);
        assert_eq!(config.delivery.recipient, "alice");
    }

    #[test]
    fn test_invalid_temperature_rejected() {
        let text = r#"
            [agents.researcher]
            role = "r"
            goal = "g"
            backstory = "b"
            temperature = 3.5
        "#;
        let err = CrewConfig::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_zero_max_iter_rejected() {
        let mut config = CrewConfig::default();
        config.agents.messenger.max_iter = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_blank_recipient_rejected() {
        let mut config = CrewConfig::default();
        config.delivery.recipient = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crew.toml");
        let mut config = CrewConfig::default();
        config.agents.researcher.max_execution_secs = Some(120);
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = CrewConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CrewConfig::load(Path::new("/nonexistent/crew.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_digest_changes_with_config() {
        let a = CrewConfig::default();
        let mut b = CrewConfig::default();
        b.delivery.recipient = "alice".to_string();
        assert_eq!(a.digest(), CrewConfig::default().digest());
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_interpolate_profile_vars() {
        let config = CrewConfig::default();
        let profile = SpeakerProfile::new("Jane Doe", "ML Ops");
        let vars = config.template_vars(&profile);
        let text = interpolate("{speaker_name} on {topic} ({affiliation}) -> {recipient} {unknown}", &vars);
        assert_eq!(
            text,
            "Jane Doe on ML Ops (unknown affiliation) -> program-committee {unknown}"
        );
    }
}
