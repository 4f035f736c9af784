//! Pipeline input: the candidate speaker.

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, Result};

/// Identifying information about a candidate speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerProfile {
    pub name: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

impl SpeakerProfile {
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            affiliation: None,
        }
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    /// Reject blank names and topics.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "speaker name must not be empty".to_string(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "speaker topic must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Affiliation or a neutral placeholder, for prompt templates.
    pub fn affiliation_or_unknown(&self) -> &str {
        self.affiliation
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or("unknown affiliation")
    }
}

impl std::fmt::Display for SpeakerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.affiliation.as_deref() {
            Some(affiliation) if !affiliation.trim().is_empty() => {
                write!(f, "{} ({}, {})", self.name, self.topic, affiliation)
            }
            _ => write!(f, "{} ({})", self.name, self.topic),
        }
    }
}
