//! Researcher stage output.

use serde::{Deserialize, Serialize};

/// Source attribution for a finding in the brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// Free-text research brief about a speaker.
///
/// Exists only for the duration of a run: the evaluator stage takes it by
/// value and it is dropped once the scorecard is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchBrief {
    pub text: String,
    pub sources: Vec<SourceRef>,
    /// Set when search failed or returned nothing.
    pub degraded: bool,
}

impl ResearchBrief {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Render the brief as evaluator context.
    pub fn as_context(&self) -> String {
        let mut out = String::new();
        if self.is_empty() {
            out.push_str("No research findings were available for this speaker.");
        } else {
            out.push_str(self.text.trim());
        }
        if self.degraded {
            out.push_str("\n\nNote: web search was unavailable or returned no results; findings may be incomplete.");
        }
        if !self.sources.is_empty() {
            out.push_str("\n\nSources:");
            for source in &self.sources {
                out.push_str(&format!("\n- {} <{}>", source.title, source.url));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_brief_context_is_explicit() {
        let brief = ResearchBrief {
            text: "  ".to_string(),
            sources: vec![],
            degraded: true,
        };
        assert!(brief.is_empty());
        let context = brief.as_context();
        assert!(context.starts_with("No research findings"));
        assert!(context.contains("incomplete"));
    }

    #[test]
    fn test_context_lists_sources() {
        let brief = ResearchBrief {
            text: "Jane Doe leads the ML platform team.".to_string(),
            sources: vec![SourceRef {
                title: "Team page".to_string(),
                url: "https://example.com/team".to_string(),
            }],
            degraded: false,
        };
        let context = brief.as_context();
        assert!(context.starts_with("Jane Doe leads"));
        assert!(context.contains("- Team page <https://example.com/team>"));
    }
}
