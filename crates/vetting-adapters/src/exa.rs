//! Exa web search as a [`SearchCapability`].

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use vetting_core::{CapabilityError, SearchCapability, SearchSnippet};

use crate::{http_client, require_env, send_for_text};

pub const EXA_BASE_URL: &str = "https://api.exa.ai";

/// Characters of page text kept per result.
pub const MAX_TEXT_CHARS: usize = 1_000;

#[derive(Clone)]
pub struct ExaSearch {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl ExaSearch {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http_client()?,
            base_url: EXA_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create from `EXA_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(require_env("EXA_API_KEY")?)
    }
}

impl std::fmt::Debug for ExaSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExaSearch")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

pub fn build_search_body(query: &str, limit: usize) -> Value {
    json!({
        "query": query,
        "numResults": limit,
        "contents": {
            "text": { "maxCharacters": MAX_TEXT_CHARS },
        },
    })
}

#[derive(Deserialize)]
struct ExaResult {
    url: String,
    title: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

/// Parse an Exa `/search` response. Results without a URL are rejected by
/// deserialization; missing titles fall back to the URL.
pub fn parse_search_response(body: &str) -> Result<Vec<SearchSnippet>, CapabilityError> {
    let response: ExaResponse = serde_json::from_str(body)
        .map_err(|e| CapabilityError::Malformed(format!("Exa response: {e}")))?;
    Ok(response
        .results
        .into_iter()
        .map(|result| SearchSnippet {
            title: result
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| result.url.clone()),
            text: result.text.unwrap_or_default(),
            url: result.url,
        })
        .collect())
}

#[async_trait]
impl SearchCapability for ExaSearch {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchSnippet>, CapabilityError> {
        tracing::debug!(query, limit, "exa search");
        let text = send_for_text(
            "exa",
            self.client
                .post(format!("{}/search", self.base_url))
                .header("x-api-key", &self.api_key)
                .json(&build_search_body(query, limit)),
        )
        .await?;
        let snippets = parse_search_response(&text)?;
        tracing::debug!(results = snippets.len(), "exa search complete");
        Ok(snippets)
    }
}
