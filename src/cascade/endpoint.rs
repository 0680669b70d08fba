//! Resolved model endpoints and the per-endpoint credential store.

use std::collections::HashMap;

/// Resolved endpoint: `{url, headers, models_url?, extra_headers?}`
/// plus the per-endpoint credential. Immutable once loaded: the
/// credential comes from configuration and is never mutated during a
/// request.
#[derive(Debug, Clone)]
pub struct ModelEndpoint {
    pub url: String,
    pub models_url: Option<String>,
    credential: String,
    extra_headers: Vec<(String, String)>,
}

impl ModelEndpoint {
    pub fn new(url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            models_url: None,
            credential: credential.into(),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_models_url(mut self, models_url: impl Into<String>) -> Self {
        self.models_url = Some(models_url.into());
        self
    }

    pub fn with_extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// `Authorization: Bearer <credential>` plus any configured
    /// product-identifying extras.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", self.credential)),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        headers.extend(self.extra_headers.iter().cloned());
        headers
    }
}

/// Process-wide, read-only-per-call map from endpoint id to its
/// resolved [`ModelEndpoint`]: one credential per endpoint, keyed by
/// endpoint id.
#[derive(Debug, Clone, Default)]
pub struct EndpointStore {
    endpoints: HashMap<String, ModelEndpoint>,
}

impl EndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, endpoint: ModelEndpoint) -> &mut Self {
        self.endpoints.insert(id.into(), endpoint);
        self
    }

    pub fn get(&self, id: &str) -> Option<&ModelEndpoint> {
        self.endpoints.get(id)
    }
}
