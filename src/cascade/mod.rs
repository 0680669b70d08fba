//! Model-cascade client: failover and back-off across an ordered set
//! of `(endpoint, model, provider-hint)` triples, grouped by
//! intelligence tier. One `reqwest::Client`, a typed request/response
//! pair, and an error detail extractor, walking a tier-ordered entry
//! list instead of binding to a single provider.

pub mod endpoint;
pub mod health;
pub mod verify;
pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::conversation::Message;
use crate::error::ProviderError;
use crate::schema::Schema;

pub use endpoint::{EndpointStore, ModelEndpoint};
pub use health::{Clock, HealthCounter, HealthKey, Metric, SystemClock};
pub use wire::{RESPOND_TOOL_NAME, WireTool};

/// Intelligence tier requested by an LLM step. Ordered low-to-high so
/// that `tier.cascade_from()` can walk "this tier and all lower tiers"
/// with a simple range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntelligenceLevel {
    Low,
    Medium,
    High,
}

impl IntelligenceLevel {
    /// `self` and every weaker tier, strongest first — the walk order
    /// for the primary pass: each cascade entry at the requested tier
    /// and all lower tiers, in order.
    fn cascade_from(self) -> &'static [IntelligenceLevel] {
        match self {
            IntelligenceLevel::High => &[
                IntelligenceLevel::High,
                IntelligenceLevel::Medium,
                IntelligenceLevel::Low,
            ],
            IntelligenceLevel::Medium => &[IntelligenceLevel::Medium, IntelligenceLevel::Low],
            IntelligenceLevel::Low => &[IntelligenceLevel::Low],
        }
    }
}

/// One configured model in the cascade.
#[derive(Debug, Clone)]
pub struct CascadeEntry {
    pub tier: IntelligenceLevel,
    pub endpoint_id: String,
    pub model: String,
    pub provider_hint: Option<String>,
    pub no_tool_choice: bool,
}

impl CascadeEntry {
    pub fn new(
        tier: IntelligenceLevel,
        endpoint_id: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            tier,
            endpoint_id: endpoint_id.into(),
            model: model.into(),
            provider_hint: None,
            no_tool_choice: false,
        }
    }

    pub fn with_provider_hint(mut self, hint: impl Into<String>) -> Self {
        self.provider_hint = Some(hint.into());
        self
    }

    pub fn with_no_tool_choice(mut self, no_tool_choice: bool) -> Self {
        self.no_tool_choice = no_tool_choice;
        self
    }

    fn health_key(&self) -> HealthKey {
        HealthKey::new(&self.endpoint_id, &self.model, self.provider_hint.clone())
    }
}

/// Object mapping tier to its ordered list of entries. Hot-swappable:
/// `CascadeClient` only ever borrows a fresh `Arc` snapshot per call.
#[derive(Debug, Clone, Default)]
pub struct CascadeConfig {
    entries: Vec<CascadeEntry>,
}

impl CascadeConfig {
    pub fn new(entries: Vec<CascadeEntry>) -> Self {
        Self { entries }
    }

    /// The full entry set, used by the fallback pass.
    pub fn all(&self) -> &[CascadeEntry] {
        &self.entries
    }

    /// Entries at `tier` and every weaker tier, in cascade order.
    pub fn primary_order(&self, tier: IntelligenceLevel) -> Vec<&CascadeEntry> {
        tier.cascade_from()
            .iter()
            .flat_map(|t| self.entries.iter().filter(move |e| e.tier == *t))
            .collect()
    }
}

/// What the caller wants back: a tool-calling turn, or a single
/// schema wrapped as the synthetic `respond` tool.
#[derive(Debug, Clone)]
pub enum RequestShape {
    Tools(Vec<WireTool>),
    Schema(Schema),
}

impl RequestShape {
    fn into_wire_tools(self) -> (Vec<WireTool>, bool) {
        match self {
            RequestShape::Tools(tools) => (tools, true),
            RequestShape::Schema(schema) => (
                vec![WireTool::new(
                    RESPOND_TOOL_NAME,
                    "Respond with the requested structured output.",
                    schema.to_json(),
                )],
                true,
            ),
        }
    }
}

/// Per-call timeout default.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(40);

pub struct CascadeClient {
    http: Client,
    endpoints: EndpointStore,
    config: CascadeConfig,
    health: Arc<HealthCounter>,
    llm_timeout: Duration,
}

pub struct CascadeClientBuilder {
    endpoints: EndpointStore,
    config: CascadeConfig,
    health: Option<Arc<HealthCounter>>,
    llm_timeout: Duration,
}

impl Default for CascadeClientBuilder {
    fn default() -> Self {
        Self {
            endpoints: EndpointStore::new(),
            config: CascadeConfig::default(),
            health: None,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
        }
    }
}

impl CascadeClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoints(mut self, endpoints: EndpointStore) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn config(mut self, config: CascadeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn health(mut self, health: Arc<HealthCounter>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    /// Seeds endpoints and cascade tiers from a loaded §6.5
    /// configuration document (`crate::config::parse` /
    /// `crate::config::load_from_file`). The spec describes the shape
    /// of persisted configuration but not how it reaches the client;
    /// this is the natural glue between the two.
    pub fn from_config(mut self, loaded: crate::config::LoadedConfig) -> Self {
        self.endpoints = loaded.endpoints;
        self.config = loaded.cascade;
        self
    }

    pub fn build(self) -> Result<CascadeClient, ProviderError> {
        let http = Client::builder()
            .build()
            .map_err(|err| ProviderError::Request {
                endpoint: "<client>".to_string(),
                message: err.to_string(),
            })?;

        Ok(CascadeClient {
            http,
            endpoints: self.endpoints,
            config: self.config,
            health: self.health.unwrap_or_else(|| Arc::new(HealthCounter::new_in_memory())),
            llm_timeout: self.llm_timeout,
        })
    }
}

impl CascadeClient {
    pub fn builder() -> CascadeClientBuilder {
        CascadeClientBuilder::new()
    }

    pub fn health(&self) -> &Arc<HealthCounter> {
        &self.health
    }

    /// Primary pass followed, if exhausted, by the fallback pass.
    /// Returns the first successful assistant message.
    pub async fn generate(
        &self,
        view: &[Message],
        tier: IntelligenceLevel,
        shape: RequestShape,
    ) -> Result<Message, ProviderError> {
        let (tools, tool_choice_requested) = shape.into_wire_tools();

        let mut last_error = String::new();
        let mut last_was_timeout = false;

        for entry in self.config.primary_order(tier) {
            let key = entry.health_key();
            let stats = self.health.counts(&key);
            if stats.error > 0 && stats.skip < stats.error {
                self.health.increment(&key, Metric::Skip, 1);
                tracing::debug!(endpoint = %entry.endpoint_id, model = %entry.model, "cascade: skipping entry under back-off");
                continue;
            }

            match self
                .call_entry(entry, view, &tools, tool_choice_requested)
                .await
            {
                Ok(message) => {
                    self.health.record_success(&key);
                    return Ok(message);
                }
                Err(err) => {
                    last_was_timeout = matches!(err, ProviderError::Timeout { .. });
                    last_error = err.to_string();
                    self.health.increment(&key, Metric::Error, 1);
                    tracing::warn!(endpoint = %entry.endpoint_id, model = %entry.model, error = %last_error, "cascade: primary pass entry failed");
                }
            }
        }

        // Fallback pass: whole configured set, ordered by
        // errors_in_last_hour ascending, retried once each, ignoring
        // the skip gate.
        let mut fallback_entries: Vec<&CascadeEntry> = self.config.all().iter().collect();
        fallback_entries.sort_by_key(|entry| {
            self.health.get_stats(&entry.health_key()).error.last_hour
        });

        for entry in fallback_entries {
            let key = entry.health_key();
            match self
                .call_entry(entry, view, &tools, tool_choice_requested)
                .await
            {
                Ok(message) => {
                    self.health.record_success(&key);
                    return Ok(message);
                }
                Err(err) => {
                    last_was_timeout = matches!(err, ProviderError::Timeout { .. });
                    last_error = err.to_string();
                    self.health.increment(&key, Metric::Error, 1);
                    tracing::warn!(endpoint = %entry.endpoint_id, model = %entry.model, error = %last_error, "cascade: fallback pass entry failed");
                }
            }
        }

        Err(ProviderError::Exhausted {
            last_error,
            last_was_timeout,
            budget_secs: self.llm_timeout.as_secs(),
        })
    }

    async fn call_entry(
        &self,
        entry: &CascadeEntry,
        view: &[Message],
        tools: &[WireTool],
        tool_choice_requested: bool,
    ) -> Result<Message, ProviderError> {
        let endpoint = self
            .endpoints
            .get(&entry.endpoint_id)
            .ok_or_else(|| ProviderError::Request {
                endpoint: entry.endpoint_id.clone(),
                message: "endpoint id is not configured".to_string(),
            })?;

        let request = wire::ChatRequest {
            model: entry.model.clone(),
            messages: wire::to_wire_messages(view),
            tools: Some(tools.to_vec()),
            tool_choice: (tool_choice_requested && !entry.no_tool_choice).then_some("required"),
            provider: entry
                .provider_hint
                .clone()
                .map(|hint| wire::ProviderHint { only: vec![hint] }),
        };

        send_chat_request(&self.http, endpoint, &request, self.llm_timeout).await
    }

    /// Verifies a model is reachable and negotiates `tool_choice`
    /// support for it.
    pub async fn verify_model(
        &self,
        endpoint_id: &str,
        model: &str,
        provider_hints: &[String],
    ) -> verify::VerifyResult {
        verify::verify_model(&self.http, &self.endpoints, endpoint_id, model, provider_hints).await
    }
}

/// Sends one chat-completions request and parses the first choice's
/// assistant message, following the same send-then-parse shape and
/// error-detail extraction as a typical per-provider adapter.
pub(crate) async fn send_chat_request(
    http: &Client,
    endpoint: &ModelEndpoint,
    request: &wire::ChatRequest,
    timeout: Duration,
) -> Result<Message, ProviderError> {
    let mut builder = http.post(&endpoint.url).timeout(timeout).json(request);
    for (name, value) in endpoint.headers() {
        builder = builder.header(name, value);
    }

    let response = builder.send().await.map_err(|err| {
        if err.is_timeout() {
            ProviderError::Timeout {
                endpoint: endpoint.url.clone(),
                budget_secs: timeout.as_secs(),
            }
        } else {
            ProviderError::Request {
                endpoint: endpoint.url.clone(),
                message: err.to_string(),
            }
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let detail = extract_error_detail(response).await;
        return Err(ProviderError::Status {
            endpoint: endpoint.url.clone(),
            status: status.as_u16(),
            detail,
        });
    }

    let payload = response
        .json::<wire::ChatResponse>()
        .await
        .map_err(|err| ProviderError::MalformedResponse {
            endpoint: endpoint.url.clone(),
            detail: err.to_string(),
        })?;

    let choice = payload
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse {
            endpoint: endpoint.url.clone(),
            detail: "empty `choices` array".to_string(),
        })?;

    wire::from_wire_assistant(&endpoint.url, choice.message)
}

async fn extract_error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.is_empty() {
        format!("request failed ({status}) with no body")
    } else {
        body
    }
}

/// Raw JSON value accepted as tool-call arguments before they are
/// parsed by the executor.
pub type RawArguments = Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_order_walks_from_requested_tier_downward() {
        let config = CascadeConfig::new(vec![
            CascadeEntry::new(IntelligenceLevel::Low, "ep", "low-model"),
            CascadeEntry::new(IntelligenceLevel::High, "ep", "high-model"),
            CascadeEntry::new(IntelligenceLevel::Medium, "ep", "medium-model"),
        ]);

        let order: Vec<&str> = config
            .primary_order(IntelligenceLevel::High)
            .iter()
            .map(|e| e.model.as_str())
            .collect();
        assert_eq!(order, vec!["high-model", "medium-model", "low-model"]);
    }

    #[test]
    fn medium_tier_never_reaches_high_entries() {
        let config = CascadeConfig::new(vec![
            CascadeEntry::new(IntelligenceLevel::High, "ep", "high-model"),
            CascadeEntry::new(IntelligenceLevel::Medium, "ep", "medium-model"),
        ]);
        let order = config.primary_order(IntelligenceLevel::Medium);
        assert!(order.iter().all(|e| e.tier != IntelligenceLevel::High));
    }
}
