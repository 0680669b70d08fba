//! Persisted configuration loading: endpoint credentials and the
//! cascade's tier → entry-list mapping, read from a hand-edited TOML
//! file — the natural format for configuration a person edits by
//! hand, keeping JSON reserved for wire-level and schema payloads.

use std::collections::HashMap;

use serde::Deserialize;

use crate::cascade::{CascadeConfig, CascadeEntry, EndpointStore, IntelligenceLevel, ModelEndpoint};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("cascade tier `{0}` is not one of high, medium, low")]
    UnknownTier(String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    endpoints: HashMap<String, RawEndpoint>,
    #[serde(default)]
    cascade: HashMap<String, Vec<RawCascadeEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    url: String,
    credential: String,
    #[serde(default)]
    models_url: Option<String>,
    #[serde(default)]
    extra_headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawCascadeEntry {
    endpoint: String,
    model: String,
    #[serde(default)]
    provider_hint: Option<String>,
    #[serde(default)]
    no_tool_choice: bool,
}

fn parse_tier(raw: &str) -> Result<IntelligenceLevel, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "high" => Ok(IntelligenceLevel::High),
        "medium" => Ok(IntelligenceLevel::Medium),
        "low" => Ok(IntelligenceLevel::Low),
        other => Err(ConfigError::UnknownTier(other.to_string())),
    }
}

/// Endpoint store plus cascade tiers resolved from one TOML document.
pub struct LoadedConfig {
    pub endpoints: EndpointStore,
    pub cascade: CascadeConfig,
}

/// Parses a TOML document already read into memory (split from
/// [`load_from_file`] so callers that fetch configuration from
/// somewhere other than the filesystem can still reuse the parsing and
/// validation logic).
pub fn parse(source: &str) -> Result<LoadedConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(source).map_err(|source| ConfigError::Parse {
        path: "<in-memory>".to_string(),
        source,
    })?;

    let mut endpoints = EndpointStore::new();
    for (id, endpoint) in raw.endpoints {
        let mut resolved = ModelEndpoint::new(endpoint.url, endpoint.credential);
        if let Some(models_url) = endpoint.models_url {
            resolved = resolved.with_models_url(models_url);
        }
        for (name, value) in endpoint.extra_headers {
            resolved = resolved.with_extra_header(name, value);
        }
        endpoints.insert(id, resolved);
    }

    let mut entries = Vec::new();
    for (tier_name, tier_entries) in raw.cascade {
        let tier = parse_tier(&tier_name)?;
        for entry in tier_entries {
            let mut cascade_entry = CascadeEntry::new(tier, entry.endpoint, entry.model);
            if let Some(hint) = entry.provider_hint {
                cascade_entry = cascade_entry.with_provider_hint(hint);
            }
            cascade_entry = cascade_entry.with_no_tool_choice(entry.no_tool_choice);
            entries.push(cascade_entry);
        }
    }

    Ok(LoadedConfig {
        endpoints,
        cascade: CascadeConfig::new(entries),
    })
}

/// Loads endpoint credentials and the cascade configuration from a
/// TOML file on disk.
pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<LoadedConfig, ConfigError> {
    let path_ref = path.as_ref();
    let contents = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.display().to_string(),
        source,
    })?;
    parse(&contents).map_err(|err| match err {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: path_ref.display().to_string(),
            source,
        },
        other => other,
    })
}
