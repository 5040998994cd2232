//! Model identity types.

use crate::error::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};

/// Information about a resolved model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model id (e.g. "claude-sonnet-4").
    pub id: String,
    /// Provider id (e.g. "anthropic").
    pub provider_id: String,
    /// Human-readable name.
    pub name: String,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider_id: provider_id.into(),
        }
    }
}

/// A parsed `provider/model` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    /// Provider id, absent for bare model ids.
    pub provider: Option<String>,
    pub model: String,
}

impl ModelRef {
    /// Parse a model identifier. Blank identifiers are rejected.
    pub fn parse(id: &str) -> ProviderResult<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ProviderError::InvalidModelId(id.to_string()));
        }
        match id.split_once('/') {
            Some((provider, model)) => {
                if provider.is_empty() || model.is_empty() {
                    return Err(ProviderError::InvalidModelId(id.to_string()));
                }
                Ok(Self {
                    provider: Some(provider.to_string()),
                    model: model.to_string(),
                })
            }
            None => Ok(Self {
                provider: None,
                model: id.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "{}/{}", provider, self.model),
            None => write!(f, "{}", self.model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_model() {
        let r = ModelRef::parse("anthropic/claude-sonnet-4").unwrap();
        assert_eq!(r.provider.as_deref(), Some("anthropic"));
        assert_eq!(r.model, "claude-sonnet-4");
        assert_eq!(r.to_string(), "anthropic/claude-sonnet-4");
    }

    #[test]
    fn test_parse_bare_model() {
        let r = ModelRef::parse(" gpt-4o ").unwrap();
        assert!(r.provider.is_none());
        assert_eq!(r.model, "gpt-4o");
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!(ModelRef::parse("   ").is_err());
        assert!(ModelRef::parse("anthropic/").is_err());
        assert!(ModelRef::parse("/model").is_err());
    }
}
