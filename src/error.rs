//! Error types for the outreach bot.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Outreach error: {0}")]
    Outreach(#[from] OutreachError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Key-value cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("No channel can reach recipient {0}")]
    NoRoute(String),

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Document extraction and artifact indexing errors.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Unsupported document {file_name}: {reason}")]
    Unsupported { file_name: String, reason: String },

    #[error("Indexing failed: {0}")]
    Index(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} overloaded: {reason}")]
    Overloaded { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Rate-limit and server-busy failures; the only class worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Overloaded { .. })
    }
}

/// Failures of the outreach workflow itself.
#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    #[error("User of type {user_type} may not author queries")]
    Authorization { user_type: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Classifier unavailable after retries: {0}")]
    TransientProvider(String),

    #[error("Classifier failed: {0}")]
    Classifier(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<LlmError> for OutreachError {
    fn from(e: LlmError) -> Self {
        if e.is_transient() {
            Self::TransientProvider(e.to_string())
        } else {
            Self::Classifier(e.to_string())
        }
    }
}

impl From<ChannelError> for OutreachError {
    fn from(e: ChannelError) -> Self {
        Self::Delivery(e.to_string())
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_overload_are_transient() {
        let rl = LlmError::RateLimited {
            provider: "anthropic".into(),
            retry_after: None,
        };
        let busy = LlmError::Overloaded {
            provider: "anthropic".into(),
            reason: "529".into(),
        };
        let auth = LlmError::AuthFailed {
            provider: "anthropic".into(),
        };
        assert!(rl.is_transient());
        assert!(busy.is_transient());
        assert!(!auth.is_transient());
    }

    #[test]
    fn transient_llm_error_maps_to_transient_provider() {
        let e: OutreachError = LlmError::Overloaded {
            provider: "anthropic".into(),
            reason: "busy".into(),
        }
        .into();
        assert!(matches!(e, OutreachError::TransientProvider(_)));

        let e: OutreachError = LlmError::InvalidResponse {
            provider: "anthropic".into(),
            reason: "empty".into(),
        }
        .into();
        assert!(matches!(e, OutreachError::Classifier(_)));
    }
}
