use thiserror::Error;

/// Errors surfaced by the cache orchestrator, its stores, and middleware.
///
/// Cloneable so a single producer result can be handed to every caller
/// sharing an in-flight computation.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Query error: {message}")]
    Query { message: String },

    #[error("Encryption error: {message}")]
    Encryption { message: String },
}

impl CacheError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error() {
        let error = CacheError::configuration("no stores provided");
        assert_eq!(
            error.to_string(),
            "Configuration error: no stores provided"
        );
    }

    #[test]
    fn test_store_error() {
        let error = CacheError::store("connection refused");
        assert_eq!(error.to_string(), "Store error: connection refused");
    }

    #[test]
    fn test_error_is_cloneable() {
        let error = CacheError::query("producer failed");
        let cloned = error.clone();
        assert_eq!(error.to_string(), cloned.to_string());
    }
}
