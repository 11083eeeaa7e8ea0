use thiserror::Error;

/// High-level error type shared across composition components.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid secret for {field}: {reason}")]
    InvalidSecretInput { field: &'static str, reason: String },
    #[error("entropy source failure: {0}")]
    Entropy(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for ComposeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_name_their_offending_field() {
        let err = ComposeError::InvalidSecretInput {
            field: "sso_password",
            reason: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "invalid secret for sso_password: bad");

        let err = ComposeError::InvalidConfig("facility name must not be empty".to_string());
        assert!(err.to_string().starts_with("invalid config:"), "{err}");
    }

    #[test]
    fn serde_yaml_failures_map_to_serialization() {
        let yaml_err = serde_yaml::from_str::<usize>("not-a-number").unwrap_err();
        let err = ComposeError::from(yaml_err);
        assert!(matches!(err, ComposeError::Serialization(_)), "{err}");
    }
}
