//! Failures that cross the tool boundary.

use thiserror::Error;

/// Errors surfaced to the MCP caller. Nothing here is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A required argument was absent and could not be inferred.
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// The codex process failed to start, exited non-zero, or was killed.
    #[error("{0}")]
    Invocation(String),

    /// The process exited cleanly but its event stream was unusable.
    #[error("{0}")]
    Protocol(String),
}

impl BridgeError {
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn invocation(msg: impl Into<String>) -> Self {
        Self::Invocation(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Short machine-readable kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "missing_input",
            Self::Invocation(_) => "invocation",
            Self::Protocol(_) => "protocol",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_the_bare_message() {
        assert_eq!(BridgeError::invocation("boom").to_string(), "boom");
        assert_eq!(
            BridgeError::protocol("no reply produced by codex").to_string(),
            "no reply produced by codex"
        );
        assert!(
            BridgeError::missing_input("`cwd` is required")
                .to_string()
                .starts_with("Missing required input:")
        );
    }
}
