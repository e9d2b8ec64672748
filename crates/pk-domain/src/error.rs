use std::collections::HashMap;

/// Shared error type used across all PromptKit crates.
///
/// Propagation policy (see the Hook Registry and Provider Stage design):
/// `HookDenied`, `InvalidRequest`, `NotFound`, `VersionMismatch`, `Canceled`
/// are surfaced to the caller verbatim and never retried by the core.
/// `Timeout` and `ProviderRetryable` are surfaced; retry is the caller's or
/// a wrapping hook's responsibility. `ProviderFatal` and `RuntimeInternal`
/// tear the pipeline down.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A hook denied a provider call, a streaming chunk, or a tool dispatch.
    /// The first `Deny` in a phase short-circuits the remaining hooks.
    #[error("hook '{hook_name}' denied {phase}: {reason}")]
    HookDenied {
        hook_name: String,
        phase: HookPhase,
        reason: String,
        metadata: HashMap<String, serde_json::Value>,
    },

    /// The pack is malformed or references a tool/validator the core does
    /// not know how to reify.
    #[error("invalid pack: {0}")]
    InvalidPack(String),

    /// The caller's request violates a documented precondition.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A deadline carried on the context (or the provider stage's per-request
    /// deadline) elapsed before completion.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The root context was canceled from outside (e.g. `Shutdown`).
    #[error("canceled: {0}")]
    Canceled(String),

    /// A transient provider failure (network, HTTP 429/5xx) a caller or
    /// wrapping retry hook may retry.
    #[error("provider {provider} (retryable): {message}")]
    ProviderRetryable { provider: String, message: String },

    /// A non-retryable provider failure (4xx other than 429, malformed
    /// response, auth failure at the transport level).
    #[error("provider {provider}: {message}")]
    ProviderFatal { provider: String, message: String },

    /// A tool handler failed. Fed back to the model as a tool-role message
    /// unless no further tool rounds remain.
    #[error("tool '{tool_name}' error: {message}")]
    ToolError { tool_name: String, message: String },

    /// An optimistic-lock `Save` lost the race; the caller should reload.
    #[error("version mismatch for conversation {id}: expected {expected}, found {found}")]
    VersionMismatch {
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("auth: {0}")]
    Auth(String),

    /// An invariant violation inside the core itself (bad DAG, channel
    /// wiring bug). Always a bug, never caller input.
    #[error("internal: {0}")]
    RuntimeInternal(String),

    #[error("{0}")]
    Other(String),
}

/// The hook phase a `Deny` (or a `ToolError` surfaced mid-dispatch) occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    ProviderBefore,
    ProviderAfter,
    Chunk,
    ToolBefore,
    ToolAfter,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ProviderBefore => "provider_before",
            Self::ProviderAfter => "provider_after",
            Self::Chunk => "chunk",
            Self::ToolBefore => "tool_before",
            Self::ToolAfter => "tool_after",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Surfaced to external transports as the marshaled hook-denial object
    /// described in the external interfaces contract (`hook_name`, `phase`,
    /// `reason`, `metadata`).
    pub fn hook_denied(
        hook_name: impl Into<String>,
        phase: HookPhase,
        reason: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self::HookDenied {
            hook_name: hook_name.into(),
            phase,
            reason: reason.into(),
            metadata,
        }
    }

    /// Whether the core (or a wrapping retry hook) may retry the call that
    /// produced this error. Deterministic failures are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ProviderRetryable { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_denied_is_not_retryable() {
        let err = Error::hook_denied("banned_words", HookPhase::Chunk, "forbidden token", HashMap::new());
        assert!(!err.is_retryable());
    }

    #[test]
    fn timeout_and_provider_retryable_are_retryable() {
        assert!(Error::Timeout("slow".into()).is_retryable());
        assert!(Error::ProviderRetryable {
            provider: "mock".into(),
            message: "429".into()
        }
        .is_retryable());
    }

    #[test]
    fn invalid_request_is_not_retryable() {
        assert!(!Error::InvalidRequest("bad".into()).is_retryable());
    }

    #[test]
    fn hook_phase_display() {
        assert_eq!(HookPhase::ProviderBefore.to_string(), "provider_before");
        assert_eq!(HookPhase::Chunk.to_string(), "chunk");
    }
}
