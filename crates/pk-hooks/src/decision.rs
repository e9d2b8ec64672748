use std::collections::HashMap;

/// The verdict a hook callback returns for a single invocation (§3.5).
/// `Allow` lets the phase continue to the next hook; the first `Deny` in
/// a phase short-circuits every hook after it.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Deny {
        reason: String,
        metadata: HashMap<String, serde_json::Value>,
    },
}

impl Decision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn deny_with(reason: impl Into<String>, metadata: HashMap<String, serde_json::Value>) -> Self {
        Self::Deny {
            reason: reason.into(),
            metadata,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_is_allow() {
        assert!(Decision::Allow.is_allow());
    }

    #[test]
    fn deny_is_not_allow() {
        assert!(!Decision::deny("forbidden token").is_allow());
    }
}
