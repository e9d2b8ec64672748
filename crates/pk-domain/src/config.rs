use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tracing/OpenTelemetry export configuration shared by every binary that
/// hosts a `Conversation`. Mirrors the teacher's observability config shape;
/// defaults changed to the new service identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
}

fn default_service_name() -> String {
    "promptkit".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: default_service_name(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Context-assembly truncation strategy, selected at conversation-open time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Drop the oldest messages (after any always-kept system message)
    /// until the remaining transcript fits the token budget.
    Sliding,
    /// Score messages by relevance to the current turn and keep the
    /// highest-scoring ones, subject to a minimum recent-message floor.
    Relevance {
        #[serde(default = "default_min_recent_messages")]
        min_recent_messages: usize,
        #[serde(default = "default_true")]
        always_keep_system_role: bool,
        #[serde(default = "default_similarity_threshold")]
        similarity_threshold: f32,
        #[serde(default)]
        query_source: QuerySource,
    },
}

fn default_min_recent_messages() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_similarity_threshold() -> f32 {
    0.2
}

/// What a `Relevance` truncation strategy embeds and compares against
/// stored message embeddings to score relevance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum QuerySource {
    /// Embed the newest user message.
    LastUser,
    /// Embed the last `n` messages, joined.
    LastN(usize),
    /// Embed a fixed literal string supplied by the caller.
    Custom(String),
}

impl Default for QuerySource {
    fn default() -> Self {
        Self::LastUser
    }
}

impl Default for TruncationStrategy {
    fn default() -> Self {
        Self::Sliding
    }
}

/// The options a caller may pass when opening a conversation, per the
/// recognized-configuration-keys contract. Every field has a spec-defined
/// default so a minimal `provider`-only config is always valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationOptions {
    /// `None` means unlimited (no truncation is ever applied).
    #[serde(default)]
    pub token_budget: Option<u64>,
    #[serde(default)]
    pub truncation: TruncationStrategy,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_timeout", with = "duration_millis")]
    pub default_timeout: Duration,
    /// Content parts whose encoded payload exceeds this many bytes are
    /// externalized to a `StorageReference` before an element carrying
    /// them is allowed to cross a stage boundary.
    #[serde(default = "default_media_storage_threshold_bytes")]
    pub media_storage_threshold_bytes: u64,
    /// Whether a new summary replaces the messages it covers in what a
    /// `MessageReader`/`ContextAssembly` sees, or merely supplements them
    /// alongside the original messages (open question, decided in favor
    /// of replacement — see the design ledger).
    #[serde(default = "default_true")]
    pub summaries_replace_source: bool,
}

fn default_max_tool_rounds() -> u32 {
    8
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_media_storage_threshold_bytes() -> u64 {
    100 * 1024
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            token_budget: None,
            truncation: TruncationStrategy::default(),
            max_tool_rounds: default_max_tool_rounds(),
            default_timeout: default_timeout(),
            media_storage_threshold_bytes: default_media_storage_threshold_bytes(),
            summaries_replace_source: true,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observability_config_defaults() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "promptkit");
        assert_eq!(config.sample_rate, 1.0);
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn conversation_options_default_matches_recognized_defaults() {
        let opts = ConversationOptions::default();
        assert_eq!(opts.token_budget, None);
        assert_eq!(opts.max_tool_rounds, 8);
        assert_eq!(opts.default_timeout, Duration::from_secs(30));
        assert_eq!(opts.media_storage_threshold_bytes, 100 * 1024);
        assert!(matches!(opts.truncation, TruncationStrategy::Sliding));
    }

    #[test]
    fn relevance_truncation_roundtrips_through_json() {
        let strategy = TruncationStrategy::Relevance {
            min_recent_messages: 3,
            always_keep_system_role: true,
            similarity_threshold: 0.35,
            query_source: QuerySource::LastN(4),
        };
        let json = serde_json::to_value(&strategy).unwrap();
        let back: TruncationStrategy = serde_json::from_value(json).unwrap();
        match back {
            TruncationStrategy::Relevance {
                min_recent_messages,
                similarity_threshold,
                ..
            } => {
                assert_eq!(min_recent_messages, 3);
                assert!((similarity_threshold - 0.35).abs() < f32::EPSILON);
            }
            _ => panic!("expected relevance strategy"),
        }
    }

    #[test]
    fn config_toml_round_trip() {
        let config = ObservabilityConfig {
            otlp_endpoint: Some("http://localhost:4317".into()),
            service_name: "promptkit-test".into(),
            sample_rate: 0.5,
        };
        let toml_str = toml::to_string(&config).unwrap();
        let back: ObservabilityConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.service_name, "promptkit-test");
        assert_eq!(back.sample_rate, 0.5);
    }
}
