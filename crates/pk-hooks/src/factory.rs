//! Pack-to-hook conversion (§4.4): reifies a pack's declared validators
//! into guardrail hooks by validator-type name. Unknown types fail fast
//! with `InvalidPack` rather than being silently skipped, since a guardrail
//! the pack author expected to be active but that the core couldn't
//! construct is a correctness bug, not a degraded mode.

use std::sync::Arc;

use pk_domain::{Error, Result};

use crate::guardrails::{BannedWordsHook, LengthLimitHook, MaxSentencesHook, RequiredFieldsHook};
use crate::traits::ProviderHook;

/// One pack-declared validator: a type name plus its construction
/// parameters, exactly as parsed from the pack's `validators` list.
#[derive(Debug, Clone)]
pub struct ValidatorSpec {
    pub validator_type: String,
    pub params: serde_json::Value,
}

pub fn build_guardrail(spec: &ValidatorSpec) -> Result<Arc<dyn ProviderHook>> {
    match spec.validator_type.as_str() {
        "banned_words" => {
            let words: Vec<String> = spec
                .params
                .get("words")
                .and_then(|v| v.as_array())
                .ok_or_else(|| Error::InvalidPack("banned_words validator requires a 'words' array".into()))?
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            Ok(Arc::new(BannedWordsHook::new(words)))
        }
        "length_limit" => {
            let max_chars = spec.params.get("max_chars").and_then(|v| v.as_u64()).map(|v| v as usize);
            let max_tokens = spec.params.get("max_tokens").and_then(|v| v.as_u64());
            if max_chars.is_none() && max_tokens.is_none() {
                return Err(Error::InvalidPack(
                    "length_limit validator requires 'max_chars' and/or 'max_tokens'".into(),
                ));
            }
            Ok(Arc::new(LengthLimitHook::new(max_chars, max_tokens)))
        }
        "max_sentences" => {
            let max = spec
                .params
                .get("max_sentences")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| Error::InvalidPack("max_sentences validator requires 'max_sentences'".into()))?;
            Ok(Arc::new(MaxSentencesHook::new(max as usize)))
        }
        "required_fields" => {
            let fields: Vec<String> = spec
                .params
                .get("fields")
                .and_then(|v| v.as_array())
                .ok_or_else(|| Error::InvalidPack("required_fields validator requires a 'fields' array".into()))?
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            Ok(Arc::new(RequiredFieldsHook::new(fields)))
        }
        other => Err(Error::InvalidPack(format!("unknown validator type '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_validator_type_fails_fast() {
        let spec = ValidatorSpec {
            validator_type: "made_up".into(),
            params: serde_json::json!({}),
        };
        let err = build_guardrail(&spec).unwrap_err();
        assert!(matches!(err, Error::InvalidPack(_)));
    }

    #[test]
    fn banned_words_builds_from_params() {
        let spec = ValidatorSpec {
            validator_type: "banned_words".into(),
            params: serde_json::json!({"words": ["forbidden"]}),
        };
        assert!(build_guardrail(&spec).is_ok());
    }

    #[test]
    fn banned_words_without_words_array_is_invalid_pack() {
        let spec = ValidatorSpec {
            validator_type: "banned_words".into(),
            params: serde_json::json!({}),
        };
        assert!(matches!(build_guardrail(&spec), Err(Error::InvalidPack(_))));
    }
}
