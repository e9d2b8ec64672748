/// Shared token-count estimator used whenever a chunk or message doesn't
/// carry an authoritative `Usage` count: both the length-limit guardrail
/// (`pk-hooks`) and `ContextAssembly`'s budget accounting (`pk-contextpack`)
/// call this so their notion of "how many tokens is this text" never drifts
/// apart.
///
/// Estimate = 1 token per 4 characters, rounded up, per §4.4.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up_to_nearest_token() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn counts_unicode_scalars_not_bytes() {
        // 3 multi-byte chars, should be ceil(3/4) = 1 token, not byte-length-driven.
        assert_eq!(estimate_tokens("日本語"), 1);
    }
}
