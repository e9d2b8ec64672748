//! Built-in guardrail hooks (§4.4): banned words, length limits, max
//! sentences, and required fields. Each is a [`ProviderHook`]; the
//! streaming-capable ones (banned words, length limits) also implement
//! [`ChunkInterceptor`] via `as_chunk_interceptor`.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::RegexSet;

use pk_domain::Chunk;
use pk_providers::{ChatRequest, ChatResponse};

use crate::decision::Decision;
use crate::traits::{ChunkInterceptor, ProviderHook};

/// Case-insensitive, word-boundary match over after-call content. As a
/// chunk interceptor it maintains a rolling buffer capped to twice the
/// longest banned word and aborts the instant a forbidden token
/// materializes anywhere in that buffer (a word split across two chunks
/// still gets caught; the cap only drops text far enough back that no
/// banned word could still span it).
pub struct BannedWordsHook {
    words: Vec<String>,
    pattern: RegexSet,
    buffer: Mutex<String>,
    /// Bytes of buffer tail kept between chunks — enough to catch a
    /// banned word split across a chunk boundary without retaining the
    /// whole response for the life of a long streamed turn.
    buffer_cap: usize,
}

impl BannedWordsHook {
    pub fn new(words: Vec<String>) -> Self {
        let patterns: Vec<String> = words
            .iter()
            .map(|w| format!(r"(?i)\b{}\b", regex::escape(w)))
            .collect();
        let pattern = RegexSet::new(&patterns).expect("banned-word patterns are all valid regex");
        let buffer_cap = words.iter().map(|w| w.len()).max().unwrap_or(0).saturating_mul(2).max(64);
        Self {
            words,
            pattern,
            buffer: Mutex::new(String::new()),
            buffer_cap,
        }
    }

    fn contains_banned_word(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

#[async_trait]
impl ProviderHook for BannedWordsHook {
    fn name(&self) -> &str {
        "banned_words"
    }

    async fn after_call(&self, response: &ChatResponse) -> Decision {
        if self.contains_banned_word(&response.content) {
            return Decision::deny(format!(
                "response contains a banned word (configured: {})",
                self.words.join(", ")
            ));
        }
        Decision::Allow
    }

    fn as_chunk_interceptor(&self) -> Option<&dyn ChunkInterceptor> {
        Some(self)
    }
}

#[async_trait]
impl ChunkInterceptor for BannedWordsHook {
    fn name(&self) -> &str {
        "banned_words"
    }

    async fn on_chunk(&self, chunk: &Chunk) -> Decision {
        let Chunk::Token { text } = chunk else {
            return Decision::Allow;
        };
        let mut buffer = self.buffer.lock();
        buffer.push_str(text);
        if self.contains_banned_word(&buffer) {
            return Decision::deny(format!(
                "streamed content contains a banned word (configured: {})",
                self.words.join(", ")
            ));
        }
        if buffer.len() > self.buffer_cap {
            let mut cut = buffer.len() - self.buffer_cap;
            while cut < buffer.len() && !buffer.is_char_boundary(cut) {
                cut += 1;
            }
            buffer.drain(..cut);
        }
        Decision::Allow
    }

    fn reset(&self) {
        self.buffer.lock().clear();
    }
}

/// Dual max on character count and estimated token count. Streaming
/// chunks accumulate a running character total; `max_tokens` is checked
/// against `pk_domain::estimate_tokens` unless the stream's `Done` chunk
/// carries an authoritative `Usage`.
pub struct LengthLimitHook {
    max_chars: Option<usize>,
    max_tokens: Option<u64>,
    streamed_chars: AtomicUsize,
}

impl LengthLimitHook {
    pub fn new(max_chars: Option<usize>, max_tokens: Option<u64>) -> Self {
        Self {
            max_chars,
            max_tokens,
            streamed_chars: AtomicUsize::new(0),
        }
    }

    fn check(&self, chars: usize) -> Decision {
        if let Some(max_chars) = self.max_chars {
            if chars > max_chars {
                return Decision::deny(format!("content length {chars} exceeds max_chars {max_chars}"));
            }
        }
        if let Some(max_tokens) = self.max_tokens {
            let estimated = (chars as u64).div_ceil(4);
            if estimated > max_tokens {
                return Decision::deny(format!(
                    "estimated token count {estimated} exceeds max_tokens {max_tokens}"
                ));
            }
        }
        Decision::Allow
    }
}

#[async_trait]
impl ProviderHook for LengthLimitHook {
    fn name(&self) -> &str {
        "length_limit"
    }

    async fn after_call(&self, response: &ChatResponse) -> Decision {
        self.check(response.content.chars().count())
    }

    fn as_chunk_interceptor(&self) -> Option<&dyn ChunkInterceptor> {
        Some(self)
    }
}

#[async_trait]
impl ChunkInterceptor for LengthLimitHook {
    fn name(&self) -> &str {
        "length_limit"
    }

    async fn on_chunk(&self, chunk: &Chunk) -> Decision {
        let Chunk::Token { text } = chunk else {
            return Decision::Allow;
        };
        let total = self.streamed_chars.fetch_add(text.chars().count(), Ordering::SeqCst) + text.chars().count();
        self.check(total)
    }

    fn reset(&self) {
        self.streamed_chars.store(0, Ordering::SeqCst);
    }
}

/// Splits on `.`, `!`, `?`; after-call only — sentence boundaries are
/// only meaningful once the full response is assembled.
pub struct MaxSentencesHook {
    max_sentences: usize,
}

impl MaxSentencesHook {
    pub fn new(max_sentences: usize) -> Self {
        Self { max_sentences }
    }

    fn sentence_count(text: &str) -> usize {
        text.split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .count()
    }
}

#[async_trait]
impl ProviderHook for MaxSentencesHook {
    fn name(&self) -> &str {
        "max_sentences"
    }

    async fn after_call(&self, response: &ChatResponse) -> Decision {
        let count = Self::sentence_count(&response.content);
        if count > self.max_sentences {
            return Decision::deny(format!(
                "response has {count} sentences, exceeding max_sentences {}",
                self.max_sentences
            ));
        }
        Decision::Allow
    }
}

/// Case-insensitive substring presence check; after-call only.
pub struct RequiredFieldsHook {
    required: Vec<String>,
}

impl RequiredFieldsHook {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }
}

#[async_trait]
impl ProviderHook for RequiredFieldsHook {
    fn name(&self) -> &str {
        "required_fields"
    }

    async fn after_call(&self, response: &ChatResponse) -> Decision {
        let lowered = response.content.to_lowercase();
        for field in &self.required {
            if !lowered.contains(&field.to_lowercase()) {
                return Decision::deny(format!("response is missing required field '{field}'"));
            }
        }
        Decision::Allow
    }
}
