use pk_domain::{ConversationOptions, ConversationState, Message, QuerySource, Role, TruncationStrategy};

use crate::embedder::Embedder;
use crate::report::AssemblyReport;
use crate::truncation::{relevance_truncate, sliding_truncate};

/// `ContextAssembly` (§4.2): merges loaded state, incoming user input, and
/// summaries into one ordered message list subject to a token budget.
pub struct ContextAssembler<'a> {
    embedder: Option<&'a dyn Embedder>,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(embedder: Option<&'a dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Build the candidate message list (summaries as synthetic system
    /// messages, then the live tail, then the new user input) and apply
    /// the configured truncation strategy.
    pub async fn assemble(
        &self,
        state: &ConversationState,
        user_input: &Message,
        options: &ConversationOptions,
    ) -> (Vec<Message>, AssemblyReport) {
        let mut candidates = Vec::with_capacity(state.summaries.len() + state.messages.len() + 1);

        for summary in &state.summaries {
            candidates.push(Message::system(format!(
                "[summary turns {}..{}] {}",
                summary.turn_start, summary.turn_end, summary.text
            )));
        }

        if options.summaries_replace_source {
            let covered: Vec<(usize, usize)> =
                state.summaries.iter().map(|s| (s.turn_start, s.turn_end)).collect();
            for (i, message) in state.messages.iter().enumerate() {
                if covered.iter().any(|(start, end)| i >= *start && i < *end) {
                    continue;
                }
                candidates.push(message.clone());
            }
        } else {
            candidates.extend(state.messages.iter().cloned());
        }

        candidates.push(user_input.clone());

        let candidate_count = candidates.len();

        let (kept, strategy_name) = match &options.truncation {
            TruncationStrategy::Sliding => {
                (sliding_truncate(&candidates, options.token_budget), "sliding")
            }
            TruncationStrategy::Relevance {
                min_recent_messages,
                always_keep_system_role,
                similarity_threshold,
                query_source,
            } => {
                let query = resolve_query(query_source, &candidates, user_input);
                let embedder = self.embedder;
                match embedder {
                    Some(embedder) => (
                        relevance_truncate(
                            &candidates,
                            options.token_budget,
                            embedder,
                            &query,
                            *min_recent_messages,
                            *always_keep_system_role,
                            *similarity_threshold,
                        )
                        .await,
                        "relevance",
                    ),
                    // No embedder injected: degrade to sliding rather than
                    // fail the turn outright — relevance is an optimization,
                    // not a correctness requirement of assembly.
                    None => (sliding_truncate(&candidates, options.token_budget), "sliding_fallback"),
                }
            }
        };

        let estimated_tokens: u64 = kept
            .iter()
            .map(|m| pk_domain::estimate_tokens(&m.content.extract_all_text()))
            .sum();

        let report = AssemblyReport {
            strategy: strategy_name.to_string(),
            candidate_messages: candidate_count,
            kept_messages: kept.len(),
            dropped_messages: candidate_count.saturating_sub(kept.len()),
            estimated_tokens,
            truncated: kept.len() < candidate_count,
        };

        if report.truncated {
            tracing::debug!(
                conversation_id = %state.id,
                strategy = %report.strategy,
                dropped = report.dropped_messages,
                kept = report.kept_messages,
                "context assembly truncated the candidate message list"
            );
        }

        (kept, report)
    }
}

fn resolve_query(source: &QuerySource, candidates: &[Message], user_input: &Message) -> String {
    match source {
        QuerySource::LastUser => user_input
            .content
            .text()
            .map(String::from)
            .unwrap_or_else(|| user_input.content.extract_all_text()),
        QuerySource::LastN(n) => candidates
            .iter()
            .rev()
            .filter(|m| m.role != Role::System)
            .take(*n)
            .map(|m| m.content.extract_all_text())
            .collect::<Vec<_>>()
            .join(" "),
        QuerySource::Custom(text) => text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use pk_domain::Summary;

    #[tokio::test]
    async fn assembles_system_user_assistant_chronologically() {
        let mut state = ConversationState::new("conv-1");
        state.messages.push(Message::system("You are helpful."));
        state.messages.push(Message::user("hi"));
        state.messages.push(Message::assistant("hello"));

        let assembler = ContextAssembler::new(None);
        let options = ConversationOptions::default();
        let (messages, report) = assembler
            .assemble(&state, &Message::user("what's next"), &options)
            .await;

        assert_eq!(messages.len(), 4);
        assert!(!report.truncated);
    }

    #[tokio::test]
    async fn summaries_replace_source_by_default() {
        let mut state = ConversationState::new("conv-1");
        state.messages.push(Message::user("old turn"));
        state.messages.push(Message::assistant("old reply"));
        state.summaries.push(Summary {
            text: "discussed old topic".into(),
            turn_start: 0,
            turn_end: 2,
            token_count: 5,
            created_at_ms: 0,
        });

        let assembler = ContextAssembler::new(None);
        let options = ConversationOptions::default();
        let (messages, _report) = assembler
            .assemble(&state, &Message::user("new turn"), &options)
            .await;

        // Summary system message + new user turn; the two covered
        // messages were replaced, not duplicated.
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.extract_all_text().contains("discussed old topic"));
    }

    #[tokio::test]
    async fn zero_budget_keeps_current_user_message_only() {
        let mut state = ConversationState::new("conv-1");
        for i in 0..10 {
            state.messages.push(Message::user(format!("turn {i}")));
            state.messages.push(Message::assistant(format!("reply {i}")));
        }
        let mut options = ConversationOptions::default();
        options.token_budget = Some(0);

        let assembler = ContextAssembler::new(None);
        let (messages, report) = assembler
            .assemble(&state, &Message::user("final question"), &options)
            .await;

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.text(), Some("final question"));
        assert!(report.truncated);
    }

    #[tokio::test]
    async fn relevance_strategy_without_embedder_falls_back_to_sliding() {
        let mut state = ConversationState::new("conv-1");
        state.messages.push(Message::user("hi"));
        let options = ConversationOptions {
            truncation: pk_domain::TruncationStrategy::Relevance {
                min_recent_messages: 1,
                always_keep_system_role: true,
                similarity_threshold: 0.2,
                query_source: QuerySource::LastUser,
            },
            ..Default::default()
        };

        let assembler = ContextAssembler::new(None);
        let (_, report) = assembler.assemble(&state, &Message::user("next"), &options).await;
        assert_eq!(report.strategy, "sliding_fallback");
    }

    #[tokio::test]
    async fn relevance_strategy_uses_injected_embedder() {
        let mut state = ConversationState::new("conv-1");
        state.messages.push(Message::user("hi"));
        let options = ConversationOptions {
            truncation: pk_domain::TruncationStrategy::Relevance {
                min_recent_messages: 1,
                always_keep_system_role: true,
                similarity_threshold: 0.0,
                query_source: QuerySource::LastUser,
            },
            ..Default::default()
        };

        let embedder = MockEmbedder;
        let assembler = ContextAssembler::new(Some(&embedder));
        let (_, report) = assembler.assemble(&state, &Message::user("next"), &options).await;
        assert_eq!(report.strategy, "relevance");
    }
}
