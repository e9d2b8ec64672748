use pk_domain::{Message, Role};

use crate::embedder::{cosine_similarity, Embedder};

/// Drop oldest non-system, non-summary-synthesized messages first until
/// the remaining transcript's estimated token count fits `budget`. System
/// messages (the resolved system prompt, prepended summary messages) are
/// never dropped by this strategy — they are the "always-kept" set the
/// spec's Sliding description implies by naming only non-system messages
/// as droppable.
///
/// `budget` of 0 keeps only the trailing user message (plus any
/// always-kept system/summary messages already in `messages`), per the
/// token-budget-zero boundary behavior.
pub fn sliding_truncate(messages: &[Message], budget: Option<u64>) -> Vec<Message> {
    let Some(budget) = budget else {
        return messages.to_vec();
    };

    let (system, rest): (Vec<&Message>, Vec<&Message>) =
        messages.iter().partition(|m| m.role == Role::System);

    let system_tokens: u64 = system.iter().map(|m| message_tokens(m)).sum();

    // Walk `rest` from the tail, keeping messages while they fit, always
    // keeping at least the final message (the current turn's user input)
    // so a budget of 0 still has something to send.
    let mut kept_rev: Vec<&Message> = Vec::new();
    let mut used = system_tokens;
    for (i, message) in rest.iter().enumerate().rev() {
        let tokens = message_tokens(message);
        let is_last = i == rest.len() - 1;
        if used + tokens <= budget || is_last {
            used += tokens;
            kept_rev.push(message);
        } else {
            break;
        }
    }
    kept_rev.reverse();

    let mut out: Vec<Message> = system.into_iter().cloned().collect();
    out.extend(kept_rev.into_iter().cloned());
    out
}

/// Score non-system messages by cosine similarity to a query embedding,
/// keep the top-ranked plus an always-kept recent tail, preserving
/// original (chronological) order in the output.
pub async fn relevance_truncate(
    messages: &[Message],
    budget: Option<u64>,
    embedder: &dyn Embedder,
    query: &str,
    min_recent_messages: usize,
    always_keep_system_role: bool,
    similarity_threshold: f32,
) -> Vec<Message> {
    let Some(budget) = budget else {
        return messages.to_vec();
    };

    let query_embedding = embedder.embed(query).await.unwrap_or_default();

    let system_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::System)
        .map(|(i, _)| i)
        .collect();

    let non_system_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role != Role::System)
        .map(|(i, _)| i)
        .collect();

    let recent_tail_len = min_recent_messages.min(non_system_indices.len());
    let recent_tail: std::collections::HashSet<usize> = non_system_indices
        [non_system_indices.len() - recent_tail_len..]
        .iter()
        .copied()
        .collect();

    let mut scored: Vec<(usize, f32)> = Vec::new();
    for &i in &non_system_indices {
        if recent_tail.contains(&i) {
            continue;
        }
        let text = messages[i].content.extract_all_text();
        let embedding = embedder.embed(&text).await.unwrap_or_default();
        let score = cosine_similarity(&query_embedding, &embedding);
        if score >= similarity_threshold {
            scored.push((i, score));
        }
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let always_kept: u64 = if always_keep_system_role {
        system_indices.iter().map(|&i| message_tokens(&messages[i])).sum()
    } else {
        0
    };
    let mut used: u64 = always_kept + recent_tail.iter().map(|&i| message_tokens(&messages[i])).sum::<u64>();

    let mut kept_indices: std::collections::BTreeSet<usize> = recent_tail.into_iter().collect();
    if always_keep_system_role {
        kept_indices.extend(system_indices.iter().copied());
    }

    for (i, _score) in scored {
        let tokens = message_tokens(&messages[i]);
        if used + tokens > budget {
            continue;
        }
        used += tokens;
        kept_indices.insert(i);
    }

    if !always_keep_system_role {
        // System messages still participate in the budget but are
        // dropped last, same ranking tiebreak as any other candidate
        // would get since they were excluded from `scored` above only
        // when always-kept; here they're eligible like any message.
        for &i in &system_indices {
            if kept_indices.contains(&i) {
                continue;
            }
            let tokens = message_tokens(&messages[i]);
            if used + tokens <= budget {
                used += tokens;
                kept_indices.insert(i);
            }
        }
    }

    kept_indices.into_iter().map(|i| messages[i].clone()).collect()
}

fn message_tokens(message: &Message) -> u64 {
    pk_domain::estimate_tokens(&message.content.extract_all_text())
}
