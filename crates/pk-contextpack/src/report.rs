use serde::{Deserialize, Serialize};

/// Machine-readable summary of one `ContextAssembler::assemble` call —
/// emitted as `validation.failed`-adjacent telemetry isn't required by the
/// spec, but a host wiring its own observability still wants to know how
/// much of the transcript a turn actually saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub strategy: String,
    pub candidate_messages: usize,
    pub kept_messages: usize,
    pub dropped_messages: usize,
    pub estimated_tokens: u64,
    pub truncated: bool,
}
