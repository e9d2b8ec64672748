//! Agent-to-agent JSON-RPC bridge contract (§6.4). Protocol servers
//! (the actual JSON-RPC transport, `/.well-known/agent.json` discovery)
//! are out of scope; this module is the task state machine and the
//! `Store`/`Update` interface a host's JSON-RPC handler sits on top of.

use serde::{Deserialize, Serialize};

/// `submitted → working → {completed, failed, canceled, input-required,
/// auth-required, rejected}`. Terminal states never transition further;
/// `input-required`/`auth-required` may transition back to `working` on
/// resumption (an incoming element carrying the approval/auth payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
    Canceled,
    InputRequired,
    AuthRequired,
    Rejected,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled | Self::Rejected)
    }

    /// Whether `self -> next` is a legal state-machine transition.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Submitted, Working) => true,
            (Submitted, Rejected) => true,
            (Working, Completed | Failed | Canceled | InputRequired | AuthRequired) => true,
            (InputRequired, Working) | (InputRequired, Canceled) => true,
            (AuthRequired, Working) | (AuthRequired, Canceled) => true,
            _ => false,
        }
    }
}

/// One agent task, grouped by `context_id` the way §6.4 requires (a
/// `contextId` spans potentially many tasks belonging to the same
/// logical conversation/run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub state: TaskState,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_id: context_id.into(),
            state: TaskState::Submitted,
            artifacts: Vec::new(),
            error_message: None,
        }
    }
}

/// An artifact attached to a task as it progresses (the assistant's
/// output, a tool result, a media reference).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub content: serde_json::Value,
}

/// A streamed SSE frame: a JSON-RPC response envelope carrying either a
/// status update or an artifact update, per §6.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskStreamEvent {
    StatusUpdate { task_id: String, state: TaskState },
    ArtifactUpdate { task_id: String, artifact: Artifact },
}

/// The `Store`/`Update` interface the core's task tracking presents over
/// the A2A state machine, grouped per `context_id`. A host's JSON-RPC
/// handler (`tasks/get`, `tasks/cancel`, `tasks/list`, `tasks/subscribe`)
/// is built on top of this; this crate does not implement the transport.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: Task) -> pk_domain::Result<()>;
    async fn get(&self, task_id: &str) -> pk_domain::Result<Task>;
    async fn list_by_context(&self, context_id: &str) -> pk_domain::Result<Vec<Task>>;

    /// Applies a state transition, rejecting illegal ones per
    /// [`TaskState::can_transition_to`].
    async fn update_state(&self, task_id: &str, next: TaskState) -> pk_domain::Result<()>;
    async fn append_artifact(&self, task_id: &str, artifact: Artifact) -> pk_domain::Result<()>;
    async fn cancel(&self, task_id: &str) -> pk_domain::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        assert!(!TaskState::Completed.can_transition_to(TaskState::Working));
        assert!(!TaskState::Rejected.can_transition_to(TaskState::Working));
    }

    #[test]
    fn input_required_resumes_to_working() {
        assert!(TaskState::InputRequired.can_transition_to(TaskState::Working));
    }

    #[test]
    fn submitted_to_completed_directly_is_illegal() {
        assert!(!TaskState::Submitted.can_transition_to(TaskState::Completed));
    }

    #[test]
    fn working_to_every_terminal_and_suspend_state_is_legal() {
        for next in [
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
            TaskState::InputRequired,
            TaskState::AuthRequired,
        ] {
            assert!(TaskState::Working.can_transition_to(next));
        }
    }
}
