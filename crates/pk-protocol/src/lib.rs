//! External protocol bridges (§6.4) — contract only. Protocol servers
//! (A2A JSON-RPC, AG-UI SSE, MCP) are themselves out of scope; this crate
//! only carries the task state machine, the `TaskStore` interface a
//! host's JSON-RPC handler sits on top of, and the fixed event-mapping
//! table from the core's own event bus to AG-UI's SSE vocabulary.

pub mod a2a;
pub mod agui;

pub use a2a::{Artifact, Task, TaskState, TaskStore, TaskStreamEvent};
pub use agui::{map_event, AgUiEvent, RunAgentInput};
