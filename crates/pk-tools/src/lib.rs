//! Tool registry and dispatch (§6.5, Design Notes). Concrete tools are
//! supplied by the host application; this crate only carries the
//! capability set and the dispatch function the provider stage calls
//! into — never a built-in shell/process/file tool set.

pub mod registry;
pub mod traits;

pub use registry::ToolRegistry;
pub use traits::{ToolHandler, ToolOutcome};
