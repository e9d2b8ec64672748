//! Read-only Pack model (§3.4, §6.1): a compiled bundle keyed by prompt
//! name, with a declared tool ceiling, optional skills, and `{{var}}`
//! template substitution. Pack compilation itself (`packc`) is out of
//! scope — the core only ever consumes the already-compiled JSON.

pub mod pack;
pub mod template;

pub use pack::{Pack, PromptSpec, SkillSpec, ToolSpec, ValidatorDecl};
pub use template::render_template;
