//! Stage DAG runtime (§4.1), the canonical stage set (§4.2), and mode
//! selection (§4.5): the execution core a `Conversation` drives.

pub mod event_bus;
pub mod mode;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod time;

pub use event_bus::EventBus;
pub use mode::{build_pipeline, build_pipeline_with_recording, Mode};
pub use pipeline::{AggregatedResult, Pipeline, PipelineBuilder, PipelineHandle};
pub use stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind, DEFAULT_BUFFER_SIZE};
