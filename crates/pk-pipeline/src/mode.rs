//! Mode selection (§4.5): the pipeline builder chooses one of three
//! canonical chains based on the input element type of the conversation.
//! `build_pipeline` wires the stages a `Mode` needs in the chain order
//! SPEC_FULL §4.5 fixes; callers supply the stage instances (already
//! configured with their own collaborators) rather than the mode knowing
//! how to construct them.

use std::sync::Arc;

use pk_domain::Result;

use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::stage::Stage;

/// Which canonical chain a conversation's turns run through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// StateLoad → ContextAssembly → PromptAssembly → Provider → StateSave
    Text,
    /// AudioTurn → STT → StateLoad → ContextAssembly → PromptAssembly →
    /// Provider → TTS → StateSave
    Vad,
    /// StateLoad → ContextAssembly → PromptAssembly → DuplexProvider →
    /// StateSave
    Duplex,
}

impl Mode {
    /// The number of stages the canonical chain for this mode has,
    /// excluding any optional `Recording` stages a caller inserts.
    pub fn expected_stage_count(self) -> usize {
        match self {
            Mode::Text => 5,
            Mode::Vad => 8,
            Mode::Duplex => 5,
        }
    }
}

/// Assembles `stages` into the linear chain SPEC_FULL §4.5 names for
/// `mode`, failing if the count doesn't match the canonical chain length
/// (a caller-side wiring mistake, not a runtime condition).
///
/// `stages` must already be in chain order; `build_pipeline` does not
/// reorder or infer placement — it only validates count and wires the
/// linear DAG.
pub fn build_pipeline(mode: Mode, stages: Vec<Arc<dyn Stage>>) -> Result<Pipeline> {
    let expected = mode.expected_stage_count();
    if stages.len() != expected {
        return Err(pk_domain::Error::InvalidRequest(format!(
            "{mode:?} mode requires {expected} stages, got {}",
            stages.len()
        )));
    }
    PipelineBuilder::new().chain(stages).build()
}

/// Assembles `stages` into the canonical chain for `mode`, then inserts
/// `recording` immediately after the first stage and immediately before
/// the last — the input/output boundary insertion points §4.5 allows for
/// any mode, without requiring the stage-count check to account for it.
pub fn build_pipeline_with_recording(
    mode: Mode,
    mut stages: Vec<Arc<dyn Stage>>,
    recording: Arc<dyn Stage>,
) -> Result<Pipeline> {
    let expected = mode.expected_stage_count();
    if stages.len() != expected {
        return Err(pk_domain::Error::InvalidRequest(format!(
            "{mode:?} mode requires {expected} stages, got {}",
            stages.len()
        )));
    }
    let last = stages.pop().expect("non-empty chain checked above");
    stages.insert(1, recording.clone());
    stages.push(recording);
    stages.push(last);
    PipelineBuilder::new().chain(stages).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{ElementReceiver, ElementSender, StageContext, StageKind};
    use async_trait::async_trait;

    struct NoopStage(&'static str);

    #[async_trait]
    impl Stage for NoopStage {
        fn name(&self) -> &str {
            self.0
        }

        fn kind(&self) -> StageKind {
            StageKind::Transform
        }

        async fn process(&self, _ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
            while let Some(element) = input.recv().await {
                if output.send(element).await.is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    fn chain_of(names: &[&'static str]) -> Vec<Arc<dyn Stage>> {
        names.iter().map(|n| Arc::new(NoopStage(n)) as Arc<dyn Stage>).collect()
    }

    #[test]
    fn text_mode_accepts_five_stages() {
        let stages = chain_of(&["state_load", "context_assembly", "prompt_assembly", "provider", "state_save"]);
        assert!(build_pipeline(Mode::Text, stages).is_ok());
    }

    #[test]
    fn wrong_stage_count_is_rejected() {
        let stages = chain_of(&["state_load", "provider"]);
        assert!(build_pipeline(Mode::Text, stages).is_err());
    }

    #[test]
    fn vad_mode_expects_eight_stages() {
        assert_eq!(Mode::Vad.expected_stage_count(), 8);
    }

    #[test]
    fn duplex_mode_expects_five_stages() {
        assert_eq!(Mode::Duplex.expected_stage_count(), 5);
    }
}
