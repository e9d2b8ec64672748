//! The canonical stage set (§4.2): the fixed catalogue of `Stage`
//! implementations every mode chain is built from.

pub mod audio_turn;
pub mod context_assembly;
pub mod duplex_provider;
pub mod prompt_assembly;
pub mod provider;
pub mod recording;
pub mod state_load;
pub mod state_save;
pub mod stt;
pub mod tts;

pub use audio_turn::AudioTurn;
pub use context_assembly::ContextAssembly;
pub use duplex_provider::{DuplexProvider, DuplexSession};
pub use prompt_assembly::PromptAssembly;
pub use provider::ProviderStage;
pub use recording::Recording;
pub use state_load::StateLoad;
pub use state_save::StateSave;
pub use stt::{MockSpeechToText, Stt, SpeechToText};
pub use tts::{MockTextToSpeech, TextToSpeech, Tts};
