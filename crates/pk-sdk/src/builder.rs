//! [`ConversationBuilder`]: assembles one mode's canonical stage chain
//! from caller-supplied collaborators (provider, store, pack, tools,
//! hooks) and the pack's own declared validators, mirroring the
//! teacher's `bootstrap::build_app_state` "validate, then wire every
//! subsystem" shape — just producing a `Conversation` instead of an
//! `AppState`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pk_contextpack::Embedder;
use pk_domain::{ConversationOptions, Error, Result};
use pk_hooks::factory::{build_guardrail, ValidatorSpec};
use pk_hooks::{HookRegistry, ProviderHook, SessionHook, ToolHook};
use pk_pack::Pack;
use pk_pipeline::mode::{build_pipeline, build_pipeline_with_recording};
use pk_pipeline::stages::{
    AudioTurn, ContextAssembly, DuplexProvider, DuplexSession, PromptAssembly, ProviderStage, SpeechToText, StateLoad,
    StateSave, Stt, TextToSpeech, Tts,
};
use pk_pipeline::{EventBus, Mode, Stage};
use pk_providers::Provider;
use pk_state::{ConversationStore, InMemoryStore};
use pk_tools::ToolRegistry;

use crate::conversation::Conversation;

const DEFAULT_HOT_WINDOW: usize = 200;

/// Builds a [`Conversation`] for exactly one of the three canonical
/// modes. The mode's own required collaborators (an `Stt`/`Tts` pair for
/// `Vad`, a `DuplexSession` for `Duplex`) are validated at `build`, not
/// at the point they're omitted — a caller assembling a `Text`
/// conversation never needs to think about audio at all.
pub struct ConversationBuilder {
    mode: Mode,
    provider: Option<Arc<dyn Provider>>,
    model: Option<String>,
    temperature: Option<f32>,
    store: Option<Arc<dyn ConversationStore>>,
    pack: Option<Arc<Pack>>,
    prompt_name: Option<String>,
    variables: HashMap<String, String>,
    tools: Option<Arc<ToolRegistry>>,
    provider_hooks: Vec<Arc<dyn ProviderHook>>,
    tool_hooks: Vec<Arc<dyn ToolHook>>,
    session_hooks: Vec<Arc<dyn SessionHook>>,
    options: ConversationOptions,
    embedder: Option<Arc<dyn Embedder>>,
    hot_window: usize,
    stt: Option<Arc<dyn SpeechToText>>,
    tts: Option<Arc<dyn TextToSpeech>>,
    silence_window: Option<Duration>,
    duplex_session: Option<Arc<dyn DuplexSession>>,
    recording: Option<Arc<dyn Stage>>,
    event_bus_capacity: Option<usize>,
}

impl ConversationBuilder {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            provider: None,
            model: None,
            temperature: None,
            store: None,
            pack: None,
            prompt_name: None,
            variables: HashMap::new(),
            tools: None,
            provider_hooks: Vec::new(),
            tool_hooks: Vec::new(),
            session_hooks: Vec::new(),
            options: ConversationOptions::default(),
            embedder: None,
            hot_window: DEFAULT_HOT_WINDOW,
            stt: None,
            tts: None,
            silence_window: None,
            duplex_session: None,
            recording: None,
            event_bus_capacity: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Omitting this instantiates an `InMemoryStore`, per the
    /// recognized-configuration-keys default.
    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn pack(mut self, pack: Arc<Pack>, prompt_name: impl Into<String>) -> Self {
        self.pack = Some(pack);
        self.prompt_name = Some(prompt_name.into());
        self
    }

    pub fn variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Prepended ahead of the pack's own declared validators, per §6.5:
    /// caller-supplied hooks run first within the provider-hook phase.
    pub fn with_provider_hook(mut self, hook: Arc<dyn ProviderHook>) -> Self {
        self.provider_hooks.push(hook);
        self
    }

    pub fn with_tool_hook(mut self, hook: Arc<dyn ToolHook>) -> Self {
        self.tool_hooks.push(hook);
        self
    }

    pub fn with_session_hook(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.session_hooks.push(hook);
        self
    }

    pub fn options(mut self, options: ConversationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn hot_window(mut self, hot_window: usize) -> Self {
        self.hot_window = hot_window;
        self
    }

    pub fn stt(mut self, stt: Arc<dyn SpeechToText>) -> Self {
        self.stt = Some(stt);
        self
    }

    pub fn tts(mut self, tts: Arc<dyn TextToSpeech>) -> Self {
        self.tts = Some(tts);
        self
    }

    pub fn silence_window(mut self, silence_window: Duration) -> Self {
        self.silence_window = Some(silence_window);
        self
    }

    pub fn duplex_session(mut self, session: Arc<dyn DuplexSession>) -> Self {
        self.duplex_session = Some(session);
        self
    }

    /// Inserts an observe-only stage at both the input and output
    /// boundary of the mode's chain (§4.5: "Observational `Recording`
    /// stages may be inserted at the input and output boundaries of any
    /// mode").
    pub fn recording(mut self, recording: Arc<dyn Stage>) -> Self {
        self.recording = Some(recording);
        self
    }

    pub fn event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = Some(capacity);
        self
    }

    /// Validates every required collaborator for `self.mode`, reifies
    /// the pack's declared validators into guardrail hooks ahead of any
    /// caller-supplied ones, wires the canonical chain, and opens the
    /// conversation — running `SessionHook::on_start` before returning.
    pub async fn build(self, id: impl Into<String>) -> Result<Conversation> {
        let id = id.into();

        let provider = self
            .provider
            .ok_or_else(|| Error::InvalidRequest("conversation requires a provider".into()))?;
        let pack = self
            .pack
            .ok_or_else(|| Error::InvalidRequest("conversation requires a pack".into()))?;
        let prompt_name = self
            .prompt_name
            .ok_or_else(|| Error::InvalidRequest("conversation requires a prompt name".into()))?;
        let store: Arc<dyn ConversationStore> = self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new()));

        let mut hooks = HookRegistry::new();
        for hook in self.provider_hooks {
            hooks.register_provider_hook(hook);
        }
        for hook in self.tool_hooks {
            hooks.register_tool_hook(hook);
        }
        for hook in self.session_hooks {
            hooks.register_session_hook(hook);
        }
        {
            let prompt = pack.prompt(&prompt_name)?;
            for decl in &prompt.validators {
                let spec = ValidatorSpec {
                    validator_type: decl.validator_type.clone(),
                    params: decl.params.clone(),
                };
                hooks.register_provider_hook(build_guardrail(&spec)?);
            }
        }
        let hooks = Arc::new(hooks);

        let mut provider_stage = ProviderStage::new(provider.clone(), hooks.clone())
            .with_max_tool_rounds(self.options.max_tool_rounds);
        if let Some(tools) = self.tools.clone() {
            provider_stage = provider_stage.with_tools(tools);
        }
        if let Some(model) = self.model {
            provider_stage = provider_stage.with_model(model);
        }
        if let Some(temperature) = self.temperature {
            provider_stage = provider_stage.with_temperature(temperature);
        }

        let state_load = StateLoad::new(store.clone()).with_hot_window(self.hot_window);
        let state_save = StateSave::new(store.clone());

        let mut context_assembly = ContextAssembly::new(self.options.clone());
        if let Some(embedder) = self.embedder.clone() {
            context_assembly = context_assembly.with_embedder(embedder);
        }

        let mut prompt_assembly = PromptAssembly::new(pack.clone(), prompt_name.clone()).with_variables(self.variables);
        if let Some(tools) = self.tools.clone() {
            prompt_assembly = prompt_assembly.with_tools(tools);
        }

        let stages: Vec<Arc<dyn Stage>> = match self.mode {
            Mode::Text => vec![
                Arc::new(state_load),
                Arc::new(context_assembly),
                Arc::new(prompt_assembly),
                Arc::new(provider_stage),
                Arc::new(state_save),
            ],
            Mode::Vad => {
                let stt = self
                    .stt
                    .ok_or_else(|| Error::InvalidRequest("Vad mode requires a SpeechToText backend".into()))?;
                let tts = self
                    .tts
                    .ok_or_else(|| Error::InvalidRequest("Vad mode requires a TextToSpeech backend".into()))?;
                let mut audio_turn = AudioTurn::new();
                if let Some(window) = self.silence_window {
                    audio_turn = audio_turn.with_silence_window(window);
                }
                vec![
                    Arc::new(audio_turn),
                    Arc::new(Stt::new(stt)),
                    Arc::new(state_load),
                    Arc::new(context_assembly),
                    Arc::new(prompt_assembly),
                    Arc::new(provider_stage),
                    Arc::new(Tts::new(tts)),
                    Arc::new(state_save),
                ]
            }
            Mode::Duplex => {
                let session = self
                    .duplex_session
                    .ok_or_else(|| Error::InvalidRequest("Duplex mode requires a DuplexSession".into()))?;
                vec![
                    Arc::new(state_load),
                    Arc::new(context_assembly),
                    Arc::new(prompt_assembly),
                    Arc::new(DuplexProvider::new(session)),
                    Arc::new(state_save),
                ]
            }
        };

        let pipeline = match self.recording {
            Some(recording) => build_pipeline_with_recording(self.mode, stages, recording)?,
            None => build_pipeline(self.mode, stages)?,
        };

        let events = Arc::new(match self.event_bus_capacity {
            Some(capacity) => EventBus::with_capacity(capacity),
            None => EventBus::new(),
        });

        hooks.run_session_start(&id).await?;

        Ok(Conversation::new(id, self.mode, self.options, Arc::new(pipeline), store, hooks, provider, events))
    }
}
