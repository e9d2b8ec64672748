//! Pipeline assembly and execution (§4.1). A [`PipelineBuilder`] validates
//! a stage DAG (no cycles, no duplicate names, full connectivity) before
//! producing an executable [`Pipeline`]; `execute` launches one worker
//! per stage, wiring each stage's input to its predecessors' outputs
//! (merging on fan-in, duplicating on fan-out) and returns the terminal
//! stage's output channel.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use pk_domain::{ElementPayload, Error, EventKind, Message, Result, StreamElement};

use crate::event_bus::EventBus;
use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, DEFAULT_BUFFER_SIZE};

struct Node {
    name: String,
    stage: Arc<dyn Stage>,
}

/// Builds and validates a stage DAG before it can run. The common case —
/// a linear chain — is `chain`; `add_stage`/`connect` support branching
/// via dedicated fork/join stages when a mode needs it.
pub struct PipelineBuilder {
    nodes: Vec<Node>,
    edges: Vec<(String, String)>,
    buffer_size: usize,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn add_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.nodes.push(Node {
            name: stage.name().to_string(),
            stage,
        });
        self
    }

    pub fn connect(mut self, from: &str, to: &str) -> Self {
        self.edges.push((from.to_string(), to.to_string()));
        self
    }

    /// Wires `stages` as a linear chain in the given order — the shape
    /// of every canonical mode chain in §4.5.
    pub fn chain(mut self, stages: Vec<Arc<dyn Stage>>) -> Self {
        let mut previous: Option<String> = None;
        for stage in stages {
            let name = stage.name().to_string();
            self.nodes.push(Node {
                name: name.clone(),
                stage,
            });
            if let Some(prev) = previous {
                self.edges.push((prev, name.clone()));
            }
            previous = Some(name);
        }
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        self.validate()?;
        Ok(Pipeline {
            nodes: self.nodes,
            edges: self.edges,
            buffer_size: self.buffer_size,
        })
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.clone()) {
                return Err(Error::InvalidRequest(format!("duplicate stage name '{}'", node.name)));
            }
        }
        for (from, to) in &self.edges {
            if !seen.contains(from) {
                return Err(Error::InvalidRequest(format!("edge references unknown stage '{from}'")));
            }
            if !seen.contains(to) {
                return Err(Error::InvalidRequest(format!("edge references unknown stage '{to}'")));
            }
        }

        if self.nodes.len() > 1 {
            let mut connected = HashSet::new();
            for (from, to) in &self.edges {
                connected.insert(from.clone());
                connected.insert(to.clone());
            }
            for node in &self.nodes {
                if !connected.contains(&node.name) {
                    return Err(Error::InvalidRequest(format!(
                        "stage '{}' is disconnected from the pipeline",
                        node.name
                    )));
                }
            }
        }

        let mut indegree: HashMap<&str, usize> = self.nodes.iter().map(|n| (n.name.as_str(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for (from, to) in &self.edges {
            *indegree.get_mut(to.as_str()).expect("edge endpoint validated above") += 1;
            adjacency.entry(from.as_str()).or_default().push(to.as_str());
        }
        let mut queue: VecDeque<&str> = indegree.iter().filter(|(_, d)| **d == 0).map(|(n, _)| *n).collect();
        let mut visited = 0usize;
        while let Some(n) = queue.pop_front() {
            visited += 1;
            if let Some(successors) = adjacency.get(n) {
                for s in successors {
                    let d = indegree.get_mut(s).expect("adjacency built from same node set");
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(s);
                    }
                }
            }
        }
        if visited != self.nodes.len() {
            return Err(Error::InvalidRequest("pipeline graph contains a cycle".into()));
        }

        Ok(())
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A single awaited summary of an `execute_sync` run: every assistant
/// message produced plus the last raw text observed, for callers that
/// want one aggregated value instead of draining a channel.
#[derive(Debug, Default, Clone)]
pub struct AggregatedResult {
    pub messages: Vec<Message>,
    pub last_text: Option<String>,
}

/// Handle to a running pipeline execution. Dropping this without calling
/// `shutdown`/`join` leaves the run to finish (or fail) on its own;
/// nothing here depends on the handle still being held.
pub struct PipelineHandle {
    cancel: CancellationToken,
    completion: oneshot::Receiver<Result<()>>,
}

impl PipelineHandle {
    /// Cancels the pipeline and waits up to `timeout` for every worker to
    /// drain. A worker that does not observe cancellation in time yields
    /// `Error::Timeout`.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.cancel.cancel();
        match tokio::time::timeout(timeout, self.completion).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::RuntimeInternal("pipeline supervisor task dropped".into())),
            Err(_) => Err(Error::Timeout("workers did not drain before shutdown deadline".into())),
        }
    }

    /// Waits for the run to finish on its own (no cancellation).
    pub async fn join(self) -> Result<()> {
        self.completion
            .await
            .map_err(|_| Error::RuntimeInternal("pipeline supervisor task dropped".into()))?
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// An assembled, executable stage DAG.
pub struct Pipeline {
    nodes: Vec<Node>,
    edges: Vec<(String, String)>,
    buffer_size: usize,
}

impl Pipeline {
    /// `Execute(ctx, input) → output, handle`. Launches one worker per
    /// stage and returns the terminal stage's output channel. The
    /// runtime publishes `pipeline.started`/`stage.started` eagerly and
    /// `stage.{completed,failed}`/`pipeline.{completed,failed}` as each
    /// worker (and then the whole run) finishes — stage authors never
    /// publish these themselves.
    pub fn execute(
        &self,
        conversation_id: impl Into<String>,
        events: Arc<EventBus>,
        input: ElementReceiver,
    ) -> Result<(ElementReceiver, PipelineHandle)> {
        let conversation_id = conversation_id.into();

        let sources: Vec<&str> = self
            .nodes
            .iter()
            .map(|n| n.name.as_str())
            .filter(|n| !self.edges.iter().any(|(_, to)| to == n))
            .collect();
        let terminals: Vec<&str> = self
            .nodes
            .iter()
            .map(|n| n.name.as_str())
            .filter(|n| !self.edges.iter().any(|(from, _)| from == n))
            .collect();
        if sources.len() != 1 {
            return Err(Error::InvalidRequest("pipeline must have exactly one source stage".into()));
        }
        if terminals.len() != 1 {
            return Err(Error::InvalidRequest("pipeline must have exactly one terminal stage".into()));
        }
        let source_name = sources[0].to_string();
        let terminal_name = terminals[0].to_string();

        let cancel = CancellationToken::new();
        let ctx = StageContext::new(conversation_id.clone(), cancel.clone(), events.clone());

        let mut edge_rx: HashMap<(String, String), ElementReceiver> = HashMap::new();
        let mut edge_tx: HashMap<(String, String), ElementSender> = HashMap::new();
        for (from, to) in &self.edges {
            let (tx, rx) = mpsc::channel(self.buffer_size);
            edge_tx.insert((from.clone(), to.clone()), tx);
            edge_rx.insert((from.clone(), to.clone()), rx);
        }

        let (output_tx, output_rx) = mpsc::channel(self.buffer_size);

        events.publish(&conversation_id, EventKind::PipelineStarted);

        let mut join_set: JoinSet<(String, Result<()>)> = JoinSet::new();
        let mut input_opt = Some(input);

        for node in &self.nodes {
            let stage = node.stage.clone();
            let stage_name = node.name.clone();
            let stage_ctx = ctx.clone();

            let outgoing: Vec<ElementSender> = self
                .edges
                .iter()
                .filter(|(from, _)| from == &node.name)
                .map(|(from, to)| edge_tx.get(&(from.clone(), to.clone())).expect("edge sender registered above").clone())
                .collect();

            let stage_output = if node.name == terminal_name {
                output_tx.clone()
            } else if outgoing.len() == 1 {
                outgoing.into_iter().next().expect("checked len == 1")
            } else {
                let (internal_tx, mut internal_rx) = mpsc::channel::<StreamElement>(self.buffer_size);
                tokio::spawn(async move {
                    while let Some(element) = internal_rx.recv().await {
                        for tx in &outgoing {
                            let _ = tx.send(element.clone()).await;
                        }
                    }
                });
                internal_tx
            };

            let incoming: Vec<ElementReceiver> = self
                .edges
                .iter()
                .filter(|(_, to)| to == &node.name)
                .map(|(from, to)| edge_rx.remove(&(from.clone(), to.clone())).expect("edge receiver registered above"))
                .collect();

            let stage_input = if node.name == source_name {
                input_opt.take().expect("exactly one source stage consumes the caller's input")
            } else if incoming.len() == 1 {
                incoming.into_iter().next().expect("checked len == 1")
            } else {
                let (merged_tx, merged_rx) = mpsc::channel::<StreamElement>(self.buffer_size);
                for mut rx in incoming {
                    let merged_tx = merged_tx.clone();
                    tokio::spawn(async move {
                        while let Some(element) = rx.recv().await {
                            let _ = merged_tx.send(element).await;
                        }
                    });
                }
                merged_rx
            };

            let events_for_stage = events.clone();
            let conv_id_for_stage = conversation_id.clone();
            join_set.spawn(async move {
                events_for_stage.publish(&conv_id_for_stage, EventKind::StageStarted { stage: stage_name.clone() });
                let result = stage.process(&stage_ctx, stage_input, stage_output).await;
                match &result {
                    Ok(()) => {
                        events_for_stage.publish(&conv_id_for_stage, EventKind::StageCompleted { stage: stage_name.clone() });
                    }
                    Err(err) => {
                        events_for_stage.publish(
                            &conv_id_for_stage,
                            EventKind::StageFailed {
                                stage: stage_name.clone(),
                                reason: err.to_string(),
                            },
                        );
                    }
                }
                (stage_name, result)
            });
        }
        drop(output_tx);

        let (completion_tx, completion_rx) = oneshot::channel();
        let events_for_supervisor = events;
        let conv_id_for_supervisor = conversation_id;
        tokio::spawn(async move {
            let mut first_error: Option<Error> = None;
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((_name, Ok(()))) => {}
                    Ok((name, Err(err))) => {
                        tracing::warn!(stage = %name, error = %err, "stage returned an error");
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                    Err(join_err) => {
                        if first_error.is_none() {
                            first_error = Some(Error::RuntimeInternal(format!("stage task panicked: {join_err}")));
                        }
                    }
                }
            }
            match &first_error {
                None => events_for_supervisor.publish(&conv_id_for_supervisor, EventKind::PipelineCompleted),
                Some(err) => events_for_supervisor.publish(
                    &conv_id_for_supervisor,
                    EventKind::PipelineFailed { reason: err.to_string() },
                ),
            }
            let _ = completion_tx.send(match first_error {
                None => Ok(()),
                Some(err) => Err(err),
            });
        });

        Ok((
            output_rx,
            PipelineHandle {
                cancel,
                completion: completion_rx,
            },
        ))
    }

    /// `Execute` plus an internal drain that accumulates every emitted
    /// message and the last text seen, then awaits the run's completion.
    pub async fn execute_sync(
        &self,
        conversation_id: impl Into<String>,
        events: Arc<EventBus>,
        elements: Vec<StreamElement>,
    ) -> Result<AggregatedResult> {
        let (input_tx, input_rx) = mpsc::channel(self.buffer_size.max(elements.len()).max(1));
        for element in elements {
            if input_tx.send(element).await.is_err() {
                return Err(Error::RuntimeInternal("pipeline input closed before accepting seed elements".into()));
            }
        }
        drop(input_tx);

        let (mut output_rx, handle) = self.execute(conversation_id, events, input_rx)?;

        let mut aggregated = AggregatedResult::default();
        while let Some(element) = output_rx.recv().await {
            match element.payload {
                ElementPayload::StructuredMessage(message) => aggregated.messages.push(message),
                ElementPayload::Text(text) => aggregated.last_text = Some(text),
                _ => {}
            }
        }
        handle.join().await?;
        Ok(aggregated)
    }
}
