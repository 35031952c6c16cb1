//! The `NodeLogic`/`Node<L>` split: a thin orchestration wrapper (spawn
//! children, race a `CancellationToken` against the node's own `process`,
//! tear down in a fixed order, call `cleanup(reason)`) around swappable
//! business logic. This pipeline is a flat three-node chain (source →
//! decode/resample → sink), never a tree, so `register` just appends the
//! single child.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::frame::PipelinePayload;

#[derive(Debug, Clone)]
pub enum StopReason {
    Completed,
    Cancelled,
    ChildFinished,
    Error(Arc<PipelineError>),
}

/// The business logic of one node: receive frames (sources get `None`),
/// process them, forward to `output`, watch `stop_token` for cooperative
/// cancellation. `cleanup` runs exactly once per node, whatever the reason.
#[async_trait::async_trait]
pub trait NodeLogic: Send + 'static {
    async fn process(
        &mut self,
        input: Option<mpsc::Receiver<PipelinePayload>>,
        output: Vec<mpsc::Sender<PipelinePayload>>,
        stop_token: CancellationToken,
    ) -> Result<(), PipelineError>;

    async fn cleanup(&mut self, _reason: StopReason) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait PipelineNode: Send + 'static {
    fn get_tx(&self) -> Option<mpsc::Sender<PipelinePayload>>;
    fn register(&mut self, child: Box<dyn PipelineNode>);
    async fn run(self: Box<Self>, stop_token: CancellationToken) -> Result<(), PipelineError>;
}

pub struct PipelineHandle {
    stop_token: CancellationToken,
    join_handle: JoinHandle<Result<(), PipelineError>>,
}

impl PipelineHandle {
    pub fn cancel(&self) {
        self.stop_token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.stop_token.clone()
    }

    pub async fn wait(self) -> Result<(), PipelineError> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::DecoderFailed(format!("pipeline task did not complete cleanly: {e}"))),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

/// Generic orchestration wrapper around any `NodeLogic`.
pub struct Node<L: NodeLogic> {
    logic: L,
    rx: Option<mpsc::Receiver<PipelinePayload>>,
    tx: Option<mpsc::Sender<PipelinePayload>>,
    children: Vec<Box<dyn PipelineNode>>,
    child_txs: Vec<mpsc::Sender<PipelinePayload>>,
}

const CHANNEL_CAPACITY: usize = 16;

impl<L: NodeLogic> Node<L> {
    /// A source node: no input channel.
    pub fn source(logic: L) -> Self {
        Self { logic, rx: None, tx: None, children: Vec::new(), child_txs: Vec::new() }
    }

    /// An internal/sink node: has an input channel callers push into via `get_tx`.
    pub fn with_input(logic: L) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self { logic, rx: Some(rx), tx: Some(tx), children: Vec::new(), child_txs: Vec::new() }
    }
}

#[async_trait::async_trait]
impl<L: NodeLogic> PipelineNode for Node<L> {
    fn get_tx(&self) -> Option<mpsc::Sender<PipelinePayload>> {
        self.tx.clone()
    }

    fn register(&mut self, child: Box<dyn PipelineNode>) {
        if let Some(tx) = child.get_tx() {
            self.child_txs.push(tx);
        }
        self.children.push(child);
    }

    async fn run(mut self: Box<Self>, stop_token: CancellationToken) -> Result<(), PipelineError> {
        let child_token = stop_token.clone();
        let mut child_handles: Vec<JoinHandle<Result<(), PipelineError>>> = Vec::new();
        for child in std::mem::take(&mut self.children) {
            let token = child_token.clone();
            child_handles.push(tokio::spawn(async move { child.run(token).await }));
        }

        let outputs = std::mem::take(&mut self.child_txs);
        let result = self.logic.process(self.rx.take(), outputs, stop_token.clone()).await;

        // Descendant propagation: our own exit, whatever the cause, cancels
        // every child so nothing is left streaming into a dead sink.
        stop_token.cancel();

        let mut child_errors = Vec::new();
        for handle in child_handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => child_errors.push(e.to_string()),
                Err(e) => child_errors.push(format!("child task panicked: {e}")),
            }
        }

        let reason = match &result {
            Ok(()) if stop_token.is_cancelled() => StopReason::Cancelled,
            Ok(()) => StopReason::Completed,
            Err(e) => StopReason::Error(Arc::new(clone_err(e))),
        };
        self.logic.cleanup(reason).await?;

        if let Err(e) = result {
            return Err(e);
        }
        if !child_errors.is_empty() {
            return Err(PipelineError::DecoderFailed(child_errors.join("; ")));
        }
        Ok(())
    }
}

/// Spawns the root node into its own task and returns a handle to control it.
pub fn start_pipeline(node: Box<dyn PipelineNode>) -> PipelineHandle {
    let stop_token = CancellationToken::new();
    let token_for_task = stop_token.clone();
    let join_handle = tokio::spawn(async move { node.run(token_for_task).await });
    PipelineHandle { stop_token, join_handle }
}

fn clone_err(e: &PipelineError) -> PipelineError {
    // `PipelineError` isn't `Clone` (it wraps opaque I/O/process errors);
    // `cleanup` only needs to know the *kind* of failure, so re-stringify.
    PipelineError::DecoderFailed(e.to_string())
}
