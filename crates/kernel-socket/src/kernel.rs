//! The seam between the transport and the in-process kernel.
//!
//! The transport never owns the kernel; it holds a [`KernelHandle`] whose
//! lifetime exceeds the socket's. Everything the kernel reports while
//! evaluating comes back through the closed [`KernelEvent`] enum, so the
//! bridge's event-to-envelope mapping is checked exhaustively.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use kernel_wire::WireMessage;

use crate::bypass::BypassValue;

/// One pending or in-flight code execution.
///
/// Created when the UI issues an `execute_request`; owned by the queue
/// until dispatched; done once the kernel reports a terminal event.
#[derive(Debug, Clone)]
pub struct EvalJob {
    pub code: String,
    /// The `execute_request` this job answers; all envelopes the job
    /// produces are correlated to it.
    pub parent: WireMessage,
    /// Assigned at admission, 1-based, monotonic per socket.
    pub execution_count: u64,
}

/// Output stream a kernel writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamName::Stdout => "stdout",
            StreamName::Stderr => "stderr",
        }
    }
}

/// Content of a display event.
///
/// `DomNode` and `KernelIframe` carry live references that cannot cross
/// the wire; the bridge parks them on the bypass bus and sends only the
/// handle. `Multiple` is already wire-shaped and passes through verbatim.
pub enum DisplayPayload {
    /// A live DOM node to append to the output area.
    DomNode(BypassValue),
    /// An embedded kernel iframe: serializable markup plus live ports.
    KernelIframe { html: String, ports: BypassValue },
    /// A ready-made media bundle, typically produced by `display()`.
    Multiple(Value),
    /// A tag the bridge does not recognize; logged and dropped.
    Other { display_type: String, content: Value },
}

/// Events a kernel emits while evaluating.
pub enum KernelEvent {
    /// Terminal: the job finished. `result` is present iff the evaluation
    /// produced a value to render.
    Finished {
        parent: Box<WireMessage>,
        execution_count: u64,
        result: Option<Value>,
    },
    /// Terminal: the job failed. Treated as job completion, not as a
    /// transport failure.
    Errored {
        parent: Box<WireMessage>,
        execution_count: u64,
    },
    /// A chunk of stream output; may repeat any number of times per job.
    Output {
        parent: Box<WireMessage>,
        name: StreamName,
        text: String,
    },
    /// The kernel wants a line of input. Sending on `resolver` resumes
    /// the suspended evaluation; dropping it cancels the prompt.
    InputRequest {
        parent: Box<WireMessage>,
        content: Value,
        resolver: oneshot::Sender<Value>,
    },
    /// Rich display request.
    Display {
        parent: Box<WireMessage>,
        payload: DisplayPayload,
    },
    /// Clear the output area of the requesting cell.
    ClearOutput {
        parent: Box<WireMessage>,
        content: Value,
    },
}

/// Completion matches plus the source offset they start at.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub matches: Vec<String>,
    pub cursor_start: u64,
}

/// Handle to the in-process kernel.
#[async_trait]
pub trait KernelHandle: Send + Sync {
    /// Whether the kernel can take requests right now.
    fn is_ready(&self) -> bool;

    /// Wait until the kernel can take requests.
    async fn ready(&self);

    /// Code completion over `source`, already sliced at the cursor.
    /// `None` when the kernel has nothing to offer.
    async fn complete(&self, source: &str) -> Option<Completion>;

    /// Hand a job to the kernel. Fire-and-forget: progress and the
    /// terminal outcome come back as [`KernelEvent`]s.
    fn execute(&self, job: EvalJob);

    /// Subscribe to the kernel's event feed.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<KernelEvent>;
}
