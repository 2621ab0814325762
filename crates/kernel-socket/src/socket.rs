//! The socket-shaped facade the notebook UI connects to.
//!
//! [`KernelSocket`] mimics a WebSocket: `send` takes raw JSON frames,
//! replies come back through the `on_message` callback exactly as a real
//! socket would push them, and `on_open` fires after an emulated
//! handshake delay. Internally, `send` dispatches on `(channel,
//! msg_type)`: liveness probes are answered locally, execute requests go
//! through the FIFO evaluation queue, completion requests query the
//! kernel, input replies resume a suspended evaluation.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use kernel_wire::{Channel, MessageFactory, WireMessage};

use crate::bridge;
use crate::bypass::BypassBus;
use crate::kernel::{EvalJob, KernelHandle};
use crate::queue::EvalQueue;

/// `readyState` values mirroring the WebSocket constants the UI checks.
pub const CLOSED: u8 = 0;
pub const OPEN: u8 = 1;

/// Emulated network handshake latency before `on_open` fires.
const HANDSHAKE_DELAY: Duration = Duration::from_millis(500);

/// Errors surfaced to the caller of [`KernelSocket::send`].
#[derive(Debug, Error)]
pub enum SocketError {
    /// The frame was not a parseable protocol message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;
type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_open: Option<LifecycleCallback>,
    on_close: Option<LifecycleCallback>,
    on_message: Option<MessageCallback>,
}

pub(crate) struct SocketInner {
    url: String,
    ready_state: AtomicU8,
    factory: Mutex<MessageFactory>,
    queue: Mutex<EvalQueue>,
    bypass: Arc<BypassBus>,
    kernel: Mutex<Option<Arc<dyn KernelHandle>>>,
    execution_count: AtomicU64,
    input_resolver: Mutex<Option<oneshot::Sender<Value>>>,
    callbacks: Mutex<Callbacks>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// A fake WebSocket wired to an in-process kernel.
pub struct KernelSocket {
    inner: Arc<SocketInner>,
}

impl KernelSocket {
    /// Open the emulated connection. Must be called on a Tokio runtime.
    ///
    /// `kernel` resolves to the kernel handle once the in-process kernel
    /// has loaded; until then execute requests pile up in the queue. A
    /// failed resolution is suppressed rather than propagated: the load
    /// failure has already been surfaced to the user by the layer that
    /// owns kernel start-up, and a second report from here would be
    /// noise.
    pub fn connect<F>(url: impl Into<String>, kernel: F) -> Self
    where
        F: Future<Output = anyhow::Result<Arc<dyn KernelHandle>>> + Send + 'static,
    {
        let inner = Arc::new(SocketInner {
            url: url.into(),
            ready_state: AtomicU8::new(OPEN),
            factory: Mutex::new(MessageFactory::new()),
            queue: Mutex::new(EvalQueue::new()),
            bypass: Arc::new(BypassBus::new()),
            kernel: Mutex::new(None),
            execution_count: AtomicU64::new(0),
            input_resolver: Mutex::new(None),
            callbacks: Mutex::new(Callbacks::default()),
            tasks: Mutex::new(Vec::new()),
        });

        let opener = {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                tokio::time::sleep(HANDSHAKE_DELAY).await;
                if inner.ready_state.load(Ordering::SeqCst) == OPEN {
                    if let Some(on_open) = inner.callback(|callbacks| callbacks.on_open.clone()) {
                        on_open();
                    }
                }
            })
        };

        let starter = {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let kernel = match kernel.await {
                    Ok(kernel) => kernel,
                    Err(err) => {
                        debug!("kernel hand-off failed, transport stays silent: {err:#}");
                        return;
                    }
                };

                *inner.kernel.lock().expect("kernel slot poisoned") = Some(Arc::clone(&kernel));

                let events = kernel.subscribe();
                let bridge_task = tokio::spawn(bridge::run(Arc::clone(&inner), events));
                inner.track_task(bridge_task);

                kernel.ready().await;
                inner.advance_queue();
            })
        };

        inner.track_task(opener);
        inner.track_task(starter);

        Self { inner }
    }

    /// Connect with an already-resolved kernel handle.
    pub fn with_kernel(url: impl Into<String>, kernel: Arc<dyn KernelHandle>) -> Self {
        Self::connect(url, async move { Ok(kernel) })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// `OPEN` until [`KernelSocket::close`] is called, `CLOSED` after.
    pub fn ready_state(&self) -> u8 {
        self.inner.ready_state.load(Ordering::SeqCst)
    }

    /// The bypass bus for this transport. The rendering layer resolves
    /// display handles against it.
    pub fn bypass(&self) -> Arc<BypassBus> {
        Arc::clone(&self.inner.bypass)
    }

    pub fn set_on_open(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.with_callbacks(|callbacks| callbacks.on_open = Some(Arc::new(callback)));
    }

    pub fn set_on_close(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.with_callbacks(|callbacks| callbacks.on_close = Some(Arc::new(callback)));
    }

    /// Register the frame consumer. Each delivered frame is one
    /// serialized envelope, exactly what a real socket would push.
    pub fn set_on_message(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.with_callbacks(|callbacks| callbacks.on_message = Some(Arc::new(callback)));
    }

    /// Feed one frame from the UI into the transport.
    ///
    /// Malformed JSON is returned to the caller. Recognized requests are
    /// answered or enqueued; unknown `(channel, msg_type)` pairs are
    /// ignored without error.
    pub fn send(&self, raw: &str) -> Result<(), SocketError> {
        let message: WireMessage = serde_json::from_str(raw)?;
        self.inner.dispatch(message);
        Ok(())
    }

    /// Close the transport: fire `on_close`, stop all further delivery,
    /// and drop the kernel event subscription. An in-flight evaluation is
    /// not aborted; its output simply has nowhere to go anymore.
    pub fn close(&self) {
        let was_open = self.inner.ready_state.swap(CLOSED, Ordering::SeqCst) == OPEN;
        if was_open {
            if let Some(on_close) = self.inner.callback(|callbacks| callbacks.on_close.clone()) {
                on_close();
            }
        }
        for task in self
            .inner
            .tasks
            .lock()
            .expect("task list poisoned")
            .drain(..)
        {
            task.abort();
        }
    }
}

impl SocketInner {
    fn track_task(&self, task: JoinHandle<()>) {
        self.tasks.lock().expect("task list poisoned").push(task);
    }

    fn with_callbacks(&self, update: impl FnOnce(&mut Callbacks)) {
        update(&mut self.callbacks.lock().expect("callbacks poisoned"));
    }

    fn callback<T>(&self, pick: impl FnOnce(&Callbacks) -> Option<T>) -> Option<T> {
        pick(&self.callbacks.lock().expect("callbacks poisoned"))
    }

    pub(crate) fn bypass(&self) -> &BypassBus {
        &self.bypass
    }

    pub(crate) fn format(
        &self,
        parent: Option<&WireMessage>,
        msg_type: &str,
        content: Value,
        channel: Option<Channel>,
    ) -> WireMessage {
        self.factory
            .lock()
            .expect("message factory poisoned")
            .format(parent, msg_type, content, channel)
    }

    /// Push one envelope to the UI. A closed socket swallows it.
    pub(crate) fn deliver(&self, message: WireMessage) {
        if self.ready_state.load(Ordering::SeqCst) != OPEN {
            return;
        }
        let Some(on_message) = self.callback(|callbacks| callbacks.on_message.clone()) else {
            return;
        };
        match serde_json::to_string(&message) {
            Ok(frame) => on_message(&frame),
            Err(err) => error!("failed to serialize outgoing envelope: {err}"),
        }
    }

    pub(crate) fn send_busy(&self, parent: &WireMessage) {
        let message = self
            .factory
            .lock()
            .expect("message factory poisoned")
            .status_busy(Some(parent));
        self.deliver(message);
    }

    pub(crate) fn send_idle(&self, parent: &WireMessage) {
        let message = self
            .factory
            .lock()
            .expect("message factory poisoned")
            .status_idle(Some(parent));
        self.deliver(message);
    }

    pub(crate) fn store_input_resolver(&self, resolver: oneshot::Sender<Value>) {
        // At most one prompt is outstanding; the latest resolver wins and
        // the previous one is dropped, cancelling its prompt.
        *self.input_resolver.lock().expect("input resolver poisoned") = Some(resolver);
    }

    fn dispatch(self: &Arc<Self>, message: WireMessage) {
        let Some(channel) = message.channel else {
            return;
        };
        match (channel, message.header.msg_type.as_str()) {
            (Channel::Shell, "kernel_info_request") => self.answer_kernel_info(message),
            (Channel::Shell, "execute_request") => self.enqueue_execute(message),
            (Channel::Shell, "complete_request") => self.answer_completion(message),
            (Channel::Stdin, "input_reply") => self.resolve_input(message),
            _ => {}
        }
    }

    /// Liveness probe: answered locally, no kernel round-trip.
    fn answer_kernel_info(&self, request: WireMessage) {
        self.send_busy(&request);
        self.send_idle(&request);
        let reply = self.format(
            Some(&request),
            "kernel_info_reply",
            json!({"status": "ok"}),
            Some(Channel::Shell),
        );
        self.deliver(reply);
    }

    fn enqueue_execute(self: &Arc<Self>, request: WireMessage) {
        let code = request
            .content
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let execution_count = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;
        let job = EvalJob {
            code,
            parent: request,
            execution_count,
        };
        let advance = self
            .queue
            .lock()
            .expect("eval queue poisoned")
            .push(job);
        if advance {
            self.advance_queue();
        }
    }

    /// Release the next queued job, if any.
    ///
    /// The `busy` status and `execute_input` echo go out synchronously,
    /// then the task yields once to the scheduler before waiting on
    /// kernel readiness and handing the job over. The yield is
    /// load-bearing: it lets the output area's rendering interleave
    /// correctly when a whole notebook is submitted at once.
    pub(crate) fn advance_queue(self: &Arc<Self>) {
        let Some(job) = self
            .queue
            .lock()
            .expect("eval queue poisoned")
            .take_next()
        else {
            return;
        };

        self.send_busy(&job.parent);
        let echo = self.format(
            Some(&job.parent),
            "execute_input",
            json!({"code": job.code, "execution_count": job.execution_count}),
            Some(Channel::Iopub),
        );
        self.deliver(echo);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let kernel = inner
                .kernel
                .lock()
                .expect("kernel slot poisoned")
                .clone();
            let Some(kernel) = kernel else {
                // The queue only starts after the hand-off stores the
                // handle, so this is unreachable in practice.
                debug!("job released with no kernel attached; dropping");
                return;
            };
            kernel.ready().await;
            kernel.execute(job);
        });
    }

    fn answer_completion(self: &Arc<Self>, request: WireMessage) {
        // Readiness gate before any envelope goes out: a completion
        // against a kernel that is still loading produces no traffic at
        // all, and the UI tolerates a request that never completes.
        let kernel = match &*self.kernel.lock().expect("kernel slot poisoned") {
            Some(kernel) if kernel.is_ready() => Arc::clone(kernel),
            _ => return,
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.send_busy(&request);

            let cursor_pos = request
                .content
                .get("cursor_pos")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            let code = request
                .content
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let source: String = code.chars().take(cursor_pos).collect();

            let Some(completion) = kernel.complete(&source).await else {
                return;
            };
            if completion.matches.is_empty() {
                return;
            }

            let reply = inner.format(
                Some(&request),
                "complete_reply",
                json!({
                    "status": "ok",
                    "matches": completion.matches,
                    "cursor_start": completion.cursor_start,
                    // Left null so the consumer computes it from the
                    // cursor; a fixed value breaks chained completions.
                    "cursor_end": Value::Null,
                }),
                Some(Channel::Shell),
            );
            inner.deliver(reply);
            inner.send_idle(&request);
        });
    }

    fn resolve_input(&self, reply: WireMessage) {
        // Orphan replies with no prompt outstanding are a no-op.
        if let Some(resolver) = self
            .input_resolver
            .lock()
            .expect("input resolver poisoned")
            .take()
        {
            let value = reply.content.get("value").cloned().unwrap_or(Value::Null);
            let _ = resolver.send(value);
        }
    }
}
