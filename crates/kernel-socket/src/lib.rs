//! A loopback stand-in for the notebook UI's kernel WebSocket.
//!
//! The UI is written against a socket it believes reaches a remote kernel
//! over the network. Here the kernel runs in the same process, so this
//! crate impersonates that socket: it reproduces the shell/iopub/stdin
//! envelope traffic message-for-message while serializing executions
//! against a kernel that runs one thing at a time and emits asynchronous
//! side-channel events (stream output, rich displays, input prompts).
//!
//! The moving parts:
//!
//! - [`KernelSocket`] — the facade exposing `send`/`close`/`ready_state`
//!   and the `on_open`/`on_close`/`on_message` callbacks;
//! - [`KernelHandle`] — the seam to the in-process kernel, with a closed
//!   [`KernelEvent`] enum instead of stringly-typed event names;
//! - an internal FIFO evaluation queue guaranteeing at most one execution
//!   in flight;
//! - [`BypassBus`] — integer handles for values that cannot cross the
//!   JSON wire format at all (live DOM nodes, message ports).

mod bridge;
mod bypass;
mod kernel;
mod queue;
mod socket;

pub use bypass::{BypassBus, BypassValue};
pub use kernel::{Completion, DisplayPayload, EvalJob, KernelEvent, KernelHandle, StreamName};
pub use socket::{KernelSocket, SocketError, CLOSED, OPEN};
