//! Maps kernel events onto outbound protocol envelopes.
//!
//! Each event kind translates deterministically to zero or more
//! envelopes, preserving the sequencing the UI relies on: `busy` was
//! already sent when the job was released, any output envelopes follow,
//! and a terminal event produces the `idle` + reply pair before the next
//! job is released.

use std::sync::Arc;

use log::error;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use kernel_wire::{Channel, WireMessage};

use crate::kernel::{DisplayPayload, KernelEvent};
use crate::socket::SocketInner;

/// Drain the kernel's event feed until the socket closes (the task gets
/// aborted) or the kernel drops its sender side.
pub(crate) async fn run(
    inner: Arc<SocketInner>,
    mut events: mpsc::UnboundedReceiver<KernelEvent>,
) {
    while let Some(event) = events.recv().await {
        handle_event(&inner, event);
    }
}

fn handle_event(inner: &Arc<SocketInner>, event: KernelEvent) {
    match event {
        KernelEvent::Finished {
            parent,
            execution_count,
            result,
        } => {
            if let Some(data) = result {
                let message = inner.format(
                    Some(&parent),
                    "execute_result",
                    json!({
                        "execution_count": execution_count,
                        "data": data,
                        "metadata": {},
                    }),
                    Some(Channel::Iopub),
                );
                inner.deliver(message);
            }
            finish_job(inner, &parent, execution_count);
        }
        KernelEvent::Errored {
            parent,
            execution_count,
        } => {
            let message = inner.format(
                Some(&parent),
                "error",
                json!({"execution_count": execution_count, "metadata": {}}),
                Some(Channel::Iopub),
            );
            inner.deliver(message);
            finish_job(inner, &parent, execution_count);
        }
        KernelEvent::Output { parent, name, text } => {
            let message = inner.format(
                Some(&parent),
                "stream",
                json!({"name": name.as_str(), "text": text}),
                Some(Channel::Iopub),
            );
            inner.deliver(message);
        }
        KernelEvent::InputRequest {
            parent,
            content,
            resolver,
        } => {
            inner.store_input_resolver(resolver);
            let message = inner.format(Some(&parent), "input_request", content, Some(Channel::Stdin));
            inner.deliver(message);
        }
        KernelEvent::Display { parent, payload } => {
            let Some(data) = display_data(inner, payload) else {
                return;
            };
            let message = inner.format(
                Some(&parent),
                "display_data",
                json!({"data": data, "metadata": {}, "transient": {}}),
                Some(Channel::Iopub),
            );
            inner.deliver(message);
        }
        KernelEvent::ClearOutput { parent, content } => {
            let message = inner.format(Some(&parent), "clear_output", content, Some(Channel::Iopub));
            inner.deliver(message);
        }
    }
}

/// Terminal sequence shared by success and error: `idle`, the
/// `execute_reply`, then release the next job.
fn finish_job(inner: &Arc<SocketInner>, parent: &WireMessage, execution_count: u64) {
    inner.send_idle(parent);
    let reply = inner.format(
        Some(parent),
        "execute_reply",
        json!({"execution_count": execution_count, "metadata": {}}),
        Some(Channel::Shell),
    );
    inner.deliver(reply);
    inner.advance_queue();
}

/// Media bundle for a display event; `None` means nothing is sent.
fn display_data(inner: &Arc<SocketInner>, payload: DisplayPayload) -> Option<Value> {
    match payload {
        DisplayPayload::DomNode(node) => {
            // The live node cannot be serialized at all; park it and emit
            // a script that resolves the handle on the rendering side.
            let id = inner.bypass().push(node);
            Some(json!({
                "application/javascript":
                    format!("element.append(window._kernelBypassBus.pop({id}));"),
            }))
        }
        DisplayPayload::KernelIframe { html, ports } => {
            let key = inner.bypass().push(ports);
            let descriptor = json!({"key": key, "html": html});
            Some(json!({"text/json-kernel-iframe": descriptor.to_string()}))
        }
        DisplayPayload::Multiple(content) => Some(content),
        DisplayPayload::Other { display_type, .. } => {
            error!("unrecognized display type: {display_type}");
            None
        }
    }
}
