//! Wire types for the loopback kernel transport.
//!
//! The notebook UI speaks the classic Jupyter envelope shape over what it
//! believes is a WebSocket to a remote kernel. This crate defines that
//! envelope ([`WireMessage`]), the three logical channels multiplexed over
//! the transport, and the [`MessageFactory`] that stamps outgoing
//! envelopes with correlated headers and monotonic message ids.

mod base64;
mod factory;
mod message;

pub use base64::{deserialize_buffers, serialize_buffers};
pub use factory::MessageFactory;
pub use message::{
    deserialize_parent_header, serialize_parent_header, Channel, Header, WireMessage,
};
