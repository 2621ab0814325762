//! Base64 framing for binary message buffers.
//!
//! The wire format carries binary buffers as base64 strings inside the
//! JSON envelope; in memory they stay [`Bytes`].

use base64::prelude::*;
use bytes::Bytes;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

/// Serialize buffers as a list of base64-encoded strings.
///
/// Used with `#[serde(serialize_with = "serialize_buffers")]`.
pub fn serialize_buffers<S>(buffers: &[Bytes], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(buffers.iter().map(|buffer| BASE64_STANDARD.encode(buffer)))
}

/// Deserialize base64-encoded buffer strings into [`Bytes`].
///
/// A missing or `null` buffer list deserializes as empty.
///
/// Used with `#[serde(default, deserialize_with = "deserialize_buffers")]`.
pub fn deserialize_buffers<'de, D>(deserializer: D) -> Result<Vec<Bytes>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
    encoded
        .into_iter()
        .map(|frame| {
            BASE64_STANDARD
                .decode(frame.as_bytes())
                .map(Bytes::from)
                .map_err(D::Error::custom)
        })
        .collect()
}
