//! Resource Codec - Encoded Payloads to Local Handles
//!
//! Decoded bytes live in a `ResourceStore`; callers only ever hold
//! `ResourceHandle`s, which stay valid until released.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed {media_type} payload: {source}")]
    Decode {
        media_type: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Opaque reference to a decoded asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    id: Uuid,
    media_type: String,
}

impl ResourceHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Locator string, stable for the handle's lifetime.
    pub fn locator(&self) -> String {
        format!("resource:{}", self.id)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource:{}", self.id)
    }
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Resource {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Strict standard-alphabet base64 decode.
pub fn decode_payload(payload: &str, media_type: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD.decode(payload).map_err(|source| CodecError::Decode {
        media_type: media_type.to_string(),
        source,
    })
}

pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Owner of every live decoded resource.
#[derive(Debug, Default)]
pub struct ResourceStore {
    live: HashMap<Uuid, Resource>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, payload: &str, media_type: &str) -> Result<ResourceHandle, CodecError> {
        let bytes = decode_payload(payload, media_type)?;
        let handle = ResourceHandle {
            id: Uuid::new_v4(),
            media_type: media_type.to_string(),
        };
        tracing::trace!(handle = %handle, bytes = bytes.len(), "resource decoded");
        self.live.insert(
            handle.id,
            Resource {
                media_type: media_type.to_string(),
                bytes,
            },
        );
        Ok(handle)
    }

    pub fn resolve(&self, handle: &ResourceHandle) -> Option<&Resource> {
        self.live.get(&handle.id)
    }

    pub fn is_live(&self, handle: &ResourceHandle) -> bool {
        self.live.contains_key(&handle.id)
    }

    /// Release handles. Absent or already released handles are skipped.
    ///
    /// Returns the number of resources actually freed.
    pub fn release<'a, I, H>(&mut self, handles: I) -> usize
    where
        I: IntoIterator<Item = H>,
        H: Into<Option<&'a ResourceHandle>>,
    {
        let mut freed = 0;
        for handle in handles {
            let handle: Option<&ResourceHandle> = handle.into();
            let Some(handle) = handle else { continue };
            if self.live.remove(&handle.id).is_some() {
                tracing::trace!(handle = %handle, "resource released");
                freed += 1;
            }
        }
        freed
    }

    pub fn release_all(&mut self) -> usize {
        let freed = self.live.len();
        self.live.clear();
        freed
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
