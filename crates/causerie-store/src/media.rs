//! Media upload collaborator.
//!
//! Image compression and codec choices live behind this trait in the host
//! application; the core only needs "bytes in, URL out".

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::StoreResult;

/// Raw media handed to the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl MediaPayload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }
}

#[async_trait]
pub trait MediaUploader: Send + Sync + 'static {
    /// Upload the payload and return its public URL.
    async fn upload(&self, payload: MediaPayload) -> StoreResult<String>;
}

/// Test uploader returning stable in-memory URLs.
#[derive(Debug, Default)]
pub struct MemoryUploader {
    count: AtomicU64,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MediaUploader for MemoryUploader {
    async fn upload(&self, payload: MediaPayload) -> StoreResult<String> {
        let n = self.count.fetch_add(1, Ordering::Relaxed);
        Ok(format!("mem://media/{n}.{}", subtype(&payload.content_type)))
    }
}

fn subtype(content_type: &str) -> &str {
    content_type.split_once('/').map(|(_, s)| s).unwrap_or("bin")
}
