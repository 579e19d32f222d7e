use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::traits::{content_hash, BlobStore, BlobStoreError, PinnedBlob};

/// Content-addressed blob storage backed by a map. Pinning the same bytes twice yields the same address, exactly
/// like the real pinning service.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn pin(&self, blob: &[u8]) -> Result<PinnedBlob, BlobStoreError> {
        let content_hash = content_hash(blob);
        let uri = format!("memory://{content_hash}");
        self.blobs.lock().unwrap().insert(uri.clone(), blob.to_vec());
        Ok(PinnedBlob { content_hash, uri })
    }

    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.blobs.lock().unwrap().get(uri).cloned().ok_or_else(|| BlobStoreError::NotFound(uri.to_string()))
    }
}
