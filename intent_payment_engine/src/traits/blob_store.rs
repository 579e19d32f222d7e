use blake2::{digest::consts::U32, Blake2b, Digest};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BlobStoreError {
    #[error("Blob store unavailable: {0}")]
    Unavailable(String),
    #[error("No blob pinned at {0}")]
    NotFound(String),
}

/// A pinned blob's address: its content hash and a URI where it can be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedBlob {
    pub content_hash: String,
    pub uri: String,
}

/// Opaque content-addressed storage for action transcripts referenced by receipts.
///
/// Content addressing makes pinning idempotent: identical transcripts yield identical hashes, so a receipt hash
/// commits to exactly one transcript and a retried payment attempt can reuse it unchanged.
#[allow(async_fn_in_trait)]
pub trait BlobStore: Clone + Send + Sync {
    fn pin(&self, blob: &[u8]) -> impl std::future::Future<Output = Result<PinnedBlob, BlobStoreError>> + Send;

    fn fetch(&self, uri: &str) -> impl std::future::Future<Output = Result<Vec<u8>, BlobStoreError>> + Send;
}

/// The canonical content hash for transcripts: hex-encoded 32-byte blake2b.
pub fn content_hash(blob: &[u8]) -> String {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(blob);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(2 + digest.len() * 2);
    out.push_str("0x");
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let a = content_hash(b"agent purchased 3 widgets");
        let b = content_hash(b"agent purchased 3 widgets");
        let c = content_hash(b"agent purchased 4 widgets");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 66);
    }
}
