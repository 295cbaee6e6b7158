//! Streaming SHA-256 content hashing.
//!
//! The hash of a file's bytes is the sole key into the object pool, so it
//! must depend on content only — never on filename, bucket, or timestamps.

use crate::utils::errors::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Compute the hex-encoded SHA-256 digest of a file, streaming it through
/// the hasher in fixed-size chunks.
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_known_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let hash = hash_file(&path).await.unwrap();
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_identical_content_different_names() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("deeply-renamed.jpg");
        tokio::fs::write(&a, b"same bytes").await.unwrap();
        tokio::fs::write(&b, b"same bytes").await.unwrap();

        assert_eq!(hash_file(&a).await.unwrap(), hash_file(&b).await.unwrap());
    }

    #[tokio::test]
    async fn test_streams_large_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        // Larger than one read buffer so the loop takes multiple passes.
        let data = vec![0xabu8; READ_BUF_SIZE * 3 + 17];
        tokio::fs::write(&path, &data).await.unwrap();

        let streamed = hash_file(&path).await.unwrap();
        let direct = hex::encode(Sha256::digest(&data));
        assert_eq!(streamed, direct);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = hash_file(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, crate::utils::errors::EngineError::Io(_)));
    }
}
