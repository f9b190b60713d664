use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::SyncError;

const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 of some content. Two contents are treated as identical iff their
/// hashes are equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// First eight hex characters, used to tag versioned files.
    pub fn short(&self) -> String {
        self.to_string()[..8].to_owned()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

pub fn digest(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    for chunk in content.chunks(CHUNK_SIZE) {
        hasher.update(chunk);
    }
    ContentHash(hasher.finalize().into())
}

pub async fn digest_file(path: &Path) -> Result<ContentHash, SyncError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| SyncError::io("checksum open error", path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| SyncError::io("checksum read error", path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(ContentHash(hasher.finalize().into()))
}
