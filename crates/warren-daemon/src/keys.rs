//! Key-file handling.
//!
//! Both the node identity key and the zone key are stored as raw 32-byte
//! seed files inside the data directory, created with a fresh random seed
//! on first start.

use std::path::Path;

use anyhow::Context;
use rand::RngCore;

/// Load a 32-byte seed from `path`, creating it if absent.
pub fn load_or_create_seed(path: &Path) -> anyhow::Result<[u8; 32]> {
    if path.exists() {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading key file {}", path.display()))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!(
                "key file {} has {} bytes, expected 32",
                path.display(),
                bytes.len()
            )
        })?;
        return Ok(seed);
    }

    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, seed)
        .with_context(|| format!("writing key file {}", path.display()))?;
    tracing::info!(path = %path.display(), "generated new key");
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_reload() {
        let dir = std::env::temp_dir().join(format!("warren-key-test-{}", std::process::id()));
        let path = dir.join("zone.key");
        let created = load_or_create_seed(&path).expect("create");
        let reloaded = load_or_create_seed(&path).expect("reload");
        assert_eq!(created, reloaded);
        std::fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn test_wrong_length_rejected() {
        let dir = std::env::temp_dir().join(format!("warren-key-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("short.key");
        std::fs::write(&path, [0u8; 7]).expect("write");
        assert!(load_or_create_seed(&path).is_err());
        std::fs::remove_dir_all(&dir).expect("cleanup");
    }
}
