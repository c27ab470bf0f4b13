//! Content loading: read a candidate file into text plus a fingerprint.
//!
//! Gzip containers (manual pages) are detected by their magic bytes and
//! decompressed transparently. Invalid UTF-8 is replaced rather than
//! rejected, so a document never fails to load because of its encoding.
//!
//! The content hash is the SHA-256 of the bytes as stored on disk, for
//! every source type. For a manual page that is the compressed file.

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::error::LoadError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A decoded document body and the fingerprint of its source bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub text: String,
    /// Hex-encoded SHA-256 of the raw file bytes.
    pub content_hash: String,
}

/// Read `path`, decompressing gzip content, and fingerprint it.
pub fn load(path: &Path) -> Result<LoadedDocument, LoadError> {
    let raw = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let content_hash = hex::encode(Sha256::digest(&raw));

    let text = if raw.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|source| LoadError::Decompress {
                path: path.to_path_buf(),
                source,
            })?;
        decode_lossy(decoded)
    } else {
        decode_lossy(raw)
    };

    Ok(LoadedDocument { text, content_hash })
}

/// Read a file as text, replacing invalid UTF-8. No decompression.
pub fn read_text_lossy(path: &Path) -> Result<String, LoadError> {
    std::fs::read(path)
        .map(decode_lossy)
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn decode_lossy(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn plain_file_hash_is_sha256_of_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hostname");
        std::fs::write(&path, "archbox\n").unwrap();

        let doc = load(&path).unwrap();
        assert_eq!(doc.text, "archbox\n");
        assert_eq!(doc.content_hash, hex::encode(Sha256::digest(b"archbox\n")));
        assert_eq!(doc.content_hash.len(), 64);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.conf");
        std::fs::write(&path, b"caf\xe9 = yes\n").unwrap();

        let doc = load(&path).unwrap();
        assert!(doc.text.starts_with("caf"));
        assert!(doc.text.contains('\u{FFFD}'));
        assert!(doc.text.ends_with("= yes\n"));
    }

    #[test]
    fn gzip_is_decompressed_and_hash_covers_compressed_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ls.1.gz");
        let compressed = gzip(b".TH LS 1\n.SH NAME\nls \\- list directory contents\n");
        std::fs::write(&path, &compressed).unwrap();

        let doc = load(&path).unwrap();
        assert!(doc.text.starts_with(".TH LS 1"));
        assert!(doc.text.contains("list directory contents"));
        assert_eq!(doc.content_hash, hex::encode(Sha256::digest(&compressed)));
    }

    #[test]
    fn corrupt_gzip_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.1.gz");
        let mut bytes = gzip(b"some manual page text that is long enough");
        bytes.truncate(12);
        std::fs::write(&path, &bytes).unwrap();

        match load(&path) {
            Err(LoadError::Decompress { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected decompress error, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vanished");
        let err = load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert_eq!(err.path(), path.as_path());
    }

    #[test]
    fn read_text_lossy_does_not_decompress() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain notes").unwrap();
        assert_eq!(read_text_lossy(&path).unwrap(), "plain notes");
    }
}
