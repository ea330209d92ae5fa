//! # Fragment Format
//!
//! Binary cache entries for per-unit table fragments.
//!
//! A fragment file is the magic `PFRG`, one format version byte and the
//! postcard-encoded [`Table`]. The size limit, magic and version are all
//! checked before the payload is decoded.
//!
//! Writes go through a temporary sibling and a rename, so a fragment at its
//! canonical path is always complete.

use crate::path::partial_path;
use crate::primitives::{FRAGMENT_MAGIC, FRAGMENT_VERSION, MAX_FRAGMENT_SIZE};
use crate::table::Table;
use crate::PipelineError;
use std::path::Path;

// =============================================================================
// SERIALIZATION
// =============================================================================

/// Encode a fragment: magic, version byte, then the postcard payload.
pub fn fragment_to_bytes(fragment: &Table) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = FRAGMENT_MAGIC.to_vec();
    bytes.push(FRAGMENT_VERSION);
    postcard::to_extend(fragment, bytes)
        .map_err(|e| PipelineError::SerializationError(format!("fragment encoding: {e}")))
}

/// Decode a fragment written by [`fragment_to_bytes`].
///
/// A fragment from another format version is an error rather than a
/// migration; the caller recomputes it from the statistics report.
pub fn fragment_from_bytes(bytes: &[u8]) -> Result<Table, PipelineError> {
    if bytes.len() as u64 > MAX_FRAGMENT_SIZE {
        return Err(PipelineError::SerializationError(format!(
            "fragment of {} bytes is over the {} byte limit",
            bytes.len(),
            MAX_FRAGMENT_SIZE
        )));
    }

    let Some((magic, rest)) = bytes.split_first_chunk::<4>() else {
        return Err(PipelineError::SerializationError(
            "not a fragment: shorter than its magic".to_string(),
        ));
    };
    if magic != FRAGMENT_MAGIC {
        return Err(PipelineError::SerializationError(
            "not a fragment: magic mismatch".to_string(),
        ));
    }
    match rest.split_first() {
        Some((&FRAGMENT_VERSION, payload)) => postcard::from_bytes(payload)
            .map_err(|e| PipelineError::SerializationError(format!("fragment payload: {e}"))),
        Some((version, _)) => Err(PipelineError::SerializationError(format!(
            "fragment format {version}, this build reads {FRAGMENT_VERSION}"
        ))),
        None => Err(PipelineError::SerializationError(
            "fragment has no version byte".to_string(),
        )),
    }
}

// =============================================================================
// FILE I/O
// =============================================================================

/// Write a fragment to `path` through a temporary sibling.
pub fn write_fragment(path: &Path, fragment: &Table) -> Result<(), PipelineError> {
    let bytes = fragment_to_bytes(fragment)?;
    let partial = partial_path(path);
    std::fs::write(&partial, &bytes).map_err(|e| PipelineError::io(&partial, &e))?;
    std::fs::rename(&partial, path).map_err(|e| PipelineError::io(path, &e))
}

/// Read a fragment from `path`.
///
/// The file size is checked against the limit before it is read.
pub fn read_fragment(path: &Path) -> Result<Table, PipelineError> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::FileNotFound(path.to_path_buf()),
        _ => PipelineError::io(path, &e),
    })?;
    if metadata.len() > MAX_FRAGMENT_SIZE {
        return Err(PipelineError::SerializationError(format!(
            "Fragment {} of {} bytes exceeds maximum allowed {} bytes",
            path.display(),
            metadata.len(),
            MAX_FRAGMENT_SIZE
        )));
    }
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, &e))?;
    fragment_from_bytes(&bytes)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::table::RowKey;

    fn sample() -> Table {
        let key = RowKey {
            subject: "01".into(),
            session: "01".into(),
            source: "sub-01_ses-01_T1w".into(),
            region_group: "subcortex".into(),
            region: "17".into(),
        };
        let mut table = Table::new();
        table.set(key.clone(), "volume", Some("4211.5".into()));
        table.set(key, "std", None);
        table
    }

    #[test]
    fn encoding_starts_with_magic_and_version() {
        let bytes = fragment_to_bytes(&sample()).unwrap();
        assert_eq!(&bytes[0..4], b"PFRG");
        assert_eq!(bytes[4], FRAGMENT_VERSION);
        let payload = postcard::to_stdvec(&sample()).unwrap();
        assert_eq!(&bytes[5..], payload.as_slice());
    }

    #[test]
    fn serialization_is_deterministic() {
        let a = fragment_to_bytes(&sample()).unwrap();
        let b = fragment_to_bytes(&sample()).unwrap();
        assert_eq!(a, b);
        assert_eq!(fragment_from_bytes(&a).unwrap(), sample());
    }

    #[test]
    fn rejects_bad_header() {
        let mut bytes = fragment_to_bytes(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            fragment_from_bytes(&bytes),
            Err(PipelineError::SerializationError(_))
        ));

        let mut bytes = fragment_to_bytes(&sample()).unwrap();
        bytes[4] = FRAGMENT_VERSION + 1;
        assert!(fragment_from_bytes(&bytes).is_err());

        assert!(fragment_from_bytes(b"PF").is_err());
        assert!(fragment_from_bytes(b"PFRG").is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let bytes = fragment_to_bytes(&sample()).unwrap();
        assert!(fragment_from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn file_roundtrip_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lh_area.x.fragment");

        write_fragment(&path, &sample()).unwrap();
        assert!(!partial_path(&path).exists());
        assert_eq!(read_fragment(&path).unwrap(), sample());
    }

    #[test]
    fn missing_fragment_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_fragment(&dir.path().join("absent.fragment"));
        assert!(matches!(result, Err(PipelineError::FileNotFound(_))));
    }
}
