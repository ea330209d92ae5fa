//! # Pipeline Primitives
//!
//! Hardcoded runtime constants for the parcelflow pipeline.
//!
//! These describe the filesystem layout contract shared with the external
//! toolkit and the on-disk cache format. They are compiled into the binary
//! and immutable at runtime.

/// Directory prefix for subject directories (`sub-<label>`).
pub const SUBJECT_PREFIX: &str = "sub-";

/// Directory prefix for session directories (`ses-<label>`).
pub const SESSION_PREFIX: &str = "ses-";

/// Datatype directory holding reconstructed anatomical sources.
pub const ANATOMICAL_DIR: &str = "anat";

/// Separator between entity components of a filename.
pub const ENTITY_DELIMITER: char = '_';

/// Separator between an entity key and its value (`ses-01`).
pub const KEY_VALUE_DELIMITER: char = '-';

/// Destination subdirectory of cortical annotations.
pub const LABEL_DIR: &str = "label";

/// Destination subdirectory of volumetric segmentations.
pub const MRI_DIR: &str = "mri";

/// Destination subdirectory of statistics reports, table exports and
/// cached table fragments.
pub const STATS_DIR: &str = "stats";

/// Reference image every reconstructed source must carry, relative to the
/// source root.
pub const REFERENCE_IMAGE: &str = "mri/brain.mgz";

/// Environment variable through which the toolkit resolves subject data.
///
/// Set on each child process, never on the orchestrating process.
pub const SUBJECTS_DIR_VAR: &str = "SUBJECTS_DIR";

/// Marker appended to temporary stage outputs until the tool exits zero.
pub const PARTIAL_SUFFIX: &str = "partial";

/// Interval between cancellation checks while a tool is running.
pub const POLL_INTERVAL_MS: u64 = 50;

/// Magic bytes for cached table fragments.
///
/// - File Header = Magic Bytes ("PFRG") + Version (u8) before payload.
pub const FRAGMENT_MAGIC: &[u8; 4] = b"PFRG";

/// Current fragment serialization format version.
///
/// Increment this when making breaking changes to the fragment format.
pub const FRAGMENT_VERSION: u8 = 1;

/// Maximum accepted size of a cached fragment (64 MB).
///
/// Validated before deserialization so a corrupted cache entry cannot
/// trigger an unbounded allocation.
pub const MAX_FRAGMENT_SIZE: u64 = 64 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_end_with_key_value_delimiter() {
        assert!(SUBJECT_PREFIX.ends_with(KEY_VALUE_DELIMITER));
        assert!(SESSION_PREFIX.ends_with(KEY_VALUE_DELIMITER));
    }

    #[test]
    fn fragment_magic_correct() {
        assert_eq!(FRAGMENT_MAGIC, b"PFRG");
    }
}
