//! Error types for ELF container handling.

/// Errors produced while reading, editing, or writing an ELF image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElfError {
    /// The buffer does not start with a little-endian ELF64 identification.
    #[error("not an ELF64 little-endian image: {reason}")]
    NotElf {
        /// What was wrong with the identification bytes.
        reason: String,
    },

    /// A header, table, or section runs outside the buffer or is inconsistent.
    #[error("malformed ELF image: {reason}")]
    Malformed {
        /// Description of the problem.
        reason: String,
    },

    /// A section required by the operation is absent.
    #[error("ELF image has no section named '{name}'")]
    MissingSection {
        /// The section name.
        name: String,
    },

    /// The pipeline metadata note could not be encoded or decoded.
    #[error("pipeline metadata note: {reason}")]
    Metadata {
        /// Description of the encode/decode failure.
        reason: String,
    },

    /// Two partial images disagree on a pipeline-wide metadata field.
    #[error("conflicting pipeline metadata field '{field}': {fragment} vs {non_fragment}")]
    MetadataConflict {
        /// The field name.
        field: String,
        /// Value in the fragment image.
        fragment: String,
        /// Value in the non-fragment image.
        non_fragment: String,
    },
}

impl From<kiln_common::CursorError> for ElfError {
    fn from(err: kiln_common::CursorError) -> Self {
        ElfError::Malformed {
            reason: err.to_string(),
        }
    }
}
