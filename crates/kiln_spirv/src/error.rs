//! Error types for SPIR-V scanning.

/// Errors produced while walking a SPIR-V binary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpirvError {
    /// The binary is shorter than a header, not word aligned, or has the wrong magic.
    #[error("not a SPIR-V binary: {reason}")]
    NotSpirv {
        /// What was wrong with the header.
        reason: String,
    },

    /// An instruction is malformed or runs past the end of the module.
    #[error("malformed SPIR-V at byte offset {offset}: {reason}")]
    Malformed {
        /// Byte offset of the offending instruction.
        offset: usize,
        /// Description of the problem.
        reason: String,
    },

    /// The module declares a version newer than the compiler accepts.
    #[error("unsupported SPIR-V version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version from the header.
        major: u32,
        /// Minor version from the header.
        minor: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display() {
        let err = SpirvError::Malformed {
            offset: 24,
            reason: "zero word count".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed SPIR-V at byte offset 24: zero word count"
        );
    }

    #[test]
    fn unsupported_version_display() {
        let err = SpirvError::UnsupportedVersion { major: 1, minor: 6 };
        assert_eq!(err.to_string(), "unsupported SPIR-V version 1.6");
    }

    #[test]
    fn not_spirv_display() {
        let err = SpirvError::NotSpirv {
            reason: "bad magic".to_string(),
        };
        assert!(err.to_string().contains("bad magic"));
    }
}
