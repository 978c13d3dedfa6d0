//! Exit codes for the sightline CLI.
//!
//! Exit code ranges:
//! - 0: Success
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal and I/O errors

/// Exit codes for sightline operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed (including degraded analytics results)
    Clean = 0,

    /// Invalid arguments or unreadable input dataset
    ArgsError = 10,

    /// Configuration file missing, malformed, or semantically invalid
    ConfigError = 11,

    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error reading inputs or writing output
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&sl_common::Error> for ExitCode {
    fn from(err: &sl_common::Error) -> Self {
        use sl_common::ErrorCategory;
        match (err, err.category()) {
            (sl_common::Error::Json(_), _) => ExitCode::ArgsError,
            (_, ErrorCategory::Config) => ExitCode::ConfigError,
            (_, ErrorCategory::Io) | (_, ErrorCategory::Store) => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_common::Error;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 11);
        assert_eq!(ExitCode::InternalError.as_i32(), 20);
        assert_eq!(ExitCode::IoError.as_i32(), 21);
    }

    #[test]
    fn errors_map_to_codes() {
        assert_eq!(
            ExitCode::from(&Error::InvalidConfig("x".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::from(&Error::Io(std::io::Error::other("disk"))),
            ExitCode::IoError
        );
        let json = serde_json::from_str::<u8>("x").unwrap_err();
        assert_eq!(ExitCode::from(&Error::Json(json)), ExitCode::ArgsError);
        assert_eq!(
            ExitCode::from(&Error::NonFinite {
                field: "confidence".into()
            }),
            ExitCode::InternalError
        );
    }

    #[test]
    fn display_includes_name() {
        assert_eq!(ExitCode::ConfigError.to_string(), "ERR_CONFIG (11)");
    }
}
