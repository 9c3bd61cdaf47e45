use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum PathError {
    #[error("Failed to get current directory: {source}")]
    #[diagnostic(code(pkgsync_utils::path::current_dir))]
    CurrentDir { source: std::io::Error },

    #[error("Path is empty")]
    #[diagnostic(code(pkgsync_utils::path::empty))]
    Empty,

    #[error("Environment variable `{var}` not set in `{input}`")]
    #[diagnostic(
        code(pkgsync_utils::path::missing_env_var),
        help("Export the variable or use an absolute path")
    )]
    MissingEnvVar { var: String, input: String },

    #[error("Unclosed variable expression starting at `{input}`")]
    #[diagnostic(code(pkgsync_utils::path::unclosed_variable))]
    UnclosedVariable { input: String },
}

#[derive(Error, Diagnostic, Debug)]
pub enum DurationError {
    #[error("Invalid duration `{0}`")]
    #[diagnostic(
        code(pkgsync_utils::duration),
        help("Use a combination of <n>d, <n>h, <n>m and <n>s (e.g. `1h30m`), `always` or `never`")
    )]
    Invalid(String),
}

#[derive(Error, Diagnostic, Debug)]
pub enum UtilsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Duration(#[from] DurationError),
}

pub type PathResult<T> = std::result::Result<T, PathError>;
pub type UtilsResult<T> = std::result::Result<T, UtilsError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_path_error_display_and_source() {
        let err = PathError::CurrentDir {
            source: std::io::Error::other("gone"),
        };
        assert_eq!(err.to_string(), "Failed to get current directory: gone");
        assert!(err.source().is_some());

        let err = PathError::MissingEnvVar {
            var: "VAR".to_string(),
            input: "$VAR".to_string(),
        };
        assert_eq!(err.to_string(), "Environment variable `VAR` not set in `$VAR`");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_utils_error_is_transparent() {
        let err = UtilsError::from(DurationError::Invalid("1x".into()));
        assert_eq!(err.to_string(), "Invalid duration `1x`");
    }
}
