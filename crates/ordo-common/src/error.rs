//! Error types shared across Ordo crates

/// Rejections produced while validating a node path
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path must not be empty")]
    Empty,

    #[error("path '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("path '{0}' must not end with '/'")]
    TrailingSeparator(String),

    #[error("path '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("path '{0}' contains a relative segment")]
    RelativeSegment(String),

    #[error("operation not allowed on the root node")]
    Root,
}
