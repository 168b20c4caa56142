//! Error types for docx-templater

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The kind of external resource an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    TagFile,
    Image,
    TabularSource,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Document => "document",
            ResourceKind::TagFile => "tag file",
            ResourceKind::Image => "image",
            ResourceKind::TabularSource => "tabular source",
        };
        f.write_str(name)
    }
}

/// Main error type for the templating engine and the anonymizer
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("{kind} not found: {}", .path.display())]
    NotFound { kind: ResourceKind, path: PathBuf },

    #[error("Malformed {kind} {}: {reason}", .path.display())]
    Malformed {
        kind: ResourceKind,
        path: PathBuf,
        reason: String,
    },

    #[error("Tag file already exists: {} (choose another name or reuse it)", .0.display())]
    Conflict(PathBuf),

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Cannot use {} for tag {tag}: {reason}", .path.display())]
    ResourceUnavailable {
        tag: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TemplateError {
    pub(crate) fn not_found(kind: ResourceKind, path: &Path) -> Self {
        TemplateError::NotFound {
            kind,
            path: path.to_path_buf(),
        }
    }

    pub(crate) fn malformed(kind: ResourceKind, path: &Path, reason: impl fmt::Display) -> Self {
        TemplateError::Malformed {
            kind,
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        TemplateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Map an I/O error from opening `path` to NotFound when the file is missing.
    pub(crate) fn from_open(kind: ResourceKind, path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(kind, path)
        } else {
            Self::io(path, source)
        }
    }

    /// Process exit code used by the command-line tools
    pub fn exit_code(&self) -> i32 {
        match self {
            TemplateError::NotFound { .. } => 2,
            TemplateError::Malformed { .. } => 3,
            TemplateError::Conflict(_) => 4,
            TemplateError::ResourceUnavailable { .. } => 5,
            TemplateError::InvalidArgument(_) => 6,
            _ => 1,
        }
    }
}

/// Result type using TemplateError
pub type Result<T> = std::result::Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_kind_and_path() {
        let err = TemplateError::not_found(ResourceKind::TagFile, Path::new("/tmp/tags.json"));
        let msg = err.to_string();
        assert!(msg.contains("tag file"));
        assert!(msg.contains("/tmp/tags.json"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_from_open_maps_missing_file() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = TemplateError::from_open(ResourceKind::Image, Path::new("logo.png"), missing);
        assert!(matches!(
            err,
            TemplateError::NotFound {
                kind: ResourceKind::Image,
                ..
            }
        ));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        let err = TemplateError::from_open(ResourceKind::Image, Path::new("logo.png"), denied);
        assert!(matches!(err, TemplateError::Io { .. }));
    }

    #[test]
    fn test_resource_unavailable_names_tag() {
        let err = TemplateError::ResourceUnavailable {
            tag: "|IMAGE_LOGO|".to_string(),
            path: PathBuf::from("logo.png"),
            reason: "unsupported image format".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("|IMAGE_LOGO|"));
        assert!(msg.contains("logo.png"));
        assert_eq!(err.exit_code(), 5);
    }
}
