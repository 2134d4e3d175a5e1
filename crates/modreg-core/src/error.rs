//! Error types for module reference parsing.
//!
//! Parse failures carry no source position: references are parsed from
//! plain strings, so each message names the part of the reference that is
//! invalid instead.

use thiserror::Error;

/// Result type alias using [`ReferenceError`] as the error type.
pub type Result<T> = std::result::Result<T, ReferenceError>;

/// Errors that can occur while parsing a module reference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// The reference text was empty.
    #[error("The module reference is empty.")]
    Empty,

    /// The scheme prefix is not one of the registered schemes.
    #[error("The module reference scheme \"{scheme}\" is not recognized. Specify a path to a local module file or a module reference using one of the following schemes: {available}.")]
    UnknownScheme {
        /// Scheme found in the reference.
        scheme: String,
        /// Comma-separated list of registered schemes.
        available: String,
    },

    /// The registry host is not a valid host name.
    #[error("The registry \"{registry}\" in module reference \"{reference}\" is not a valid host name.")]
    InvalidRegistry {
        /// Offending registry host.
        registry: String,
        /// Reference text without the scheme.
        reference: String,
    },

    /// No repository path follows the registry host.
    #[error("The module reference \"{reference}\" is missing a repository path.")]
    MissingRepository {
        /// Reference text without the scheme.
        reference: String,
    },

    /// A repository path segment is empty or has invalid characters.
    #[error("The repository \"{repository}\" in module reference \"{reference}\" is invalid. Each \"/\"-separated segment must be non-empty and contain only lowercase letters, digits, \".\", \"_\" or \"-\".")]
    InvalidRepository {
        /// Offending repository path.
        repository: String,
        /// Reference text without the scheme.
        reference: String,
    },

    /// No tag follows the repository path.
    #[error("The module reference \"{reference}\" is missing a tag.")]
    MissingTag {
        /// Reference text without the scheme.
        reference: String,
    },

    /// The tag is empty, too long or has invalid characters.
    #[error("The tag \"{tag}\" in module reference \"{reference}\" is invalid. Tags must start with a letter, digit or \"_\", contain only letters, digits, \".\", \"_\" or \"-\", and be at most 128 characters.")]
    InvalidTag {
        /// Offending tag.
        tag: String,
        /// Reference text without the scheme.
        reference: String,
    },

    /// A local module path is not a relative path.
    #[error("The local module path \"{path}\" must be a relative path.")]
    InvalidLocalPath {
        /// Offending path.
        path: String,
    },
}

impl ReferenceError {
    /// Returns the stable diagnostic code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Empty => "MR001",
            Self::UnknownScheme { .. } => "MR002",
            Self::InvalidRegistry { .. } => "MR003",
            Self::MissingRepository { .. } => "MR004",
            Self::InvalidRepository { .. } => "MR005",
            Self::MissingTag { .. } => "MR006",
            Self::InvalidTag { .. } => "MR007",
            Self::InvalidLocalPath { .. } => "MR008",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_missing_tag() {
        let err = ReferenceError::MissingTag {
            reference: "example.com/foo".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The module reference \"example.com/foo\" is missing a tag."
        );
    }

    #[test]
    fn test_error_display_unknown_scheme() {
        let err = ReferenceError::UnknownScheme {
            scheme: "oci".to_string(),
            available: "\"br\"".to_string(),
        };
        assert!(err.to_string().contains("\"oci\" is not recognized"));
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            ReferenceError::Empty,
            ReferenceError::MissingTag {
                reference: String::new(),
            },
            ReferenceError::InvalidTag {
                tag: String::new(),
                reference: String::new(),
            },
        ];
        assert_ne!(errors[0].code(), errors[1].code());
        assert_ne!(errors[1].code(), errors[2].code());
    }
}
