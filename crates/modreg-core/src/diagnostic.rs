//! Failure details reported back to module declarations.
//!
//! A [`FailureDetail`] is the position-free half of a diagnostic: the caller
//! that owns the source span attaches it to the offending declaration.

use std::fmt;

use serde::Serialize;

use crate::error::ReferenceError;

/// A diagnostic code and message describing why a module operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FailureDetail {
    /// Stable diagnostic code (e.g. `MR010`).
    pub code: &'static str,

    /// Human-readable message.
    pub message: String,
}

impl FailureDetail {
    /// Creates a new failure detail.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The remote registry reported that the module does not exist.
    #[must_use]
    pub fn module_not_found(reference: &str) -> Self {
        Self::new(
            "MR010",
            format!("Unable to restore the module with reference \"{reference}\": Module not found."),
        )
    }

    /// Restoring the module failed for any reason other than "not found".
    #[must_use]
    pub fn module_restore_failed_with_message(reference: &str, message: &str) -> Self {
        Self::new(
            "MR011",
            format!("Unable to restore the module with reference \"{reference}\": {message}"),
        )
    }

    /// A registry was handed a reference of a kind it does not handle.
    #[must_use]
    pub fn unsupported_reference(reference: &str, scheme: &str) -> Self {
        Self::new(
            "MR012",
            format!("The module reference \"{reference}\" is not supported by the registry for scheme \"{scheme}\"."),
        )
    }

    /// The target registry does not support publishing.
    #[must_use]
    pub fn module_not_publishable(reference: &str) -> Self {
        Self::new(
            "MR013",
            format!("The specified target module reference \"{reference}\" cannot be published."),
        )
    }

    /// The local entry point of a module could not be determined.
    #[must_use]
    pub fn entry_point_unresolved(reference: &str, reason: &str) -> Self {
        Self::new(
            "MR014",
            format!("Unable to determine the local path of module \"{reference}\": {reason}"),
        )
    }

    /// Returns true if this detail reports a missing remote module.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code == "MR010"
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

impl From<&ReferenceError> for FailureDetail {
    fn from(err: &ReferenceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<ReferenceError> for FailureDetail {
    fn from(err: ReferenceError) -> Self {
        Self::from(&err)
    }
}
