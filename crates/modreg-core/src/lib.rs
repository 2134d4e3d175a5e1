//! # modreg core
//!
//! Core types shared by the modreg registry client and command-line tool:
//!
//! - [`ModuleReference`] - parsed module coordinate (local path or OCI artifact)
//! - [`ReferenceError`] - why a reference failed to parse
//! - [`FailureDetail`] - position-free diagnostic returned by registry operations
//! - [`ModuleCompiler`] - contract of the compiler that produces publishable output
//!
//! ## Example
//!
//! ```rust
//! use modreg_core::ModuleReference;
//!
//! let reference: ModuleReference = "br:myregistry.azurecr.io/bicep/modules/storage:v1"
//!     .parse()
//!     .unwrap();
//!
//! let oci = reference.as_oci().unwrap();
//! assert_eq!(oci.registry(), "myregistry.azurecr.io");
//! assert_eq!(oci.repository(), "bicep/modules/storage");
//! assert_eq!(oci.tag(), "v1");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod compile;
pub mod diagnostic;
pub mod error;
pub mod reference;


pub use compile::{Compilation, ModuleCompiler, SourceCompiler};
pub use diagnostic::FailureDetail;
pub use error::{ReferenceError, Result};
pub use reference::{
    LocalModuleReference, ModuleReference, OciArtifactModuleReference, LOCAL_SCHEME, OCI_SCHEME,
    SCHEMES,
};
