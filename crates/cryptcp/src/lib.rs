//! CryptoPro CSP command-line adapter.
//!
//! Production implementations of the [`signing`] ports:
//!
//! - [`TokioProcessRunner`] runs `cryptcp` (or any program) with a timeout,
//!   cancellation, and captured output.
//! - [`TempWorkspaceProvider`] creates one private `cprov_*` directory per
//!   request.
//!
//! It also provides [`CertificateManager`], which drives `certmgr` to list,
//! install and delete certificates in the configured store.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Everything here touches the operating system; none of
//! it makes signing decisions.

pub mod certmgr;
pub mod process;
pub mod workspace;

pub use certmgr::{CertificateError, CertificateManager};
pub use process::TokioProcessRunner;
pub use workspace::{TempWorkspace, TempWorkspaceProvider, WORKSPACE_PREFIX};
