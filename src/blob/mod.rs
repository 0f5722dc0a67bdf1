//! Object store for per-entity artifacts
//!
//! The pipeline talks to the store through scoped sessions. The default
//! backend keeps blobs on the local filesystem.

pub mod traits;

mod filesystem;
mod session;

pub use traits::ObjectStore;

#[cfg(test)]
pub use traits::MockObjectStore;

pub use filesystem::FilesystemObjectStore;
pub use session::{ObjectSession, ObjectStoreClient};
