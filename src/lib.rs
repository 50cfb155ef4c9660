//! # ugm-rs - File-Backed User and Group Management
//!
//! `ugm-rs` is a minimal persistent store for three related principal kinds -
//! users, groups and role assignments - backed by flat text files, with a
//! lazily materialized in-memory object cache layered on top:
//!
//! - **Line-oriented storage**: one `key<delimiter>value` file per table,
//!   plus a sidecar attribute file per principal
//! - **Lazy everywhere**: tables load on first access, principals materialize
//!   on first lookup and stay cached
//! - **Explicit persistence**: mutations accumulate in memory; a single
//!   `commit` cascades through the whole tree
//! - **Single-writer discipline**: reentrant, path-scoped locks serialize
//!   writers per subtree
//!
//! ## Quick Start
//!
//! ```rust
//! use ugm_rs::{Result, Ugm};
//!
//! # fn main() -> Result<()> {
//! let dir = tempfile::tempdir()?;
//! let ugm = Ugm::new(
//!     dir.path().join("users"),
//!     dir.path().join("groups"),
//!     dir.path().join("roles"),
//!     dir.path().join("principal_data"),
//! );
//!
//! // Create a user with attributes and a password
//! let users = ugm.users();
//! users.create("max", &[("fullname", "Max Muster")])?;
//! users.passwd("max", None, "secret")?;
//! assert!(users.authenticate("max", "secret")?);
//!
//! // Group membership and roles
//! let group = ugm.groups().create("managers", &[])?;
//! group.add("max")?;
//! ugm.add_role("manager", &group)?;
//!
//! // Nothing hits disk until commit
//! ugm.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
mod groups;
mod locking;
mod principal;
pub mod search;
mod table;
mod ugm;
mod users;

pub use codec::Value;
pub use error::{Result, UgmError};
pub use groups::{Group, Groups};
pub use principal::Principal;
pub use search::{SearchMatch, SearchQuery};
pub use table::FileTable;
pub use ugm::{Ugm, UgmChild};
pub use users::{HashFn, User, Users};
