//! Root orchestrator and role ledger
//!
//! The root owns the users table, the groups table and the role ledger, and
//! coordinates cascading persistence. The ledger is one flat table with a
//! `::` delimiter, shared by users and groups; group entries are namespaced
//! by key prefix, never by separate files.

use crate::codec::{split_joined, Value};
use crate::error::{Result, UgmError};
use crate::groups::{Groups, GroupsState};
use crate::locking::{LockRegistry, ROOT_PATH};
use crate::principal::Principal;
use crate::table::FileTable;
use crate::users::{sha256_digest, HashFn, Users, UsersState, DEFAULT_SALT_LEN};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Role ledger delimiter; distinct from `:` so role names with the default
/// delimiter in their principal keys stay unambiguous
pub(crate) const LEDGER_DELIMITER: &str = "::";

/// Shared state behind every handle in one store
pub(crate) struct UgmCore {
    pub(crate) users_file: PathBuf,
    pub(crate) groups_file: PathBuf,
    pub(crate) data_dir: PathBuf,
    pub(crate) hasher: HashFn,
    pub(crate) salt_len: usize,
    pub(crate) locks: LockRegistry,
    pub(crate) roles: Mutex<FileTable>,
    pub(crate) users: Mutex<Option<UsersState>>,
    pub(crate) groups: Mutex<Option<GroupsState>>,
}

impl UgmCore {
    /// Run `f` against the users container state, constructing it lazily
    pub(crate) fn with_users<R>(&self, f: impl FnOnce(&mut UsersState) -> R) -> R {
        let mut slot = self.users.lock();
        let state = slot.get_or_insert_with(|| UsersState::new(self));
        f(state)
    }

    /// Run `f` against the groups container state, constructing it lazily
    pub(crate) fn with_groups<R>(&self, f: impl FnOnce(&mut GroupsState) -> R) -> R {
        let mut slot = self.groups.lock();
        let state = slot.get_or_insert_with(|| GroupsState::new(self));
        f(state)
    }
}

/// Roles stored under a ledger key, empty when the key is absent
pub(crate) fn roles_for(core: &UgmCore, key: &str) -> Result<Vec<String>> {
    let mut roles = core.roles.lock();
    if !roles.contains(key)? {
        return Ok(Vec::new());
    }
    let value = roles.get(key)?;
    Ok(split_joined(&value))
}

pub(crate) fn add_role_for(core: &UgmCore, role: &str, key: &str) -> Result<()> {
    let _guard = core.locks.lock(ROOT_PATH);
    let mut list = roles_for(core, key)?;
    if list.iter().any(|existing| existing == role) {
        return Err(UgmError::DuplicateRole(role.to_string()));
    }
    list.push(role.to_string());
    list.sort();
    core.roles.lock().set(key, Value::Text(list.join(",")))
}

pub(crate) fn remove_role_for(core: &UgmCore, role: &str, key: &str) -> Result<()> {
    let _guard = core.locks.lock(ROOT_PATH);
    let mut list = roles_for(core, key)?;
    let pos = list
        .iter()
        .position(|existing| existing == role)
        .ok_or_else(|| UgmError::RoleNotFound(role.to_string()))?;
    list.remove(pos);
    list.sort();
    core.roles.lock().set(key, Value::Text(list.join(",")))
}

/// The root container
///
/// Owns the three backing tables and the data directory for sidecar records.
/// Construction takes only the four paths; nothing is read until access.
#[derive(Clone)]
pub struct Ugm {
    core: Arc<UgmCore>,
}

/// A structural child of the root
#[derive(Clone)]
pub enum UgmChild {
    Users(Users),
    Groups(Groups),
}

impl Ugm {
    /// Create a root over the given files and sidecar data directory
    pub fn new(
        users_file: impl Into<PathBuf>,
        groups_file: impl Into<PathBuf>,
        roles_file: impl Into<PathBuf>,
        data_directory: impl Into<PathBuf>,
    ) -> Self {
        Ugm::with_hasher(
            users_file,
            groups_file,
            roles_file,
            data_directory,
            sha256_digest,
            DEFAULT_SALT_LEN,
        )
    }

    /// Create a root with an injected password digest function and salt length
    pub fn with_hasher(
        users_file: impl Into<PathBuf>,
        groups_file: impl Into<PathBuf>,
        roles_file: impl Into<PathBuf>,
        data_directory: impl Into<PathBuf>,
        hasher: HashFn,
        salt_len: usize,
    ) -> Self {
        Ugm {
            core: Arc::new(UgmCore {
                users_file: users_file.into(),
                groups_file: groups_file.into(),
                data_dir: data_directory.into(),
                hasher,
                salt_len,
                locks: LockRegistry::new(),
                roles: Mutex::new(FileTable::new(roles_file.into(), LEDGER_DELIMITER)),
                users: Mutex::new(None),
                groups: Mutex::new(None),
            }),
        }
    }

    /// The users container
    pub fn users(&self) -> Users {
        Users::new(self.core.clone())
    }

    /// The groups container
    pub fn groups(&self) -> Groups {
        Groups::new(self.core.clone())
    }

    /// Child lookup; only `users` and `groups` exist
    pub fn child(&self, key: &str) -> Result<UgmChild> {
        match key {
            "users" => Ok(UgmChild::Users(self.users())),
            "groups" => Ok(UgmChild::Groups(self.groups())),
            other => Err(UgmError::KeyNotFound(other.to_string())),
        }
    }

    /// Install a fresh, unloaded container under `key`.
    ///
    /// Only the structural keys are accepted; anything else fails with
    /// `InvalidKey`. The previous container state (including its object
    /// cache) is discarded.
    pub fn assign(&self, key: &str) -> Result<UgmChild> {
        let _guard = self.core.locks.lock(ROOT_PATH);
        match key {
            "users" => {
                *self.core.users.lock() = Some(UsersState::new(&self.core));
                Ok(UgmChild::Users(self.users()))
            }
            "groups" => {
                *self.core.groups.lock() = Some(GroupsState::new(&self.core));
                Ok(UgmChild::Groups(self.groups()))
            }
            other => Err(UgmError::InvalidKey(other.to_string())),
        }
    }

    /// The root's children are structural and cannot be deleted
    pub fn remove_child(&self, _key: &str) -> Result<()> {
        Err(UgmError::OperationForbidden)
    }

    /// Child names in iteration order
    pub fn child_names(&self) -> [&'static str; 2] {
        ["users", "groups"]
    }

    /// Drop cached children so the next access reloads from disk; `None`
    /// drops both, `Some(key)` drops one
    pub fn invalidate(&self, key: Option<&str>) -> Result<()> {
        match key {
            None => {
                *self.core.users.lock() = None;
                *self.core.groups.lock() = None;
                Ok(())
            }
            Some("users") => {
                *self.core.users.lock() = None;
                Ok(())
            }
            Some("groups") => {
                *self.core.groups.lock() = None;
                Ok(())
            }
            Some(other) => Err(UgmError::KeyNotFound(other.to_string())),
        }
    }

    /// Persist the role ledger, then cascade into both children.
    ///
    /// The three tables are written independently; there is no cross-file
    /// atomicity.
    pub fn commit(&self) -> Result<()> {
        let _guard = self.core.locks.lock(ROOT_PATH);
        self.core.roles.lock().persist()?;
        self.users().commit_inner(true)?;
        self.groups().commit_inner(true)?;
        Ok(())
    }

    /// Roles assigned to a principal, empty when none
    pub fn roles<P: Principal>(&self, principal: &P) -> Result<Vec<String>> {
        roles_for(&self.core, &principal.ledger_key())
    }

    /// Assign a role, failing with `DuplicateRole` if already present
    pub fn add_role<P: Principal>(&self, role: &str, principal: &P) -> Result<()> {
        add_role_for(&self.core, role, &principal.ledger_key())
    }

    /// Withdraw a role, failing with `RoleNotFound` if absent
    pub fn remove_role<P: Principal>(&self, role: &str, principal: &P) -> Result<()> {
        remove_role_for(&self.core, role, &principal.ledger_key())
    }
}
