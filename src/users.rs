//! Users container and user principal
//!
//! The container owns the users table (id -> stored password) and a cache of
//! materialized [`User`] objects. Passwords are stored derived:
//! `base64(hash(password || salt) || salt)` with a random salt; an empty
//! stored value means no password is set and authentication always fails.

use crate::codec::{Value, DEFAULT_DELIMITER};
use crate::error::{Result, UgmError};
use crate::groups::{Group, Groups};
use crate::locking::ROOT_PATH;
use crate::principal::Principal;
use crate::search::{self, SearchMatch, SearchQuery};
use crate::table::FileTable;
use crate::ugm::UgmCore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::sync::Arc;

/// Injectable password digest function
pub type HashFn = fn(&[u8]) -> Vec<u8>;

/// Default password digest
pub(crate) fn sha256_digest(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

pub(crate) const DEFAULT_SALT_LEN: usize = 8;

pub(crate) const USERS_PATH: &str = "/users";

const SIDECAR_DIR: &str = "users";

pub(crate) fn user_path(id: &str) -> String {
    format!("/users/{}", id)
}

/// Container state: backing table, materialized objects, scheduled deletions
pub(crate) struct UsersState {
    pub(crate) table: FileTable,
    pub(crate) cache: HashMap<String, Arc<UserNode>>,
    pub(crate) pending_removal: Vec<String>,
}

impl UsersState {
    pub(crate) fn new(core: &UgmCore) -> Self {
        UsersState {
            table: FileTable::new(core.users_file.clone(), DEFAULT_DELIMITER),
            cache: HashMap::new(),
            pending_removal: Vec::new(),
        }
    }
}

/// Shared state of one materialized user
pub(crate) struct UserNode {
    pub(crate) id: String,
    pub(crate) attrs: Mutex<FileTable>,
}

impl UserNode {
    fn new(core: &UgmCore, id: &str) -> Self {
        let path = core.data_dir.join(SIDECAR_DIR).join(id);
        UserNode {
            id: id.to_string(),
            attrs: Mutex::new(FileTable::new(path, DEFAULT_DELIMITER)),
        }
    }
}

/// The users container
#[derive(Clone)]
pub struct Users {
    core: Arc<UgmCore>,
}

impl Users {
    pub(crate) fn new(core: Arc<UgmCore>) -> Self {
        Users { core }
    }

    /// Look up a user by id, materializing and caching the object on first
    /// access; fails with `KeyNotFound` if the id is not in the backing table
    pub fn get(&self, id: &str) -> Result<User> {
        let cached = self
            .core
            .with_users(|state| -> Result<Option<Arc<UserNode>>> {
                if !state.table.contains(id)? {
                    return Err(UgmError::KeyNotFound(id.to_string()));
                }
                Ok(state.cache.get(id).cloned())
            })?;
        if let Some(node) = cached {
            return Ok(User {
                core: self.core.clone(),
                node,
            });
        }
        // construct-and-cache is the critical section; double-checked so two
        // racing threads observe the same materialized object
        let _guard = self.core.locks.lock(&user_path(id));
        let node = self.core.with_users(|state| -> Result<Arc<UserNode>> {
            if !state.table.contains(id)? {
                return Err(UgmError::KeyNotFound(id.to_string()));
            }
            if let Some(node) = state.cache.get(id) {
                return Ok(node.clone());
            }
            let node = Arc::new(UserNode::new(&self.core, id));
            state.cache.insert(id.to_string(), node.clone());
            Ok(node)
        })?;
        Ok(User {
            core: self.core.clone(),
            node,
        })
    }

    /// Create a user, write its attributes into the sidecar record and
    /// register it in the container; new users start with no password set
    pub fn create(&self, id: &str, attributes: &[(&str, &str)]) -> Result<User> {
        let _guard = self.core.locks.lock(USERS_PATH);
        let node = Arc::new(UserNode::new(&self.core, id));
        {
            let mut attrs = node.attrs.lock();
            for (key, value) in attributes {
                attrs.set(key, Value::from(*value))?;
            }
        }
        self.core.with_users(|state| -> Result<()> {
            if !state.table.contains(id)? {
                state.table.set(id, Value::Text(String::new()))?;
            }
            state.cache.insert(id.to_string(), node.clone());
            Ok(())
        })?;
        Ok(User {
            core: self.core.clone(),
            node,
        })
    }

    /// Remove a user: membership cleanup in every group, then table entry,
    /// cache entry, role ledger entry, and scheduled sidecar deletion
    pub fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.core.locks.lock(ROOT_PATH);
        let user = self.get(id)?;
        for group in user.groups()? {
            group.remove_member(id)?;
        }
        self.core.with_users(|state| -> Result<()> {
            state.table.delete(id)?;
            state.cache.remove(id);
            state.pending_removal.push(id.to_string());
            Ok(())
        })?;
        let mut roles = self.core.roles.lock();
        if roles.contains(id)? {
            roles.delete(id)?;
        }
        Ok(())
    }

    /// User ids in table order
    pub fn ids(&self) -> Result<Vec<String>> {
        self.core.with_users(|state| state.table.keys())
    }

    /// Drop the decoded table and all materialized objects; the next access
    /// reloads from disk. Scheduled sidecar deletions survive invalidation.
    pub fn invalidate(&self) {
        self.core.with_users(|state| {
            state.table.invalidate();
            state.cache.clear();
        });
    }

    /// Map a login name to a user id; logins are ids in this backend
    pub fn id_for_login(&self, login: &str) -> String {
        login.to_string()
    }

    /// Check a password against the stored derived value.
    ///
    /// Unknown ids and users without a password always fail.
    pub fn authenticate(&self, id: &str, password: &str) -> Result<bool> {
        let stored = self.core.with_users(|state| -> Result<Option<Value>> {
            if !state.table.contains(id)? {
                return Ok(None);
            }
            Ok(Some(state.table.get(id)?))
        })?;
        let stored = match stored {
            Some(Value::Text(text)) if !text.is_empty() => text,
            _ => return Ok(false),
        };
        Ok(self.check_password(password, &stored))
    }

    /// Change a user's password and persist the tree.
    ///
    /// When `old` is given it is verified first; a mismatch leaves the stored
    /// value untouched.
    pub fn passwd(&self, id: &str, old: Option<&str>, new: &str) -> Result<()> {
        let _guard = self.core.locks.lock(ROOT_PATH);
        let stored = self.core.with_users(|state| -> Result<Value> {
            if !state.table.contains(id)? {
                return Err(UgmError::KeyNotFound(id.to_string()));
            }
            state.table.get(id)
        })?;
        if let Some(old) = old {
            if !self.check_password(old, stored.as_text().unwrap_or("")) {
                return Err(UgmError::PasswordMismatch);
            }
        }
        let hashed = self.hash_password(new);
        self.core
            .with_users(|state| state.table.set(id, Value::Text(hashed)))?;
        self.commit_inner(false)
    }

    /// Linear scan of all users against the query
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchMatch>> {
        let ids = self.ids()?;
        search::scan(&ids, |id, key| self.lookup_attr(id, key), query)
    }

    /// Persist the users table, cascade into cached children and siblings,
    /// and run pending sidecar deletions
    pub fn commit(&self) -> Result<()> {
        self.commit_inner(false)
    }

    pub(crate) fn commit_inner(&self, from_parent: bool) -> Result<()> {
        let _guard = if from_parent {
            self.core.locks.lock(USERS_PATH)
        } else {
            self.core.locks.lock(ROOT_PATH)
        };
        let (nodes, pending) = self.core.with_users(
            |state| -> Result<(Vec<Arc<UserNode>>, Vec<String>)> {
                state.table.persist()?;
                let nodes = state.cache.values().cloned().collect();
                let pending = std::mem::take(&mut state.pending_removal);
                Ok((nodes, pending))
            },
        )?;
        for node in nodes {
            node.attrs.lock().persist()?;
        }
        if !from_parent {
            self.core.roles.lock().persist()?;
            Groups::new(self.core.clone()).commit_inner(true)?;
        }
        for id in pending {
            let path = self.core.data_dir.join(SIDECAR_DIR).join(&id);
            if path.exists() {
                fs::remove_file(&path)?;
                tracing::debug!("removed user data file {}", path.display());
            }
        }
        Ok(())
    }

    fn lookup_attr(&self, id: &str, key: &str) -> Result<Option<String>> {
        let user = self.get(id)?;
        match user.attr(key) {
            Ok(Value::Text(text)) if !text.is_empty() => Ok(Some(text)),
            Ok(_) => Ok(None),
            Err(UgmError::KeyNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn hash_password(&self, plain: &str) -> String {
        let mut salt = vec![0u8; self.core.salt_len];
        OsRng.fill_bytes(&mut salt);
        let mut input = plain.as_bytes().to_vec();
        input.extend_from_slice(&salt);
        let mut derived = (self.core.hasher)(&input);
        derived.extend_from_slice(&salt);
        BASE64.encode(&derived)
    }

    fn check_password(&self, plain: &str, stored: &str) -> bool {
        let decoded = match BASE64.decode(stored) {
            Ok(decoded) => decoded,
            Err(_) => return false,
        };
        if decoded.len() < self.core.salt_len {
            return false;
        }
        let salt = &decoded[decoded.len() - self.core.salt_len..];
        let mut input = plain.as_bytes().to_vec();
        input.extend_from_slice(salt);
        let mut expected = (self.core.hasher)(&input);
        expected.extend_from_slice(salt);
        expected == decoded
    }
}

/// A materialized user; a cached view over the container's table entry
#[derive(Clone)]
pub struct User {
    core: Arc<UgmCore>,
    node: Arc<UserNode>,
}

impl User {
    /// User id
    pub fn id(&self) -> &str {
        &self.node.id
    }

    /// Attribute lookup; `id` and `password` are virtual fields, everything
    /// else reads the sidecar record
    pub fn attr(&self, key: &str) -> Result<Value> {
        if key == "id" {
            return Ok(Value::Text(self.node.id.clone()));
        }
        if key == "password" {
            return self.core.with_users(|state| state.table.get(&self.node.id));
        }
        self.node.attrs.lock().get(key)
    }

    /// Upsert an attribute in the sidecar record; persisted on commit
    pub fn set_attr(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let _guard = self.core.locks.lock(&user_path(&self.node.id));
        self.node.attrs.lock().set(key, value.into())
    }

    /// Remove a sidecar attribute, failing with `KeyNotFound` if absent
    pub fn remove_attr(&self, key: &str) -> Result<()> {
        let _guard = self.core.locks.lock(&user_path(&self.node.id));
        self.node.attrs.lock().delete(key)
    }

    /// Sidecar attribute names; virtual fields are not listed
    pub fn attr_names(&self) -> Result<Vec<String>> {
        self.node.attrs.lock().keys()
    }

    /// Groups this user is a member of
    pub fn groups(&self) -> Result<Vec<Group>> {
        let groups = Groups::new(self.core.clone());
        let mut result = Vec::new();
        for gid in groups.ids()? {
            let group = groups.get(&gid)?;
            if group.member_ids()?.iter().any(|m| m == &self.node.id) {
                result.push(group);
            }
        }
        Ok(result)
    }

    /// Ids of the groups this user is a member of
    pub fn group_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .groups()?
            .iter()
            .map(|group| group.id().to_string())
            .collect())
    }

    /// Roles assigned to this user
    pub fn roles(&self) -> Result<Vec<String>> {
        crate::ugm::roles_for(&self.core, &self.ledger_key())
    }

    pub fn add_role(&self, role: &str) -> Result<()> {
        crate::ugm::add_role_for(&self.core, role, &self.ledger_key())
    }

    pub fn remove_role(&self, role: &str) -> Result<()> {
        crate::ugm::remove_role_for(&self.core, role, &self.ledger_key())
    }

    /// Authenticate against the parent container
    pub fn authenticate(&self, password: &str) -> Result<bool> {
        Users::new(self.core.clone()).authenticate(&self.node.id, password)
    }

    /// Change this user's password via the parent container
    pub fn passwd(&self, old: Option<&str>, new: &str) -> Result<()> {
        Users::new(self.core.clone()).passwd(&self.node.id, old, new)
    }

    /// Persist own attributes, then converge the whole tree
    pub fn commit(&self) -> Result<()> {
        let _guard = self.core.locks.lock(ROOT_PATH);
        self.node.attrs.lock().persist()?;
        Users::new(self.core.clone()).commit_inner(false)
    }
}

impl Principal for User {
    fn id(&self) -> &str {
        &self.node.id
    }

    fn ledger_key(&self) -> String {
        self.node.id.clone()
    }
}

// Handle equality is view identity: two handles are equal when they share the
// same materialized object.
impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for User {}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User").field("id", &self.node.id).finish()
    }
}
