//! Groups container and group principal
//!
//! A group's table value is its member list: sorted, comma-joined user ids.
//! The list is parsed on every access so it always reflects current table
//! state, and it is re-sorted on every mutation.

use crate::codec::{split_joined, Value, DEFAULT_DELIMITER};
use crate::error::{Result, UgmError};
use crate::locking::ROOT_PATH;
use crate::principal::{Principal, GROUP_LEDGER_PREFIX};
use crate::search::{self, SearchMatch, SearchQuery};
use crate::table::FileTable;
use crate::ugm::UgmCore;
use crate::users::{User, Users};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::sync::Arc;

pub(crate) const GROUPS_PATH: &str = "/groups";

const SIDECAR_DIR: &str = "groups";

pub(crate) fn group_path(id: &str) -> String {
    format!("/groups/{}", id)
}

/// Container state: backing table, materialized objects, scheduled deletions
pub(crate) struct GroupsState {
    pub(crate) table: FileTable,
    pub(crate) cache: HashMap<String, Arc<GroupNode>>,
    pub(crate) pending_removal: Vec<String>,
}

impl GroupsState {
    pub(crate) fn new(core: &UgmCore) -> Self {
        GroupsState {
            table: FileTable::new(core.groups_file.clone(), DEFAULT_DELIMITER),
            cache: HashMap::new(),
            pending_removal: Vec::new(),
        }
    }
}

/// Shared state of one materialized group
pub(crate) struct GroupNode {
    pub(crate) id: String,
    pub(crate) attrs: Mutex<FileTable>,
}

impl GroupNode {
    fn new(core: &UgmCore, id: &str) -> Self {
        let path = core.data_dir.join(SIDECAR_DIR).join(id);
        GroupNode {
            id: id.to_string(),
            attrs: Mutex::new(FileTable::new(path, DEFAULT_DELIMITER)),
        }
    }
}

/// The groups container
#[derive(Clone)]
pub struct Groups {
    core: Arc<UgmCore>,
}

impl Groups {
    pub(crate) fn new(core: Arc<UgmCore>) -> Self {
        Groups { core }
    }

    /// Look up a group by id, materializing and caching on first access
    pub fn get(&self, id: &str) -> Result<Group> {
        let cached = self
            .core
            .with_groups(|state| -> Result<Option<Arc<GroupNode>>> {
                if !state.table.contains(id)? {
                    return Err(UgmError::KeyNotFound(id.to_string()));
                }
                Ok(state.cache.get(id).cloned())
            })?;
        if let Some(node) = cached {
            return Ok(Group {
                core: self.core.clone(),
                node,
            });
        }
        let _guard = self.core.locks.lock(&group_path(id));
        let node = self.core.with_groups(|state| -> Result<Arc<GroupNode>> {
            if !state.table.contains(id)? {
                return Err(UgmError::KeyNotFound(id.to_string()));
            }
            if let Some(node) = state.cache.get(id) {
                return Ok(node.clone());
            }
            let node = Arc::new(GroupNode::new(&self.core, id));
            state.cache.insert(id.to_string(), node.clone());
            Ok(node)
        })?;
        Ok(Group {
            core: self.core.clone(),
            node,
        })
    }

    /// Create a group with the given attributes; new groups start with an
    /// empty member list
    pub fn create(&self, id: &str, attributes: &[(&str, &str)]) -> Result<Group> {
        let _guard = self.core.locks.lock(GROUPS_PATH);
        let node = Arc::new(GroupNode::new(&self.core, id));
        {
            let mut attrs = node.attrs.lock();
            for (key, value) in attributes {
                attrs.set(key, Value::from(*value))?;
            }
        }
        self.core.with_groups(|state| -> Result<()> {
            if !state.table.contains(id)? {
                state.table.set(id, Value::Text(String::new()))?;
            }
            state.cache.insert(id.to_string(), node.clone());
            Ok(())
        })?;
        Ok(Group {
            core: self.core.clone(),
            node,
        })
    }

    /// Remove a group: table entry, cache entry, namespaced role ledger
    /// entry, and scheduled sidecar deletion. Groups have no dependents
    /// beyond their own member list, so nothing cascades.
    pub fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.core.locks.lock(ROOT_PATH);
        self.core.with_groups(|state| -> Result<()> {
            state.table.delete(id)?;
            state.cache.remove(id);
            state.pending_removal.push(id.to_string());
            Ok(())
        })?;
        let key = format!("{}{}", GROUP_LEDGER_PREFIX, id);
        let mut roles = self.core.roles.lock();
        if roles.contains(&key)? {
            roles.delete(&key)?;
        }
        Ok(())
    }

    /// Group ids in table order
    pub fn ids(&self) -> Result<Vec<String>> {
        self.core.with_groups(|state| state.table.keys())
    }

    /// Drop the decoded table and all materialized objects
    pub fn invalidate(&self) {
        self.core.with_groups(|state| {
            state.table.invalidate();
            state.cache.clear();
        });
    }

    /// Linear scan of all groups against the query
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchMatch>> {
        let ids = self.ids()?;
        search::scan(&ids, |id, key| self.lookup_attr(id, key), query)
    }

    /// Persist the groups table, cascade into cached children and siblings,
    /// and run pending sidecar deletions
    pub fn commit(&self) -> Result<()> {
        self.commit_inner(false)
    }

    pub(crate) fn commit_inner(&self, from_parent: bool) -> Result<()> {
        let _guard = if from_parent {
            self.core.locks.lock(GROUPS_PATH)
        } else {
            self.core.locks.lock(ROOT_PATH)
        };
        let (nodes, pending) = self.core.with_groups(
            |state| -> Result<(Vec<Arc<GroupNode>>, Vec<String>)> {
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
            Users::new(self.core.clone()).commit_inner(true)?;
        }
        for id in pending {
            let path = self.core.data_dir.join(SIDECAR_DIR).join(&id);
            if path.exists() {
                fs::remove_file(&path)?;
                tracing::debug!("removed group data file {}", path.display());
            }
        }
        Ok(())
    }

    fn lookup_attr(&self, id: &str, key: &str) -> Result<Option<String>> {
        let group = self.get(id)?;
        match group.attr(key) {
            Ok(Value::Text(text)) if !text.is_empty() => Ok(Some(text)),
            Ok(_) => Ok(None),
            Err(UgmError::KeyNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// A materialized group; a cached view over the container's table entry
#[derive(Clone)]
pub struct Group {
    core: Arc<UgmCore>,
    node: Arc<GroupNode>,
}

impl Group {
    /// Group id
    pub fn id(&self) -> &str {
        &self.node.id
    }

    /// Member ids in sorted order, parsed from the current table value
    pub fn member_ids(&self) -> Result<Vec<String>> {
        let value = self
            .core
            .with_groups(|state| state.table.get(&self.node.id))?;
        Ok(split_joined(&value))
    }

    /// Add a member; no-op for existing members, `KeyNotFound` when the user
    /// does not exist in the sibling users container
    pub fn add(&self, user_id: &str) -> Result<()> {
        let _guard = self.core.locks.lock(&group_path(&self.node.id));
        let mut members = self.member_ids()?;
        if members.iter().any(|member| member == user_id) {
            return Ok(());
        }
        // membership requires an existing user; this materializes it exactly
        // like a container lookup would
        Users::new(self.core.clone()).get(user_id)?;
        members.push(user_id.to_string());
        self.write_members(members)
    }

    /// Remove a member, failing with `KeyNotFound` for non-members
    pub fn remove_member(&self, user_id: &str) -> Result<()> {
        let _guard = self.core.locks.lock(&group_path(&self.node.id));
        let mut members = self.member_ids()?;
        let pos = members
            .iter()
            .position(|member| member == user_id)
            .ok_or_else(|| UgmError::KeyNotFound(user_id.to_string()))?;
        members.remove(pos);
        self.write_members(members)
    }

    /// Member user handles, resolved via the sibling users container
    pub fn users(&self) -> Result<Vec<User>> {
        let users = Users::new(self.core.clone());
        self.member_ids()?
            .iter()
            .map(|id| users.get(id))
            .collect()
    }

    /// Look up a member by id, failing with `KeyNotFound` for non-members
    pub fn member(&self, user_id: &str) -> Result<User> {
        if !self.member_ids()?.iter().any(|member| member == user_id) {
            return Err(UgmError::KeyNotFound(user_id.to_string()));
        }
        Users::new(self.core.clone()).get(user_id)
    }

    /// Attribute lookup; `id` is virtual, everything else reads the sidecar
    pub fn attr(&self, key: &str) -> Result<Value> {
        if key == "id" {
            return Ok(Value::Text(self.node.id.clone()));
        }
        self.node.attrs.lock().get(key)
    }

    pub fn set_attr(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let _guard = self.core.locks.lock(&group_path(&self.node.id));
        self.node.attrs.lock().set(key, value.into())
    }

    pub fn remove_attr(&self, key: &str) -> Result<()> {
        let _guard = self.core.locks.lock(&group_path(&self.node.id));
        self.node.attrs.lock().delete(key)
    }

    pub fn attr_names(&self) -> Result<Vec<String>> {
        self.node.attrs.lock().keys()
    }

    /// Roles assigned to this group
    pub fn roles(&self) -> Result<Vec<String>> {
        crate::ugm::roles_for(&self.core, &self.ledger_key())
    }

    pub fn add_role(&self, role: &str) -> Result<()> {
        crate::ugm::add_role_for(&self.core, role, &self.ledger_key())
    }

    pub fn remove_role(&self, role: &str) -> Result<()> {
        crate::ugm::remove_role_for(&self.core, role, &self.ledger_key())
    }

    /// Persist own attributes, then converge the whole tree
    pub fn commit(&self) -> Result<()> {
        let _guard = self.core.locks.lock(ROOT_PATH);
        self.node.attrs.lock().persist()?;
        Groups::new(self.core.clone()).commit_inner(false)
    }

    fn write_members(&self, mut members: Vec<String>) -> Result<()> {
        members.sort();
        self.core.with_groups(|state| {
            state
                .table
                .set(&self.node.id, Value::Text(members.join(",")))
        })
    }
}

impl Principal for Group {
    fn id(&self) -> &str {
        &self.node.id
    }

    fn ledger_key(&self) -> String {
        format!("{}{}", GROUP_LEDGER_PREFIX, self.node.id)
    }
}

// Handle equality is view identity, same as for users.
impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Group {}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group").field("id", &self.node.id).finish()
    }
}
