//! Group lookup and visibility
//!
//! `GroupBackend` is the external lookup service; `MemoryGroups` is the
//! in-process implementation. `GroupResolver` wraps a backend for the span of
//! one merge or read and memoizes lookups by raw name and by id.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AclError, Result};
use crate::model::{Caller, GroupId, GroupRef};

/// What a backend knows about a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescription {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub visible_to_all: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl GroupDescription {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        GroupDescription { id: GroupId::new(id), name: name.into(), visible_to_all: false, owner: None, url: None }
    }

    pub fn visible_to_all(mut self) -> Self {
        self.visible_to_all = true;
        self
    }

    pub fn owned_by(mut self, owner: GroupId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn to_ref(&self) -> GroupRef {
        GroupRef::resolved(self.id.clone(), self.name.clone())
    }
}

/// Read-only group lookup service
pub trait GroupBackend: Send + Sync {
    fn get(&self, id: &GroupId) -> Option<GroupDescription>;

    /// Exact name lookup
    fn lookup(&self, name: &str) -> Option<GroupDescription>;

    /// Candidates whose name starts with `prefix`
    fn suggest(&self, prefix: &str) -> Vec<GroupDescription>;

    fn is_member(&self, caller: &Caller, id: &GroupId) -> bool;

    fn memberships(&self, caller: &Caller) -> HashSet<GroupId>;
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
struct Groups {
    by_id: HashMap<GroupId, GroupDescription>,
    members: HashMap<GroupId, BTreeSet<Caller>>,
}

/// Group backend held in memory
#[derive(Default)]
pub struct MemoryGroups {
    inner: RwLock<Groups>,
}

impl MemoryGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a group
    pub fn add(&self, group: GroupDescription) -> GroupRef {
        let r = group.to_ref();
        let mut g = self.inner.write().unwrap_or_else(|p| p.into_inner());
        g.by_id.insert(group.id.clone(), group);
        r
    }

    pub fn add_member(&self, id: &GroupId, caller: &Caller) {
        let mut g = self.inner.write().unwrap_or_else(|p| p.into_inner());
        g.members.entry(id.clone()).or_default().insert(caller.clone());
    }

    pub fn remove(&self, id: &GroupId) -> bool {
        let mut g = self.inner.write().unwrap_or_else(|p| p.into_inner());
        g.members.remove(id);
        g.by_id.remove(id).is_some()
    }

    fn read<T>(&self, f: impl FnOnce(&Groups) -> T) -> T {
        f(&self.inner.read().unwrap_or_else(|p| p.into_inner()))
    }
}

impl GroupBackend for MemoryGroups {
    fn get(&self, id: &GroupId) -> Option<GroupDescription> {
        self.read(|g| g.by_id.get(id).cloned())
    }

    fn lookup(&self, name: &str) -> Option<GroupDescription> {
        self.read(|g| g.by_id.values().find(|d| d.name == name).cloned())
    }

    fn suggest(&self, prefix: &str) -> Vec<GroupDescription> {
        let lower = prefix.to_lowercase();
        self.read(|g| {
            let mut v: Vec<_> = g.by_id.values().filter(|d| d.name.to_lowercase().starts_with(&lower)).cloned().collect();
            v.sort_by(|a, b| a.name.cmp(&b.name));
            v
        })
    }

    fn is_member(&self, caller: &Caller, id: &GroupId) -> bool {
        self.read(|g| g.members.get(id).is_some_and(|m| m.contains(caller)))
    }

    fn memberships(&self, caller: &Caller) -> HashSet<GroupId> {
        self.read(|g| g.members.iter().filter(|(_, m)| m.contains(caller)).map(|(id, _)| id.clone()).collect())
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Per-operation resolver; drop it when the merge or read is done
pub struct GroupResolver<'a> {
    backend: &'a dyn GroupBackend,
    by_name: HashMap<String, Option<GroupDescription>>,
    by_id: HashMap<GroupId, Option<GroupDescription>>,
}

impl<'a> GroupResolver<'a> {
    pub fn new(backend: &'a dyn GroupBackend) -> Self {
        GroupResolver { backend, by_name: HashMap::new(), by_id: HashMap::new() }
    }

    /// Canonical reference for a name or id, or `NoSuchGroup`
    pub fn resolve(&mut self, group: &GroupRef) -> Result<GroupRef> {
        let found = match &group.id {
            Some(id) => self.get(id),
            None => self.by_name(&group.name),
        };
        found.map(|d| d.to_ref()).ok_or_else(|| AclError::NoSuchGroup(group.name.clone()))
    }

    /// Description for an id, memoized
    pub fn get(&mut self, id: &GroupId) -> Option<GroupDescription> {
        let backend = self.backend;
        self.by_id.entry(id.clone()).or_insert_with(|| backend.get(id)).clone()
    }

    fn by_name(&mut self, name: &str) -> Option<GroupDescription> {
        if let Some(hit) = self.by_name.get(name) {
            return hit.clone();
        }
        let found = self.backend.lookup(name).or_else(|| {
            let mut candidates = self.backend.suggest(name);
            match candidates.len() {
                1 => candidates.pop(),
                0 => None,
                n => {
                    debug!(name, candidates = n, "ambiguous group name");
                    None
                }
            }
        });
        if let Some(d) = &found {
            self.by_id.insert(d.id.clone(), Some(d.clone()));
        }
        self.by_name.insert(name.to_string(), found.clone());
        found
    }

    /// Visible if shown to all, the caller is a member, or a member of the owner group
    pub fn is_visible(&mut self, id: &GroupId, caller: &Caller) -> bool {
        let Some(desc) = self.get(id) else { return false };
        desc.visible_to_all
            || self.backend.is_member(caller, id)
            || desc.owner.as_ref().is_some_and(|o| self.backend.is_member(caller, o))
    }
}
