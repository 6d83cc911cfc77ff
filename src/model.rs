//! In-memory access model: sections, permissions, rules and group references
//!
//! A `ProjectConfig` exclusively owns its sections, a section its permissions,
//! a permission its rules. Group identities are values copied into rules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{GLOBAL_CAPABILITIES, PROJECT_CAPABILITIES};
use crate::error::{AclError, Result};
use crate::pattern::RefPattern;

// ============================================================================
// Identities
// ============================================================================

/// The account an operation runs on behalf of
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Caller(pub String);

impl Caller {
    pub fn new(account: impl Into<String>) -> Self {
        Caller(account.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical, opaque group identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        GroupId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A group as written in a rule: a display name plus, once resolved, its id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<GroupId>,
}

impl GroupRef {
    /// Unresolved reference by name
    pub fn named(name: impl Into<String>) -> Self {
        GroupRef { name: name.into(), id: None }
    }

    pub fn resolved(id: GroupId, name: impl Into<String>) -> Self {
        GroupRef { name: name.into(), id: Some(id) }
    }

    pub fn is_resolved(&self) -> bool {
        self.id.is_some()
    }

    /// Same entity: ids decide once both sides are resolved
    pub fn same_group(&self, other: &GroupRef) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }

    fn sort_key(&self) -> (&str, Option<&str>) {
        (&self.name, self.id.as_ref().map(GroupId::as_str))
    }
}

// ============================================================================
// Rules
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Allow,
    Deny,
    Block,
    Interactive,
    Batch,
}

impl Action {
    fn keyword(self) -> Option<&'static str> {
        match self {
            Action::Allow => None,
            Action::Deny => Some("deny"),
            Action::Block => Some("block"),
            Action::Interactive => Some("interactive"),
            Action::Batch => Some("batch"),
        }
    }
}

/// One grant of a permission to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RuleRepr")]
pub struct PermissionRule {
    pub group: GroupRef,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub force: bool,
    min: i32,
    max: i32,
}

impl PermissionRule {
    pub fn new(group: GroupRef) -> Self {
        PermissionRule { group, action: Action::Allow, force: false, min: 0, max: 0 }
    }

    /// Set the range; an inverted range is swapped, never rejected
    pub fn with_range(mut self, min: i32, max: i32) -> Self {
        (self.min, self.max) = if min <= max { (min, max) } else { (max, min) };
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn has_range(&self) -> bool {
        self.min != 0 || self.max != 0
    }

    /// Text form, printing the range only when `with_range` is set
    pub fn as_string(&self, with_range: bool) -> String {
        let mut out = String::new();
        if let Some(kw) = self.action.keyword() {
            out.push_str(kw);
            out.push(' ');
        }
        if self.force {
            out.push_str("+force ");
        }
        if with_range {
            out.push_str(&format!("{}..{} ", signed(self.min), signed(self.max)));
        }
        out.push_str("group ");
        out.push_str(&self.group.name);
        out
    }
}

#[derive(Deserialize)]
struct RuleRepr {
    group: GroupRef,
    #[serde(default)]
    action: Action,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    min: i32,
    #[serde(default)]
    max: i32,
}

impl From<RuleRepr> for PermissionRule {
    fn from(r: RuleRepr) -> Self {
        PermissionRule::new(r.group).with_action(r.action).with_force(r.force).with_range(r.min, r.max)
    }
}

fn signed(v: i32) -> String {
    if v > 0 { format!("+{}", v) } else { v.to_string() }
}

impl fmt::Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string(self.has_range()))
    }
}

/// Parses `[action] [+force] [min..max] group NAME`
impl FromStr for PermissionRule {
    type Err = AclError;

    fn from_str(src: &str) -> Result<Self> {
        let invalid = || AclError::InvalidSection(format!("invalid rule {:?}", src));
        let mut rest = src.trim();
        let mut action = Action::Allow;
        for (kw, a) in [("deny ", Action::Deny), ("block ", Action::Block),
            ("interactive ", Action::Interactive), ("batch ", Action::Batch)] {
            if let Some(r) = rest.strip_prefix(kw) {
                action = a;
                rest = r.trim_start();
                break;
            }
        }
        let force = match rest.strip_prefix("+force ") {
            Some(r) => { rest = r.trim_start(); true }
            None => false,
        };
        let mut range = (0, 0);
        if !rest.starts_with("group ") {
            let (text, r) = rest.split_once(' ').ok_or_else(invalid)?;
            let (lo, hi) = text.split_once("..").ok_or_else(invalid)?;
            range = (parse_int(lo).ok_or_else(invalid)?, parse_int(hi).ok_or_else(invalid)?);
            rest = r.trim_start();
        }
        let name = rest.strip_prefix("group ").map(str::trim).filter(|n| !n.is_empty()).ok_or_else(invalid)?;
        Ok(PermissionRule::new(GroupRef::named(name))
            .with_action(action)
            .with_force(force)
            .with_range(range.0, range.1))
    }
}

fn parse_int(s: &str) -> Option<i32> {
    s.strip_prefix('+').unwrap_or(s).parse().ok()
}

// ============================================================================
// Permissions
// ============================================================================

/// A named permission and the rules granting it, one rule per group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exclusive_group: bool,
    rules: Vec<PermissionRule>,
}

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Permission { name: name.into(), exclusive_group: false, rules: Vec::new() }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive_group = true;
        self
    }

    /// Builder form of `add_rule`
    pub fn with_rule(mut self, rule: PermissionRule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Add a rule, replacing any existing rule for the same group
    pub fn add_rule(&mut self, rule: PermissionRule) {
        self.rules.retain(|r| !r.group.same_group(&rule.group));
        let pos = self.rules.partition_point(|r| r.group.sort_key() < rule.group.sort_key());
        self.rules.insert(pos, rule);
    }

    pub fn rule_for(&self, group: &GroupRef) -> Option<&PermissionRule> {
        self.rules.iter().find(|r| r.group.same_group(group))
    }

    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Copy keeping only rules that satisfy `keep`
    pub fn filtered(&self, mut keep: impl FnMut(&PermissionRule) -> bool) -> Permission {
        Permission {
            name: self.name.clone(),
            exclusive_group: self.exclusive_group,
            rules: self.rules.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    pub(crate) fn rules_mut(&mut self) -> &mut Vec<PermissionRule> {
        &mut self.rules
    }
}

// ============================================================================
// Sections
// ============================================================================

/// The closed set of section kinds
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionScope {
    GlobalCapabilities,
    ProjectCapabilities,
    Ref(RefPattern),
}

impl SectionScope {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            GLOBAL_CAPABILITIES => Ok(SectionScope::GlobalCapabilities),
            PROJECT_CAPABILITIES => Ok(SectionScope::ProjectCapabilities),
            _ => RefPattern::parse(name).map(SectionScope::Ref),
        }
    }

    pub fn name(&self) -> String {
        match self {
            SectionScope::GlobalCapabilities => GLOBAL_CAPABILITIES.to_string(),
            SectionScope::ProjectCapabilities => PROJECT_CAPABILITIES.to_string(),
            SectionScope::Ref(p) => p.to_string(),
        }
    }
}

/// A named scope bundling permissions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSection {
    scope: SectionScope,
    permissions: BTreeMap<String, Permission>,
}

impl AccessSection {
    /// Parse a section name: a distinguished capability scope or a ref pattern
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self::for_scope(SectionScope::parse(name)?))
    }

    pub fn for_scope(scope: SectionScope) -> Self {
        AccessSection { scope, permissions: BTreeMap::new() }
    }

    pub fn scope(&self) -> &SectionScope {
        &self.scope
    }

    pub fn name(&self) -> String {
        self.scope.name()
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.put_permission(permission);
        self
    }

    /// Insert or replace the permission of the same name
    pub fn put_permission(&mut self, permission: Permission) {
        self.permissions.insert(permission.name.clone(), permission);
    }

    pub fn permission(&self, name: &str) -> Option<&Permission> {
        self.permissions.get(name)
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }

    pub(crate) fn permissions_mut(&mut self) -> impl Iterator<Item = &mut Permission> {
        self.permissions.values_mut()
    }

    pub fn remove_permission(&mut self, name: &str) -> Option<Permission> {
        self.permissions.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Drop permissions left without rules
    pub fn prune(&mut self) {
        self.permissions.retain(|_, p| !p.is_empty());
    }
}

#[derive(Serialize, Deserialize)]
struct SectionRepr {
    name: String,
    permissions: Vec<Permission>,
}

impl Serialize for AccessSection {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        SectionRepr { name: self.name(), permissions: self.permissions.values().cloned().collect() }
            .serialize(s)
    }
}

impl<'de> Deserialize<'de> for AccessSection {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let repr = SectionRepr::deserialize(d)?;
        let mut section = AccessSection::new(&repr.name).map_err(serde::de::Error::custom)?;
        for p in repr.permissions {
            section.put_permission(p);
        }
        Ok(section)
    }
}

// ============================================================================
// Project configuration
// ============================================================================

/// The permission data of one project at one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    sections: BTreeMap<String, AccessSection>,
}

impl ProjectConfig {
    pub fn new(project: impl Into<String>) -> Self {
        ProjectConfig { project: project.into(), parent: None, sections: BTreeMap::new() }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_section(mut self, section: AccessSection) -> Self {
        self.put_section(section);
        self
    }

    pub fn section(&self, name: &str) -> Option<&AccessSection> {
        self.sections.get(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &AccessSection> {
        self.sections.values()
    }

    pub fn section_names(&self) -> impl Iterator<Item = &String> {
        self.sections.keys()
    }

    /// Replace the section of the same name; empty sections are removed instead
    pub fn put_section(&mut self, mut section: AccessSection) {
        section.prune();
        let name = section.name();
        if section.is_empty() {
            self.sections.remove(&name);
        } else {
            self.sections.insert(name, section);
        }
    }

    pub fn remove_section(&mut self, name: &str) -> Option<AccessSection> {
        self.sections.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Copy bound to another project name
    pub fn for_project(&self, project: &str) -> ProjectConfig {
        ProjectConfig { project: project.to_string(), ..self.clone() }
    }

    /// Canonical bytes; equal configurations produce equal bytes
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parent to inherit from, defaulting to the root for everything but the root
    pub fn inherits_from<'a>(&'a self, root: &'a str) -> Option<&'a str> {
        if self.project == root {
            None
        } else {
            Some(self.parent.as_deref().unwrap_or(root))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_range_is_swapped() {
        let r = PermissionRule::new(GroupRef::named("Devs")).with_range(2, -2);
        assert_eq!((r.min(), r.max()), (-2, 2));
    }

    #[test]
    fn rule_text_form() {
        let r: PermissionRule = "block +force -2..+2 group Release Managers".parse().unwrap();
        assert_eq!(r.action, Action::Block);
        assert!(r.force);
        assert_eq!((r.min(), r.max()), (-2, 2));
        assert_eq!(r.group.name, "Release Managers");
        assert_eq!(r.to_string(), "block +force -2..+2 group Release Managers");
        assert_eq!(r.as_string(false), "block +force group Release Managers");

        let plain: PermissionRule = "group Registered Users".parse().unwrap();
        assert_eq!(plain.action, Action::Allow);
        assert_eq!(plain.to_string(), "group Registered Users");

        assert!("-1..+1".parse::<PermissionRule>().is_err());
        assert!("group ".parse::<PermissionRule>().is_err());
    }

    #[test]
    fn one_rule_per_group() {
        let g = GroupRef::resolved(GroupId::new("abc"), "Devs");
        let mut p = Permission::new("push");
        p.add_rule(PermissionRule::new(g.clone()));
        p.add_rule(PermissionRule::new(GroupRef::resolved(GroupId::new("abc"), "Renamed")).with_force(true));
        assert_eq!(p.rules().len(), 1);
        assert!(p.rule_for(&g).unwrap().force);
    }

    #[test]
    fn empty_sections_are_not_stored() {
        let mut cfg = ProjectConfig::new("p");
        cfg.put_section(AccessSection::new("refs/heads/*").unwrap().with_permission(Permission::new("read")));
        assert!(cfg.is_empty());
    }

    #[test]
    fn section_names_are_normalized() {
        let s = AccessSection::new("stable/*").unwrap();
        assert_eq!(s.name(), "refs/heads/stable/*");
        assert_eq!(AccessSection::new(GLOBAL_CAPABILITIES).unwrap().scope(), &SectionScope::GlobalCapabilities);
        assert!(AccessSection::new("refs/heads/a b").is_err());
    }

    #[test]
    fn config_serde_keeps_content() {
        let cfg = ProjectConfig::new("p").with_parent("All-Projects").with_section(
            AccessSection::new("refs/heads/*").unwrap().with_permission(
                Permission::new("label-Code-Review").exclusive().with_rule(
                    PermissionRule::new(GroupRef::resolved(GroupId::new("g1"), "Devs")).with_range(-2, 2),
                ),
            ),
        );
        let bytes = cfg.canonical_bytes().unwrap();
        let back: ProjectConfig = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, cfg);
        assert_eq!(back.inherits_from("All-Projects"), Some("All-Projects"));
    }
}
