//! Authorization context and its configuration-derived implementation
//!
//! `ProjectControl` loads the configuration of a project and of every ancestor
//! up to the inheritance root, then evaluates permissions for one caller:
//! - a `block` rule for one of the caller's groups anywhere in the chain wins
//! - otherwise the most specific project with a matching `allow`/`deny` decides
//! - within a project, an exclusive permission hides less specific sections
//!   and every parent
//! - server administrators own every ref

use std::collections::HashSet;

use tracing::debug;

use crate::constants::{ADMINISTRATE_SERVER, ALL_REFS, GLOBAL_CAPABILITIES, OWNER, PUSH, READ, REFS_FOR};
use crate::error::{AclError, Result};
use crate::group::GroupBackend;
use crate::model::{Action, Caller, GroupId, Permission, PermissionRule, ProjectConfig, SectionScope};
use crate::pattern::RefPattern;
use crate::settings::Settings;
use crate::store::ConfigStore;

/// Questions the merge engine and projector ask about the caller
pub trait AuthorizationContext {
    fn caller(&self) -> &Caller;

    fn is_server_admin(&self) -> bool;

    /// Caller owns every ref the pattern denotes
    fn owns(&self, pattern: &RefPattern) -> bool;

    /// Caller owns the whole project
    fn is_owner(&self) -> bool {
        RefPattern::parse(ALL_REFS).is_ok_and(|all| self.owns(&all))
    }

    /// Caller owns at least one ref
    fn is_owner_any_ref(&self) -> bool;

    fn can_read(&self, pattern: &RefPattern) -> bool;

    /// Caller may push a change for review to `ref_name`
    fn can_upload_to(&self, ref_name: &str) -> bool;
}

/// Permission evaluation for one caller over a project's inheritance chain
#[derive(Debug, Clone)]
pub struct ProjectControl {
    caller: Caller,
    memberships: HashSet<GroupId>,
    /// The project first, the inheritance root last
    chain: Vec<ProjectConfig>,
    admin: bool,
}

impl ProjectControl {
    /// Load the chain from the store, failing with `NoSuchProject` when the
    /// project is missing
    pub fn load(
        store: &dyn ConfigStore,
        groups: &dyn GroupBackend,
        settings: &Settings,
        project: &str,
        caller: &Caller,
    ) -> Result<Self> {
        if !store.exists(project)? {
            return Err(AclError::NoSuchProject(project.to_string()));
        }
        let root = settings.all_projects.as_str();
        let mut chain: Vec<ProjectConfig> = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(project.to_string());
        while let Some(name) = next.take() {
            if chain.len() >= settings.max_inheritance_depth || !seen.insert(name.clone()) {
                debug!(project, at = %name, "inheritance chain cut short");
                break;
            }
            if !store.exists(&name)? {
                debug!(project, parent = %name, "missing parent project");
                break;
            }
            let config = store.read(&name, None)?.config;
            next = config.inherits_from(root).map(str::to_string);
            chain.push(config);
        }
        if !chain.iter().any(|c| c.project == root) && store.exists(root)? {
            chain.push(store.read(root, None)?.config);
        }
        Ok(Self::from_chain(caller.clone(), groups.memberships(caller), chain, root))
    }

    /// Build from already loaded configurations, project first
    pub fn from_chain(caller: Caller, memberships: HashSet<GroupId>, chain: Vec<ProjectConfig>, root: &str) -> Self {
        let admin = chain
            .iter()
            .filter(|c| c.project == root)
            .filter_map(|c| c.section(GLOBAL_CAPABILITIES))
            .filter_map(|s| s.permission(ADMINISTRATE_SERVER))
            .flat_map(|p| p.rules())
            .any(|r| r.action == Action::Allow && is_member(&memberships, r));
        ProjectControl { caller, memberships, chain, admin }
    }

    pub fn project(&self) -> &str {
        self.chain.first().map(|c| c.project.as_str()).unwrap_or_default()
    }

    pub fn chain(&self) -> &[ProjectConfig] {
        &self.chain
    }

    pub fn memberships(&self) -> &HashSet<GroupId> {
        &self.memberships
    }

    /// Project is visible when the caller owns or can read any ref
    pub fn is_visible(&self) -> bool {
        self.is_owner_any_ref() || self.granted_patterns(READ).iter().any(|p| self.can_read(p))
    }

    /// Evaluate `permission` on every ref `target` denotes
    pub fn permitted(&self, permission: &str, target: &RefPattern) -> bool {
        let mine = |r: &&PermissionRule| is_member(&self.memberships, r);
        let levels: Vec<_> = self.chain.iter().map(|c| covering(c, permission, target)).collect();
        if levels.iter().flatten().flat_map(|p| p.rules()).filter(mine).any(|r| r.action == Action::Block) {
            return false;
        }
        for perms in &levels {
            // most specific first; an exclusive permission hides everything less specific
            let mut matching = Vec::new();
            let mut exclusive = false;
            for perm in perms {
                matching.extend(perm.rules().iter().filter(mine));
                if perm.exclusive_group {
                    exclusive = true;
                    break;
                }
            }
            if matching.iter().any(|r| r.action == Action::Deny) {
                return false;
            }
            if matching.iter().any(|r| grants(r.action)) {
                return true;
            }
            if exclusive {
                return false;
            }
        }
        false
    }

    /// Patterns with a granting rule for one of the caller's groups
    fn granted_patterns(&self, permission: &str) -> Vec<RefPattern> {
        let mut out = Vec::new();
        for config in &self.chain {
            for section in config.sections() {
                let SectionScope::Ref(p) = section.scope() else { continue };
                let granted = section
                    .permission(permission)
                    .is_some_and(|perm| perm.rules().iter().any(|r| grants(r.action) && is_member(&self.memberships, r)));
                if granted {
                    out.push(p.clone());
                }
            }
        }
        out
    }
}

/// `permission` in every section of `config` covering `target`, most specific first
fn covering(config: &ProjectConfig, permission: &str, target: &RefPattern) -> Vec<Permission> {
    let mut found: Vec<(&RefPattern, &Permission)> = config
        .sections()
        .filter_map(|s| match s.scope() {
            SectionScope::Ref(p) if p.covers(target) => s.permission(permission).map(|perm| (p, perm)),
            _ => None,
        })
        .collect();
    found.sort_by_key(|(p, _)| std::cmp::Reverse((!p.is_wildcard(), p.ownership_scope().len())));
    found.into_iter().map(|(_, perm)| perm.clone()).collect()
}

/// Allow and its interactive/batch variants grant; deny and block never do
fn grants(action: Action) -> bool {
    !matches!(action, Action::Deny | Action::Block)
}

fn is_member(memberships: &HashSet<GroupId>, rule: &PermissionRule) -> bool {
    rule.group.id.as_ref().is_some_and(|id| memberships.contains(id))
}

impl AuthorizationContext for ProjectControl {
    fn caller(&self) -> &Caller {
        &self.caller
    }

    fn is_server_admin(&self) -> bool {
        self.admin
    }

    fn owns(&self, pattern: &RefPattern) -> bool {
        self.admin || self.permitted(OWNER, pattern)
    }

    fn is_owner_any_ref(&self) -> bool {
        self.admin || self.granted_patterns(OWNER).iter().any(|p| self.permitted(OWNER, p))
    }

    fn can_read(&self, pattern: &RefPattern) -> bool {
        self.owns(pattern) || self.permitted(READ, pattern)
    }

    fn can_upload_to(&self, ref_name: &str) -> bool {
        let Ok(target) = RefPattern::parse(ref_name) else { return false };
        let Ok(magic) = RefPattern::parse(&format!("{}{}", REFS_FOR, ref_name)) else { return false };
        self.can_read(&target) && (self.owns(&target) || self.permitted(PUSH, &magic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessSection, GroupRef};

    fn rule(id: &str) -> PermissionRule {
        PermissionRule::new(GroupRef::resolved(GroupId::new(id), id))
    }

    fn section(name: &str, perm: &str, rules: Vec<PermissionRule>) -> AccessSection {
        let mut p = Permission::new(perm);
        for r in rules {
            p.add_rule(r);
        }
        AccessSection::new(name).unwrap().with_permission(p)
    }

    fn control(groups: &[&str], chain: Vec<ProjectConfig>) -> ProjectControl {
        let m = groups.iter().map(|g| GroupId::new(*g)).collect();
        ProjectControl::from_chain(Caller::new("alice"), m, chain, "All-Projects")
    }

    fn pat(s: &str) -> RefPattern {
        RefPattern::parse(s).unwrap()
    }

    #[test]
    fn owner_of_wildcard_owns_refs_below() {
        let p = ProjectConfig::new("p").with_section(section("refs/heads/*", OWNER, vec![rule("devs")]));
        let c = control(&["devs"], vec![p, ProjectConfig::new("All-Projects")]);
        assert!(c.owns(&pat("refs/heads/stable/*")));
        assert!(c.owns(&pat("refs/heads/master")));
        assert!(!c.owns(&pat("refs/tags/*")));
        assert!(!c.is_owner());
        assert!(c.is_owner_any_ref());
        assert!(!c.is_server_admin());
    }

    #[test]
    fn inherits_from_parent() {
        let root = ProjectConfig::new("All-Projects").with_section(section("refs/*", READ, vec![rule("users")]));
        let c = control(&["users"], vec![ProjectConfig::new("p"), root]);
        assert!(c.can_read(&pat("refs/heads/master")));
        assert!(c.is_visible());
    }

    #[test]
    fn block_in_parent_beats_child_allow() {
        let root = ProjectConfig::new("All-Projects")
            .with_section(section("refs/*", READ, vec![rule("users").with_action(Action::Block)]));
        let child = ProjectConfig::new("p").with_section(section("refs/heads/*", READ, vec![rule("users")]));
        let c = control(&["users"], vec![child, root]);
        assert!(!c.can_read(&pat("refs/heads/master")));
    }

    #[test]
    fn child_deny_beats_parent_allow() {
        let root = ProjectConfig::new("All-Projects").with_section(section("refs/*", READ, vec![rule("users")]));
        let child = ProjectConfig::new("p")
            .with_section(section("refs/*", READ, vec![rule("users").with_action(Action::Deny)]));
        assert!(!control(&["users"], vec![child, root]).can_read(&pat("refs/heads/x")));
    }

    #[test]
    fn exclusive_permission_stops_inheritance() {
        let root = ProjectConfig::new("All-Projects").with_section(section("refs/*", READ, vec![rule("users")]));
        let mut sec = section("refs/heads/secret", READ, vec![rule("admins")]);
        let excl = sec.permission(READ).cloned().unwrap().exclusive();
        sec.put_permission(excl);
        let child = ProjectConfig::new("p").with_section(sec);
        let c = control(&["users"], vec![child, root]);
        assert!(!c.can_read(&pat("refs/heads/secret")));
        assert!(c.can_read(&pat("refs/heads/public")));
    }

    #[test]
    fn exclusive_section_hides_less_specific_sections_of_same_project() {
        let mut sec = section("refs/heads/secret", READ, vec![rule("admins")]);
        let excl = sec.permission(READ).cloned().unwrap().exclusive();
        sec.put_permission(excl);
        let p = ProjectConfig::new("p")
            .with_section(section("refs/*", READ, vec![rule("users")]))
            .with_section(sec);
        let c = control(&["users"], vec![p.clone(), ProjectConfig::new("All-Projects")]);
        assert!(!c.can_read(&pat("refs/heads/secret")));
        assert!(c.can_read(&pat("refs/heads/main")));
        let c = control(&["admins"], vec![p, ProjectConfig::new("All-Projects")]);
        assert!(c.can_read(&pat("refs/heads/secret")));
    }

    #[test]
    fn interactive_rules_grant_like_allow() {
        let p = ProjectConfig::new("p")
            .with_section(section("refs/heads/*", READ, vec![rule("bots").with_action(Action::Batch)]))
            .with_section(section("refs/tags/*", OWNER, vec![rule("bots").with_action(Action::Interactive)]));
        let c = control(&["bots"], vec![p, ProjectConfig::new("All-Projects")]);
        assert!(c.can_read(&pat("refs/heads/main")));
        assert!(c.is_visible());
        assert!(c.is_owner_any_ref());
        assert!(c.owns(&pat("refs/tags/v1")));
    }

    #[test]
    fn administrators_own_everything() {
        let root = ProjectConfig::new("All-Projects")
            .with_section(section(GLOBAL_CAPABILITIES, ADMINISTRATE_SERVER, vec![rule("admins")]));
        let c = control(&["admins"], vec![ProjectConfig::new("p"), root]);
        assert!(c.is_server_admin());
        assert!(c.is_owner());
        assert!(c.can_upload_to("refs/meta/config"));
    }

    #[test]
    fn upload_needs_push_on_magic_ref() {
        let p = ProjectConfig::new("p")
            .with_section(section("refs/meta/config", READ, vec![rule("devs")]))
            .with_section(section("refs/for/refs/meta/config", PUSH, vec![rule("devs")]));
        let c = control(&["devs"], vec![p.clone(), ProjectConfig::new("All-Projects")]);
        assert!(c.can_upload_to("refs/meta/config"));
        let c = control(&["others"], vec![p, ProjectConfig::new("All-Projects")]);
        assert!(!c.can_upload_to("refs/meta/config"));
    }
}
