//! Read projection: the part of a configuration a caller may see
//!
//! Sections the caller owns, or any section when the caller can read the
//! configuration ref, are returned verbatim. Sections the caller can only read
//! lose the rules naming groups invisible to the caller. Everything else is
//! omitted.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::constants::{ALL_REFS, REFS_CONFIG};
use crate::control::AuthorizationContext;
use crate::group::{GroupBackend, GroupResolver};
use crate::model::{AccessSection, GroupId, ProjectConfig, SectionScope};
use crate::pattern::RefPattern;
use crate::store::{RevisionId, Snapshot};

/// Display data for a group referenced by a visible rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub visible_to_all: bool,
}

/// The access configuration of one project as one caller may see it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessView {
    pub project: String,
    pub revision: RevisionId,
    /// `None` only for the inheritance root
    pub inherits_from: Option<String>,
    pub is_owner: bool,
    /// Names of the sections the caller administers
    pub owner_of: BTreeSet<String>,
    pub can_upload: bool,
    pub config_visible: bool,
    pub local: BTreeMap<String, AccessSection>,
    pub groups: BTreeMap<GroupId, GroupInfo>,
}

impl AccessView {
    /// The visible sections, in the shape an update expects
    pub fn sections(&self) -> Vec<AccessSection> {
        self.local.values().cloned().collect()
    }
}

/// Build the view of `snapshot` for the caller behind `auth`
pub fn project(snapshot: &Snapshot, auth: &dyn AuthorizationContext, groups: &dyn GroupBackend, root: &str) -> AccessView {
    let config = &snapshot.config;
    let caller = auth.caller();
    let config_visible = RefPattern::parse(REFS_CONFIG).is_ok_and(|p| auth.can_read(&p));
    let is_owner = auth.is_owner();
    let mut resolver = GroupResolver::new(groups);

    let mut owner_of = BTreeSet::new();
    let mut local = BTreeMap::new();
    for section in config.sections() {
        let name = section.name();
        let shown = match section.scope() {
            SectionScope::GlobalCapabilities | SectionScope::ProjectCapabilities => {
                (is_owner || config_visible).then(|| section.clone())
            }
            SectionScope::Ref(pattern) if auth.owns(pattern) => {
                owner_of.insert(name.clone());
                Some(section.clone())
            }
            SectionScope::Ref(_) if config_visible => Some(section.clone()),
            SectionScope::Ref(pattern) if auth.can_read(pattern) => {
                let mut filtered = AccessSection::for_scope(section.scope().clone());
                for permission in section.permissions() {
                    filtered.put_permission(permission.filtered(|r| {
                        r.group.id.as_ref().is_some_and(|id| resolver.is_visible(id, caller))
                    }));
                }
                filtered.prune();
                (!filtered.is_empty()).then_some(filtered)
            }
            SectionScope::Ref(_) => None,
        };
        match shown {
            Some(s) => {
                local.insert(name, s);
            }
            None => debug!(project = %config.project, section = %name, caller = %caller, "section hidden"),
        }
    }
    if owner_of.is_empty() && auth.is_owner_any_ref() {
        owner_of.insert(ALL_REFS.to_string());
    }

    let mut group_info = BTreeMap::new();
    let referenced = local.values().flat_map(|s: &AccessSection| s.permissions()).flat_map(|p| p.rules());
    for id in referenced.filter_map(|r| r.group.id.clone()).collect::<BTreeSet<_>>() {
        if !resolver.is_visible(&id, caller) {
            continue;
        }
        if let Some(desc) = resolver.get(&id) {
            group_info.insert(id, GroupInfo { name: desc.name, url: desc.url, visible_to_all: desc.visible_to_all });
        }
    }

    let can_upload = is_owner || (config_visible && auth.can_upload_to(REFS_CONFIG));
    AccessView {
        project: config.project.clone(),
        revision: snapshot.revision.clone(),
        inherits_from: config.inherits_from(root).map(str::to_string),
        is_owner,
        owner_of,
        can_upload,
        config_visible,
        local,
        groups: group_info,
    }
}

/// Put back into `proposed` what `project` withheld from the caller: omitted
/// sections whole, and the rules filtered out of partially shown sections.
/// Hidden content stays as it is in `base`.
pub fn reinstate_hidden(base: &ProjectConfig, view: &AccessView, mut proposed: Vec<AccessSection>) -> Vec<AccessSection> {
    for section in base.sections() {
        let name = section.name();
        let hidden = match view.local.get(&name) {
            None => section.clone(),
            Some(shown) if shown == section => continue,
            Some(shown) => hidden_rules(section, shown),
        };
        if hidden.is_empty() {
            continue;
        }
        let mut found = false;
        for target in proposed.iter_mut().filter(|s| s.name() == name) {
            add_rules(target, &hidden);
            found = true;
        }
        if !found {
            proposed.push(hidden);
        }
    }
    proposed
}

fn hidden_rules(section: &AccessSection, shown: &AccessSection) -> AccessSection {
    let mut hidden = AccessSection::for_scope(section.scope().clone());
    for permission in section.permissions() {
        let visible = shown.permission(&permission.name);
        hidden.put_permission(permission.filtered(|r| visible.map_or(true, |v| v.rule_for(&r.group).is_none())));
    }
    hidden.prune();
    hidden
}

fn add_rules(target: &mut AccessSection, hidden: &AccessSection) {
    for permission in hidden.permissions() {
        let mut merged = target.permission(&permission.name).cloned().unwrap_or_else(|| permission.filtered(|_| false));
        for rule in permission.rules() {
            merged.add_rule(rule.clone());
        }
        target.put_permission(merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{READ, SUBMIT};
    use crate::group::{GroupDescription, MemoryGroups};
    use crate::model::{Caller, Permission, PermissionRule};

    struct Reader {
        caller: Caller,
        owned: Vec<RefPattern>,
        readable: Vec<RefPattern>,
    }

    impl AuthorizationContext for Reader {
        fn caller(&self) -> &Caller {
            &self.caller
        }
        fn is_server_admin(&self) -> bool {
            false
        }
        fn owns(&self, p: &RefPattern) -> bool {
            self.owned.iter().any(|o| o.covers(p))
        }
        fn is_owner_any_ref(&self) -> bool {
            !self.owned.is_empty()
        }
        fn can_read(&self, p: &RefPattern) -> bool {
            self.owns(p) || self.readable.iter().any(|o| o.covers(p))
        }
        fn can_upload_to(&self, _: &str) -> bool {
            false
        }
    }

    fn pats(v: &[&str]) -> Vec<RefPattern> {
        v.iter().map(|p| RefPattern::parse(p).unwrap()).collect()
    }

    fn snapshot(groups: &MemoryGroups) -> Snapshot {
        let visible = groups.add(GroupDescription::new("g-pub", "Public").visible_to_all());
        let hidden = groups.add(GroupDescription::new("g-sec", "Secret"));
        let perm = Permission::new(READ)
            .with_rule(PermissionRule::new(visible.clone()))
            .with_rule(PermissionRule::new(hidden.clone()));
        let config = ProjectConfig::new("p")
            .with_section(AccessSection::new("refs/heads/*").unwrap().with_permission(perm))
            .with_section(
                AccessSection::new("refs/tags/*")
                    .unwrap()
                    .with_permission(Permission::new(SUBMIT).with_rule(PermissionRule::new(hidden))),
            );
        Snapshot { revision: RevisionId("r1".into()), config }
    }

    #[test]
    fn reader_sees_filtered_sections() {
        let g = MemoryGroups::new();
        let snap = snapshot(&g);
        let auth = Reader { caller: Caller::new("bob"), owned: vec![], readable: pats(&["refs/heads/*", "refs/tags/*"]) };
        let view = project(&snap, &auth, &g, "All-Projects");
        assert!(!view.config_visible);
        assert_eq!(view.local.len(), 1);
        let rules = view.local["refs/heads/*"].permission(READ).unwrap().rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].group.name, "Public");
        assert!(view.owner_of.is_empty());
        assert!(!view.is_owner);
        assert!(!view.can_upload);
        assert_eq!(view.groups.keys().map(GroupId::as_str).collect::<Vec<_>>(), vec!["g-pub"]);
        assert_eq!(view.inherits_from.as_deref(), Some("All-Projects"));
    }

    #[test]
    fn owner_sees_owned_sections_verbatim() {
        let g = MemoryGroups::new();
        let snap = snapshot(&g);
        let auth = Reader { caller: Caller::new("o"), owned: pats(&["refs/tags/*"]), readable: vec![] };
        let view = project(&snap, &auth, &g, "All-Projects");
        assert_eq!(view.local.keys().collect::<Vec<_>>(), vec!["refs/tags/*"]);
        assert_eq!(view.local["refs/tags/*"], *snap.config.section("refs/tags/*").unwrap());
        assert_eq!(view.owner_of.iter().collect::<Vec<_>>(), vec!["refs/tags/*"]);
    }

    #[test]
    fn project_owner_sees_everything() {
        let g = MemoryGroups::new();
        let snap = snapshot(&g);
        let auth = Reader { caller: Caller::new("o"), owned: pats(&["refs/*"]), readable: vec![] };
        let view = project(&snap, &auth, &g, "All-Projects");
        assert!(view.is_owner && view.can_upload && view.config_visible);
        assert_eq!(view.sections().len(), 2);
    }

    #[test]
    fn unchanged_view_reinstates_to_the_base() {
        let g = MemoryGroups::new();
        let snap = snapshot(&g);
        let auth = Reader { caller: Caller::new("bob"), owned: vec![], readable: pats(&["refs/heads/*"]) };
        let view = project(&snap, &auth, &g, "All-Projects");

        let mut rebuilt = ProjectConfig::new("p");
        for section in reinstate_hidden(&snap.config, &view, view.sections()) {
            rebuilt.put_section(section);
        }
        assert_eq!(rebuilt, snap.config);

        let rest = reinstate_hidden(&snap.config, &view, vec![]);
        let names: Vec<_> = rest.iter().map(AccessSection::name).collect();
        assert_eq!(names, vec!["refs/heads/*", "refs/tags/*"]);
        let kept = rest[0].permission(READ).unwrap().rules();
        assert_eq!(kept.iter().map(|r| r.group.name.as_str()).collect::<Vec<_>>(), vec!["Secret"]);
    }
}
