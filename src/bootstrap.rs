//! Bootstrap and project creation

use tracing::info;

use crate::constants::{ADMINISTRATE_SERVER, ALL_REFS, GLOBAL_CAPABILITIES, OWNER, READ};
use crate::db::LmdbStore;
use crate::error::{AclError, Result};
use crate::model::{AccessSection, Caller, GroupRef, Permission, PermissionRule, ProjectConfig};
use crate::settings::Settings;
use crate::store::{ConfigStore, RevisionId};

/// Has the inheritance root been created?
pub fn is_bootstrapped(store: &dyn ConfigStore, settings: &Settings) -> Result<bool> {
    store.exists(&settings.all_projects)
}

/// Create the inheritance root. `administrators` receive `administrateServer`
/// and ownership of every ref; `readers`, if any, may read every ref.
pub fn bootstrap(
    store: &LmdbStore,
    settings: &Settings,
    administrators: &GroupRef,
    readers: Option<&GroupRef>,
    author: &Caller,
) -> Result<RevisionId> {
    if let Some(g) = std::iter::once(administrators).chain(readers).find(|g| !g.is_resolved()) {
        return Err(AclError::NoSuchGroup(g.name.clone()));
    }
    let admin = || PermissionRule::new(administrators.clone());
    let mut read = Permission::new(READ).with_rule(admin());
    if let Some(r) = readers {
        read.add_rule(PermissionRule::new(r.clone()));
    }
    let config = ProjectConfig::new(settings.all_projects.clone())
        .with_section(
            AccessSection::new(GLOBAL_CAPABILITIES)?
                .with_permission(Permission::new(ADMINISTRATE_SERVER).with_rule(admin())),
        )
        .with_section(
            AccessSection::new(ALL_REFS)?
                .with_permission(Permission::new(OWNER).with_rule(admin()))
                .with_permission(read),
        );
    let rev = store.create_project(&config, "Initialize access rules\n", author)?;
    info!(root = %settings.all_projects, administrators = %administrators.name, "bootstrapped");
    Ok(rev)
}

/// Create an empty project inheriting from `parent`, or the root when `None`
pub fn create_project(
    store: &LmdbStore,
    settings: &Settings,
    name: &str,
    parent: Option<&str>,
    author: &Caller,
) -> Result<RevisionId> {
    if name == settings.all_projects {
        return Err(AclError::ProjectExists(name.to_string()));
    }
    if let Some(p) = parent {
        if !store.exists(p)? {
            return Err(AclError::NoSuchProject(p.to_string()));
        }
    }
    let mut config = ProjectConfig::new(name);
    config.parent = parent.map(str::to_string);
    store.create_project(&config, "Create project\n", author)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GroupId;

    #[test]
    fn bootstrap_is_once_only() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();
        let store = LmdbStore::open(dir.path(), &settings).unwrap();
        let admins = GroupRef::resolved(GroupId::new("g-adm"), "Administrators");
        let root = Caller::new("root");

        assert!(!is_bootstrapped(&store, &settings).unwrap());
        bootstrap(&store, &settings, &admins, None, &root).unwrap();
        assert!(is_bootstrapped(&store, &settings).unwrap());
        let err = bootstrap(&store, &settings, &admins, None, &root).unwrap_err();
        assert_eq!(err, AclError::ProjectExists("All-Projects".into()));

        let cfg = store.read("All-Projects", None).unwrap().config;
        assert!(cfg.section(GLOBAL_CAPABILITIES).unwrap().permission(ADMINISTRATE_SERVER).is_some());
        assert_eq!(cfg.inherits_from("All-Projects"), None);
    }

    #[test]
    fn projects_need_an_existing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();
        let store = LmdbStore::open(dir.path(), &settings).unwrap();
        let alice = Caller::new("alice");
        let err = create_project(&store, &settings, "child", Some("missing"), &alice).unwrap_err();
        assert_eq!(err, AclError::NoSuchProject("missing".into()));
        create_project(&store, &settings, "p", None, &alice).unwrap();
        assert!(store.exists("p").unwrap());
    }
}
