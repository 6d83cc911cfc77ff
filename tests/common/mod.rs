//! Shared setup for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use refacl::{
    bootstrap, create_project, AccessSection, AccessService, Caller, ConfigStore, GroupDescription, GroupId, GroupRef,
    Action, LmdbStore, MemoryGroups, Permission, PermissionRule, Settings,
};
use tempfile::TempDir;

pub const ROOT: &str = "All-Projects";

pub struct World {
    pub dir: TempDir,
    pub store: Arc<LmdbStore>,
    pub groups: Arc<MemoryGroups>,
    pub settings: Settings,
    pub admins: GroupRef,
    pub users: GroupRef,
    pub admin: Caller,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh store with a bootstrapped root; `admin` administers, every caller
/// added through `user` reads
pub fn setup() -> World {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let settings = Settings::default();
    let store = Arc::new(LmdbStore::open(dir.path(), &settings).unwrap());
    let groups = Arc::new(MemoryGroups::new());
    let admins = groups.add(GroupDescription::new("g-admins", "Administrators"));
    let users = groups.add(GroupDescription::new("g-users", "Registered Users").visible_to_all());
    let admin = Caller::new("admin");
    groups.add_member(&GroupId::new("g-admins"), &admin);
    groups.add_member(&GroupId::new("g-users"), &admin);
    bootstrap(&store, &settings, &admins, Some(&users), &admin).unwrap();
    World { dir, store, groups, settings, admins, users, admin }
}

impl World {
    pub fn service(&self) -> AccessService {
        AccessService::new(self.store.clone(), self.store.clone(), self.groups.clone(), self.settings.clone())
    }

    /// Registered user, member of the given groups
    pub fn user(&self, name: &str, groups: &[&str]) -> Caller {
        let c = Caller::new(name);
        self.groups.add_member(&GroupId::new("g-users"), &c);
        for g in groups {
            self.groups.add_member(&GroupId::new(*g), &c);
        }
        c
    }

    pub fn group(&self, id: &str, name: &str) -> GroupRef {
        self.groups.add(GroupDescription::new(id, name))
    }

    pub fn project(&self, name: &str, parent: Option<&str>) {
        create_project(&self.store, &self.settings, name, parent, &self.admin).unwrap();
    }

    pub fn head(&self, project: &str) -> refacl::RevisionId {
        self.store.head(project).unwrap().unwrap()
    }

    /// Add sections to a project as the administrator
    pub fn admin_add(&self, project: &str, sections: Vec<AccessSection>) -> refacl::AccessView {
        let svc = self.service();
        let view = svc.get_access_view(project, &self.admin).unwrap();
        let mut all = view.sections();
        all.extend(sections);
        svc.update_access_direct(project, &self.admin, refacl::AccessUpdate::new(view.revision).with_sections(all))
            .unwrap()
    }
}

/// Section with one permission granted to the named groups
pub fn section(name: &str, permission: &str, groups: &[&str]) -> AccessSection {
    let mut p = Permission::new(permission);
    for g in groups {
        p.add_rule(PermissionRule::new(GroupRef::named(*g)));
    }
    AccessSection::new(name).unwrap().with_permission(p)
}

/// Section denying one permission to one group
pub fn denied(name: &str, permission: &str, group: &str) -> AccessSection {
    let rule = PermissionRule::new(GroupRef::named(group)).with_action(Action::Deny);
    AccessSection::new(name).unwrap().with_permission(Permission::new(permission).with_rule(rule))
}
