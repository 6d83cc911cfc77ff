//! refacl - Project access-control resolution and versioned ACL updates
//!
//! A project's access configuration is a set of sections (global
//! capabilities, project capabilities, or a ref pattern) holding permissions
//! granted to groups. Projects inherit from a parent up to a single root.
//!
//! ```text
//! caller -> AccessService -> ProjectControl (who may do what)
//!                         -> MergeEngine    (filter + resolve groups)
//!                         -> write::commit  (compare-and-swap on refs/meta/config)
//!                         -> ReviewCommit   (change ref + proposal)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let store = Arc::new(LmdbStore::open("./data", &settings)?);
//! bootstrap(&store, &settings, &admins, Some(&users), &root)?;
//! let service = AccessService::new(store.clone(), store, groups, settings);
//! let view = service.get_access_view("my-project", &caller)?;
//! let update = AccessUpdate::new(view.revision.clone()).with_sections(edited);
//! service.update_access_direct("my-project", &caller, update)?;
//! ```

mod tx;

pub mod bootstrap;
pub mod constants;
pub mod control;
pub mod db;
pub mod error;
pub mod group;
pub mod keys;
pub mod merge;
pub mod model;
pub mod pattern;
pub mod read;
pub mod service;
pub mod settings;
pub mod store;
pub mod write;

pub use bootstrap::{bootstrap, create_project, is_bootstrapped};
pub use control::{AuthorizationContext, ProjectControl};
pub use db::LmdbStore;
pub use error::{AclError, Result};
pub use group::{GroupBackend, GroupDescription, GroupResolver, MemoryGroups};
pub use merge::{MergeEngine, Merged};
pub use model::{AccessSection, Action, Caller, GroupId, GroupRef, Permission, PermissionRule, ProjectConfig, SectionScope};
pub use pattern::RefPattern;
pub use read::{AccessView, GroupInfo};
pub use service::{AccessService, AccessUpdate};
pub use settings::Settings;
pub use store::{
    ConfigStore, NoCache, ProjectCache, Proposal, ProposalDraft, ProposalId, ProposalStatus, ReviewStore, RevisionId,
    Snapshot,
};
pub use write::ProposalOutcome;
