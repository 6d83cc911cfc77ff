//! The exposed access operations

use std::sync::Arc;

use tracing::{debug, info};

use crate::control::{AuthorizationContext, ProjectControl};
use crate::error::{AclError, Result};
use crate::group::GroupBackend;
use crate::merge::{MergeEngine, Merged};
use crate::model::{AccessSection, Caller, ProjectConfig};
use crate::read::{self, AccessView};
use crate::settings::Settings;
use crate::store::{ConfigStore, NoCache, ProjectCache, ReviewStore, RevisionId};
use crate::write::{self, ProposalOutcome, ReviewCommit};

/// A caller's edit of one project's access configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUpdate {
    /// Revision the caller read before editing
    pub base: RevisionId,
    /// Full desired set of sections
    pub sections: Vec<AccessSection>,
    pub message: Option<String>,
    pub parent: Option<String>,
}

impl AccessUpdate {
    pub fn new(base: RevisionId) -> Self {
        AccessUpdate { base, sections: Vec::new(), message: None, parent: None }
    }

    pub fn with_sections(mut self, sections: Vec<AccessSection>) -> Self {
        self.sections = sections;
        self
    }

    pub fn with_section(mut self, section: AccessSection) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

pub struct AccessService {
    store: Arc<dyn ConfigStore>,
    reviews: Arc<dyn ReviewStore>,
    groups: Arc<dyn GroupBackend>,
    cache: Arc<dyn ProjectCache>,
    settings: Settings,
}

impl AccessService {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        reviews: Arc<dyn ReviewStore>,
        groups: Arc<dyn GroupBackend>,
        settings: Settings,
    ) -> Self {
        AccessService { store, reviews, groups, cache: Arc::new(NoCache), settings }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ProjectCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Authorization context for a project the caller can see; hidden and
    /// missing projects both report `NoSuchProject`
    pub fn control(&self, project: &str, caller: &Caller) -> Result<ProjectControl> {
        let control = ProjectControl::load(self.store.as_ref(), self.groups.as_ref(), &self.settings, project, caller)?;
        if !control.is_visible() {
            debug!(project, caller = %caller, "project hidden from caller");
            return Err(AclError::NoSuchProject(project.to_string()));
        }
        Ok(control)
    }

    pub fn get_access_view(&self, project: &str, caller: &Caller) -> Result<AccessView> {
        let control = self.control(project, caller)?;
        let snapshot = self.store.read(project, None)?;
        Ok(read::project(&snapshot, &control, self.groups.as_ref(), &self.settings.all_projects))
    }

    /// Merge and commit immediately; only sections the caller administers change
    pub fn update_access_direct(&self, project: &str, caller: &Caller, update: AccessUpdate) -> Result<AccessView> {
        let control = self.control(project, caller)?;
        let base = self.store.read(project, Some(&update.base))?;
        let mut merged = self.merge(&base.config, update.sections, &control, true, update.message.as_deref(),
            &self.settings.default_message)?;
        if let Some(parent) = update.parent.as_deref() {
            if Some(parent) != base.config.inherits_from(&self.settings.all_projects) {
                if !control.is_server_admin() {
                    return Err(AclError::PermissionDenied(format!("{} may not change the parent of {}", caller, project)));
                }
                self.set_parent(&mut merged.config, parent)?;
            }
        }

        let revision = write::commit(self.store.as_ref(), project, &merged, &base.revision, caller)?;
        self.cache.evict(project);
        info!(project, caller = %caller, revision = %revision, skipped = merged.skipped.len(), "updated access");
        self.get_access_view(project, caller)
    }

    /// Merge without owner filtering and record the result as a review proposal.
    /// Whatever the caller's view of the base withheld is carried over unchanged.
    pub fn propose_access_change(&self, project: &str, caller: &Caller, update: AccessUpdate)
        -> Result<ProposalOutcome> {
        let control = self.control(project, caller)?;
        let base = self.store.read(project, Some(&update.base))?;
        let seen = read::project(&base, &control, self.groups.as_ref(), &self.settings.all_projects);
        let sections = read::reinstate_hidden(&base.config, &seen, update.sections);
        let mut merged = self.merge(&base.config, sections, &control, false, update.message.as_deref(),
            &self.settings.review_message)?;
        if let Some(parent) = update.parent.as_deref() {
            if Some(parent) != base.config.inherits_from(&self.settings.all_projects) {
                self.set_parent(&mut merged.config, parent)?;
            }
        }

        let review = ReviewCommit {
            reviews: self.reviews.as_ref(),
            groups: self.groups.as_ref(),
            add_owners_as_reviewers: self.settings.add_owners_as_reviewers,
        };
        review.propose(project, &base, &merged, caller)
    }

    fn merge(
        &self,
        config: &ProjectConfig,
        sections: Vec<AccessSection>,
        auth: &dyn AuthorizationContext,
        authorize_owner_only: bool,
        message: Option<&str>,
        fallback: &str,
    ) -> Result<Merged> {
        MergeEngine::new(self.groups.as_ref(), &self.settings).merge(
            config,
            sections,
            auth,
            authorize_owner_only,
            message,
            fallback,
        )
    }

    /// Point `config` at a new parent, rejecting the root, unknown parents and cycles
    fn set_parent(&self, config: &mut ProjectConfig, parent: &str) -> Result<()> {
        let root = self.settings.all_projects.as_str();
        if config.project == root {
            return Err(AclError::InvalidParent(format!("{} cannot inherit from another project", root)));
        }
        if parent == config.project {
            return Err(AclError::InvalidParent(format!("{} cannot inherit from itself", parent)));
        }
        if !self.store.exists(parent)? {
            return Err(AclError::NoSuchProject(parent.to_string()));
        }
        let mut current = parent.to_string();
        for _ in 0..self.settings.max_inheritance_depth {
            let up = self.store.read(&current, None)?.config;
            match up.inherits_from(root) {
                Some(p) if p == config.project => {
                    return Err(AclError::InvalidParent(format!("{} is a descendant of {}", parent, config.project)));
                }
                Some(p) if self.store.exists(p)? => current = p.to_string(),
                _ => break,
            }
        }
        config.parent = Some(parent.to_string());
        Ok(())
    }
}
