//! Terminal workflows: commit a merged configuration or propose it for review

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::constants::{ALL_REFS, OWNER};
use crate::error::{AclError, Result};
use crate::group::{GroupBackend, GroupResolver};
use crate::merge::Merged;
use crate::model::{Action, Caller, GroupId, ProjectConfig};
use crate::store::{hex, ConfigStore, ProposalDraft, ProposalId, ReviewStore, RevisionId, Snapshot};

/// Commit `merged` onto the configuration ref if it still points at `base`
pub fn commit(store: &dyn ConfigStore, project: &str, merged: &Merged, base: &RevisionId, author: &Caller)
    -> Result<RevisionId> {
    store.commit(project, base, &merged.config, &merged.message, author)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalOutcome {
    Created(ProposalId),
    /// Merged configuration equals the base; nothing was written
    NoOp,
}

/// Random change key: `I` followed by 40 hex digits
pub fn change_key(project: &str, caller: &Caller) -> Result<String> {
    let mut seed = [0u8; 32];
    getrandom::getrandom(&mut seed).map_err(|e| AclError::Storage(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(project.as_bytes());
    hasher.update([0]);
    hasher.update(caller.as_str().as_bytes());
    Ok(format!("I{}", hex::encode(&hasher.finalize()[..20])))
}

/// Inputs shared by every proposal of one request
pub struct ReviewCommit<'a> {
    pub reviews: &'a dyn ReviewStore,
    pub groups: &'a dyn GroupBackend,
    pub add_owners_as_reviewers: bool,
}

impl ReviewCommit<'_> {
    /// Write `merged` on a change ref parented at `base` and record a proposal
    pub fn propose(&self, project: &str, base: &Snapshot, merged: &Merged, caller: &Caller) -> Result<ProposalOutcome> {
        if merged.config.canonical_bytes()? == base.config.canonical_bytes()? {
            debug!(project, base = %base.revision, "proposal changes nothing");
            return Ok(ProposalOutcome::NoOp);
        }

        let change_key = change_key(project, caller)?;
        let draft = ProposalDraft {
            project: project.to_string(),
            base: base.revision.clone(),
            config: merged.config.clone(),
            message: format!("{}\nChange-Id: {}\n", merged.message, change_key),
            subject: merged.message.lines().next().unwrap_or_default().to_string(),
            change_key,
            author: caller.clone(),
        };
        let proposal = self.reviews.create_proposal(&draft)?;
        info!(project, proposal = %proposal.id, revision = %proposal.revision, "created access proposal");

        if self.add_owners_as_reviewers {
            self.add_owner_reviewers(proposal.id, &merged.config, caller);
        }
        Ok(ProposalOutcome::Created(proposal.id))
    }

    /// Best effort; failures are logged and dropped
    fn add_owner_reviewers(&self, id: ProposalId, config: &ProjectConfig, caller: &Caller) {
        let mut resolver = GroupResolver::new(self.groups);
        let mut reviewers: Vec<GroupId> = Vec::new();
        for gid in owner_groups(config) {
            if resolver.is_visible(&gid, caller) {
                reviewers.push(gid);
            } else {
                debug!(proposal = %id, group = %gid, "owner group not visible, not added as reviewer");
            }
        }
        if reviewers.is_empty() {
            return;
        }
        if let Err(e) = self.reviews.add_reviewers(id, &reviewers) {
            warn!(proposal = %id, error = %e, "failed to add owner groups as reviewers");
        }
    }
}

/// Groups granted `owner` on `refs/*`
pub fn owner_groups(config: &ProjectConfig) -> Vec<GroupId> {
    config
        .section(ALL_REFS)
        .and_then(|s| s.permission(OWNER))
        .map(|p| {
            p.rules()
                .iter()
                .filter(|r| r.action == Action::Allow)
                .filter_map(|r| r.group.id.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_keys_look_like_change_ids() {
        let a = change_key("p", &Caller::new("alice")).unwrap();
        let b = change_key("p", &Caller::new("alice")).unwrap();
        assert_eq!(a.len(), 41);
        assert!(a.starts_with('I'));
        assert!(a[1..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
