//! Storage contracts: configuration store, review store, project cache
//!
//! Revisions are content-addressed: a revision id is the SHA-256 of the parent
//! revision, author, message and canonical configuration bytes.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::REFS_CHANGES;
use crate::error::Result;
use crate::model::{Caller, GroupId, ProjectConfig};

/// Opaque revision identifier (hex content hash)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub String);

impl RevisionId {
    pub fn compute(parent: Option<&RevisionId>, author: &Caller, message: &str, config: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(parent.map(|p| p.0.as_str()).unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update(author.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(message.as_bytes());
        hasher.update([0]);
        hasher.update(config);
        RevisionId(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex encode
pub(crate) mod hex {
    pub fn encode(data: impl AsRef<[u8]>) -> String {
        data.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// A configuration together with the revision it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: RevisionId,
    pub config: ProjectConfig,
}

/// A stored commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub project: String,
    pub parent: Option<RevisionId>,
    pub author: Caller,
    pub message: String,
    pub config: ProjectConfig,
}

impl CommitRecord {
    pub fn revision(&self) -> Result<RevisionId> {
        Ok(RevisionId::compute(self.parent.as_ref(), &self.author, &self.message, &self.config.canonical_bytes()?))
    }
}

/// Versioned storage of project configurations
pub trait ConfigStore: Send + Sync {
    /// Current revision of the project's configuration ref
    fn head(&self, project: &str) -> Result<Option<RevisionId>>;

    fn exists(&self, project: &str) -> Result<bool> {
        Ok(self.head(project)?.is_some())
    }

    /// Read at `revision`, or at the current head when omitted
    fn read(&self, project: &str, revision: Option<&RevisionId>) -> Result<Snapshot>;

    /// Compare-and-swap commit to the configuration ref; `StaleBase` if the
    /// head moved away from `base`
    fn commit(&self, project: &str, base: &RevisionId, config: &ProjectConfig, message: &str, author: &Caller)
        -> Result<RevisionId>;
}

// ============================================================================
// Review proposals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub u64);

impl ProposalId {
    /// Ref holding the proposed commit, sharded by the last two digits
    pub fn change_ref(self) -> String {
        format!("{}{:02}/{}/1", REFS_CHANGES, self.0 % 100, self.0)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    New,
}

/// A reviewable, not yet committed configuration change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    /// `I` followed by 40 hex digits
    pub change_key: String,
    pub project: String,
    /// Branch the change would land on
    pub destination: String,
    /// Ref holding the proposed commit
    pub ref_name: String,
    pub revision: RevisionId,
    pub base: RevisionId,
    pub author: Caller,
    pub subject: String,
    pub message: String,
    pub status: ProposalStatus,
    #[serde(default)]
    pub reviewers: BTreeSet<GroupId>,
}

/// Everything a proposal needs before the store numbers it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalDraft {
    pub project: String,
    pub base: RevisionId,
    pub config: ProjectConfig,
    pub change_key: String,
    pub author: Caller,
    pub subject: String,
    /// Full commit message, `Change-Id` footer included
    pub message: String,
}

pub trait ReviewStore: Send + Sync {
    /// Number the draft, commit it on its change ref parented at the base and
    /// record the proposal; nothing is left behind on failure
    fn create_proposal(&self, draft: &ProposalDraft) -> Result<Proposal>;

    fn add_reviewers(&self, id: ProposalId, reviewers: &[GroupId]) -> Result<()>;

    fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>>;
}

/// Read-through caches of project state outside this crate
pub trait ProjectCache: Send + Sync {
    fn evict(&self, project: &str);
}

/// Cache that holds nothing
pub struct NoCache;

impl ProjectCache for NoCache {
    fn evict(&self, _project: &str) {}
}
