//! LMDB-backed configuration and review store

use std::path::Path;

use byteorder::BigEndian;
use heed::types::{Bytes, Str, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use tracing::{debug, info};

use crate::constants::REFS_CONFIG;
use crate::error::{err, AclError, Result};
use crate::keys::{build_prefix, parse_ref, ref_key};
use crate::model::{Caller, GroupId, ProjectConfig};
use crate::settings::Settings;
use crate::store::{
    CommitRecord, ConfigStore, Proposal, ProposalDraft, ProposalId, ProposalStatus, ReviewStore, RevisionId, Snapshot,
};
use crate::tx::Tx;

const PROPOSAL_COUNTER: &str = "next_proposal";

/// All database handles
pub struct Dbs {
    /// revision -> JSON `CommitRecord`
    pub commits: Database<Str, Bytes>,
    /// [project][ref] -> revision
    pub refs: Database<Bytes, Str>,
    /// proposal number -> JSON `Proposal`
    pub proposals: Database<U64<BigEndian>, Bytes>,
    /// counters
    pub meta: Database<Str, U64<BigEndian>>,
}

/// Store keeping every project's configuration history in one LMDB environment
pub struct LmdbStore {
    env: Env,
    dbs: Dbs,
}

impl LmdbStore {
    /// Open (creating if needed) the environment at `path`
    pub fn open(path: impl AsRef<Path>, settings: &Settings) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other processes access this path concurrently during open.
        let env = unsafe { EnvOpenOptions::new().map_size(settings.map_size).max_dbs(4).open(path).map_err(err)? };
        let mut tx = env.write_txn().map_err(err)?;
        let dbs = Dbs {
            commits: env.create_database(&mut tx, Some("commits")).map_err(err)?,
            refs: env.create_database(&mut tx, Some("refs")).map_err(err)?,
            proposals: env.create_database(&mut tx, Some("proposals")).map_err(err)?,
            meta: env.create_database(&mut tx, Some("meta")).map_err(err)?,
        };
        tx.commit().map_err(err)?;
        debug!(path = %path.display(), "opened access store");
        Ok(LmdbStore { env, dbs })
    }

    /// Execute a read-only operation
    #[inline]
    fn view<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        f(&self.dbs, &self.env.read_txn().map_err(err)?)
    }

    /// Run multiple writes in a single transaction
    pub(crate) fn transact<T, F: FnOnce(&mut Tx) -> Result<T>>(&self, f: F) -> Result<T> {
        let mut tx = Tx::new(self.env.write_txn().map_err(err)?, &self.dbs);
        let r = f(&mut tx)?;
        tx.commit()?;
        Ok(r)
    }

    /// Create a project with its first configuration revision
    pub fn create_project(&self, config: &ProjectConfig, message: &str, author: &Caller) -> Result<RevisionId> {
        let rev = self.transact(|tx| {
            if tx.get_ref(&config.project, REFS_CONFIG)?.is_some() {
                return Err(AclError::ProjectExists(config.project.clone()));
            }
            let record = CommitRecord {
                project: config.project.clone(),
                parent: None,
                author: author.clone(),
                message: message.to_string(),
                config: config.clone(),
            };
            tx.commit_on(REFS_CONFIG, &record)
        })?;
        info!(project = %config.project, revision = %rev, "created project");
        Ok(rev)
    }

    /// Every project with a configuration ref
    pub fn projects(&self) -> Result<Vec<String>> {
        self.view(|d, tx| {
            let mut r = Vec::new();
            for item in d.refs.iter(tx).map_err(err)? {
                let (k, _) = item.map_err(err)?;
                if let Some((project, REFS_CONFIG)) = parse_ref(k) {
                    r.push(project.to_string());
                }
            }
            Ok(r)
        })
    }

    /// Every ref of a project with the revision it points at
    pub fn refs(&self, project: &str) -> Result<Vec<(String, RevisionId)>> {
        let prefix = build_prefix(&[project])?;
        self.view(|d, tx| {
            let mut r = Vec::new();
            for item in d.refs.prefix_iter(tx, &prefix).map_err(err)? {
                let (k, v) = item.map_err(err)?;
                if let Some((p, name)) = parse_ref(k) {
                    if p == project {
                        r.push((name.to_string(), RevisionId(v.to_string())));
                    }
                }
            }
            Ok(r)
        })
    }

    pub fn commit_record(&self, rev: &RevisionId) -> Result<Option<CommitRecord>> {
        self.view(|d, tx| match d.commits.get(tx, rev.as_str()).map_err(err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        })
    }

    /// Clear all databases (for testing)
    pub fn clear_all(&self) -> Result<()> {
        let mut tx = self.env.write_txn().map_err(err)?;
        self.dbs.commits.clear(&mut tx).map_err(err)?;
        self.dbs.refs.clear(&mut tx).map_err(err)?;
        self.dbs.proposals.clear(&mut tx).map_err(err)?;
        self.dbs.meta.clear(&mut tx).map_err(err)?;
        tx.commit().map_err(err)
    }
}

impl ConfigStore for LmdbStore {
    fn head(&self, project: &str) -> Result<Option<RevisionId>> {
        let key = ref_key(project, REFS_CONFIG)?;
        self.view(|d, tx| Ok(d.refs.get(tx, &key).map_err(err)?.map(|s| RevisionId(s.to_string()))))
    }

    fn read(&self, project: &str, revision: Option<&RevisionId>) -> Result<Snapshot> {
        let revision = match revision {
            Some(r) => r.clone(),
            None => self.head(project)?.ok_or_else(|| AclError::NoSuchProject(project.to_string()))?,
        };
        let record = self.commit_record(&revision)?.filter(|c| c.project == project);
        match record {
            Some(c) => Ok(Snapshot { revision, config: c.config }),
            None => Err(AclError::NoSuchRevision(revision.to_string())),
        }
    }

    fn commit(&self, project: &str, base: &RevisionId, config: &ProjectConfig, message: &str, author: &Caller)
        -> Result<RevisionId> {
        let rev = self.transact(|tx| {
            let head = tx.get_ref(project, REFS_CONFIG)?.ok_or_else(|| AclError::NoSuchProject(project.to_string()))?;
            if head != *base {
                return Err(AclError::StaleBase { expected: base.to_string(), actual: head.to_string() });
            }
            let record = CommitRecord {
                project: project.to_string(),
                parent: Some(base.clone()),
                author: author.clone(),
                message: message.to_string(),
                config: config.for_project(project),
            };
            tx.commit_on(REFS_CONFIG, &record)
        })?;
        info!(project, base = %base, revision = %rev, "committed access configuration");
        Ok(rev)
    }
}

impl ReviewStore for LmdbStore {
    fn create_proposal(&self, draft: &ProposalDraft) -> Result<Proposal> {
        let proposal = self.transact(|tx| {
            let id = ProposalId(tx.next_id(PROPOSAL_COUNTER)?);
            if tx.get_proposal(id)?.is_some() {
                return Err(AclError::Storage(format!("proposal {} already exists", id)));
            }
            let ref_name = id.change_ref();
            let record = CommitRecord {
                project: draft.project.clone(),
                parent: Some(draft.base.clone()),
                author: draft.author.clone(),
                message: draft.message.clone(),
                config: draft.config.for_project(&draft.project),
            };
            let revision = tx.commit_on(&ref_name, &record)?;
            let proposal = Proposal {
                id,
                change_key: draft.change_key.clone(),
                project: draft.project.clone(),
                destination: REFS_CONFIG.to_string(),
                ref_name,
                revision,
                base: draft.base.clone(),
                author: draft.author.clone(),
                subject: draft.subject.clone(),
                message: draft.message.clone(),
                status: ProposalStatus::New,
                reviewers: Default::default(),
            };
            tx.put_proposal(&proposal)?;
            Ok(proposal)
        })?;
        info!(project = %proposal.project, proposal = %proposal.id, ref_name = %proposal.ref_name, "stored proposal");
        Ok(proposal)
    }

    fn add_reviewers(&self, id: ProposalId, reviewers: &[GroupId]) -> Result<()> {
        self.transact(|tx| {
            let mut p = tx.get_proposal(id)?.ok_or_else(|| AclError::Storage(format!("proposal {} not found", id)))?;
            p.reviewers.extend(reviewers.iter().cloned());
            tx.put_proposal(&p)
        })
    }

    fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>> {
        self.view(|d, tx| match d.proposals.get(tx, &id.0).map_err(err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(base: RevisionId) -> ProposalDraft {
        ProposalDraft {
            project: "p".into(),
            base,
            config: ProjectConfig::new("p"),
            change_key: format!("I{}", "0".repeat(40)),
            author: Caller::new("alice"),
            subject: "Review access change".into(),
            message: "Review access change\n".into(),
        }
    }

    #[test]
    fn failed_proposal_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path(), &Settings::default()).unwrap();
        let base = store.create_project(&ProjectConfig::new("p"), "Create project\n", &Caller::new("admin")).unwrap();

        let unknown = RevisionId("f".repeat(64));
        let err = store.create_proposal(&draft(unknown.clone())).unwrap_err();
        assert_eq!(err, AclError::NoSuchRevision(unknown.to_string()));
        assert_eq!(store.refs("p").unwrap().len(), 1);
        assert!(store.proposal(ProposalId(1)).unwrap().is_none());

        let proposal = store.create_proposal(&draft(base.clone())).unwrap();
        assert_eq!(proposal.id, ProposalId(1));
        assert_eq!(proposal.ref_name, "refs/changes/01/1/1");
        assert_eq!(store.proposal(proposal.id).unwrap(), Some(proposal.clone()));
        assert!(store.refs("p").unwrap().contains(&(proposal.ref_name.clone(), proposal.revision.clone())));
        assert_eq!(store.head("p").unwrap(), Some(base));
    }
}
