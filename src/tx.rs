//! Transaction wrapper for store writes
//!
//! LMDB admits one write transaction at a time, so a check-then-write inside
//! one `Tx` is atomic with respect to every other writer.

use heed::RwTxn;

use crate::db::Dbs;
use crate::error::{err, AclError, Result};
use crate::keys::ref_key;
use crate::store::{CommitRecord, Proposal, ProposalId, RevisionId};

/// Transaction wrapper for batched writes
pub struct Tx<'e> {
    txn: RwTxn<'e>,
    dbs: &'e Dbs,
}

impl<'e> Tx<'e> {
    #[inline]
    pub(crate) fn new(txn: RwTxn<'e>, dbs: &'e Dbs) -> Self {
        Tx { txn, dbs }
    }

    #[inline]
    pub(crate) fn commit(self) -> Result<()> {
        self.txn.commit().map_err(err)
    }

    /// Revision a ref points at
    pub fn get_ref(&self, project: &str, ref_name: &str) -> Result<Option<RevisionId>> {
        let key = ref_key(project, ref_name)?;
        Ok(self.dbs.refs.get(&self.txn, &key).map_err(err)?.map(|s| RevisionId(s.to_string())))
    }

    pub fn set_ref(&mut self, project: &str, ref_name: &str, rev: &RevisionId) -> Result<()> {
        let key = ref_key(project, ref_name)?;
        self.dbs.refs.put(&mut self.txn, &key, rev.as_str()).map_err(err)
    }

    pub fn get_commit(&self, rev: &RevisionId) -> Result<Option<CommitRecord>> {
        match self.dbs.commits.get(&self.txn, rev.as_str()).map_err(err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    /// Store a commit under its content hash
    pub fn put_commit(&mut self, record: &CommitRecord) -> Result<RevisionId> {
        let rev = record.revision()?;
        let bytes = serde_json::to_vec(record)?;
        self.dbs.commits.put(&mut self.txn, rev.as_str(), &bytes).map_err(err)?;
        Ok(rev)
    }

    /// Write a commit parented at `base` and move `ref_name` to it
    pub fn commit_on(&mut self, ref_name: &str, record: &CommitRecord) -> Result<RevisionId> {
        if let Some(base) = &record.parent {
            if self.get_commit(base)?.map_or(true, |c| c.project != record.project) {
                return Err(AclError::NoSuchRevision(base.to_string()));
            }
        }
        let rev = self.put_commit(record)?;
        self.set_ref(&record.project, ref_name, &rev)?;
        Ok(rev)
    }

    pub fn next_id(&mut self, counter: &str) -> Result<u64> {
        let id = self.dbs.meta.get(&self.txn, counter).map_err(err)?.unwrap_or(1);
        self.dbs.meta.put(&mut self.txn, counter, &(id + 1)).map_err(err)?;
        Ok(id)
    }

    pub fn get_proposal(&self, id: ProposalId) -> Result<Option<Proposal>> {
        match self.dbs.proposals.get(&self.txn, &id.0).map_err(err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_proposal(&mut self, proposal: &Proposal) -> Result<()> {
        let bytes = serde_json::to_vec(proposal)?;
        self.dbs.proposals.put(&mut self.txn, &proposal.id.0, &bytes).map_err(err)
    }
}
