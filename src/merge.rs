//! Merge of proposed sections into an existing configuration
//!
//! Per-section authorization filters what a caller may touch; group
//! resolution is all-or-nothing. Nothing here writes to a store.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::constants::{is_global_capability, is_ref_permission};
use crate::control::AuthorizationContext;
use crate::error::{AclError, Result};
use crate::group::{GroupBackend, GroupResolver};
use crate::model::{AccessSection, ProjectConfig, SectionScope};
use crate::settings::Settings;

/// Result of a successful merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub config: ProjectConfig,
    /// Newline-terminated commit message
    pub message: String,
    /// Sections the caller proposed but was not authorized to change
    pub skipped: BTreeSet<String>,
    /// Sections removed because the proposal omitted them
    pub removed: BTreeSet<String>,
}

pub struct MergeEngine<'a> {
    groups: &'a dyn GroupBackend,
    settings: &'a Settings,
}

impl<'a> MergeEngine<'a> {
    pub fn new(groups: &'a dyn GroupBackend, settings: &'a Settings) -> Self {
        MergeEngine { groups, settings }
    }

    /// Merge `proposed` into `config`.
    ///
    /// With `authorize_owner_only` set, sections the caller cannot administer
    /// are skipped and existing ones kept; without it every proposed section
    /// applies and omitted sections are deleted. `message` falls back to
    /// `fallback` when empty.
    pub fn merge(
        &self,
        config: &ProjectConfig,
        proposed: Vec<AccessSection>,
        auth: &dyn AuthorizationContext,
        authorize_owner_only: bool,
        message: Option<&str>,
        fallback: &str,
    ) -> Result<Merged> {
        let mut working = config.clone();
        let mut to_delete: BTreeSet<String> = config.section_names().cloned().collect();
        let mut skipped = BTreeSet::new();
        let mut resolver = GroupResolver::new(self.groups);

        for mut section in dedupe(proposed) {
            let name = section.name();
            to_delete.remove(&name);
            if authorize_owner_only && !authorized_for(auth, section.scope()) {
                debug!(project = %config.project, section = %name, caller = %auth.caller(), "skipping unauthorized section");
                skipped.insert(name);
                continue;
            }
            self.validate(config, &section)?;
            for permission in section.permissions_mut() {
                let rules = std::mem::take(permission.rules_mut());
                for mut rule in rules {
                    rule.group = resolver.resolve(&rule.group)?;
                    permission.add_rule(rule);
                }
            }
            working.put_section(section);
        }

        let mut removed = BTreeSet::new();
        for name in to_delete {
            let scope = SectionScope::parse(&name)?;
            if !authorize_owner_only || authorized_for(auth, &scope) {
                working.remove_section(&name);
                removed.insert(name);
            } else {
                debug!(project = %config.project, section = %name, "keeping section the caller cannot delete");
            }
        }

        Ok(Merged { config: working, message: Settings::commit_message(message, fallback), skipped, removed })
    }

    fn validate(&self, config: &ProjectConfig, section: &AccessSection) -> Result<()> {
        match section.scope() {
            SectionScope::GlobalCapabilities => {
                if config.project != self.settings.all_projects {
                    return Err(AclError::InvalidSection(format!(
                        "{} can only be set on {}",
                        section.name(),
                        self.settings.all_projects
                    )));
                }
                check_names(section, is_global_capability)
            }
            SectionScope::ProjectCapabilities => Ok(()),
            SectionScope::Ref(_) => check_names(section, is_ref_permission),
        }
    }
}

fn check_names(section: &AccessSection, known: fn(&str) -> bool) -> Result<()> {
    match section.permissions().find(|p| !known(&p.name)) {
        Some(p) => Err(AclError::InvalidPermission(p.name.clone())),
        None => Ok(()),
    }
}

/// May the caller administer sections of this scope?
pub fn authorized_for(auth: &dyn AuthorizationContext, scope: &SectionScope) -> bool {
    match scope {
        SectionScope::GlobalCapabilities | SectionScope::ProjectCapabilities => auth.is_server_admin(),
        SectionScope::Ref(pattern) => auth.owns(pattern),
    }
}

/// One section per name; later permissions replace earlier ones of the same name
fn dedupe(proposed: Vec<AccessSection>) -> Vec<AccessSection> {
    let mut out: Vec<AccessSection> = Vec::with_capacity(proposed.len());
    let mut index = HashMap::new();
    for section in proposed {
        match index.get(&section.name()) {
            Some(&i) => {
                let target: &mut AccessSection = &mut out[i];
                for p in section.permissions() {
                    target.put_permission(p.clone());
                }
            }
            None => {
                index.insert(section.name(), out.len());
                out.push(section);
            }
        }
    }
    out
}
