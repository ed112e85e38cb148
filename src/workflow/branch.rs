//! Branch coordination.
//!
//! Decides which branch a ticket works on: its own deterministic feature
//! branch, or its epic's shared branch. Branch names are externally visible
//! contract (`feature/<8-char-id>-<slug>` and
//! `feature/epic-<8-char-id>-<slug>`); other tooling greps for them.

use super::WorkflowStore;
use crate::git;
use crate::models::{Epic, EpicWorkflowState, Ticket};
use crate::{Error, Result};
use chrono::Utc;
use std::path::Path;

/// Maximum slug length in a branch name.
const SLUG_MAX: usize = 50;

/// Outcome of branch resolution.
#[derive(Debug, Clone)]
pub struct BranchResolution {
    /// The branch now checked out
    pub branch_name: String,
    /// Whether this call created the branch
    pub created: bool,
    /// Whether the branch is the epic's shared branch
    pub using_epic_branch: bool,
    /// Branch that was checked out before resolution, for rollback
    pub previous_branch: String,
}

/// Turn a title into a branch-name slug: lowercase, runs of
/// non-alphanumerics collapsed to single dashes, at most [`SLUG_MAX`] chars.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.truncate(SLUG_MAX);
    slug.trim_end_matches('-').to_string()
}

/// Deterministic branch name for a ticket without an epic.
pub fn ticket_branch_name(ticket: &Ticket) -> String {
    format!("feature/{}-{}", ticket.short_id(), slugify(&ticket.title))
}

/// Deterministic shared branch name for an epic.
pub fn epic_branch_name(epic: &Epic) -> String {
    format!("feature/epic-{}-{}", epic.short_id(), slugify(&epic.title))
}

/// Resolve the working branch for a ticket and check it out.
///
/// Tickets with an epic ride the epic's shared branch; tickets without one
/// get their own feature branch created from the current HEAD. Any git
/// failure aborts before the record store is touched.
pub fn resolve<S: WorkflowStore>(
    store: &S,
    ticket: &Ticket,
    workdir: &Path,
) -> Result<BranchResolution> {
    if let Some(epic_id) = &ticket.epic_id {
        let epic = store.epic(epic_id)?;
        return resolve_epic(store, &epic, workdir);
    }

    let previous_branch = git::current_branch(workdir)?;
    let branch_name = ticket_branch_name(ticket);

    let created = if git::branch_exists(workdir, &branch_name)? {
        git::checkout(workdir, &branch_name)?;
        false
    } else {
        git::create_branch(workdir, &branch_name)?;
        true
    };

    Ok(BranchResolution {
        branch_name,
        created,
        using_epic_branch: false,
        previous_branch,
    })
}

/// Resolve the shared branch for an epic and check it out.
///
/// Once a branch name is recorded in the epic's workflow state it is
/// authoritative. A recorded branch that no longer exists is a reportable
/// inconsistency, not a silent re-create: substituting a fresh branch would
/// split the epic's commit history without the caller's knowledge.
pub fn resolve_epic<S: WorkflowStore>(
    store: &S,
    epic: &Epic,
    workdir: &Path,
) -> Result<BranchResolution> {
    let previous_branch = git::current_branch(workdir)?;
    let mut state = store
        .epic_state(&epic.id)?
        .unwrap_or_else(|| EpicWorkflowState::new(epic.id.clone()));

    if let Some(recorded) = state.branch_name.clone() {
        if !git::branch_exists(workdir, &recorded)? {
            return Err(Error::EpicBranchMissing {
                epic: epic.id.clone(),
                branch: recorded,
            });
        }
        git::checkout(workdir, &recorded)?;
        return Ok(BranchResolution {
            branch_name: recorded,
            created: false,
            using_epic_branch: true,
            previous_branch,
        });
    }

    // First resolution for this epic: branch off trunk.
    let branch_name = epic_branch_name(epic);
    let trunk = git::detect_trunk(workdir)?;
    git::checkout(workdir, &trunk)?;

    let created = if git::branch_exists(workdir, &branch_name)? {
        git::checkout(workdir, &branch_name)?;
        false
    } else {
        git::create_branch(workdir, &branch_name)?;
        true
    };

    // The branch name must be durable before anyone builds on it; if the
    // write fails, undo the checkout/create so no orphan branch survives.
    state.branch_name = Some(branch_name.clone());
    state.branch_created_at = Some(Utc::now());
    if let Err(e) = store.upsert_epic_state(&state) {
        if let Err(restore) = git::checkout(workdir, &previous_branch) {
            eprintln!(
                "Warning: could not restore branch '{}': {}",
                previous_branch, restore
            );
        }
        if created {
            if let Err(delete) = git::delete_branch(workdir, &branch_name) {
                eprintln!(
                    "Warning: could not delete branch '{}': {}",
                    branch_name, delete
                );
            }
        }
        return Err(e);
    }

    Ok(BranchResolution {
        branch_name,
        created,
        using_epic_branch: true,
        previous_branch,
    })
}
