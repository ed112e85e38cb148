//! Version-control adapter.
//!
//! Every operation goes through [`run`], which executes `git` with an
//! argument array (never a shell interpreter, since ticket and epic titles
//! flow into branch names) and reports success, stdout, and stderr
//! uniformly. Helpers cover the fixed vocabulary the workflow engine needs:
//! verify repo, branch existence, checkout, create/delete branch, trunk
//! detection, diff stats, worktree add, and a bounded push.

use crate::{Error, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Outcome of a single git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Whether the command exited zero
    pub success: bool,
    /// Captured stdout, trimmed
    pub stdout: String,
    /// Captured stderr, trimmed
    pub stderr: String,
}

/// Run a git command in `cwd`, capturing output.
///
/// A nonzero exit is reported in the returned [`GitOutput`], not as an error;
/// only failure to spawn git at all is an `Err`.
pub fn run(args: &[&str], cwd: &Path) -> Result<GitOutput> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| Error::Other(format!("Failed to run git: {}", e)))?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Run a git command, turning a nonzero exit into `Error::Git` with the
/// command's own stderr.
fn run_checked(args: &[&str], cwd: &Path) -> Result<GitOutput> {
    let output = run(args, cwd)?;
    if !output.success {
        return Err(Error::Git {
            command: format!("git {}", args.join(" ")),
            stderr: if output.stderr.is_empty() {
                output.stdout.clone()
            } else {
                output.stderr.clone()
            },
        });
    }
    Ok(output)
}

/// Verify that `cwd` is inside a git working tree.
pub fn ensure_work_tree(cwd: &Path) -> Result<()> {
    let output = run(&["rev-parse", "--git-dir"], cwd)?;
    if !output.success {
        return Err(Error::Precondition(format!(
            "Not a git working tree: {}",
            cwd.display()
        )));
    }
    Ok(())
}

/// The branch currently checked out in `cwd`.
pub fn current_branch(cwd: &Path) -> Result<String> {
    let output = run_checked(&["rev-parse", "--abbrev-ref", "HEAD"], cwd)?;
    Ok(output.stdout)
}

/// Whether a local branch exists.
pub fn branch_exists(cwd: &Path, name: &str) -> Result<bool> {
    let refname = format!("refs/heads/{}", name);
    let output = run(&["show-ref", "--verify", "--quiet", &refname], cwd)?;
    Ok(output.success)
}

/// Check out an existing branch.
pub fn checkout(cwd: &Path, name: &str) -> Result<()> {
    run_checked(&["checkout", name], cwd)?;
    Ok(())
}

/// Create a branch from the current HEAD and check it out.
pub fn create_branch(cwd: &Path, name: &str) -> Result<()> {
    run_checked(&["checkout", "-b", name], cwd)?;
    Ok(())
}

/// Delete a local branch.
pub fn delete_branch(cwd: &Path, name: &str) -> Result<()> {
    run_checked(&["branch", "-D", name], cwd)?;
    Ok(())
}

/// Determine the trunk branch: `main` wins over `master` when both exist.
pub fn detect_trunk(cwd: &Path) -> Result<String> {
    for candidate in ["main", "master"] {
        if branch_exists(cwd, candidate)? {
            return Ok(candidate.to_string());
        }
    }
    Err(Error::Precondition(format!(
        "Could not determine trunk branch in {} (no 'main' or 'master')",
        cwd.display()
    )))
}

/// Number of commits on HEAD that are not on `trunk`.
pub fn commits_ahead(cwd: &Path, trunk: &str) -> Result<usize> {
    let range = format!("{}..HEAD", trunk);
    let output = run_checked(&["rev-list", "--count", &range], cwd)?;
    output
        .stdout
        .parse()
        .map_err(|e| Error::Other(format!("Unparseable rev-list count: {}", e)))
}

/// Files changed on HEAD relative to the merge base with `trunk`.
pub fn changed_files(cwd: &Path, trunk: &str) -> Result<Vec<String>> {
    let range = format!("{}...HEAD", trunk);
    let output = run_checked(&["diff", "--name-only", &range], cwd)?;
    Ok(output
        .stdout
        .lines()
        .map(|l| l.to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// Add a worktree checkout of `branch` at `path`.
pub fn worktree_add(cwd: &Path, path: &Path, branch: &str) -> Result<()> {
    let path_str = path.to_string_lossy();
    run_checked(&["worktree", "add", &path_str, branch], cwd)?;
    Ok(())
}

/// URL of the `origin` remote, if configured.
pub fn remote_url(cwd: &Path) -> Result<Option<String>> {
    let output = run(&["remote", "get-url", "origin"], cwd)?;
    if output.success {
        Ok(Some(output.stdout))
    } else {
        Ok(None)
    }
}

/// Parse "owner/repo" out of a GitHub remote URL (ssh or https).
pub fn parse_github_remote(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))?;
    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let mut parts = rest.splitn(2, '/');
    let owner = parts.next()?.to_string();
    let repo = parts.next()?.to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner, repo))
}

/// Push `branch` to origin with an upstream, bounded by `timeout`.
///
/// The push is the only network-blocking git call in the engine; the child
/// is killed when the timeout expires.
pub fn push_upstream(cwd: &Path, branch: &str, timeout: Duration) -> Result<()> {
    let mut child = Command::new("git")
        .args(["push", "-u", "origin", branch])
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Other(format!("Failed to run git push: {}", e)))?;

    let status = match child
        .wait_timeout(timeout)
        .map_err(|e| Error::Other(format!("Failed to wait for git push: {}", e)))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Git {
                command: format!("git push -u origin {}", branch),
                stderr: format!("timed out after {}s", timeout.as_secs()),
            });
        }
    };

    if !status.success() {
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            use std::io::Read;
            let _ = pipe.read_to_string(&mut stderr);
        }
        return Err(Error::Git {
            command: format!("git push -u origin {}", branch),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(())
}
