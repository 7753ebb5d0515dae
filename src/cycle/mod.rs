//! One scheduled run against one repository.
//!
//! A tick acquires the repository's [`RunLock`], obtains a fresh API session,
//! tallies, and resolves. Ticks that find the lock held are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::github::{Authenticator, GitHubApi, GitHubApiError};
use crate::resolve::{MergeError, ResolutionReport, execute, plan};
use crate::tally::{TallyError, tally};
use crate::types::{InstallationId, RepoRef};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to authenticate: {0}")]
    Auth(#[source] GitHubApiError),

    #[error(transparent)]
    Tally(#[from] TallyError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing was open; nothing was changed.
    NoCandidates,
    Resolved(ResolutionReport),
}

/// Tallies votes, then merges the winner and closes the rest.
pub async fn run_cycle<G: GitHubApi>(api: &G, repo: &RepoRef) -> Result<CycleOutcome, CycleError> {
    let candidates = tally(api, repo).await?;
    let Some(resolution) = plan(candidates) else {
        return Ok(CycleOutcome::NoCandidates);
    };
    let report = execute(api, repo, &resolution).await?;
    Ok(CycleOutcome::Resolved(report))
}

/// At most one cycle per repository at a time.
#[derive(Debug, Default)]
pub struct RunLock {
    running: AtomicBool,
    skipped: AtomicU64,
}

/// Releases its [`RunLock`] on drop.
#[derive(Debug)]
pub struct RunGuard {
    lock: Arc<RunLock>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.lock.running.store(false, Ordering::Release);
    }
}

impl RunLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes the lock, or counts a skip and returns `None` if it is held.
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunGuard> {
        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(RunGuard {
                lock: Arc::clone(self),
            })
        } else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ticks dropped because a cycle was already running.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    /// A previous cycle was still running.
    Skipped,
    Ran(Result<CycleOutcome, CycleError>),
}

/// Runs one scheduled tick. Failures are logged here and never propagate.
pub async fn run_tick<A: Authenticator>(
    auth: &A,
    installation: InstallationId,
    repo: &RepoRef,
    lock: &Arc<RunLock>,
) -> TickOutcome {
    let Some(_guard) = lock.try_acquire() else {
        warn!(repo = %repo, skipped = lock.skipped(), "Previous cycle still running; skipping tick");
        return TickOutcome::Skipped;
    };

    info!(repo = %repo, "Cycle started");
    let result = match auth.installation_api(installation).await {
        Ok(api) => run_cycle(&api, repo).await,
        Err(e) => Err(CycleError::Auth(e)),
    };

    match &result {
        Ok(CycleOutcome::NoCandidates) => info!(repo = %repo, "Cycle ended: no open pull requests"),
        Ok(CycleOutcome::Resolved(report)) if report.is_complete() => info!(
            repo = %repo,
            merged = %report.merged,
            closed = report.closed.len(),
            "Cycle ended"
        ),
        Ok(CycleOutcome::Resolved(report)) => warn!(
            repo = %repo,
            merged = %report.merged,
            closed = report.closed.len(),
            close_failures = report.close_failures.len(),
            "Cycle ended with pull requests left open"
        ),
        Err(e) => error!(repo = %repo, error = %e, "Cycle failed"),
    }

    TickOutcome::Ran(result)
}
