//! The subscription registry: one scheduled job per repository.
//!
//! Repositories are added when the app is installed on them and removed when
//! it is uninstalled. Each subscription owns the [`JobHandle`] of its cron job;
//! removing the subscription cancels the job.
//!
//! # Replacement
//!
//! Adding a repository that is already subscribed replaces the old
//! subscription: the new job is installed and the old one cancelled, so
//! exactly one job per repository is live afterwards.
//!
//! # Overlap
//!
//! Every repository has a [`RunLock`] that outlives replacement. A tick that
//! finds the previous cycle still running is skipped, including when the
//! running cycle belongs to a job that has since been replaced. Removal
//! forgets the lock once nothing else holds it.
//!
//! # Removal during an add
//!
//! `add` awaits the API before it can register anything. A `remove` that
//! lands in that window invalidates the pending add, which then registers
//! nothing and fails with [`RegistryError::Removed`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, resolve_config};
use crate::cycle::{RunLock, run_tick};
use crate::github::{Authenticator, GitHubApiError};
use crate::schedule::{CronSchedule, JobHandle, ScheduleError, spawn_job};
use crate::types::{InstallationId, RepoRef, RepositoryId};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to authenticate installation {installation}: {source}")]
    Auth {
        installation: InstallationId,
        #[source]
        source: GitHubApiError,
    },

    #[error("failed to list installations: {0}")]
    ListInstallations(#[source] GitHubApiError),

    #[error("failed to resolve config for {repo}: {source}")]
    Config {
        repo: String,
        #[source]
        source: ConfigError,
    },

    #[error("failed to schedule {repo}: {source}")]
    Schedule {
        repo: String,
        #[source]
        source: ScheduleError,
    },

    #[error("{repo} was removed while it was being subscribed")]
    Removed { repo: String },
}

/// A repository with a live job.
#[derive(Debug)]
pub struct Subscription {
    pub repo: RepoRef,
    pub installation: InstallationId,
    pub cron: String,
    job: JobHandle,
}

/// A read-only view of one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub repository_id: RepositoryId,
    pub repository: String,
    pub installation: InstallationId,
    pub cron: String,
    pub cycle_running: bool,
    pub skipped_ticks: u64,
}

/// Result of a startup reconciliation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub already_subscribed: usize,
    pub failed: usize,
}

pub struct SubscriptionRegistry<A: Authenticator> {
    auth: Arc<A>,

    subscriptions: RwLock<HashMap<RepositoryId, Subscription>>,

    /// Kept across replacement; pruned on remove once unused.
    run_locks: RwLock<HashMap<RepositoryId, Arc<RunLock>>>,

    /// Adds in flight per repository. Only holds repositories with at least
    /// one add running.
    pending_adds: Mutex<HashMap<RepositoryId, PendingAdds>>,

    /// Parent of every job's token.
    shutdown: CancellationToken,
}

impl<A: Authenticator> SubscriptionRegistry<A> {
    pub fn new(auth: Arc<A>) -> Self {
        Self::new_with_shutdown(auth, CancellationToken::new())
    }

    pub fn new_with_shutdown(auth: Arc<A>, shutdown: CancellationToken) -> Self {
        SubscriptionRegistry {
            auth,
            subscriptions: RwLock::new(HashMap::new()),
            run_locks: RwLock::new(HashMap::new()),
            pending_adds: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Subscribes a repository, replacing any existing subscription for it.
    ///
    /// Resolves the repository's config and starts its job. On error nothing
    /// is registered and an existing subscription stays in place.
    #[instrument(skip_all, fields(repo = %repo, installation = %installation))]
    pub async fn add(&self, repo: RepoRef, installation: InstallationId) -> Result<(), RegistryError> {
        let ticket = AddTicket::new(&self.pending_adds, repo.id);

        let api = self
            .auth
            .installation_api(installation)
            .await
            .map_err(|source| RegistryError::Auth { installation, source })?;

        let config = resolve_config(&api, &repo)
            .await
            .map_err(|source| RegistryError::Config {
                repo: repo.full_name(),
                source,
            })?;

        let schedule = CronSchedule::parse(&config.cron).map_err(|source| RegistryError::Schedule {
            repo: repo.full_name(),
            source,
        })?;

        let lock = self.run_lock_for(repo.id).await;

        // Staleness is checked and the job started under the same write lock
        // that `remove` takes, so a removed repository never gets a job.
        let previous = {
            let mut subscriptions = self.subscriptions.write().await;
            if ticket.is_stale() {
                info!("Repository was removed while subscribing; not registering");
                return Err(RegistryError::Removed {
                    repo: repo.full_name(),
                });
            }

            let job = {
                let auth = Arc::clone(&self.auth);
                let repo = repo.clone();
                spawn_job(schedule, &self.shutdown, move || {
                    let auth = Arc::clone(&auth);
                    let repo = repo.clone();
                    let lock = Arc::clone(&lock);
                    async move {
                        run_tick(auth.as_ref(), installation, &repo, &lock).await;
                    }
                })
            };

            subscriptions.insert(
                repo.id,
                Subscription {
                    repo: repo.clone(),
                    installation,
                    cron: config.cron,
                    job,
                },
            )
        };

        match previous {
            Some(old) => {
                info!(old_cron = %old.cron, "Replaced subscription");
                old.job.stop().await;
            }
            None => info!("Subscribed repository"),
        }
        Ok(())
    }

    /// Unsubscribes a repository. Returns false if it was not subscribed.
    ///
    /// Adds for the repository still in flight are invalidated. No tick
    /// starts after this returns; a cycle already running finishes.
    #[instrument(skip(self))]
    pub async fn remove(&self, repo_id: RepositoryId) -> bool {
        let removed = {
            let mut subscriptions = self.subscriptions.write().await;
            invalidate_pending_adds(&self.pending_adds, repo_id);
            subscriptions.remove(&repo_id)
        };

        let Some(subscription) = removed else {
            debug!("Repository was not subscribed");
            return false;
        };

        let repo = subscription.repo.clone();
        subscription.job.stop().await;
        self.prune_run_lock(repo_id).await;
        info!(repo = %repo, "Unsubscribed repository");
        true
    }

    /// Subscribes every repository of every installation that is not
    /// subscribed yet. Per-repository failures are logged and counted.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileReport, RegistryError> {
        let mut report = ReconcileReport::default();

        let installations = self
            .auth
            .installations()
            .await
            .map_err(RegistryError::ListInstallations)?;

        for installation in installations {
            let repos = match self.auth.installation_repositories(installation).await {
                Ok(repos) => repos,
                Err(e) => {
                    warn!(%installation, error = %e, "Failed to list installation repositories");
                    report.failed += 1;
                    continue;
                }
            };

            for repo in repos {
                if self.has_subscription(repo.id).await {
                    report.already_subscribed += 1;
                    continue;
                }
                let name = repo.full_name();
                match self.add(repo, installation).await {
                    Ok(()) => report.added += 1,
                    Err(e) => {
                        warn!(repo = %name, error = %e, "Failed to subscribe repository");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            added = report.added,
            already_subscribed = report.already_subscribed,
            failed = report.failed,
            "Reconciled subscriptions"
        );
        Ok(report)
    }

    /// Cancels every job and forgets every subscription.
    pub async fn shutdown_all(&self) {
        info!("Shutting down all subscriptions");
        self.shutdown.cancel();

        let drained: Vec<_> = self.subscriptions.write().await.drain().collect();
        for (_, subscription) in drained {
            debug!(repo = %subscription.repo, "Cancelling job");
            subscription.job.cancel();
        }
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn has_subscription(&self, repo_id: RepositoryId) -> bool {
        self.subscriptions.read().await.contains_key(&repo_id)
    }

    /// The cron expression a repository is scheduled with.
    pub async fn cron_for(&self, repo_id: RepositoryId) -> Option<String> {
        self.subscriptions
            .read()
            .await
            .get(&repo_id)
            .map(|s| s.cron.clone())
    }

    /// Every subscription, ordered by repository id.
    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let subscriptions = self.subscriptions.read().await;
        let locks = self.run_locks.read().await;

        let mut infos: Vec<_> = subscriptions
            .values()
            .map(|s| {
                let lock = locks.get(&s.repo.id);
                SubscriptionInfo {
                    repository_id: s.repo.id,
                    repository: s.repo.full_name(),
                    installation: s.installation,
                    cron: s.cron.clone(),
                    cycle_running: lock.is_some_and(|l| l.is_running()),
                    skipped_ticks: lock.map_or(0, |l| l.skipped()),
                }
            })
            .collect();
        infos.sort_by_key(|i| i.repository_id);
        infos
    }

    /// The run lock of a repository that has ever been subscribed.
    pub async fn run_lock(&self, repo_id: RepositoryId) -> Option<Arc<RunLock>> {
        self.run_locks.read().await.get(&repo_id).cloned()
    }

    async fn run_lock_for(&self, repo_id: RepositoryId) -> Arc<RunLock> {
        if let Some(lock) = self.run_locks.read().await.get(&repo_id) {
            return Arc::clone(lock);
        }
        Arc::clone(self.run_locks.write().await.entry(repo_id).or_default())
    }

    /// Drops the run lock of a removed repository unless a running cycle or
    /// a concurrent add still holds it.
    async fn prune_run_lock(&self, repo_id: RepositoryId) {
        let mut locks = self.run_locks.write().await;
        let unused = locks
            .get(&repo_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1 && !lock.is_running());
        if unused {
            locks.remove(&repo_id);
            debug!(repo_id = %repo_id, "Forgot run lock");
        }
    }
}

#[derive(Debug, Default)]
struct PendingAdds {
    running: usize,
    /// Bumped by every remove while adds are running.
    generation: u64,
}

fn invalidate_pending_adds(pending: &Mutex<HashMap<RepositoryId, PendingAdds>>, repo_id: RepositoryId) {
    let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(adds) = pending.get_mut(&repo_id) {
        adds.generation += 1;
    }
}

/// Registration of one in-flight add. Dropping it deregisters the add.
struct AddTicket<'a> {
    pending: &'a Mutex<HashMap<RepositoryId, PendingAdds>>,
    repo_id: RepositoryId,
    generation: u64,
}

impl<'a> AddTicket<'a> {
    fn new(pending: &'a Mutex<HashMap<RepositoryId, PendingAdds>>, repo_id: RepositoryId) -> Self {
        let mut map = pending.lock().unwrap_or_else(PoisonError::into_inner);
        let adds = map.entry(repo_id).or_default();
        adds.running += 1;
        let generation = adds.generation;
        AddTicket {
            pending,
            repo_id,
            generation,
        }
    }

    /// True if the repository was removed since this add started.
    fn is_stale(&self) -> bool {
        let map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(&self.repo_id)
            .is_none_or(|adds| adds.generation != self.generation)
    }
}

impl Drop for AddTicket<'_> {
    fn drop(&mut self) {
        let mut map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(adds) = map.get_mut(&self.repo_id) {
            adds.running -= 1;
            if adds.running == 0 {
                map.remove(&self.repo_id);
            }
        }
    }
}
