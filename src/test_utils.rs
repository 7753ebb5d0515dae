//! Shared test doubles: an in-memory GitHub and an authenticator over it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::Notify;

use crate::github::{Authenticator, GitHubApi, GitHubApiError, MergeOutcome};
use crate::types::{
    InstallationId, PrNumber, PullRequestSummary, Reaction, ReactionData, ReactionId, RepoRef,
    RepositoryId,
};

pub fn repo(id: u64) -> RepoRef {
    RepoRef::new(id, "octocat", format!("repo-{id}"))
}

/// A recorded call against [`MockGitHubApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    GetFileContent { repo: RepositoryId, path: String },
    ListOpenPullRequests { repo: RepositoryId },
    ListReactions { repo: RepositoryId, pr: PrNumber },
    DeleteReaction { repo: RepositoryId, pr: PrNumber, reaction: ReactionId },
    MergePullRequest { repo: RepositoryId, pr: PrNumber },
    ClosePullRequest { repo: RepositoryId, pr: PrNumber },
}

impl MockCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            MockCall::DeleteReaction { .. }
                | MockCall::MergePullRequest { .. }
                | MockCall::ClosePullRequest { .. }
        )
    }
}

#[derive(Default)]
struct MockState {
    files: HashMap<(RepositoryId, String), String>,
    pull_requests: HashMap<RepositoryId, Vec<PullRequestSummary>>,
    reactions: HashMap<(RepositoryId, PrNumber), Vec<ReactionData>>,
    next_reaction_id: u64,
    merged: Vec<PrNumber>,
    closed: Vec<PrNumber>,
    calls: Vec<MockCall>,

    file_error: Option<u16>,
    list_pull_requests_error: Option<u16>,
    list_reactions_errors: HashSet<PrNumber>,
    delete_reaction_errors: HashSet<PrNumber>,
    merge_error: Option<u16>,
    merge_refusal: Option<String>,
    close_errors: HashSet<PrNumber>,

    list_gate: Option<Gate>,
    file_gate: Option<Gate>,
}

/// Holds a call until released.
#[derive(Clone)]
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    fn new() -> (Self, (Arc<Notify>, Arc<Notify>)) {
        let gate = Gate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let handles = (Arc::clone(&gate.entered), Arc::clone(&gate.release));
        (gate, handles)
    }

    async fn pass(gate: Option<Gate>) {
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

/// In-memory GitHub. Clones share state.
#[derive(Clone, Default)]
pub struct MockGitHubApi {
    state: Arc<Mutex<MockState>>,
}

impl MockGitHubApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    fn record(&self, call: MockCall) {
        self.with_state(|s| s.calls.push(call));
    }

    /// Stores a file, base64-encoded with line breaks the way GitHub returns it.
    pub fn with_file(self, repo: &RepoRef, path: &str, text: &str) -> Self {
        let encoded = STANDARD.encode(text);
        let wrapped = encoded
            .as_bytes()
            .chunks(60)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        self.with_raw_file(repo, path, &wrapped)
    }

    /// Stores a file's content exactly as the API would return it.
    pub fn with_raw_file(self, repo: &RepoRef, path: &str, raw: &str) -> Self {
        self.with_state(|s| {
            s.files.insert((repo.id, path.to_string()), raw.to_string());
        });
        self
    }

    /// Opens a pull request carrying the given reactions. The global id is
    /// `number + 1000`.
    pub fn with_pull_request(self, repo: &RepoRef, number: u64, reactions: &[Reaction]) -> Self {
        self.with_state(|s| {
            let pr = PrNumber(number);
            s.pull_requests
                .entry(repo.id)
                .or_default()
                .push(PullRequestSummary { number: pr, id: number + 1000 });
            let list = s.reactions.entry((repo.id, pr)).or_default();
            for content in reactions {
                s.next_reaction_id += 1;
                list.push(ReactionData {
                    id: ReactionId(s.next_reaction_id),
                    content: *content,
                });
            }
        });
        self
    }

    /// Opens a pull request with `up` thumbs-up and `down` thumbs-down.
    pub fn with_votes(self, repo: &RepoRef, number: u64, up: usize, down: usize) -> Self {
        let mut reactions = vec![Reaction::ThumbsUp; up];
        reactions.extend(std::iter::repeat_n(Reaction::ThumbsDown, down));
        self.with_pull_request(repo, number, &reactions)
    }

    pub fn fail_file_fetch(&self, status: u16) {
        self.with_state(|s| s.file_error = Some(status));
    }

    pub fn fail_list_pull_requests(&self, status: u16) {
        self.with_state(|s| s.list_pull_requests_error = Some(status));
    }

    pub fn fail_list_reactions(&self, pr: u64) {
        self.with_state(|s| s.list_reactions_errors.insert(PrNumber(pr)));
    }

    pub fn fail_delete_reaction(&self, pr: u64) {
        self.with_state(|s| s.delete_reaction_errors.insert(PrNumber(pr)));
    }

    pub fn fail_merge(&self, status: u16) {
        self.with_state(|s| s.merge_error = Some(status));
    }

    /// Makes merges answer `merged: false` with `message`.
    pub fn refuse_merge(&self, message: &str) {
        self.with_state(|s| s.merge_refusal = Some(message.to_string()));
    }

    pub fn fail_close(&self, pr: u64) {
        self.with_state(|s| s.close_errors.insert(PrNumber(pr)));
    }

    /// Makes `list_open_pull_requests` wait until the returned release handle
    /// is notified. The first handle is notified when a call has entered.
    pub fn gate_list_pull_requests(&self) -> (Arc<Notify>, Arc<Notify>) {
        let (gate, handles) = Gate::new();
        self.with_state(|s| s.list_gate = Some(gate));
        handles
    }

    /// Like [`Self::gate_list_pull_requests`], for `get_file_content`.
    pub fn gate_file_fetch(&self) -> (Arc<Notify>, Arc<Notify>) {
        let (gate, handles) = Gate::new();
        self.with_state(|s| s.file_gate = Some(gate));
        handles
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with_state(|s| s.calls.clear());
    }

    pub fn merged(&self) -> Vec<PrNumber> {
        self.with_state(|s| s.merged.clone())
    }

    pub fn closed(&self) -> Vec<PrNumber> {
        self.with_state(|s| s.closed.clone())
    }

    pub fn open_pull_requests(&self, repo: &RepoRef) -> Vec<PrNumber> {
        self.with_state(|s| {
            s.pull_requests
                .get(&repo.id)
                .map(|prs| prs.iter().map(|p| p.number).collect())
                .unwrap_or_default()
        })
    }

    pub fn reactions_on(&self, repo: &RepoRef, pr: u64) -> Vec<ReactionData> {
        self.with_state(|s| {
            s.reactions
                .get(&(repo.id, PrNumber(pr)))
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Adds a reaction to an existing pull request, as a voter would.
    pub fn react(&self, repo: &RepoRef, pr: u64, content: Reaction) {
        self.with_state(|s| {
            s.next_reaction_id += 1;
            let id = ReactionId(s.next_reaction_id);
            s.reactions
                .entry((repo.id, PrNumber(pr)))
                .or_default()
                .push(ReactionData { id, content });
        });
    }
}

impl GitHubApi for MockGitHubApi {
    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Option<String>, GitHubApiError> {
        self.record(MockCall::GetFileContent {
            repo: repo.id,
            path: path.to_string(),
        });
        Gate::pass(self.with_state(|s| s.file_gate.clone())).await;

        self.with_state(|s| match s.file_error {
            Some(status) => Err(GitHubApiError::from_status(status, "injected file error")),
            None => Ok(s.files.get(&(repo.id, path.to_string())).cloned()),
        })
    }

    async fn list_open_pull_requests(
        &self,
        repo: &RepoRef,
    ) -> Result<Vec<PullRequestSummary>, GitHubApiError> {
        self.record(MockCall::ListOpenPullRequests { repo: repo.id });

        Gate::pass(self.with_state(|s| s.list_gate.clone())).await;

        self.with_state(|s| match s.list_pull_requests_error {
            Some(status) => Err(GitHubApiError::from_status(status, "injected list error")),
            None => Ok(s.pull_requests.get(&repo.id).cloned().unwrap_or_default()),
        })
    }

    async fn list_reactions(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
    ) -> Result<Vec<ReactionData>, GitHubApiError> {
        self.record(MockCall::ListReactions { repo: repo.id, pr });
        self.with_state(|s| {
            if s.list_reactions_errors.contains(&pr) {
                return Err(GitHubApiError::from_status(500, "injected reactions error"));
            }
            Ok(s.reactions.get(&(repo.id, pr)).cloned().unwrap_or_default())
        })
    }

    async fn delete_reaction(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
        reaction: ReactionId,
    ) -> Result<(), GitHubApiError> {
        self.record(MockCall::DeleteReaction {
            repo: repo.id,
            pr,
            reaction,
        });
        self.with_state(|s| {
            if s.delete_reaction_errors.contains(&pr) {
                return Err(GitHubApiError::from_status(403, "injected delete error"));
            }
            if let Some(list) = s.reactions.get_mut(&(repo.id, pr)) {
                list.retain(|r| r.id != reaction);
            }
            Ok(())
        })
    }

    async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
    ) -> Result<MergeOutcome, GitHubApiError> {
        self.record(MockCall::MergePullRequest { repo: repo.id, pr });
        self.with_state(|s| {
            if let Some(status) = s.merge_error {
                return Err(GitHubApiError::from_status(status, "injected merge error"));
            }
            if let Some(message) = &s.merge_refusal {
                return Ok(MergeOutcome {
                    merged: false,
                    sha: None,
                    message: Some(message.clone()),
                });
            }
            if let Some(prs) = s.pull_requests.get_mut(&repo.id) {
                prs.retain(|p| p.number != pr);
            }
            s.merged.push(pr);
            Ok(MergeOutcome {
                merged: true,
                sha: Some(format!("{:040x}", pr.0)),
                message: Some("Pull Request successfully merged".to_string()),
            })
        })
    }

    async fn close_pull_request(&self, repo: &RepoRef, pr: PrNumber) -> Result<(), GitHubApiError> {
        self.record(MockCall::ClosePullRequest { repo: repo.id, pr });
        self.with_state(|s| {
            if s.close_errors.contains(&pr) {
                return Err(GitHubApiError::from_status(422, "injected close error"));
            }
            if let Some(prs) = s.pull_requests.get_mut(&repo.id) {
                prs.retain(|p| p.number != pr);
            }
            s.closed.push(pr);
            Ok(())
        })
    }
}

/// Authenticator whose every installation shares one [`MockGitHubApi`].
#[derive(Clone, Default)]
pub struct MockAuthenticator {
    api: MockGitHubApi,
    installations: Arc<Mutex<Vec<(InstallationId, Vec<RepoRef>)>>>,
    fail_sessions: Arc<AtomicBool>,
}

impl MockAuthenticator {
    pub fn new(api: MockGitHubApi) -> Self {
        Self {
            api,
            ..Self::default()
        }
    }

    pub fn with_installation(self, installation: u64, repos: Vec<RepoRef>) -> Self {
        self.installations
            .lock()
            .unwrap()
            .push((InstallationId(installation), repos));
        self
    }

    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }
}

impl Authenticator for MockAuthenticator {
    type Api = MockGitHubApi;

    async fn installations(&self) -> Result<Vec<InstallationId>, GitHubApiError> {
        Ok(self.installations.lock().unwrap().iter().map(|(id, _)| *id).collect())
    }

    async fn installation_repositories(
        &self,
        installation: InstallationId,
    ) -> Result<Vec<RepoRef>, GitHubApiError> {
        self.installations
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| *id == installation)
            .map(|(_, repos)| repos.clone())
            .ok_or_else(|| GitHubApiError::from_status(404, "no such installation"))
    }

    async fn installation_api(&self, _installation: InstallationId) -> Result<MockGitHubApi, GitHubApiError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(GitHubApiError::from_status(401, "Bad credentials"));
        }
        Ok(self.api.clone())
    }
}
