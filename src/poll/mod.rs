use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::PollConfig;
use crate::github::{FetchError, Issue, IssueSource};
use crate::notify::{Delivery, Notifier};
use crate::report::{self, CycleReport, RepoOutcome, SkipReason};
use crate::repos::RepoRef;
use crate::state::IssueState;

/// Timing and first-sight behaviour of the poll loop.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub request_delay: Duration,
    pub baseline_new_repos: bool,
}

impl From<&PollConfig> for PollSettings {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: config.interval(),
            request_delay: config.request_delay(),
            baseline_new_repos: config.baseline_new_repos,
        }
    }
}

/// Walks the repository list once per interval, forwarding unseen issues.
///
/// Strictly sequential: one fetch or send in flight at a time, state written
/// after each delivered issue.
pub struct Poller<S, N> {
    source: S,
    notifier: N,
    repos: Vec<RepoRef>,
    settings: PollSettings,
    last_request: Option<Instant>,
    auth_failure_streak: u32,
    cycles: u64,
}

impl<S: IssueSource, N: Notifier> Poller<S, N> {
    pub fn new(source: S, notifier: N, repos: Vec<RepoRef>, settings: PollSettings) -> Self {
        Self {
            source,
            notifier,
            repos,
            settings,
            last_request: None,
            auth_failure_streak: 0,
            cycles: 0,
        }
    }

    /// Run cycles forever, sleeping `interval` between them.
    pub async fn run(&mut self, state: &mut IssueState) {
        loop {
            let report = self.run_once(state).await;
            report::log_summary(self.cycles, &report);
            debug!(interval = ?self.settings.interval, "sleeping until next cycle");
            sleep(self.settings.interval).await;
        }
    }

    /// Run a single numbered cycle inside its own span.
    pub async fn run_once(&mut self, state: &mut IssueState) -> CycleReport {
        self.cycles += 1;
        let span = info_span!("cycle", n = self.cycles);
        self.run_cycle(state).instrument(span).await
    }

    /// One pass over every repository in load order. A failure in one
    /// repository never stops the others.
    pub async fn run_cycle(&mut self, state: &mut IssueState) -> CycleReport {
        let mut report = CycleReport::default();
        let repos = self.repos.clone();

        for repo in repos {
            let span = info_span!("repo", repo = %repo);
            let outcome = self
                .process_repo(&repo, state, &mut report)
                .instrument(span)
                .await;
            report.outcomes.push((repo, outcome));
        }

        if state.is_dirty() {
            if let Err(err) = state.flush() {
                error!(
                    error = %err,
                    path = %state.path().display(),
                    "state still not persisted; durability lost, restart may re-notify issues"
                );
                report.persistence_failed = true;
            }
        }

        self.track_auth_failures(&report);
        report
    }

    async fn process_repo(
        &mut self,
        repo: &RepoRef,
        state: &mut IssueState,
        report: &mut CycleReport,
    ) -> RepoOutcome {
        self.pace().await;
        let fetched = self.source.open_issues(repo).await;
        self.last_request = Some(Instant::now());

        let issues = match fetched {
            Ok(issues) => issues,
            Err(err) => return Self::skip(err),
        };

        let highest_open = issues
            .iter()
            .filter(|i| !i.is_pull_request)
            .map(|i| i.number)
            .max();
        let Some(highest_open) = highest_open else {
            debug!("no open issues");
            return RepoOutcome::NoOpenIssues;
        };

        if self.settings.baseline_new_repos && !state.contains(repo) {
            info!(issue = highest_open, "first sight of repository, recording without notifying");
            Self::record(state, repo, highest_open, report);
            return RepoOutcome::Baselined {
                highest_seen: state.highest_seen(repo),
            };
        }

        let highest_seen = state.highest_seen(repo);
        let fresh = unseen_issues(issues, highest_seen);
        if fresh.is_empty() {
            debug!(highest_seen, "no new issues");
            return RepoOutcome::UpToDate { highest_seen };
        }

        let mut sent = Vec::with_capacity(fresh.len());
        for issue in &fresh {
            match self.notifier.notify(repo, issue).await {
                Ok(delivery) => {
                    info!(
                        issue = issue.number,
                        title = %issue.title,
                        plain = delivery == Delivery::PlainFallback,
                        "notified new issue"
                    );
                    Self::record(state, repo, issue.number, report);
                    sent.push(issue.number);
                }
                Err(err) => {
                    error!(
                        issue = issue.number,
                        error = %err,
                        "notification failed, will retry next cycle"
                    );
                    return RepoOutcome::DeliveryFailed {
                        issues: sent,
                        failed_issue: issue.number,
                        highest_seen: state.highest_seen(repo),
                    };
                }
            }
        }

        RepoOutcome::Notified {
            issues: sent,
            highest_seen: state.highest_seen(repo),
        }
    }

    fn skip(err: FetchError) -> RepoOutcome {
        let reason = if err.is_auth() {
            warn!(error = %err, "GitHub rejected the credential, skipping repository");
            SkipReason::Unauthorized
        } else if err.is_transient() {
            warn!(error = %err, "could not fetch issues, skipping for this cycle");
            SkipReason::Transient
        } else {
            warn!(error = %err, "could not fetch issues");
            SkipReason::Failed
        };
        RepoOutcome::Skipped(reason)
    }

    fn record(state: &mut IssueState, repo: &RepoRef, issue: u64, report: &mut CycleReport) {
        if let Err(err) = state.record(repo, issue) {
            error!(
                error = %err,
                path = %state.path().display(),
                "failed to persist state; durability lost, restart may re-notify issues"
            );
            report.persistence_failed = true;
        }
    }

    /// Keep consecutive GitHub requests at least `request_delay` apart.
    async fn pace(&self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.settings.request_delay {
                sleep(self.settings.request_delay - elapsed).await;
            }
        }
    }

    fn track_auth_failures(&mut self, report: &CycleReport) {
        if !report.any_unauthorized() {
            self.auth_failure_streak = 0;
            return;
        }
        self.auth_failure_streak += 1;
        if self.auth_failure_streak > 1 {
            error!(
                cycles = self.auth_failure_streak,
                "GitHub keeps rejecting the credential; fix GITHUB_TOKEN and restart"
            );
        }
    }
}

/// Issues newer than `highest_seen`, pull requests removed, oldest first.
pub fn unseen_issues(issues: Vec<Issue>, highest_seen: u64) -> Vec<Issue> {
    let mut fresh: Vec<Issue> = issues
        .into_iter()
        .filter(|i| !i.is_pull_request && i.number > highest_seen)
        .collect();
    fresh.sort_by_key(|i| i.number);
    fresh.dedup_by_key(|i| i.number);
    fresh
}
