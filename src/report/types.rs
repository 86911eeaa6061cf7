use crate::repos::RepoRef;

/// Why a repository was skipped for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Timeout, 5xx or rate limit; retried next cycle
    Transient,
    /// Credential rejected
    Unauthorized,
    /// Anything else the fetcher could not handle
    Failed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Transient => write!(f, "transient error"),
            SkipReason::Unauthorized => write!(f, "unauthorized"),
            SkipReason::Failed => write!(f, "fetch failed"),
        }
    }
}

/// What happened to one repository during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    /// No open issues at all
    NoOpenIssues,
    /// Open issues exist but none are newer than the stored number
    UpToDate { highest_seen: u64 },
    /// First sight in baseline mode: recorded without notifying
    Baselined { highest_seen: u64 },
    /// Every new issue was delivered
    Notified { issues: Vec<u64>, highest_seen: u64 },
    /// Delivery stopped at `failed_issue`; `issues` lists those sent before it
    DeliveryFailed {
        issues: Vec<u64>,
        failed_issue: u64,
        highest_seen: u64,
    },
    Skipped(SkipReason),
}

impl RepoOutcome {
    /// Issue numbers delivered for this repository.
    pub fn notified(&self) -> &[u64] {
        match self {
            RepoOutcome::Notified { issues, .. } | RepoOutcome::DeliveryFailed { issues, .. } => {
                issues
            }
            _ => &[],
        }
    }
}

/// Result of one pass over all configured repositories.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(RepoRef, RepoOutcome)>,
    /// Set when the state file could not be written during this cycle
    pub persistence_failed: bool,
}

impl CycleReport {
    pub fn notified_count(&self) -> usize {
        self.outcomes.iter().map(|(_, o)| o.notified().len()).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RepoOutcome::Skipped(_)))
            .count()
    }

    pub fn failed_deliveries(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RepoOutcome::DeliveryFailed { .. }))
            .count()
    }

    pub fn any_unauthorized(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, o)| *o == RepoOutcome::Skipped(SkipReason::Unauthorized))
    }
}
