mod config;
mod github;
mod notify;
mod poll;
mod report;
mod repos;
mod state;

use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::github::GitHubClient;
use crate::notify::TelegramNotifier;
use crate::poll::{PollSettings, Poller};
use crate::state::IssueState;

/// gh-issue-notifier: watches GitHub repositories for newly opened issues
/// and forwards each one to a Telegram chat.
///
/// Secrets come from GITHUB_TOKEN, TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID
/// unless set in the config file.
#[derive(Parser, Debug)]
#[command(name = "gh-issue-notifier", version, about)]
struct Cli {
    /// Config file (default: .issue-notifier.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File with one GitHub repository URL per line
    #[arg(short, long)]
    repos: Option<PathBuf>,

    /// JSON file holding the last notified issue per repository
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Seconds to sleep between cycles
    #[arg(short, long)]
    interval: Option<u64>,

    /// Minimum seconds between GitHub requests
    #[arg(long)]
    request_delay: Option<u64>,

    /// Record the newest issue of never-seen repositories without notifying
    #[arg(long)]
    baseline_new_repos: bool,

    /// Run a single cycle, print a summary and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(repos) = &self.repos {
            config.poll.repos_file = repos.clone();
        }
        if let Some(state) = &self.state {
            config.poll.state_file = state.clone();
        }
        if let Some(interval) = self.interval {
            config.poll.interval_secs = interval;
        }
        if let Some(delay) = self.request_delay {
            config.poll.request_delay_secs = delay;
        }
        if self.baseline_new_repos {
            config.poll.baseline_new_repos = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    let secrets = config.secrets()?;
    debug!(?secrets, poll = ?config.poll, "resolved configuration");

    let repos = repos::load_repo_list(&config.poll.repos_file)?;
    if repos.is_empty() {
        warn!(path = %config.poll.repos_file.display(), "no repositories to monitor, exiting");
        return Ok(());
    }

    let mut state = IssueState::load(&config.poll.state_file);
    let source = GitHubClient::new(&config.github, secrets.github_token)?;
    let notifier = TelegramNotifier::new(
        &config.telegram,
        &secrets.telegram_bot_token,
        secrets.telegram_chat_id,
    )?;

    let settings = PollSettings::from(&config.poll);
    info!(
        repos = repos.len(),
        interval_secs = settings.interval.as_secs(),
        request_delay_secs = settings.request_delay.as_secs(),
        "starting poll loop"
    );
    let mut poller = Poller::new(source, notifier, repos, settings);

    if cli.once {
        let report = poller.run_once(&mut state).await;
        report::log_summary(1, &report);
        report::print_terminal_summary(&report);
    } else {
        poller.run(&mut state).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "gh-issue-notifier",
            "--repos",
            "repos.txt",
            "--interval",
            "120",
            "--request-delay",
            "2",
            "--baseline-new-repos",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.poll.repos_file, PathBuf::from("repos.txt"));
        assert_eq!(config.poll.interval_secs, 120);
        assert_eq!(config.poll.request_delay_secs, 2);
        assert!(config.poll.baseline_new_repos);
        assert_eq!(config.poll.state_file, PathBuf::from("last_known_issues.json"));
    }

    #[test]
    fn test_cli_without_flags_keeps_config() {
        let cli = Cli::parse_from(["gh-issue-notifier"]);
        let mut config = Config::default();
        config.poll.interval_secs = 30;
        cli.apply(&mut config);
        assert_eq!(config.poll.interval_secs, 30);
        assert!(!cli.once);
    }
}
