//! Script starter implementation.
//!
//! One run: discover scripts, take a locked snapshot of each status log,
//! then dispatch eligible scripts to the process supervisor and record their
//! exits, until nothing is left to dispatch and no child is running.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::config::{validate_config, Config, ConfigError, StarterConfig};
use crate::discovery::ScriptDiscoverer;
use crate::lock::LockManager;
use crate::status::{ScriptStatus, StatusError, StatusSnapshot, StatusStore};
use crate::supervisor::{LaunchCommand, ProcessExit, ProcessSupervisor};

use super::inventory;
use super::types::{
    RunReport, ScriptEntry, ScriptOutcome, ScriptResult, SkipReason, SkippedScript, StarterError,
};

/// `running` records this much older than the run start still count as
/// written during the run. Covers coarse modification-time resolution.
const CLAIM_CLOCK_SLACK: Duration = Duration::from_secs(2);

/// A launch candidate and the log state it was selected from.
#[derive(Debug)]
struct Candidate {
    script: PathBuf,
    snapshot: StatusSnapshot,
}

/// Result of the locked look at a script before dispatching starts.
#[derive(Debug)]
enum Preparation {
    Candidate(StatusSnapshot),
    Skip(SkipReason),
}

/// Result of the locked test-and-set to `running`.
#[derive(Debug)]
enum Claim {
    Claimed,
    Changed(ScriptStatus),
}

/// Starts the scripts under a directory tree, each at most once per
/// lifecycle state, with bounded concurrency.
///
/// Several starters, in this or other processes, may run over the same tree
/// at the same time: every status read-then-append happens under the
/// script's lock, and `running` is recorded before the child is spawned.
#[derive(Debug, Clone)]
pub struct ScriptStarter {
    config: StarterConfig,
    discoverer: ScriptDiscoverer,
    command: LaunchCommand,
    store: StatusStore,
    locks: LockManager,
}

impl ScriptStarter {
    /// Create a starter. Fails if the configuration is invalid.
    pub fn new(config: StarterConfig) -> Result<Self, StarterError> {
        let full = Config {
            starter: config.clone(),
        };
        validate_config(&full)?;

        let discoverer = ScriptDiscoverer::new(config.pattern())
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        let command = LaunchCommand::parse(config.command())
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(Self {
            config,
            discoverer,
            command,
            store: StatusStore::new(),
            locks: LockManager::new(),
        })
    }

    pub fn config(&self) -> &StarterConfig {
        &self.config
    }

    /// All scripts with their current status.
    pub fn scripts(&self) -> Vec<ScriptEntry> {
        inventory::entries(&self.discoverer, &self.config.directory, &self.store)
    }

    /// Number of scripts that a run would consider launching.
    pub fn pending_count(&self) -> usize {
        self.scripts()
            .iter()
            .filter(|e| e.status.is_eligible(self.config.rerun))
            .count()
    }

    /// Runs until every eligible script was dispatched and every child exited.
    ///
    /// Per-script failures are recorded and reported, never returned.
    pub async fn run(&self) -> RunReport {
        let run_started = SystemTime::now()
            .checked_sub(CLAIM_CLOCK_SLACK)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let scripts = self.discoverer.discover(&self.config.directory);
        info!(
            "Found {} scripts matching {:?} in {:?}",
            scripts.len(),
            self.config.pattern(),
            self.config.directory
        );

        let mut report = RunReport {
            discovered: scripts.len(),
            ..Default::default()
        };

        let mut queue = VecDeque::new();
        for script in scripts {
            match self.prepare(&script, run_started).await {
                Ok(Preparation::Candidate(snapshot)) => {
                    if snapshot.status == ScriptStatus::Running {
                        warn!(
                            "{:?} was left running by an earlier run, launching it again",
                            script
                        );
                    }
                    queue.push_back(Candidate { script, snapshot });
                }
                Ok(Preparation::Skip(reason)) => {
                    self.log_skip(&script, &reason);
                    report.skipped.push(SkippedScript { script, reason });
                }
                Err(e) => {
                    warn!("Skipping {:?}: {}", script, e);
                    report.skipped.push(SkippedScript {
                        script,
                        reason: SkipReason::Unavailable(e.to_string()),
                    });
                }
            }
        }

        report.eligible = queue.len();
        report.ceiling = self.config.parallel.ceiling(queue.len());

        let mut supervisor =
            ProcessSupervisor::new(self.command.clone(), self.config.chdir(), report.ceiling);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let post_start_wait = Duration::from_millis(self.config.post_start_wait_ms);

        while !queue.is_empty() || !supervisor.is_idle() {
            let mut changed = false;

            while supervisor.has_capacity() {
                let Some(candidate) = queue.pop_front() else {
                    break;
                };
                changed = true;

                if self.dispatch(&candidate, &mut supervisor, &mut report).await
                    && !post_start_wait.is_zero()
                {
                    tokio::time::sleep(post_start_wait).await;
                }
            }

            for exit in supervisor.poll() {
                changed = true;
                self.record_exit(exit, &mut report).await;
            }

            if !changed {
                tokio::time::sleep(poll_interval).await;
            }
        }

        report.peak_active = supervisor.peak_active();
        info!(
            "Run complete: {} launched, {} finished, {} failed, {} skipped",
            report.launched(),
            report.finished(),
            report.failed(),
            report.skipped.len()
        );
        report
    }

    /// Locked first look: marks unseen scripts `todo` and decides eligibility.
    async fn prepare(
        &self,
        script: &Path,
        run_started: SystemTime,
    ) -> Result<Preparation, StarterError> {
        let rerun = self.config.rerun;
        self.locked(script, move |store, script| {
            let mut snapshot = store.snapshot(script);
            if snapshot.status == ScriptStatus::Unset {
                store.append_status(script, ScriptStatus::Todo)?;
                snapshot = store.snapshot(script);
            }

            if snapshot.running_since(run_started) {
                return Ok(Preparation::Skip(SkipReason::ClaimedElsewhere));
            }
            if !snapshot.status.is_eligible(rerun) {
                return Ok(Preparation::Skip(SkipReason::NotEligible(snapshot.status)));
            }
            Ok(Preparation::Candidate(snapshot))
        })
        .await
    }

    /// Claims and spawns one candidate. Returns whether a child was started.
    async fn dispatch(
        &self,
        candidate: &Candidate,
        supervisor: &mut ProcessSupervisor,
        report: &mut RunReport,
    ) -> bool {
        let script = &candidate.script;

        match self.claim(candidate).await {
            Ok(Claim::Claimed) => {}
            Ok(Claim::Changed(status)) => {
                let reason = SkipReason::ChangedSinceDiscovery(status);
                self.log_skip(script, &reason);
                report.skipped.push(SkippedScript {
                    script: script.clone(),
                    reason,
                });
                return false;
            }
            Err(e) => {
                warn!("Cannot claim {:?}: {}", script, e);
                report.skipped.push(SkippedScript {
                    script: script.clone(),
                    reason: SkipReason::Unavailable(e.to_string()),
                });
                return false;
            }
        }

        match supervisor.spawn(script) {
            Ok(_) => true,
            Err(e) => {
                warn!("{}", e);
                self.record_status(script, ScriptStatus::Error).await;
                report.outcomes.push(ScriptOutcome {
                    script: script.clone(),
                    result: ScriptResult::SpawnFailed(e.to_string()),
                });
                false
            }
        }
    }

    /// Locked test-and-set: append `running` only if nobody touched the log
    /// since the candidate was selected.
    async fn claim(&self, candidate: &Candidate) -> Result<Claim, StarterError> {
        let selected = candidate.snapshot.clone();
        self.locked(&candidate.script, move |store, script| {
            let current = store.snapshot(script);
            if current.changed_since(&selected) {
                return Ok(Claim::Changed(current.status));
            }
            store.append_status(script, ScriptStatus::Running)?;
            Ok(Claim::Claimed)
        })
        .await
    }

    async fn record_exit(&self, exit: ProcessExit, report: &mut RunReport) {
        let status = if exit.outcome.is_success() {
            info!("{:?} finished after {:?}", exit.script, exit.elapsed);
            ScriptStatus::Finished
        } else {
            warn!("{:?} failed after {:?}: {}", exit.script, exit.elapsed, exit.outcome);
            ScriptStatus::Error
        };

        self.record_status(&exit.script, status).await;
        report.outcomes.push(ScriptOutcome {
            script: exit.script,
            result: ScriptResult::Exited(exit.outcome),
        });
    }

    async fn record_status(&self, script: &Path, status: ScriptStatus) {
        let result = self
            .locked(script, move |store, script| store.append_status(script, status))
            .await;
        if let Err(e) = result {
            warn!("Failed to record {} for {:?}: {}", status, script, e);
        }
    }

    fn log_skip(&self, script: &Path, reason: &SkipReason) {
        if self.config.verbose {
            info!("Ignoring {:?}: {:?}", script, reason);
        } else {
            debug!("Ignoring {:?}: {:?}", script, reason);
        }
    }

    /// Runs `f` under the script's lock on the blocking pool, since lock
    /// acquisition may wait indefinitely.
    async fn locked<T, F>(&self, script: &Path, f: F) -> Result<T, StarterError>
    where
        F: FnOnce(&StatusStore, &Path) -> Result<T, StatusError> + Send + 'static,
        T: Send + 'static,
    {
        let locks = self.locks;
        let store = self.store;
        let script = script.to_path_buf();

        let result =
            tokio::task::spawn_blocking(move || locks.with_lock(&script, || f(&store, &script)))
                .await
                .map_err(|e| StarterError::Task(e.to_string()))?;

        Ok(result??)
    }
}
