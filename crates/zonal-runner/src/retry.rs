//! Bounded escalation around the remote statistics client.
//!
//! Large AOIs exhaust the remote engine's per-job resources, and when that
//! happens the job can end without an error and without output. The driver
//! therefore judges each attempt only by whether a non-empty artifact was
//! written. Each failed attempt doubles the resource multiplier (`tile_scale`)
//! after a cooldown, up to [`MAX_ATTEMPTS`] attempts (multipliers 1, 2, 4, 8).
//!
//! [`BackoffPolicy`] is the pure schedule; [`RetryDriver`] does the I/O.

use crate::aoi::AoiId;
use crate::error::RetryError;
use crate::status::{emit, StatusCallback, StatusLevel};
use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;
use zonal_metrics::{metric_defs, AoiLabels};
use zonal_remote::{StatsClient, StatsRequest};

/// Attempts before an AOI is declared too large.
pub const MAX_ATTEMPTS: u32 = 4;

/// Pause between a failed attempt and the next one.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(4);

/// One scheduled attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan {
    /// Zero-based attempt number.
    pub attempt: u32,
    /// Resource multiplier, `2^attempt`.
    pub multiplier: u32,
    /// Wait before submitting this attempt.
    pub wait_before: Duration,
}

/// Escalation schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    cooldown: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl BackoffPolicy {
    pub const fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Plan for attempt `attempt`, or `None` once the ceiling is reached.
    pub fn plan(&self, attempt: u32) -> Option<AttemptPlan> {
        if attempt >= MAX_ATTEMPTS {
            return None;
        }
        Some(AttemptPlan {
            attempt,
            multiplier: 1 << attempt,
            wait_before: if attempt == 0 { Duration::ZERO } else { self.cooldown },
        })
    }

    /// The full schedule in order.
    pub fn schedule(&self) -> impl Iterator<Item = AttemptPlan> + '_ {
        (0..).map_while(move |n| self.plan(n))
    }
}

/// Raw artifact produced by a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtifact {
    pub bytes: Vec<u8>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Multiplier of the successful attempt.
    pub multiplier: u32,
}

/// Runs remote jobs under a [`BackoffPolicy`].
pub struct RetryDriver<'a> {
    client: &'a dyn StatsClient,
    policy: BackoffPolicy,
    status: Option<&'a StatusCallback>,
}

impl<'a> RetryDriver<'a> {
    pub fn new(client: &'a dyn StatsClient, policy: BackoffPolicy) -> Self {
        Self {
            client,
            policy,
            status: None,
        }
    }

    pub fn with_status(mut self, status: Option<&'a StatusCallback>) -> Self {
        self.status = status;
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Run `request` until an attempt leaves a non-empty artifact at `scratch`.
    ///
    /// Client errors count as a missing artifact. The scratch file is removed
    /// before every attempt and after it has been read.
    pub fn compute_histogram(
        &self,
        aoi: &AoiId,
        request: &StatsRequest,
        scratch: &Path,
    ) -> Result<RawArtifact, RetryError> {
        if let Some(parent) = scratch.parent() {
            fs::create_dir_all(parent)?;
        }
        let labels = AoiLabels::new(aoi.as_str());

        let mut attempts = 0;
        while let Some(plan) = self.policy.plan(attempts) {
            if !plan.wait_before.is_zero() {
                thread::sleep(plan.wait_before);
            }
            remove_if_present(scratch)?;

            let attempt_labels = labels.with(&[("multiplier", plan.multiplier.to_string())]);
            metrics::counter!(metric_defs::REMOTE_ATTEMPTS.name, &attempt_labels[..]).increment(1);
            self.emit(
                StatusLevel::Info,
                format!(
                    "Computing zonal histogram for {} (tile_scale {}, attempt {}/{})",
                    aoi,
                    plan.multiplier,
                    plan.attempt + 1,
                    MAX_ATTEMPTS
                ),
            );

            let started = Instant::now();
            match self.client.request(&request.with_multiplier(plan.multiplier), scratch) {
                Ok(job) => {
                    for line in job.messages {
                        self.emit(StatusLevel::Info, line);
                    }
                }
                Err(e) => self.emit(StatusLevel::Error, format!("Remote job failed: {}", e)),
            }
            metrics::histogram!(metric_defs::REMOTE_ATTEMPT_DURATION.name, &attempt_labels[..])
                .record(started.elapsed().as_secs_f64() * 1000.0);
            attempts += 1;

            if let Some(bytes) = take_artifact(scratch, remove_if_present)? {
                self.emit(
                    StatusLevel::Success,
                    format!("Zonal histogram computed at tile_scale {}", plan.multiplier),
                );
                return Ok(RawArtifact {
                    bytes,
                    attempts,
                    multiplier: plan.multiplier,
                });
            }

            if let Some(next) = self.policy.plan(attempts) {
                metrics::counter!(metric_defs::REMOTE_ESCALATIONS.name, &labels.to_labels()[..]).increment(1);
                self.emit(
                    StatusLevel::Warning,
                    format!("No result produced, increasing tile_scale ({})", next.multiplier),
                );
            }
        }

        metrics::counter!(metric_defs::REMOTE_AREA_TOO_LARGE.name, &labels.to_labels()[..]).increment(1);
        self.emit(
            StatusLevel::Error,
            format!("AOI {} is too big: no result after {} attempts", aoi, attempts),
        );
        Err(RetryError::AreaTooLarge {
            aoi: aoi.reference().to_string(),
            attempts,
        })
    }

    fn emit(&self, level: StatusLevel, text: impl Into<String>) {
        emit(self.status, level, text);
    }
}

/// Non-empty artifact contents, `None` when absent or empty.
fn read_artifact(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(None),
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read the artifact and discard its file. The bytes are kept even when the
/// file cannot be removed.
fn take_artifact(
    path: &Path,
    remove: impl FnOnce(&Path) -> io::Result<()>,
) -> io::Result<Option<Vec<u8>>> {
    let bytes = read_artifact(path)?;
    if bytes.is_some() {
        if let Err(e) = remove(path) {
            warn!("Could not remove scratch artifact {}: {}", path.display(), e);
        }
    }
    Ok(bytes)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
