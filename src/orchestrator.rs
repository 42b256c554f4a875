//! Trimming every sample pair of a manifest into three output collections.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collection::*;
use crate::errors::*;
use crate::manifest::*;
use crate::params::*;
use crate::resources::*;
use crate::trimmer::*;

/// What to do when the tool fails on a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failed sample and return an error.
    #[default]
    Abort,
    /// Drop the failed sample's outputs, report it, and keep going.
    Skip,
}

/// Directories for the three output collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    pub paired_trimmed: PathBuf,
    pub unpaired_fwd: PathBuf,
    pub unpaired_rev: PathBuf,
}

impl OutputDirs {
    pub fn new(
        paired_trimmed: impl Into<PathBuf>,
        unpaired_fwd: impl Into<PathBuf>,
        unpaired_rev: impl Into<PathBuf>,
    ) -> Self {
        Self {
            paired_trimmed: paired_trimmed.into(),
            unpaired_fwd: unpaired_fwd.into(),
            unpaired_rev: unpaired_rev.into(),
        }
    }

    /// All three collections as subdirectories of `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(
            root.join(CollectionKind::PairedTrimmed.name()),
            root.join(CollectionKind::UnpairedForward.name()),
            root.join(CollectionKind::UnpairedReverse.name()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOutcome {
    pub sample_id: String,
    pub status: TrimStatus,
}

/// Per-sample outcomes, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimReport {
    pub samples: Vec<SampleOutcome>,
}

impl TrimReport {
    pub fn trimmed(&self) -> impl Iterator<Item = &SampleOutcome> {
        self.samples.iter().filter(|s| s.status.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &SampleOutcome> {
        self.samples.iter().filter(|s| !s.status.success)
    }

    pub fn all_trimmed(&self) -> bool {
        self.failed().next().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct TrimOutputs {
    pub paired_trimmed: OutputCollection,
    pub unpaired_fwd: OutputCollection,
    pub unpaired_rev: OutputCollection,
    pub report: TrimReport,
}

impl TrimOutputs {
    pub fn collections(&self) -> [&OutputCollection; 3] {
        [&self.paired_trimmed, &self.unpaired_fwd, &self.unpaired_rev]
    }
}

pub struct TrimOrchestrator<T: ExternalTrimmer> {
    trimmer: T,
    adapters: PathBuf,
    policy: FailurePolicy,
    threads: usize,
}

impl<T: ExternalTrimmer + Sync> TrimOrchestrator<T> {
    const NAME: &'static str = "TrimOrchestrator";

    /// Trim with `trimmer`, clipping the adapters from the bundled adapter file.
    pub fn new(trimmer: T, resources: &BundledResources) -> Self {
        Self {
            trimmer,
            adapters: resources.adapters().to_owned(),
            policy: FailurePolicy::default(),
            threads: 1,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run up to `threads` samples at once. One thread keeps strict manifest order.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn trimmer(&self) -> &T {
        &self.trimmer
    }

    /// The jobs [`TrimOrchestrator::trim_paired`] would run, without touching the filesystem.
    pub fn plan(
        &self,
        manifest: &SampleManifest,
        params: &TrimParameters,
        outputs: &OutputDirs,
    ) -> Result<Vec<TrimJob>> {
        manifest.check_distinct_base_names()?;

        let dirs = [
            absolute(&outputs.paired_trimmed)?,
            absolute(&outputs.unpaired_fwd)?,
            absolute(&outputs.unpaired_rev)?,
        ];
        let kinds = [
            CollectionKind::PairedTrimmed,
            CollectionKind::UnpairedForward,
            CollectionKind::UnpairedReverse,
        ];
        for i in 0..dirs.len() {
            for j in i + 1..dirs.len() {
                if dirs[i] == dirs[j] {
                    Err(Error::SharedOutputDir {
                        first: kinds[i].name(),
                        second: kinds[j].name(),
                        dir: display(&dirs[i]),
                    })?;
                }
            }
        }
        let steps = params.steps(&self.adapters);

        manifest
            .rows()
            .iter()
            .map(|row| {
                Ok(TrimJob {
                    sample_id: row.sample_id.clone(),
                    forward: row.forward.clone(),
                    reverse: row.reverse.clone(),
                    paired_forward: output_path(&dirs[0], &row.forward)?,
                    unpaired_forward: output_path(&dirs[1], &row.forward)?,
                    paired_reverse: output_path(&dirs[0], &row.reverse)?,
                    unpaired_reverse: output_path(&dirs[2], &row.reverse)?,
                    steps: steps.clone(),
                })
            })
            .collect()
    }

    /// Trim every sample pair in `manifest` into fresh output collections.
    ///
    /// Returns only once every sample has been processed. Under [`FailurePolicy::Abort`] the
    /// first failed sample turns into [`Error::ToolFailed`] and no collections are returned.
    pub fn trim_paired(
        &self,
        manifest: &SampleManifest,
        params: &TrimParameters,
        outputs: &OutputDirs,
    ) -> Result<TrimOutputs> {
        let jobs = self.plan(manifest, params, outputs)?;

        let mut paired =
            PendingCollection::create(&outputs.paired_trimmed, CollectionKind::PairedTrimmed)?;
        let mut unpaired_fwd =
            PendingCollection::create(&outputs.unpaired_fwd, CollectionKind::UnpairedForward)?;
        let mut unpaired_rev =
            PendingCollection::create(&outputs.unpaired_rev, CollectionKind::UnpairedReverse)?;

        info!(
            "{}: trimming {} paired-end samples (MINLEN:{}, {} thread{})",
            Self::NAME,
            jobs.len(),
            params.min_length(),
            self.threads,
            if self.threads == 1 { "" } else { "s" }
        );

        let statuses = self.run_jobs(&jobs)?;

        let mut report = TrimReport::default();
        for (job, status) in jobs.iter().zip(statuses) {
            // unclaimed rows only happen after an abort, which has already returned
            let Some(status) = status else { continue };

            if status.success {
                paired.record(&job.sample_id, Direction::Forward, job.paired_forward.clone());
                paired.record(&job.sample_id, Direction::Reverse, job.paired_reverse.clone());
                unpaired_fwd.record(&job.sample_id, Direction::Forward, job.unpaired_forward.clone());
                unpaired_rev.record(&job.sample_id, Direction::Reverse, job.unpaired_reverse.clone());
            } else {
                warn!(
                    "Skipping sample \"{}\": trimming failed with {}",
                    job.sample_id, status.description
                );
                remove_outputs(job);
            }

            report.samples.push(SampleOutcome {
                sample_id: job.sample_id.clone(),
                status,
            });
        }

        let metadata = manifest.metadata();
        let paired_trimmed = paired.finish(metadata)?;
        let unpaired_fwd = unpaired_fwd.finish(metadata)?;
        let unpaired_rev = unpaired_rev.finish(metadata)?;

        info!(
            "{}: {} of {} samples trimmed",
            Self::NAME,
            report.trimmed().count(),
            report.samples.len()
        );

        Ok(TrimOutputs {
            paired_trimmed,
            unpaired_fwd,
            unpaired_rev,
            report,
        })
    }

    /// Run jobs on up to `self.threads` workers. The result has one slot per job, in job order;
    /// a slot is `None` only if the batch was aborted before that job was claimed.
    fn run_jobs(&self, jobs: &[TrimJob]) -> Result<Vec<Option<TrimStatus>>> {
        let cursor = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let results: Mutex<Vec<Option<Result<TrimStatus>>>> =
            Mutex::new((0..jobs.len()).map(|_| None).collect());

        let worker = || loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let idx = cursor.fetch_add(1, Ordering::Relaxed);
            let Some(job) = jobs.get(idx) else { break };

            info!("[{}/{}] Trimming sample {}", idx + 1, jobs.len(), job.sample_id);
            let result = self.trimmer.run(job);

            let fatal = match &result {
                Ok(status) => !status.success && self.policy == FailurePolicy::Abort,
                Err(_) => true,
            };
            if fatal {
                stop.store(true, Ordering::Relaxed);
            }
            results.lock().unwrap_or_else(PoisonError::into_inner)[idx] = Some(result);
        };

        if self.threads <= 1 || jobs.len() <= 1 {
            worker();
        } else {
            std::thread::scope(|s| {
                for _ in 0..self.threads.min(jobs.len()) {
                    s.spawn(&worker);
                }
            });
        }

        let mut statuses = Vec::with_capacity(jobs.len());
        // a panicking trimmer is re-raised by the scope, and the lock is never held across `run`
        let results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Some(Ok(status)) if !status.success && self.policy == FailurePolicy::Abort => {
                    Err(Error::ToolFailed {
                        sample: job.sample_id.clone(),
                        status: status.description,
                        stderr: status.stderr_tail,
                    })?;
                }
                Some(Err(e)) => Err(e)?,
                other => statuses.push(other.and_then(|r| r.ok())),
            }
        }

        Ok(statuses)
    }
}

fn remove_outputs(job: &TrimJob) {
    for path in job.outputs() {
        match std::fs::remove_file(path) {
            Ok(()) => (),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
            Err(e) => warn!("Could not remove partial output {}: {}", path.display(), e),
        }
    }
}
