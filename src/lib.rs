//! Paired-end adapter and quality trimming for per-sample FASTQ collections.
//!
//! # Overview
//! pairtrim takes a collection of paired-end samples, runs Trimmomatic once per sample pair, and
//! publishes the trimmed reads as three per-sample sequence directories:
//! * `paired_end_trimmed`: read pairs where both mates survived trimming
//! * `unpaired_fwd`: forward reads whose reverse mate was dropped
//! * `unpaired_rev`: reverse reads whose forward mate was dropped
//!
//! All of the actual trimming happens inside the external tool. This crate finds the read files,
//! decides where each output goes, builds the command line, and waits for the tool.
//!
//! ## Inputs
//! Samples are listed in a [`SampleManifest`], loaded either from a directory with a `MANIFEST`
//! file or from a tab-separated manifest:
//! ```text
//! sample-id,filename,direction
//! sample1,s1_R1.fastq.gz,forward
//! sample1,s1_R2.fastq.gz,reverse
//! ```
//! Every read file is checked before anything runs: it has to exist, be non-empty, and be
//! gzip compressed.
//!
//! ## Trimming
//! Each sample pair becomes a [`TrimJob`]. With the default parameters the tool is started as
//! ```text
//! java -jar trimmomatic-0.39.jar PE s1_R1.fastq.gz s1_R2.fastq.gz \
//!     <paired>/s1_R1.fastq.gz <unpaired_fwd>/s1_R1.fastq.gz \
//!     <paired>/s1_R2.fastq.gz <unpaired_rev>/s1_R2.fastq.gz \
//!     ILLUMINACLIP:NexteraPE-PE.fa:2:30:10 LEADING:3 TRAILING:3 SLIDINGWINDOW:4:15 MINLEN:100
//! ```
//! Output files keep the base name of the input file they came from. Only `MINLEN` can be
//! changed, through [`TrimParameters`].
//!
//! The adapter file and the tool are [`BundledResources`], resolved once at startup.
//!
//! ## Running
//! [`TrimOrchestrator`] drives an [`ExternalTrimmer`] over every row of the manifest:
//! ```no_run
//! use pairtrim::*;
//!
//! # fn main() -> pairtrim::errors::Result<()> {
//! let resources = BundledResources::resolve(&ResourceOverrides::default())?;
//! let manifest = SampleManifest::load("reads/")?;
//!
//! let outputs = TrimOrchestrator::new(Trimmomatic::new(&resources), &resources)
//!     .with_policy(FailurePolicy::Skip)
//!     .trim_paired(&manifest, &TrimParameters::new(50)?, &OutputDirs::under("trimmed/"))?;
//!
//! for sample in outputs.report.failed() {
//!     eprintln!("{} failed: {}", sample.sample_id, sample.status.description);
//! }
//! # Ok(())
//! # }
//! ```
//! Samples run one after another in manifest order unless more threads are requested. A sample
//! that fails either stops the whole batch or is skipped and reported, depending on the
//! [`FailurePolicy`].

pub mod cli;
pub mod collection;
pub mod config;
pub mod errors;
pub mod manifest;
pub mod orchestrator;
pub mod params;
pub mod resources;
pub mod summary;
pub mod trimmer;

// commonly used functions and types

pub use crate::collection::*;
pub use crate::manifest::*;
pub use crate::orchestrator::*;
pub use crate::params::*;
pub use crate::resources::*;
pub use crate::trimmer::*;
