//! Command line interface.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use crate::config::Config;
use crate::manifest::SampleManifest;
use crate::orchestrator::*;
use crate::params::{TrimParameters, DEFAULT_MIN_LENGTH};
use crate::resources::*;
use crate::summary::RunSummary;
use crate::trimmer::Trimmomatic;

#[derive(Parser, Debug)]
#[command(name = "pairtrim")]
#[command(about = "Adapter and quality trimming of paired-end FASTQ samples with Trimmomatic")]
pub struct Cli {
    /// Log tool output and command lines
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trim every sample pair of the input
    Trim(TrimArgs),
    /// Print the tool command line for every sample pair without running anything
    Plan(CommonArgs),
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Per-sample sequence directory with a MANIFEST, or a tab-separated manifest file
    #[arg(short = 'i', long)]
    pub input: PathBuf,
    /// Output directory for trimmed read pairs
    #[arg(long)]
    pub paired_out: PathBuf,
    /// Output directory for forward reads whose mate was dropped
    #[arg(long)]
    pub unpaired_fwd_out: PathBuf,
    /// Output directory for reverse reads whose mate was dropped
    #[arg(long)]
    pub unpaired_rev_out: PathBuf,
    /// Reads shorter than this after trimming are discarded [default: 100]
    #[arg(short = 'm', long, allow_negative_numbers = true)]
    pub min_length: Option<i64>,
    /// YAML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Trimmomatic jar or wrapper script, instead of the bundled one
    #[arg(long)]
    pub trimmomatic: Option<PathBuf>,
    /// Adapter fasta, instead of the bundled NexteraPE-PE.fa
    #[arg(long)]
    pub adapters: Option<PathBuf>,
    /// Java executable used to launch a jar
    #[arg(long)]
    pub java: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TrimArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Number of samples trimmed at once [default: 1]
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
    /// What to do when trimming a sample fails [default: abort]
    #[arg(long, value_enum)]
    pub on_failure: Option<FailurePolicy>,
    /// Count the records in every output file when done
    #[arg(long)]
    pub count_reads: bool,
}

/// Everything resolved from flags, config file, and environment, before any work is done.
struct Setup {
    config: Config,
    manifest: SampleManifest,
    params: TrimParameters,
    resources: BundledResources,
    outputs: OutputDirs,
}

impl CommonArgs {
    fn setup(&self) -> Result<Setup> {
        let config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        let min_length = self
            .min_length
            .or(config.min_length)
            .unwrap_or(DEFAULT_MIN_LENGTH as i64);
        let params = TrimParameters::from_signed(min_length)?;

        let overrides = config.resources.clone().merge(ResourceOverrides {
            trimmomatic: self.trimmomatic.clone(),
            adapters: self.adapters.clone(),
            java: self.java.clone(),
        });
        let resources = BundledResources::resolve(&overrides)?;

        let manifest = SampleManifest::load(&self.input)
            .with_context(|| format!("failed to load samples from {}", self.input.display()))?;

        Ok(Setup {
            config,
            manifest,
            params,
            resources,
            outputs: OutputDirs::new(
                &self.paired_out,
                &self.unpaired_fwd_out,
                &self.unpaired_rev_out,
            ),
        })
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Trim(args) => trim(args),
        Commands::Plan(args) => plan(args),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn trim(args: TrimArgs) -> Result<()> {
    let start = Instant::now();
    let setup = args.common.setup()?;

    let threads = args.threads.or(setup.config.threads).unwrap_or(1);
    let policy = args
        .on_failure
        .or(setup.config.on_failure)
        .unwrap_or_default();

    info!(
        "Loaded {} samples from {}",
        setup.manifest.len(),
        setup.manifest.source().display()
    );

    let orchestrator = TrimOrchestrator::new(Trimmomatic::new(&setup.resources), &setup.resources)
        .with_policy(policy)
        .with_threads(threads);
    let outputs = orchestrator.trim_paired(&setup.manifest, &setup.params, &setup.outputs)?;

    for collection in outputs.collections() {
        info!(
            "{}: {} files in {}",
            collection.kind(),
            collection.len(),
            collection.dir().display()
        );
        for entry in collection.entries() {
            debug!("  {}", entry);
        }
    }

    if args.count_reads {
        let summary = RunSummary::from_outputs(&outputs).context("failed to count output reads")?;
        print!("{summary}");
    }

    info!("Done in {:.2}s", start.elapsed().as_secs_f64());

    let failed = outputs.report.failed().count();
    if failed > 0 {
        anyhow::bail!("{} of {} samples failed to trim", failed, outputs.report.samples.len());
    }

    Ok(())
}

fn plan(args: CommonArgs) -> Result<()> {
    let setup = args.setup()?;
    let trimmer = Trimmomatic::new(&setup.resources);
    let orchestrator = TrimOrchestrator::new(trimmer, &setup.resources);

    for job in orchestrator.plan(&setup.manifest, &setup.params, &setup.outputs)? {
        let line = orchestrator.trimmer().command_line(&job);
        println!("{}", shell_join(&line));
    }

    Ok(())
}

fn shell_join(args: &[OsString]) -> String {
    args.iter()
        .map(|a| {
            let a = a.to_string_lossy();
            if a.is_empty() || a.contains(|c: char| c.is_whitespace() || "'\"$\\".contains(c)) {
                format!("'{}'", a.replace('\'', r"'\''"))
            } else {
                a.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
