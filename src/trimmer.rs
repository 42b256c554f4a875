//! Running the external trimming tool on one sample pair.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::errors::*;
use crate::params::*;
use crate::resources::*;

const STDERR_TAIL_LINES: usize = 20;

/// Everything needed to trim one sample pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimJob {
    pub sample_id: String,
    pub forward: PathBuf,
    pub reverse: PathBuf,
    pub paired_forward: PathBuf,
    pub unpaired_forward: PathBuf,
    pub paired_reverse: PathBuf,
    pub unpaired_reverse: PathBuf,
    pub steps: Vec<TrimStep>,
}

impl TrimJob {
    /// Tool arguments in paired-end mode, without any launcher prefix.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "PE".into(),
            self.forward.clone().into(),
            self.reverse.clone().into(),
            self.paired_forward.clone().into(),
            self.unpaired_forward.clone().into(),
            self.paired_reverse.clone().into(),
            self.unpaired_reverse.clone().into(),
        ];
        args.extend(self.steps.iter().map(|s| OsString::from(s.to_string())));
        args
    }

    pub fn outputs(&self) -> [&PathBuf; 4] {
        [
            &self.paired_forward,
            &self.unpaired_forward,
            &self.paired_reverse,
            &self.unpaired_reverse,
        ]
    }
}

/// How a tool run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimStatus {
    pub success: bool,
    pub description: String,
    pub stderr_tail: String,
}

impl TrimStatus {
    pub fn success() -> Self {
        Self {
            success: true,
            description: "exit status: 0".to_owned(),
            stderr_tail: String::new(),
        }
    }

    pub fn failure(description: impl Into<String>, stderr_tail: impl Into<String>) -> Self {
        Self {
            success: false,
            description: description.into(),
            stderr_tail: stderr_tail.into(),
        }
    }

    fn from_exit(status: ExitStatus, stderr: &[u8]) -> Self {
        if status.success() {
            return Self::success();
        }

        let stderr = String::from_utf8_lossy(stderr);
        let lines = stderr.lines().collect::<Vec<_>>();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        Self::failure(status.to_string(), tail)
    }
}

/// Something that can trim a sample pair. The real implementation launches a process; tests
/// substitute fakes.
#[cfg_attr(test, automock)]
pub trait ExternalTrimmer {
    /// Run one job to completion. `Err` means the tool could not be run at all; a tool that ran
    /// and failed is reported through the returned status.
    fn run(&self, job: &TrimJob) -> Result<TrimStatus>;
}

/// Trimmomatic, started as a blocking subprocess.
#[derive(Debug, Clone)]
pub struct Trimmomatic {
    launcher: Launcher,
}

impl Trimmomatic {
    pub fn new(resources: &BundledResources) -> Self {
        Self {
            launcher: resources.launcher().clone(),
        }
    }

    /// Full command line for a job, program first.
    pub fn command_line(&self, job: &TrimJob) -> Vec<OsString> {
        let mut line = vec![self.launcher.program().as_os_str().to_owned()];
        line.extend(self.launcher.prefix_args().into_iter().map(OsString::from));
        line.extend(job.args());
        line
    }

    fn command(&self, job: &TrimJob) -> Command {
        let mut cmd = Command::new(self.launcher.program());
        cmd.args(self.launcher.prefix_args())
            .args(job.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl ExternalTrimmer for Trimmomatic {
    fn run(&self, job: &TrimJob) -> Result<TrimStatus> {
        let mut cmd = self.command(job);
        debug!("Command: {:?}", cmd);

        let output = cmd.output().map_err(|e| Error::Spawn {
            program: display(self.launcher.program()),
            source: e,
        })?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!("[{}] {}", job.sample_id, line);
        }

        Ok(TrimStatus::from_exit(output.status, &output.stderr))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::Path;

    use super::*;

    pub(crate) fn job(dir: &Path, min_length: usize) -> TrimJob {
        let params = TrimParameters::new(min_length).unwrap();
        TrimJob {
            sample_id: "sample1".to_owned(),
            forward: dir.join("in/s1_R1.fastq.gz"),
            reverse: dir.join("in/s1_R2.fastq.gz"),
            paired_forward: dir.join("paired/s1_R1.fastq.gz"),
            unpaired_forward: dir.join("unpaired_fwd/s1_R1.fastq.gz"),
            paired_reverse: dir.join("paired/s1_R2.fastq.gz"),
            unpaired_reverse: dir.join("unpaired_rev/s1_R2.fastq.gz"),
            steps: params.steps(&dir.join("share/NexteraPE-PE.fa")),
        }
    }

    fn strings(line: Vec<OsString>) -> Vec<String> {
        line.into_iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn jar_command_line() {
        let trimmer = Trimmomatic {
            launcher: Launcher::Jar {
                java: "java".into(),
                jar: "/share/trimmomatic-0.39.jar".into(),
            },
        };

        let line = strings(trimmer.command_line(&job(Path::new("/w"), 50)));
        assert_eq!(
            line,
            vec![
                "java",
                "-jar",
                "/share/trimmomatic-0.39.jar",
                "PE",
                "/w/in/s1_R1.fastq.gz",
                "/w/in/s1_R2.fastq.gz",
                "/w/paired/s1_R1.fastq.gz",
                "/w/unpaired_fwd/s1_R1.fastq.gz",
                "/w/paired/s1_R2.fastq.gz",
                "/w/unpaired_rev/s1_R2.fastq.gz",
                "ILLUMINACLIP:/w/share/NexteraPE-PE.fa:2:30:10",
                "LEADING:3",
                "TRAILING:3",
                "SLIDINGWINDOW:4:15",
                "MINLEN:50",
            ]
        );
    }

    #[test]
    fn direct_command_line_has_no_prefix() {
        let trimmer = Trimmomatic {
            launcher: Launcher::Direct("/usr/bin/trimmomatic".into()),
        };

        let line = strings(trimmer.command_line(&job(Path::new("/w"), 100)));
        assert_eq!(line[0], "/usr/bin/trimmomatic");
        assert_eq!(line[1], "PE");
        assert_eq!(line.last().unwrap(), "MINLEN:100");
    }

    #[test]
    fn unlaunchable_program_is_a_spawn_error() {
        let trimmer = Trimmomatic {
            launcher: Launcher::Direct("/nonexistent/pairtrim-tool".into()),
        };

        assert!(matches!(
            trimmer.run(&job(Path::new("/w"), 100)),
            Err(Error::Spawn { .. })
        ));
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let stderr = (0..50).map(|i| format!("line {i}\n")).collect::<String>();
        let status = TrimStatus::failure("exit status: 1", "");
        assert!(!status.success);

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            let status = TrimStatus::from_exit(ExitStatus::from_raw(1 << 8), stderr.as_bytes());
            assert!(!status.success);
            assert_eq!(status.stderr_tail.lines().count(), STDERR_TAIL_LINES);
            assert!(status.stderr_tail.ends_with("line 49"));
        }
    }
}
