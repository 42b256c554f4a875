//! Errors raised while loading inputs, resolving resources, and running the trimmer.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Error reading or writing \"{file}\": {source}")]
    FileIo {
        file: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid manifest \"{file}\": {reason}")]
    Manifest { file: String, reason: String },

    #[error("Error parsing \"{file}\": {source}")]
    Csv {
        file: String,
        source: Box<csv::Error>,
    },

    #[error("Error parsing \"{file}\": {source}")]
    Yaml {
        file: String,
        source: Box<serde_yaml::Error>,
    },

    #[error("Invalid parameter \"{name}\": {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: String,
    },

    #[error("Bundled {what} \"{path}\" is missing or unusable")]
    Resource { what: &'static str, path: String },

    #[error("Could not launch \"{program}\": {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Trimming sample \"{sample}\" failed with {status}{}", fmt_stderr(.stderr))]
    ToolFailed {
        sample: String,
        status: String,
        stderr: String,
    },

    #[error("Output directory \"{dir}\" already exists and is not empty")]
    OutputExists { dir: String },

    #[error("Output collections {first} and {second} would share the directory \"{dir}\"")]
    SharedOutputDir {
        first: &'static str,
        second: &'static str,
        dir: String,
    },

    #[error("Error counting records in \"{file}\": {reason}")]
    Summary { file: String, reason: String },
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{stderr}")
    }
}

impl Error {
    pub fn file_io(file: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::FileIo {
            file: display(file),
            source: Box::new(source),
        }
    }

    pub fn manifest(file: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Error::Manifest {
            file: display(file),
            reason: reason.into(),
        }
    }
}

/// Lossy display form of a path, used in error messages.
pub fn display(path: impl AsRef<Path>) -> String {
    path.as_ref().to_string_lossy().into_owned()
}

/// Absolute form of a path without touching symlinks.
pub fn absolute(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let cwd = std::env::current_dir().map_err(|e| Error::file_io(".", e))?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_includes_stderr_tail() {
        let e = Error::ToolFailed {
            sample: "s1".to_owned(),
            status: "exit status: 1".to_owned(),
            stderr: "Exception in thread main".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Trimming sample \"s1\" failed with exit status: 1"));
        assert!(msg.ends_with(":\nException in thread main"));
    }

    #[test]
    fn tool_failure_without_stderr() {
        let e = Error::ToolFailed {
            sample: "s1".to_owned(),
            status: "signal: 9".to_owned(),
            stderr: String::new(),
        };
        assert_eq!(e.to_string(), "Trimming sample \"s1\" failed with signal: 9");
    }
}
