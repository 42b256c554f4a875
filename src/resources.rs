//! The adapter file and trimming tool shipped alongside the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::*;

pub const SHARE_ENV: &str = "PAIRTRIM_SHARE";
pub const DEFAULT_EXECUTABLE: &str = "trimmomatic-0.39.jar";
pub const DEFAULT_ADAPTERS: &str = "adapters/NexteraPE-PE.fa";
pub const DEFAULT_JAVA: &str = "java";

/// Explicit resource paths, from the config file or command line. Unset entries fall back to
/// the shared resource directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResourceOverrides {
    pub trimmomatic: Option<PathBuf>,
    pub adapters: Option<PathBuf>,
    pub java: Option<PathBuf>,
}

impl ResourceOverrides {
    /// Entries set in `other` win.
    pub fn merge(self, other: ResourceOverrides) -> Self {
        Self {
            trimmomatic: other.trimmomatic.or(self.trimmomatic),
            adapters: other.adapters.or(self.adapters),
            java: other.java.or(self.java),
        }
    }
}

/// How the tool executable is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
    /// `java -jar <jar>`
    Jar { java: PathBuf, jar: PathBuf },
    /// A wrapper script or native binary run as is.
    Direct(PathBuf),
}

impl Launcher {
    pub fn program(&self) -> &Path {
        match self {
            Launcher::Jar { java, .. } => java,
            Launcher::Direct(program) => program,
        }
    }

    /// Arguments that come before the tool's own arguments.
    pub fn prefix_args(&self) -> Vec<PathBuf> {
        match self {
            Launcher::Jar { jar, .. } => vec![PathBuf::from("-jar"), jar.clone()],
            Launcher::Direct(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledResources {
    launcher: Launcher,
    adapters: PathBuf,
}

impl BundledResources {
    /// Use the given files without looking anything up. Both must exist.
    pub fn new(executable: impl Into<PathBuf>, adapters: impl Into<PathBuf>) -> Result<Self> {
        Self::with_java(executable, adapters, DEFAULT_JAVA)
    }

    pub fn with_java(
        executable: impl Into<PathBuf>,
        adapters: impl Into<PathBuf>,
        java: impl Into<PathBuf>,
    ) -> Result<Self> {
        let executable = absolute(executable.into())?;
        let adapters = absolute(adapters.into())?;

        check_exists("trimming tool", &executable)?;
        check_exists("adapter file", &adapters)?;

        // ILLUMINACLIP fields are colon separated
        if adapters.to_string_lossy().contains(':') {
            Err(Error::Resource {
                what: "adapter file (path contains ':')",
                path: display(&adapters),
            })?;
        }

        let launcher = if executable.extension().is_some_and(|e| e == "jar") {
            Launcher::Jar {
                java: java.into(),
                jar: executable,
            }
        } else {
            Launcher::Direct(executable)
        };

        Ok(Self { launcher, adapters })
    }

    /// Resolve resources once at startup.
    ///
    /// Explicit overrides are used first. Anything left unset is looked up in `$PAIRTRIM_SHARE`,
    /// or in `share/pairtrim` next to the directory holding the running binary.
    pub fn resolve(overrides: &ResourceOverrides) -> Result<Self> {
        let share = match (&overrides.trimmomatic, &overrides.adapters) {
            (Some(_), Some(_)) => None,
            _ => Some(share_dir()?),
        };
        let from_share = |name: &str| share.as_ref().map(|s| s.join(name)).unwrap_or_default();

        let executable = overrides
            .trimmomatic
            .clone()
            .unwrap_or_else(|| from_share(DEFAULT_EXECUTABLE));
        let adapters = overrides
            .adapters
            .clone()
            .unwrap_or_else(|| from_share(DEFAULT_ADAPTERS));
        let java = overrides
            .java
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_JAVA));

        debug!(
            "Resolved resources: tool {}, adapters {}",
            executable.display(),
            adapters.display()
        );
        Self::with_java(executable, adapters, java)
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    pub fn adapters(&self) -> &Path {
        &self.adapters
    }
}

fn share_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(SHARE_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let exe = std::env::current_exe().map_err(|e| Error::file_io("current executable", e))?;
    let prefix = exe.parent().and_then(Path::parent).ok_or_else(|| Error::Resource {
        what: "resource directory",
        path: display(&exe),
    })?;
    Ok(prefix.join("share").join("pairtrim"))
}

fn check_exists(what: &'static str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::Resource {
            what,
            path: display(path),
        })
    }
}
