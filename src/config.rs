use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::*;
use crate::orchestrator::FailurePolicy;
use crate::resources::ResourceOverrides;

/// Settings read from a YAML file. Command line flags take precedence over anything set here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub min_length: Option<i64>,
    pub threads: Option<usize>,
    pub on_failure: Option<FailurePolicy>,
    #[serde(default)]
    pub resources: ResourceOverrides,
}

impl Config {
    pub fn from_file(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref();
        let reader = File::open(file).map_err(|e| Error::file_io(file, e))?;
        serde_yaml::from_reader(reader).map_err(|e| Error::Yaml {
            file: display(file),
            source: Box::new(e),
        })
    }
}
