use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::*;

pub const DEFAULT_MIN_LENGTH: usize = 100;

/// Caller-facing trimming options.
///
/// Everything else about the trimming run is fixed, see [`TrimParameters::steps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimParameters {
    min_length: usize,
}

impl TrimParameters {
    /// Reads shorter than `min_length` after trimming are discarded. Must be at least 1.
    pub fn new(min_length: usize) -> Result<Self> {
        if min_length == 0 {
            Err(Error::InvalidParameter {
                name: "min_length",
                reason: "must be a positive integer".to_owned(),
            })?;
        }

        Ok(Self { min_length })
    }

    /// Same as [`TrimParameters::new`], for values coming from signed sources like the CLI.
    pub fn from_signed(min_length: i64) -> Result<Self> {
        let min_length = usize::try_from(min_length).map_err(|_| Error::InvalidParameter {
            name: "min_length",
            reason: format!("must be a positive integer, got {min_length}"),
        })?;
        Self::new(min_length)
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// The ordered trimming steps passed to the tool.
    ///
    /// Only the final `MINLEN` step depends on the parameters.
    pub fn steps(&self, adapters: &Path) -> Vec<TrimStep> {
        vec![
            TrimStep::IlluminaClip {
                adapters: adapters.to_owned(),
                seed_mismatches: 2,
                palindrome_clip_threshold: 30,
                simple_clip_threshold: 10,
            },
            TrimStep::Leading { quality: 3 },
            TrimStep::Trailing { quality: 3 },
            TrimStep::SlidingWindow {
                window_size: 4,
                required_quality: 15,
            },
            TrimStep::MinLen {
                length: self.min_length,
            },
        ]
    }
}

impl Default for TrimParameters {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimStep {
    IlluminaClip {
        adapters: PathBuf,
        seed_mismatches: u32,
        palindrome_clip_threshold: u32,
        simple_clip_threshold: u32,
    },
    Leading {
        quality: u32,
    },
    Trailing {
        quality: u32,
    },
    SlidingWindow {
        window_size: u32,
        required_quality: u32,
    },
    MinLen {
        length: usize,
    },
}

impl fmt::Display for TrimStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TrimStep::*;
        match self {
            IlluminaClip {
                adapters,
                seed_mismatches,
                palindrome_clip_threshold,
                simple_clip_threshold,
            } => write!(
                f,
                "ILLUMINACLIP:{}:{seed_mismatches}:{palindrome_clip_threshold}:{simple_clip_threshold}",
                adapters.display()
            ),
            Leading { quality } => write!(f, "LEADING:{quality}"),
            Trailing { quality } => write!(f, "TRAILING:{quality}"),
            SlidingWindow {
                window_size,
                required_quality,
            } => write!(f, "SLIDINGWINDOW:{window_size}:{required_quality}"),
            MinLen { length } => write!(f, "MINLEN:{length}"),
        }
    }
}
