//! Directory-backed collections of trimmed read files.
//!
//! A collection starts out as a [`PendingCollection`]: an empty directory owned by one trimming
//! run. Files are recorded into it row by row and it only becomes an [`OutputCollection`] once
//! [`PendingCollection::finish`] writes its `MANIFEST` and `metadata.yml`, so callers never see a
//! half-populated result.

use std::fmt;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::*;
use crate::manifest::*;

lazy_static! {
    static ref CASAVA_NAME: Regex =
        Regex::new(r"^(?P<sample>.+)_(?P<barcode>[^_]+)_L(?P<lane>\d+)_R(?P<read>[12])_001\.fastq\.gz$")
            .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    PairedTrimmed,
    UnpairedForward,
    UnpairedReverse,
}

impl CollectionKind {
    pub fn name(&self) -> &'static str {
        match self {
            CollectionKind::PairedTrimmed => "paired_end_trimmed",
            CollectionKind::UnpairedForward => "unpaired_fwd",
            CollectionKind::UnpairedReverse => "unpaired_rev",
        }
    }

    /// Whether files of this direction belong in the collection.
    pub fn holds(&self, direction: Direction) -> bool {
        match self {
            CollectionKind::PairedTrimmed => true,
            CollectionKind::UnpairedForward => direction == Direction::Forward,
            CollectionKind::UnpairedReverse => direction == Direction::Reverse,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lane and read number parsed from a Casava 1.8 style file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasavaInfo {
    pub lane: u32,
    pub read: u8,
}

impl CasavaInfo {
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = CASAVA_NAME.captures(file_name)?;
        Some(Self {
            lane: caps["lane"].parse().ok()?,
            read: caps["read"].parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    pub sample_id: String,
    pub direction: Direction,
    pub path: PathBuf,
}

impl CollectionEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn casava(&self) -> Option<CasavaInfo> {
        CasavaInfo::parse(&self.file_name())
    }
}

impl fmt::Display for CollectionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.sample_id,
            self.direction.as_str(),
            self.file_name()
        )?;
        if let Some(info) = self.casava() {
            write!(f, " (lane {}, read {})", info.lane, info.read)?;
        }
        Ok(())
    }
}

/// Where the trimmed version of `input` goes inside `dir`: the input's base name, unchanged.
pub fn output_path(dir: &Path, input: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .ok_or_else(|| Error::manifest(input, "read file path has no file name"))?;
    Ok(dir.join(name))
}

/// An output directory that is still being filled.
#[derive(Debug)]
pub struct PendingCollection {
    kind: CollectionKind,
    dir: PathBuf,
    entries: Vec<CollectionEntry>,
}

impl PendingCollection {
    /// Create the directory for a fresh collection.
    ///
    /// An existing empty directory is reused. A directory that already holds files is refused.
    pub fn create(dir: impl AsRef<Path>, kind: CollectionKind) -> Result<Self> {
        let dir = absolute(dir)?;

        if dir.exists() {
            let mut contents = std::fs::read_dir(&dir).map_err(|e| Error::file_io(&dir, e))?;
            if contents.next().is_some() {
                Err(Error::OutputExists { dir: display(&dir) })?;
            }
        } else {
            std::fs::create_dir_all(&dir).map_err(|e| Error::file_io(&dir, e))?;
        }

        Ok(Self {
            kind,
            dir,
            entries: Vec::new(),
        })
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record(&mut self, sample_id: &str, direction: Direction, path: PathBuf) {
        debug_assert!(self.kind.holds(direction));
        self.entries.push(CollectionEntry {
            sample_id: sample_id.to_owned(),
            direction,
            path,
        });
    }

    /// Write the directory's `MANIFEST` and `metadata.yml` and hand out the finished collection.
    pub fn finish(self, metadata: DirMetadata) -> Result<OutputCollection> {
        let manifest_path = self.dir.join(MANIFEST_FILE);
        let mut wtr = csv::Writer::from_path(&manifest_path).map_err(|e| Error::Csv {
            file: display(&manifest_path),
            source: Box::new(e),
        })?;

        // header is written even with no entries so the directory stays loadable
        wtr.write_record(["sample-id", "filename", "direction"])
            .map_err(|e| Error::Csv {
                file: display(&manifest_path),
                source: Box::new(e),
            })?;
        for entry in &self.entries {
            wtr.write_record([
                entry.sample_id.as_str(),
                entry.file_name().as_str(),
                entry.direction.as_str(),
            ])
            .map_err(|e| Error::Csv {
                file: display(&manifest_path),
                source: Box::new(e),
            })?;
        }
        wtr.flush().map_err(|e| Error::file_io(&manifest_path, e))?;

        metadata.to_file(self.dir.join(METADATA_FILE))?;

        Ok(OutputCollection {
            kind: self.kind,
            dir: self.dir,
            entries: self.entries,
        })
    }
}

/// A fully populated output directory.
#[derive(Debug, Clone)]
pub struct OutputCollection {
    kind: CollectionKind,
    dir: PathBuf,
    entries: Vec<CollectionEntry>,
}

impl OutputCollection {
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &[CollectionEntry] {
        &self.entries
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
