//! Loading and validating the table of paired-end samples to trim.
//!
//! Two layouts are understood:
//! * a per-sample sequence directory holding a `MANIFEST` csv with one row per read direction
//!   (`sample-id,filename,direction`) and an optional `metadata.yml`
//! * a tab-separated manifest file with one row per sample
//!   (`sample-id`, `forward-absolute-filepath`, `reverse-absolute-filepath`)
//!
//! Every referenced file must exist, be non-empty, and be gzip compressed. All of this is checked
//! up front so that no trimming is started for a broken input.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::errors::*;

pub const MANIFEST_FILE: &str = "MANIFEST";
pub const METADATA_FILE: &str = "metadata.yml";

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$(?:\{(\w+)\}|(\w+))").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

/// Contents of `metadata.yml` in a per-sample sequence directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DirMetadata {
    pub phred_offset: u8,
}

impl Default for DirMetadata {
    fn default() -> Self {
        Self { phred_offset: 33 }
    }
}

impl DirMetadata {
    pub fn from_file(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref();
        let reader = File::open(file).map_err(|e| Error::file_io(file, e))?;
        let metadata: Self = serde_yaml::from_reader(reader).map_err(|e| Error::Yaml {
            file: display(file),
            source: Box::new(e),
        })?;

        if metadata.phred_offset != 33 && metadata.phred_offset != 64 {
            Err(Error::manifest(
                file,
                format!("phred-offset must be 33 or 64, got {}", metadata.phred_offset),
            ))?;
        }

        Ok(metadata)
    }

    pub fn to_file(&self, file: impl AsRef<Path>) -> Result<()> {
        let file = file.as_ref();
        let writer = File::create(file).map_err(|e| Error::file_io(file, e))?;
        serde_yaml::to_writer(writer, self).map_err(|e| Error::Yaml {
            file: display(file),
            source: Box::new(e),
        })
    }
}

/// One row of the `MANIFEST` csv in a per-sample sequence directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirManifestRecord {
    #[serde(rename = "sample-id")]
    pub sample_id: String,
    pub filename: String,
    pub direction: Direction,
}

#[derive(Debug, Deserialize)]
struct FileManifestRecord {
    #[serde(rename = "sample-id")]
    sample_id: String,
    #[serde(rename = "forward-absolute-filepath")]
    forward: String,
    #[serde(rename = "reverse-absolute-filepath")]
    reverse: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRow {
    pub sample_id: String,
    pub forward: PathBuf,
    pub reverse: PathBuf,
}

impl SampleRow {
    pub fn new(
        sample_id: impl Into<String>,
        forward: impl Into<PathBuf>,
        reverse: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sample_id: sample_id.into(),
            forward: forward.into(),
            reverse: reverse.into(),
        }
    }

    pub fn path(&self, direction: Direction) -> &Path {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SampleManifest {
    source: PathBuf,
    rows: Vec<SampleRow>,
    metadata: DirMetadata,
}

impl SampleManifest {
    /// Load samples from either a per-sample sequence directory or a tab-separated manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = absolute(path)?;

        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_manifest_file(path)
        }
    }

    /// Load samples from a directory holding a `MANIFEST` csv and the read files it names.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = absolute(dir)?;
        let manifest_path = dir.join(MANIFEST_FILE);

        if !manifest_path.is_file() {
            Err(Error::manifest(&dir, format!("no {MANIFEST_FILE} file in directory")))?;
        }

        let mut rdr = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(&manifest_path)
            .map_err(|e| Error::Csv {
                file: display(&manifest_path),
                source: Box::new(e),
            })?;

        let mut order = Vec::new();
        let mut pairs: FxHashMap<String, (Option<PathBuf>, Option<PathBuf>)> =
            FxHashMap::default();

        for result in rdr.deserialize() {
            let record: DirManifestRecord = result.map_err(|e| Error::Csv {
                file: display(&manifest_path),
                source: Box::new(e),
            })?;

            if Path::new(&record.filename).file_name() != Some(OsStr::new(&record.filename)) {
                Err(Error::manifest(
                    &manifest_path,
                    format!("filename \"{}\" must be a bare file name", record.filename),
                ))?;
            }

            let pair = pairs.entry(record.sample_id.clone()).or_insert_with(|| {
                order.push(record.sample_id.clone());
                (None, None)
            });
            let slot = match record.direction {
                Direction::Forward => &mut pair.0,
                Direction::Reverse => &mut pair.1,
            };

            if slot.is_some() {
                Err(Error::manifest(
                    &manifest_path,
                    format!(
                        "sample \"{}\" has more than one {} read file",
                        record.sample_id,
                        record.direction.as_str()
                    ),
                ))?;
            }
            *slot = Some(dir.join(&record.filename));
        }

        let mut rows = Vec::with_capacity(order.len());
        for sample_id in order {
            let (forward, reverse) = pairs.remove(&sample_id).unwrap_or_default();
            let (Some(forward), Some(reverse)) = (forward, reverse) else {
                return Err(Error::manifest(
                    &manifest_path,
                    format!("sample \"{sample_id}\" needs both a forward and a reverse read file"),
                ));
            };
            rows.push(SampleRow {
                sample_id,
                forward,
                reverse,
            });
        }

        let metadata_path = dir.join(METADATA_FILE);
        let metadata = if metadata_path.is_file() {
            DirMetadata::from_file(&metadata_path)?
        } else {
            DirMetadata::default()
        };

        let manifest = Self {
            source: manifest_path,
            rows,
            metadata,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load samples from a tab-separated manifest with one row per sample.
    ///
    /// Environment variables like `$HOME` are expanded in the paths, and relative paths are
    /// resolved against the directory holding the manifest.
    pub fn from_manifest_file(file: impl AsRef<Path>) -> Result<Self> {
        let file = absolute(file)?;
        let base = file.parent().map(Path::to_owned).unwrap_or_default();

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(&file)
            .map_err(|e| Error::Csv {
                file: display(&file),
                source: Box::new(e),
            })?;

        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            let record: FileManifestRecord = result.map_err(|e| Error::Csv {
                file: display(&file),
                source: Box::new(e),
            })?;

            rows.push(SampleRow {
                sample_id: record.sample_id,
                forward: base.join(&*expand_env(&record.forward)),
                reverse: base.join(&*expand_env(&record.reverse)),
            });
        }

        let manifest = Self {
            source: file,
            rows,
            metadata: DirMetadata::default(),
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Build a manifest from rows that are already in memory.
    pub fn from_rows(
        source: impl Into<PathBuf>,
        rows: impl IntoIterator<Item = SampleRow>,
    ) -> Result<Self> {
        let manifest = Self {
            source: source.into(),
            rows: rows.into_iter().collect(),
            metadata: DirMetadata::default(),
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn with_metadata(mut self, metadata: DirMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    pub fn metadata(&self) -> DirMetadata {
        self.metadata
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check that sample ids and paths are unique and that every read file is a usable
    /// gzip file. Read files named like a collection's `MANIFEST` or `metadata.yml` are refused.
    pub fn validate(&self) -> Result<()> {
        let mut ids = FxHashSet::default();
        let mut paths = FxHashSet::default();

        for row in &self.rows {
            if row.sample_id.is_empty() {
                Err(Error::manifest(&self.source, "empty sample id"))?;
            }
            if !ids.insert(row.sample_id.as_str()) {
                Err(Error::manifest(
                    &self.source,
                    format!("duplicate sample id \"{}\"", row.sample_id),
                ))?;
            }

            for path in [&row.forward, &row.reverse] {
                if path
                    .file_name()
                    .is_some_and(|n| n == MANIFEST_FILE || n == METADATA_FILE)
                {
                    Err(Error::manifest(
                        &self.source,
                        format!(
                            "read file \"{}\" clashes with a collection's own files",
                            path.display()
                        ),
                    ))?;
                }
                if !paths.insert(path.as_path()) {
                    Err(Error::manifest(
                        &self.source,
                        format!("\"{}\" is listed more than once", path.display()),
                    ))?;
                }
                check_read_file(path)?;
            }
        }

        Ok(())
    }

    /// Check that no two read files share a base name.
    ///
    /// The trimmed-pairs collection holds both directions, so a name is only allowed once
    /// across every forward and reverse file. That also keeps the unpaired collections free of
    /// collisions.
    pub fn check_distinct_base_names(&self) -> Result<()> {
        let mut seen: FxHashMap<&OsStr, (&str, Direction)> = FxHashMap::default();

        for row in &self.rows {
            for direction in [Direction::Forward, Direction::Reverse] {
                let path = row.path(direction);
                let name = path.file_name().ok_or_else(|| {
                    Error::manifest(
                        &self.source,
                        format!("\"{}\" has no file name", path.display()),
                    )
                })?;

                if let Some((other, other_direction)) = seen.insert(name, (row.sample_id.as_str(), direction))
                {
                    Err(Error::manifest(
                        &self.source,
                        format!(
                            "{} file of sample \"{}\" and {} file of sample \"{}\" share the \
                             file name \"{}\"",
                            other_direction.as_str(),
                            other,
                            direction.as_str(),
                            row.sample_id,
                            name.to_string_lossy()
                        ),
                    ))?;
                }
            }
        }

        Ok(())
    }
}

fn check_read_file(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| Error::file_io(path, e))?;

    if !metadata.is_file() {
        Err(Error::manifest(path, "not a regular file"))?;
    }
    if metadata.len() == 0 {
        Err(Error::manifest(path, "read file is empty"))?;
    }

    let file = File::open(path).map_err(|e| Error::file_io(path, e))?;
    let mut buf = [0u8; 64];
    GzDecoder::new(file)
        .read(&mut buf)
        .map_err(|e| Error::file_io(path, e))?;

    Ok(())
}

fn expand_env(s: &str) -> Cow<'_, str> {
    ENV_VAR.replace_all(s, |caps: &regex::Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        std::env::var(name).unwrap_or_else(|_| caps[0].to_owned())
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};

    use super::*;

    pub(crate) fn write_gz(path: &Path, records: usize) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        for i in 0..records {
            writeln!(enc, "@read{i}\nACGTACGTAC\n+\nIIIIIIIIII").unwrap();
        }
        enc.finish().unwrap();
    }

    pub(crate) fn write_dir_manifest(dir: &Path, samples: &[(&str, &str, &str)]) {
        let mut manifest = String::from("sample-id,filename,direction\n# generated\n");
        for (id, fwd, rev) in samples {
            write_gz(&dir.join(fwd), 2);
            write_gz(&dir.join(rev), 2);
            manifest.push_str(&format!("{id},{fwd},forward\n{id},{rev},reverse\n"));
        }
        std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
    }

    #[test]
    fn loads_directory_manifest_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_dir_manifest(
            tmp.path(),
            &[
                ("sample2", "s2_R1.fastq.gz", "s2_R2.fastq.gz"),
                ("sample1", "s1_R1.fastq.gz", "s1_R2.fastq.gz"),
            ],
        );

        let manifest = SampleManifest::load(tmp.path()).unwrap();
        let ids = manifest
            .rows()
            .iter()
            .map(|r| r.sample_id.as_str())
            .collect::<Vec<_>>();

        assert_eq!(ids, ["sample2", "sample1"]);
        assert_eq!(manifest.rows()[1].forward, tmp.path().join("s1_R1.fastq.gz"));
        assert_eq!(manifest.rows()[1].reverse, tmp.path().join("s1_R2.fastq.gz"));
        assert_eq!(manifest.metadata().phred_offset, 33);
    }

    #[test]
    fn empty_directory_manifest_is_legal() {
        let tmp = tempfile::tempdir().unwrap();
        write_dir_manifest(tmp.path(), &[]);

        let manifest = SampleManifest::load(tmp.path()).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn reads_phred_offset_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        write_dir_manifest(tmp.path(), &[("a", "a_R1.fastq.gz", "a_R2.fastq.gz")]);
        std::fs::write(tmp.path().join(METADATA_FILE), "phred-offset: 64\n").unwrap();

        let manifest = SampleManifest::load(tmp.path()).unwrap();
        assert_eq!(manifest.metadata().phred_offset, 64);
    }

    #[test]
    fn rejects_missing_mate() {
        let tmp = tempfile::tempdir().unwrap();
        write_gz(&tmp.path().join("a_R1.fastq.gz"), 1);
        std::fs::write(
            tmp.path().join(MANIFEST_FILE),
            "sample-id,filename,direction\na,a_R1.fastq.gz,forward\n",
        )
        .unwrap();

        let err = SampleManifest::load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }), "{err}");
    }

    #[test]
    fn rejects_bad_direction() {
        let tmp = tempfile::tempdir().unwrap();
        write_gz(&tmp.path().join("a_R1.fastq.gz"), 1);
        std::fs::write(
            tmp.path().join(MANIFEST_FILE),
            "sample-id,filename,direction\na,a_R1.fastq.gz,sideways\n",
        )
        .unwrap();

        assert!(matches!(
            SampleManifest::load(tmp.path()),
            Err(Error::Csv { .. })
        ));
    }

    #[test]
    fn rejects_missing_and_empty_and_uncompressed_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write_gz(&dir.join("ok_R1.fastq.gz"), 1);
        write_gz(&dir.join("ok_R2.fastq.gz"), 1);
        std::fs::write(dir.join("empty.fastq.gz"), b"").unwrap();
        std::fs::write(dir.join("plain.fastq.gz"), b"@r\nA\n+\nI\n").unwrap();

        let missing = SampleRow::new("m", dir.join("ok_R1.fastq.gz"), dir.join("nope.fastq.gz"));
        assert!(matches!(
            SampleManifest::from_rows(dir, [missing]),
            Err(Error::FileIo { .. })
        ));

        let empty = SampleRow::new("e", dir.join("ok_R1.fastq.gz"), dir.join("empty.fastq.gz"));
        assert!(matches!(
            SampleManifest::from_rows(dir, [empty]),
            Err(Error::Manifest { .. })
        ));

        let plain = SampleRow::new("p", dir.join("ok_R1.fastq.gz"), dir.join("plain.fastq.gz"));
        assert!(matches!(
            SampleManifest::from_rows(dir, [plain]),
            Err(Error::FileIo { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_samples_and_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        for f in ["a_R1.fastq.gz", "a_R2.fastq.gz", "b_R1.fastq.gz", "b_R2.fastq.gz"] {
            write_gz(&dir.join(f), 1);
        }

        let dup_id = [
            SampleRow::new("a", dir.join("a_R1.fastq.gz"), dir.join("a_R2.fastq.gz")),
            SampleRow::new("a", dir.join("b_R1.fastq.gz"), dir.join("b_R2.fastq.gz")),
        ];
        assert!(SampleManifest::from_rows(dir, dup_id).is_err());

        let dup_path = [
            SampleRow::new("a", dir.join("a_R1.fastq.gz"), dir.join("a_R2.fastq.gz")),
            SampleRow::new("b", dir.join("a_R1.fastq.gz"), dir.join("b_R2.fastq.gz")),
        ];
        assert!(SampleManifest::from_rows(dir, dup_path).is_err());
    }

    #[test]
    fn loads_tab_separated_manifest_with_env_vars() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::create_dir(dir.join("reads")).unwrap();
        write_gz(&dir.join("reads/x_R1.fastq.gz"), 1);
        write_gz(&dir.join("reads/x_R2.fastq.gz"), 1);
        std::env::set_var("PAIRTRIM_TEST_READS", dir.join("reads"));

        let tsv = dir.join("manifest.tsv");
        std::fs::write(
            &tsv,
            "sample-id\tforward-absolute-filepath\treverse-absolute-filepath\n\
             x\t${PAIRTRIM_TEST_READS}/x_R1.fastq.gz\treads/x_R2.fastq.gz\n",
        )
        .unwrap();

        let manifest = SampleManifest::load(&tsv).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.rows()[0].forward, dir.join("reads/x_R1.fastq.gz"));
        assert_eq!(manifest.rows()[0].reverse, dir.join("reads/x_R2.fastq.gz"));
    }

    #[test]
    fn detects_shared_base_names() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::create_dir(dir.join("run1")).unwrap();
        std::fs::create_dir(dir.join("run2")).unwrap();
        for run in ["run1", "run2"] {
            write_gz(&dir.join(run).join("s_R1.fastq.gz"), 1);
            write_gz(&dir.join(run).join("s_R2.fastq.gz"), 1);
        }

        let manifest = SampleManifest::from_rows(
            dir,
            [
                SampleRow::new("a", dir.join("run1/s_R1.fastq.gz"), dir.join("run1/s_R2.fastq.gz")),
                SampleRow::new("b", dir.join("run2/s_R1.fastq.gz"), dir.join("run2/s_R2.fastq.gz")),
            ],
        )
        .unwrap();

        assert!(matches!(
            manifest.check_distinct_base_names(),
            Err(Error::Manifest { .. })
        ));
    }

    #[test]
    fn forward_and_reverse_of_one_sample_cannot_share_a_name() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        for d in ["fwd", "rev"] {
            std::fs::create_dir(dir.join(d)).unwrap();
            write_gz(&dir.join(d).join("s.fastq.gz"), 1);
        }

        let manifest = SampleManifest::from_rows(
            dir,
            [SampleRow::new("x", dir.join("fwd/s.fastq.gz"), dir.join("rev/s.fastq.gz"))],
        )
        .unwrap();

        let err = manifest.check_distinct_base_names().unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
        assert!(err.to_string().contains("s.fastq.gz"), "{err}");
    }

    #[test]
    fn forward_name_cannot_reappear_as_another_samples_reverse() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::create_dir(dir.join("run1")).unwrap();
        std::fs::create_dir(dir.join("run2")).unwrap();
        for f in ["run1/x.fastq.gz", "run1/a_R2.fastq.gz", "run2/b_R1.fastq.gz", "run2/x.fastq.gz"] {
            write_gz(&dir.join(f), 1);
        }

        let manifest = SampleManifest::from_rows(
            dir,
            [
                SampleRow::new("a", dir.join("run1/x.fastq.gz"), dir.join("run1/a_R2.fastq.gz")),
                SampleRow::new("b", dir.join("run2/b_R1.fastq.gz"), dir.join("run2/x.fastq.gz")),
            ],
        )
        .unwrap();

        let err = manifest.check_distinct_base_names().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("forward file of sample \"a\""), "{msg}");
        assert!(msg.contains("reverse file of sample \"b\""), "{msg}");
    }

    #[test]
    fn distinct_names_pass() {
        let tmp = tempfile::tempdir().unwrap();
        write_dir_manifest(
            tmp.path(),
            &[
                ("a", "a_R1.fastq.gz", "a_R2.fastq.gz"),
                ("b", "b_R1.fastq.gz", "b_R2.fastq.gz"),
            ],
        );

        let manifest = SampleManifest::load(tmp.path()).unwrap();
        assert!(manifest.check_distinct_base_names().is_ok());
    }

    #[test]
    fn rejects_read_files_named_like_collection_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::create_dir(dir.join("reads")).unwrap();
        for f in ["reads/MANIFEST", "reads/metadata.yml", "reads/ok_R2.fastq.gz"] {
            write_gz(&dir.join(f), 1);
        }

        for name in ["MANIFEST", "metadata.yml"] {
            let row = SampleRow::new("a", dir.join("reads").join(name), dir.join("reads/ok_R2.fastq.gz"));
            let err = SampleManifest::from_rows(dir, [row]).unwrap_err();
            assert!(matches!(err, Error::Manifest { .. }), "{err}");
        }
    }
}
