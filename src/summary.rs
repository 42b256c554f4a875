//! Record counts of the trimmed outputs, for an end-of-run report.

use std::fmt;
use std::path::Path;

use colored::*;
use needletail::errors::ParseErrorKind;
use needletail::parse_fastx_file;
use rustc_hash::FxHashMap;

use crate::collection::*;
use crate::errors::*;
use crate::manifest::Direction;
use crate::orchestrator::*;

/// Number of FASTQ records in a (possibly gzipped) file. An empty file has none.
pub fn count_records(path: &Path) -> Result<u64> {
    let mut reader = match parse_fastx_file(path) {
        Ok(reader) => reader,
        Err(e) if matches!(e.kind, ParseErrorKind::EmptyFile) => return Ok(0),
        Err(e) => Err(Error::Summary {
            file: display(path),
            reason: e.to_string(),
        })?,
    };

    let mut count = 0;
    while let Some(record) = reader.next() {
        record.map_err(|e| Error::Summary {
            file: display(path),
            reason: e.to_string(),
        })?;
        count += 1;
    }

    Ok(count)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleCounts {
    pub sample_id: String,
    pub paired: u64,
    pub unpaired_forward: u64,
    pub unpaired_reverse: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub samples: Vec<SampleCounts>,
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    /// Count the records of every file in the finished collections.
    pub fn from_outputs(outputs: &TrimOutputs) -> Result<Self> {
        let mut counts: FxHashMap<&str, SampleCounts> = FxHashMap::default();

        for collection in outputs.collections() {
            for entry in collection.entries() {
                let n = count_records(&entry.path)?;
                let sample = counts
                    .entry(entry.sample_id.as_str())
                    .or_insert_with(|| SampleCounts {
                        sample_id: entry.sample_id.clone(),
                        ..Default::default()
                    });

                match (collection.kind(), entry.direction) {
                    // mates are written in lockstep, so the forward file gives the pair count
                    (CollectionKind::PairedTrimmed, Direction::Forward) => sample.paired = n,
                    (CollectionKind::PairedTrimmed, Direction::Reverse) => (),
                    (CollectionKind::UnpairedForward, _) => sample.unpaired_forward = n,
                    (CollectionKind::UnpairedReverse, _) => sample.unpaired_reverse = n,
                }
            }
        }

        let samples = outputs
            .report
            .trimmed()
            .filter_map(|s| counts.remove(s.sample_id.as_str()))
            .collect();
        let failed = outputs
            .report
            .failed()
            .map(|s| (s.sample_id.clone(), s.status.description.clone()))
            .collect();

        Ok(Self { samples, failed })
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}",
            format!(
                "{:<24} {:>12} {:>14} {:>14}",
                "sample", "pairs", "unpaired fwd", "unpaired rev"
            )
            .bold()
        )?;

        for s in &self.samples {
            writeln!(
                f,
                "{:<24} {:>12} {:>14} {:>14}",
                s.sample_id, s.paired, s.unpaired_forward, s.unpaired_reverse
            )?;
        }

        for (sample_id, reason) in &self.failed {
            writeln!(f, "{:<24} {}", sample_id, format!("failed: {reason}").red())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tests::write_gz;

    #[test]
    fn counts_gzipped_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("r.fastq.gz");
        write_gz(&path, 7);

        assert_eq!(count_records(&path).unwrap(), 7);
    }

    #[test]
    fn empty_file_has_no_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("r.fastq.gz");
        std::fs::write(&path, b"").unwrap();

        assert_eq!(count_records(&path).unwrap(), 0);
    }

    #[test]
    fn garbage_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("r.fastq");
        std::fs::write(&path, b"not a fastq file\n").unwrap();

        assert!(matches!(count_records(&path), Err(Error::Summary { .. })));
    }

    #[test]
    fn display_lists_failures_after_counts() {
        colored::control::set_override(false);
        let summary = RunSummary {
            samples: vec![SampleCounts {
                sample_id: "a".to_owned(),
                paired: 10,
                unpaired_forward: 2,
                unpaired_reverse: 1,
            }],
            failed: vec![("b".to_owned(), "exit status: 1".to_owned())],
        };

        let text = summary.to_string();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("a "));
        assert!(lines[1].ends_with(" 1"));
        assert!(lines[2].contains("failed: exit status: 1"));
    }
}
