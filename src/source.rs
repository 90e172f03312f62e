// 📥 Record Source - Where incoming student rows come from
// The CSV extract is read whole, fingerprinted, then parsed row by row

use crate::student::RawStudentRecord;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Columns every extract must carry, in upstream order
pub const EXPECTED_COLUMNS: [&str; 13] = [
    "student_code",
    "first_name",
    "middle_name",
    "surname",
    "gender",
    "date_of_birth",
    "LBOTE",
    "ATSI",
    "disability_status",
    "EMA",
    "ESL",
    "home_group",
    "year_level",
];

// ============================================================================
// SOURCE TRAIT
// ============================================================================

pub trait RecordSource {
    /// All rows of the batch, in input order
    ///
    /// Fails only when the input as a whole cannot be read; individual bad
    /// values are left for the validator.
    fn read_records(&self) -> Result<Vec<RawStudentRecord>>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;

    /// Content fingerprint recorded with the run, when one is available
    fn digest(&self) -> Option<String> {
        None
    }
}

impl RecordSource for Vec<RawStudentRecord> {
    fn read_records(&self) -> Result<Vec<RawStudentRecord>> {
        Ok(self.clone())
    }

    fn describe(&self) -> String {
        format!("{} in-memory records", self.len())
    }
}

// ============================================================================
// CSV SOURCE
// ============================================================================

pub struct CsvRecordSource {
    origin: String,
    content: Vec<u8>,
    digest: String,
}

impl CsvRecordSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read(path)
            .with_context(|| format!("Failed to read student extract: {}", path.display()))?;
        Ok(Self::from_bytes(path.display().to_string(), content))
    }

    pub fn from_bytes(origin: impl Into<String>, content: Vec<u8>) -> Self {
        let digest = format!("{:x}", Sha256::digest(&content));
        CsvRecordSource {
            origin: origin.into(),
            content,
            digest,
        }
    }
}

impl RecordSource for CsvRecordSource {
    fn read_records(&self) -> Result<Vec<RawStudentRecord>> {
        use csv::{ReaderBuilder, Trim};

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::Headers)
            .from_reader(self.content.as_slice());

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header in {}", self.origin))?
            .clone();

        let missing: Vec<&str> = EXPECTED_COLUMNS
            .iter()
            .copied()
            .filter(|column| !headers.iter().any(|h| h == *column))
            .collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "{} is missing required columns: {}",
                self.origin,
                missing.join(", ")
            );
        }

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result.with_context(|| format!("Failed to parse CSV in {}", self.origin))?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);

            let mut record: RawStudentRecord = row.deserialize(Some(&headers)).with_context(|| {
                format!("Failed to parse CSV line {} in {}", line, self.origin)
            })?;
            record.line_number = line;

            records.push(record);
        }

        Ok(records)
    }

    fn describe(&self) -> String {
        self.origin.clone()
    }

    fn digest(&self) -> Option<String> {
        Some(self.digest.clone())
    }
}
