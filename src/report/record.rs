//! Candidate records and the column mapping used to extract them

use serde::{Deserialize, Serialize};

/// One report row: an observed checksum and where/when it was seen
///
/// The checksum is kept exactly as it appeared in the report; it is only
/// normalized for the membership test, never for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub checksum: String,
    pub source_label: String,
    pub observed_at: String,
}

impl CandidateRecord {
    pub fn new(checksum: &str, source_label: &str, observed_at: &str) -> Self {
        Self {
            checksum: checksum.to_string(),
            source_label: source_label.to_string(),
            observed_at: observed_at.to_string(),
        }
    }
}

/// Names of the three columns a record source must provide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub checksum: String,
    pub source_label: String,
    pub observed_at: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::new("MD5 Hash", "Log Source", "Horario")
    }
}

impl ColumnMapping {
    pub fn new(checksum: &str, source_label: &str, observed_at: &str) -> Self {
        Self {
            checksum: checksum.to_string(),
            source_label: source_label.to_string(),
            observed_at: observed_at.to_string(),
        }
    }

    /// Required columns in record field order
    pub fn required(&self) -> [&str; 3] {
        [&self.checksum, &self.source_label, &self.observed_at]
    }

    /// Resolve each required column to its position in `columns`.
    ///
    /// Returns the names of all missing columns on failure, so a schema
    /// problem is reported in one go.
    pub fn resolve(&self, columns: &[String]) -> Result<ColumnPositions, Vec<String>> {
        let find = |name: &str| columns.iter().position(|c| c.trim() == name);

        let mut missing = Vec::new();
        let mut positions = [0usize; 3];
        for (slot, name) in self.required().iter().enumerate() {
            match find(name) {
                Some(pos) => positions[slot] = pos,
                None => missing.push(name.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(ColumnPositions {
                checksum: positions[0],
                source_label: positions[1],
                observed_at: positions[2],
            })
        } else {
            Err(missing)
        }
    }
}

/// Resolved column indices within a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPositions {
    pub checksum: usize,
    pub source_label: usize,
    pub observed_at: usize,
}

impl ColumnPositions {
    /// Pull the three fields out of a row. `None` if the row is too short.
    pub fn extract(&self, row: &[String]) -> Option<CandidateRecord> {
        Some(CandidateRecord {
            checksum: row.get(self.checksum)?.clone(),
            source_label: row.get(self.source_label)?.clone(),
            observed_at: row.get(self.observed_at)?.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_any_order() {
        let mapping = ColumnMapping::default();
        let positions = mapping
            .resolve(&cols(&["Horario", "Extra", "MD5 Hash", "Log Source"]))
            .unwrap();
        assert_eq!(positions.checksum, 2);
        assert_eq!(positions.source_label, 3);
        assert_eq!(positions.observed_at, 0);
    }

    #[test]
    fn test_resolve_reports_all_missing() {
        let mapping = ColumnMapping::default();
        let missing = mapping.resolve(&cols(&["MD5 Hash"])).unwrap_err();
        assert_eq!(missing, vec!["Log Source".to_string(), "Horario".to_string()]);
    }

    #[test]
    fn test_resolve_tolerates_padded_headers() {
        let mapping = ColumnMapping::new("hash", "source", "time");
        assert!(mapping.resolve(&cols(&[" hash", "source ", "time"])).is_ok());
    }

    #[test]
    fn test_extract_short_row() {
        let positions = ColumnPositions {
            checksum: 0,
            source_label: 1,
            observed_at: 4,
        };
        assert!(positions.extract(&cols(&["a", "b", "c"])).is_none());
        let record = positions.extract(&cols(&["a", "b", "c", "d", "e"])).unwrap();
        assert_eq!(record, CandidateRecord::new("a", "b", "e"));
    }
}
