//! CSV report source and report discovery
//!
//! Reports are generated periodically, one directory per run, with the CSV
//! export in a fixed sub-directory:
//!
//! ```text
//! <base_path>/
//!   2024-05-01_0800/CSV/report.csv
//!   2024-05-01_0900/CSV/report.csv   <- newest directory wins
//! ```

use crate::core::config::ReportsConfig;
use crate::core::error::{MatchError, Result};
use crate::report::stream::{RecordSource, RowIter};
use csv::{ByteRecord, Reader, ReaderBuilder};
use log::debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// A CSV file whose first row names the columns
#[derive(Debug)]
pub struct CsvRecordSource {
    path: PathBuf,
    columns: Vec<String>,
    reader: Reader<File>,
    row_count: Option<u64>,
}

impl CsvRecordSource {
    /// Open `path` and count its data rows so progress can be reported as a
    /// percentage.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut source = Self::open_uncounted(path)?;
        source.row_count = Some(count_rows(&source.path)?);
        Ok(source)
    }

    /// Open `path` without the counting pass
    pub fn open_uncounted<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = csv_reader(&path)?;

        let columns = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect::<Vec<_>>();
        debug!("Available columns in {}: {:?}", path.display(), columns);

        Ok(Self {
            path,
            columns,
            reader,
            row_count: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for CsvRecordSource {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn row_count_hint(&self) -> Option<u64> {
        self.row_count
    }

    fn into_rows(self: Box<Self>) -> RowIter {
        Box::new(self.reader.into_records().map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(MatchError::from)
        }))
    }
}

fn csv_reader(path: &Path) -> Result<Reader<File>> {
    ReaderBuilder::new()
        .has_headers(true)
        // Short rows are reported by the stream with a row number.
        .flexible(true)
        .from_path(path)
        .map_err(|e| MatchError::Report(format!("Failed to open {}: {}", path.display(), e)))
}

fn count_rows(path: &Path) -> Result<u64> {
    let mut reader = csv_reader(path)?;
    let mut record = ByteRecord::new();
    let mut rows = 0;
    while reader.read_byte_record(&mut record)? {
        rows += 1;
    }
    Ok(rows)
}

/// Most recently modified directory directly under `base_path`
pub fn find_latest_report_folder(base_path: &Path) -> Result<PathBuf> {
    let mut latest: Option<(SystemTime, PathBuf)> = None;

    for entry in WalkDir::new(base_path).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            MatchError::Report(format!(
                "Failed to list report folders in {}: {}",
                base_path.display(),
                e
            ))
        })?;

        if !entry.file_type().is_dir() {
            continue;
        }

        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let newer = latest
            .as_ref()
            .map(|(best, _)| modified > *best)
            .unwrap_or(true);
        if newer {
            latest = Some((modified, entry.into_path()));
        }
    }

    latest.map(|(_, path)| path).ok_or_else(|| {
        MatchError::Report(format!(
            "No report folders found in base path: {}",
            base_path.display()
        ))
    })
}

/// First `*.csv` file (by name) in `folder`
pub fn find_report_csv(folder: &Path) -> Result<PathBuf> {
    if !folder.is_dir() {
        return Err(MatchError::Report(format!(
            "Report CSV folder does not exist: {}",
            folder.display()
        )));
    }

    WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            MatchError::Report(format!("No CSV files found in folder: {}", folder.display()))
        })
}

/// Resolve the CSV file to process: the configured override if set,
/// otherwise the first CSV of the newest report.
pub fn locate_report(config: &ReportsConfig) -> Result<PathBuf> {
    if let Some(ref file) = config.report_file {
        return Ok(file.clone());
    }

    let latest = find_latest_report_folder(&config.base_path)?;
    debug!("Latest report folder: {}", latest.display());
    find_report_csv(&latest.join(&config.csv_subdir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ColumnMapping, RecordStream};
    use std::fs;
    use std::time::Duration;

    const HEADER: &str = "Horario,MD5 Hash,Log Source,Bytes\n";

    #[test]
    fn test_csv_source_columns_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        fs::write(&path, format!("{HEADER}10,AAAA,fw,1\n11,bbbb,proxy,2\n")).unwrap();

        let source = CsvRecordSource::open(&path).unwrap();
        assert_eq!(source.columns(), &["Horario", "MD5 Hash", "Log Source", "Bytes"]);
        assert_eq!(source.row_count_hint(), Some(2));

        let records: Vec<_> = RecordStream::from_source(source, &ColumnMapping::default())
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].checksum, "AAAA");
        assert_eq!(records[0].source_label, "fw");
        assert_eq!(records[1].observed_at, "11");
    }

    #[test]
    fn test_csv_quoted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        fs::write(
            &path,
            "MD5 Hash,Log Source,Horario\nabc,\"Firewall, DMZ\",\"2024-05-01 08:00\"\n",
        )
        .unwrap();

        let record = RecordStream::from_source(
            CsvRecordSource::open(&path).unwrap(),
            &ColumnMapping::default(),
        )
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
        assert_eq!(record.source_label, "Firewall, DMZ");
        assert_eq!(record.observed_at, "2024-05-01 08:00");
    }

    #[test]
    fn test_csv_missing_column_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        fs::write(&path, "MD5 Hash,Horario\nabc,10\n").unwrap();

        let err = RecordStream::from_source(
            CsvRecordSource::open(&path).unwrap(),
            &ColumnMapping::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MatchError::Schema { .. }));
    }

    #[test]
    fn test_csv_bom_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        fs::write(&path, "\u{feff}MD5 Hash,Log Source,Horario\nabc,fw,10\n").unwrap();

        let source = CsvRecordSource::open_uncounted(&path).unwrap();
        assert_eq!(source.columns()[0], "MD5 Hash");
        assert_eq!(source.row_count_hint(), None);
    }

    #[test]
    fn test_open_missing_file() {
        let err = CsvRecordSource::open("/nonexistent/report.csv").unwrap_err();
        assert!(matches!(err, MatchError::Report(_)));
    }

    #[test]
    fn test_find_latest_report_folder() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("2024-05-01_0800");
        let newer = dir.path().join("2024-05-01_0900");
        fs::create_dir(&older).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        fs::create_dir(&newer).unwrap();
        fs::write(dir.path().join("stray.txt"), "x").unwrap();

        assert_eq!(find_latest_report_folder(dir.path()).unwrap(), newer);
    }

    #[test]
    fn test_find_latest_report_folder_empty() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_latest_report_folder(dir.path()).unwrap_err();
        assert!(matches!(err, MatchError::Report(_)));
    }

    #[test]
    fn test_locate_report() {
        let dir = tempfile::tempdir().unwrap();
        let csv_dir = dir.path().join("run1").join("CSV");
        fs::create_dir_all(&csv_dir).unwrap();
        fs::write(csv_dir.join("b.csv"), HEADER).unwrap();
        fs::write(csv_dir.join("a.CSV"), HEADER).unwrap();
        fs::write(csv_dir.join("0.txt"), "x").unwrap();

        let config = ReportsConfig {
            base_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(locate_report(&config).unwrap(), csv_dir.join("a.CSV"));
    }

    #[test]
    fn test_locate_report_override() {
        let config = ReportsConfig {
            report_file: Some(PathBuf::from("/tmp/explicit.csv")),
            ..Default::default()
        };
        assert_eq!(
            locate_report(&config).unwrap(),
            PathBuf::from("/tmp/explicit.csv")
        );
    }

    #[test]
    fn test_locate_report_without_csv() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("run1").join("CSV")).unwrap();
        let config = ReportsConfig {
            base_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(locate_report(&config), Err(MatchError::Report(_))));
    }
}
