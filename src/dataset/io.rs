//! CSV reading and writing for earthquake datasets
//!
//! Datasets are plain comma-separated files with a header row. Reading keeps
//! every cell as text; interpreting columns is left to `ml::preprocessing`.

use crate::error::{AppError, Result};
use crate::models::{LabeledObservation, FEATURE_NAMES, LABEL_COLUMN};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

/// Raw tabular data as read from a CSV file
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Column names exactly as they appear in the header
    pub columns: Vec<String>,

    /// Cell values, one vector per row
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Parse CSV text. Blank lines are skipped; every row must have as many
    /// cells as the header.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| AppError::Data("dataset is empty (no header row)".to_string()))?;
        let columns = split_record(header);

        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let cells = split_record(line);
            if cells.len() != columns.len() {
                return Err(AppError::Data(format!(
                    "line {}: expected {} fields, found {}",
                    line_no + 1,
                    columns.len(),
                    cells.len()
                )));
            }
            rows.push(cells);
        }

        Ok(Self { columns, rows })
    }

    /// Index of a column by exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Split one record on commas outside double quotes; `""` inside quotes is a literal quote
fn split_record(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

/// Read a CSV dataset from disk
pub fn read_table(path: &Path) -> Result<RawTable> {
    if !path.exists() {
        return Err(AppError::Data(format!(
            "dataset not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::InvalidData => {
            AppError::Data(format!("{} is not valid UTF-8 text", path.display()))
        }
        _ => AppError::from(e),
    })?;
    RawTable::parse(&content)
}

/// Render labeled observations as CSV text with a header row
pub fn to_csv_string(rows: &[LabeledObservation]) -> String {
    let mut csv_content = String::new();
    csv_content.push_str(&FEATURE_NAMES.join(","));
    csv_content.push(',');
    csv_content.push_str(LABEL_COLUMN);
    csv_content.push('\n');

    for row in rows {
        let obs = &row.observation;
        csv_content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            obs.magnitude,
            obs.depth,
            obs.cdi,
            obs.mmi,
            obs.sig,
            row.alert.as_str()
        ));
    }

    csv_content
}

/// Write labeled observations to a CSV file, creating parent directories
pub fn write_dataset(path: &Path, rows: &[LabeledObservation]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(to_csv_string(rows).as_bytes())?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetGenerator;
    use crate::models::{AlertLevel, Observation};

    #[test]
    fn test_parse_table() {
        let table = RawTable::parse("a,b, c\n1,2,3\n\n4,5,6\n").unwrap();
        assert_eq!(table.columns, vec!["a", "b", " c"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["4", "5", "6"]);
        assert_eq!(table.column_index("b"), Some(1));
        assert_eq!(table.column_index("c"), None);
    }

    #[test]
    fn test_parse_handles_crlf_and_quotes() {
        let table = RawTable::parse("\"magnitude\",\"alert\"\r\n5.1,\"green\"\r\n").unwrap();
        assert_eq!(table.columns, vec!["magnitude", "alert"]);
        assert_eq!(table.rows[0], vec!["5.1", "green"]);
    }

    #[test]
    fn test_quoted_cells_keep_commas() {
        let table =
            RawTable::parse("place,alert\n\"Tokyo, Japan\",red\n\"say \"\"hi\"\"\",green\n").unwrap();
        assert_eq!(table.rows[0], vec!["Tokyo, Japan", "red"]);
        assert_eq!(table.rows[1], vec!["say \"hi\"", "green"]);
    }

    #[test]
    fn test_read_non_utf8_file_is_a_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary.csv");
        std::fs::write(&path, [0x6d, 0x61, 0xff, 0xfe, 0x0a]).unwrap();

        let err = read_table(&path).unwrap_err();
        assert!(matches!(err, AppError::Data(_)));
        assert_eq!(err.error_code(), "DATA_ERROR");
    }

    #[test]
    fn test_parse_rejects_ragged_rows() {
        let err = RawTable::parse("a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, AppError::Data(_)));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_parse_rejects_empty_input() {
        assert!(matches!(RawTable::parse("\n\n"), Err(AppError::Data(_))));
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_table(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, AppError::Data(_)));
    }

    #[test]
    fn test_csv_rendering() {
        let rows = vec![LabeledObservation {
            observation: Observation::new(6.5, 50.0, 5.0, 5.0, 100.5),
            alert: AlertLevel::Orange,
        }];
        let csv = to_csv_string(&rows);
        assert_eq!(csv, "magnitude,depth,cdi,mmi,sig,alert\n6.5,50,5,5,100.5,orange\n");
    }

    #[test]
    fn test_written_dataset_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quakes.csv");
        let rows = DatasetGenerator::new(200, 42).generate();

        write_dataset(&path, &rows).unwrap();
        let table = read_table(&path).unwrap();

        assert_eq!(table.len(), 200);
        assert_eq!(table.columns, vec!["magnitude", "depth", "cdi", "mmi", "sig", "alert"]);
        for (row, cells) in rows.iter().zip(&table.rows) {
            let values: Vec<f64> = cells[..5].iter().map(|c| c.parse().unwrap()).collect();
            assert_eq!(values, row.observation.to_features().to_vec());
            assert_eq!(cells[5], row.alert.as_str());
        }
    }
}
