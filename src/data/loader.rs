//! File loading and artifact writing

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Load a data file, dispatching on the extension.
///
/// Parquet is the primary format; csv and json are accepted for convenience.
pub fn load(path: &Path) -> Result<DataFrame> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "csv" => load_csv(path),
        "json" | "jsonl" => load_json(path),
        _ => Err(PipelineError::Config(format!(
            "unsupported data file extension: {}",
            path.display()
        ))),
    }
}

/// Load a parquet file
pub fn load_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

/// Load a CSV file with header and schema inference
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Load a line-delimited JSON file
pub fn load_json(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(JsonReader::new(file).finish()?)
}

/// Write a DataFrame to CSV
pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).finish(df)?;
    Ok(())
}

/// Write a DataFrame to parquet
pub fn save_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    ParquetWriter::new(file).finish(df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "a,b").unwrap();
        writeln!(file, "1,x").unwrap();
        writeln!(file, "2,y").unwrap();

        let df = load(&path).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 2);
    }

    #[test]
    fn test_parquet_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.parquet");

        let mut df = DataFrame::new(vec![
            Column::new("a".into(), &[1i64, 2, 3]),
            Column::new("b".into(), &["x", "y", "z"]),
        ])
        .unwrap();

        save_parquet(&mut df, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.height(), 3);
        assert_eq!(loaded.width(), 2);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load(Path::new("data.xlsx")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load(Path::new("does_not_exist.parquet")).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
