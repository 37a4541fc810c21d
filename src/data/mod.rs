//! Data loading and declared-schema checks

pub mod loader;
pub mod schema;

pub use loader::{load, save_csv, save_parquet};
pub use schema::{clean_column_names, TableSchema};
