//! Result export.

pub mod export;

pub use export::{
    equity_dataframe, export_walk_forward, trades_dataframe, windows_dataframe, write_csv,
    write_json, ExportError, ExportPaths,
};
