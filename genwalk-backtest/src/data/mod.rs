pub mod loader;
pub mod types;

pub use loader::{DataManager, DataSource, LoaderError, EXPECTED_COLUMNS};
pub use types::{Bar, PriceSeries};
