pub mod export;
pub mod series;
pub mod types;

pub use export::{csv_file_name, write_json, write_series_csv};
pub use series::{ResultSeries, SeriesMap};
pub use types::Aggregate;
