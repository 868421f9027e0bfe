//! Acquired-data series and report output.

pub mod series;
pub mod writer;

pub use series::Series;
pub use writer::SeriesWriter;
