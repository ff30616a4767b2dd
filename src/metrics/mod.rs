//! Training metrics and logging.

pub mod logger;

pub use logger::{ConsoleLogger, CsvLogger, EpochSnapshot, MetricsLogger, MultiLogger};
