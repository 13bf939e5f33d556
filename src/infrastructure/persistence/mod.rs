//! Run report persistence

pub mod report_writer;

pub use report_writer::{model_slug, FsReportWriter};
