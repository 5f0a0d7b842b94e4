//! packrat - upload ingestion and compaction engine
//!
//! Accepts single files and whole folder trees into an uploads root, guards
//! in-flight folder uploads with marker files, and compacts finished folders
//! into zip archives.

pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod web;

pub use config::Config;
pub use error::{PackratError, Result};
pub use storage::{
    CompactOutcome, CompactionReport, FolderOutcome, FolderStatus, InventoryListing, UploadBatch,
    UploadEntry, UploadMode, UploadResult, UploadStore,
};
pub use web::WebServer;
