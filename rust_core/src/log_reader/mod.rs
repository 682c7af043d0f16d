//! Log transport readers
//!
//! This module provides:
//! - `LogReader`: offset tracking, rotation detection, checkpoints, polling
//! - `LogSource` implementations: local file, FTP and HTTP range polling
//! - `ReaderConfig` / `ReaderMode`: validated reader settings

pub mod checkpoint;
pub mod config;
pub mod ftp;
pub mod http;
pub mod reader;
pub mod source;

pub use checkpoint::ReaderCheckpoint;
pub use config::{FtpSettings, HttpSettings, ReaderConfig, ReaderMode};
pub use reader::LogReader;
pub use source::{LocalFileSource, LogSource};
