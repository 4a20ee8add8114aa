// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Errors that stop a file or a run.
//!
//! Record-level failures (bad lines, unknown device types, exhausted write
//! retries) never surface here; they are counted in [`FileStats`](crate::FileStats).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::traits::StorageError;

pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Error, Debug)]
pub enum LoadError {
    /// Input file could not be opened or decompressed.
    #[error("cannot read {}: {source}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Cache client could not be created.
    #[error("cache setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("cannot mark {} as loaded: {source}", .path.display())]
    Rename {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A pipeline task panicked or was cancelled.
    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
