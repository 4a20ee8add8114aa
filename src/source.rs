// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Gzip-compressed line files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::LoadError;

/// Lazy, finite line iterator over a `.gz` file.
///
/// Lines are split on `\n` and decoded lossily, so invalid UTF-8 reaches
/// the parser as replacement characters instead of failing the file. Read
/// or decompression failures are yielded once as [`LoadError::Source`];
/// iteration stops after that.
pub struct GzipLines {
    path: PathBuf,
    reader: BufReader<MultiGzDecoder<File>>,
    buf: Vec<u8>,
    failed: bool,
}

impl GzipLines {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| LoadError::Source {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            reader: BufReader::new(MultiGzDecoder::new(file)),
            buf: Vec::new(),
            path,
            failed: false,
        })
    }
}

impl Iterator for GzipLines {
    type Item = Result<String, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                let mut line = self.buf.as_slice();
                if let Some(rest) = line.strip_suffix(b"\n") {
                    line = rest.strip_suffix(b"\r").unwrap_or(rest);
                }
                Some(Ok(String::from_utf8_lossy(line).into_owned()))
            }
            Err(source) => {
                self.failed = true;
                Some(Err(LoadError::Source {
                    path: self.path.clone(),
                    source,
                }))
            }
        }
    }
}
