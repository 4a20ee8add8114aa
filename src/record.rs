// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Installed-apps record: line parsing and the binary cache payload.
//!
//! A raw log line carries five tab-separated fields:
//!
//! ```text
//! dev_type \t dev_id \t lat \t lon \t app,app,app...
//! ```
//!
//! The device type and id form the cache key (`type:id`). Only the apps and
//! coordinates go into the payload, which uses the protobuf wire layout of
//!
//! ```text
//! message UserApps {
//!     repeated uint32 apps = 1 [packed=true];
//!     optional double lat = 2;
//!     optional double lon = 3;
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use apps_loader::record::{AppsRecord, UserApps};
//!
//! let record = AppsRecord::parse("idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567").unwrap();
//! assert_eq!(record.key(), "idfa:1rfw452y52g2gq4g");
//!
//! let bytes = record.apps.encode().unwrap();
//! let decoded = UserApps::decode(&bytes).unwrap();
//! assert_eq!(decoded, record.apps);
//! ```

use prost::Message;
use thiserror::Error;
use tracing::debug;

const FIELD_COUNT: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Line does not have the expected shape; the record is dropped.
    #[error("malformed line: {0}")]
    Format(String),
    #[error("payload encoding failed: {0}")]
    Encoding(String),
    #[error("payload decoding failed: {0}")]
    Decode(String),
}

/// Payload stored in the cache for one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserApps {
    pub apps: Vec<u32>,
    pub lat: f64,
    pub lon: f64,
}

/// A parsed log line: routing/key fields plus the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AppsRecord {
    pub dev_type: String,
    pub dev_id: String,
    pub apps: UserApps,
}

impl AppsRecord {
    /// Parse one tab-separated line.
    ///
    /// Only the line shape is fatal. Bad app ids are skipped and bad
    /// coordinates default to `0.0`.
    pub fn parse(line: &str) -> Result<Self, CodecError> {
        let fields: Vec<&str> = line.trim().split('\t').collect();
        if fields.len() != FIELD_COUNT {
            return Err(CodecError::Format(format!(
                "expected {} fields, got {}",
                FIELD_COUNT,
                fields.len()
            )));
        }

        let (dev_type, dev_id) = (fields[0], fields[1]);
        if dev_type.is_empty() || dev_id.is_empty() {
            return Err(CodecError::Format("empty device type or id".to_string()));
        }

        let mut apps = Vec::new();
        for raw in fields[4].split(',') {
            match raw.parse::<i32>() {
                Ok(app) => apps.push(app as u32),
                Err(_) => {
                    debug!(app = raw, dev_id, "Skipping non-numeric app id");
                    crate::metrics::record_field_error("app");
                }
            }
        }

        Ok(Self {
            dev_type: dev_type.to_string(),
            dev_id: dev_id.to_string(),
            apps: UserApps {
                apps,
                lat: parse_coord(fields[2], dev_id),
                lon: parse_coord(fields[3], dev_id),
            },
        })
    }

    /// Cache key, `type:id`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.dev_type, self.dev_id)
    }
}

fn parse_coord(raw: &str, dev_id: &str) -> f64 {
    raw.parse::<f64>().unwrap_or_else(|_| {
        debug!(coord = raw, dev_id, "Invalid geo coordinate, using 0.0");
        crate::metrics::record_field_error("coord");
        0.0
    })
}

/// Wire form of [`UserApps`].
#[derive(Clone, PartialEq, Message)]
struct UserAppsMessage {
    #[prost(uint32, repeated, packed = "true", tag = "1")]
    apps: Vec<u32>,
    #[prost(double, optional, tag = "2")]
    lat: Option<f64>,
    #[prost(double, optional, tag = "3")]
    lon: Option<f64>,
}

impl UserApps {
    /// Serialize to the protobuf wire layout.
    ///
    /// Coordinates are always written, `apps` only when non-empty.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let message = UserAppsMessage {
            apps: self.apps.clone(),
            lat: Some(self.lat),
            lon: Some(self.lon),
        };
        let mut buf = Vec::with_capacity(message.encoded_len());
        message
            .encode(&mut buf)
            .map_err(|e| CodecError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Inverse of [`encode`](Self::encode).
    ///
    /// Accepts both packed and unpacked `apps` and skips unknown fields.
    /// Missing coordinates decode as `0.0`.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let message =
            UserAppsMessage::decode(buf).map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(Self {
            apps: message.apps,
            lat: message.lat.unwrap_or_default(),
            lon: message.lon.unwrap_or_default(),
        })
    }
}
