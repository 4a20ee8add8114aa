// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Device type → shard lookup.
//!
//! The table is built once from configuration and never mutated, so it is
//! shared between workers behind an `Arc` without locking.
//!
//! # Example
//!
//! ```
//! use apps_loader::ShardRouter;
//!
//! let router = ShardRouter::from_addresses([("idfa", "127.0.0.1:33013"), ("gaid", "127.0.0.1:33014")]);
//!
//! let shard = router.route("gaid").unwrap();
//! assert_eq!(shard.address, "127.0.0.1:33014");
//!
//! // Unknown device types are reported, never a panic
//! assert!(router.route("imei").is_none());
//! ```

use std::collections::HashMap;

/// One cache endpoint, addressed by its position in the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    /// Position in [`ShardRouter::shards`], also the outbound queue index
    pub index: usize,
    /// Device type served by this shard
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Default)]
pub struct ShardRouter {
    shards: Vec<Shard>,
    by_type: HashMap<String, usize>,
}

impl ShardRouter {
    /// Build the table. A repeated device type keeps its last address.
    pub fn from_addresses<I, K, V>(addresses: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut router = Self::default();
        for (dev_type, address) in addresses {
            let name = dev_type.into();
            let address = address.into();
            match router.by_type.get(&name) {
                Some(&idx) => router.shards[idx].address = address,
                None => {
                    let index = router.shards.len();
                    router.by_type.insert(name.clone(), index);
                    router.shards.push(Shard { index, name, address });
                }
            }
        }
        router
    }

    /// Shard serving `dev_type`, or `None` for an unknown type.
    #[inline]
    #[must_use]
    pub fn route(&self, dev_type: &str) -> Option<&Shard> {
        self.by_type.get(dev_type).map(|&idx| &self.shards[idx])
    }

    #[must_use]
    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_shards;

    #[test]
    fn test_default_shards_route() {
        let router = ShardRouter::from_addresses(default_shards());
        assert_eq!(router.len(), 4);
        for dev_type in ["idfa", "gaid", "adid", "dvid"] {
            let shard = router.route(dev_type).unwrap();
            assert_eq!(shard.name, dev_type);
            assert_eq!(router.shards()[shard.index], *shard);
        }
    }

    #[test]
    fn test_unknown_type_is_none() {
        let router = ShardRouter::from_addresses(default_shards());
        assert!(router.route("imei").is_none());
        assert!(router.route("").is_none());
        assert!(router.route("IDFA").is_none());
    }

    #[test]
    fn test_indices_are_dense() {
        let router = ShardRouter::from_addresses([("a", "1"), ("b", "2"), ("c", "3")]);
        let indices: Vec<usize> = router.shards().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_duplicate_type_keeps_last_address() {
        let router = ShardRouter::from_addresses([("idfa", "old"), ("idfa", "new")]);
        assert_eq!(router.len(), 1);
        assert_eq!(router.route("idfa").unwrap().address, "new");
    }

    #[test]
    fn test_empty_router() {
        let router = ShardRouter::default();
        assert!(router.is_empty());
        assert!(router.route("idfa").is_none());
    }
}
