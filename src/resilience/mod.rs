//! Resilience helpers for cache writes.

pub mod retry;
