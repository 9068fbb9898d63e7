//! Shared helpers for integration tests.

pub mod transfer_utils;
