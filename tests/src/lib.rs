//! Shared helpers for the analytics engine integration tests.

pub mod containers;
pub mod mocks;
pub mod setup;
