//! Test harnesses for API Hub build-result ingestion.
//!
//! Provides `BuildFixture` for assembling build results, build configs and
//! catalog snapshots on disk for end-to-end tests of the CLI.

#[cfg(test)]
pub mod cli;
pub mod fixture;

pub use fixture::{BuildFixture, FixtureFiles, TestError};
