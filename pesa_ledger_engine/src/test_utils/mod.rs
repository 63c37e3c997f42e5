//! Utilities for setting up throwaway databases in integration tests.
pub mod prepare_env;
#[cfg(feature = "sqlite")]
pub mod seed;
