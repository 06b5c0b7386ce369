//! Logging and shared test fixtures.

pub mod log;
pub mod test_utils;
