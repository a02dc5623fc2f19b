//! Testing utilities and mock implementations
//!
//! Mocks for exercising the lifecycle manager without a running broker.

pub mod mocks;

pub use mocks::*;
