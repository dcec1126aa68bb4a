//! Common test utilities and helpers
#![allow(dead_code)]

pub mod mock_registry;
pub mod test_helpers;

pub use mock_registry::{MockPackageData, MockRegistry};
pub use test_helpers::*;
