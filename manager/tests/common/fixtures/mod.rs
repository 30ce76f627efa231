//! This module provides reusable test utilities:
//! - A scripted fake router and dialer
//! - A mock mail relay webhook
//! - In-memory job stores with seeded hosts
//! - Common test data

// Allow unused code in test fixtures - every test binary uses a different subset
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fake_device;
pub mod mock_webhook;
pub mod test_data;
pub mod test_database;

// Re-export commonly used items
pub use fake_device::{FakeDialer, FakeRouter, Mode};
pub use mock_webhook::MockMailRelay;
pub use test_data::*;
pub use test_database::TestDatabase;
