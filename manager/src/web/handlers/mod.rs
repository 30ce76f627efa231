//! HTTP request handlers for the admin API.
//!
//! - `common` - response envelope, query structs and error mapping
//! - `jobs` - install job scheduling and history
//! - `status` - health, pools, option toggles, system log and repository listing

pub mod common;
pub mod jobs;
pub mod status;

pub use common::{ApiResponse, ApiResult};
pub use jobs::*;
pub use status::*;
