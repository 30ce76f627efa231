pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::parser::PlatformMatcher;
use crate::scheduler::Pools;
use crate::services::FileTransport;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub pools: Arc<Pools>,
    pub file_transport: Arc<dyn FileTransport>,
    pub matcher: Arc<PlatformMatcher>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: Arc<Database>,
        pools: Arc<Pools>,
        file_transport: Arc<dyn FileTransport>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            db,
            pools,
            file_transport,
            matcher: Arc::new(PlatformMatcher::new()?),
        })
    }
}
