//! Dispatching and periodic maintenance.
//!
//! - `dispatcher` - the install, inventory and email loops feeding the pools
//! - `housekeeping` - daily retention pruning on a 6-field cron schedule
//!   (sec min hour day month dow)

pub mod dispatcher;
pub mod housekeeping;

pub use dispatcher::{Dispatcher, TickReport};
pub use housekeeping::{Housekeeper, HousekeepingScheduler};

use serde::Serialize;

use crate::constants::pools::EMAIL_WORKERS;
use crate::database::SystemOption;
use crate::executor::{PoolStatus, WorkerPool};

/// The three executor pools
pub struct Pools {
    pub install: WorkerPool,
    pub inventory: WorkerPool,
    pub email: WorkerPool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolsStatus {
    pub install: PoolStatus,
    pub inventory: PoolStatus,
    pub email: PoolStatus,
}

impl Pools {
    /// Sizes come from the options row; the pools clamp them
    pub fn from_options(options: &SystemOption) -> Self {
        Self {
            install: WorkerPool::new("install", options.install_threads.max(0) as usize),
            inventory: WorkerPool::new("inventory", options.inventory_threads.max(0) as usize),
            email: WorkerPool::new("email", EMAIL_WORKERS),
        }
    }

    pub async fn status(&self) -> PoolsStatus {
        PoolsStatus {
            install: self.install.status().await,
            inventory: self.inventory.status().await,
            email: self.email.status().await,
        }
    }

    pub async fn wait_idle(&self) {
        self.install.wait_idle().await;
        self.inventory.wait_idle().await;
        self.email.wait_idle().await;
    }

    pub async fn shutdown(&self) {
        self.install.shutdown().await;
        self.inventory.shutdown().await;
        self.email.shutdown().await;
    }
}
