pub mod config;
pub mod constants;
pub mod database;
pub mod device;
pub mod errors;
pub mod executor;
pub mod handlers;
pub mod parser;
pub mod scheduler;
pub mod services;
pub mod transport;
pub mod web;
pub mod work_units;

// Re-export commonly used types
pub use config::{Config, ConfigManager, ConfigStore, SecretsLoader};
pub use database::Database;
pub use errors::{DeviceError, ManagerError};
pub use executor::{WorkUnit, WorkerPool};
pub use scheduler::{Dispatcher, Housekeeper, Pools};
pub use services::{Notifier, WebhookEmailSender};
pub use work_units::UnitContext;
