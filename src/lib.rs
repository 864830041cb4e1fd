// src/lib.rs
// Library surface shared by the daemon, the test-notification tool and integration tests.

pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod retention;
pub mod store;

pub use crate::config::AppConfig;
pub use crate::model::{Match, NotificationReceipt};
pub use crate::notify::{Destination, NotificationScheduler};
pub use crate::store::Store;
