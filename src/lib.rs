pub mod backend;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod realtime;
pub mod types;

pub use dashboard::Dashboard;
pub use notifications::{Notification, NotificationStore, Severity};
pub use types::ResourceType;
