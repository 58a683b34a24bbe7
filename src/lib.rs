//! Agent relay: streams coding-agent events to a notification bus

pub mod agents;
pub mod config;
pub mod dispatch;
pub mod error;
mod event;
pub mod inbound;
pub mod ipc;
pub mod notify;
pub mod query;
pub mod server;
pub mod tools;

pub use event::*;
pub use notify::{Domain, Notification, Notifier, ToolResponse};
