//! Polaris assistant pipeline: chat and automation planning against a
//! hosted model, sequential plan execution against a device-control agent,
//! plus the bounded message-persistence service and local storage.

pub mod agent;
pub mod chat;
pub mod error;
pub mod executor;
pub mod intent;
pub mod message_store;
pub mod mock_agent;
pub mod planner;
pub mod schema;
pub mod server;
pub mod storage;
pub mod ui_dump;
