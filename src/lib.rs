pub mod chain;
pub mod config;
pub mod error;
pub mod identity;
pub mod notification;
pub mod request;
pub mod resolver;
pub mod service;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod timestamp;
pub mod utils;
