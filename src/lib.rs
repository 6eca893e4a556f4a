//! Content-addressed outbound mail queue
//!
//! The library half of the `mailqueue` binary: configuration loading and
//! wiring of the storage and notification adapters into a
//! [`QueueContext`](mailqueue_queue::QueueContext).

pub mod config;

pub use config::{ConfigError, MailQueue, find_config_file};
pub use mailqueue_common as common;
pub use mailqueue_queue as queue;
pub use mailqueue_store as store;
