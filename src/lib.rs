//! Invoice intake: unseen mailbox messages to stored invoice records.

pub mod channels;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod pipeline;
pub mod store;
