//! Outbound channels.

pub mod webhook;

pub use webhook::{Notifier, WebhookNotifier};
