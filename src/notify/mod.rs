//! Operator notifications.

pub mod telegram;

pub use telegram::{Decision, TelegramApprovalStation, TelegramClient, parse_command};
