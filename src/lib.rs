//! Chat-based habit coach: a Telegram bot that interviews users until a daily
//! reminder time is locked, then nudges them at that time every day.

pub mod chat;
pub mod coach;
pub mod config;
pub mod generation;
pub mod http_client;
pub mod llm_client;
pub mod prompt;
pub mod reminder;
pub mod reply;
pub mod runtime;
pub mod server;
pub mod store;
pub mod telegram;
pub mod user;

#[cfg(test)]
mod testing;
