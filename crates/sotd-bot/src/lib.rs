// Library root: exposes the bot's modules so the binary and integration
// tests share one implementation.

pub mod app;
pub mod config;
pub mod db;
pub mod discord;
pub mod gateway;
pub mod protocol;
pub mod seeder;
pub mod spotify;
