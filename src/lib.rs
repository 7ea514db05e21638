pub mod app;
pub mod args;
pub mod checksum;
pub mod config;
pub mod config_io;
pub mod download;
pub mod irc;
pub mod logging;
pub mod session;
