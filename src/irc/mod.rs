//! Minimal IRC client side: enough line protocol to log in, join, message bots and receive
//! DCC offers. Everything the orchestrator sees goes through [`crate::session`].

pub mod client;
pub mod ctcp;
pub mod dcc;
pub mod error;
pub mod protocol;

#[cfg(test)]
mod tests;

pub use client::{IrcHandle, IrcSession};
pub use dcc::DccConnector;
pub use error::IrcError;
pub use protocol::{IrcCommand, IrcMessage, strip_formatting};
