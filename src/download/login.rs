//! Login, join and request ordering.
//!
//! Without a login command: connect, join every channel, send the requests on the first join.
//! With one: connect, send the login, wait for user mode `+r`, join, then wait for a channel
//! `+v` before sending the requests.

use crate::download::flags::ProcessFlags;
use crate::download::request::XdccRequest;
use crate::session::ChatSession;

/// Width of the recipient field at the start of a login command (`"nickserv identify pw"`).
pub const LOGIN_TARGET_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Connecting,
    AuthWait,
    Joined,
    Requested,
}

#[derive(Debug)]
pub struct LoginSequencer {
    state: LoginState,
    login_command: Option<String>,
    channels: Vec<String>,
    requests: Vec<XdccRequest>,
}

/// Split a login command into recipient and message. `None` when it is too short.
pub fn split_login_command(command: &str) -> Option<(String, String)> {
    let trimmed = command.trim_matches([' ', '\t']);
    if trimmed.chars().count() < LOGIN_TARGET_LEN {
        return None;
    }
    let split_at = trimmed
        .char_indices()
        .nth(LOGIN_TARGET_LEN)
        .map_or(trimmed.len(), |(i, _)| i);
    let (target, payload) = trimmed.split_at(split_at);
    Some((target.trim().to_string(), payload.trim().to_string()))
}

impl LoginSequencer {
    pub fn new(
        login_command: Option<String>,
        channels: Vec<String>,
        requests: Vec<XdccRequest>,
    ) -> Self {
        Self {
            state: LoginState::Connecting,
            login_command,
            channels,
            requests,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    pub fn requests(&self) -> &[XdccRequest] {
        &self.requests
    }

    fn authenticating(&self) -> bool {
        self.login_command.is_some()
    }

    pub fn on_connected<S: ChatSession>(&mut self, session: &mut S) {
        let Some(command) = self.login_command.as_deref() else {
            self.join_channels(session);
            return;
        };

        self.state = LoginState::AuthWait;
        let Some((target, payload)) = split_login_command(command) else {
            tracing::error!("the login command is too short, not sending it");
            return;
        };
        tracing::info!(target = %target, "sending login command");
        if let Err(err) = session.send_message(&target, &payload) {
            tracing::error!(error = %err, "cannot send login command");
        }
    }

    /// `+r` on our own nick means the login was accepted.
    pub fn on_user_mode<S: ChatSession>(&mut self, session: &mut S, mode: &str) {
        if self.authenticating() && self.state == LoginState::AuthWait && grants(mode, 'r') {
            tracing::info!("registered with services, joining channels");
            self.join_channels(session);
        }
    }

    pub fn on_joined<S: ChatSession>(
        &mut self,
        session: &mut S,
        flags: &mut ProcessFlags,
        channel: &str,
    ) {
        tracing::info!(channel = %channel, "joined channel");
        if let Err(err) = session.request_user_mode("+i") {
            tracing::debug!(error = %err, "could not request invisible mode");
        }
        if !self.authenticating() {
            self.send_requests(session, flags);
        }
    }

    /// A `+v` in any joined channel releases the requests when we authenticated.
    pub fn on_channel_mode<S: ChatSession>(
        &mut self,
        session: &mut S,
        flags: &mut ProcessFlags,
        mode: &str,
    ) {
        if self.authenticating() && grants(mode, 'v') {
            self.send_requests(session, flags);
        }
    }

    fn join_channels<S: ChatSession>(&mut self, session: &mut S) {
        for channel in &self.channels {
            tracing::info!(channel = %channel, "joining");
            if let Err(err) = session.join(channel) {
                tracing::error!(channel = %channel, error = %err, "cannot join channel");
            }
        }
        if self.state != LoginState::Requested {
            self.state = LoginState::Joined;
        }
    }

    fn send_requests<S: ChatSession>(&mut self, session: &mut S, flags: &mut ProcessFlags) {
        if !flags.mark_requests_sent() {
            return;
        }
        for request in &self.requests {
            tracing::info!(bot = %request.bot, command = %request.command, "sending request");
            if let Err(err) = session.send_message(&request.bot, &request.command) {
                tracing::error!(request = %request, error = %err, "cannot send request to bot");
            }
        }
        self.state = LoginState::Requested;
    }
}

/// Whether a mode string such as `+iv` or `+v-o` adds `flag`.
fn grants(mode: &str, flag: char) -> bool {
    let mut adding = false;
    for c in mode.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            c if c == flag && adding => return true,
            _ => {}
        }
    }
    false
}
