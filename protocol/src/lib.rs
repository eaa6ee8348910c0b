//! chaosbernie control-channel protocol
//!
//! Every request is a single line of text, `<action>|<value>`, sent over a
//! Unix domain socket. `value` is only meaningful for destructive actions
//! (`kill`, `renice` and any extra actions the daemon is configured with),
//! where it carries a decimal resource id.
//!
//! Replies exist only for `ps`: one line per live resource in the form
//! `<owner> <pid> <name> <is_daemon=[1|0]>`. Every other request is
//! fire-and-forget and the server closes the connection without writing.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Deadline applied to reads on both sides of the control channel
pub const READ_DEADLINE: Duration = Duration::from_secs(2);

/// Largest request the server will read from one connection
pub const MAX_REQUEST_LEN: usize = 1024;

/// File name of the control socket inside the user's home directory
pub const SOCKET_FILE_NAME: &str = ".chaosbernie.sock";

const SEPARATOR: char = '|';

/// Default control socket location, `~/.chaosbernie.sock`
pub fn default_socket_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SOCKET_FILE_NAME)
}

/// Wire-level failures. The server drops the connection without a reply on
/// any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty request")]
    Empty,
    #[error("missing '|' separator in request")]
    MissingSeparator,
    #[error("invalid action name: {0:?}")]
    InvalidAction(String),
    #[error("action {0} requires a pid")]
    MissingPid(String),
    #[error("invalid pid: {0:?}")]
    InvalidPid(String),
    #[error("malformed process line: {0:?}")]
    MalformedProcessLine(String),
}

/// The action half of a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Ps,
    Kill,
    Renice,
    /// Well-formed but outside the built-in vocabulary. The daemon decides
    /// whether it is a configured extra action or a no-op.
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Ps => "ps",
            Action::Kill => "kill",
            Action::Renice => "renice",
            Action::Other(name) => name,
        }
    }

    /// Built-in actions that take a pid and shoot a resource
    pub fn is_builtin_destructive(&self) -> bool {
        matches!(self, Action::Kill | Action::Renice)
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        match name {
            "ps" => Action::Ps,
            "kill" => Action::Kill,
            "renice" => Action::Renice,
            other => Action::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed control-channel request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub action: Action,
    pub value: Option<String>,
}

impl Request {
    pub fn ps() -> Self {
        Self {
            action: Action::Ps,
            value: None,
        }
    }

    pub fn kill(pid: u32) -> Self {
        Self::with_pid(Action::Kill, pid)
    }

    pub fn renice(pid: u32) -> Self {
        Self::with_pid(Action::Renice, pid)
    }

    pub fn with_pid(action: Action, pid: u32) -> Self {
        Self {
            action,
            value: Some(pid.to_string()),
        }
    }

    /// Parse the start of a raw request buffer.
    ///
    /// The action must be a run of `[A-Za-z0-9_]` immediately followed by
    /// `|`. The value is everything after the separator up to the first
    /// whitespace (or NUL left over from a fixed-size read buffer); an empty
    /// value is treated as absent. Trailing bytes after the value are
    /// ignored.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let input = input.trim_end_matches('\0');
        if input.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let (action, rest) = input
            .split_once(SEPARATOR)
            .ok_or(ProtocolError::MissingSeparator)?;

        if action.is_empty() || !action.chars().all(is_word_char) {
            return Err(ProtocolError::InvalidAction(action.to_string()));
        }

        let value = rest
            .split(|c: char| c.is_whitespace() || c == '\0')
            .next()
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(Self {
            action: Action::from(action),
            value,
        })
    }

    /// Decimal resource id carried by a destructive request
    pub fn pid(&self) -> Result<u32, ProtocolError> {
        let value = self
            .value
            .as_deref()
            .ok_or_else(|| ProtocolError::MissingPid(self.action.to_string()))?;
        value
            .parse::<u32>()
            .map_err(|_| ProtocolError::InvalidPid(value.to_string()))
    }

    /// Wire form. `ps` is sent bare so the server answers on the same
    /// connection; actions carry a trailing newline.
    pub fn encode(&self) -> String {
        match &self.value {
            Some(value) => format!("{}{SEPARATOR}{}\n", self.action, value),
            None => format!("{}{SEPARATOR}", self.action),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// One row of a `ps` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLine {
    pub owner: String,
    pub pid: u32,
    pub name: String,
    pub daemon: bool,
}

impl ProcessLine {
    /// Line as written to the socket, newline included
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for ProcessLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.owner.to_lowercase(),
            self.pid,
            self.name,
            u8::from(self.daemon)
        )
    }
}

impl FromStr for ProcessLine {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || ProtocolError::MalformedProcessLine(line.to_string());
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [owner, pid, name, daemon] = fields.as_slice() else {
            return Err(malformed());
        };
        let daemon = match *daemon {
            "1" => true,
            "0" => false,
            _ => return Err(malformed()),
        };
        Ok(Self {
            owner: owner.to_string(),
            pid: pid.parse().map_err(|_| malformed())?,
            name: name.to_string(),
            daemon,
        })
    }
}
