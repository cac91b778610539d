//! RFC 1459 message parsing and formatting, reduced to the client subset
//! the announce pipeline speaks: PASS, NICK, USER, PRIVMSG, NOTICE, JOIN,
//! PART, PING/PONG, INVITE and the numerics that drive the session state
//! machine.

use std::fmt;
use std::str::FromStr;

/// A parsed IRC line: optional prefix, command (verb or numeric), params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Convenience constructor for outbound commands.
    pub fn cmd(command: &str, params: &[&str]) -> Self {
        Self::new(command, params.iter().map(|p| p.to_string()).collect())
    }

    /// Nick portion of the prefix (`nick!user@host` or bare `nick`).
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        // A server prefix is not a nick.
        if nick.is_empty() || nick.contains('.') {
            return None;
        }
        Some(nick)
    }

    /// Last parameter, where PRIVMSG/NOTICE text lives.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s.trim_end_matches(['\r', '\n']);

        // IRCv3 tags may precede the prefix; the client subset ignores them.
        if let Some(stripped) = rest.strip_prefix('@') {
            let (_, after) = stripped
                .split_once(' ')
                .ok_or(MessageParseError::Truncated)?;
            rest = after;
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, after) = stripped
                .split_once(' ')
                .ok_or(MessageParseError::Truncated)?;
            rest = after;
            Some(prefix.to_string())
        } else {
            None
        };

        let rest = rest.trim_start();
        if rest.is_empty() {
            return Err(MessageParseError::Empty);
        }

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut parts = head.split_ascii_whitespace();
        let command = parts
            .next()
            .ok_or(MessageParseError::Empty)?
            .to_ascii_uppercase();

        let mut params: Vec<String> = parts.map(|p| p.to_string()).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Message {
            prefix,
            command,
            params,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        write!(f, "{}", self.command)?;

        for (i, param) in self.params.iter().enumerate() {
            let last = i == self.params.len() - 1;
            if last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        Ok(())
    }
}

/// Why a line failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageParseError {
    Empty,
    Truncated,
}

impl fmt::Display for MessageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageParseError::Empty => write!(f, "empty message"),
            MessageParseError::Truncated => write!(f, "truncated message"),
        }
    }
}

impl std::error::Error for MessageParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping() {
        let msg: Message = "PING :irc.example.org\r\n".parse().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.trailing(), Some("irc.example.org"));
        assert!(msg.prefix.is_none());
    }

    #[test]
    fn test_parse_privmsg_with_prefix() {
        let msg: Message = ":Bot!bot@tracker.example PRIVMSG #announce :New release here"
            .parse()
            .unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.prefix.as_deref(), Some("Bot!bot@tracker.example"));
        assert_eq!(msg.source_nick(), Some("Bot"));
        assert_eq!(msg.params[0], "#announce");
        assert_eq!(msg.trailing(), Some("New release here"));
    }

    #[test]
    fn test_parse_numeric() {
        let msg: Message = ":irc.example.org 001 trawlerbot :Welcome to ExampleNet"
            .parse()
            .unwrap();
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params[0], "trawlerbot");
        // Server prefixes are not nicks.
        assert_eq!(msg.source_nick(), None);
    }

    #[test]
    fn test_parse_lowercase_command_uppercased() {
        let msg: Message = "ping :x".parse().unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn test_parse_tags_ignored() {
        let msg: Message = "@time=2024-01-01T00:00:00Z :n!u@h PRIVMSG #c :hi"
            .parse()
            .unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.source_nick(), Some("n"));
    }

    #[test]
    fn test_parse_empty_fails() {
        assert!("".parse::<Message>().is_err());
        assert!("   ".parse::<Message>().is_err());
    }

    #[test]
    fn test_display_trailing_with_spaces() {
        let msg = Message::cmd("PRIVMSG", &["NickServ", "IDENTIFY acc pass"]);
        assert_eq!(msg.to_string(), "PRIVMSG NickServ :IDENTIFY acc pass");
    }

    #[test]
    fn test_display_simple_params() {
        let msg = Message::cmd("JOIN", &["#announce", "hunter2"]);
        assert_eq!(msg.to_string(), "JOIN #announce hunter2");
    }

    #[test]
    fn test_round_trip() {
        let original = ":Bot!b@h PRIVMSG #c :hello world";
        let msg: Message = original.parse().unwrap();
        assert_eq!(msg.to_string(), original);
    }
}
