//! Console command parsing.

use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Google { credential: String },
    Logout,
    Me,
    Connect,
    Disconnect,
    Send(String),
    /// Shorthand for `send ping`
    Ping,
    Focus,
    Visible,
    Status,
    Logs,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
commands:
  login <username> <password>   sign in with a password
  google <credential>           sign in with a Google ID token
  logout                        sign out (closes the connection)
  me                            show the current user
  connect | disconnect          open or close the connection manually
  send <text> | ping            send a text frame
  focus | visible               simulate the window regaining focus / visibility
  status                        connection and session state
  logs                          connection log
  quit                          shut down and exit";

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "" => return Err(CommandError::Empty),
            "login" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next()) {
                    (Some(username), Some(password), None) => Command::Login {
                        username: username.to_string(),
                        password: password.to_string(),
                    },
                    _ => return Err(CommandError::Usage("login <username> <password>")),
                }
            }
            "google" if !rest.is_empty() => Command::Google {
                credential: rest.to_string(),
            },
            "google" => return Err(CommandError::Usage("google <credential>")),
            "logout" => Command::Logout,
            "me" => Command::Me,
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "send" if !rest.is_empty() => Command::Send(rest.to_string()),
            "send" => return Err(CommandError::Usage("send <text>")),
            "ping" => Command::Ping,
            "focus" => Command::Focus,
            "visible" => Command::Visible,
            "status" => Command::Status,
            "logs" => Command::Logs,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}
