use std::fmt;

/// A backend command. Rendered to a command string at submission time.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// Authenticate the service client.
    /// Answers `{"session": ..., "secret": ...}`.
    Login {
        client_id: String,
        client_secret: String,
        agent: String,
        host: String,
    },
    /// Look up the session handle of a service bot.
    GetSession {
        username: String,
        agent: String,
        host: String,
    },
    /// Authorize the connection with a session token or handle.
    Authorize { session: String },
    /// Switch the acting identity of the authorized session.
    SetActingIdentity { target: String },
    /// Switch the session's working area.
    SetContext { area: String },
    /// Hand one raw frame to the protocol parser. Answers a nullable
    /// base64 reply for the device.
    ApplicationCall {
        protocol: String,
        endpoint: String,
        payload_b64: String,
    },
}

impl Command {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::GetSession { .. } => "get_session",
            Command::Authorize { .. } => "authorize",
            Command::SetActingIdentity { .. } => "set_acting_identity",
            Command::SetContext { .. } => "set_context",
            Command::ApplicationCall { .. } => "application_call",
        }
    }

    fn function(&self) -> &'static str {
        match self {
            Command::Login { .. } => "daemon.login",
            Command::GetSession { .. } => "daemon.session",
            Command::Authorize { .. } => "api.authorize",
            Command::SetActingIdentity { .. } => "api.su",
            Command::SetContext { .. } => "api.set_session_area",
            Command::ApplicationCall { .. } => "stream.parse",
        }
    }

    fn args(&self) -> Vec<&str> {
        match self {
            Command::Login {
                client_id,
                client_secret,
                agent,
                host,
            } => vec![
                client_id.as_str(),
                client_secret.as_str(),
                agent.as_str(),
                host.as_str(),
            ],
            Command::GetSession {
                username,
                agent,
                host,
            } => vec![username.as_str(), agent.as_str(), host.as_str()],
            Command::Authorize { session } => vec![session.as_str()],
            Command::SetActingIdentity { target } => vec![target.as_str()],
            Command::SetContext { area } => vec![area.as_str()],
            Command::ApplicationCall {
                protocol,
                endpoint,
                payload_b64,
            } => vec![protocol.as_str(), endpoint.as_str(), payload_b64.as_str()],
        }
    }

    /// Render the backend command string. Argument order is significant.
    pub fn render(&self) -> String {
        let args: Vec<String> = self.args().into_iter().map(quote_literal).collect();
        format!("SELECT * FROM {}({});", self.function(), args.join(", "))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Login {
                client_id,
                client_secret,
                agent,
                host,
            } => f
                .debug_struct("Login")
                .field("client_id", client_id)
                .field(
                    "client_secret",
                    &format_args!("<redacted:{} bytes>", client_secret.len()),
                )
                .field("agent", agent)
                .field("host", host)
                .finish(),
            Command::Authorize { session } => f
                .debug_struct("Authorize")
                .field(
                    "session",
                    &format_args!("<redacted:{} bytes>", session.len()),
                )
                .finish(),
            Command::GetSession {
                username,
                agent,
                host,
            } => f
                .debug_struct("GetSession")
                .field("username", username)
                .field("agent", agent)
                .field("host", host)
                .finish(),
            Command::SetActingIdentity { target } => f
                .debug_struct("SetActingIdentity")
                .field("target", target)
                .finish(),
            Command::SetContext { area } => {
                f.debug_struct("SetContext").field("area", area).finish()
            }
            Command::ApplicationCall {
                protocol,
                endpoint,
                payload_b64,
            } => f
                .debug_struct("ApplicationCall")
                .field("protocol", protocol)
                .field("endpoint", endpoint)
                .field("payload_b64", payload_b64)
                .finish(),
        }
    }
}

/// Quote a string literal for the backend: single quotes are doubled, and a
/// literal containing backslashes is written in escape-string form with the
/// backslashes doubled.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 3);
    if value.contains('\\') {
        out.push_str(" E");
    }
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
