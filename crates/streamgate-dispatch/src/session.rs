use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{error, info, warn};

use crate::batch::Batch;
use crate::clock::Clock;
use crate::command::Command;
use crate::error::{DispatchError, Result};
use crate::gateway::{submit, DispatchGateway};

/// How long a successful login is trusted before renewing.
pub const DEFAULT_RENEWAL_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

/// Service bot whose session handle frames are dispatched under.
pub const DEFAULT_BOT_USERNAME: &str = "apibot";

/// Service client credentials used to log in.
#[derive(Clone, Default)]
pub struct Credentials {
    pub client_id: String,
    /// Treated as opaque credential material and redacted in debug output.
    pub client_secret: String,
    /// Agent string reported to the backend.
    pub agent: String,
    /// Host identity reported to the backend.
    pub host: String,
    /// Bot whose session handle is looked up after login.
    pub bot_username: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &format_args!("<redacted:{} bytes>", self.client_secret.len()),
            )
            .field("agent", &self.agent)
            .field("host", &self.host)
            .field("bot_username", &self.bot_username)
            .finish()
    }
}

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub credentials: Credentials,
    /// Retry delay after a failure; also the heartbeat period.
    pub heartbeat_interval: Duration,
    /// Lifetime assumed for a fresh session.
    pub renewal_horizon: Duration,
    /// Upper bound on one authentication exchange.
    pub dispatch_timeout: Duration,
    /// Optional working area selected after switching identity.
    pub area: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials {
                bot_username: DEFAULT_BOT_USERNAME.to_string(),
                ..Credentials::default()
            },
            heartbeat_interval: Duration::from_secs(5),
            renewal_horizon: DEFAULT_RENEWAL_HORIZON,
            dispatch_timeout: Duration::from_secs(30),
            area: None,
        }
    }
}

/// Backend-authenticated identity context.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub secret: String,
    /// Session handle of the service bot.
    pub bot_identity: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &format_args!("<redacted:{} bytes>", self.token.len()))
            .field(
                "secret",
                &format_args!("<redacted:{} bytes>", self.secret.len()),
            )
            .field(
                "bot_identity",
                &format_args!("<redacted:{} bytes>", self.bot_identity.len()),
            )
            .finish()
    }
}

/// Authentication lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// What a call to [`SessionManager::ensure_fresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// Not yet expired; nothing to do.
    Fresh,
    /// Another exchange is already pending; skipped.
    InFlight,
    /// A new session was stored.
    Renewed,
    /// The exchange failed; the session was cleared and a retry scheduled.
    Failed,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    session: Option<Session>,
    expiry: Instant,
}

/// Commands that authorize `session` and switch it to act as `target`,
/// optionally selecting a working `area`.
pub fn authorization_prelude(session: &Session, target: &str, area: Option<&str>) -> Vec<Command> {
    let mut prelude = vec![
        Command::Authorize {
            session: session.token.clone(),
        },
        Command::SetActingIdentity {
            target: target.to_string(),
        },
    ];
    if let Some(area) = area {
        prelude.push(Command::SetContext {
            area: area.to_string(),
        });
    }
    prelude
}

/// Owns the process-wide session.
///
/// Reads and writes of the session happen under a short lock that is never
/// held across an await, so a batch sees either the old or the new session
/// and never a half-written one.
pub struct SessionManager {
    gateway: Arc<dyn DispatchGateway>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    state: Mutex<State>,
}

impl SessionManager {
    /// Start unauthenticated and already expired, so the first heartbeat logs in.
    pub fn new(
        gateway: Arc<dyn DispatchGateway>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let expiry = clock.now();
        Self {
            gateway,
            clock,
            config,
            state: Mutex::new(State {
                phase: Phase::Unauthenticated,
                session: None,
                expiry,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn expiry(&self) -> Instant {
        self.lock().expiry
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    /// Prelude for dispatching under the current session as its bot identity.
    pub fn prelude(&self) -> Result<Vec<Command>> {
        let session = self.current().ok_or(DispatchError::NoSession)?;
        Ok(authorization_prelude(
            &session,
            &session.bot_identity,
            self.config.area.as_deref(),
        ))
    }

    /// Renew the session if `now` has reached its expiry.
    ///
    /// At most one exchange runs at a time; a call that finds one pending
    /// returns [`Renewal::InFlight`] immediately.
    pub async fn ensure_fresh(&self, now: Instant) -> Renewal {
        {
            let mut state = self.lock();
            if now < state.expiry {
                return Renewal::Fresh;
            }
            if state.phase == Phase::Authenticating {
                return Renewal::InFlight;
            }
            state.phase = Phase::Authenticating;
        }

        match self.authenticate().await {
            Ok(session) => {
                let expiry = self.clock.now() + self.config.renewal_horizon;
                let mut state = self.lock();
                state.session = Some(session);
                state.phase = Phase::Authenticated;
                state.expiry = expiry;
                info!(
                    renew_in = ?self.config.renewal_horizon,
                    bot = %self.config.credentials.bot_username,
                    "session authenticated"
                );
                Renewal::Renewed
            }
            Err(err) => {
                self.record_failure(&err, true);
                Renewal::Failed
            }
        }
    }

    /// Error sink for any backend failure: clear the session and retry one
    /// heartbeat interval from now.
    ///
    /// A pending authentication exchange keeps its phase, so no second
    /// exchange starts until it finishes.
    pub fn on_backend_error(&self, err: &DispatchError) {
        self.record_failure(err, false);
    }

    fn record_failure(&self, err: &DispatchError, exchange_finished: bool) {
        let retry_at = self.clock.now() + self.config.heartbeat_interval;
        let had_session = {
            let mut state = self.lock();
            let had_session = state.session.take().is_some();
            if exchange_finished || state.phase != Phase::Authenticating {
                state.phase = Phase::Unauthenticated;
            }
            state.expiry = retry_at;
            had_session
        };
        error!(
            error = %err,
            had_session,
            retry_in = ?self.config.heartbeat_interval,
            "backend error; session cleared"
        );
    }

    async fn authenticate(&self) -> Result<Session> {
        let creds = &self.config.credentials;
        let batch = Batch::new(
            Vec::new(),
            vec![
                Command::Login {
                    client_id: creds.client_id.clone(),
                    client_secret: creds.client_secret.clone(),
                    agent: creds.agent.clone(),
                    host: creds.host.clone(),
                },
                Command::GetSession {
                    username: creds.bot_username.clone(),
                    agent: creds.agent.clone(),
                    host: creds.host.clone(),
                },
            ],
        );

        let results = submit(self.gateway.as_ref(), batch)
            .complete(self.config.dispatch_timeout)
            .await?;
        let mut values = results.into_values()?.into_iter();

        let login = values.next().flatten().ok_or(DispatchError::UnexpectedResult {
            command: "login",
            message: "empty result".to_string(),
        })?;
        let token = string_field(&login, "session", "login")?;
        let secret = string_field(&login, "secret", "login")?;

        let bot_identity = match values.next().flatten() {
            Some(Value::String(handle)) if !handle.is_empty() => handle,
            other => {
                warn!(bot = %creds.bot_username, "bot session lookup returned no handle");
                return Err(DispatchError::UnexpectedResult {
                    command: "get_session",
                    message: format!("expected session handle, got {}", describe(other.as_ref())),
                });
            }
        };

        Ok(Session {
            token,
            secret,
            bot_identity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn string_field(value: &Value, field: &str, command: &'static str) -> Result<String> {
    match value.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(DispatchError::UnexpectedResult {
            command,
            message: format!("field '{field}' is {}", describe(other)),
        }),
    }
}

fn describe(value: Option<&Value>) -> &'static str {
    match value {
        None | Some(Value::Null) => "missing",
        Some(Value::Bool(_)) => "a boolean",
        Some(Value::Number(_)) => "a number",
        Some(Value::String(_)) => "a string",
        Some(Value::Array(_)) => "an array",
        Some(Value::Object(_)) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::batch::CommandResult;
    use crate::clock::ManualClock;
    use crate::gateway::PendingReply;

    type Reply = Result<Vec<CommandResult>>;

    /// Answers every batch from a fixed script, or parks it when empty.
    #[derive(Default)]
    struct Scripted {
        answers: StdMutex<Vec<Reply>>,
        parked: StdMutex<Vec<oneshot::Sender<Reply>>>,
        seen: StdMutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn answering(answers: Vec<Reply>) -> Self {
            Self {
                answers: StdMutex::new(answers),
                ..Self::default()
            }
        }
    }

    impl DispatchGateway for Scripted {
        fn submit(&self, commands: Vec<String>) -> PendingReply {
            self.seen.lock().unwrap().push(commands);
            let (tx, rx) = oneshot::channel();
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                self.parked.lock().unwrap().push(tx);
            } else {
                let _ = tx.send(answers.remove(0));
            }
            rx
        }
    }

    fn login_ok() -> Reply {
        Ok(vec![
            CommandResult::success(Some(json!({ "session": "tok-1", "secret": "sec-1" }))),
            CommandResult::success(Some(json!("bot-handle"))),
        ])
    }

    fn config() -> SessionConfig {
        SessionConfig {
            credentials: Credentials {
                client_id: "gateway".to_string(),
                client_secret: "s3cr3t".to_string(),
                agent: "streamgate/test".to_string(),
                host: "edge-1".to_string(),
                bot_username: "apibot".to_string(),
            },
            ..SessionConfig::default()
        }
    }

    fn manager(gateway: Arc<Scripted>, clock: Arc<ManualClock>) -> SessionManager {
        SessionManager::new(gateway, clock, config())
    }

    #[tokio::test]
    async fn first_tick_authenticates() {
        let clock = Arc::new(ManualClock::default());
        let gateway = Arc::new(Scripted::answering(vec![login_ok()]));
        let sessions = manager(gateway.clone(), clock.clone());
        assert_eq!(sessions.phase(), Phase::Unauthenticated);

        assert_eq!(sessions.ensure_fresh(clock.now()).await, Renewal::Renewed);
        assert_eq!(sessions.phase(), Phase::Authenticated);
        assert_eq!(
            sessions.current().unwrap(),
            Session {
                token: "tok-1".to_string(),
                secret: "sec-1".to_string(),
                bot_identity: "bot-handle".to_string(),
            }
        );
        assert_eq!(sessions.expiry(), clock.now() + DEFAULT_RENEWAL_HORIZON);

        let seen = gateway.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            vec![
                "SELECT * FROM daemon.login('gateway', 's3cr3t', 'streamgate/test', 'edge-1');"
                    .to_string(),
                "SELECT * FROM daemon.session('apibot', 'streamgate/test', 'edge-1');".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn expiry_boundary() {
        let clock = Arc::new(ManualClock::default());
        let gateway = Arc::new(Scripted::answering(vec![login_ok(), login_ok()]));
        let sessions = manager(gateway.clone(), clock.clone());
        sessions.ensure_fresh(clock.now()).await;

        let expiry = sessions.expiry();
        assert_eq!(
            sessions.ensure_fresh(expiry - Duration::from_secs(1)).await,
            Renewal::Fresh
        );
        assert_eq!(gateway.seen.lock().unwrap().len(), 1);

        assert_eq!(sessions.ensure_fresh(expiry).await, Renewal::Renewed);
        assert_eq!(gateway.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failure_clears_and_backs_off_one_heartbeat() {
        let clock = Arc::new(ManualClock::default());
        let gateway = Arc::new(Scripted::answering(vec![
            login_ok(),
            Ok(vec![
                CommandResult::failure("invalid client"),
                CommandResult::success(None),
            ]),
        ]));
        let sessions = manager(gateway, clock.clone());
        sessions.ensure_fresh(clock.now()).await;
        assert!(sessions.current().is_some());

        clock.advance(DEFAULT_RENEWAL_HORIZON);
        assert_eq!(sessions.ensure_fresh(clock.now()).await, Renewal::Failed);
        assert!(sessions.current().is_none());
        assert_eq!(sessions.phase(), Phase::Unauthenticated);
        assert_eq!(sessions.expiry(), clock.now() + Duration::from_secs(5));
        assert!(matches!(sessions.prelude(), Err(DispatchError::NoSession)));
    }

    #[tokio::test]
    async fn missing_bot_handle_fails() {
        let clock = Arc::new(ManualClock::default());
        let gateway = Arc::new(Scripted::answering(vec![Ok(vec![
            CommandResult::success(Some(json!({ "session": "tok", "secret": "sec" }))),
            CommandResult::success(None),
        ])]));
        let sessions = manager(gateway, clock.clone());
        assert_eq!(sessions.ensure_fresh(clock.now()).await, Renewal::Failed);
        assert!(sessions.current().is_none());
    }

    #[tokio::test]
    async fn pending_exchange_is_not_reissued() {
        let clock = Arc::new(ManualClock::default());
        let gateway = Arc::new(Scripted::default());
        let sessions = Arc::new(manager(gateway.clone(), clock.clone()));

        let first = {
            let sessions = Arc::clone(&sessions);
            let now = clock.now();
            tokio::spawn(async move { sessions.ensure_fresh(now).await })
        };
        while gateway.parked.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(sessions.phase(), Phase::Authenticating);

        assert_eq!(sessions.ensure_fresh(clock.now()).await, Renewal::InFlight);
        assert_eq!(gateway.seen.lock().unwrap().len(), 1);

        let tx = gateway.parked.lock().unwrap().pop().unwrap();
        tx.send(login_ok()).unwrap();
        assert_eq!(first.await.unwrap(), Renewal::Renewed);
    }

    #[tokio::test]
    async fn backend_error_clears_session() {
        let clock = Arc::new(ManualClock::default());
        let gateway = Arc::new(Scripted::answering(vec![login_ok()]));
        let sessions = manager(gateway, clock.clone());
        sessions.ensure_fresh(clock.now()).await;

        clock.advance(Duration::from_secs(60));
        sessions.on_backend_error(&DispatchError::Disconnected);
        assert!(sessions.current().is_none());
        assert_eq!(sessions.expiry(), clock.now() + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn frame_error_during_renewal_keeps_single_exchange() {
        let clock = Arc::new(ManualClock::default());
        let gateway = Arc::new(Scripted::answering(vec![login_ok()]));
        let sessions = Arc::new(manager(gateway.clone(), clock.clone()));
        sessions.ensure_fresh(clock.now()).await;

        clock.advance(DEFAULT_RENEWAL_HORIZON);
        let renewal = {
            let sessions = Arc::clone(&sessions);
            let now = clock.now();
            tokio::spawn(async move { sessions.ensure_fresh(now).await })
        };
        while gateway.parked.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        sessions.on_backend_error(&DispatchError::Disconnected);
        assert!(sessions.current().is_none());
        assert_eq!(sessions.phase(), Phase::Authenticating);

        clock.advance(Duration::from_secs(5));
        assert_eq!(sessions.ensure_fresh(clock.now()).await, Renewal::InFlight);
        assert_eq!(gateway.seen.lock().unwrap().len(), 2);
        assert_eq!(gateway.parked.lock().unwrap().len(), 1);

        let tx = gateway.parked.lock().unwrap().pop().unwrap();
        tx.send(login_ok()).unwrap();
        assert_eq!(renewal.await.unwrap(), Renewal::Renewed);
        assert_eq!(sessions.phase(), Phase::Authenticated);
        assert_eq!(sessions.expiry(), clock.now() + DEFAULT_RENEWAL_HORIZON);
    }

    #[tokio::test]
    async fn failed_renewal_after_frame_error_returns_to_unauthenticated() {
        let clock = Arc::new(ManualClock::default());
        let gateway = Arc::new(Scripted::default());
        let sessions = Arc::new(manager(gateway.clone(), clock.clone()));

        let exchange = {
            let sessions = Arc::clone(&sessions);
            let now = clock.now();
            tokio::spawn(async move { sessions.ensure_fresh(now).await })
        };
        while gateway.parked.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        sessions.on_backend_error(&DispatchError::Disconnected);

        let tx = gateway.parked.lock().unwrap().pop().unwrap();
        tx.send(Err(DispatchError::Disconnected)).unwrap();
        assert_eq!(exchange.await.unwrap(), Renewal::Failed);
        assert_eq!(sessions.phase(), Phase::Unauthenticated);
    }

    #[test]
    fn prelude_shapes() {
        let session = Session {
            token: "tok".to_string(),
            secret: "sec".to_string(),
            bot_identity: "bot".to_string(),
        };
        let plain = authorization_prelude(&session, "bot", None);
        assert_eq!(
            plain,
            vec![
                Command::Authorize {
                    session: "tok".to_string()
                },
                Command::SetActingIdentity {
                    target: "bot".to_string()
                },
            ]
        );
        let with_area = authorization_prelude(&session, "bot", Some("field"));
        assert_eq!(with_area.len(), 3);
        assert_eq!(with_area[2].name(), "set_context");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let session = Session {
            token: "tok-123".to_string(),
            secret: "sec-456".to_string(),
            bot_identity: "bot".to_string(),
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("tok-123"));
        assert!(!rendered.contains("sec-456"));

        let creds = format!("{:?}", config().credentials);
        assert!(!creds.contains("s3cr3t"));
        assert!(creds.contains("gateway"));
    }
}
