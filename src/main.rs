//! Aeiouly realtime harness
//!
//! Line-oriented console for exercising the realtime client by hand: sign in
//! and out, drop and regain the connection, send frames and read the log.

use std::sync::Arc;

use aeiouly_client::ws::ConnectionSnapshot;
use aeiouly_client::{
    ApiClient, AuthStateTracker, ClientConfig, NativeTransport, ProbeReason, RealtimeHandle,
};
use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Command, CommandError, HELP};

struct Session {
    api: ApiClient,
    tracker: AuthStateTracker,
    realtime: RealtimeHandle,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aeiouly=info,aeiouly_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().context("invalid configuration")?;
    let api = ApiClient::new(&config.base_url)
        .context("failed to create HTTP client")?
        .with_api_prefix(&config.api_prefix);
    let transport = NativeTransport::new().with_cookies(Arc::new(api.clone()));
    let realtime = RealtimeHandle::from_config(&config, transport)?;
    let tracker = AuthStateTracker::new(Arc::new(api.clone()));
    tracker.subscribe(Arc::new(realtime.notifier()));

    tokio::spawn(print_state_changes(realtime.subscribe()));

    tracing::info!(
        "aeiouly harness: api {} realtime {}",
        api.base_url(),
        config.ws_url()?
    );
    println!("{HELP}");

    let session = Session {
        api,
        tracker,
        realtime,
    };
    session.tracker.refresh(ProbeReason::Startup).await;

    let result = session.repl().await;
    // Single exit path: quit, EOF, Ctrl-C and I/O errors all end here.
    session.realtime.shutdown().await;
    result
}

async fn print_state_changes(mut rx: tokio::sync::watch::Receiver<ConnectionSnapshot>) {
    while rx.changed().await.is_ok() {
        let snapshot = *rx.borrow_and_update();
        println!("-- realtime: {}", snapshot.state);
    }
}

impl Session {
    async fn repl(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("failed to read stdin")?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted");
                    None
                }
            };
            let Some(line) = line else {
                return Ok(());
            };

            match line.parse::<Command>() {
                Ok(Command::Quit) => return Ok(()),
                Ok(command) => self.execute(command).await,
                Err(CommandError::Empty) => {}
                Err(e) => println!("{e}"),
            }
        }
    }

    async fn execute(&self, command: Command) {
        match command {
            Command::Login { username, password } => {
                match self.api.login(&username, &password).await {
                    Ok(_) => {
                        self.tracker.refresh(ProbeReason::LoginCompleted).await;
                    }
                    Err(e) => println!("login failed: {}", e.user_message()),
                }
            }
            Command::Google { credential } => match self.api.google_login(&credential).await {
                Ok(_) => {
                    self.tracker.refresh(ProbeReason::LoginCompleted).await;
                }
                Err(e) => println!("google login failed: {}", e.user_message()),
            },
            Command::Logout => {
                if let Err(e) = self.api.logout().await {
                    println!("logout request failed: {}", e.user_message());
                }
                // The local session is over either way.
                self.tracker.logout_completed();
            }
            Command::Me => match self.api.me().await {
                Ok(user) => println!(
                    "{} <{}> ({:?}, id {})",
                    user.display_name(),
                    user.email,
                    user.role,
                    user.id
                ),
                Err(e) => println!("not signed in: {}", e.user_message()),
            },
            Command::Connect => self.realtime.connect(),
            Command::Disconnect => self.realtime.disconnect(),
            Command::Send(text) => self.realtime.send(text),
            Command::Ping => self.realtime.send("ping"),
            Command::Focus => {
                self.tracker.refresh(ProbeReason::FocusRegained).await;
            }
            Command::Visible => {
                self.tracker.refresh(ProbeReason::VisibilityRegained).await;
                self.realtime.notify_visibility_regained();
            }
            Command::Status => {
                let snapshot = self.realtime.snapshot();
                println!(
                    "realtime: {} (attempt {}, retries {}, auto reconnect {})",
                    snapshot.state,
                    snapshot.generation.value(),
                    snapshot.attempt,
                    if snapshot.auto_reconnect { "on" } else { "off" }
                );
                match self.tracker.current_user() {
                    Some(user) => println!("session: signed in as {}", user.display_name()),
                    None => println!("session: {:?}", self.tracker.state()),
                }
                println!(
                    "session cookie: {}",
                    if self.api.has_session_cookie() { "present" } else { "absent" }
                );
            }
            Command::Logs => {
                let logs = self.realtime.log_buffer();
                if logs.evicted() > 0 {
                    println!("({} older entries dropped)", logs.evicted());
                }
                for entry in logs.entries() {
                    println!("{entry}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }
}
