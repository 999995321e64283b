#![recursion_limit = "256"]

mod config;
mod keepalive;
mod logging;
mod matrix;

use core::time::Duration;
use std::{fs, io::IsTerminal as _, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use matrix_sdk::{
    Client, SessionMeta,
    authentication::{SessionTokens, matrix::MatrixSession as SdkSession},
};
use responder_core::{
    AutoReplyPipeline, AutoReplyState, CompletionClient, SessionProvider, run_inbound, supervise,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{info, warn};

use crate::{
    config::load_config,
    logging::{LogFormat, init_tracing},
    matrix::{MatrixConnector, MatrixSession, register_handlers},
};

const INBOUND_QUEUE: usize = 256;

#[derive(Parser, Debug)]
#[command(
    name = "matrix-autoreply-bot",
    version,
    about = "Matrix auto-responder with owner-controlled AI replies"
)]
struct Args {
    /// Homeserver base URL, e.g. `https://matrix-client.matrix.org`.
    #[arg(long, env = "MATRIX_HOMESERVER")]
    homeserver: String,

    /// Username (localpart or full user ID)
    #[arg(long, env = "MATRIX_USERNAME")]
    username: String,

    /// Password (if omitted, will prompt if needed)
    #[arg(long, env = "MATRIX_PASSWORD")]
    password: Option<String>,

    /// Directory for persistent state (encryption keys, sync cache)
    #[arg(long, env = "MATRIX_STORE", default_value = "./bot-store")]
    store: PathBuf,

    /// JSON session file for access token/device info
    #[arg(long, env = "MATRIX_SESSION_FILE", default_value = "./session.json")]
    session_file: PathBuf,

    /// Device display name
    #[arg(long, env = "MATRIX_DEVICE_NAME", default_value = "matrix-autoreply-bot")]
    device_name: String,

    /// Path to the YAML responder config (owner, prompts, completion endpoint)
    #[arg(long, env = "MATRIX_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    /// Disable auto-joining rooms when invited
    #[arg(long)]
    no_autojoin: bool,

    /// Sync timeout in milliseconds
    #[arg(long, env = "MATRIX_SYNC_TIMEOUT_MS", default_value_t = 30000)]
    sync_timeout_ms: u64,

    /// Port of the keep-alive HTTP endpoint
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Log output format
    #[arg(long, env = "RUST_LOG_MODE", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user_id: String,
    device_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present so clap can pick up env vars.
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = load_config(&args.config)?;

    fs::create_dir_all(&args.store)
        .with_context(|| format!("creating store directory at {}", args.store.display()))?;

    // SQLite store keeps E2EE state across restarts.
    let client = Client::builder()
        .homeserver_url(&args.homeserver)
        .handle_refresh_tokens()
        .sqlite_store(&args.store, None)
        .build()
        .await
        .context("building matrix client")?;

    login(&client, &args).await?;

    let state = AutoReplyState::new(config.responder.auto_reply_default);
    info!(
        owner = %config.responder.owner,
        prefix = %config.responder.command_prefix,
        auto_reply = state.is_active(),
        window = config.responder.context_window,
        endpoint = %config.responder.completion.endpoint,
        "Responder configured"
    );

    let session: Arc<dyn SessionProvider> = Arc::new(MatrixSession::new(client.clone()));
    let completer = Arc::new(CompletionClient::new(
        config.responder.persona_prompt.clone(),
        config.responder.completion.clone(),
    )?);
    let pipeline = Arc::new(AutoReplyPipeline::new(
        &config.responder,
        state,
        session,
        completer,
    ));

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    register_handlers(&client, inbound_tx, !args.no_autojoin);
    tokio::spawn(run_inbound(pipeline, inbound_rx));

    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("binding keep-alive port {}", args.port))?;
    info!(port = args.port, "Keep-alive server listening");
    let status = config.keepalive.status.clone();
    tokio::spawn(async move {
        if let Err(e) = keepalive::serve(listener, status).await {
            warn!(error = %e, "Keep-alive server failed");
        }
    });

    let connector = MatrixConnector::new(
        client,
        Duration::from_millis(args.sync_timeout_ms),
        &config.responder.owner,
        config.startup_notice.clone(),
    );
    let policy = config.reconnect_policy();
    info!(
        timeout_ms = args.sync_timeout_ms,
        "Starting sync… Press Ctrl+C to stop."
    );
    tokio::select! {
        reason = supervise(&connector, &policy) => {
            Err(anyhow!("session ended: {reason}. Remove {} and log in again", args.session_file.display()))
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

/// Restores the stored session, or logs in with a password and stores the new one.
async fn login(client: &Client, args: &Args) -> Result<()> {
    if let Some(session) = load_session(&args.session_file)? {
        info!("Restoring session for {}", session.user_id);
        let matrix_session = SdkSession {
            meta: SessionMeta {
                user_id: session.user_id.parse().context("invalid stored user_id")?,
                device_id: session.device_id.into(),
            },
            tokens: SessionTokens {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            },
        };
        client
            .restore_session(matrix_session)
            .await
            .context("restoring session")?;
        return Ok(());
    }

    // Treat empty env/arg as missing; avoid prompting in non-interactive (Docker) mode.
    let password = if let Some(p) = args
        .password
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        p.to_owned()
    } else {
        if !std::io::stdin().is_terminal() {
            return Err(anyhow!(
                "No MATRIX_PASSWORD provided and no stored session. In Docker/non-interactive mode, set MATRIX_PASSWORD env or mount an existing session at {}",
                args.session_file.display()
            ));
        }
        warn!("No password provided via --password or MATRIX_PASSWORD. Prompting...");
        #[cfg(feature = "rpassword")]
        {
            rpassword::prompt_password("Matrix password:")
                .map_err(|e| anyhow!("Failed to read password: {e}"))?
        }
        #[cfg(not(feature = "rpassword"))]
        {
            return Err(anyhow!(
                "rpassword feature is not enabled. Cannot prompt for password."
            ));
        }
    };

    info!("Logging in as {}", args.username);
    let response = client
        .matrix_auth()
        .login_username(&args.username, &password)
        .initial_device_display_name(&args.device_name)
        .request_refresh_token()
        .send()
        .await
        .context("login failed")?;

    let session = SavedSession {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token.clone(),
        user_id: response.user_id.to_string(),
        device_id: response.device_id.to_string(),
    };
    save_session(&args.session_file, &session)?;
    info!(
        "Logged in: user={} device={}",
        session.user_id, session.device_id
    );
    Ok(())
}

fn load_session(path: &PathBuf) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading session file at {}", path.display()))?;
    let session: SavedSession = serde_json::from_str(&data).context("parsing session JSON")?;
    Ok(Some(session))
}

fn save_session(path: &PathBuf, session: &SavedSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(session)?;
    fs::write(path, data).with_context(|| format!("writing session file at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        assert!(load_session(&path).unwrap().is_none());

        let session = SavedSession {
            access_token: "token".to_owned(),
            refresh_token: None,
            user_id: "@bot:example.org".to_owned(),
            device_id: "DEVICE".to_owned(),
        };
        save_session(&path, &session).unwrap();

        let loaded = load_session(&path).unwrap().unwrap();
        assert_eq!(loaded.user_id, "@bot:example.org");
        assert_eq!(loaded.device_id, "DEVICE");
        assert!(loaded.refresh_token.is_none());
    }

    #[test]
    fn args_read_port_and_format() {
        let args = Args::try_parse_from([
            "matrix-autoreply-bot",
            "--homeserver",
            "https://matrix.example.org",
            "--username",
            "bot",
            "--port",
            "8080",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.port, 8080);
        assert!(matches!(args.log_format, LogFormat::Json));
    }
}
