use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use tapsync_client::{Connectivity, Gateway, ReconnectPolicy, SessionClient, WsTransport};
use tapsync_core::SessionStatus;
use tapsync_engine::{join_session, EngineConfig, HostSession, HostView, PlayerSession, PlayerView};
use tapsync_settings::{load_settings_from_path, settings_path, tapsync_dir, TapsyncSettings};
use tapsync_store::{Database, IdentityRepo};
use tapsync_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "tapsync", version, about = "Real-time tap race client")]
struct Cli {
    /// Session owner WebSocket URL (overrides settings).
    #[arg(long, global = true)]
    url: Option<String>,
    /// Settings file (defaults to ~/.tapsync/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Identity profile name.
    #[arg(long, global = true)]
    profile: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a session and run it. Type `start` to begin the game.
    Host,
    /// Join a session and remember the identity for `play`.
    Join { session: String, name: String },
    /// Resume the saved identity. Every input line is one tap.
    Play,
    /// Delete the saved identity.
    Forget,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_file = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&settings_file)
        .with_context(|| format!("loading {}", settings_file.display()))?;
    if let Some(url) = cli.url.clone() {
        settings.server.url = url;
    }
    if let Some(profile) = cli.profile.clone() {
        settings.storage.profile = profile;
    }

    let telemetry = TelemetryConfig {
        format: settings.logging.format.parse()?,
        ..TelemetryConfig::default()
    }
    .with_level_name(&settings.logging.level)?;
    init_telemetry(&telemetry)?;

    let repo = open_identities(&settings)?;
    if let Commands::Forget = cli.command {
        let removed = repo.clear()?;
        println!(
            "{}",
            if removed { "identity forgotten" } else { "no identity saved" }
        );
        return Ok(());
    }

    let client = connect(&settings).await?;
    let config = engine_config(&settings);
    let outcome = match cli.command {
        Commands::Host => run_host(client.clone(), config).await,
        Commands::Join { session, name } => {
            let identity = join_session(&client, &repo, &session, &name).await?;
            println!(
                "joined {} as {} ({})",
                identity.session_id, identity.display_name, identity.participant_id
            );
            println!("run `tapsync play` to take part");
            Ok(())
        }
        Commands::Play => run_player(client.clone(), repo, config).await,
        Commands::Forget => Ok(()),
    };
    client.gateway().shutdown().await;
    outcome
}

fn open_identities(settings: &TapsyncSettings) -> Result<IdentityRepo> {
    let path = settings.storage.identity_db_path(&tapsync_dir());
    let db = Database::open(&path).with_context(|| format!("opening {}", path.display()))?;
    Ok(IdentityRepo::new(db, settings.storage.profile.clone()))
}

fn engine_config(settings: &TapsyncSettings) -> EngineConfig {
    let gameplay = &settings.gameplay;
    EngineConfig {
        countdown_ticks: gameplay.countdown_ticks,
        tick_interval: Duration::from_millis(gameplay.tick_interval_ms),
        marker_ttl: Duration::from_millis(gameplay.marker_ttl_ms),
        ripple_ttl: Duration::from_millis(gameplay.ripple_ttl_ms),
    }
}

/// Open the connection and wait for the first link, or for the retry
/// budget to run out.
async fn connect(settings: &TapsyncSettings) -> Result<SessionClient> {
    let policy = ReconnectPolicy {
        max_attempts: settings.connection.reconnect_attempts,
        delay: settings.connection.reconnect_delay(),
    };
    let gateway = Gateway::connect(WsTransport::new(settings.server.url.clone()), policy);
    let client = SessionClient::new(gateway);

    let mut connectivity = client.connectivity();
    let connected = connectivity
        .wait_for(|c| c.connected() || c.gave_up())
        .await
        .context("connection task stopped")?
        .connected();
    if !connected {
        bail!("could not reach {}", settings.server.url);
    }
    info!(url = %settings.server.url, "connected");
    Ok(client)
}

async fn run_host(client: SessionClient, config: EngineConfig) -> Result<()> {
    let host = HostSession::start(client, config);
    let created = host.create_session().await?;
    println!("session {}", created.session_id);
    if let Some(url) = &created.join_url {
        println!("join at {url}");
    }
    println!("type `start` once players have joined");

    let mut view = host.view();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last = String::new();
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                print_changed(&mut last, describe_host(&current));
                if current.status == SessionStatus::Completed || current.connectivity.gave_up() {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().eq_ignore_ascii_case("start") => {
                    if let Err(e) = host.start_session().await {
                        eprintln!("cannot start: {e}");
                    }
                }
                Some(_) => {}
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    host.shutdown().await;
    Ok(())
}

async fn run_player(client: SessionClient, repo: IdentityRepo, config: EngineConfig) -> Result<()> {
    let player = PlayerSession::start(client, repo, config)?;

    let mut view = player.view();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last = String::new();
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                print_changed(&mut last, describe_player(&current));
                if current.status == SessionStatus::Completed || current.connectivity.gave_up() {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(_) => player.tap(),
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    player.shutdown().await;
    Ok(())
}

fn print_changed(last: &mut String, line: String) {
    if *last != line {
        println!("{line}");
        *last = line;
    }
}

fn connection_label(connectivity: &Connectivity) -> &'static str {
    if connectivity.connected() {
        "online"
    } else if connectivity.reconnecting() {
        "reconnecting"
    } else {
        "offline"
    }
}

fn describe_host(view: &HostView) -> String {
    let mut line = format!(
        "[{}] {:?} players={} progress={:.0}% taps={} stage={}",
        connection_label(&view.connectivity),
        view.status,
        view.participants.len(),
        view.progress,
        view.total_taps,
        view.stage.label(),
    );
    if let Some(n) = view.countdown {
        line.push_str(&format!(" countdown={n}"));
    }
    if let Some(marker) = view.markers.last() {
        line.push_str(&format!(" last_tap={}", marker.tapper_name));
    }
    if let Some(e) = &view.last_error {
        line.push_str(&format!(" error=\"{e}\""));
    }
    line
}

fn describe_player(view: &PlayerView) -> String {
    let mut line = format!(
        "[{}] {} {:?} progress={:.0}% my_taps={} stage={}",
        connection_label(&view.connectivity),
        view.identity.display_name,
        view.status,
        view.progress,
        view.taps,
        view.stage.label(),
    );
    if let Some(n) = view.countdown {
        line.push_str(&format!(" countdown={n}"));
    }
    if let Some(e) = &view.last_error {
        line.push_str(&format!(" error=\"{e}\""));
    }
    line
}
