//! # chatterbox
//!
//! Terminal client for the ChatterBox anonymous pairing chat service. Logs
//! in over the REST API, opens one WebSocket to the pairing server, and
//! bridges the terminal to the pairing session: stdin lines go out as chat
//! messages, inbound frames render as a transcript.
//!
//! ## Architecture
//!
//! ```text
//! main.rs       — entry point, CLI, login/signup, terminal chat loop
//! config.rs     — JSON file / env-var configuration loading
//! client.rs     — HTTP client for the ChatterBox REST API
//! protocol.rs   — wire frame types and inbound classification
//! websocket.rs  — WebSocket session channel (connect, events, send, close)
//! session.rs    — pairing state machine, transcript, identity resolution
//! ```
//!
//! ## In-chat commands
//!
//! - `/icon <path>` — upload a new avatar image
//! - `/quit` — log out and exit (EOF and ctrl-c do the same)

mod client;
mod config;
mod protocol;
mod session;
mod websocket;

use std::collections::HashSet;
use std::path::Path;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use client::{ApiClient, AvatarUpload};
use config::{Cli, Commands, ResolvedConfig};
use session::{ChatSession, Phase, TranscriptEntry};
use websocket::ChatChannel;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let resolved = match config::load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("chatterbox: configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&cli, resolved).await {
        eprintln!("chatterbox: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, config: ResolvedConfig) -> Result<(), String> {
    let mut api = ApiClient::new(&config.server_url);

    let grant = match &cli.command {
        Some(Commands::Signup { language, avatar }) => {
            let avatar = match avatar {
                Some(path) => Some(read_image(path)?),
                None => None,
            };
            api.signup(&config.email, &config.password, language, avatar)
                .await
                .map_err(|e| format!("signup failed: {e}"))?
        }
        None => api
            .login(&config.email, &config.password)
            .await
            .map_err(|e| format!("login failed: {e}"))?,
    };
    info!("logged in as {}", grant.client);

    // Own avatar, fetched once at session start. A failed lookup is
    // non-fatal (the per-author fallback covers it) unless the token
    // itself was rejected.
    let self_avatar = match api.me().await {
        Ok(profile) => {
            if let Some(lang) = &profile.language {
                info!("preferred language: {lang}");
            }
            profile.avatar_url
        }
        Err(e) if e.is_unauthorized() => return Err(format!("credential rejected: {e}")),
        Err(e) => {
            warn!("profile fetch failed: {e}");
            None
        }
    };

    let token = api.token().ok_or("no token after login")?.to_string();
    let channel = ChatChannel::connect(&config.server_url, &token)
        .await
        .map_err(|e| format!("connect failed: {e}"))?;
    let mut session = ChatSession::new(channel, grant.client, self_avatar);

    chat_loop(&mut session, &api).await;

    // Best-effort logout; the credential is cleared either way.
    if let Err(e) = api.logout().await {
        warn!("logout request failed: {e}");
    }
    session.close();
    info!("session closed");
    Ok(())
}

/// Bridge stdin and the session until the user quits or the channel drops.
async fn chat_loop(session: &mut ChatSession, api: &ApiClient) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut rendered = 0;
    let mut seen_authors = HashSet::new();
    let mut last_phase = session.phase();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!("Connected. Waiting for the server...");

    loop {
        tokio::select! {
            event = session.next_event() => {
                if event.is_none() {
                    break;
                }
                if session.phase() != last_phase {
                    last_phase = session.phase();
                    match last_phase {
                        Phase::Waiting => println!("* Searching for a chat partner..."),
                        Phase::Paired => println!("* Partner found. Say hi!"),
                        Phase::Closed => println!("* Connection closed."),
                        Phase::Idle => {}
                    }
                }
                render_new(session, &mut rendered, &mut seen_authors);
                if session.phase() == Phase::Closed {
                    break;
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_line(session, api, &line).await {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break, // EOF, same as /quit
                }
            }
            _ = &mut ctrl_c => break,
        }
    }
}

/// Print transcript entries appended since the last render. The first time
/// an author appears, their resolved avatar is shown once.
fn render_new(session: &ChatSession, rendered: &mut usize, seen_authors: &mut HashSet<String>) {
    for entry in &session.transcript()[*rendered..] {
        match entry {
            TranscriptEntry::System { text } => println!("* {text}"),
            TranscriptEntry::User { author, text, .. } => {
                if seen_authors.insert(author.clone()) {
                    if let Some(avatar) = session.resolve_avatar(entry) {
                        println!("* avatar for {author}: {avatar}");
                    }
                }
                let tag = if session.is_mine(entry) {
                    "you"
                } else {
                    author.as_str()
                };
                println!("<{tag}> {text}");
            }
        }
    }
    *rendered = session.transcript().len();
}

/// Handle one stdin line. Returns `false` when the loop should exit.
async fn handle_line(session: &mut ChatSession, api: &ApiClient, line: &str) -> bool {
    let line = line.trim();
    if line == "/quit" {
        return false;
    }
    if line == "/icon" {
        println!("(usage: /icon <path>)");
        return true;
    }
    if let Some(arg) = line.strip_prefix("/icon ") {
        change_icon(session, api, arg.trim()).await;
        return true;
    }
    if line.starts_with('/') {
        println!("(unknown command; try /icon <path> or /quit)");
        return true;
    }
    if line.is_empty() {
        return true;
    }
    if session.phase() != Phase::Paired {
        // Input is disabled until a partner arrives; tell the user rather
        // than erroring.
        println!("(no partner yet, message not sent)");
        return true;
    }
    if let Err(e) = session.submit(line).await {
        println!("(send failed: {e})");
    }
    true
}

/// The `/icon <path>` command: upload a new avatar and adopt it for all
/// self-authored entries from here on.
async fn change_icon(session: &mut ChatSession, api: &ApiClient, path: &str) {
    if path.is_empty() {
        println!("(usage: /icon <path>)");
        return;
    }
    let upload = match read_image(Path::new(path)) {
        Ok(upload) => upload,
        Err(e) => {
            println!("({e})");
            return;
        }
    };
    match api.update_avatar(upload).await {
        Ok(url) => {
            // Resolution is per render, so earlier self entries pick the
            // new avatar up too.
            session.set_self_avatar(url);
            println!("(icon updated)");
        }
        Err(e) => println!("(icon update failed: {e})"),
    }
}

/// Read an image file into an upload payload, guessing the content type
/// from the extension.
fn read_image(path: &Path) -> Result<AvatarUpload, String> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar.png".to_string());
    let content_type = guess_content_type(&file_name).to_string();
    Ok((bytes, file_name, content_type))
}

fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_the_extension() {
        assert_eq!(guess_content_type("me.PNG"), "image/png");
        assert_eq!(guess_content_type("me.jpeg"), "image/jpeg");
        assert_eq!(guess_content_type("me.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("me.webp"), "image/webp");
        assert_eq!(guess_content_type("no-extension"), "image/png");
    }
}
