//! Logs in to a Taleweave backend, lists a few stories, and logs out.
//!
//! ```text
//! TALEWEAVE_URL=http://localhost:8000/api \
//! TALEWEAVE_USERNAME=alice TALEWEAVE_PASSWORD=secret \
//! RUST_LOG=taleweave_session=debug cargo run -p session-demo [-- --keep]
//! ```
//!
//! With `TALEWEAVE_SESSION_DIR` set the session is kept on disk, so a
//! second run with `--keep` on the first picks it up without logging in.

use std::path::PathBuf;

use taleweave::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
struct Settings {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    session_dir: Option<PathBuf>,
    keep_session: bool,
}

impl Settings {
    fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), std::env::args().skip(1))
    }

    fn from_lookup(
        var: impl Fn(&str) -> Option<String>,
        args: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            base_url: var("TALEWEAVE_URL")
                .unwrap_or_else(|| taleweave::DEFAULT_BASE_URL.to_string()),
            username: var("TALEWEAVE_USERNAME"),
            password: var("TALEWEAVE_PASSWORD"),
            session_dir: var("TALEWEAVE_SESSION_DIR").map(PathBuf::from),
            keep_session: args.into_iter().any(|a| a == "--keep"),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let mut builder = TaleweaveClient::builder().base_url(&settings.base_url);
    if let Some(dir) = &settings.session_dir {
        builder = builder.storage(FileStorage::new(dir));
    }
    let client = builder.build()?;

    let mut events = client.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event == SessionEvent::LoginRequired {
                tracing::warn!("session expired, log in again");
            } else {
                tracing::info!(?event, "session event");
            }
        }
    });

    if client.initialize().await != AuthState::Authenticated {
        let (Some(username), Some(password)) = (&settings.username, &settings.password)
        else {
            eprintln!("no stored session; set TALEWEAVE_USERNAME and TALEWEAVE_PASSWORD");
            return Ok(());
        };
        client.login(username, password).await?;
    }

    if let Some(user) = client.current_user() {
        println!("logged in as {} ({})", user.display_name(), user.username);
    }

    let stories = client.stories().list(&[("ordering", "-created_at")]).await?;
    println!("{} stories", stories.len());
    for story in stories.iter().take(5) {
        let title = story["title"].as_str().unwrap_or("(untitled)");
        let slug = story["slug"].as_str().unwrap_or("?");
        println!("  {title}  [{slug}]");
    }

    if !settings.keep_session {
        client.logout();
    }
    Ok(())
}
