// SPDX-License-Identifier: MPL-2.0

use anyhow::Context;
use faxthat::backend::{MemoryBackend, RemoteService, SupabaseClient};
use faxthat::config::{APP_NAME, IS_DEVEL, POSTS_TABLE};
use faxthat::scan::{SystemOpener, UrlOpener};
use faxthat::state::{AppSettings, SecretServiceVault};
use faxthat::ui::Theme;
use faxthat::{app, runtime};
use std::io::IsTerminal;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_EMAIL: &str = "demo@faxthat.local";
const DEMO_PASSWORD: &str = "demo";

fn init_tracing() {
    let default_filter = if IS_DEVEL { "faxthat=debug" } else { "faxthat=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let json = std::env::var("FAXTHAT_LOG_FORMAT").is_ok_and(|f| f == "json");

    // Screens go to stdout; logs to stderr.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// In-process backend with one account and a couple of posts.
fn demo_backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    let user_id = backend.add_account(DEMO_EMAIL, DEMO_PASSWORD);
    let posts = [
        (1, "Welcome to FaxThat! #hello", "2024-05-01T09:00:00Z"),
        (2, "Scanned a great deal today https://example.com/deal", "2024-05-02T18:30:00Z"),
    ];
    for (id, caption, created_at) in posts {
        let row = serde_json::json!({
            "id": id,
            "caption": caption,
            "likes": 0,
            "comments": 0,
            "reposts": 0,
            "user_id": user_id,
            "username": DEMO_EMAIL,
            "created_at": created_at,
        });
        if let serde_json::Value::Object(record) = row {
            backend.seed(POSTS_TABLE, record);
        }
    }
    backend
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let local = std::env::args().skip(1).any(|arg| arg == "--local");
    let settings = AppSettings::load();
    if AppSettings::settings_path().is_some_and(|path| !path.exists()) {
        // First run: leave a file with the defaults for the user to edit.
        if let Err(e) = AppSettings::default().save() {
            tracing::warn!(error = %e, "could not write default settings");
        }
    }

    let remote: Arc<dyn RemoteService> = if local || !settings.backend.is_configured() {
        if !local {
            tracing::warn!("no backend configured, using the local demo backend");
        }
        tracing::info!(email = DEMO_EMAIL, "demo account available");
        Arc::new(demo_backend())
    } else {
        let vault = Arc::new(SecretServiceVault);
        Arc::new(
            SupabaseClient::new(&settings.backend, vault, settings.request_timeout())
                .context("failed to set up the backend client")?,
        )
    };

    let theme = Theme::from_settings(&settings).with_color(std::io::stdout().is_terminal());
    let opener: Arc<dyn UrlOpener> = Arc::new(SystemOpener);

    tracing::info!("Starting {APP_NAME}");
    runtime::block_on(app::run(remote, &settings, theme, opener))
}
