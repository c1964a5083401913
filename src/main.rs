//! lendwatch — binary entrypoint.
//! Boots tracing, loads settings, and runs the change-detection engine until
//! shutdown.

use lendwatch::config::Settings;
use lendwatch::{Engine, LockError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lendwatch=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = ?e, "failed to load settings");
            std::process::exit(1);
        }
    };

    if let Err(e) = Engine::new(settings).run().await {
        // Another running instance is an operator error, not a crash; give it
        // its own exit code so supervisors can tell the two apart.
        if e.downcast_ref::<LockError>().is_some() {
            tracing::error!(error = %e, "refusing to start");
            std::process::exit(2);
        }
        tracing::error!(error = ?e, "engine failed");
        std::process::exit(1);
    }
}
