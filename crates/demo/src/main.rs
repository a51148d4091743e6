mod command;
mod host;
mod settings;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use host::DemoHost;
use settings::SettingsStore;

/// Terminal host for the chat session.
///
/// Loads settings from the user config directory (overridable through `CHATLINK_*`
/// variables), wires a scripted widget runtime into a session and reads commands from
/// stdin. Logs go to stderr so they never interleave with command output.
#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = SettingsStore::load();
    tracing::info!(path = ?store.config_path(), "loaded demo settings");

    let mut host = DemoHost::new(store);
    if let Err(error) = host.run().await {
        tracing::error!(error = %error, "demo host stopped");
        std::process::exit(1);
    }
}
