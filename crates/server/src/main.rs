use auth_broker::AppState;
use auth_broker::api::start_webserver;
use auth_broker::config::load_config;
use auth_broker::issuer::TokenIssuer;
use auth_broker::keys::KeyStore;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "auth_broker=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    // A missing .env is normal outside development.
    dotenvy::dotenv().ok();

    initialize_tracing();

    let config = load_config()?;

    // Key material is settled before the listener binds; requests only ever read it.
    let store = KeyStore::new(&config.keys_dir);
    let keys = tokio::task::spawn_blocking(move || {
        store.ensure_keys()?;
        store.load()
    })
    .await??;
    let issuer = TokenIssuer::new(&keys)?;

    let state = AppState::new(config, issuer)?;
    tracing::info!(
        port = state.config.port,
        keys_dir = %state.config.keys_dir.display(),
        redirect_uri = %state.config.discord.redirect_uri,
        "auth broker configuration"
    );

    start_webserver(state).await
}
