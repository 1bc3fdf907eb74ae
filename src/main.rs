use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use parley_client::{
    AppState, ChatApi, Config, Driver, EventConnector, HttpApi, MediaHost, SessionStore,
    SocketIoConnector, UploadHost,
};
use parley_fake_backend::FakeBackend;
use tracing_subscriber::prelude::*;
use url::Url;

/// Terminal client for the parley chat backend.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
    /// REST base URL, e.g. http://localhost:5000/api
    #[arg(long)]
    api_url: Option<Url>,
    /// Socket.IO origin, e.g. http://localhost:5000
    #[arg(long)]
    socket_url: Option<Url>,
    /// Where the logged-in session is kept between runs.
    #[arg(long)]
    session_file: Option<PathBuf>,
    #[arg(long, default_value = "parley.log")]
    log_file: PathBuf,
    /// Talk to an in-process backend with a few chatty bots instead of a server.
    #[arg(long)]
    fake: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let log_file = std::sync::Mutex::new(std::fs::File::create(&args.log_file)?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(log_file))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    if let Some(url) = args.socket_url {
        config.socket_url = url;
    }
    if let Some(path) = args.session_file {
        config.session_file = path;
    }
    tracing::debug!(?config, "starting");

    let (state, effects, driver, updates) = if args.fake {
        let backend = FakeBackend::demo();
        tokio::spawn(parley_fake_backend::chatter(backend.clone()));
        // tokens from a real server mean nothing here, so the fake keeps its own session
        let session = SessionStore::new(std::env::temp_dir().join("parley-fake-session.json"));
        session.clear()?;
        let (driver, updates) = Driver::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(backend),
            session,
        );
        let (mut state, _) = AppState::new(None);
        let effects = state.login(
            parley_fake_backend::DEMO_EMAIL,
            parley_fake_backend::DEMO_PASSWORD,
        );
        (state, effects, driver, updates)
    } else {
        let api: Arc<dyn ChatApi> = Arc::new(HttpApi::new(&config.api_url));
        let media: Arc<dyn MediaHost> = Arc::new(UploadHost::new(config.media.clone()));
        let connector: Arc<dyn EventConnector> =
            Arc::new(SocketIoConnector::new(config.socket_url.clone()));
        let session = SessionStore::new(config.session_file.clone());
        tracing::info!(path = %session.path().display(), "using session file");
        let identity = session.load();
        let (driver, updates) = Driver::new(api, media, connector, session);
        let (state, effects) = AppState::new(identity);
        (state, effects, driver, updates)
    };

    let app = parley_tui::App::new(state, driver, effects)?;
    parley_tui::run(app, updates).await?;
    Ok(())
}
