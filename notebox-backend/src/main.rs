use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use notebox_backend::{build_app, graceful_shutdown, logging::init_tracing, AppState};
use notebox_shared::AddrInfo;

use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env is fine, everything has a default
    let dotenv = dotenvy::dotenv();
    let cli = notebox_backend::cli::CliOpts::parse();

    init_tracing(cli.debug);
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    let appstate = match AppState::new(&cli).await {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to initialize application state: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let shared_state = Arc::new(appstate);

    let addrinfo = AddrInfo::new(&cli.host, cli.port);

    let app = build_app(&shared_state);

    let listener = match tokio::net::TcpListener::bind(&addrinfo.as_addr()).await {
        Ok(val) => {
            info!("Listening on {}", addrinfo.as_url());
            val
        }
        Err(err) => {
            error!("Failed to bind to {}: {:?}", addrinfo.as_url(), err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown::handler())
        .await
    {
        error!("Server error: {:?}", err);
        return ExitCode::FAILURE;
    }
    info!("Shut down cleanly");
    ExitCode::SUCCESS
}
