use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bookshelf::{
    config::{Configuration, LogFormat},
    core::{model::Command, Application, CommandReceipt},
    error::Result,
    http,
    infrastructure::{persistence::SqliteCatalog, Termination},
};

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let configuration = Configuration::parse();
    init_logging(configuration.log_format);

    let store =
        SqliteCatalog::connect(&configuration.database_url, configuration.max_connections).await?;
    let application = Application::with_password_cost(store, configuration.bcrypt_cost);

    if configuration.seed {
        if let CommandReceipt::AlreadySeeded = application.submit_command(Command::SeedBooks).await? {
            info!("Catalog already has books, not seeding");
        }
    }

    let listener = TcpListener::bind(configuration.listen).await?;

    let termination = Termination::new();
    let waiter = termination.waiter();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down");
                termination.signal();
            }
            Err(error) => {
                error!(%error, "Unable to listen for Ctrl-C");
                // Dropping the Termination would stop the server.
                std::future::pending::<()>().await;
            }
        }
    });

    http::Api::new(application).start(listener, waiter).await
}
