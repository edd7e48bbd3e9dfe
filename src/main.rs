use std::net::TcpListener;
use std::sync::Arc;

use archive_auth::auth::AuthContext;
use archive_auth::configuration::get_configuration;
use archive_auth::email_client::{EmailClient, SenderEmail};
use archive_auth::startup::run;
use archive_auth::store::PgStore;
use archive_auth::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

fn io_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = get_configuration().map_err(|e| {
        tracing::error!(error = %e, "Failed to read configuration");
        io_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    configuration.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        io_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create connection pool");
            io_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to run migrations");
        io_error(std::io::ErrorKind::Other, "Migration error")
    })?;

    let sender = SenderEmail::parse(configuration.email_client.sender_email.clone()).map_err(|e| {
        tracing::error!(error = %e, "Invalid sender email");
        io_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    let email_client = EmailClient::new(
        configuration.email_client.base_url.clone(),
        sender,
        configuration.email_client.timeout(),
    );

    let context = AuthContext::postgres(
        PgStore::new(pool),
        Arc::new(email_client),
        configuration.jwt.clone(),
        configuration.recovery.clone(),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(address = %address, "Server listening");

    run(listener, context, configuration)?.await
}
