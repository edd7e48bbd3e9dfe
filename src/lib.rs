pub mod auth;
pub mod client;
pub mod configuration;
pub mod email_client;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod validators;
