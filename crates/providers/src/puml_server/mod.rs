pub mod client;
pub mod config;

pub use client::PumlServerClient;
pub use config::ServerConfig;
