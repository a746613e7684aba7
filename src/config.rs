use clap::{Parser, ValueEnum};
use std::net::SocketAddr;

use crate::core::DEFAULT_PASSWORD_COST;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server settings. Every flag falls back to its environment variable,
/// which a `.env` file may provide.
#[derive(Debug, Parser)]
#[command(name = "bookshelf", version, about = "Library catalog service")]
pub struct Configuration {
    #[arg(long, env = "BOOKSHELF_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://bookshelf.db")]
    pub database_url: String,

    #[arg(long, env = "BOOKSHELF_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    #[arg(long, env = "BOOKSHELF_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[arg(
        long,
        env = "BOOKSHELF_BCRYPT_COST",
        default_value_t = DEFAULT_PASSWORD_COST,
        value_parser = clap::value_parser!(u32).range(4..=31),
    )]
    pub bcrypt_cost: u32,

    /// Install the sample books when the catalog is empty.
    #[arg(long, env = "BOOKSHELF_SEED")]
    pub seed: bool,
}
