use envconfig::Envconfig;

use indexer_common::config::NonEmptyString;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3300")]
    pub port: u16,

    #[envconfig(default = "3310")]
    pub metrics_port: u16,

    /// Shared secret the producer signs payloads with.
    pub webhook_secret: NonEmptyString,

    pub database_url: String,

    #[envconfig(default = "talk_events")]
    pub queue_name: NonEmptyString,

    #[envconfig(default = "10")]
    pub max_pg_connections: u32,

    #[envconfig(default = "5000000")]
    pub max_body_size: usize,

    #[envconfig(default = "100")]
    pub concurrency_limit: usize,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn metrics_bind(&self) -> String {
        format!("{}:{}", self.host, self.metrics_port)
    }
}
