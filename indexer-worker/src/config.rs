use envconfig::Envconfig;
use url::Url;

use indexer_common::config::{EnvMsDuration, NonEmptyString};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,

    pub database_url: String,

    #[envconfig(default = "talk_events")]
    pub queue_name: NonEmptyString,

    #[envconfig(default = "indexer-worker")]
    pub worker_name: String,

    #[envconfig(default = "10")]
    pub max_pg_connections: u32,

    #[envconfig(default = "1000")]
    pub poll_interval: EnvMsDuration,

    #[envconfig(default = "5000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(default = "30000")]
    pub visibility_timeout: EnvMsDuration,

    #[envconfig(default = "10")]
    pub max_messages_per_poll: u32,

    #[envconfig(default = "4")]
    pub max_concurrent_messages: usize,

    #[envconfig(default = "5")]
    pub max_receive_count: u32,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,

    #[envconfig(nested = true)]
    pub source: SourceConfig,

    #[envconfig(nested = true)]
    pub index: IndexConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Envconfig, Clone)]
pub struct RetryPolicyConfig {
    #[envconfig(default = "2")]
    pub backoff_coefficient: u32,

    #[envconfig(default = "1000")]
    pub initial_interval: EnvMsDuration,

    #[envconfig(default = "60000")]
    pub maximum_interval: EnvMsDuration,
}

/// Where talks are read from.
#[derive(Envconfig, Clone, Debug)]
pub struct SourceConfig {
    #[envconfig(from = "SOURCE_API_URL")]
    pub base_url: Url,

    #[envconfig(from = "SOURCE_API_USERNAME")]
    pub username: Option<String>,

    #[envconfig(from = "SOURCE_API_PASSWORD")]
    pub password: Option<String>,
}

/// Where talk documents are written to.
#[derive(Envconfig, Clone, Debug)]
pub struct IndexConfig {
    #[envconfig(from = "ELASTICSEARCH_URL")]
    pub base_url: Url,

    #[envconfig(from = "ELASTICSEARCH_INDEX")]
    pub index: NonEmptyString,

    #[envconfig(from = "ELASTICSEARCH_USERNAME")]
    pub username: Option<String>,

    #[envconfig(from = "ELASTICSEARCH_PASSWORD")]
    pub password: Option<String>,
}
