pub mod config;
pub mod event;
pub mod health;
pub mod memqueue;
pub mod metrics;
pub mod pgqueue;
pub mod queue;
pub mod retry;
pub mod signature;
