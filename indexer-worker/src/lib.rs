pub mod client;
pub mod config;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod index;
pub mod projector;
pub mod worker;
