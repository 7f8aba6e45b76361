pub mod cli_adapter;
pub mod config;
pub mod consultation;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod reconciler;
pub mod sessions;
pub mod types;
pub mod ws_adapter;
