pub mod config;
pub mod exit;
pub mod mapping;
pub mod oauth_flow;
pub mod provider;
pub mod runtime;
pub mod storage;
pub mod sync;
pub mod token_provider;
