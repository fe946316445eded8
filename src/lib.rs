pub mod api;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod jitter;
pub mod model;
pub mod navigator;
pub mod normalize;
pub mod orchestrator;
