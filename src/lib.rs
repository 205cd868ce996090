pub mod app;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod source;
pub mod stats;
pub mod state;
pub mod timekey;

pub use app::router;
pub use config::Config;
pub use orchestrator::FetchOrchestrator;
pub use source::{ClickSource, HttpClickSource};
pub use state::AppState;
