mod analysis_routes;
pub mod config;
pub mod error;
mod http_layers;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use http_layers::*;
pub(self) use analysis_routes::make_analysis_routes;
pub use server::{make_app, run_server};
