pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
