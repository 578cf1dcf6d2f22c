pub mod config;
pub mod error;
pub mod locks;
pub mod models;
pub mod schema;
pub mod state;
pub mod utils;
