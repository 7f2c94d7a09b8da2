pub mod clock;
pub mod config;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
