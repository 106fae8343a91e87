// src/lib.rs

pub mod config;
pub mod db;
pub mod error;
pub mod grading;
pub mod handlers;
pub mod models;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

pub use reconcile::ResultsRegistry;
pub use routes::create_router;
