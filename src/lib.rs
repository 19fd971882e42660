pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod roble;
pub mod services;
pub mod session;
pub mod state;
