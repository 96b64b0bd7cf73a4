pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod identity;
pub mod models;
pub mod service;
pub mod store;
