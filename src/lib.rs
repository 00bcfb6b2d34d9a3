// Library entry point for fritter-social
// Exposes modules for the server binary and integration tests

pub mod api;
pub mod auth;
pub mod config;
pub mod feed;
pub mod models;
pub mod store;
