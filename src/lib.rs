// Library entry point for booklib
// Exposes modules for testing

pub mod api;
pub mod auth;
pub mod models;
pub mod store;
