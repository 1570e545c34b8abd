//! HTTP surface of the Storyloop game loop engine.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
