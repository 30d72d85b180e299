//! HTTP API for the cafe kiosk: routing, request validation and response
//! mapping over the infra services.

pub mod app;
pub mod middleware;
