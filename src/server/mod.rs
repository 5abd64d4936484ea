//! # Server Module
//!
//! HTTP transport for the beacon, built on `may_minihttp`.
//!
//! - [`BeaconService`] adapts a shared [`Beacon`](crate::beacon::Beacon) to `HttpService`: every
//!   request, whatever its path or method, is handed to `Beacon::handle` by its request-target
//! - [`HttpServer`] / [`ServerHandle`] start the listener and manage its lifecycle
//! - [`response`] writes the fixed, body-less status responses

pub mod http_server;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use service::BeaconService;
