//! Webserver library for pathway figure analysis progress
//!
//! Exposes `GET /dossier/progress/{target}/{disease}` over whatever tracks
//! job progress, plus a liveness route.

pub mod error;
pub mod webserver_impl;

pub use error::{WebServerError, WebServerResult};
pub use webserver_impl::ProgressServer;
