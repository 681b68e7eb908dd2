//! HTTP/JSON control surface for the message delivery pipeline.
//!
//! Exposes submission, status, cancellation, listing, reprioritization,
//! forced retry and queue administration over HTTP, backed directly by the
//! [`smsrelay_store::Store`] and [`smsrelay_dispatch`] handles the
//! composition root hands it. This is the one place a typed
//! [`error::ControlError`] is translated into an HTTP status and JSON body.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ControlConfig;
pub use error::{ControlError, Result};
pub use server::{ControlServer, ControlServerError};
pub use state::AppState;
