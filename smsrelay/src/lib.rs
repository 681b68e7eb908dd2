//! SMS gateway composition root: loads configuration and runs every
//! component of the message delivery pipeline concurrently.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod app;
pub mod config;
