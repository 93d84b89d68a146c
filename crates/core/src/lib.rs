#![warn(clippy::all)]

//! Core logic for the metro passenger information display.
//!
//! This crate hosts the line and route models, the route/service state
//! machine, the track layout engines, controller/display synchronisation,
//! line file and preset persistence, and configuration handling used by the
//! terminal front end.

pub mod color;
pub mod config;
pub mod error;
pub mod layout;
pub mod library;
pub mod markup;
pub mod models;
pub mod route;
pub mod sync;

pub use config::AppConfig;
pub use error::PidsError;
pub use models::{LineData, LineMeta, RouteState, Station};
pub use route::{Controller, DisplayFacts};
pub use sync::{Snapshot, SyncBus, SyncMessage};
