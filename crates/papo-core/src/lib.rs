//! # papo-core
//!
//! Group registry, session directory, and message routing for the papo
//! group chat server.
//!
//! This crate provides the stateful heart of the server:
//!
//! - **Group** - A fixed-catalog room owning its membership and bounded history
//! - **GroupRegistry** - The catalog of groups, built once at startup
//! - **SessionDirectory** - Binds each live connection to a user and group
//! - **ChatService** - Dispatches commands, fans out events, sweeps history
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌───────────────┐
//! │  Connection │────▶│ ChatService │────▶│ GroupRegistry │
//! └─────────────┘     └─────────────┘     └───────────────┘
//!                            │
//!                            ▼
//!                   ┌──────────────────┐
//!                   │ SessionDirectory │
//!                   └──────────────────┘
//! ```
//!
//! A single lock guards the registry and the directory together, so a group
//! switch is atomic: no observer ever sees a user in two groups or in none.

pub mod group;
pub mod registry;
pub mod service;
pub mod session;

pub use group::Group;
pub use registry::{default_catalog, CatalogEntry, CatalogError, GroupRegistry};
pub use service::{ChatService, ServiceConfig, ServiceStats};
pub use session::{ConnectionId, EventSink, Session, SessionDirectory};
