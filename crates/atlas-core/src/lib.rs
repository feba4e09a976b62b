//! # atlas-core: Pure Types for Atlas Backend
//!
//! Shared, I/O-free building blocks for the Atlas backend.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Atlas Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              HTTP services (out of this workspace)              │   │
//! │  │    routing, auth, i18n, rate limiting, notifications            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ atlas-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────────┐        ┌──────────────────┐             │   │
//! │  │   │      error       │        │    validation    │             │   │
//! │  │   │   ErrorStatus    │        │  registry number │             │   │
//! │  │   │ ValidationError  │        │   check digits   │             │   │
//! │  │   └──────────────────┘        └──────────────────┘             │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    atlas-db (Database Layer)                    │   │
//! │  │        pool, transactions, migrations, repositories             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error status taxonomy shared across layers
//! - [`validation`] - Request-level value validation

pub mod error;
pub mod validation;

pub use error::{ErrorStatus, ValidationError};
