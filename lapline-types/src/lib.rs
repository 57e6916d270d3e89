//! # lapline-types
//!
//! Event model and wire types for the lapline race-timing sync protocol.
//!
//! This crate provides the foundational types used across all lapline crates:
//! - [`EventId`], [`RunnerId`], [`SessionId`], [`StationId`] - Identity types
//! - [`RunEvent`], [`EventType`] - The immutable fact exchanged between devices
//! - [`IngestRequest`], [`IngestResponse`], [`PullResponse`] - Remote API bodies
//! - [`TypeError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod ids;
mod messages;

pub use error::TypeError;
pub use event::{EventType, RunEvent};
pub use ids::{EventId, RunnerId, SessionId, StationId};
pub use messages::{IngestRequest, IngestResponse, PullResponse, TokenResolution};
