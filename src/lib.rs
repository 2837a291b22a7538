#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Impostor Server
//!
//! Realtime game engine for the Impostor social-deduction party game: a
//! lobby/room service, a turn/vote state machine, and the WebSocket/HTTP
//! transport that bridges them to clients.
//!
//! Durable state lives behind the [`store::RoomStore`] port, backed by an
//! in-memory implementation for tests and a Redis implementation for
//! production. Delivery to connected clients lives behind the
//! [`notify::Notifier`] port.

/// Configuration loading and defaults.
pub mod config;

/// Domain types, errors, events, ids and validation shared by every layer.
pub mod domain;

/// Structured logging configuration.
pub mod logging;

/// The abstract connection-delivery port and its in-memory implementation.
pub mod notify;

/// Lobby and game state machines.
pub mod service;

/// The abstract durable-state port and its in-memory/Redis implementations.
pub mod store;

/// HTTP + WebSocket adapters mapping the wire protocol to service calls.
pub mod transport;
