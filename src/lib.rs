//! Pong session server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod config;
pub mod game_loop;
pub mod matchmaker;
pub mod physics;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod ws;
