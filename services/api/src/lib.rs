//! Parley API Library Crate
//!
//! This library contains the web service around the parley core: the shared
//! application state, the REST handlers the browser front-end relies on, the
//! WebSocket session surface, and routing. The `api` binary is a thin wrapper
//! around this library.

pub mod audio_utils;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
