//! Roon → Discord rich presence bridge.
//!
//! Mirrors the current playback state of a Roon zone into a Discord
//! rich presence activity. The bridge keeps two connections alive: a
//! WebSocket subscription to the media core's zone events and a local
//! IPC session to the Discord client, and maps zone status changes into
//! presence updates.

// Deny truly dangerous patterns (these will fail the build)
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod bridge;
pub mod config;
pub mod core_client;
pub mod presence;
pub mod tracker;
pub mod zones;
