//! Shared model and wire protocol for the media player: playlist entries,
//! stations, playback snapshots, the client command set, configuration and
//! platform paths.

pub mod config;
pub mod platform;
pub mod protocol;
pub mod stations;
