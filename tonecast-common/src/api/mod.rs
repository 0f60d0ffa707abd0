//! Shared HTTP API types
//!
//! Request and response bodies exchanged between the tonecast daemon and
//! its clients. The daemon wraps these with axum handlers; clients
//! deserialize them with serde.

pub mod types;

pub use types::{
    ChannelDto, CreatePlayerRequest, ErrorResponse, PlaybackPositionDto, PlayRequest, PlayerDto,
    PlayerKind, PlayerSourceDto, SeekRequest, StatusResponse, TrackDto,
};
