//! WebSocket transport binding: the Event Gateway's connection half

pub mod handler;
pub mod protocol;
