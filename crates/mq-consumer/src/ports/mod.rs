//! Hexagonal ports of the consumer layer.

pub mod inbound;
pub mod outbound;
