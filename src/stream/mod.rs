//! Answer stream decoding.
//!
//! Turns the transport's byte stream into typed events:
//! - `codec`: blank-line frame splitting ([`codec::FrameCodec`], [`codec::FrameDecoder`]).
//! - `event`: payload classification into [`event::StreamEvent`].
//! - `cancel`: cooperative abort flag shared with the read loop.

pub mod cancel;
pub mod codec;
pub mod event;
