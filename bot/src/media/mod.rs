//! Media file playback into the call.
//!
//! This module turns a local media file into the normalized audio and image
//! frames the rest of the bot consumes. It is split for maintainability:
//!
//! - `graph`: GStreamer decode-graph construction and per-stream chains
//! - `manager`: the [`FileSource`] lifecycle (build, start, stop, errors)
//! - `stats`: emitted-frame counters and periodic logging
//!
//! # Architecture
//!
//! A `filesrc ! decodebin` graph discovers the file's elementary streams at
//! runtime. For each discovered stream kind a fixed normalizer chain is
//! attached on the fly:
//!
//! 1. audio: `queue ! audioconvert ! audioresample ! capsfilter ! appsink`,
//!    constrained to S16LE mono 16 kHz interleaved PCM
//! 2. video: `queue ! videoconvert ! videoscale ! capsfilter ! appsink`,
//!    constrained to raw RGB at 1024x576
//!
//! Appsink callbacks run on the decode backend's own threads. Each completed
//! buffer becomes a [`common::Frame`] and is sent over an unbounded channel;
//! the send never blocks the decoder, and per-stream frame order is the
//! decode order. The consuming side of the channel belongs to the call
//! transport.

mod graph;
mod manager;
mod stats;

pub use manager::{ErrorPolicy, FileSource, PlaybackState, SourceEvent};
