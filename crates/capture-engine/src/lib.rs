//! MediaMerge Capture Engine
//!
//! Encodes the composited surface and the mixed audio destination into a
//! single container blob.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 CaptureSink                    │
//! │   push_frame ──▶ Recorder ──▶ chunk channel   │
//! │                     ▲              │           │
//! │   mixed PCM (file) ─┘              ▼           │
//! │                            buffered chunks     │
//! │                                    │ stop      │
//! │                                    ▼           │
//! │                          Blob (mime + bytes)   │
//! └───────────────────────────────────────────────┘
//! ```

pub mod ffmpeg;
pub mod format;
pub mod memory;
pub mod recorder;
pub mod sink;

pub use ffmpeg::FfmpegRecorder;
pub use format::OutputFormat;
pub use memory::{MemoryRecorder, RecorderLog};
pub use recorder::{AudioStream, Recorder, RecorderSettings, StreamSpec};
pub use sink::{CaptureSink, RecordingHandle, SinkState, SinkStats};
