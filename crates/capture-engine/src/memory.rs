//! In-process recorder that logs what it was fed.
//!
//! Each frame becomes an 8-byte chunk holding a digest of its pixels, so
//! the finished blob can be compared across runs without an encoder.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use mediamerge_common::error::{MergeError, MergeResult};

use crate::format::OutputFormat;
use crate::recorder::{AudioStream, Recorder, RecorderSettings, StreamSpec};

/// Magic bytes opening every in-memory recording.
pub const MEMORY_HEADER: &[u8] = b"MMREC1";

/// Everything a [`MemoryRecorder`] observed, shared with the test harness.
#[derive(Debug, Default, Clone)]
pub struct RecorderLog {
    pub starts: u32,
    pub stream: Option<StreamSpec>,
    pub audio: Option<AudioStream>,
    pub settings: Option<RecorderSettings>,
    pub frame_digests: Vec<u64>,
    pub finished: bool,
    pub aborted: bool,
}

impl RecorderLog {
    pub fn frames(&self) -> usize {
        self.frame_digests.len()
    }
}

/// Recorder that keeps frame digests in memory.
#[derive(Debug)]
pub struct MemoryRecorder {
    log: Arc<Mutex<RecorderLog>>,
    unsupported: HashSet<OutputFormat>,
    fail_after_frames: Option<usize>,
    pending: VecDeque<Vec<u8>>,
    frame_bytes: usize,
    running: bool,
}

impl Default for MemoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(RecorderLog::default())),
            unsupported: HashSet::new(),
            fail_after_frames: None,
            pending: VecDeque::new(),
            frame_bytes: 0,
            running: false,
        }
    }

    /// Report `format` as having no encoder.
    pub fn without_format(mut self, format: OutputFormat) -> Self {
        self.unsupported.insert(format);
        self
    }

    /// End the stream unexpectedly once `frames` frames were written.
    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after_frames = Some(frames);
        self
    }

    /// Handle onto the shared log; stays valid after the recorder is moved.
    pub fn log(&self) -> Arc<Mutex<RecorderLog>> {
        Arc::clone(&self.log)
    }

    fn with_log<R>(&self, f: impl FnOnce(&mut RecorderLog) -> R) -> R {
        let mut guard = match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

/// Digest of a raw frame as recorded by [`MemoryRecorder`].
pub fn frame_digest(rgba: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    rgba.hash(&mut hasher);
    hasher.finish()
}

impl Recorder for MemoryRecorder {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&mut self, format: OutputFormat) -> bool {
        !self.unsupported.contains(&format)
    }

    fn start(
        &mut self,
        stream: &StreamSpec,
        audio: Option<&AudioStream>,
        settings: &RecorderSettings,
    ) -> MergeResult<()> {
        if self.running {
            return Err(MergeError::recording_aborted("recorder already started"));
        }
        self.with_log(|log| {
            log.starts += 1;
            log.stream = Some(*stream);
            log.audio = audio.cloned();
            log.settings = Some(*settings);
            log.frame_digests.clear();
            log.finished = false;
            log.aborted = false;
        });
        self.frame_bytes = stream.frame_bytes();
        self.pending.clear();
        self.pending.push_back(MEMORY_HEADER.to_vec());
        self.running = true;
        Ok(())
    }

    fn write_frame(&mut self, rgba: &[u8]) -> MergeResult<()> {
        if !self.running {
            return Err(MergeError::recording_aborted("recorder is not running"));
        }
        if rgba.len() != self.frame_bytes {
            return Err(MergeError::recording_aborted(format!(
                "frame has {} bytes, expected {}",
                rgba.len(),
                self.frame_bytes
            )));
        }
        let written = self.with_log(|log| log.frames());
        if self.fail_after_frames.is_some_and(|limit| written >= limit) {
            self.running = false;
            return Err(MergeError::recording_aborted(format!(
                "stream ended after {written} frames"
            )));
        }
        let digest = frame_digest(rgba);
        self.with_log(|log| log.frame_digests.push(digest));
        self.pending.push_back(digest.to_le_bytes().to_vec());
        Ok(())
    }

    fn try_recv_chunk(&mut self) -> MergeResult<Option<Vec<u8>>> {
        Ok(self.pending.pop_front())
    }

    fn finish(&mut self) -> MergeResult<Vec<Vec<u8>>> {
        if !self.running {
            return Err(MergeError::recording_aborted(
                "recorder stopped before finalization",
            ));
        }
        self.running = false;
        self.with_log(|log| log.finished = true);
        Ok(self.pending.drain(..).collect())
    }

    fn abort(&mut self) {
        if self.running {
            self.with_log(|log| log.aborted = true);
        }
        self.running = false;
        self.pending.clear();
    }
}
