use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::encode::encoder::Encoder;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::picture::Picture;

/// Smallest accepted preview interval, in frames.
pub const MIN_PREVIEW_INTERVAL: u64 = 10;

/// How far past a gap `finish` looks for further missing frames before regenerating them.
const GAP_LOOKAHEAD: u64 = 100;

const WRITER_POLL: Duration = Duration::from_millis(200);

/// Options for [`VideoBuilder`].
#[derive(Clone, Debug)]
pub struct VideoBuilderOpts {
    pub width: u32,
    pub height: u32,
    /// Number of output frames; indices must lie in `[0, duration)`.
    pub duration: u64,
    /// Fail on duplicate or out-of-range frames instead of dropping them with a warning.
    pub strict_mode: bool,
    /// Write on the appending thread instead of a dedicated writer thread.
    pub block_write: bool,
    /// Emit a preview copy of every Nth accepted frame; 0 disables previews.
    pub preview_every: u64,
}

impl VideoBuilderOpts {
    pub fn new(width: u32, height: u32, duration: u64) -> Self {
        Self {
            width,
            height,
            duration,
            strict_mode: true,
            block_write: false,
            preview_every: 0,
        }
    }
}

/// Where an accepted frame currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Accepted and waiting for its turn.
    Pending,
    /// Handed to the encoder.
    Written,
}

#[derive(Debug, Default)]
struct WriterState {
    pending: BTreeMap<u64, Picture>,
    status: HashMap<u64, FrameStatus>,
    next: u64,
    closing: bool,
    finished: bool,
    writer_running: bool,
    failure: Option<String>,
    since_preview: u64,
}

type ProgressFn = Box<dyn Fn(f64) + Send + Sync>;

/// Sequential output writer.
///
/// Frames may be appended from any number of threads in any order; the encoder only ever sees
/// them in ascending index order, without gaps. In threaded mode one thread runs
/// [`run_writer`](Self::run_writer) while producers call [`append`](Self::append); in block-write
/// mode `append` itself writes every frame that became contiguous.
pub struct VideoBuilder<E: Encoder> {
    opts: VideoBuilderOpts,
    encoder: Mutex<E>,
    state: Mutex<WriterState>,
    ready: Condvar,
    preview: Option<(Sender<(FrameIndex, Picture)>, Receiver<(FrameIndex, Picture)>)>,
    progress: Option<ProgressFn>,
}

impl<E: Encoder> std::fmt::Debug for VideoBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("VideoBuilder")
            .field("opts", &self.opts)
            .field("next", &st.next)
            .field("pending", &st.pending.len())
            .finish()
    }
}

impl<E: Encoder> VideoBuilder<E> {
    /// Wrap an initialized encoder.
    pub fn new(encoder: E, mut opts: VideoBuilderOpts) -> FramecutResult<Self> {
        if opts.width == 0 || opts.height == 0 {
            return Err(FramecutError::validation(format!(
                "writer size must be non-zero, got {}x{}",
                opts.width, opts.height
            )));
        }
        if opts.preview_every > 0 {
            opts.preview_every = opts.preview_every.max(MIN_PREVIEW_INTERVAL);
        }
        let preview = (opts.preview_every > 0).then(|| crossbeam_channel::bounded(1));
        Ok(Self {
            opts,
            encoder: Mutex::new(encoder),
            state: Mutex::new(WriterState::default()),
            ready: Condvar::new(),
            preview,
            progress: None,
        })
    }

    /// Called with `written / duration` after every written frame.
    pub fn with_progress(mut self, f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn opts(&self) -> &VideoBuilderOpts {
        &self.opts
    }

    /// Preview side channel. Previews are dropped while the receiver is behind.
    pub fn preview_receiver(&self) -> Option<Receiver<(FrameIndex, Picture)>> {
        self.preview.as_ref().map(|(_, rx)| rx.clone())
    }

    /// Accept frame `index`.
    ///
    /// A duplicate index, or one at or beyond the declared duration, is an error in strict mode
    /// and is dropped with a warning otherwise. A frame whose size differs from the output size
    /// is always rejected.
    pub fn append(&self, index: u64, frame: Picture) -> FramecutResult<()> {
        {
            let mut st = self.state.lock();
            if let Some(msg) = st.failure.as_ref() {
                return Err(FramecutError::evaluation(format!("writer stopped: {msg}")));
            }
            if st.finished {
                return Err(FramecutError::evaluation("writer is already finished"));
            }
            if index >= self.opts.duration {
                if self.opts.strict_mode {
                    return Err(FramecutError::FrameBeyondDuration {
                        index,
                        duration: self.opts.duration,
                    });
                }
                tracing::warn!(index, duration = self.opts.duration, "frame beyond duration, dropped");
                return Ok(());
            }
            if st.status.contains_key(&index) {
                if self.opts.strict_mode {
                    return Err(FramecutError::DuplicateFrame { index });
                }
                tracing::warn!(index, "frame already appended, dropped");
                return Ok(());
            }
            let expected = (self.opts.width, self.opts.height);
            if frame.size() != expected {
                return Err(FramecutError::size_mismatch(frame.size(), expected));
            }
            st.status.insert(index, FrameStatus::Pending);

            if let Some((tx, _)) = self.preview.as_ref() {
                st.since_preview += 1;
                if st.since_preview >= self.opts.preview_every {
                    st.since_preview = 0;
                    let _ = tx.try_send((FrameIndex(index), frame.deep_copy()));
                }
            }
            st.pending.insert(index, frame);
        }

        if self.opts.block_write {
            self.drain_ready()?;
        } else {
            self.ready.notify_all();
        }
        Ok(())
    }

    /// `true` once `index` has been accepted, written or not.
    pub fn contains(&self, index: u64) -> bool {
        self.state.lock().status.contains_key(&index)
    }

    pub fn status(&self, index: u64) -> Option<FrameStatus> {
        self.state.lock().status.get(&index).copied()
    }

    /// Next index the encoder expects.
    pub fn next_index(&self) -> u64 {
        self.state.lock().next
    }

    pub fn written_count(&self) -> u64 {
        self.state.lock().next
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Message of the encoder error that stopped the writer, if any.
    pub fn failure(&self) -> Option<String> {
        self.state.lock().failure.clone()
    }

    /// Writer thread body: write contiguous frames until [`stop`](Self::stop) is called.
    pub fn run_writer(&self) -> FramecutResult<()> {
        self.state.lock().writer_running = true;
        tracing::debug!(duration = self.opts.duration, "writer started");
        let res = loop {
            if let Err(e) = self.drain_ready() {
                break Err(e);
            }
            let mut st = self.state.lock();
            if st.pending.contains_key(&st.next) {
                continue;
            }
            if st.closing {
                break Ok(());
            }
            self.ready.wait_for(&mut st, WRITER_POLL);
        };
        let mut st = self.state.lock();
        st.writer_running = false;
        if let Err(e) = res.as_ref() {
            st.failure = Some(e.to_string());
        }
        drop(st);
        self.ready.notify_all();
        res
    }

    /// Ask the writer thread to return once nothing contiguous is left.
    pub fn stop(&self) {
        self.state.lock().closing = true;
        self.ready.notify_all();
    }

    /// Stop accepting frames, write everything left and fill every gap below `total_frames`
    /// (or below the highest pending index) by calling `regenerator`, then finish the encoder.
    #[tracing::instrument(level = "debug", skip(self, regenerator))]
    pub fn finish(
        &self,
        regenerator: &mut dyn FnMut(FrameIndex) -> FramecutResult<Picture>,
        total_frames: u64,
    ) -> FramecutResult<()> {
        {
            let mut st = self.state.lock();
            st.closing = true;
            st.finished = true;
            self.ready.notify_all();
            while st.writer_running {
                self.ready.wait_for(&mut st, WRITER_POLL);
            }
            if let Some(msg) = st.failure.as_ref() {
                return Err(FramecutError::evaluation(format!("writer stopped: {msg}")));
            }
        }

        let total = total_frames.min(self.opts.duration);
        loop {
            self.drain_ready()?;
            let (next, end, pending) = {
                let st = self.state.lock();
                let last_pending = st.pending.keys().next_back().map_or(0, |k| k + 1);
                (st.next, total.max(last_pending), st.pending.len())
            };
            if next >= end && pending == 0 {
                break;
            }

            let missing: Vec<u64> = {
                let st = self.state.lock();
                (next..end.min(next + GAP_LOOKAHEAD))
                    .take_while(|i| !st.pending.contains_key(i))
                    .collect()
            };
            if let (Some(first), Some(last)) = (missing.first(), missing.last()) {
                tracing::warn!(
                    first,
                    last,
                    count = missing.len(),
                    "frames not found, regenerating"
                );
            }
            for index in missing {
                let frame = regenerator(FrameIndex(index))?;
                self.state.lock().status.insert(index, FrameStatus::Pending);
                self.write_locked(&mut self.encoder.lock(), index, frame)?;
            }
        }

        self.encoder.lock().finish()?;
        tracing::debug!(written = self.written_count(), "writer finished");
        Ok(())
    }

    /// Stop accepting frames, write what is contiguous, drop the rest and finish the encoder.
    /// Used for cancelled passes; returns the number of dropped frames.
    pub fn close(&self) -> FramecutResult<usize> {
        {
            let mut st = self.state.lock();
            st.closing = true;
            st.finished = true;
            self.ready.notify_all();
            while st.writer_running {
                self.ready.wait_for(&mut st, WRITER_POLL);
            }
        }
        self.drain_ready()?;
        let dropped = {
            let mut st = self.state.lock();
            let n = st.pending.len();
            st.pending.clear();
            n
        };
        if dropped > 0 {
            tracing::warn!(dropped, written = self.written_count(), "writer closed with frames after a gap");
        }
        self.encoder.lock().finish()?;
        Ok(dropped)
    }

    /// Give the encoder back, e.g. to inspect an in-memory encoder after `finish`.
    pub fn into_encoder(self) -> E {
        self.encoder.into_inner()
    }

    fn drain_ready(&self) -> FramecutResult<()> {
        // Holding the encoder lock for the whole drain keeps concurrent drains from interleaving.
        let mut enc = self.encoder.lock();
        loop {
            let (index, frame) = {
                let mut st = self.state.lock();
                let next = st.next;
                match st.pending.remove(&next) {
                    Some(frame) => (next, frame),
                    None => return Ok(()),
                }
            };
            self.write_locked(&mut enc, index, frame)?;
        }
    }

    fn write_locked(&self, enc: &mut E, index: u64, frame: Picture) -> FramecutResult<()> {
        let expected = (self.opts.width, self.opts.height);
        if frame.size() != expected {
            return Err(FramecutError::size_mismatch(frame.size(), expected));
        }
        enc.append(&frame)?;
        let written = {
            let mut st = self.state.lock();
            st.status.insert(index, FrameStatus::Written);
            st.next = index + 1;
            st.next
        };
        tracing::trace!(index, "frame written");
        if let Some(progress) = self.progress.as_ref()
            && self.opts.duration > 0
        {
            progress(written as f64 / self.opts.duration as f64);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/builder.rs"]
mod tests;
