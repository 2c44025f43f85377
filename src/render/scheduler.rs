use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, TryRecvError};
use parking_lot::Mutex;

use crate::clip::Clip;
use crate::compute::{ComputeBackend, ComputeBackendKind, create_backend};
use crate::effects::EffectRegistry;
use crate::encode::{Encoder, VideoBuilder, VideoBuilderOpts};
use crate::foundation::core::{FrameIndex, FrameRange};
use crate::foundation::error::{FrameFailure, FramecutError, FramecutResult};
use crate::picture::{BitDepth, Picture};
use crate::render::cancel::CancellationToken;
use crate::render::context::RenderContext;
use crate::render::diagnostics::DiagnosticsReport;
use crate::timeline::{LayerFrame, check_layers, clips_at, compose_frame, mixture_layers};

const PREPARER_SEND_POLL: Duration = Duration::from_millis(50);

/// Options controlling a render pass.
#[derive(Clone, Debug)]
pub struct RendererOpts {
    /// First timeline frame of the pass.
    pub start_frame: u64,
    /// Frames to render. `None` renders up to the end of the last bounded clip.
    pub duration: Option<u64>,
    /// Concurrent frame budget.
    pub max_threads: usize,
    /// Compose in 16-bit (`true`) or 8-bit colour.
    pub use_16bit: bool,
    /// Render one frame at a time and write on the rendering thread.
    pub block_write: bool,
    /// Fail on duplicate or out-of-range writer indices instead of dropping them.
    pub strict_mode: bool,
    /// Periodically log prepared/rendered/written progress.
    pub log_stats: bool,
    pub stats_interval: Duration,
    /// Time without a finished frame after which prepared frames are force-started.
    pub watchdog_timeout: Duration,
    /// Upper bound of concurrent workers while the watchdog overcommits. `None` is
    /// `2 * max_threads`.
    pub watchdog_ceiling: Option<usize>,
    /// New workers start only while `working * throttle_ratio < max_threads`.
    pub throttle_ratio: f64,
    /// Scheduler sleep when nothing can be started.
    pub idle_sleep: Duration,
    /// Prepared frames buffered ahead of the workers. `None` is `4 * max_threads`.
    pub prepare_ahead: Option<usize>,
    pub compute_backend: ComputeBackendKind,
    /// Opaque colour behind every frame (16-bit components).
    pub fallback_background: [u16; 3],
    /// Emit a preview of every Nth written frame; 0 disables previews.
    pub preview_every: u64,
}

impl Default for RendererOpts {
    fn default() -> Self {
        Self {
            start_frame: 0,
            duration: None,
            max_threads: default_max_threads(),
            use_16bit: true,
            block_write: false,
            strict_mode: true,
            log_stats: true,
            stats_interval: Duration::from_secs(10),
            watchdog_timeout: Duration::from_secs(60),
            watchdog_ceiling: None,
            throttle_ratio: 0.65,
            idle_sleep: Duration::from_millis(10),
            prepare_ahead: None,
            compute_backend: ComputeBackendKind::Auto,
            fallback_background: [0, 0, 0],
            preview_every: 0,
        }
    }
}

/// `floor(logical cores * 1.75)`, at least 1.
pub fn default_max_threads() -> usize {
    ((num_cpus::get() as f64 * 1.75).floor() as usize).max(1)
}

impl RendererOpts {
    fn effective_max_threads(&self) -> usize {
        if self.block_write {
            1
        } else {
            self.max_threads.max(1)
        }
    }

    fn effective_ceiling(&self) -> usize {
        let max = self.effective_max_threads();
        if self.block_write {
            return 1;
        }
        self.watchdog_ceiling.unwrap_or(max * 2).max(max)
    }

    fn bit_depth(&self) -> BitDepth {
        if self.use_16bit {
            BitDepth::Sixteen
        } else {
            BitDepth::Eight
        }
    }
}

/// Lifecycle of a render pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PassState {
    #[default]
    Idle,
    Preparing,
    Running,
    Draining,
    Cancelled,
    Released,
}

/// Result of composing one frame inside a worker.
#[derive(Debug)]
pub enum RenderOutcome {
    Success(Picture),
    Failed(FramecutError),
}

/// Counters of a finished pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames in the rendered range.
    pub frames_total: u64,
    /// Frames composed by workers.
    pub frames_rendered: u64,
    /// Frames no drawable clip occupies.
    pub frames_blank: u64,
    /// Frames replaced by a blank placeholder after a failure.
    pub frames_failed: u64,
    /// Clip pictures missing from the prepared cache plus writer gaps, rendered again.
    pub frames_regenerated: u64,
    pub watchdog_trips: u64,
}

/// Which clips occupy each frame of a pass, and which frames are structurally blank.
#[derive(Clone, Debug)]
pub struct PassPlan {
    pub range: FrameRange,
    /// Timeline frame to the drawable clips occupying it, ascending by layer.
    pub frames: BTreeMap<u64, Vec<Arc<Clip>>>,
    /// Timeline frames without any drawable clip, ascending.
    pub blanks: Vec<u64>,
}

impl PassPlan {
    pub fn len(&self) -> u64 {
        self.range.len_frames()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;
type PreviewFn = Arc<dyn Fn(FrameIndex, &Picture) + Send + Sync>;

/// Frame scheduler.
///
/// A pass runs one preparer thread that decodes clip pictures in ascending frame order, a fixed
/// pool of workers that compose frames in any order, and a writer that releases them to the
/// encoder strictly in order. A frame that fails is replaced by a blank frame so the output
/// never has a gap; all failures are reported together once the pass is done.
pub struct Renderer {
    clips: Vec<Arc<Clip>>,
    width: u32,
    height: u32,
    opts: RendererOpts,
    backend: Arc<dyn ComputeBackend>,
    registry: Arc<EffectRegistry>,
    cancel: CancellationToken,
    state: Mutex<PassState>,
    diagnostics: Option<Arc<DiagnosticsReport>>,
    on_progress: Option<ProgressFn>,
    on_preview: Option<PreviewFn>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("clips", &self.clips.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("opts", &self.opts)
            .field("backend", &self.backend.name())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Renderer {
    /// Create a renderer for `clips` at `width`x`height`. Fails when the requested compute
    /// backend is unavailable.
    pub fn new(
        clips: Vec<Arc<Clip>>,
        width: u32,
        height: u32,
        opts: RendererOpts,
    ) -> FramecutResult<Self> {
        if width == 0 || height == 0 {
            return Err(FramecutError::validation(format!(
                "render size must be non-zero, got {width}x{height}"
            )));
        }
        if opts.throttle_ratio.is_nan() || opts.throttle_ratio <= 0.0 {
            return Err(FramecutError::validation("throttle_ratio must be positive"));
        }
        let backend = create_backend(opts.compute_backend)?;
        Ok(Self {
            clips,
            width,
            height,
            opts,
            backend,
            registry: Arc::new(EffectRegistry::new()),
            cancel: CancellationToken::new(),
            state: Mutex::new(PassState::Idle),
            diagnostics: None,
            on_progress: None,
            on_preview: None,
        })
    }

    pub fn with_registry(mut self, registry: Arc<EffectRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Collect per-step timings of every composed frame into `report`.
    pub fn with_diagnostics(mut self, report: Arc<DiagnosticsReport>) -> Self {
        self.diagnostics = Some(report);
        self
    }

    /// Called with `written / total` after every written frame.
    pub fn on_progress(mut self, f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Called with a copy of every Nth written frame (see [`RendererOpts::preview_every`]).
    pub fn on_preview(mut self, f: impl Fn(FrameIndex, &Picture) + Send + Sync + 'static) -> Self {
        self.on_preview = Some(Arc::new(f));
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> PassState {
        *self.state.lock()
    }

    pub fn opts(&self) -> &RendererOpts {
        &self.opts
    }

    pub fn clips(&self) -> &[Arc<Clip>] {
        &self.clips
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Timeline range of a pass.
    pub fn range(&self) -> FramecutResult<FrameRange> {
        let len = match self.opts.duration {
            Some(d) => d,
            None => {
                let end = self
                    .clips
                    .iter()
                    .filter_map(|c| c.info().end_frame())
                    .max()
                    .ok_or_else(|| {
                        FramecutError::validation(
                            "render duration is required when no clip has a bounded length",
                        )
                    })?;
                end.saturating_sub(self.opts.start_frame)
            }
        };
        Ok(FrameRange::from_len(self.opts.start_frame, len))
    }

    fn new_context(&self) -> RenderContext {
        let ctx = RenderContext::new(Arc::clone(&self.backend), Arc::clone(&self.registry))
            .with_bit_depth(self.opts.bit_depth())
            .with_fallback(self.opts.fallback_background);
        match self.diagnostics.as_ref() {
            Some(d) => ctx.with_diagnostics(Arc::clone(d)),
            None => ctx,
        }
    }

    fn set_state(&self, state: PassState) {
        let mut st = self.state.lock();
        tracing::debug!(from = ?*st, to = ?state, "pass state");
        *st = state;
    }

    /// Compose a single timeline frame outside of a pass.
    pub fn render_frame(&self, frame: FrameIndex) -> FramecutResult<Picture> {
        let ctx = self.new_context();
        compose_frame(&ctx, &self.clips, frame, self.width, self.height)
    }

    /// Scan the range once: record the clips occupying every frame, collect blank frames and
    /// instantiate each clip's effects for the pass. Layer conflicts are left to the compositor.
    #[tracing::instrument(level = "debug", skip(self, ctx))]
    pub fn prepare(&self, ctx: &RenderContext) -> FramecutResult<PassPlan> {
        let range = self.range()?;
        let mut frames = BTreeMap::new();
        let mut blanks = Vec::new();
        let mut used: HashSet<String> = HashSet::new();
        for (n, f) in range.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(FramecutError::Cancelled);
            }
            let occupying = clips_at(&self.clips, f);
            if occupying.is_empty() {
                blanks.push(f.0);
            } else {
                used.extend(occupying.iter().map(|c| c.id().to_string()));
                frames.insert(f.0, occupying);
            }
            if n % 50 == 0 {
                tracing::trace!(frame = f.0, total = range.len_frames(), "prepare scan");
            }
        }
        for clip in self.clips.iter().filter(|c| used.contains(c.id())) {
            ctx.effects_for(clip)?;
        }
        tracing::debug!(
            frames = range.len_frames(),
            blank = blanks.len(),
            effect_sets = ctx.cached_effect_sets(),
            "pass prepared"
        );
        Ok(PassPlan {
            range,
            frames,
            blanks,
        })
    }

    /// Render the whole range into `encoder`, which must already be initialized for
    /// `width`x`height`.
    #[tracing::instrument(level = "info", skip(self, encoder), fields(backend = self.backend.name()))]
    pub fn render(&self, encoder: &mut dyn Encoder) -> FramecutResult<RenderStats> {
        let ctx = self.new_context();
        self.set_state(PassState::Preparing);
        let plan = match self.prepare(&ctx) {
            Ok(plan) => plan,
            Err(e) => {
                self.release(&ctx, None);
                return Err(e);
            }
        };

        let mut wopts = VideoBuilderOpts::new(self.width, self.height, plan.len());
        wopts.strict_mode = self.opts.strict_mode;
        wopts.block_write = self.opts.block_write;
        wopts.preview_every = self.opts.preview_every;
        let mut builder = VideoBuilder::new(encoder, wopts)?;
        if let Some(progress) = self.on_progress.clone() {
            builder = builder.with_progress(move |p| progress(p));
        }

        self.set_state(PassState::Running);
        let pass = Pass {
            renderer: self,
            ctx: &ctx,
            plan: &plan,
            builder: &builder,
            shared: Shared::new(),
        };
        let res = pass.run();
        self.release(&ctx, Some(&pass.shared));
        res
    }

    fn release(&self, ctx: &RenderContext, shared: Option<&Shared>) {
        if let Some(shared) = shared {
            let mut cache = shared.cache.lock();
            if !cache.is_empty() {
                tracing::debug!(unconsumed = cache.len(), "dropping unconsumed prepared pictures");
            }
            cache.clear();
        }
        ctx.release();
        for clip in &self.clips {
            clip.release();
        }
        self.set_state(PassState::Released);
    }
}

/// State shared by the scheduler, the preparer and the workers of one pass.
struct Shared {
    cache: Mutex<HashMap<(String, u64), Picture>>,
    working: AtomicUsize,
    finished: AtomicU64,
    prepared: AtomicU64,
    preparer_done: AtomicBool,
    stop: AtomicBool,
    last_finished: Mutex<Instant>,
    failures: Mutex<Vec<FrameFailure>>,
    pass_error: Mutex<Option<FramecutError>>,
    rendered: AtomicU64,
    blank: AtomicU64,
    failed: AtomicU64,
    regenerated: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            working: AtomicUsize::new(0),
            finished: AtomicU64::new(0),
            prepared: AtomicU64::new(0),
            preparer_done: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            last_finished: Mutex::new(Instant::now()),
            failures: Mutex::new(Vec::new()),
            pass_error: Mutex::new(None),
            rendered: AtomicU64::new(0),
            blank: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            regenerated: AtomicU64::new(0),
        }
    }

    fn record_failure(&self, index: u64, err: &FramecutError) {
        self.failures.lock().push(FrameFailure {
            index,
            message: err.to_string(),
        });
    }

    /// Keep the first pass-level error and ask every thread to stop.
    fn abort(&self, err: FramecutError) {
        let mut slot = self.pass_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.stop.store(true, Ordering::Release);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

struct Pass<'a, E: Encoder> {
    renderer: &'a Renderer,
    ctx: &'a RenderContext,
    plan: &'a PassPlan,
    builder: &'a VideoBuilder<E>,
    shared: Shared,
}

impl<E: Encoder> Pass<'_, E> {
    fn run(&self) -> FramecutResult<RenderStats> {
        let opts = &self.renderer.opts;
        let max_threads = opts.effective_max_threads();
        let ceiling = opts.effective_ceiling();
        let ahead = opts.prepare_ahead.unwrap_or(max_threads * 4).max(1);
        let mut stats = RenderStats {
            frames_total: self.plan.len(),
            ..RenderStats::default()
        };
        tracing::info!(
            frames = stats.frames_total,
            start = self.plan.range.start.0,
            max_threads,
            ceiling,
            block_write = opts.block_write,
            "render pass started"
        );

        let mut cancelled = false;
        std::thread::scope(|scope| {
            let (prep_tx, prep_rx) = crossbeam_channel::bounded::<u64>(ahead);
            let (job_tx, job_rx) = crossbeam_channel::unbounded::<u64>();
            let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

            let preparer = scope.spawn(move || self.prepare_source(prep_tx));
            let writer = (!opts.block_write).then(|| scope.spawn(|| self.builder.run_writer()));
            let workers: Vec<_> = (0..ceiling)
                .map(|_| {
                    let rx = job_rx.clone();
                    scope.spawn(move || {
                        for frame in rx.iter() {
                            // Queued frames are dropped once the pass is cancelled.
                            if self.renderer.cancel.is_cancelled() {
                                self.shared.working.fetch_sub(1, Ordering::AcqRel);
                                continue;
                            }
                            self.work(frame);
                        }
                    })
                })
                .collect();
            drop(job_rx);
            if opts.log_stats {
                let rx = done_rx.clone();
                scope.spawn(move || self.log_stats(rx));
            }
            if let (Some(cb), Some(rx)) =
                (self.renderer.on_preview.clone(), self.builder.preview_receiver())
            {
                let done = done_rx.clone();
                scope.spawn(move || {
                    loop {
                        crossbeam_channel::select! {
                            recv(rx) -> msg => match msg {
                                Ok((idx, pic)) => cb(idx, &pic),
                                Err(_) => break,
                            },
                            recv(done) -> _ => break,
                        }
                    }
                });
            }
            drop(done_rx);

            cancelled = self.dispatch(&prep_rx, &job_tx, max_threads, ceiling, &mut stats);

            self.shared.stop.store(true, Ordering::Release);
            drop(job_tx);
            drop(prep_rx);
            for w in workers {
                if w.join().is_err() {
                    self.shared
                        .abort(FramecutError::evaluation("render worker panicked"));
                }
            }
            if preparer.join().is_err() {
                self.shared
                    .abort(FramecutError::evaluation("frame preparer panicked"));
            }
            self.builder.stop();
            if let Some(w) = writer {
                match w.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => self.shared.abort(e),
                    Err(_) => self.shared.abort(FramecutError::evaluation("writer thread panicked")),
                }
            }
            drop(done_tx);
        });

        if cancelled {
            self.renderer.set_state(PassState::Cancelled);
            let dropped = self.builder.close()?;
            tracing::warn!(
                written = self.builder.written_count(),
                dropped,
                "render pass cancelled"
            );
            return Err(FramecutError::Cancelled);
        }
        if let Some(err) = self.shared.pass_error.lock().take() {
            let _ = self.builder.close();
            return Err(err);
        }

        self.renderer.set_state(PassState::Draining);
        let mut regenerated = 0u64;
        self.builder.finish(
            &mut |out: FrameIndex| {
                regenerated += 1;
                let frame = FrameIndex(out.0 + self.plan.range.start.0);
                let renderer = self.renderer;
                match compose_frame(self.ctx, &renderer.clips, frame, renderer.width, renderer.height) {
                    Ok(p) => Ok(p),
                    Err(e) => {
                        tracing::warn!(frame = frame.0, "regeneration failed, writing blank frame: {e}");
                        self.shared.record_failure(frame.0, &e);
                        self.shared.failed.fetch_add(1, Ordering::Relaxed);
                        self.ctx.blank_frame(renderer.width, renderer.height)
                    }
                }
            },
            self.plan.len(),
        )?;

        stats.frames_rendered = self.shared.rendered.load(Ordering::Relaxed);
        stats.frames_blank = self.shared.blank.load(Ordering::Relaxed);
        stats.frames_failed = self.shared.failed.load(Ordering::Relaxed);
        stats.frames_regenerated = self.shared.regenerated.load(Ordering::Relaxed) + regenerated;

        let mut failures = std::mem::take(&mut *self.shared.failures.lock());
        if !failures.is_empty() {
            failures.sort_by_key(|f| f.index);
            tracing::error!(failed = failures.len(), "render pass finished with failed frames");
            return Err(FramecutError::FrameFailures(failures));
        }
        tracing::info!(?stats, "render pass finished");
        Ok(stats)
    }

    /// Scheduler loop. Returns `true` when the pass was cancelled.
    fn dispatch(
        &self,
        prep_rx: &Receiver<u64>,
        job_tx: &crossbeam_channel::Sender<u64>,
        max_threads: usize,
        ceiling: usize,
        stats: &mut RenderStats,
    ) -> bool {
        let opts = &self.renderer.opts;
        let mut blanks: VecDeque<u64> = self.plan.blanks.iter().copied().collect();
        let start_job = |frame: u64| {
            self.shared.working.fetch_add(1, Ordering::AcqRel);
            if job_tx.send(frame).is_err() {
                self.shared.working.fetch_sub(1, Ordering::AcqRel);
                self.shared
                    .abort(FramecutError::evaluation("render workers are not accepting frames"));
            }
        };

        loop {
            if self.renderer.cancel.is_cancelled() {
                return true;
            }
            if self.shared.stopped() {
                return false;
            }
            if let Some(msg) = self.builder.failure() {
                self.shared
                    .abort(FramecutError::evaluation(format!("writer stopped: {msg}")));
                return false;
            }

            let working = self.shared.working.load(Ordering::Acquire);
            let preparer_done = self.shared.preparer_done.load(Ordering::Acquire);
            if preparer_done && prep_rx.is_empty() && working == 0 {
                self.flush_blanks(&mut blanks, u64::MAX);
                return false;
            }

            let slots = max_threads.saturating_sub(working);
            if slots > 0 && (working as f64) * opts.throttle_ratio < max_threads as f64 {
                match prep_rx.try_recv() {
                    Ok(frame) => {
                        self.flush_blanks(&mut blanks, frame);
                        start_job(frame);
                        continue;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
                }
            }

            let stalled = self.shared.last_finished.lock().elapsed() >= opts.watchdog_timeout;
            if stalled && !prep_rx.is_empty() {
                stats.watchdog_trips += 1;
                tracing::warn!(
                    working,
                    slots,
                    prepared = prep_rx.len(),
                    ceiling,
                    no_available_slot = slots == 0,
                    "no frame finished for {:?}, force-starting prepared frames",
                    opts.watchdog_timeout
                );
                while self.shared.working.load(Ordering::Acquire) < ceiling {
                    match prep_rx.try_recv() {
                        Ok(frame) => {
                            self.flush_blanks(&mut blanks, frame);
                            start_job(frame);
                        }
                        Err(_) => break,
                    }
                }
                *self.shared.last_finished.lock() = Instant::now();
                continue;
            }

            std::thread::sleep(opts.idle_sleep);
        }
    }

    /// Write every queued blank frame below `before`.
    fn flush_blanks(&self, blanks: &mut VecDeque<u64>, before: u64) {
        while let Some(&frame) = blanks.front() {
            if frame >= before {
                break;
            }
            blanks.pop_front();
            let r = self.ctx.blank_frame(self.renderer.width, self.renderer.height);
            match r.and_then(|p| self.builder.append(self.out_index(frame), p)) {
                Ok(()) => {
                    self.shared.blank.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.shared.abort(e);
                    return;
                }
            }
        }
    }

    fn out_index(&self, frame: u64) -> u64 {
        frame - self.plan.range.start.0
    }

    /// Preparer thread body: decode clip pictures frame by frame in ascending order.
    fn prepare_source(&self, prep_tx: crossbeam_channel::Sender<u64>) {
        let (w, h) = (self.renderer.width, self.renderer.height);
        let depth = self.ctx.bit_depth();
        'frames: for (&frame, clips) in &self.plan.frames {
            if self.renderer.cancel.is_cancelled() || self.shared.stopped() {
                break;
            }
            for clip in clips {
                let decoded = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    clip.frame(FrameIndex(frame), w, h, false)
                }))
                .unwrap_or_else(|panic| {
                    Err(FramecutError::decode(format!(
                        "source panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
                match decoded {
                    Ok(Some(p)) => {
                        self.shared
                            .cache
                            .lock()
                            .insert((clip.id().to_string(), frame), p.to_bit_depth(depth));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            clip = %clip.label(),
                            frame,
                            "failed to prepare clip frame, the worker will retry: {e}"
                        );
                    }
                }
            }
            self.shared.prepared.fetch_add(1, Ordering::Relaxed);
            let mut item = frame;
            loop {
                match prep_tx.send_timeout(item, PREPARER_SEND_POLL) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(f)) => {
                        if self.renderer.cancel.is_cancelled() || self.shared.stopped() {
                            break 'frames;
                        }
                        item = f;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => break 'frames,
                }
            }
        }
        self.shared.preparer_done.store(true, Ordering::Release);
        tracing::debug!(
            prepared = self.shared.prepared.load(Ordering::Relaxed),
            "preparer finished"
        );
    }

    /// Worker body for one frame: compose, then write the picture or a blank placeholder.
    fn work(&self, frame: u64) {
        let out = self.out_index(frame);
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| self.compose(frame))) {
            Ok(Ok(p)) => RenderOutcome::Success(p),
            Ok(Err(e)) => RenderOutcome::Failed(e),
            Err(panic) => RenderOutcome::Failed(FramecutError::evaluation(format!(
                "worker panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        let written = match outcome {
            RenderOutcome::Success(p) => {
                self.shared.rendered.fetch_add(1, Ordering::Relaxed);
                self.builder.append(out, p)
            }
            RenderOutcome::Failed(e) => {
                tracing::warn!(frame, "frame failed, writing blank frame: {e}");
                self.shared.record_failure(frame, &e);
                self.shared.failed.fetch_add(1, Ordering::Relaxed);
                if self.builder.contains(out) {
                    Ok(())
                } else {
                    self.ctx
                        .blank_frame(self.renderer.width, self.renderer.height)
                        .and_then(|p| self.builder.append(out, p))
                }
            }
        };
        if let Err(e) = written {
            self.shared.abort(e);
        }

        self.shared.working.fetch_sub(1, Ordering::AcqRel);
        self.shared.finished.fetch_add(1, Ordering::AcqRel);
        *self.shared.last_finished.lock() = Instant::now();
    }

    fn compose(&self, frame: u64) -> FramecutResult<Picture> {
        let clips = self
            .plan
            .frames
            .get(&frame)
            .ok_or_else(|| FramecutError::evaluation(format!("frame {frame} was never planned")))?;
        let target = FrameIndex(frame);
        check_layers(clips, target)?;
        let (w, h) = (self.renderer.width, self.renderer.height);
        let mut layers = Vec::with_capacity(clips.len());
        for clip in clips {
            let cached = self
                .shared
                .cache
                .lock()
                .remove(&(clip.id().to_string(), frame));
            let picture = match cached {
                Some(p) => Some(p),
                None => {
                    tracing::warn!(clip = %clip.label(), frame, "clip frame not found in cache, regenerating");
                    self.shared.regenerated.fetch_add(1, Ordering::Relaxed);
                    clip.frame(target, w, h, false)?
                }
            };
            if let Some(picture) = picture {
                layers.push(LayerFrame {
                    clip: Arc::clone(clip),
                    picture,
                });
            }
        }
        mixture_layers(self.ctx, layers, target, w, h)
    }

    fn log_stats(&self, done: Receiver<()>) {
        let total = self.plan.len().max(1) as f64;
        let planned = self.plan.frames.len().max(1) as f64;
        loop {
            match done.recv_timeout(self.renderer.opts.stats_interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let prepared = self.shared.prepared.load(Ordering::Relaxed) as f64;
                    let finished = self.shared.finished.load(Ordering::Relaxed) as f64;
                    let written = self.builder.written_count() as f64;
                    tracing::info!(
                        prepared = %format!("{:.2}%", prepared / planned * 100.0),
                        rendered = %format!("{:.2}%", finished / planned * 100.0),
                        written = %format!("{:.2}%", written / total * 100.0),
                        pending = self.builder.pending_count(),
                        working = self.shared.working.load(Ordering::Relaxed),
                        "render progress"
                    );
                }
                _ => return,
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/scheduler.rs"]
mod tests;
