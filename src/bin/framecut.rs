use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use framecut::{
    BitDepth, ComputeBackendKind, DiagnosticsReport, EffectRegistry, Encoder, EncoderConfig,
    FfmpegEncoder, FfmpegEncoderOpts, Fps, FrameIndex, PngSequenceEncoder, Project, Renderer,
    RendererOpts,
    encode::{AudioInput, encode_audio_file},
};
use tracing_subscriber::EnvFilter;

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u16 = 2;

#[derive(Parser, Debug)]
#[command(name = "framecut", version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a project to a video file, a PNG sequence or an audio file.
    Render(RenderArgs),
    /// Render a single timeline frame as a 16-bit PNG.
    Frame(FrameArgs),
    /// Print clips that overlap on the same layer.
    Overlaps(OverlapsArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Input project JSON.
    #[arg(long)]
    project: PathBuf,

    /// Output file, or output directory for `--save-mode png16`.
    #[arg(long)]
    output: PathBuf,

    /// Override the project width.
    #[arg(long)]
    width: Option<u32>,

    /// Override the project height.
    #[arg(long)]
    height: Option<u32>,

    /// Override the project frame rate (integer frames per second).
    #[arg(long)]
    fps: Option<u32>,

    /// Timeline frames to render as `start-end`, end exclusive.
    #[arg(long, value_parser = parse_range)]
    range: Option<(u64, u64)>,

    /// Concurrent frame budget; defaults to 1.75 x logical cores.
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, value_enum, default_value_t = BackendChoice::Auto)]
    backend: BackendChoice,

    /// Fail on duplicate or out-of-range frames (default).
    #[arg(long, overrides_with = "no_strict")]
    strict: bool,

    /// Drop duplicate or out-of-range frames with a warning.
    #[arg(long, overrides_with = "strict")]
    no_strict: bool,

    /// Render one frame at a time on a single thread.
    #[arg(long)]
    block_write: bool,

    /// Bits per channel of the rendered frames.
    #[arg(long, default_value_t = 16, value_parser = parse_bits)]
    bits: u8,

    #[arg(long, value_enum, default_value_t = Target::All)]
    target: Target,

    #[arg(long, value_enum, default_value_t = SaveMode::Video)]
    save_mode: SaveMode,

    /// Write per-step timings to this CSV file.
    #[arg(long)]
    diagnostics: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FrameArgs {
    #[arg(long)]
    project: PathBuf,

    /// Timeline frame index (0-based).
    #[arg(long)]
    frame: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, value_enum, default_value_t = BackendChoice::Auto)]
    backend: BackendChoice,
}

#[derive(Args, Debug)]
struct OverlapsArgs {
    #[arg(long)]
    project: PathBuf,

    /// Overlap in frames tolerated between neighbouring clips.
    #[arg(long, default_value_t = 5)]
    allowed: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Auto,
    Cpu,
    CpuParallel,
    Gpu,
}

impl From<BackendChoice> for ComputeBackendKind {
    fn from(c: BackendChoice) -> Self {
        match c {
            BackendChoice::Auto => Self::Auto,
            BackendChoice::Cpu => Self::Cpu,
            BackendChoice::CpuParallel => Self::CpuParallel,
            BackendChoice::Gpu => Self::Gpu,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Target {
    Video,
    Audio,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SaveMode {
    Video,
    Png16,
}

/// A failed command, tagged with its exit status.
#[derive(Debug)]
enum Failure {
    /// Output options cannot be honoured.
    Output(anyhow::Error),
    /// The requested compute backend is missing.
    Backend(anyhow::Error),
    /// Project data or the render itself failed.
    Render(anyhow::Error),
}

impl Failure {
    fn code(&self) -> u8 {
        match self {
            Self::Output(_) => 1,
            Self::Backend(_) => 2,
            Self::Render(_) => 3,
        }
    }

    fn error(&self) -> &anyhow::Error {
        match self {
            Self::Output(e) | Self::Backend(e) | Self::Render(e) => e,
        }
    }
}

impl From<anyhow::Error> for Failure {
    fn from(e: anyhow::Error) -> Self {
        Self::Render(e)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let res = match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Overlaps(args) => cmd_overlaps(args),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(f) => {
            tracing::error!("{:#}", f.error());
            eprintln!("error: {:#}", f.error());
            ExitCode::from(f.code())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_range(s: &str) -> Result<(u64, u64), String> {
    let (a, b) = s
        .split_once('-')
        .ok_or_else(|| format!("expected start-end, got '{s}'"))?;
    let start: u64 = a.trim().parse().map_err(|e| format!("range start: {e}"))?;
    let end: u64 = b.trim().parse().map_err(|e| format!("range end: {e}"))?;
    if end <= start {
        return Err(format!("range end must be after start, got {start}-{end}"));
    }
    Ok((start, end))
}

fn parse_bits(s: &str) -> Result<u8, String> {
    match s {
        "8" => Ok(8),
        "16" => Ok(16),
        other => Err(format!("expected 8 or 16, got '{other}'")),
    }
}

fn load_project(path: &Path) -> Result<Project, Failure> {
    let project = Project::from_path(path)
        .with_context(|| format!("load project '{}'", path.display()))?;
    project
        .validate(&EffectRegistry::new())
        .with_context(|| format!("validate project '{}'", path.display()))?;
    Ok(project)
}

/// Removes the file on drop.
struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn temp_audio_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "framecut".to_string());
    std::env::temp_dir().join(format!(
        "{stem}.{}.{}.f32le",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

fn cmd_render(args: RenderArgs) -> Result<(), Failure> {
    let mut project = load_project(&args.project)?;
    if let Some(w) = args.width {
        project.width = w;
    }
    if let Some(h) = args.height {
        project.height = h;
    }
    if let Some(fps) = args.fps {
        project.fps = Fps::integer(fps).map_err(|e| Failure::Output(e.into()))?;
    }
    project
        .canvas()
        .context("output size")
        .map_err(Failure::Output)?;
    if args.save_mode == SaveMode::Png16 && args.target == Target::Audio {
        return Err(Failure::Output(anyhow::anyhow!(
            "--save-mode png16 cannot write an audio-only target"
        )));
    }

    let kind = ComputeBackendKind::from(args.backend);
    framecut::create_backend(kind)
        .with_context(|| format!("compute backend {:?}", args.backend))
        .map_err(Failure::Backend)?;

    let clips = project.build_clips().context("build clips")?;
    let registry = Arc::new(EffectRegistry::new());
    let mut opts = RendererOpts {
        compute_backend: kind,
        block_write: args.block_write,
        strict_mode: args.strict || !args.no_strict,
        use_16bit: args.bits == 16,
        duration: project.duration,
        ..RendererOpts::default()
    };
    if let Some((start, end)) = args.range {
        opts.start_frame = start;
        opts.duration = Some(end - start);
    }
    if let Some(n) = args.threads {
        opts.max_threads = n.max(1);
    }

    let diagnostics = args.diagnostics.as_ref().map(|_| Arc::new(DiagnosticsReport::new()));
    let mut renderer = Renderer::new(clips, project.width, project.height, opts)
        .context("create renderer")
        .map_err(Failure::Backend)?
        .with_registry(registry);
    if let Some(report) = diagnostics.as_ref() {
        renderer = renderer.with_diagnostics(report.clone());
    }
    let range = renderer.range().context("resolve render range")?;
    tracing::info!(
        start = range.start.0,
        end = range.end.0,
        backend = renderer.backend_name(),
        "rendering {}",
        project.name
    );

    let mut audio_guard = TempFileGuard(None);
    let mut audio_input = None;
    if args.target != Target::Video {
        let composer = project
            .audio_composer(AUDIO_SAMPLE_RATE, AUDIO_CHANNELS)
            .with_total_frames(range.end.0);
        let buffer = composer
            .compose(renderer.clips(), &project.sound_tracks)
            .context("compose audio")?;
        let skip = project.fps.frames_to_samples(range.start.0, AUDIO_SAMPLE_RATE) as usize;
        let buffer = buffer.slice(skip, None);

        let tmp = temp_audio_path(&args.output);
        audio_guard.0 = Some(tmp.clone());
        buffer
            .write_f32le(&tmp)
            .with_context(|| format!("write temp audio '{}'", tmp.display()))?;

        if args.target == Target::Audio {
            encode_audio_file(&tmp, AUDIO_SAMPLE_RATE, AUDIO_CHANNELS, &args.output)
                .with_context(|| format!("encode audio '{}'", args.output.display()))?;
            eprintln!("wrote {}", args.output.display());
            return Ok(());
        }
        audio_input = Some(AudioInput {
            path: tmp,
            sample_rate: AUDIO_SAMPLE_RATE,
            channels: AUDIO_CHANNELS,
        });
    }

    let depth = if args.bits == 16 {
        BitDepth::Sixteen
    } else {
        BitDepth::Eight
    };
    let mut cfg =
        EncoderConfig::new(project.width, project.height, project.fps).with_bit_depth(depth);
    let mut encoder: Box<dyn Encoder> = match args.save_mode {
        SaveMode::Video => {
            if let Some(audio) = audio_input {
                cfg = cfg.with_audio(audio);
            }
            Box::new(FfmpegEncoder::new(FfmpegEncoderOpts::new(&args.output)))
        }
        SaveMode::Png16 => {
            if audio_input.is_some() {
                tracing::warn!("png16 sequences carry no audio, soundtrack skipped");
            }
            Box::new(PngSequenceEncoder::new(&args.output))
        }
    };
    encoder
        .initialize(cfg)
        .with_context(|| format!("open output '{}'", args.output.display()))
        .map_err(Failure::Output)?;

    let stats = renderer
        .render(encoder.as_mut())
        .with_context(|| format!("render '{}'", args.project.display()))?;
    tracing::info!(
        rendered = stats.frames_rendered,
        blank = stats.frames_blank,
        regenerated = stats.frames_regenerated,
        watchdog_trips = stats.watchdog_trips,
        "render finished"
    );

    if let (Some(path), Some(report)) = (args.diagnostics.as_ref(), diagnostics.as_ref()) {
        report
            .save_csv(path)
            .with_context(|| format!("write diagnostics '{}'", path.display()))?;
        eprintln!("wrote {}", path.display());
    }
    drop(audio_guard);
    eprintln!("wrote {}", args.output.display());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> Result<(), Failure> {
    let project = load_project(&args.project)?;
    let clips = project.build_clips().context("build clips")?;
    let opts = RendererOpts {
        compute_backend: args.backend.into(),
        log_stats: false,
        ..RendererOpts::default()
    };
    let renderer = Renderer::new(clips, project.width, project.height, opts)
        .context("create renderer")
        .map_err(Failure::Backend)?;

    let frame = renderer
        .render_frame(FrameIndex(args.frame))
        .with_context(|| format!("render frame {}", args.frame))?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))
            .map_err(Failure::Output)?;
    }
    frame
        .to_bit_depth(BitDepth::Sixteen)
        .save_png(&args.out)
        .with_context(|| format!("write png '{}'", args.out.display()))
        .map_err(Failure::Output)?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_overlaps(args: OverlapsArgs) -> Result<(), Failure> {
    let project = load_project(&args.project)?;
    let overlaps = framecut::find_overlaps(project.clip_infos(), args.allowed);
    if overlaps.is_empty() {
        println!("no overlaps");
    }
    for o in &overlaps {
        println!("{o}");
    }
    Ok(())
}
