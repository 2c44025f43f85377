use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::Context;

use crate::encode::encoder::{Encoder, EncoderConfig};
use crate::foundation::core::Fps;
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::media::is_ffmpeg_on_path;
use crate::picture::{BitDepth, Picture};

/// Options for [`FfmpegEncoder`].
#[derive(Clone, Debug)]
pub struct FfmpegEncoderOpts {
    /// Output file path; the container follows the extension.
    pub out_path: PathBuf,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
    /// Video codec passed to `-c:v`.
    pub codec: String,
    /// Output pixel format passed to `-pix_fmt`.
    pub pix_fmt: String,
    /// Colour that translucent pixels are flattened onto (16-bit components).
    pub background: [u16; 3],
}

impl FfmpegEncoderOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            codec: "libx264".to_string(),
            pix_fmt: "yuv420p".to_string(),
            background: [0, 0, 0],
        }
    }

    pub fn with_codec(mut self, codec: impl Into<String>, pix_fmt: impl Into<String>) -> Self {
        self.codec = codec.into();
        self.pix_fmt = pix_fmt.into();
        self
    }
}

/// Streams raw frames into a system `ffmpeg` process over stdin.
///
/// 16-bit streams are sent as `rgba64le`, 8-bit streams as `rgba`. Audio, when configured, is
/// read by `ffmpeg` from an `f32le` file.
pub struct FfmpegEncoder {
    opts: FfmpegEncoderOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    cfg: Option<EncoderConfig>,
    frames: u64,
}

impl std::fmt::Debug for FfmpegEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEncoder")
            .field("opts", &self.opts)
            .field("running", &self.child.is_some())
            .field("frames", &self.frames)
            .finish()
    }
}

impl FfmpegEncoder {
    pub fn new(opts: FfmpegEncoderOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            cfg: None,
            frames: 0,
        }
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl Encoder for FfmpegEncoder {
    fn initialize(&mut self, cfg: EncoderConfig) -> FramecutResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(FramecutError::validation(
                "ffmpeg encoder width/height must be non-zero",
            ));
        }
        if self.opts.pix_fmt.starts_with("yuv420")
            && (!cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2))
        {
            return Err(FramecutError::validation(format!(
                "width/height must be even for {} output, got {}x{}",
                self.opts.pix_fmt, cfg.width, cfg.height
            )));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(FramecutError::validation(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(FramecutError::evaluation(
                "ffmpeg is required for video encoding, but was not found on PATH",
            ));
        }

        let input_fmt = match cfg.bit_depth {
            BitDepth::Eight => "rgba",
            BitDepth::Sixteen => "rgba64le",
        };
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if self.opts.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            input_fmt,
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
        ]);
        push_input_fps(&mut cmd, cfg.fps);
        cmd.args(["-i", "pipe:0"]);

        if let Some(audio) = cfg.audio.as_ref() {
            if audio.sample_rate == 0 || audio.channels == 0 {
                return Err(FramecutError::validation(
                    "audio sample_rate and channels must be non-zero when audio is enabled",
                ));
            }
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path)
            .args(["-c:a", "aac", "-shortest"]);
        } else {
            cmd.arg("-an");
        }
        cmd.args(["-c:v", &self.opts.codec, "-pix_fmt", &self.opts.pix_fmt]);
        if has_extension(&self.opts.out_path, "mp4") || has_extension(&self.opts.out_path, "mov") {
            cmd.args(["-movflags", "+faststart"]);
        }
        cmd.arg(&self.opts.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            FramecutError::evaluation(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FramecutError::evaluation("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FramecutError::evaluation("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        tracing::debug!(
            codec = %self.opts.codec,
            input = input_fmt,
            width = cfg.width,
            height = cfg.height,
            audio = cfg.audio.is_some(),
            "ffmpeg encoder started"
        );
        self.scratch = Vec::with_capacity(
            (cfg.width as usize) * (cfg.height as usize) * 4 * (cfg.bit_depth.bits() as usize / 8),
        );
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.frames = 0;
        Ok(())
    }

    fn append(&mut self, frame: &Picture) -> FramecutResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| FramecutError::evaluation("ffmpeg encoder not initialized"))?;
        cfg.check_frame(frame)?;

        self.scratch.clear();
        match cfg.bit_depth {
            BitDepth::Eight => flatten_rgba8(&mut self.scratch, frame, self.opts.background),
            BitDepth::Sixteen => flatten_rgba16le(&mut self.scratch, frame, self.opts.background),
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(FramecutError::evaluation("ffmpeg encoder is already finished"));
        };
        stdin.write_all(&self.scratch).map_err(|e| {
            FramecutError::evaluation(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> FramecutResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| FramecutError::evaluation("ffmpeg encoder not initialized"))?;
        let status = child.wait().map_err(|e| {
            FramecutError::evaluation(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = join_stderr(self.stderr_drain.take())?;
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(FramecutError::evaluation(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        tracing::debug!(frames = self.frames, out = %self.opts.out_path.display(), "ffmpeg encoder finished");
        self.cfg = None;
        Ok(())
    }

    fn codec_name(&self) -> &str {
        &self.opts.codec
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Encode an interleaved `f32le` PCM file into `out_path` (codec chosen by the extension).
pub fn encode_audio_file(
    pcm_path: &Path,
    sample_rate: u32,
    channels: u16,
    out_path: &Path,
) -> FramecutResult<()> {
    if !is_ffmpeg_on_path() {
        return Err(FramecutError::evaluation(
            "ffmpeg is required for audio encoding, but was not found on PATH",
        ));
    }
    ensure_parent_dir(out_path)?;
    let out = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-f", "f32le", "-ar"])
        .arg(sample_rate.to_string())
        .arg("-ac")
        .arg(channels.to_string())
        .arg("-i")
        .arg(pcm_path)
        .arg(out_path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| FramecutError::evaluation(format!("failed to spawn ffmpeg: {e}")))?;
    if !out.status.success() {
        return Err(FramecutError::evaluation(format!(
            "ffmpeg exited with status {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(())
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> FramecutResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

fn join_stderr(
    handle: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
) -> FramecutResult<Vec<u8>> {
    match handle {
        Some(h) => h
            .join()
            .map_err(|_| FramecutError::evaluation("ffmpeg stderr drain thread panicked"))?
            .map_err(|e| FramecutError::evaluation(format!("ffmpeg stderr read failed: {e}"))),
        None => Ok(Vec::new()),
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // Rawvideo input rate goes before `-i`.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn flatten_channel(v: f32, bg: f32, a: f32) -> f32 {
    v * a + bg * (1.0 - a)
}

fn flatten_rgba16le(dst: &mut Vec<u8>, frame: &Picture, bg: [u16; 3]) {
    let bgf = bg.map(f32::from);
    for px in frame.to_rgba16().chunks_exact(4) {
        let a = f32::from(px[3]) / 65535.0;
        for c in 0..3 {
            let v = if px[3] == u16::MAX {
                px[c]
            } else {
                flatten_channel(f32::from(px[c]), bgf[c], a).round().clamp(0.0, 65535.0) as u16
            };
            dst.extend_from_slice(&v.to_le_bytes());
        }
        dst.extend_from_slice(&u16::MAX.to_le_bytes());
    }
}

fn flatten_rgba8(dst: &mut Vec<u8>, frame: &Picture, bg: [u16; 3]) {
    let bgf = bg.map(|v| f32::from(v) / 257.0);
    for px in frame.to_rgba8().chunks_exact(4) {
        let a = f32::from(px[3]) / 255.0;
        for c in 0..3 {
            let v = if px[3] == u8::MAX {
                px[c]
            } else {
                flatten_channel(f32::from(px[c]), bgf[c], a).round().clamp(0.0, 255.0) as u8
            };
            dst.push(v);
        }
        dst.push(u8::MAX);
    }
}
