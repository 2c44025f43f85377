//! Thin wrappers around the system `ffprobe` / `ffmpeg` tools used to decode clip media.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::foundation::error::{FramecutError, FramecutResult};

/// Probed properties of a media file.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// Video stream size, if the file has a video stream.
    pub video_size: Option<(u32, u32)>,
    /// Video frame rate in frames per second.
    pub frame_rate: Option<f64>,
    /// Native sample rate of the first audio stream.
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Container duration in seconds.
    pub duration_secs: Option<f64>,
}

impl MediaInfo {
    pub fn has_audio(&self) -> bool {
        self.sample_rate.is_some()
    }
}

/// `true` when `ffmpeg` can be spawned.
pub fn is_ffmpeg_on_path() -> bool {
    tool_runs("ffmpeg")
}

/// `true` when `ffprobe` can be spawned.
pub fn is_ffprobe_on_path() -> bool {
    tool_runs("ffprobe")
}

fn tool_runs(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Probe stream metadata through `ffprobe`.
pub fn probe(path: &Path) -> FramecutResult<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        sample_rate: Option<String>,
        channels: Option<u16>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| FramecutError::decode(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(FramecutError::decode(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| FramecutError::decode(format!("ffprobe json parse failed: {e}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        path: path.to_path_buf(),
        video_size: video.and_then(|v| Some((v.width?, v.height?))),
        frame_rate: video
            .and_then(|v| v.r_frame_rate.as_deref())
            .and_then(parse_rate),
        sample_rate: audio
            .and_then(|a| a.sample_rate.as_deref())
            .and_then(|s| s.parse().ok()),
        channels: audio.and_then(|a| a.channels),
        duration_secs: parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse().ok()),
    })
}

fn parse_rate(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/').unwrap_or((s, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (num > 0.0 && den > 0.0).then(|| num / den)
}

/// Decode up to `count` sequential straight-alpha RGBA frames starting at `start_secs`.
pub fn decode_video_frames_rgba8(
    info: &MediaInfo,
    start_secs: f64,
    count: u32,
) -> FramecutResult<Vec<Vec<u8>>> {
    let (w, h) = info.video_size.ok_or_else(|| {
        FramecutError::decode(format!("'{}' has no video stream", info.path.display()))
    })?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{:.9}", start_secs.max(0.0))])
        .arg("-i")
        .arg(&info.path)
        .args([
            "-frames:v",
            &count.to_string(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| FramecutError::decode(format!("failed to run ffmpeg for video decode: {e}")))?;
    if !out.status.success() {
        return Err(FramecutError::decode(format!(
            "ffmpeg video decode failed for '{}': {}",
            info.path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let frame_len = (w as usize) * (h as usize) * 4;
    if frame_len == 0 || !out.stdout.len().is_multiple_of(frame_len) {
        return Err(FramecutError::decode(format!(
            "decoded video batch has invalid size: got {} bytes, expected multiples of {frame_len}",
            out.stdout.len()
        )));
    }
    Ok(out
        .stdout
        .chunks_exact(frame_len)
        .take(count as usize)
        .map(<[u8]>::to_vec)
        .collect())
}

/// Decoded interleaved `f32` PCM.
#[derive(Clone, Debug, PartialEq)]
pub struct Pcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved: Vec<f32>,
}

/// Decode the first audio stream of `path` to interleaved `f32` at `sample_rate` and
/// `channels`. A file without audio decodes to empty PCM.
pub fn decode_audio_f32(path: &Path, sample_rate: u32, channels: u16) -> FramecutResult<Pcm> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &channels.to_string(),
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| FramecutError::decode(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        // ffmpeg reports a missing audio stream as an error.
        if msg.contains("matches no streams")
            || msg.contains("Stream specifier")
            || msg.contains("does not contain any stream")
        {
            return Ok(Pcm {
                sample_rate,
                channels,
                interleaved: Vec::new(),
            });
        }
        return Err(FramecutError::decode(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }
    if !out.stdout.len().is_multiple_of(4) {
        return Err(FramecutError::decode(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    Ok(Pcm {
        sample_rate,
        channels,
        interleaved: out
            .stdout
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    })
}
