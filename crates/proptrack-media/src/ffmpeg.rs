//! FFmpeg-backed [`MediaTool`].
//!
//! Decoding and encoding run FFmpeg as a sidecar process via `ffmpeg-sidecar`;
//! probing shells out to `ffprobe` and parses its JSON report. No FFmpeg
//! development headers are needed at build time.

use crate::probe::{parse_ffprobe_json, MediaInfo};
use crate::tool::MediaTool;
use ffmpeg_sidecar::command::FfmpegCommand;
use proptrack_core::{ProptrackError, Result, FRAME_PATTERN};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Encoder settings for the assembled output video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// FFmpeg encoder name.
    pub video_codec: String,
    /// CRF value for x264/x265 (0-51, lower = better).
    pub crf: Option<u8>,
    pub preset: Option<String>,
    pub pixel_format: String,
    /// Explicit ffmpeg binary (None = sidecar default / PATH).
    pub ffmpeg_binary: Option<PathBuf>,
    /// Explicit ffprobe binary (None = PATH, then sidecar location).
    pub ffprobe_binary: Option<PathBuf>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".into(),
            crf: Some(18),
            preset: Some("medium".into()),
            pixel_format: "yuv420p".into(),
            ffmpeg_binary: None,
            ffprobe_binary: None,
        }
    }
}

/// Media Codec Tool implemented with FFmpeg subprocesses.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTool {
    config: EncoderConfig,
}

impl FfmpegTool {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Check whether an ffmpeg binary can be found.
    pub fn is_available(&self) -> bool {
        self.ffmpeg_binary().exists() || which::which("ffmpeg").is_ok()
    }

    fn ffmpeg_binary(&self) -> PathBuf {
        self.config
            .ffmpeg_binary
            .clone()
            .unwrap_or_else(ffmpeg_sidecar::paths::ffmpeg_path)
    }

    fn ffprobe_binary(&self) -> PathBuf {
        self.config.ffprobe_binary.clone().unwrap_or_else(|| {
            which::which("ffprobe").unwrap_or_else(|_| ffmpeg_sidecar::ffprobe::ffprobe_path())
        })
    }

    /// Run ffmpeg with `args`, collecting error log lines for the failure report.
    fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        debug!(args = %args.join(" "), "Running ffmpeg");

        let mut command = FfmpegCommand::new_with_path(self.ffmpeg_binary());
        command.args(args);
        let mut child = command
            .spawn()
            .map_err(|e| ProptrackError::codec("ffmpeg", None, format!("failed to spawn: {e}")))?;

        // Draining the event stream also keeps stderr from filling its pipe.
        let errors: Vec<String> = match child.iter() {
            Ok(events) => events.filter_errors().collect(),
            Err(e) => vec![e.to_string()],
        };

        let status = child
            .wait()
            .map_err(|e| ProptrackError::codec("ffmpeg", None, format!("failed to wait: {e}")))?;

        if !status.success() {
            return Err(ProptrackError::codec(
                "ffmpeg",
                status.code(),
                errors.join("\n"),
            ));
        }
        if !errors.is_empty() {
            warn!(count = errors.len(), first = %errors[0], "ffmpeg reported errors but exited cleanly");
        }
        Ok(())
    }
}

impl MediaTool for FfmpegTool {
    fn probe(&self, video: &Path) -> Result<MediaInfo> {
        ensure_exists(video)?;
        let binary = self.ffprobe_binary();
        debug!(binary = %binary.display(), video = %video.display(), "Probing media");

        let output = Command::new(&binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(video)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                ProptrackError::codec(
                    "ffprobe",
                    None,
                    format!("failed to run {}: {e}", binary.display()),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProptrackError::codec(
                "ffprobe",
                output.status.code(),
                stderr.chars().take(500).collect::<String>(),
            ));
        }

        parse_ffprobe_json(&output.stdout)
    }

    fn extract_frames(&self, video: &Path, out_dir: &Path, fps: f64) -> Result<()> {
        ensure_exists(video)?;
        info!(video = %video.display(), fps, "Extracting frames");
        self.run_ffmpeg(&extract_frames_args(video, out_dir, fps))
    }

    fn extract_frame(
        &self,
        video: &Path,
        frame_index: usize,
        fps: f64,
        out_path: &Path,
    ) -> Result<()> {
        ensure_exists(video)?;
        self.run_ffmpeg(&extract_frame_args(video, frame_index, fps, out_path))?;
        if !out_path.exists() {
            return Err(ProptrackError::InvalidInput(format!(
                "frame {frame_index} is past the end of {}",
                video.display()
            )));
        }
        Ok(())
    }

    fn encode(
        &self,
        frame_dir: &Path,
        fps: f64,
        audio_source: Option<&Path>,
        output: &Path,
    ) -> Result<()> {
        info!(
            frames = %frame_dir.display(),
            output = %output.display(),
            with_audio = audio_source.is_some(),
            "Encoding video"
        );
        self.run_ffmpeg(&encode_args(
            frame_dir,
            fps,
            audio_source,
            output,
            &self.config,
        ))
    }
}

fn ensure_exists(video: &Path) -> Result<()> {
    if video.is_file() {
        Ok(())
    } else {
        Err(ProptrackError::InvalidInput(format!(
            "video not found: {}",
            video.display()
        )))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Arguments decoding `video` into `out_dir/frame_%04d.png`.
pub fn extract_frames_args(video: &Path, out_dir: &Path, fps: f64) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-y".into(),
        "-i".into(),
        path_arg(video),
        "-vf".into(),
        format!("fps={fps}"),
        "-start_number".into(),
        "1".into(),
        path_arg(&out_dir.join(FRAME_PATTERN)),
    ]
}

/// Arguments decoding the single frame at `frame_index`.
pub fn extract_frame_args(video: &Path, frame_index: usize, fps: f64, out_path: &Path) -> Vec<String> {
    let seconds = frame_index as f64 / fps;
    vec![
        "-hide_banner".into(),
        "-y".into(),
        "-ss".into(),
        format!("{seconds:.6}"),
        "-i".into(),
        path_arg(video),
        "-frames:v".into(),
        "1".into(),
        path_arg(out_path),
    ]
}

/// Arguments encoding a frame directory, optionally muxing source audio.
///
/// Audio is stream-copied and the output is cut to the shorter of the two
/// streams. The `?` on the audio map tolerates a source without audio.
pub fn encode_args(
    frame_dir: &Path,
    fps: f64,
    audio_source: Option<&Path>,
    output: &Path,
    config: &EncoderConfig,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-y".into(),
        "-framerate".into(),
        format!("{fps}"),
        "-start_number".into(),
        "1".into(),
        "-i".into(),
        path_arg(&frame_dir.join(FRAME_PATTERN)),
    ];

    if let Some(audio) = audio_source {
        args.extend_from_slice(&[
            "-i".into(),
            path_arg(audio),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0?".into(),
            "-c:a".into(),
            "copy".into(),
            "-shortest".into(),
        ]);
    }

    args.extend_from_slice(&["-c:v".into(), config.video_codec.clone()]);
    if let Some(crf) = config.crf {
        args.extend_from_slice(&["-crf".into(), crf.to_string()]);
    }
    if let Some(preset) = &config.preset {
        args.extend_from_slice(&["-preset".into(), preset.clone()]);
    }

    // yuv420p needs even dimensions.
    args.extend_from_slice(&[
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
        "-pix_fmt".into(),
        config.pixel_format.clone(),
        "-r".into(),
        format!("{fps}"),
        path_arg(output),
    ]);
    args
}
