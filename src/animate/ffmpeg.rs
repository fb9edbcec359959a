use std::{
    io::Write as _,
    path::PathBuf,
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    foundation::core::Rgba8,
    foundation::error::{AnimError, AnimResult},
    render::frame::FrameRGBA,
};

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl EncodeConfig {
    pub fn validate(&self) -> AnimResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AnimError::validation("encode width/height must be non-zero"));
        }
        if self.fps == 0 {
            return Err(AnimError::validation("encode fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // yuv420p needs even dimensions
            return Err(AnimError::validation(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        Ok(())
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// H.264 MP4 writer driving the system `ffmpeg` through a raw RGBA pipe.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    background: Rgba8,
    /// `None` once `finish` has reaped the process.
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl FfmpegEncoder {
    pub fn new(cfg: EncodeConfig, background: Rgba8) -> AnimResult<Self> {
        cfg.validate()?;
        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(AnimError::validation(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(AnimError::render(
                "ffmpeg is required for MP4 output, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if cfg.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            AnimError::render(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AnimError::render("failed to open ffmpeg stdin"))?;
        tracing::debug!(out = %cfg.out_path.display(), fps = cfg.fps, "ffmpeg started");

        Ok(Self {
            cfg,
            background,
            child: Some(child),
            stdin: Some(stdin),
        })
    }

    pub fn encode_frame(&mut self, frame: &FrameRGBA) -> AnimResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(AnimError::render(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }
        let rgba = frame.flatten(self.background)?;
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(AnimError::render("ffmpeg encoder is already finalized"));
        };
        stdin
            .write_all(&rgba)
            .map_err(|e| AnimError::render(format!("failed to write frame to ffmpeg: {e}")))
    }

    #[cfg(test)]
    pub(crate) fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn finish(mut self) -> AnimResult<()> {
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return Err(AnimError::render("ffmpeg encoder is already finalized"));
        };
        let output = child
            .wait_with_output()
            .map_err(|e| AnimError::render(format!("failed to wait for ffmpeg: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnimError::render(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(out = %self.cfg.out_path.display(), "ffmpeg aborted");
        }
    }
}
