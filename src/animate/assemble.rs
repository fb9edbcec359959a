use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::Context;
use image::codecs::gif::{GifEncoder, Repeat};

use crate::{
    animate::ffmpeg::{EncodeConfig, FfmpegEncoder},
    foundation::core::Rgba8,
    foundation::error::{AnimError, AnimResult},
    render::frame::FrameRGBA,
};

/// Container of the assembled animation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// H.264 through the system `ffmpeg`.
    #[default]
    Mp4,
    /// Looping animated GIF, no external tools needed.
    Gif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Gif => "gif",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AssembleOpts {
    pub format: OutputFormat,
    pub fps: u32,
    /// Show the last frame twice so the final year stays on screen longer. Off by default,
    /// so the artifact has exactly one frame per rendered year.
    pub hold_last_frame: bool,
    pub background: Rgba8,
}

impl Default for AssembleOpts {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            fps: 1,
            hold_last_frame: false,
            background: Rgba8::WHITE,
        }
    }
}

/// Removes a file on drop unless disarmed.
pub(crate) struct TempFileGuard(pub(crate) Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Hidden sibling path an artifact is written to before being renamed into place. The
/// extension is kept so ffmpeg still picks the container from it.
pub(crate) fn partial_path(out: &Path, format: OutputFormat) -> PathBuf {
    let stem = out
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "animation".to_string());
    out.with_file_name(format!(".{stem}.partial.{}", format.extension()))
}

/// Assemble PNG frames, in the given order, into one animation at `out`. The artifact only
/// appears at `out` once it is complete.
#[tracing::instrument(skip(frames, opts), fields(frames = frames.len(), format = ?opts.format))]
pub fn assemble(frames: &[PathBuf], out: &Path, opts: &AssembleOpts) -> AnimResult<()> {
    if frames.is_empty() {
        return Err(AnimError::render("no frames to assemble"));
    }
    if opts.fps == 0 {
        return Err(AnimError::validation("fps must be non-zero"));
    }
    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    let partial = partial_path(out, opts.format);
    let mut guard = TempFileGuard(Some(partial.clone()));
    let mut sequence: Vec<&PathBuf> = frames.iter().collect();
    if opts.hold_last_frame
        && let Some(last) = frames.last()
    {
        sequence.push(last);
    }
    match opts.format {
        OutputFormat::Gif => write_gif(&sequence, &partial, opts)?,
        OutputFormat::Mp4 => write_mp4(&sequence, &partial, opts)?,
    }

    std::fs::rename(&partial, out)
        .with_context(|| format!("move animation into place at '{}'", out.display()))?;
    guard.0 = None;
    tracing::info!(out = %out.display(), "animation written");
    Ok(())
}

fn check_size(frame: &FrameRGBA, expected: (u32, u32), path: &Path) -> AnimResult<()> {
    if (frame.width, frame.height) != expected {
        return Err(AnimError::render(format!(
            "frame '{}' is {}x{}, expected {}x{}",
            path.display(),
            frame.width,
            frame.height,
            expected.0,
            expected.1
        )));
    }
    Ok(())
}

fn write_gif(frames: &[&PathBuf], out: &Path, opts: &AssembleOpts) -> AnimResult<()> {
    let file = File::create(out).with_context(|| format!("create '{}'", out.display()))?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder
        .set_repeat(Repeat::Infinite)
        .context("configure gif encoder")?;
    let delay = image::Delay::from_numer_denom_ms(1000, opts.fps);
    let mut size = None;
    for path in frames {
        let frame = FrameRGBA::load_png(path)?;
        check_size(&frame, *size.get_or_insert((frame.width, frame.height)), path)?;
        let opaque = frame.flatten(opts.background)?;
        let img = image::RgbaImage::from_raw(frame.width, frame.height, opaque)
            .ok_or_else(|| AnimError::render("frame buffer does not match its dimensions"))?;
        encoder
            .encode_frame(image::Frame::from_parts(img, 0, 0, delay))
            .with_context(|| format!("encode gif frame '{}'", path.display()))?;
    }
    Ok(())
}

fn write_mp4(frames: &[&PathBuf], out: &Path, opts: &AssembleOpts) -> AnimResult<()> {
    let first = FrameRGBA::load_png(frames[0])?;
    let mut encoder = FfmpegEncoder::new(
        EncodeConfig {
            width: first.width,
            height: first.height,
            fps: opts.fps,
            out_path: out.to_path_buf(),
            overwrite: true,
        },
        opts.background,
    )?;
    encoder.encode_frame(&first)?;
    for path in &frames[1..] {
        let frame = FrameRGBA::load_png(path)?;
        check_size(&frame, (first.width, first.height), path)?;
        encoder.encode_frame(&frame)?;
    }
    encoder.finish()
}

#[cfg(test)]
#[path = "../../tests/unit/animate/assemble.rs"]
mod tests;
