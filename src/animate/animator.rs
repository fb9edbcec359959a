use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Context;
use rayon::prelude::*;

use crate::{
    animate::assemble::{AssembleOpts, OutputFormat, assemble},
    cache::RunContext,
    cache::key::KeyBuilder,
    color::legend::{Legend, render_legends},
    foundation::core::{Canvas, Year},
    foundation::error::{AnimError, AnimResult},
    indicator::Indicator,
    layout::{Layout, SlotGeometry, compose, write_layout_key},
    render::frame::FrameRGBA,
};

/// What a run does when one year's frame fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Abort the run: remaining years are cancelled, staged frames are deleted and no
    /// artifact is written.
    #[default]
    Strict,
    /// Report the year and leave it out of the animation.
    Lenient,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderThreading {
    pub parallel: bool,
    pub threads: Option<usize>,
}

/// Content bound to a layout slot.
#[derive(Clone, Debug)]
pub enum SlotContent {
    Indicator(Indicator),
    /// Rendered at the slot's size, once per run.
    Legend(Vec<Legend>),
    /// A fixed image shown in every frame.
    Image(FrameRGBA),
}

#[derive(Clone, Debug)]
pub struct SlotBinding {
    pub slot: String,
    pub content: SlotContent,
}

impl SlotBinding {
    pub fn indicator(slot: impl Into<String>, indicator: impl Into<Indicator>) -> Self {
        Self {
            slot: slot.into(),
            content: SlotContent::Indicator(indicator.into()),
        }
    }

    pub fn legend(slot: impl Into<String>, legends: Vec<Legend>) -> Self {
        Self {
            slot: slot.into(),
            content: SlotContent::Legend(legends),
        }
    }

    /// Legends of every given indicator, deduplicated.
    pub fn legend_of<'a>(
        slot: impl Into<String>,
        indicators: impl IntoIterator<Item = &'a Indicator>,
    ) -> Self {
        let mut legends: Vec<Legend> = Vec::new();
        for legend in indicators.into_iter().flat_map(Indicator::legends) {
            if !legends.contains(&legend) {
                legends.push(legend);
            }
        }
        Self::legend(slot, legends)
    }

    pub fn image(slot: impl Into<String>, frame: FrameRGBA) -> Self {
        Self {
            slot: slot.into(),
            content: SlotContent::Image(frame),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnimatorOpts {
    /// File stem of the artifact and of the frame files.
    pub name: String,
    /// Frame title; the year is appended as `"<title>, Year: <year>"`.
    pub title: Option<String>,
    pub canvas: Canvas,
    pub output_dir: PathBuf,
    pub assemble: AssembleOpts,
    pub strictness: Strictness,
    pub threading: RenderThreading,
    /// Keep a copy of every frame in `<output_dir>/<name>_frames/`.
    pub save_frames: bool,
}

impl Default for AnimatorOpts {
    fn default() -> Self {
        Self {
            name: "animation".to_string(),
            title: None,
            canvas: Canvas::default(),
            output_dir: PathBuf::from("."),
            assemble: AssembleOpts::default(),
            strictness: Strictness::default(),
            threading: RenderThreading::default(),
            save_frames: false,
        }
    }
}

impl AnimatorOpts {
    pub fn validate(&self) -> AnimResult<()> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return Err(AnimError::validation(format!(
                "animation name '{}' must be a plain file stem",
                self.name
            )));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(AnimError::validation("canvas width/height must be non-zero"));
        }
        if self.assemble.fps == 0 {
            return Err(AnimError::validation("fps must be non-zero"));
        }
        if self.assemble.format == OutputFormat::Mp4
            && (!self.canvas.width.is_multiple_of(2) || !self.canvas.height.is_multiple_of(2))
        {
            return Err(AnimError::validation(
                "mp4 output needs an even canvas width and height",
            ));
        }
        if self.threading.threads == Some(0) {
            return Err(AnimError::validation(
                "render threading 'threads' must be >= 1 when set",
            ));
        }
        Ok(())
    }
}

/// A year whose frame is missing from the animation.
#[derive(Debug)]
pub struct FrameFailure {
    pub year: Year,
    pub error: AnimError,
}

#[derive(Debug)]
pub struct AnimationReport {
    pub artifact: PathBuf,
    /// Years in the animation, ascending.
    pub frames: Vec<Year>,
    /// Years left out (lenient runs only).
    pub skipped: Vec<FrameFailure>,
    /// Frame copies kept next to the artifact.
    pub saved_frames: Vec<PathBuf>,
}

enum FrameOutcome {
    Written(PathBuf),
    Failed(AnimError),
    Cancelled,
}

/// Frame files of one run; deleted with everything in it when dropped.
struct StagingDir(PathBuf);

impl StagingDir {
    fn create(parent: &Path, name: &str) -> AnimResult<Self> {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = parent.join(format!(".{name}.frames-{}-{nanos}", std::process::id()));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create staging dir '{}'", dir.display()))?;
        Ok(Self(dir))
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            tracing::debug!(dir = %self.0.display(), error = %e, "staging dir not removed");
        }
    }
}

fn build_thread_pool(threads: Option<usize>) -> AnimResult<rayon::ThreadPool> {
    if threads == Some(0) {
        return Err(AnimError::validation(
            "render threading 'threads' must be >= 1 when set",
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| AnimError::render(format!("failed to build rayon thread pool: {e}")))
}

/// Write through a temporary sibling so a frame file is either complete or absent.
fn write_frame(frame: &FrameRGBA, path: &Path) -> AnimResult<()> {
    let tmp = path.with_extension("png.tmp");
    if let Err(e) = frame.save_png(&tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("move frame into place at '{}'", path.display()))?;
    Ok(())
}

/// Drives a [`Layout`] over a sequence of years and assembles the frames into one
/// animation.
#[derive(Debug)]
pub struct Animator<L: Layout> {
    layout: L,
    bindings: Vec<SlotBinding>,
    opts: AnimatorOpts,
    ctx: RunContext,
}

impl<L: Layout> Animator<L> {
    /// Every binding must name a distinct slot of `layout`.
    pub fn new(
        layout: L,
        bindings: Vec<SlotBinding>,
        opts: AnimatorOpts,
        ctx: RunContext,
    ) -> AnimResult<Self> {
        opts.validate()?;
        let slots: BTreeSet<String> = layout.slots().into_iter().map(|s| s.name).collect();
        let mut bound = BTreeSet::new();
        for b in &bindings {
            if !slots.contains(&b.slot) {
                return Err(AnimError::layout(format!(
                    "layout '{}' has no slot named '{}'",
                    layout.name(),
                    b.slot
                )));
            }
            if !bound.insert(b.slot.as_str()) {
                return Err(AnimError::layout(format!(
                    "slot '{}' is bound more than once",
                    b.slot
                )));
            }
        }
        Ok(Self {
            layout,
            bindings,
            opts,
            ctx,
        })
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    pub fn opts(&self) -> &AnimatorOpts {
        &self.opts
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Union of the years the bound indicators have data for.
    pub fn available_years(&self) -> BTreeSet<Year> {
        self.bindings
            .iter()
            .filter_map(|b| match &b.content {
                SlotContent::Indicator(i) => Some(i.years()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.opts.output_dir.join(format!(
            "{}.{}",
            self.opts.name,
            self.opts.assemble.format.extension()
        ))
    }

    fn frame_title(&self, year: Year) -> Option<String> {
        self.opts
            .title
            .as_ref()
            .map(|t| format!("{t}, Year: {year}"))
    }

    fn legend_panel(
        &self,
        slot: &str,
        legends: &[Legend],
        geoms: &[SlotGeometry],
    ) -> AnimResult<FrameRGBA> {
        let rect = geoms
            .iter()
            .find(|g| g.name == slot)
            .map(|g| g.rect)
            .ok_or_else(|| AnimError::layout(format!("slot '{slot}' has no geometry")))?;
        let w = rect.width().floor().max(1.0) as u32;
        let h = rect.height().floor().max(1.0) as u32;
        let mut kb = KeyBuilder::new("legend_panel");
        kb.u64(u64::from(w)).u64(u64::from(h)).u64(legends.len() as u64);
        for legend in legends {
            kb.fingerprint(legend.fingerprint());
        }
        self.ctx
            .cache
            .legends
            .get_or_compute(&kb.key(), || render_legends(legends, w, h, &self.ctx.svg))
    }

    /// Compose the frame for one year. Frames are cached by layout, title and the content
    /// of every slot.
    #[tracing::instrument(skip(self), fields(name = %self.opts.name))]
    pub fn render_frame(&self, year: Year) -> AnimResult<FrameRGBA> {
        let canvas = self.opts.canvas;
        let title = self.frame_title(year);
        let geoms = self.layout.geometry(canvas, title.is_some());

        let mut kb = KeyBuilder::new("frame");
        write_layout_key(&self.layout, canvas, title.is_some(), &mut kb);
        kb.opt_str(title.as_deref());
        let mut contents = BTreeMap::new();
        for b in &self.bindings {
            let panel = match &b.content {
                SlotContent::Indicator(i) => i.render(year, &self.ctx)?,
                SlotContent::Legend(legends) => self.legend_panel(&b.slot, legends, &geoms)?,
                SlotContent::Image(frame) => frame.clone(),
            };
            kb.str(&b.slot).fingerprint(panel.content_fingerprint());
            contents.insert(b.slot.clone(), panel);
        }
        let inputs = kb.finish();
        self.ctx
            .cache
            .frames
            .get_or_compute_persisted(&kb.key(), inputs, || {
                compose(&self.layout, &contents, title.as_deref(), canvas, &self.ctx.svg)
            })
    }

    fn stage_frame(&self, year: Year, dir: &Path, cancel: &AtomicBool) -> FrameOutcome {
        if cancel.load(Ordering::Relaxed) {
            return FrameOutcome::Cancelled;
        }
        let path = dir.join(format!("{}_{year}.png", self.opts.name));
        match self
            .render_frame(year)
            .and_then(|frame| write_frame(&frame, &path))
        {
            Ok(()) => FrameOutcome::Written(path),
            Err(e) => {
                if self.opts.strictness == Strictness::Strict {
                    cancel.store(true, Ordering::Relaxed);
                }
                tracing::warn!(year, error = %e, "frame failed");
                FrameOutcome::Failed(e.for_year(year))
            }
        }
    }

    /// Render every year (sorted, duplicates dropped), then assemble the frames in
    /// ascending year order. Frames go to a staging directory that is removed when the run
    /// ends, whether it succeeds or not.
    #[tracing::instrument(skip(self, years), fields(name = %self.opts.name))]
    pub fn run(&self, years: impl IntoIterator<Item = Year>) -> AnimResult<AnimationReport> {
        let years: Vec<Year> = years
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if years.is_empty() {
            return Err(AnimError::validation("no years to render"));
        }
        let out_dir = &self.opts.output_dir;
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("create output dir '{}'", out_dir.display()))?;
        let staging = StagingDir::create(out_dir, &self.opts.name)?;
        let cancel = AtomicBool::new(false);
        tracing::info!(
            years = years.len(),
            parallel = self.opts.threading.parallel,
            "rendering frames"
        );

        let outcomes: Vec<FrameOutcome> = if self.opts.threading.parallel {
            let pool = build_thread_pool(self.opts.threading.threads)?;
            pool.install(|| {
                years
                    .par_iter()
                    .map(|y| self.stage_frame(*y, &staging.0, &cancel))
                    .collect()
            })
        } else {
            years
                .iter()
                .map(|y| self.stage_frame(*y, &staging.0, &cancel))
                .collect()
        };

        let mut written = Vec::new();
        let mut skipped = Vec::new();
        for (year, outcome) in years.iter().copied().zip(outcomes) {
            match outcome {
                FrameOutcome::Written(path) => written.push((year, path)),
                FrameOutcome::Failed(error) => skipped.push(FrameFailure { year, error }),
                FrameOutcome::Cancelled => {}
            }
        }

        if self.opts.strictness == Strictness::Strict && !skipped.is_empty() {
            let first = skipped.remove(0);
            tracing::error!(year = first.year, "aborting run; staged frames discarded");
            return Err(first.error);
        }
        if written.is_empty() {
            return Err(match skipped.into_iter().next() {
                Some(first) => first.error,
                None => AnimError::render("no frame was rendered"),
            });
        }

        let artifact = self.artifact_path();
        let frame_paths: Vec<PathBuf> = written.iter().map(|(_, p)| p.clone()).collect();
        assemble(&frame_paths, &artifact, &self.opts.assemble)?;

        let mut saved_frames = Vec::new();
        if self.opts.save_frames {
            let dir = out_dir.join(format!("{}_frames", self.opts.name));
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create frames dir '{}'", dir.display()))?;
            for (_, path) in &written {
                let Some(file) = path.file_name() else {
                    continue;
                };
                let dest = dir.join(file);
                std::fs::copy(path, &dest)
                    .with_context(|| format!("copy frame to '{}'", dest.display()))?;
                saved_frames.push(dest);
            }
        }

        if !skipped.is_empty() {
            tracing::warn!(skipped = skipped.len(), "animation has gaps");
        }
        Ok(AnimationReport {
            artifact,
            frames: written.into_iter().map(|(y, _)| y).collect(),
            skipped,
            saved_frames,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/animate/animator.rs"]
mod tests;
