//! Year-by-year frame production and animation assembly.

/// Layout-driven frame rendering over a year sequence.
pub mod animator;
/// GIF and MP4 writers for staged frames.
pub mod assemble;
/// System `ffmpeg` pipe encoder.
pub mod ffmpeg;

pub use animator::{
    AnimationReport, Animator, AnimatorOpts, FrameFailure, RenderThreading, SlotBinding,
    SlotContent, Strictness,
};
pub use assemble::{AssembleOpts, OutputFormat};
