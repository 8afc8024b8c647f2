//! Final assembly: clips in segment order under the full song.
//!
//! # Architecture
//!
//! - **assemble**: `Assembler` checks clip count, order and total duration,
//!   then drives an engine and publishes the output atomically
//! - **plan**: `AssemblyPlan`, the engine-neutral description of the render
//! - **ffmpeg**: command builder and the ffmpeg-backed engine

mod assemble;
mod ffmpeg;
mod plan;

pub use assemble::Assembler;
pub use ffmpeg::{FfmpegAssemblyEngine, FfmpegCommandBuilder};
pub use plan::AssemblyPlan;
