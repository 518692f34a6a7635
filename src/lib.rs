//! Host-side control layer of a progressive GPU path tracer: camera model,
//! scene storage synchronized with the trace kernel, accumulation control and
//! the interactive session driving them.

pub mod accumulation;
pub mod buffers;
pub mod camera;
pub mod compute;
pub mod config;
pub mod error;
pub mod geometry;
pub mod input;
pub mod programs;
pub mod renderer;
pub mod scene;
pub mod scene_io;
