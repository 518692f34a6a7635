//! Error types for the path tracer host.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by camera setup, scene editing, persistence and GPU initialization.
#[derive(Error, Debug)]
pub enum TracerError {
    /// Resolution, field of view or another setting is outside its valid range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The camera basis cannot be derived from the given vectors
    #[error("Degenerate camera: {0}")]
    DegenerateCamera(String),

    /// Kernel or display source rejected by the shader compiler
    #[error("Failed to compile {program}:\n{diagnostic}")]
    ShaderCompile {
        program: &'static str,
        diagnostic: String,
    },

    /// Compiled module does not fit the pipeline (entry point, bindings, push constants)
    #[error("Failed to link {program}:\n{diagnostic}")]
    ShaderLink {
        program: &'static str,
        diagnostic: String,
    },

    #[error("No GPU adapter supports the required features")]
    AdapterUnavailable,

    #[error("Failed to create window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("Failed to request GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// Scene file missing or unreadable/unwritable
    #[error("Scene file {}: {source}", path.display())]
    ResourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scene file record that is not `cx cy cz radius r g b er eg eb strength`
    #[error("Scene file {} line {line}: {reason}", path.display())]
    SceneFormat {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid scene name {0:?}: use letters, digits, '-' or '_'")]
    InvalidSceneName(String),

    #[error("Sphere index {index} out of bounds (have {count})")]
    SphereIndex { index: usize, count: usize },
}

impl TracerError {
    /// Fatal errors abort startup; everything else is reported and the frame loop continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TracerError::ShaderCompile { .. }
                | TracerError::ShaderLink { .. }
                | TracerError::AdapterUnavailable
                | TracerError::CreateSurface(_)
                | TracerError::RequestDevice(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TracerError>;
