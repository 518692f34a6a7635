//! Kernel and display program sources, compiled and linked under wgpu error
//! scopes so driver diagnostics come back as [`TracerError`] values instead
//! of the default panic handler.

use std::borrow::Cow;
use std::path::Path;

use log::info;

use crate::error::{Result, TracerError};

pub const TRACE_KERNEL_ENTRY: &str = "main";
pub const DISPLAY_VERTEX_ENTRY: &str = "vs_main";
pub const DISPLAY_FRAGMENT_ENTRY: &str = "fs_main";

/// WGSL source plus the label used in diagnostics
#[derive(Clone, Debug)]
pub struct ProgramSource {
    pub label: &'static str,
    pub source: Cow<'static, str>,
}

impl ProgramSource {
    pub fn trace_kernel() -> Self {
        Self {
            label: "trace kernel",
            source: Cow::Borrowed(include_str!("../shaders/trace.wgsl")),
        }
    }

    pub fn display() -> Self {
        Self {
            label: "display program",
            source: Cow::Borrowed(include_str!("../shaders/display.wgsl")),
        }
    }

    /// Read a replacement source from disk, keeping `label`
    pub fn from_file(label: &'static str, path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| TracerError::ResourceIo {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded {} from {}", label, path.display());
        Ok(Self {
            label,
            source: Cow::Owned(source),
        })
    }
}

/// Compile `program`; syntax and validation errors become `ShaderCompile`
pub async fn compile(device: &wgpu::Device, program: &ProgramSource) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(program.label),
        source: wgpu::ShaderSource::Wgsl(program.source.clone()),
    });
    if let Some(error) = device.pop_error_scope().await {
        return Err(TracerError::ShaderCompile {
            program: program.label,
            diagnostic: error.to_string(),
        });
    }
    Ok(module)
}

/// Run a pipeline constructor; entry-point, layout or push-constant mismatches become `ShaderLink`
pub async fn link<T>(
    device: &wgpu::Device,
    program: &'static str,
    create: impl FnOnce(&wgpu::Device) -> T,
) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = create(device);
    if let Some(error) = device.pop_error_scope().await {
        return Err(TracerError::ShaderLink {
            program,
            diagnostic: error.to_string(),
        });
    }
    Ok(pipeline)
}
