use std::path::PathBuf;

use crate::error::{Result, TracerError};

/// Runtime settings; compile-time limits live in `RaytracerConfig`
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub vertical_fov: f32,
    pub max_bounce_depth: u32,
    pub samples_per_pixel: u32,
    pub accumulate: bool,
    pub scene_dir: PathBuf,
    /// Replaces the embedded trace kernel when set
    pub kernel_override: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            vertical_fov: 90.0,
            max_bounce_depth: 10,
            samples_per_pixel: 10,
            accumulate: true,
            scene_dir: PathBuf::from("scenes"),
            kernel_override: None,
        }
    }
}

impl RenderSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(width) = lookup("PATHTRACER_WIDTH") {
            settings.width = parse_dimension("PATHTRACER_WIDTH", &width)?;
        }
        if let Some(height) = lookup("PATHTRACER_HEIGHT") {
            settings.height = parse_dimension("PATHTRACER_HEIGHT", &height)?;
        }
        if let Some(dir) = lookup("PATHTRACER_SCENE_DIR") {
            settings.scene_dir = PathBuf::from(dir);
        }
        settings.kernel_override = lookup("PATHTRACER_KERNEL").map(PathBuf::from);
        Ok(settings)
    }
}

fn parse_dimension(key: &str, value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(TracerError::InvalidConfiguration(format!(
            "{} must be a positive integer, got {:?}",
            key, value
        ))),
    }
}
