//! Look-at camera and the per-pixel ray-generation frame consumed by the kernel.
//!
//! The kernel shoots rays from `center` through
//! `pixel00 + x * delta_u + y * delta_v` for pixel `(x, y)`, row 0 at the top.
//! Derived fields are private and recomputed atomically with every edit, so
//! they can never be read stale.

use glam::Vec3;

use crate::error::{Result, TracerError};

const DEGENERATE_EPSILON: f32 = 1e-6;

/// User-editable camera inputs
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraView {
    pub look_from: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    pub vertical_fov: f32, // degrees
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            look_from: Vec3::new(-2.0, 2.0, 1.0),
            look_at: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::Y,
            vertical_fov: 90.0,
        }
    }
}

/// Ray-generation frame handed to the kernel
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraFrame {
    pub center: Vec3,
    pub pixel00: Vec3,
    pub delta_u: Vec3,
    pub delta_v: Vec3,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Derived {
    u: Vec3,
    v: Vec3,
    w: Vec3,
    focal_length: f32,
    viewport_width: f32,
    viewport_height: f32,
    frame: CameraFrame,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Camera {
    view: CameraView,
    width: u32,
    height: u32,
    derived: Derived,
}

impl Camera {
    /// Camera looking from `look_from` towards `look_at`; focal length is their distance
    pub fn from_look_at(
        look_from: Vec3,
        look_at: Vec3,
        up: Vec3,
        vertical_fov: f32,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let view = CameraView {
            look_from,
            look_at,
            up,
            vertical_fov,
        };
        Self::from_view(view, width, height)
    }

    /// Camera looking along `direction`; focal length is `direction.length()`
    pub fn from_direction(
        look_from: Vec3,
        direction: Vec3,
        up: Vec3,
        vertical_fov: f32,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if direction.length() < DEGENERATE_EPSILON {
            return Err(TracerError::DegenerateCamera(format!(
                "view direction {} has zero length",
                direction
            )));
        }
        Self::from_look_at(look_from, look_from + direction, up, vertical_fov, width, height)
    }

    pub fn from_view(view: CameraView, width: u32, height: u32) -> Result<Self> {
        let derived = derive(&view, width, height)?;
        Ok(Self {
            view,
            width,
            height,
            derived,
        })
    }

    /// Default view used at startup and by "reset camera"
    pub fn default_for(width: u32, height: u32) -> Result<Self> {
        Self::from_view(CameraView::default(), width, height)
    }

    /// Same view at a new resolution; a camera's resolution is fixed once built
    pub fn with_resolution(&self, width: u32, height: u32) -> Result<Self> {
        Self::from_view(self.view, width, height)
    }

    /// Recompute the basis and pixel grid from the current inputs
    pub fn update_view(&mut self) -> Result<()> {
        self.derived = derive(&self.view, self.width, self.height)?;
        Ok(())
    }

    /// Apply `edit` to the view inputs and recompute; a rejected edit leaves the camera untouched
    pub fn edit(&mut self, edit: impl FnOnce(&mut CameraView)) -> Result<()> {
        let previous = self.view;
        edit(&mut self.view);
        if let Err(err) = self.update_view() {
            self.view = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn view(&self) -> &CameraView {
        &self.view
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Right, true-up and backward axes `(u, v, w)`
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        (self.derived.u, self.derived.v, self.derived.w)
    }

    /// Unit vector the camera looks along (`-w`)
    pub fn forward(&self) -> Vec3 {
        -self.derived.w
    }

    pub fn right(&self) -> Vec3 {
        self.derived.u
    }

    pub fn focal_length(&self) -> f32 {
        self.derived.focal_length
    }

    /// Viewport `(width, height)` in world units at the focal distance
    pub fn viewport_size(&self) -> (f32, f32) {
        (self.derived.viewport_width, self.derived.viewport_height)
    }

    pub fn gpu_frame(&self) -> CameraFrame {
        self.derived.frame
    }
}

fn derive(view: &CameraView, width: u32, height: u32) -> Result<Derived> {
    if width == 0 || height == 0 {
        return Err(TracerError::InvalidConfiguration(format!(
            "resolution must be non-zero, got {}x{}",
            width, height
        )));
    }
    if !(view.vertical_fov.is_finite() && view.vertical_fov > 0.0 && view.vertical_fov < 180.0) {
        return Err(TracerError::InvalidConfiguration(format!(
            "vertical field of view must be in (0, 180) degrees, got {}",
            view.vertical_fov
        )));
    }
    if !(view.look_from.is_finite() && view.look_at.is_finite() && view.up.is_finite()) {
        return Err(TracerError::InvalidConfiguration(
            "camera vectors must be finite".to_string(),
        ));
    }

    let offset = view.look_from - view.look_at;
    let focal_length = offset.length();
    if focal_length < DEGENERATE_EPSILON {
        return Err(TracerError::DegenerateCamera(format!(
            "look-from and look-at coincide at {}",
            view.look_from
        )));
    }
    let w = offset / focal_length;
    let right = view.up.cross(w);
    if right.length() < DEGENERATE_EPSILON {
        return Err(TracerError::DegenerateCamera(format!(
            "up vector {} is parallel to the view axis",
            view.up
        )));
    }
    let u = right.normalize();
    let v = w.cross(u);

    let h = (view.vertical_fov.to_radians() / 2.0).tan();
    let viewport_height = 2.0 * h * focal_length;
    let viewport_width = viewport_height * (width as f32 / height as f32);

    // Row 0 is the top of the image, so the vertical edge runs along -v
    let viewport_u = viewport_width * u;
    let viewport_v = viewport_height * -v;
    let delta_u = viewport_u / width as f32;
    let delta_v = viewport_v / height as f32;

    let center = view.look_from;
    let viewport_upper_left = center - focal_length * w - viewport_u / 2.0 - viewport_v / 2.0;
    let pixel00 = viewport_upper_left + 0.5 * (delta_u + delta_v);

    Ok(Derived {
        u,
        v,
        w,
        focal_length,
        viewport_width,
        viewport_height,
        frame: CameraFrame {
            center,
            pixel00,
            delta_u,
            delta_v,
        },
    })
}
