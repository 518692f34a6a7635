//! Progressive accumulation state.
//!
//! The controller owns the only frame counter. Anything that changes what a
//! pixel converges to (camera frame, scene contents, bounce depth, samples
//! per pixel, accumulation toggle) moves it back to [`AccumulationState::Reset`],
//! and the next [`FrameController::begin_frame`] starts over at frame 0 with a
//! cleared accumulation buffer.

use log::debug;
use pathtracer_shared::{FrameConstants, RaytracerConfig};

use crate::buffers::SyncReport;
use crate::camera::{Camera, CameraFrame};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccumulationState {
    Reset,
    Accumulating(u32),
}

/// Per-frame values handed to the kernel
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameState {
    pub frame_index: u32,
    pub random_seed: f32,
    pub accumulate: bool,
    /// The accumulation buffer must be cleared before this frame's dispatch
    pub cleared: bool,
}

impl FrameState {
    /// `(history_weight, sample_weight)` for the running average
    pub fn weights(&self) -> (f32, f32) {
        if !self.accumulate {
            return (0.0, 1.0);
        }
        let f = self.frame_index as f32;
        (f / (f + 1.0), 1.0 / (f + 1.0))
    }
}

pub struct FrameController {
    state: AccumulationState,
    camera_frame: CameraFrame,
    resolution: (u32, u32),
    max_bounce_depth: u32,
    samples_per_pixel: u32,
    accumulate: bool,
    sphere_count: u32,
    mesh_count: u32,
}

impl FrameController {
    pub fn new(camera: &Camera, max_bounce_depth: u32, samples_per_pixel: u32, accumulate: bool) -> Self {
        Self {
            state: AccumulationState::Reset,
            camera_frame: camera.gpu_frame(),
            resolution: camera.resolution(),
            max_bounce_depth: clamp_depth(max_bounce_depth),
            samples_per_pixel: clamp_samples(samples_per_pixel),
            accumulate,
            sphere_count: 0,
            mesh_count: 0,
        }
    }

    pub fn state(&self) -> AccumulationState {
        self.state
    }

    pub fn max_bounce_depth(&self) -> u32 {
        self.max_bounce_depth
    }

    pub fn samples_per_pixel(&self) -> u32 {
        self.samples_per_pixel
    }

    pub fn accumulation_enabled(&self) -> bool {
        self.accumulate
    }

    /// Returns true if the camera frame moved and accumulation was reset
    pub fn update_camera(&mut self, camera: &Camera) -> bool {
        let frame = camera.gpu_frame();
        let resolution = camera.resolution();
        if frame == self.camera_frame && resolution == self.resolution {
            return false;
        }
        self.camera_frame = frame;
        self.resolution = resolution;
        self.invalidate("camera moved");
        true
    }

    pub fn update_scene(&mut self, report: SyncReport) -> bool {
        self.sphere_count = report.sphere_count;
        self.mesh_count = report.mesh_count;
        if report.changed() {
            self.invalidate("scene changed");
        }
        report.changed()
    }

    /// Clamped to `1..=MAX_BOUNCE_DEPTH`; returns true if the value changed
    pub fn set_max_bounce_depth(&mut self, depth: u32) -> bool {
        let depth = clamp_depth(depth);
        if depth == self.max_bounce_depth {
            return false;
        }
        self.max_bounce_depth = depth;
        self.invalidate("max bounce depth changed");
        true
    }

    /// Clamped to `1..=MAX_SAMPLES_PER_PIXEL`; returns true if the value changed
    pub fn set_samples_per_pixel(&mut self, samples: u32) -> bool {
        let samples = clamp_samples(samples);
        if samples == self.samples_per_pixel {
            return false;
        }
        self.samples_per_pixel = samples;
        self.invalidate("samples per pixel changed");
        true
    }

    pub fn set_accumulation(&mut self, enabled: bool) -> bool {
        if enabled == self.accumulate {
            return false;
        }
        self.accumulate = enabled;
        self.invalidate("accumulation toggled");
        true
    }

    pub fn request_reset(&mut self) {
        self.invalidate("reset requested");
    }

    /// Advance the state machine and describe the frame about to be traced
    pub fn begin_frame(&mut self, random_seed: f32) -> FrameState {
        let (frame_index, cleared) = match self.state {
            AccumulationState::Reset => (0, true),
            AccumulationState::Accumulating(f) => (f.saturating_add(1), false),
        };
        self.state = AccumulationState::Accumulating(frame_index);
        FrameState {
            frame_index,
            random_seed: unit_seed(random_seed),
            accumulate: self.accumulate,
            cleared,
        }
    }

    /// Push constants for `frame`
    pub fn constants(&self, frame: &FrameState) -> FrameConstants {
        let (history_weight, sample_weight) = frame.weights();
        let (width, height) = self.resolution;
        FrameConstants {
            center: self.camera_frame.center.to_array(),
            width,
            pixel00: self.camera_frame.pixel00.to_array(),
            height,
            delta_u: self.camera_frame.delta_u.to_array(),
            max_bounce_depth: self.max_bounce_depth,
            delta_v: self.camera_frame.delta_v.to_array(),
            samples_per_pixel: self.samples_per_pixel,
            frame_index: frame.frame_index,
            random_seed: frame.random_seed,
            sphere_count: self.sphere_count,
            mesh_count: self.mesh_count,
            history_weight,
            sample_weight,
            _padding: [0; 2],
        }
    }

    fn invalidate(&mut self, reason: &str) {
        if self.state != AccumulationState::Reset {
            debug!("Accumulation reset: {}", reason);
        }
        self.state = AccumulationState::Reset;
    }
}

/// Wrap into `[0, 1)`; `rem_euclid` rounds tiny negative inputs up to exactly 1.0
fn unit_seed(seed: f32) -> f32 {
    let seed = seed.rem_euclid(1.0);
    if seed < 1.0 {
        seed
    } else {
        0.0
    }
}

fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(1, RaytracerConfig::MAX_BOUNCE_DEPTH)
}

fn clamp_samples(samples: u32) -> u32 {
    samples.clamp(1, RaytracerConfig::MAX_SAMPLES_PER_PIXEL)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffers::{SceneSink, SceneSynchronizer};
    use crate::geometry::{Material, Sphere};
    use crate::scene::{FlatMeshes, Scene};
    use glam::Vec3;
    use pathtracer_shared::GpuSphere;

    struct NullSink;

    impl SceneSink for NullSink {
        fn upload_spheres(&mut self, _spheres: &[GpuSphere]) {}
        fn upload_meshes(&mut self, _meshes: &FlatMeshes) {}
    }

    fn controller() -> (Camera, FrameController) {
        let camera = Camera::default_for(64, 48).unwrap();
        let controller = FrameController::new(&camera, 2, 1, true);
        (camera, controller)
    }

    #[test]
    fn two_sphere_scenario() {
        let mut scene = Scene::new();
        scene
            .add_sphere(Sphere::new(Vec3::new(0.0, 0.0, -3.0), 1.0, Material::diffuse(Vec3::ONE)).unwrap())
            .unwrap();
        let purple = Vec3::new(0.5, 0.0, 0.5);
        scene
            .add_sphere(Sphere::new(Vec3::new(2.0, 0.0, -3.0), 2.0, Material::emissive(purple, purple, 1.0)).unwrap())
            .unwrap();
        let mut sync = SceneSynchronizer::new();
        let (camera, mut controller) = controller();

        controller.update_camera(&camera);
        controller.update_scene(sync.sync(&mut scene, &mut NullSink));
        let first = controller.begin_frame(0.25);
        assert_eq!(controller.state(), AccumulationState::Accumulating(0));
        assert!(first.cleared);
        assert_eq!(first.weights(), (0.0, 1.0));

        controller.update_camera(&camera);
        controller.update_scene(sync.sync(&mut scene, &mut NullSink));
        let second = controller.begin_frame(0.75);
        assert_eq!(controller.state(), AccumulationState::Accumulating(1));
        assert!(!second.cleared);
        assert_eq!(second.weights(), (0.5, 0.5));

        let constants = controller.constants(&second);
        assert_eq!(constants.sphere_count, 2);
        assert_eq!(constants.max_bounce_depth, 2);
        assert_eq!(constants.samples_per_pixel, 1);
        assert_eq!(constants.sample_weight, 0.5);
    }

    #[test]
    fn frame_index_increments_without_mutation() {
        let (camera, mut controller) = controller();
        for expected in 0..10 {
            controller.update_camera(&camera);
            let frame = controller.begin_frame(0.5);
            assert_eq!(frame.frame_index, expected);
            assert_eq!(frame.cleared, expected == 0);
        }
    }

    #[test]
    fn scene_mutation_resets() {
        let mut scene = Scene::default_scene();
        let mut sync = SceneSynchronizer::new();
        let (_, mut controller) = controller();
        controller.update_scene(sync.sync(&mut scene, &mut NullSink));
        controller.begin_frame(0.0);
        controller.begin_frame(0.0);

        scene.remove_sphere(0).unwrap();
        assert!(controller.update_scene(sync.sync(&mut scene, &mut NullSink)));
        assert_eq!(controller.state(), AccumulationState::Reset);
        let frame = controller.begin_frame(0.0);
        assert!(frame.cleared);
        assert_eq!(frame.frame_index, 0);
    }

    #[test]
    fn sphere_edit_resets() {
        let mut scene = Scene::default_scene();
        let mut sync = SceneSynchronizer::new();
        let (_, mut controller) = controller();
        controller.update_scene(sync.sync(&mut scene, &mut NullSink));
        controller.begin_frame(0.0);
        controller.begin_frame(0.0);
        assert_eq!(controller.state(), AccumulationState::Accumulating(1));

        let mut grown = scene.spheres()[0];
        grown.radius = 1.5;
        scene.edit_sphere(0, grown).unwrap();
        assert!(controller.update_scene(sync.sync(&mut scene, &mut NullSink)));
        let frame = controller.begin_frame(0.0);
        assert_eq!(frame.frame_index, 0);
        assert!(frame.cleared);
    }

    #[test]
    fn camera_move_resets() {
        let (mut camera, mut controller) = controller();
        controller.begin_frame(0.0);
        camera.edit(|view| view.look_from.z += 0.1).unwrap();
        assert!(controller.update_camera(&camera));
        assert_eq!(controller.begin_frame(0.0).frame_index, 0);
    }

    #[test]
    fn resize_resets() {
        let (camera, mut controller) = controller();
        controller.begin_frame(0.0);
        let resized = camera.with_resolution(128, 96).unwrap();
        assert!(controller.update_camera(&resized));
        let frame = controller.begin_frame(0.0);
        let constants = controller.constants(&frame);
        assert_eq!((constants.width, constants.height), (128, 96));
        assert!(frame.cleared);
    }

    #[test]
    fn unchanged_settings_do_not_reset() {
        let (_, mut controller) = controller();
        controller.begin_frame(0.0);
        assert!(!controller.set_max_bounce_depth(2));
        assert!(!controller.set_samples_per_pixel(1));
        assert!(!controller.set_accumulation(true));
        assert_eq!(controller.state(), AccumulationState::Accumulating(0));

        assert!(controller.set_max_bounce_depth(3));
        assert_eq!(controller.state(), AccumulationState::Reset);
    }

    #[test]
    fn settings_are_clamped() {
        let (_, mut controller) = controller();
        controller.set_max_bounce_depth(0);
        assert_eq!(controller.max_bounce_depth(), 1);
        controller.set_samples_per_pixel(10_000);
        assert_eq!(controller.samples_per_pixel(), RaytracerConfig::MAX_SAMPLES_PER_PIXEL);
    }

    #[test]
    fn disabled_accumulation_uses_latest_sample() {
        let (_, mut controller) = controller();
        controller.set_accumulation(false);
        controller.begin_frame(0.0);
        let frame = controller.begin_frame(0.0);
        assert_eq!(frame.frame_index, 1);
        assert_eq!(frame.weights(), (0.0, 1.0));
    }

    #[test]
    fn explicit_reset() {
        let (_, mut controller) = controller();
        controller.begin_frame(0.0);
        controller.begin_frame(0.0);
        controller.request_reset();
        assert_eq!(controller.state(), AccumulationState::Reset);
        assert!(controller.begin_frame(0.0).cleared);
    }

    #[test]
    fn seed_stays_in_unit_interval() {
        let (_, mut controller) = controller();
        assert_eq!(controller.begin_frame(1.25).random_seed, 0.25);
        for input in [-0.25, -1e-9, -f32::EPSILON, 1.0, 3.0] {
            let seed = controller.begin_frame(input).random_seed;
            assert!((0.0..1.0).contains(&seed), "seed {} from {}", seed, input);
        }
    }
}
