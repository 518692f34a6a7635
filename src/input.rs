use glam::Vec3;
use log::debug;
use pathtracer_shared::RaytracerConfig;
use winit::event::{ElementState, MouseButton, VirtualKeyCode};

use crate::accumulation::FrameController;
use crate::camera::Camera;
use crate::config::RenderSettings;
use crate::error::Result;
use crate::geometry::{Material, Sphere};
use crate::scene::Scene;
use crate::scene_io::SceneLibrary;

const QUICKSAVE: &str = "quicksave";
const NEW_SPHERE_DISTANCE: f32 = 2.0;
const NEW_SPHERE_RADIUS: f32 = 0.5;
const RADIUS_STEP: f32 = 1.1;

/// Movement keys currently held down
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeldKeys {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl HeldKeys {
    pub fn any(&self) -> bool {
        self.forward || self.backward || self.left || self.right
    }
}

/// Input handling state
#[derive(Debug, Default)]
pub struct InputState {
    mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
    pub held: HeldKeys,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle mouse input events
    pub fn handle_mouse_input(&mut self, button: MouseButton, button_state: ElementState) {
        if button == MouseButton::Left {
            self.mouse_pressed = button_state == ElementState::Pressed;
        }
    }

    /// Handle cursor movement and return the drag delta if the left button is held
    pub fn handle_cursor_moved(&mut self, position: winit::dpi::PhysicalPosition<f64>) -> Option<(f64, f64)> {
        let mut delta = None;

        if self.mouse_pressed {
            if let Some(last_pos) = self.last_mouse_pos {
                delta = Some((position.x - last_pos.0, position.y - last_pos.1));
            }
        }

        self.last_mouse_pos = Some((position.x, position.y));
        delta
    }

    /// Track W/A/S/D; returns false for any other key
    pub fn handle_movement_key(&mut self, key: VirtualKeyCode, key_state: ElementState) -> bool {
        let pressed = key_state == ElementState::Pressed;
        match key {
            VirtualKeyCode::W => self.held.forward = pressed,
            VirtualKeyCode::S => self.held.backward = pressed,
            VirtualKeyCode::A => self.held.left = pressed,
            VirtualKeyCode::D => self.held.right = pressed,
            _ => return false,
        }
        true
    }

    /// Forget held keys and the drag anchor, e.g. when the window loses focus
    pub fn release_all(&mut self) {
        self.held = HeldKeys::default();
        self.mouse_pressed = false;
        self.last_mouse_pos = None;
    }
}

/// Camera movement and zoom
pub struct CameraController;

impl CameraController {
    /// Translate along the view axes by `speed / fps` per frame so motion is
    /// frame-rate independent. Returns true if the camera moved.
    pub fn apply_movement(camera: &mut Camera, held: HeldKeys, fps: f32) -> Result<bool> {
        if !held.any() {
            return Ok(false);
        }
        let step = RaytracerConfig::CAMERA_MOVE_SPEED / fps.max(RaytracerConfig::MIN_MOVEMENT_FPS);
        let axis = |positive: bool, negative: bool| positive as i32 as f32 - negative as i32 as f32;
        let displacement = (camera.forward() * axis(held.forward, held.backward)
            + camera.right() * axis(held.right, held.left))
            * step;
        if displacement == Vec3::ZERO {
            return Ok(false);
        }
        camera.edit(|view| {
            view.look_from += displacement;
            view.look_at += displacement;
        })?;
        Ok(true)
    }

    /// Narrow (positive `lines`) or widen the field of view; returns true if it changed
    pub fn zoom(camera: &mut Camera, lines: f32) -> Result<bool> {
        let current = camera.view().vertical_fov;
        let fov = (current - lines * RaytracerConfig::CAMERA_ZOOM_STEP)
            .clamp(RaytracerConfig::CAMERA_MIN_FOV, RaytracerConfig::CAMERA_MAX_FOV);
        if fov == current {
            return Ok(false);
        }
        camera.edit(|view| view.vertical_fov = fov)?;
        Ok(true)
    }
}

/// Mouse-drag orbit around the eye point.
///
/// Yaw is an angle in the XZ plane; pitch is a raw vertical offset added to
/// the unit XZ direction, not an angle. The look direction is
/// `normalize(cos yaw, pitch, sin yaw)`, which tilts less per pixel as pitch
/// grows and never reaches straight up or down.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OrbitState {
    yaw: f32,
    pitch: f32,
}

impl OrbitState {
    pub fn from_camera(camera: &Camera) -> Self {
        let d = camera.forward();
        let yaw = d.z.atan2(d.x);
        // invert y = pitch / sqrt(1 + pitch^2)
        let pitch = d.y / (1.0 - d.y * d.y).max(f32::EPSILON).sqrt();
        let clamp = RaytracerConfig::CAMERA_PITCH_CLAMP;
        Self {
            yaw,
            pitch: pitch.clamp(-clamp, clamp),
        }
    }

    pub fn direction(&self) -> Vec3 {
        Vec3::new(self.yaw.cos(), self.pitch, self.yaw.sin()).normalize()
    }

    /// Apply a drag of `(dx, dy)` pixels; the focal distance is preserved
    pub fn apply_drag(&mut self, camera: &mut Camera, dx: f64, dy: f64) -> Result<()> {
        let sensitivity = RaytracerConfig::CAMERA_ROTATE_SENSITIVITY;
        let clamp = RaytracerConfig::CAMERA_PITCH_CLAMP;
        let mut next = *self;
        next.yaw += dx as f32 * sensitivity;
        next.pitch = (next.pitch - dy as f32 * sensitivity).clamp(-clamp, clamp);

        let offset = next.direction() * camera.focal_length();
        camera.edit(|view| view.look_at = view.look_from + offset)?;
        *self = next;
        Ok(())
    }
}

/// Output of the scene/render-settings panel
#[derive(Clone, Debug, PartialEq)]
pub enum PanelEdit {
    AddSphere,
    RemoveSphere(usize),
    EditSphere(usize, Sphere),
    SetMaxBounceDepth(u32),
    SetSamplesPerPixel(u32),
    SetAccumulation(bool),
    SaveScene(String),
    LoadScene(String),
    ResetCamera,
    ResetAccumulation,
}

/// What a key press asks for
#[derive(Clone, Debug, PartialEq)]
pub enum KeyAction {
    Edit(PanelEdit),
    SelectNextSphere,
    Quit,
}

/// Everything the interactive controller edits, independent of the GPU
pub struct Session {
    pub scene: Scene,
    pub camera: Camera,
    pub orbit: OrbitState,
    pub frames: FrameController,
    pub library: SceneLibrary,
    selected: Option<usize>,
}

impl Session {
    pub fn new(settings: &RenderSettings, width: u32, height: u32) -> Result<Self> {
        let mut camera = Camera::default_for(width, height)?;
        camera.edit(|view| view.vertical_fov = settings.vertical_fov)?;
        let scene = Scene::default_scene();
        let selected = (!scene.spheres().is_empty()).then_some(0);
        Ok(Self {
            orbit: OrbitState::from_camera(&camera),
            frames: FrameController::new(
                &camera,
                settings.max_bounce_depth,
                settings.samples_per_pixel,
                settings.accumulate,
            ),
            library: SceneLibrary::new(settings.scene_dir.clone()),
            camera,
            scene,
            selected,
        })
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Rebuild the camera for a new surface size, keeping the view
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.camera = self.camera.with_resolution(width, height)?;
        self.frames.update_camera(&self.camera);
        Ok(())
    }

    /// Map a pressed key to an action given the current selection and settings
    pub fn key_action(&self, key: VirtualKeyCode) -> Option<KeyAction> {
        let edit = match key {
            VirtualKeyCode::Escape => return Some(KeyAction::Quit),
            VirtualKeyCode::Tab => return Some(KeyAction::SelectNextSphere),
            VirtualKeyCode::N => PanelEdit::AddSphere,
            VirtualKeyCode::Delete | VirtualKeyCode::Back => PanelEdit::RemoveSphere(self.selected?),
            VirtualKeyCode::Equals | VirtualKeyCode::Minus => {
                let index = self.selected?;
                let mut sphere = *self.scene.spheres().get(index)?;
                if key == VirtualKeyCode::Equals {
                    sphere.radius *= RADIUS_STEP;
                } else {
                    sphere.radius /= RADIUS_STEP;
                }
                PanelEdit::EditSphere(index, sphere)
            }
            VirtualKeyCode::Up => PanelEdit::SetMaxBounceDepth(self.frames.max_bounce_depth() + 1),
            VirtualKeyCode::Down => {
                PanelEdit::SetMaxBounceDepth(self.frames.max_bounce_depth().saturating_sub(1))
            }
            VirtualKeyCode::Right => PanelEdit::SetSamplesPerPixel(self.frames.samples_per_pixel() + 1),
            VirtualKeyCode::Left => {
                PanelEdit::SetSamplesPerPixel(self.frames.samples_per_pixel().saturating_sub(1))
            }
            VirtualKeyCode::F5 => PanelEdit::SaveScene(QUICKSAVE.to_string()),
            VirtualKeyCode::F9 => PanelEdit::LoadScene(QUICKSAVE.to_string()),
            VirtualKeyCode::R => PanelEdit::ResetCamera,
            VirtualKeyCode::Space => PanelEdit::ResetAccumulation,
            VirtualKeyCode::T => PanelEdit::SetAccumulation(!self.frames.accumulation_enabled()),
            _ => return None,
        };
        Some(KeyAction::Edit(edit))
    }

    pub fn select_next_sphere(&mut self) -> String {
        let count = self.scene.spheres().len();
        self.selected = match (self.selected, count) {
            (_, 0) => None,
            (Some(i), _) => Some((i + 1) % count),
            (None, _) => Some(0),
        };
        match self.selected {
            Some(i) => format!("Selected sphere {}", i),
            None => "No spheres".to_string(),
        }
    }

    /// Apply one panel edit and describe the result. Failed edits leave the
    /// scene and camera as they were.
    pub fn apply_panel_edit(&mut self, edit: PanelEdit) -> Result<String> {
        debug!("Panel edit: {:?}", edit);
        let status = match edit {
            PanelEdit::AddSphere => {
                let center = self.camera.view().look_from + self.camera.forward() * NEW_SPHERE_DISTANCE;
                let sphere = Sphere::new(center, NEW_SPHERE_RADIUS, Material::diffuse(Vec3::splat(0.8)))?;
                let index = self.scene.add_sphere(sphere)?;
                self.selected = Some(index);
                format!("Added sphere {}", index)
            }
            PanelEdit::RemoveSphere(index) => {
                self.scene.remove_sphere(index)?;
                let count = self.scene.spheres().len();
                self.selected = self.selected.and_then(|s| (count > 0).then(|| s.min(count - 1)));
                format!("Removed sphere {}", index)
            }
            PanelEdit::EditSphere(index, sphere) => {
                self.scene.edit_sphere(index, sphere)?;
                format!("Sphere {} radius {:.3}", index, sphere.radius)
            }
            PanelEdit::SetMaxBounceDepth(depth) => {
                self.frames.set_max_bounce_depth(depth);
                format!("Max bounce depth {}", self.frames.max_bounce_depth())
            }
            PanelEdit::SetSamplesPerPixel(samples) => {
                self.frames.set_samples_per_pixel(samples);
                format!("Samples per pixel {}", self.frames.samples_per_pixel())
            }
            PanelEdit::SetAccumulation(enabled) => {
                self.frames.set_accumulation(enabled);
                if enabled {
                    "Accumulation on".to_string()
                } else {
                    "Accumulation off".to_string()
                }
            }
            PanelEdit::SaveScene(name) => {
                let path = self.library.save(&name, self.scene.spheres())?;
                format!("Saved {}", path.display())
            }
            PanelEdit::LoadScene(name) => {
                let spheres = self.library.load(&name)?;
                let count = spheres.len();
                self.scene.replace_spheres(spheres)?;
                self.selected = (count > 0).then_some(0);
                format!("Loaded {} spheres from {}", count, name)
            }
            PanelEdit::ResetCamera => {
                let (width, height) = self.camera.resolution();
                let mut camera = Camera::default_for(width, height)?;
                let fov = self.camera.view().vertical_fov;
                camera.edit(|view| view.vertical_fov = fov)?;
                self.camera = camera;
                self.orbit = OrbitState::from_camera(&self.camera);
                "Camera reset".to_string()
            }
            PanelEdit::ResetAccumulation => {
                self.frames.request_reset();
                "Accumulation reset".to_string()
            }
        };
        Ok(status)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::accumulation::AccumulationState;
    use crate::buffers::{SceneSink, SceneSynchronizer};
    use crate::error::TracerError;
    use crate::scene::FlatMeshes;
    use pathtracer_shared::GpuSphere;

    struct NullSink;

    impl SceneSink for NullSink {
        fn upload_spheres(&mut self, _spheres: &[GpuSphere]) {}
        fn upload_meshes(&mut self, _meshes: &FlatMeshes) {}
    }

    fn session() -> Session {
        Session::new(&RenderSettings::default(), 320, 180).unwrap()
    }

    #[test]
    fn drag_delta_only_while_pressed() {
        let mut input = InputState::new();
        let at = |x, y| winit::dpi::PhysicalPosition::new(x, y);
        assert_eq!(input.handle_cursor_moved(at(10.0, 10.0)), None);
        input.handle_mouse_input(MouseButton::Left, ElementState::Pressed);
        assert_eq!(input.handle_cursor_moved(at(15.0, 8.0)), Some((5.0, -2.0)));
        input.handle_mouse_input(MouseButton::Left, ElementState::Released);
        assert_eq!(input.handle_cursor_moved(at(20.0, 8.0)), None);
    }

    #[test]
    fn focus_loss_drops_drag_anchor() {
        let mut input = InputState::new();
        let at = |x, y| winit::dpi::PhysicalPosition::new(x, y);
        input.handle_mouse_input(MouseButton::Left, ElementState::Pressed);
        input.handle_cursor_moved(at(10.0, 10.0));
        input.release_all();

        input.handle_mouse_input(MouseButton::Left, ElementState::Pressed);
        assert_eq!(input.handle_cursor_moved(at(900.0, 600.0)), None);
        assert_eq!(input.handle_cursor_moved(at(905.0, 600.0)), Some((5.0, 0.0)));
    }

    #[test]
    fn movement_keys_tracked() {
        let mut input = InputState::new();
        assert!(input.handle_movement_key(VirtualKeyCode::W, ElementState::Pressed));
        assert!(input.held.forward);
        assert!(!input.handle_movement_key(VirtualKeyCode::Q, ElementState::Pressed));
        assert!(input.handle_movement_key(VirtualKeyCode::W, ElementState::Released));
        assert!(!input.held.any());
    }

    #[test]
    fn movement_is_frame_rate_independent() {
        let held = HeldKeys {
            forward: true,
            ..HeldKeys::default()
        };
        let mut slow = Camera::default_for(100, 100).unwrap();
        let mut fast = slow;
        let start = slow.view().look_from;

        CameraController::apply_movement(&mut slow, held, 30.0).unwrap();
        for _ in 0..4 {
            CameraController::apply_movement(&mut fast, held, 120.0).unwrap();
        }
        let slow_distance = (slow.view().look_from - start).length();
        let fast_distance = (fast.view().look_from - start).length();
        assert!((slow_distance - fast_distance).abs() < 1e-4);
        assert!((slow_distance - RaytracerConfig::CAMERA_MOVE_SPEED / 30.0).abs() < 1e-4);
    }

    #[test]
    fn movement_keeps_orientation() {
        let mut camera = Camera::default_for(100, 100).unwrap();
        let basis = camera.basis();
        let held = HeldKeys {
            right: true,
            backward: true,
            ..HeldKeys::default()
        };
        assert!(CameraController::apply_movement(&mut camera, held, 60.0).unwrap());
        let (u, v, w) = camera.basis();
        assert!(u.abs_diff_eq(basis.0, 1e-5));
        assert!(v.abs_diff_eq(basis.1, 1e-5));
        assert!(w.abs_diff_eq(basis.2, 1e-5));
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut camera = Camera::default_for(100, 100).unwrap();
        let held = HeldKeys {
            left: true,
            right: true,
            ..HeldKeys::default()
        };
        assert!(!CameraController::apply_movement(&mut camera, held, 60.0).unwrap());
    }

    #[test]
    fn zoom_is_clamped() {
        let mut camera = Camera::default_for(100, 100).unwrap();
        assert!(CameraController::zoom(&mut camera, 1.0).unwrap());
        assert_eq!(camera.view().vertical_fov, 90.0 - RaytracerConfig::CAMERA_ZOOM_STEP);
        CameraController::zoom(&mut camera, 1000.0).unwrap();
        assert_eq!(camera.view().vertical_fov, RaytracerConfig::CAMERA_MIN_FOV);
        assert!(!CameraController::zoom(&mut camera, 1.0).unwrap());
        CameraController::zoom(&mut camera, -1000.0).unwrap();
        assert_eq!(camera.view().vertical_fov, RaytracerConfig::CAMERA_MAX_FOV);
    }

    #[test]
    fn orbit_round_trips_current_direction() {
        let camera = Camera::default_for(100, 100).unwrap();
        let orbit = OrbitState::from_camera(&camera);
        assert!(orbit.direction().abs_diff_eq(camera.forward(), 1e-4));
    }

    #[test]
    fn orbit_drag_keeps_focal_length() {
        let mut camera = Camera::default_for(100, 100).unwrap();
        let focal = camera.focal_length();
        let eye = camera.view().look_from;
        let mut orbit = OrbitState::from_camera(&camera);
        for _ in 0..50 {
            orbit.apply_drag(&mut camera, 13.0, -7.0).unwrap();
        }
        assert!((camera.focal_length() - focal).abs() < 1e-3);
        assert_eq!(camera.view().look_from, eye);
        // pitch saturates below vertical, so the basis stays valid
        for _ in 0..1000 {
            orbit.apply_drag(&mut camera, 0.0, -50.0).unwrap();
        }
        assert!(camera.forward().y < 0.99);
    }

    #[test]
    fn orbit_resets_accumulation() {
        let mut session = session();
        session.frames.begin_frame(0.0);
        session.orbit.apply_drag(&mut session.camera, 5.0, 0.0).unwrap();
        assert!(session.frames.update_camera(&session.camera));
        assert_eq!(session.frames.state(), AccumulationState::Reset);
    }

    #[test]
    fn add_edit_remove_through_panel() {
        let mut session = session();
        let mut sync = SceneSynchronizer::new();
        session.frames.update_scene(sync.sync(&mut session.scene, &mut NullSink));
        session.frames.begin_frame(0.0);

        session.apply_panel_edit(PanelEdit::AddSphere).unwrap();
        assert_eq!(session.scene.spheres().len(), 5);
        assert_eq!(session.selected(), Some(4));
        assert!(session.frames.update_scene(sync.sync(&mut session.scene, &mut NullSink)));
        session.frames.begin_frame(0.0);

        let Some(KeyAction::Edit(grow)) = session.key_action(VirtualKeyCode::Equals) else {
            panic!("expected an edit");
        };
        session.apply_panel_edit(grow).unwrap();
        assert!((session.scene.spheres()[4].radius - NEW_SPHERE_RADIUS * RADIUS_STEP).abs() < 1e-6);

        session.apply_panel_edit(PanelEdit::RemoveSphere(4)).unwrap();
        assert_eq!(session.scene.spheres().len(), 4);
        assert_eq!(session.selected(), Some(3));
    }

    #[test]
    fn failed_edit_leaves_scene() {
        let mut session = session();
        let before = session.scene.spheres().to_vec();
        let err = session.apply_panel_edit(PanelEdit::RemoveSphere(99)).unwrap_err();
        assert!(matches!(err, TracerError::SphereIndex { .. }));
        let mut bad = before[0];
        bad.radius = 0.0;
        assert!(session.apply_panel_edit(PanelEdit::EditSphere(0, bad)).is_err());
        assert_eq!(session.scene.spheres(), before.as_slice());
    }

    #[test]
    fn quicksave_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RenderSettings {
            scene_dir: dir.path().to_path_buf(),
            ..RenderSettings::default()
        };
        let mut session = Session::new(&settings, 64, 64).unwrap();
        let Some(KeyAction::Edit(save)) = session.key_action(VirtualKeyCode::F5) else {
            panic!("expected save");
        };
        session.apply_panel_edit(save).unwrap();
        let saved = session.scene.spheres().to_vec();

        session.apply_panel_edit(PanelEdit::RemoveSphere(0)).unwrap();
        let Some(KeyAction::Edit(load)) = session.key_action(VirtualKeyCode::F9) else {
            panic!("expected load");
        };
        let status = session.apply_panel_edit(load).unwrap();
        assert_eq!(session.scene.spheres(), saved.as_slice());
        assert!(status.contains("4 spheres"));
    }

    #[test]
    fn load_failure_keeps_scene() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RenderSettings {
            scene_dir: dir.path().to_path_buf(),
            ..RenderSettings::default()
        };
        let mut session = Session::new(&settings, 64, 64).unwrap();
        std::fs::write(dir.path().join("broken.txt"), "1 2 3\n").unwrap();
        let before = session.scene.spheres().to_vec();
        let err = session
            .apply_panel_edit(PanelEdit::LoadScene("broken".into()))
            .unwrap_err();
        assert!(matches!(err, TracerError::SceneFormat { .. }));
        assert_eq!(session.scene.spheres(), before.as_slice());
    }

    #[test]
    fn settings_shortcuts() {
        let mut session = session();
        let depth = session.frames.max_bounce_depth();
        let Some(KeyAction::Edit(up)) = session.key_action(VirtualKeyCode::Up) else {
            panic!("expected edit");
        };
        session.apply_panel_edit(up).unwrap();
        assert_eq!(session.frames.max_bounce_depth(), depth + 1);

        let Some(KeyAction::Edit(toggle)) = session.key_action(VirtualKeyCode::T) else {
            panic!("expected edit");
        };
        session.apply_panel_edit(toggle).unwrap();
        assert!(!session.frames.accumulation_enabled());

        assert_eq!(session.key_action(VirtualKeyCode::Escape), Some(KeyAction::Quit));
        assert_eq!(session.key_action(VirtualKeyCode::Q), None);
    }

    #[test]
    fn reset_camera_restores_default_view() {
        let mut session = session();
        let original = *session.camera.view();
        session.orbit.apply_drag(&mut session.camera, 40.0, 10.0).unwrap();
        assert_ne!(*session.camera.view(), original);
        session.apply_panel_edit(PanelEdit::ResetCamera).unwrap();
        assert_eq!(*session.camera.view(), original);
    }

    #[test]
    fn select_next_wraps() {
        let mut session = session();
        assert_eq!(session.selected(), Some(0));
        for _ in 0..4 {
            session.select_next_sphere();
        }
        assert_eq!(session.selected(), Some(0));
    }
}
