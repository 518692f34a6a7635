use std::time::Instant;

use log::{error, info, warn};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

use pathtracer_gpu::buffers::{BufferManager, SceneSynchronizer};
use pathtracer_gpu::compute::ComputeRenderer;
use pathtracer_gpu::config::RenderSettings;
use pathtracer_gpu::error::Result;
use pathtracer_gpu::input::{CameraController, InputState, KeyAction, Session};
use pathtracer_gpu::renderer::{PerformanceState, RenderState};

const WINDOW_TITLE: &str = "GPU Path Tracer";
const PIXELS_PER_SCROLL_LINE: f32 = 40.0;

/// Window, GPU state and the interactive session driven by the event loop
struct App {
    window: Window,
    render: RenderState,
    buffers: BufferManager,
    sync: SceneSynchronizer,
    session: Session,
    input: InputState,
    performance: PerformanceState,
    status: String,
    last_frame: Instant,
}

impl App {
    async fn new(window: Window, settings: &RenderSettings) -> Result<Self> {
        let (render, buffers) = RenderState::new(&window, settings).await?;
        let session = Session::new(settings, render.size.width, render.size.height)?;
        info!(
            "Scene: {} spheres, {} meshes; scene files in {}",
            session.scene.spheres().len(),
            session.scene.meshes().len(),
            session.library.dir().display()
        );

        let app = Self {
            window,
            render,
            buffers,
            sync: SceneSynchronizer::new(),
            session,
            input: InputState::new(),
            performance: PerformanceState::new(),
            status: "Ready".to_string(),
            last_frame: Instant::now(),
        };
        app.update_title();
        Ok(app)
    }

    fn update_title(&self) {
        self.window.set_title(&format!(
            "{} - FPS: {:.1} - {}",
            WINDOW_TITLE,
            self.performance.fps(),
            self.status
        ));
    }

    /// Show the outcome of a user action; failures are recoverable and keep the loop running
    fn report(&mut self, outcome: Result<String>) {
        match outcome {
            Ok(status) => {
                info!("{}", status);
                self.status = status;
            }
            Err(err) => {
                if err.is_fatal() {
                    error!("{}", err);
                } else {
                    warn!("{}", err);
                }
                self.status = err.to_string();
            }
        }
        self.update_title();
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        let outcome = match self.render.resize(new_size, &self.buffers) {
            Ok(false) => return,
            Ok(true) => self.session.resize(new_size.width, new_size.height),
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            self.report(Err(err));
        }
    }

    fn handle_key(&mut self, input: KeyboardInput, control_flow: &mut ControlFlow) {
        let Some(key) = input.virtual_keycode else {
            return;
        };
        if self.input.handle_movement_key(key, input.state) || input.state != ElementState::Pressed {
            return;
        }
        match self.session.key_action(key) {
            Some(KeyAction::Quit) => control_flow.set_exit(),
            Some(KeyAction::SelectNextSphere) => {
                let status = self.session.select_next_sphere();
                self.report(Ok(status));
            }
            Some(KeyAction::Edit(edit)) => {
                let outcome = self.session.apply_panel_edit(edit);
                self.report(outcome);
            }
            None => {}
        }
    }

    fn handle_drag(&mut self, dx: f64, dy: f64) {
        let session = &mut self.session;
        if let Err(err) = session.orbit.apply_drag(&mut session.camera, dx, dy) {
            self.report(Err(err));
        }
    }

    fn handle_scroll(&mut self, delta: MouseScrollDelta) {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_SCROLL_LINE,
        };
        if let Err(err) = CameraController::zoom(&mut self.session.camera, lines) {
            self.report(Err(err));
        }
    }

    /// Move, sync, trace and present one frame
    fn render_frame(&mut self) -> std::result::Result<(), wgpu::SurfaceError> {
        let frame_start = Instant::now();
        let fps = 1.0 / frame_start.duration_since(self.last_frame).as_secs_f32().max(f32::EPSILON);
        self.last_frame = frame_start;

        if let Err(err) = CameraController::apply_movement(&mut self.session.camera, self.input.held, fps) {
            self.report(Err(err));
        }
        self.session.frames.update_camera(&self.session.camera);

        let report = {
            let mut sink = self.buffers.sink(&self.render.device, &self.render.queue);
            self.sync.sync(&mut self.session.scene, &mut sink)
        };
        self.session.frames.update_scene(report);

        let frame = self.session.frames.begin_frame(rand::random::<f32>());
        let constants = self.session.frames.constants(&frame);
        if let Err(err) = ComputeRenderer::render_frame(&mut self.render, &mut self.buffers, &frame, &constants) {
            // Nothing was traced, so the next frame must start over
            self.session.frames.request_reset();
            return Err(err);
        }

        if self.performance.update_frame_count(frame_start.elapsed()) {
            self.update_title();
        }
        Ok(())
    }
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", context, err);
    std::process::exit(1);
}

fn main() {
    env_logger::init();

    let settings = RenderSettings::from_env().unwrap_or_else(|err| fail("Invalid settings", err));
    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title(WINDOW_TITLE)
        .with_inner_size(PhysicalSize::new(settings.width, settings.height))
        .build(&event_loop)
        .unwrap_or_else(|err| fail("Failed to create window", err));

    let mut app = pollster::block_on(App::new(window, &settings))
        .unwrap_or_else(|err| fail("Failed to initialize renderer", err));

    event_loop.run(move |event, _, control_flow| match event {
        Event::WindowEvent { event, window_id } if window_id == app.window.id() => match event {
            WindowEvent::CloseRequested => control_flow.set_exit(),
            WindowEvent::Resized(physical_size) => app.resize(physical_size),
            WindowEvent::ScaleFactorChanged { new_inner_size, .. } => app.resize(*new_inner_size),
            WindowEvent::Focused(false) => app.input.release_all(),
            WindowEvent::KeyboardInput { input, .. } => app.handle_key(input, control_flow),
            WindowEvent::MouseInput { button, state, .. } => app.input.handle_mouse_input(button, state),
            WindowEvent::CursorMoved { position, .. } => {
                if let Some((dx, dy)) = app.input.handle_cursor_moved(position) {
                    app.handle_drag(dx, dy);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => app.handle_scroll(delta),
            _ => {}
        },
        Event::RedrawRequested(window_id) if window_id == app.window.id() => match app.render_frame() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => app.render.reconfigure_surface(),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("GPU out of memory");
                control_flow.set_exit_with_code(1);
            }
            Err(err) => warn!("{:?}", err),
        },
        Event::MainEventsCleared => app.window.request_redraw(),
        _ => {}
    });
}
