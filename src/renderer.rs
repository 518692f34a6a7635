use log::{debug, info};
use pathtracer_shared::{Bindings, DispatchHelper, FrameConstants, RaytracerConfig};

use crate::buffers::BufferManager;
use crate::config::RenderSettings;
use crate::error::{Result, TracerError};
use crate::programs::{self, ProgramSource};

const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
const ACCUMULATION_TEXEL_SIZE: u64 = 16; // one vec4<f32> per pixel

/// GPU resources and rendering pipelines
pub struct RenderState {
    pub surface: wgpu::Surface,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,

    // Pipelines
    pub compute_pipeline: wgpu::ComputePipeline,
    pub render_pipeline: wgpu::RenderPipeline,
    compute_bind_group_layout: wgpu::BindGroupLayout,
    render_bind_group_layout: wgpu::BindGroupLayout,

    // Per-resolution targets
    pub output_texture: wgpu::Texture,
    pub accumulation_buffer: wgpu::Buffer,
    pub sampler: wgpu::Sampler,

    // Bind groups
    pub compute_bind_group: wgpu::BindGroup,
    pub render_bind_group: wgpu::BindGroup,
}

/// Performance tracking
pub struct PerformanceState {
    interval_start: std::time::Instant,
    pub last_frame_time: std::time::Duration,
    pub frame_count: u64,
    fps: f32,
}

impl RenderState {
    /// Create the device, compile both programs and allocate the frame targets.
    /// Scene storage comes from `buffers`, which is created against the same device.
    pub async fn new(
        window: &winit::window::Window,
        settings: &RenderSettings,
    ) -> Result<(Self, BufferManager)> {
        let kernel = match &settings.kernel_override {
            Some(path) => ProgramSource::from_file(ProgramSource::trace_kernel().label, path)?,
            None => ProgramSource::trace_kernel(),
        };
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(TracerError::InvalidConfiguration(format!(
                "window has zero size {}x{}",
                size.width, size.height
            )));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window) }?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(TracerError::AdapterUnavailable)?;
        info!("Using adapter: {:?}", adapter.get_info());

        // Large windows need more than the default 128 MiB storage binding
        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    features: wgpu::Features::PUSH_CONSTANTS,
                    limits: wgpu::Limits {
                        max_push_constant_size: RaytracerConfig::MAX_PUSH_CONSTANT_SIZE,
                        max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                        max_buffer_size: adapter_limits.max_buffer_size,
                        max_texture_dimension_2d: adapter_limits.max_texture_dimension_2d,
                        ..Default::default()
                    },
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(TracerError::AdapterUnavailable)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let trace_module = programs::compile(&device, &kernel).await?;
        let display = ProgramSource::display();
        let display_module = programs::compile(&device, &display).await?;

        let (compute_bind_group_layout, render_bind_group_layout) = Self::create_bind_group_layouts(&device);
        let (compute_pipeline, render_pipeline) = Self::create_pipelines(
            &device,
            &trace_module,
            &display_module,
            &compute_bind_group_layout,
            &render_bind_group_layout,
            surface_format,
            (kernel.label, display.label),
        )
        .await?;

        check_render_targets(size.width, size.height, &device.limits())?;
        let output_texture = Self::create_output_texture(&device, size.width, size.height);
        let accumulation_buffer = Self::create_accumulation_buffer(&device, size.width, size.height);

        // Create sampler for texture
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Output Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let buffers = BufferManager::new(&device);
        let compute_bind_group = Self::create_compute_bind_group(
            &device,
            &compute_bind_group_layout,
            &output_texture,
            &accumulation_buffer,
            &buffers,
        );
        let render_bind_group =
            Self::create_render_bind_group(&device, &render_bind_group_layout, &output_texture, &sampler);

        info!(
            "Renderer ready: {}x{}, surface format {:?}",
            size.width, size.height, surface_format
        );

        let state = Self {
            surface,
            device,
            queue,
            config,
            size,
            compute_pipeline,
            render_pipeline,
            compute_bind_group_layout,
            render_bind_group_layout,
            output_texture,
            accumulation_buffer,
            sampler,
            compute_bind_group,
            render_bind_group,
        };
        Ok((state, buffers))
    }

    fn create_bind_group_layouts(device: &wgpu::Device) -> (wgpu::BindGroupLayout, wgpu::BindGroupLayout) {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let compute_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Compute Bind Group Layout"),
            entries: &[
                storage(Bindings::SPHERES, true),
                storage(Bindings::MESHES, true),
                storage(Bindings::TRIANGLES, true),
                storage(Bindings::MATERIALS, true),
                storage(Bindings::ACCUMULATION, false),
                wgpu::BindGroupLayoutEntry {
                    binding: Bindings::OUTPUT_IMAGE,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: OUTPUT_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let render_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Render Bind Group Layout"),
            entries: &[
                // Binding 0: traced image
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                // Binding 1: sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        (compute_bind_group_layout, render_bind_group_layout)
    }

    async fn create_pipelines(
        device: &wgpu::Device,
        trace_module: &wgpu::ShaderModule,
        display_module: &wgpu::ShaderModule,
        compute_bind_group_layout: &wgpu::BindGroupLayout,
        render_bind_group_layout: &wgpu::BindGroupLayout,
        surface_format: wgpu::TextureFormat,
        labels: (&'static str, &'static str),
    ) -> Result<(wgpu::ComputePipeline, wgpu::RenderPipeline)> {
        // Compute pipeline
        let compute_pipeline = programs::link(device, labels.0, |device| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Compute Pipeline Layout"),
                bind_group_layouts: &[compute_bind_group_layout],
                push_constant_ranges: &[wgpu::PushConstantRange {
                    stages: wgpu::ShaderStages::COMPUTE,
                    range: 0..std::mem::size_of::<FrameConstants>() as u32,
                }],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Compute Pipeline"),
                layout: Some(&layout),
                module: trace_module,
                entry_point: programs::TRACE_KERNEL_ENTRY,
            })
        })
        .await?;

        // Render pipeline
        let render_pipeline = programs::link(device, labels.1, |device| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[render_bind_group_layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Render Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: display_module,
                    entry_point: programs::DISPLAY_VERTEX_ENTRY,
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: display_module,
                    entry_point: programs::DISPLAY_FRAGMENT_ENTRY,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            })
        })
        .await?;

        Ok((compute_pipeline, render_pipeline))
    }

    fn create_output_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Output Image"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        })
    }

    fn create_accumulation_buffer(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Accumulation Buffer"),
            size: width as u64 * height as u64 * ACCUMULATION_TEXEL_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_compute_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        output_texture: &wgpu::Texture,
        accumulation_buffer: &wgpu::Buffer,
        buffers: &BufferManager,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Compute Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: Bindings::SPHERES,
                    resource: buffers.spheres_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: Bindings::MESHES,
                    resource: buffers.meshes_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: Bindings::TRIANGLES,
                    resource: buffers.triangles_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: Bindings::MATERIALS,
                    resource: buffers.materials_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: Bindings::ACCUMULATION,
                    resource: accumulation_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: Bindings::OUTPUT_IMAGE,
                    resource: wgpu::BindingResource::TextureView(
                        &output_texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    ),
                },
            ],
        })
    }

    fn create_render_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        output_texture: &wgpu::Texture,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Render Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(
                        &output_texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Reconfigure the surface and reallocate the output image and accumulation
    /// buffer. Returns false for a zero-sized (minimized) window, which is ignored.
    ///
    /// A size the device cannot hold render targets for is an error; the old
    /// targets stay in place and are stretched onto the resized surface.
    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>, buffers: &BufferManager) -> Result<bool> {
        if new_size.width == 0 || new_size.height == 0 {
            return Ok(false);
        }
        let limits = self.device.limits();
        let max_dimension = limits.max_texture_dimension_2d;
        if new_size.width <= max_dimension && new_size.height <= max_dimension {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
        check_render_targets(new_size.width, new_size.height, &limits)?;

        self.output_texture = Self::create_output_texture(&self.device, new_size.width, new_size.height);
        self.accumulation_buffer = Self::create_accumulation_buffer(&self.device, new_size.width, new_size.height);
        self.render_bind_group = Self::create_render_bind_group(
            &self.device,
            &self.render_bind_group_layout,
            &self.output_texture,
            &self.sampler,
        );
        self.recreate_bind_groups(buffers);
        debug!(
            "Resized render targets to {}x{} ({} padding invocations per dispatch)",
            new_size.width,
            new_size.height,
            DispatchHelper::padding_invocations(new_size.width, new_size.height)
        );
        Ok(true)
    }

    /// Reconfigure the surface after it was lost or became outdated
    pub fn reconfigure_surface(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Rebuild the compute bind group after a scene buffer was reallocated
    pub fn recreate_bind_groups(&mut self, buffers: &BufferManager) {
        self.compute_bind_group = Self::create_compute_bind_group(
            &self.device,
            &self.compute_bind_group_layout,
            &self.output_texture,
            &self.accumulation_buffer,
            buffers,
        );
    }
}

/// Reject resolutions whose output image or accumulation buffer the device cannot bind
pub fn check_render_targets(width: u32, height: u32, limits: &wgpu::Limits) -> Result<()> {
    let max_dimension = limits.max_texture_dimension_2d;
    if width > max_dimension || height > max_dimension {
        return Err(TracerError::InvalidConfiguration(format!(
            "{}x{} exceeds the maximum image dimension {}",
            width, height, max_dimension
        )));
    }
    let accumulation_size = width as u64 * height as u64 * ACCUMULATION_TEXEL_SIZE;
    let max_size = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    if accumulation_size > max_size {
        return Err(TracerError::InvalidConfiguration(format!(
            "{}x{} needs a {:.1} MiB accumulation buffer, device allows {:.1} MiB",
            width,
            height,
            accumulation_size as f64 / (1024.0 * 1024.0),
            max_size as f64 / (1024.0 * 1024.0)
        )));
    }
    Ok(())
}

impl PerformanceState {
    pub fn new() -> Self {
        Self {
            interval_start: std::time::Instant::now(),
            last_frame_time: std::time::Duration::ZERO,
            frame_count: 0,
            fps: 0.0,
        }
    }

    /// Record one presented frame; returns true when a new FPS value was computed
    pub fn update_frame_count(&mut self, frame_time: std::time::Duration) -> bool {
        self.frame_count += 1;
        self.last_frame_time = frame_time;

        if self.frame_count % RaytracerConfig::PERFORMANCE_STATS_INTERVAL != 0 {
            return false;
        }
        let elapsed = self.interval_start.elapsed().as_secs_f32();
        if elapsed > 0.0 {
            self.fps = RaytracerConfig::PERFORMANCE_STATS_INTERVAL as f32 / elapsed;
        }
        self.interval_start = std::time::Instant::now();
        info!(
            "FPS: {:.1}, Last frame: {:.2}ms",
            self.fps,
            self.last_frame_time.as_secs_f32() * RaytracerConfig::MILLISECONDS_PER_SECOND
        );
        true
    }

    /// Frames per second over the last stats interval
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for PerformanceState {
    fn default() -> Self {
        Self::new()
    }
}
