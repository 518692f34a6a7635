use pathtracer_shared::{DispatchHelper, FrameConstants};

use crate::accumulation::FrameState;
use crate::buffers::BufferManager;
use crate::renderer::RenderState;

/// Per-frame command sequence: trace into the output image, then draw it to the surface
pub struct ComputeRenderer;

impl ComputeRenderer {
    /// Encode, submit and present one progressive frame
    pub fn render_frame(
        render: &mut RenderState,
        buffers: &mut BufferManager,
        frame: &FrameState,
        constants: &FrameConstants,
    ) -> Result<(), wgpu::SurfaceError> {
        // A reallocated scene buffer invalidates the bind group that points at it
        if buffers.take_bind_group_dirty() {
            render.recreate_bind_groups(buffers);
        }

        let output = render.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = render
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        if frame.cleared {
            encoder.clear_buffer(&render.accumulation_buffer, 0, None);
        }

        Self::execute_compute_pass(render, &mut encoder, constants);
        // The compute pass has ended, so the output image is complete before it is sampled below
        Self::execute_display_pass(render, &mut encoder, &view);

        render.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn execute_compute_pass(
        render: &RenderState,
        encoder: &mut wgpu::CommandEncoder,
        constants: &FrameConstants,
    ) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Trace Pass"),
        });

        compute_pass.set_pipeline(&render.compute_pipeline);
        compute_pass.set_bind_group(0, &render.compute_bind_group, &[]);
        compute_pass.set_push_constants(0, bytemuck::bytes_of(constants));

        let (workgroup_x, workgroup_y) = DispatchHelper::workgroup_count(constants.width, constants.height);
        compute_pass.dispatch_workgroups(workgroup_x, workgroup_y, 1);
    }

    fn execute_display_pass(render: &RenderState, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Display Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: true,
                },
            })],
            depth_stencil_attachment: None,
        });

        render_pass.set_pipeline(&render.render_pipeline);
        render_pass.set_bind_group(0, &render.render_bind_group, &[]);
        render_pass.draw(0..3, 0..1); // Draw fullscreen triangle
    }
}
