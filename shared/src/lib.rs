#![no_std]

//! Records shared between the host and the trace kernel.
//!
//! Every struct here mirrors a WGSL struct in `shaders/trace.wgsl` field for
//! field. Storage-buffer structs follow WGSL host-shareable layout rules, so
//! each `vec3<f32>` occupies 16 bytes unless a scalar is packed into its
//! fourth lane. Reordering a field or changing a padding slot on one side only
//! corrupts memory silently on the other; the tests at the bottom pin sizes
//! and offsets.

use bytemuck::{Pod, Zeroable};

/// Configuration constants for the raytracer
pub struct RaytracerConfig;

impl RaytracerConfig {
    pub const WORKGROUP_SIZE: (u32, u32) = (8, 8);
    pub const DEFAULT_SPHERE_CAPACITY: usize = 64;
    pub const DEFAULT_MESH_CAPACITY: usize = 16;
    pub const DEFAULT_TRIANGLE_CAPACITY: usize = 1024;
    pub const DEFAULT_MATERIAL_CAPACITY: usize = 16;

    pub const CAMERA_MOVE_SPEED: f32 = 2.0; // world units per second
    pub const CAMERA_ROTATE_SENSITIVITY: f32 = 0.005;
    pub const CAMERA_PITCH_CLAMP: f32 = 0.99;
    pub const CAMERA_ZOOM_STEP: f32 = 2.0; // degrees per wheel line
    pub const CAMERA_MIN_FOV: f32 = 10.0;
    pub const CAMERA_MAX_FOV: f32 = 150.0;
    pub const MIN_MOVEMENT_FPS: f32 = 1.0;

    pub const MAX_BOUNCE_DEPTH: u32 = 64;
    pub const MAX_SAMPLES_PER_PIXEL: u32 = 64;

    // GPU configuration constants
    pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;
    pub const PERFORMANCE_STATS_INTERVAL: u64 = 60; // frames
    pub const MILLISECONDS_PER_SECOND: f32 = 1000.0;
}

/// Binding slots of compute bind group 0.
pub struct Bindings;

impl Bindings {
    pub const SPHERES: u32 = 0;
    pub const MESHES: u32 = 1;
    pub const TRIANGLES: u32 = 2;
    pub const MATERIALS: u32 = 3;
    pub const ACCUMULATION: u32 = 4;
    pub const OUTPUT_IMAGE: u32 = 5;
}

/// Optical material. 32 bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuMaterial {
    pub base_color: [f32; 4],     // rgba (16 bytes)
    pub emission_color: [f32; 3], // rgb (12 bytes)
    pub emission_strength: f32,   // packed into the vec3's fourth lane (4 bytes)
}

/// Sphere primitive. 48 bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuSphere {
    pub center: [f32; 3],      // 12 bytes
    pub radius: f32,           // 4 bytes
    pub material: GpuMaterial, // 32 bytes
}

/// Triangle with per-vertex normals. 96 bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuTriangle {
    pub pos_a: [f32; 3],
    pub _padding0: f32,
    pub pos_b: [f32; 3],
    pub _padding1: f32,
    pub pos_c: [f32; 3],
    pub _padding2: f32,
    pub normal_a: [f32; 3],
    pub _padding3: f32,
    pub normal_b: [f32; 3],
    pub _padding4: f32,
    pub normal_c: [f32; 3],
    pub _padding5: f32,
}

/// Mesh header; its triangles are `triangles[first_triangle..first_triangle + triangle_count]`. 80 bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuMeshInfo {
    pub first_triangle: u32,
    pub triangle_count: u32,
    pub material_index: u32, // index into the materials buffer
    pub _padding0: u32,
    pub bounds_min: [f32; 3],
    pub _padding1: f32,
    pub bounds_max: [f32; 3],
    pub _padding2: f32,
    pub material: GpuMaterial, // denormalized copy of materials[material_index]
}

/// Push constants for the trace kernel. 96 bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FrameConstants {
    pub center: [f32; 3],
    pub width: u32,
    pub pixel00: [f32; 3],
    pub height: u32,
    pub delta_u: [f32; 3],
    pub max_bounce_depth: u32,
    pub delta_v: [f32; 3],
    pub samples_per_pixel: u32,
    pub frame_index: u32,
    pub random_seed: f32,
    pub sphere_count: u32,
    pub mesh_count: u32,
    pub history_weight: f32, // accum' = accum * history_weight + sample * sample_weight
    pub sample_weight: f32,
    pub _padding: [u32; 2],
}

impl GpuMaterial {
    pub fn new(base_color: [f32; 4], emission_color: [f32; 3], emission_strength: f32) -> Self {
        Self {
            base_color,
            emission_color,
            emission_strength,
        }
    }
}

impl GpuSphere {
    pub fn new(center: [f32; 3], radius: f32, material: GpuMaterial) -> Self {
        Self {
            center,
            radius,
            material,
        }
    }
}

impl GpuTriangle {
    pub fn new(positions: [[f32; 3]; 3], normals: [[f32; 3]; 3]) -> Self {
        Self {
            pos_a: positions[0],
            pos_b: positions[1],
            pos_c: positions[2],
            normal_a: normals[0],
            normal_b: normals[1],
            normal_c: normals[2],
            ..Self::zeroed()
        }
    }
}

impl GpuMeshInfo {
    pub fn new(
        first_triangle: u32,
        triangle_count: u32,
        material_index: u32,
        bounds_min: [f32; 3],
        bounds_max: [f32; 3],
        material: GpuMaterial,
    ) -> Self {
        Self {
            first_triangle,
            triangle_count,
            material_index,
            bounds_min,
            bounds_max,
            material,
            ..Self::zeroed()
        }
    }
}

/// Helper functions for sizing the compute dispatch
pub struct DispatchHelper;

impl DispatchHelper {
    /// Workgroups needed to cover `width x height`; edge groups are padded and
    /// the kernel discards invocations outside the image.
    pub fn workgroup_count(width: u32, height: u32) -> (u32, u32) {
        let (group_x, group_y) = RaytracerConfig::WORKGROUP_SIZE;
        (width.div_ceil(group_x), height.div_ceil(group_y))
    }

    /// Number of padded invocations that fall outside the image.
    pub fn padding_invocations(width: u32, height: u32) -> u64 {
        let (groups_x, groups_y) = Self::workgroup_count(width, height);
        let (group_x, group_y) = RaytracerConfig::WORKGROUP_SIZE;
        let launched = (groups_x * group_x) as u64 * (groups_y * group_y) as u64;
        launched - width as u64 * height as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn record_strides_match_kernel() {
        assert_eq!(size_of::<GpuMaterial>(), 32);
        assert_eq!(size_of::<GpuSphere>(), 48);
        assert_eq!(size_of::<GpuTriangle>(), 96);
        assert_eq!(size_of::<GpuMeshInfo>(), 80);
        assert_eq!(size_of::<FrameConstants>(), 96);
        assert!(size_of::<FrameConstants>() as u32 <= RaytracerConfig::MAX_PUSH_CONSTANT_SIZE);
    }

    #[test]
    fn record_field_offsets() {
        assert_eq!(offset_of!(GpuMaterial, emission_color), 16);
        assert_eq!(offset_of!(GpuMaterial, emission_strength), 28);
        assert_eq!(offset_of!(GpuSphere, radius), 12);
        assert_eq!(offset_of!(GpuSphere, material), 16);
        assert_eq!(offset_of!(GpuTriangle, pos_b), 16);
        assert_eq!(offset_of!(GpuTriangle, normal_a), 48);
        assert_eq!(offset_of!(GpuTriangle, normal_c), 80);
        assert_eq!(offset_of!(GpuMeshInfo, bounds_min), 16);
        assert_eq!(offset_of!(GpuMeshInfo, bounds_max), 32);
        assert_eq!(offset_of!(GpuMeshInfo, material), 48);
        assert_eq!(offset_of!(FrameConstants, width), 12);
        assert_eq!(offset_of!(FrameConstants, samples_per_pixel), 60);
        assert_eq!(offset_of!(FrameConstants, frame_index), 64);
        assert_eq!(offset_of!(FrameConstants, history_weight), 80);
    }

    #[test]
    fn dispatch_covers_exact_multiples() {
        assert_eq!(DispatchHelper::workgroup_count(1280, 720), (160, 90));
        assert_eq!(DispatchHelper::padding_invocations(1280, 720), 0);
    }

    #[test]
    fn dispatch_pads_partial_groups() {
        // 1283x721 needs one extra column and row of groups
        assert_eq!(DispatchHelper::workgroup_count(1283, 721), (161, 91));
        let padding = DispatchHelper::padding_invocations(1283, 721);
        // 5 padded columns of 728 rows plus 7 padded rows of 1283 columns
        assert_eq!(padding, 5 * 728 + 7 * 1283);
    }

    #[test]
    fn dispatch_single_pixel() {
        assert_eq!(DispatchHelper::workgroup_count(1, 1), (1, 1));
        assert_eq!(DispatchHelper::padding_invocations(1, 1), 63);
    }

    #[test]
    fn triangle_constructor_zeroes_padding() {
        let triangle = GpuTriangle::new(
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            [[0.0, 0.0, 1.0]; 3],
        );
        assert_eq!(triangle._padding0, 0.0);
        assert_eq!(triangle._padding5, 0.0);
        assert_eq!(triangle.pos_b, [1.0, 0.0, 0.0]);
    }
}
