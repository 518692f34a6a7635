use log::{debug, info};
use pathtracer_shared::{GpuMaterial, GpuMeshInfo, GpuSphere, GpuTriangle, RaytracerConfig};

use crate::geometry::Sphere;
use crate::scene::{FlatMeshes, Mesh, Scene};

/// Destination of scene uploads. The GPU implementation is [`GpuSceneSink`].
pub trait SceneSink {
    fn upload_spheres(&mut self, spheres: &[GpuSphere]);
    fn upload_meshes(&mut self, meshes: &FlatMeshes);
}

/// Outcome of one [`SceneSynchronizer::sync`] call
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub spheres_changed: bool,
    pub meshes_changed: bool,
    pub sphere_count: u32,
    pub mesh_count: u32,
}

impl SyncReport {
    /// Whether anything the kernel reads was re-uploaded
    pub fn changed(&self) -> bool {
        self.spheres_changed || self.meshes_changed
    }
}

/// Keeps GPU scene storage equal to the scene lists.
///
/// Holds a snapshot of what was last uploaded. A dirty scene is compared
/// against it structurally, so an edit that restores the previous values
/// uploads nothing.
#[derive(Debug, Default)]
pub struct SceneSynchronizer {
    uploaded_spheres: Option<Vec<Sphere>>,
    uploaded_meshes: Option<Vec<Mesh>>,
    sphere_count: u32,
    mesh_count: u32,
}

impl SceneSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync(&mut self, scene: &mut Scene, sink: &mut impl SceneSink) -> SyncReport {
        let dirty = scene.take_dirty();
        let first_sync = self.uploaded_spheres.is_none() || self.uploaded_meshes.is_none();
        let mut report = SyncReport {
            sphere_count: self.sphere_count,
            mesh_count: self.mesh_count,
            ..SyncReport::default()
        };
        if !dirty && !first_sync {
            return report;
        }

        if self.uploaded_spheres.as_deref() != Some(scene.spheres()) {
            sink.upload_spheres(&scene.gpu_spheres());
            self.uploaded_spheres = Some(scene.spheres().to_vec());
            self.sphere_count = scene.spheres().len() as u32;
            report.spheres_changed = true;
        }

        if self.uploaded_meshes.as_deref() != Some(scene.meshes()) {
            sink.upload_meshes(&scene.flatten_meshes());
            self.uploaded_meshes = Some(scene.meshes().to_vec());
            self.mesh_count = scene.meshes().len() as u32;
            report.meshes_changed = true;
        }

        report.sphere_count = self.sphere_count;
        report.mesh_count = self.mesh_count;
        if report.changed() {
            debug!(
                "Scene sync: {} spheres{}, {} meshes{}",
                report.sphere_count,
                if report.spheres_changed { " (uploaded)" } else { "" },
                report.mesh_count,
                if report.meshes_changed { " (uploaded)" } else { "" },
            );
        }
        report
    }
}

/// Storage buffer that doubles its capacity when it runs out
struct GrowableBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
    stride: usize,
    default_capacity: usize,
    label: &'static str,
}

impl GrowableBuffer {
    fn new(device: &wgpu::Device, label: &'static str, stride: usize, default_capacity: usize) -> Self {
        let capacity = default_capacity.max(1);
        Self {
            buffer: Self::allocate(device, label, stride, capacity),
            capacity,
            stride,
            default_capacity: capacity,
            label,
        }
    }

    fn allocate(device: &wgpu::Device, label: &'static str, stride: usize, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (stride * capacity) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Write `data`, reallocating first if it does not fit. Returns true on reallocation.
    fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8]) -> bool {
        let len = data.len() / self.stride;
        let resized = len > self.capacity;
        if resized {
            // Double the capacity to accommodate growth
            self.capacity = (len * 2).max(self.default_capacity);
            self.buffer = Self::allocate(device, self.label, self.stride, self.capacity);
            info!(
                "Resized {} to capacity: {} ({:.2} MB)",
                self.label,
                self.capacity,
                (self.stride * self.capacity) as f64 / (1024.0 * 1024.0)
            );
        }
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, data);
        }
        resized
    }
}

/// GPU storage for the scene: bindings 0 to 3 of the trace kernel
pub struct BufferManager {
    spheres: GrowableBuffer,
    meshes: GrowableBuffer,
    triangles: GrowableBuffer,
    materials: GrowableBuffer,
    bind_group_dirty: bool,
}

impl BufferManager {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            spheres: GrowableBuffer::new(
                device,
                "Spheres Buffer",
                std::mem::size_of::<GpuSphere>(),
                RaytracerConfig::DEFAULT_SPHERE_CAPACITY,
            ),
            meshes: GrowableBuffer::new(
                device,
                "Mesh Info Buffer",
                std::mem::size_of::<GpuMeshInfo>(),
                RaytracerConfig::DEFAULT_MESH_CAPACITY,
            ),
            triangles: GrowableBuffer::new(
                device,
                "Triangles Buffer",
                std::mem::size_of::<GpuTriangle>(),
                RaytracerConfig::DEFAULT_TRIANGLE_CAPACITY,
            ),
            materials: GrowableBuffer::new(
                device,
                "Mesh Materials Buffer",
                std::mem::size_of::<GpuMaterial>(),
                RaytracerConfig::DEFAULT_MATERIAL_CAPACITY,
            ),
            bind_group_dirty: true,
        }
    }

    pub fn spheres_buffer(&self) -> &wgpu::Buffer {
        &self.spheres.buffer
    }

    pub fn meshes_buffer(&self) -> &wgpu::Buffer {
        &self.meshes.buffer
    }

    pub fn triangles_buffer(&self) -> &wgpu::Buffer {
        &self.triangles.buffer
    }

    pub fn materials_buffer(&self) -> &wgpu::Buffer {
        &self.materials.buffer
    }

    /// True once after any buffer was reallocated; the compute bind group must be rebuilt
    pub fn take_bind_group_dirty(&mut self) -> bool {
        std::mem::take(&mut self.bind_group_dirty)
    }

    /// Borrow as a [`SceneSink`] writing through `queue`
    pub fn sink<'a>(&'a mut self, device: &'a wgpu::Device, queue: &'a wgpu::Queue) -> GpuSceneSink<'a> {
        GpuSceneSink {
            buffers: self,
            device,
            queue,
        }
    }
}

pub struct GpuSceneSink<'a> {
    buffers: &'a mut BufferManager,
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
}

impl SceneSink for GpuSceneSink<'_> {
    fn upload_spheres(&mut self, spheres: &[GpuSphere]) {
        let resized = self
            .buffers
            .spheres
            .write(self.device, self.queue, bytemuck::cast_slice(spheres));
        self.buffers.bind_group_dirty |= resized;
    }

    fn upload_meshes(&mut self, meshes: &FlatMeshes) {
        let buffers = &mut *self.buffers;
        let mut resized = buffers
            .meshes
            .write(self.device, self.queue, bytemuck::cast_slice(&meshes.infos));
        resized |= buffers
            .triangles
            .write(self.device, self.queue, bytemuck::cast_slice(&meshes.triangles));
        resized |= buffers
            .materials
            .write(self.device, self.queue, bytemuck::cast_slice(&meshes.materials));
        buffers.bind_group_dirty |= resized;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::{Material, Triangle};
    use glam::Vec3;

    #[derive(Default)]
    struct RecordingSink {
        sphere_uploads: Vec<Vec<GpuSphere>>,
        mesh_uploads: Vec<FlatMeshes>,
    }

    impl SceneSink for RecordingSink {
        fn upload_spheres(&mut self, spheres: &[GpuSphere]) {
            self.sphere_uploads.push(spheres.to_vec());
        }

        fn upload_meshes(&mut self, meshes: &FlatMeshes) {
            self.mesh_uploads.push(meshes.clone());
        }
    }

    fn sphere(x: f32, radius: f32) -> Sphere {
        Sphere::new(Vec3::new(x, 0.0, -2.0), radius, Material::default()).unwrap()
    }

    #[test]
    fn second_sync_without_mutation_is_noop() {
        let mut scene = Scene::default_scene();
        let mut sync = SceneSynchronizer::new();
        let mut sink = RecordingSink::default();

        let first = sync.sync(&mut scene, &mut sink);
        assert!(first.spheres_changed && first.meshes_changed);
        assert_eq!(first.sphere_count, 4);
        assert_eq!(first.mesh_count, 1);

        let second = sync.sync(&mut scene, &mut sink);
        assert!(!second.changed());
        assert_eq!(second.sphere_count, 4);
        assert_eq!(sink.sphere_uploads.len(), 1);
        assert_eq!(sink.mesh_uploads.len(), 1);
    }

    #[test]
    fn first_sync_uploads_empty_scene() {
        let mut scene = Scene::new();
        scene.take_dirty();
        let mut sync = SceneSynchronizer::new();
        let mut sink = RecordingSink::default();

        let report = sync.sync(&mut scene, &mut sink);
        assert!(report.changed());
        assert_eq!(report.sphere_count, 0);
        assert_eq!(sink.sphere_uploads, vec![Vec::<GpuSphere>::new()]);
        assert_eq!(sink.mesh_uploads.len(), 1);
    }

    #[test]
    fn edit_then_revert_uploads_nothing() {
        let mut scene = Scene::new();
        scene.add_sphere(sphere(0.0, 1.0)).unwrap();
        let mut sync = SceneSynchronizer::new();
        let mut sink = RecordingSink::default();
        sync.sync(&mut scene, &mut sink);

        scene.edit_sphere(0, sphere(0.0, 2.0)).unwrap();
        scene.edit_sphere(0, sphere(0.0, 1.0)).unwrap();
        assert!(scene.is_dirty());

        let report = sync.sync(&mut scene, &mut sink);
        assert!(!report.changed());
        assert_eq!(sink.sphere_uploads.len(), 1);
        assert!(!scene.is_dirty());
    }

    #[test]
    fn spheres_and_meshes_tracked_separately() {
        let mut scene = Scene::default_scene();
        let mut sync = SceneSynchronizer::new();
        let mut sink = RecordingSink::default();
        sync.sync(&mut scene, &mut sink);

        scene.add_sphere(sphere(3.0, 0.25)).unwrap();
        let report = sync.sync(&mut scene, &mut sink);
        assert!(report.spheres_changed);
        assert!(!report.meshes_changed);
        assert_eq!(report.sphere_count, 5);
        assert_eq!(sink.sphere_uploads.last().map(Vec::len), Some(5));
        assert_eq!(sink.mesh_uploads.len(), 1);

        scene.add_mesh(
            vec![Triangle::flat(Vec3::ZERO, Vec3::X, Vec3::Y)],
            Material::diffuse(Vec3::Z),
        );
        let report = sync.sync(&mut scene, &mut sink);
        assert!(!report.spheres_changed);
        assert!(report.meshes_changed);
        assert_eq!(report.mesh_count, 2);
        assert_eq!(sink.mesh_uploads.len(), 2);
        assert_eq!(sink.mesh_uploads[1].triangles.len(), 3);
    }

    #[test]
    fn uploaded_counts_match_contents() {
        let mut scene = Scene::new();
        let mut sync = SceneSynchronizer::new();
        let mut sink = RecordingSink::default();
        for i in 0..3 {
            scene.add_sphere(sphere(i as f32, 0.5)).unwrap();
            let report = sync.sync(&mut scene, &mut sink);
            let uploaded = sink.sphere_uploads.last().unwrap();
            assert_eq!(report.sphere_count as usize, uploaded.len());
        }
        scene.remove_sphere(1).unwrap();
        let report = sync.sync(&mut scene, &mut sink);
        assert_eq!(report.sphere_count, 2);
        assert_eq!(sink.sphere_uploads.last().unwrap()[1].center[0], 2.0);
    }
}
