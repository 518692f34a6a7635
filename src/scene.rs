use glam::Vec3;
use pathtracer_shared::{GpuMaterial, GpuMeshInfo, GpuSphere, GpuTriangle};

use crate::error::{Result, TracerError};
use crate::geometry::{Material, MeshInfo, Sphere, Triangle};

/// Triangle mesh as authored; flattened into GPU records on upload
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
    pub material: Material,
}

impl Mesh {
    pub fn new(triangles: Vec<Triangle>, material: Material) -> Self {
        Self {
            triangles,
            material,
        }
    }
}

/// Mesh set laid out for the kernel: headers, one flat triangle array and a
/// deduplicated material list referenced by `material_index`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatMeshes {
    pub infos: Vec<GpuMeshInfo>,
    pub triangles: Vec<GpuTriangle>,
    pub materials: Vec<GpuMaterial>,
}

/// Authoritative scene lists. Every mutation marks the scene dirty; the
/// synchronizer decides whether anything actually changed.
#[derive(Clone, Debug)]
pub struct Scene {
    spheres: Vec<Sphere>,
    meshes: Vec<Mesh>,
    dirty: bool,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            spheres: Vec::new(),
            meshes: Vec::new(),
            dirty: true,
        }
    }

    /// Four spheres (one of them a huge emissive "sun") and a small floor patch
    pub fn default_scene() -> Self {
        let mut scene = Self::new();
        scene.spheres = vec![
            Sphere {
                center: Vec3::new(0.0, 0.0, -3.0),
                radius: 1.0,
                material: Material::diffuse(Vec3::new(1.0, 0.0, 0.0)),
            },
            Sphere {
                center: Vec3::new(-1.5, 0.0, -2.0),
                radius: 0.5,
                material: Material::diffuse(Vec3::new(1.0, 1.0, 0.0)),
            },
            Sphere {
                center: Vec3::new(-2.0, 10.5, -4.0),
                radius: 10.0,
                material: Material::diffuse(Vec3::new(0.5, 0.0, 0.5)),
            },
            Sphere {
                center: Vec3::new(50.0, -101.0, -105.0),
                radius: 100.0,
                material: Material::emissive(Vec3::new(0.0, 0.0, 1.0), Vec3::ONE, 5.0),
            },
        ];

        let a = Vec3::new(-1.0, -1.0, -1.5);
        let b = Vec3::new(1.0, -1.0, -1.5);
        let c = Vec3::new(1.0, -1.0, -3.5);
        let d = Vec3::new(-1.0, -1.0, -3.5);
        scene.meshes.push(Mesh::new(
            vec![Triangle::flat(a, b, c), Triangle::flat(a, c, d)],
            Material::diffuse(Vec3::splat(0.8)),
        ));
        scene
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Return and clear the dirty flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Append a sphere and return its index
    pub fn add_sphere(&mut self, sphere: Sphere) -> Result<usize> {
        sphere.validate()?;
        self.spheres.push(sphere);
        self.dirty = true;
        Ok(self.spheres.len() - 1)
    }

    pub fn remove_sphere(&mut self, index: usize) -> Result<Sphere> {
        self.check_index(index)?;
        self.dirty = true;
        Ok(self.spheres.remove(index))
    }

    pub fn edit_sphere(&mut self, index: usize, sphere: Sphere) -> Result<()> {
        self.check_index(index)?;
        sphere.validate()?;
        self.spheres[index] = sphere;
        self.dirty = true;
        Ok(())
    }

    /// Swap in a whole sphere list; nothing changes if any sphere is invalid
    pub fn replace_spheres(&mut self, spheres: Vec<Sphere>) -> Result<()> {
        for sphere in &spheres {
            sphere.validate()?;
        }
        self.spheres = spheres;
        self.dirty = true;
        Ok(())
    }

    pub fn add_mesh(&mut self, triangles: Vec<Triangle>, material: Material) -> usize {
        self.meshes.push(Mesh::new(triangles, material));
        self.dirty = true;
        self.meshes.len() - 1
    }

    pub fn replace_meshes(&mut self, meshes: Vec<Mesh>) {
        self.meshes = meshes;
        self.dirty = true;
    }

    pub fn clear_meshes(&mut self) {
        self.meshes.clear();
        self.dirty = true;
    }

    pub fn gpu_spheres(&self) -> Vec<GpuSphere> {
        self.spheres.iter().map(Sphere::to_gpu).collect()
    }

    pub fn flatten_meshes(&self) -> FlatMeshes {
        let mut flat = FlatMeshes::default();
        let mut materials: Vec<Material> = Vec::new();

        for mesh in &self.meshes {
            let material_index = match materials.iter().position(|m| *m == mesh.material) {
                Some(index) => index,
                None => {
                    materials.push(mesh.material);
                    materials.len() - 1
                }
            };

            let mut info = MeshInfo::new(material_index as u32, mesh.material);
            info.add_triangles(&mesh.triangles);

            let first_triangle = flat.triangles.len() as u32;
            flat.triangles.extend(mesh.triangles.iter().map(Triangle::to_gpu));
            flat.infos.push(info.to_gpu(first_triangle));
        }

        flat.materials = materials.iter().map(Material::to_gpu).collect();
        flat
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.spheres.len() {
            return Err(TracerError::SphereIndex {
                index,
                count: self.spheres.len(),
            });
        }
        Ok(())
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
