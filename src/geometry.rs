use glam::{Vec3, Vec4};
use pathtracer_shared::{GpuMaterial, GpuMeshInfo, GpuSphere, GpuTriangle};

use crate::error::{Result, TracerError};

const BOUNDS_PADDING: f32 = 1.0e-4;

/// Optical material: base color plus an emitted radiance
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Material {
    pub base_color: Vec4,
    pub emission_color: Vec3,
    pub emission_strength: f32,
}

impl Material {
    pub fn new(base_color: Vec4, emission_color: Vec3, emission_strength: f32) -> Self {
        Self {
            base_color,
            emission_color,
            emission_strength: emission_strength.max(0.0),
        }
    }

    /// Create a non-emissive material with an opaque base color
    pub fn diffuse(color: Vec3) -> Self {
        Self::new(color.extend(1.0), Vec3::ZERO, 0.0)
    }

    /// Create an emissive material
    pub fn emissive(color: Vec3, emission_color: Vec3, strength: f32) -> Self {
        Self::new(color.extend(1.0), emission_color, strength)
    }

    /// Colors must be finite so the material survives a save/load cycle
    pub fn validate(&self) -> Result<()> {
        if !self.base_color.is_finite() || !self.emission_color.is_finite() {
            return Err(TracerError::InvalidConfiguration(format!(
                "material colors must be finite, got base {} emission {}",
                self.base_color, self.emission_color
            )));
        }
        if !(self.emission_strength.is_finite() && self.emission_strength >= 0.0) {
            return Err(TracerError::InvalidConfiguration(format!(
                "emission strength must be finite and >= 0, got {}",
                self.emission_strength
            )));
        }
        Ok(())
    }

    pub fn to_gpu(&self) -> GpuMaterial {
        GpuMaterial::new(
            self.base_color.to_array(),
            self.emission_color.to_array(),
            self.emission_strength,
        )
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::diffuse(Vec3::ONE)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub material: Material,
}

impl Sphere {
    /// Create a sphere, rejecting non-positive or non-finite radii
    pub fn new(center: Vec3, radius: f32, material: Material) -> Result<Self> {
        let sphere = Self {
            center,
            radius,
            material,
        };
        sphere.validate()?;
        Ok(sphere)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(TracerError::InvalidConfiguration(format!(
                "sphere radius must be positive, got {}",
                self.radius
            )));
        }
        if !self.center.is_finite() {
            return Err(TracerError::InvalidConfiguration(format!(
                "sphere center must be finite, got {}",
                self.center
            )));
        }
        self.material.validate()
    }

    pub fn to_gpu(&self) -> GpuSphere {
        GpuSphere::new(self.center.to_array(), self.radius, self.material.to_gpu())
    }
}

/// Triangle with per-vertex shading normals
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triangle {
    pub positions: [Vec3; 3],
    pub normals: [Vec3; 3],
}

impl Triangle {
    pub fn new(positions: [Vec3; 3], normals: [Vec3; 3]) -> Self {
        Self { positions, normals }
    }

    /// Triangle whose three normals are the geometric face normal
    pub fn flat(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let normal = (b - a).cross(c - a).normalize_or_zero();
        Self::new([a, b, c], [normal; 3])
    }

    pub fn min_corner(&self) -> Vec3 {
        self.positions[0].min(self.positions[1]).min(self.positions[2])
    }

    pub fn max_corner(&self) -> Vec3 {
        self.positions[0].max(self.positions[1]).max(self.positions[2])
    }

    pub fn to_gpu(&self) -> GpuTriangle {
        GpuTriangle::new(
            self.positions.map(|p| p.to_array()),
            self.normals.map(|n| n.to_array()),
        )
    }
}

/// Aggregate of triangles sharing one material.
///
/// Bounds start at `+inf / -inf` and widen with every folded triangle, so a
/// mesh lying entirely on the negative side of an axis still gets a tight box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MeshInfo {
    triangle_count: u32,
    pub material_index: u32,
    bounds_min: Vec3,
    bounds_max: Vec3,
    pub material: Material,
}

impl MeshInfo {
    pub fn new(material_index: u32, material: Material) -> Self {
        Self {
            triangle_count: 0,
            material_index,
            bounds_min: Vec3::splat(f32::INFINITY),
            bounds_max: Vec3::splat(f32::NEG_INFINITY),
            material,
        }
    }

    pub fn add_triangle(&mut self, triangle: &Triangle) {
        self.bounds_min = self.bounds_min.min(triangle.min_corner());
        self.bounds_max = self.bounds_max.max(triangle.max_corner());
        self.triangle_count += 1;
    }

    pub fn add_triangles<'a>(&mut self, triangles: impl IntoIterator<Item = &'a Triangle>) {
        for triangle in triangles {
            self.add_triangle(triangle);
        }
    }

    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }

    /// `(min, max)` once at least one triangle has been added
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        (self.triangle_count > 0).then_some((self.bounds_min, self.bounds_max))
    }

    /// GPU header; an empty mesh uploads zeroed bounds instead of infinities.
    /// Uploaded bounds are padded so flat meshes still have a slab to enter.
    pub fn to_gpu(&self, first_triangle: u32) -> GpuMeshInfo {
        let (bounds_min, bounds_max) = self
            .bounds()
            .map(|(min, max)| (min - Vec3::splat(BOUNDS_PADDING), max + Vec3::splat(BOUNDS_PADDING)))
            .unwrap_or((Vec3::ZERO, Vec3::ZERO));
        GpuMeshInfo::new(
            first_triangle,
            self.triangle_count,
            self.material_index,
            bounds_min.to_array(),
            bounds_max.to_array(),
            self.material.to_gpu(),
        )
    }
}
