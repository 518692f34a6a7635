//! Flat text persistence of the sphere list.
//!
//! One sphere per line: `cx cy cz radius r g b er eg eb strength`. Meshes and
//! the base-color alpha are not stored; alpha reads back as 1.0.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use glam::{Vec3, Vec4};
use log::{debug, info};

use crate::error::{Result, TracerError};
use crate::geometry::{Material, Sphere};

const FIELDS_PER_RECORD: usize = 11;
const SCENE_EXTENSION: &str = "txt";

pub fn save_spheres(path: &Path, spheres: &[Sphere]) -> Result<()> {
    let io_err = |source: std::io::Error| TracerError::ResourceIo {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    write_spheres(&mut writer, spheres).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    debug!("Wrote {} spheres to {}", spheres.len(), path.display());
    Ok(())
}

pub fn load_spheres(path: &Path) -> Result<Vec<Sphere>> {
    let file = File::open(path).map_err(|source| TracerError::ResourceIo {
        path: path.to_path_buf(),
        source,
    })?;
    read_spheres(BufReader::new(file), path)
}

pub fn write_spheres<W: Write>(writer: &mut W, spheres: &[Sphere]) -> std::io::Result<()> {
    for sphere in spheres {
        let m = &sphere.material;
        writeln!(
            writer,
            "{} {} {} {} {} {} {} {} {} {} {}",
            sphere.center.x,
            sphere.center.y,
            sphere.center.z,
            sphere.radius,
            m.base_color.x,
            m.base_color.y,
            m.base_color.z,
            m.emission_color.x,
            m.emission_color.y,
            m.emission_color.z,
            m.emission_strength,
        )?;
    }
    Ok(())
}

/// Parse every record or fail on the first bad one; `path` only labels errors
pub fn read_spheres<R: BufRead>(reader: R, path: &Path) -> Result<Vec<Sphere>> {
    let mut spheres = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| TracerError::ResourceIo {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let sphere = parse_record(&line).map_err(|reason| TracerError::SceneFormat {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        })?;
        spheres.push(sphere);
    }
    Ok(spheres)
}

fn parse_record(line: &str) -> std::result::Result<Sphere, String> {
    let fields = line
        .split_whitespace()
        .map(|field| {
            field
                .parse::<f32>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| format!("{:?} is not a finite number", field))
        })
        .collect::<std::result::Result<Vec<f32>, String>>()?;

    if fields.len() != FIELDS_PER_RECORD {
        return Err(format!(
            "expected {} fields, found {}",
            FIELDS_PER_RECORD,
            fields.len()
        ));
    }

    let material = Material::new(
        Vec4::new(fields[4], fields[5], fields[6], 1.0),
        Vec3::new(fields[7], fields[8], fields[9]),
        fields[10],
    );
    Sphere::new(Vec3::new(fields[0], fields[1], fields[2]), fields[3], material)
        .map_err(|err| err.to_string())
}

/// Named scenes stored as `<dir>/<name>.txt`
#[derive(Clone, Debug)]
pub struct SceneLibrary {
    dir: PathBuf,
}

impl SceneLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(TracerError::InvalidSceneName(name.to_string()));
        }
        Ok(self.dir.join(name).with_extension(SCENE_EXTENSION))
    }

    pub fn save(&self, name: &str, spheres: &[Sphere]) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir).map_err(|source| TracerError::ResourceIo {
            path: self.dir.clone(),
            source,
        })?;
        save_spheres(&path, spheres)?;
        info!("Saved {} spheres to {}", spheres.len(), path.display());
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Vec<Sphere>> {
        let path = self.path_for(name)?;
        let spheres = load_spheres(&path)?;
        info!("Loaded {} spheres from {}", spheres.len(), path.display());
        Ok(spheres)
    }
}
