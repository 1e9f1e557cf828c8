//! Sphere geometry for the eye meshes and the opacity mask.
//! Eye spheres are mirrored on X so the equirectangular image reads correctly
//! from the origin; each eye carries its own V offset/scale so one texture can
//! feed both halves of a top/bottom stereo frame.

use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};

pub const SPHERE_SEGMENTS: u32 = 48;
pub const EYE_SPHERE_RADIUS: f32 = 1.0;
pub const MASK_SPHERE_RADIUS: f32 = 0.49;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Smallest and largest V across all vertices.
    pub fn v_range(&self) -> (f32, f32) {
        self.vertices
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), vertex| {
                (lo.min(vertex.uv[1]), hi.max(vertex.uv[1]))
            })
    }
}

/// Remaps texture V as `v * scale_y + offset_y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub offset_y: f32,
    pub scale_y: f32,
}

impl UvTransform {
    pub const FULL: UvTransform = UvTransform {
        offset_y: 0.0,
        scale_y: 1.0,
    };
    pub const TOP_HALF: UvTransform = UvTransform {
        offset_y: 0.5,
        scale_y: 0.5,
    };
    pub const BOTTOM_HALF: UvTransform = UvTransform {
        offset_y: 0.0,
        scale_y: 0.5,
    };

    /// Left and right eye transforms for a frame layout.
    pub fn eye_pair(stereo: bool) -> (UvTransform, UvTransform) {
        if stereo {
            (Self::TOP_HALF, Self::BOTTOM_HALF)
        } else {
            (Self::FULL, Self::FULL)
        }
    }

    fn apply(self, v: f32) -> f32 {
        v * self.scale_y + self.offset_y
    }
}

pub fn eye_sphere(uv: UvTransform) -> MeshData {
    build_sphere(EYE_SPHERE_RADIUS, SPHERE_SEGMENTS, SPHERE_SEGMENTS, true, uv)
}

pub fn mask_sphere() -> MeshData {
    build_sphere(
        MASK_SPHERE_RADIUS,
        SPHERE_SEGMENTS,
        SPHERE_SEGMENTS,
        false,
        UvTransform::FULL,
    )
}

fn build_sphere(
    radius: f32,
    width_segments: u32,
    height_segments: u32,
    mirror_x: bool,
    uv: UvTransform,
) -> MeshData {
    let lat_steps = height_segments.max(2);
    let lon_steps = width_segments.max(3);
    let mut vertices = Vec::with_capacity(((lat_steps + 1) * (lon_steps + 1)) as usize);
    let mut indices = Vec::with_capacity((lat_steps * lon_steps * 6) as usize);
    let x_sign = if mirror_x { -1.0 } else { 1.0 };

    for lat in 0..=lat_steps {
        let v = lat as f32 / lat_steps as f32;
        let theta = v * PI;
        let sin_theta = theta.sin();
        let cos_theta = theta.cos();

        for lon in 0..=lon_steps {
            let u = lon as f32 / lon_steps as f32;
            let phi = u * PI * 2.0;

            let x = -phi.cos() * sin_theta;
            let y = cos_theta;
            let z = phi.sin() * sin_theta;
            vertices.push(MeshVertex {
                position: [x * radius * x_sign, y * radius, z * radius],
                uv: [u, uv.apply(1.0 - v)],
            });
        }
    }

    let ring = (lon_steps + 1) as usize;
    for lat in 0..lat_steps as usize {
        for lon in 0..lon_steps as usize {
            let current = lat * ring + lon;
            let next = current + ring;
            indices.push(current as u16);
            indices.push(next as u16);
            indices.push((current + 1) as u16);

            indices.push((current + 1) as u16);
            indices.push(next as u16);
            indices.push((next + 1) as u16);
        }
    }

    MeshData { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn eye_sphere_has_expected_topology() {
        let mesh = eye_sphere(UvTransform::FULL);
        assert_eq!(mesh.vertices.len(), 49 * 49);
        assert_eq!(mesh.indices.len(), 48 * 48 * 6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn vertices_sit_on_the_radius() {
        let mesh = mask_sphere();
        for vertex in &mesh.vertices {
            let [x, y, z] = vertex.position;
            let length = (x * x + y * y + z * z).sqrt();
            assert!((length - MASK_SPHERE_RADIUS).abs() < EPSILON);
        }
    }

    #[test]
    fn stereo_halves_split_v() {
        let (left, right) = UvTransform::eye_pair(true);
        let (lo, hi) = eye_sphere(left).v_range();
        assert!((lo - 0.5).abs() < EPSILON && (hi - 1.0).abs() < EPSILON);
        let (lo, hi) = eye_sphere(right).v_range();
        assert!(lo.abs() < EPSILON && (hi - 0.5).abs() < EPSILON);
    }

    #[test]
    fn mirroring_flips_x_only() {
        let plain = build_sphere(1.0, 8, 8, false, UvTransform::FULL);
        let mirrored = build_sphere(1.0, 8, 8, true, UvTransform::FULL);
        for (a, b) in plain.vertices.iter().zip(&mirrored.vertices) {
            assert!((a.position[0] + b.position[0]).abs() < EPSILON);
            assert_eq!(a.position[1], b.position[1]);
            assert_eq!(a.uv, b.uv);
        }
    }

    #[test]
    fn byte_views_match_vertex_layout() {
        let mesh = eye_sphere(UvTransform::FULL);
        assert_eq!(
            mesh.vertex_bytes().len(),
            mesh.vertices.len() * std::mem::size_of::<MeshVertex>()
        );
        assert_eq!(mesh.index_bytes().len(), mesh.indices.len() * 2);
    }
}
