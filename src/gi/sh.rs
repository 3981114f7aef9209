//! Order-2 spherical harmonics (9 RGB coefficients)

use std::f32::consts::PI;

use glam::Vec3;
use image::Rgba32FImage;

use crate::backend::CubeFace;

pub const SH_COEFFICIENTS: usize = 9;

/// Real SH basis evaluated at unit direction `d`
pub fn basis(d: Vec3) -> [f32; SH_COEFFICIENTS] {
    [
        0.282095,
        0.488603 * d.y,
        0.488603 * d.z,
        0.488603 * d.x,
        1.092548 * d.x * d.y,
        1.092548 * d.y * d.z,
        0.315392 * (3.0 * d.z * d.z - 1.0),
        1.092548 * d.x * d.z,
        0.546274 * (d.x * d.x - d.y * d.y),
    ]
}

/// Direction through texel coordinates `u`, `v` in [-1, 1] of a cube face
///
/// `v` grows downwards in image space.
pub fn face_direction(face: CubeFace, u: f32, v: f32) -> Vec3 {
    let dir = match face {
        CubeFace::PositiveX => Vec3::new(1.0, -v, -u),
        CubeFace::NegativeX => Vec3::new(-1.0, -v, u),
        CubeFace::PositiveY => Vec3::new(u, 1.0, v),
        CubeFace::NegativeY => Vec3::new(u, -1.0, -v),
        CubeFace::PositiveZ => Vec3::new(u, -v, 1.0),
        CubeFace::NegativeZ => Vec3::new(-u, -v, -1.0),
    };
    dir.normalize()
}

/// Radiance around a point, projected onto the SH basis
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SphericalHarmonics {
    pub coeffs: [Vec3; SH_COEFFICIENTS],
}

impl SphericalHarmonics {
    pub fn from_array(values: [[f32; 3]; SH_COEFFICIENTS]) -> Self {
        Self {
            coeffs: values.map(Vec3::from),
        }
    }

    pub fn to_array(&self) -> [[f32; 3]; SH_COEFFICIENTS] {
        self.coeffs.map(|c| c.to_array())
    }

    /// Project six cube face captures, indexed in [`CubeFace::ALL`] order
    ///
    /// Every texel is weighted by the solid angle it covers, so faces of
    /// any size integrate over the full sphere.
    pub fn project_cubemap(faces: &[Rgba32FImage; 6]) -> Self {
        let mut coeffs = [Vec3::ZERO; SH_COEFFICIENTS];
        let mut total_weight = 0.0f32;

        for (face, image) in CubeFace::ALL.iter().zip(faces) {
            let (width, height) = image.dimensions();
            for (x, y, pixel) in image.enumerate_pixels() {
                let u = 2.0 * (x as f32 + 0.5) / width as f32 - 1.0;
                let v = 2.0 * (y as f32 + 0.5) / height as f32 - 1.0;
                let weight = 1.0 / (1.0 + u * u + v * v).powf(1.5);
                let dir = face_direction(*face, u, v);
                let color = Vec3::new(pixel.0[0], pixel.0[1], pixel.0[2]);
                for (coeff, b) in coeffs.iter_mut().zip(basis(dir)) {
                    *coeff += color * b * weight;
                }
                total_weight += weight;
            }
        }

        if total_weight > 0.0 {
            let normalization = 4.0 * PI / total_weight;
            for coeff in &mut coeffs {
                *coeff *= normalization;
            }
        }
        Self { coeffs }
    }

    /// Reconstructed radiance towards `dir`
    pub fn evaluate(&self, dir: Vec3) -> Vec3 {
        self.coeffs
            .iter()
            .zip(basis(dir.normalize_or_zero()))
            .map(|(coeff, b)| *coeff * b)
            .sum()
    }

    /// Irradiance on a surface facing `normal` (cosine-convolved)
    pub fn irradiance(&self, normal: Vec3) -> Vec3 {
        const BAND: [f32; 3] = [PI, 2.0 * PI / 3.0, PI / 4.0];
        let b = basis(normal.normalize_or_zero());
        self.coeffs
            .iter()
            .enumerate()
            .map(|(i, coeff)| {
                let band = match i {
                    0 => BAND[0],
                    1..=3 => BAND[1],
                    _ => BAND[2],
                };
                *coeff * b[i] * band
            })
            .sum::<Vec3>()
            / PI
    }
}
