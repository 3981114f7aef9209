//! Axis-aligned bounding boxes

use glam::{Mat4, Vec3};

/// Axis-aligned box stored as center and half extents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub center: Vec3,
    pub halfsize: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            halfsize: Vec3::ZERO,
        }
    }
}

impl BoundingBox {
    pub fn new(center: Vec3, halfsize: Vec3) -> Self {
        Self { center, halfsize }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            halfsize: (max - min) * 0.5,
        }
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.halfsize
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.halfsize
    }

    /// Box enclosing this one after transforming its eight corners
    pub fn transformed(&self, matrix: &Mat4) -> BoundingBox {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for i in 0..8 {
            let sign = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            let corner = matrix.transform_point3(self.center + self.halfsize * sign);
            min = min.min(corner);
            max = max.max(corner);
        }
        BoundingBox::from_min_max(min, max)
    }

    /// True when a sphere overlaps the box
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min(), self.max());
        closest.distance_squared(center) <= radius * radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transformed_box_translates_and_scales() {
        let local = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let matrix = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))
            * Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let world = local.transformed(&matrix);
        assert_relative_eq!(world.center.x, 10.0);
        assert_relative_eq!(world.halfsize.x, 2.0);
        assert_relative_eq!(world.halfsize.y, 1.0);
    }

    #[test]
    fn test_rotated_box_grows() {
        let local = BoundingBox::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0));
        let matrix = Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4);
        let world = local.transformed(&matrix);
        assert_relative_eq!(world.halfsize.x, 2.0f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_sphere_overlap() {
        let bbox = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        assert!(bbox.intersects_sphere(Vec3::new(2.5, 0.0, 0.0), 1.6));
        assert!(!bbox.intersects_sphere(Vec3::new(2.5, 0.0, 0.0), 1.4));
        assert!(bbox.intersects_sphere(Vec3::ZERO, 0.1));
    }
}
