//! Scene query result structures.
//!
//! These structures hold the results of the overlap and ray queries used
//! by the ground contact sensor.

use bevy::prelude::*;

/// A single penetration contact between the feet probe and a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Surface normal pointing from the surface towards the probe.
    pub normal: Vec3,
    /// How deep the probe overlaps the surface (non-negative).
    pub penetration_depth: f32,
}

impl Contact {
    /// Create a contact.
    pub fn new(normal: Vec3, penetration_depth: f32) -> Self {
        Self {
            normal,
            penetration_depth,
        }
    }

    /// Whether the normal can take part in an average.
    ///
    /// Rejects NaN, infinite and near-zero normals.
    pub fn is_usable(&self) -> bool {
        self.normal.is_finite() && self.normal.length_squared() > 1.0e-8
    }
}

/// Information about a raycast hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance along the ray to the hit point.
    pub distance: f32,
    /// Normal of the surface at the hit point.
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
}

impl RayHit {
    /// Create a ray hit.
    pub fn new(distance: f32, normal: Vec3, point: Vec3) -> Self {
        Self {
            distance,
            normal,
            point,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_new() {
        let contact = Contact::new(Vec3::Y, 0.05);

        assert_eq!(contact.normal, Vec3::Y);
        assert_eq!(contact.penetration_depth, 0.05);
        assert!(contact.is_usable());
    }

    #[test]
    fn degenerate_contact_normals_are_not_usable() {
        assert!(!Contact::new(Vec3::ZERO, 0.1).is_usable());
        assert!(!Contact::new(Vec3::new(f32::NAN, 1.0, 0.0), 0.1).is_usable());
        assert!(!Contact::new(Vec3::new(0.0, f32::INFINITY, 0.0), 0.1).is_usable());
    }

    #[test]
    fn ray_hit_new() {
        let hit = RayHit::new(0.4, Vec3::Y, Vec3::new(1.0, 0.0, 2.0));

        assert_eq!(hit.distance, 0.4);
        assert_eq!(hit.point, Vec3::new(1.0, 0.0, 2.0));
    }
}
