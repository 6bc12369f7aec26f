//! Ground contact sensing.
//!
//! The sensor overlaps a sphere slightly below the capsule's lower hemisphere,
//! averages the penetration normals of every overlapping surface and
//! classifies the result as walkable ground or an invalid slope. An optional
//! forward ray refines the normal at step edges.
//!
//! Everything here is backend-agnostic: scene access goes through
//! [`SceneQuery`], so a backend only has to build the probe and call
//! [`sense_ground`].

use std::time::Duration;

use bevy::prelude::*;

use crate::backend::SceneQuery;
use crate::collision::{Contact, RayHit};
use crate::config::LocomotionConfig;
use crate::state::CharacterState;

/// Probe geometry derived from the character's capsule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundProbe {
    /// Centre of the overlap sphere.
    pub center: Vec3,
    /// Radius of the overlap sphere.
    pub radius: f32,
    /// Centre of the capsule's lower hemisphere.
    pub foot: Vec3,
    /// Radius of the capsule.
    pub capsule_radius: f32,
}

impl GroundProbe {
    /// Build the probe for a capsule centred at `position`.
    ///
    /// `half_segment` is half the distance between the hemisphere centres
    /// (zero for a ball).
    pub fn from_capsule(
        position: Vec3,
        up: Vec3,
        half_segment: f32,
        capsule_radius: f32,
        config: &LocomotionConfig,
    ) -> Self {
        Self::from_segment(
            position - up * half_segment,
            position + up * half_segment,
            up,
            capsule_radius,
            config,
        )
    }

    /// Build the probe from the capsule's segment end points in world space.
    ///
    /// The end point lowest along `up` is the foot, whatever the capsule's
    /// axis or offset from the body origin.
    pub fn from_segment(
        a: Vec3,
        b: Vec3,
        up: Vec3,
        capsule_radius: f32,
        config: &LocomotionConfig,
    ) -> Self {
        let foot = if a.dot(up) <= b.dot(up) { a } else { b };
        Self {
            center: foot - up * config.ground_check_distance,
            radius: capsule_radius * config.ground_check_radius_multiplier,
            foot,
            capsule_radius,
        }
    }
}

/// Result of one ground query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundReading {
    pub grounded: bool,
    /// Effective ground normal, unit length.
    pub normal: Vec3,
    pub invalid_slope: bool,
    pub contact_count: usize,
}

impl GroundReading {
    /// Nothing under the feet. Keeps the previous normal.
    pub fn airborne(previous_normal: Vec3) -> Self {
        Self {
            grounded: false,
            normal: previous_normal,
            invalid_slope: false,
            contact_count: 0,
        }
    }
}

/// Average the usable contact normals.
///
/// Returns `None` when there is no usable contact or the normals cancel out.
pub fn average_normal(contacts: &[Contact]) -> Option<Vec3> {
    let (sum, count) = contacts
        .iter()
        .filter(|c| c.is_usable())
        .fold((Vec3::ZERO, 0usize), |(sum, count), c| {
            (sum + c.normal.normalize(), count + 1)
        });
    if count == 0 {
        return None;
    }
    (sum / count as f32).try_normalize()
}

/// Whether a surface with this normal can be stood on.
#[inline]
pub fn is_walkable(normal: Vec3, up: Vec3, config: &LocomotionConfig) -> bool {
    !config.policy.invalidate_steep_slopes || normal.dot(up) > config.walkable_cos()
}

/// Turn raw contacts into a ground reading.
///
/// `refinement` is the optional step ray hit; it replaces an unwalkable
/// averaged normal when the ray found walkable ground.
pub fn resolve_ground(
    contacts: &[Contact],
    refinement: Option<RayHit>,
    previous_normal: Vec3,
    up: Vec3,
    config: &LocomotionConfig,
) -> GroundReading {
    let contact_count = contacts.iter().filter(|c| c.is_usable()).count();
    if contact_count == 0 {
        return GroundReading::airborne(previous_normal);
    }

    let refined = refinement
        .map(|hit| hit.normal)
        .filter(|n| n.is_finite())
        .and_then(Vec3::try_normalize);

    let mut normal = average_normal(contacts)
        .or(refined)
        .or_else(|| previous_normal.try_normalize())
        .unwrap_or(up);

    if !is_walkable(normal, up, config) {
        if let Some(step) = refined.filter(|n| is_walkable(*n, up, config)) {
            normal = step;
        }
    }

    if is_walkable(normal, up, config) {
        GroundReading {
            grounded: true,
            normal,
            invalid_slope: false,
            contact_count,
        }
    } else {
        GroundReading {
            grounded: false,
            normal: up,
            invalid_slope: true,
            contact_count,
        }
    }
}

/// Query the scene under the probe and resolve the reading.
pub fn sense_ground<Q: SceneQuery>(
    query: &Q,
    probe: &GroundProbe,
    move_direction: Vec3,
    previous_normal: Vec3,
    up: Vec3,
    config: &LocomotionConfig,
) -> GroundReading {
    let contacts = query.overlap_sphere(probe.center, probe.radius, config.ground_mask);
    if contacts.is_empty() {
        return GroundReading::airborne(previous_normal);
    }

    let refinement = if config.policy.step_refinement {
        let forward = move_direction.reject_from_normalized(up).normalize_or_zero();
        if forward == Vec3::ZERO {
            None
        } else {
            let origin = probe.foot + forward * probe.capsule_radius;
            query.raycast(
                origin,
                -up,
                probe.capsule_radius + config.step_ray_length,
                config.ground_mask,
            )
        }
    } else {
        None
    };

    resolve_ground(&contacts, refinement, previous_normal, up, config)
}

/// Write a reading into the character state.
///
/// While the post-jump grace window runs the reading is ignored and the
/// character stays airborne. Returns `true` on the tick the character lands.
pub fn apply_reading(state: &mut CharacterState, reading: GroundReading, now: Duration) -> bool {
    if state.ground_check_suppressed(now) {
        state.is_grounded = false;
        state.on_invalid_slope = false;
        state.contact_count = 0;
        return false;
    }

    let was_grounded = state.is_grounded;
    state.is_grounded = reading.grounded;
    state.on_invalid_slope = reading.invalid_slope;
    state.contact_count = reading.contact_count;
    if reading.normal.is_finite() && reading.normal.length_squared() > 1.0e-6 {
        state.ground_normal = reading.normal;
    }

    if !reading.grounded {
        return false;
    }

    state.is_jumping = false;
    state.airborne_elapsed = 0.0;
    if was_grounded {
        return false;
    }
    state.air_jumps_used = 0;
    state.jump_takeoff = None;
    true
}
