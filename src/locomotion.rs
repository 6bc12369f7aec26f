//! Locomotion solver.
//!
//! Steers the body toward a desired horizontal velocity with a velocity
//! change proportional to the error, preserving momentum orthogonal to the
//! input direction. Airborne characters get only a fraction of the steering
//! authority, explicit gravity and a fall boost once they stop rising.

use bevy::prelude::*;

use crate::config::LocomotionConfig;

/// Inputs of one locomotion step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocomotionInput {
    /// Desired direction, unit length or zero.
    pub direction: Vec3,
    /// Sprint requested and permitted.
    pub sprint: bool,
    /// Target speed multiplier (0.0 to 1.0).
    pub speed_scale: f32,
}

/// Ground state the solver needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundContext {
    pub grounded: bool,
    pub jumping: bool,
    pub normal: Vec3,
    pub up: Vec3,
}

/// What to apply to the body this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocomotionStep {
    pub drag: f32,
    /// Velocity change to apply, `None` when not accelerating.
    pub velocity_change: Option<Vec3>,
    /// The ground-aligned direction that was steered toward.
    pub direction: Vec3,
}

/// Re-project a move direction onto the ground plane.
///
/// The direction is rotated by the shortest arc from up to the ground normal,
/// then any remaining normal component is removed. Used as-is when airborne
/// or when the normal is degenerate.
pub fn ground_aligned_direction(direction: Vec3, ground: &GroundContext, align: bool) -> Vec3 {
    if !direction.is_finite() {
        return Vec3::ZERO;
    }
    let Some(normal) = ground.normal.try_normalize() else {
        return direction.normalize_or_zero();
    };
    if !align || !ground.grounded {
        return direction.normalize_or_zero();
    }

    let rotated = Quat::from_rotation_arc(ground.up, normal) * direction;
    rotated.reject_from_normalized(normal).normalize_or_zero()
}

/// Compute one locomotion step.
pub fn locomotion_step(
    velocity: Vec3,
    input: LocomotionInput,
    ground: &GroundContext,
    config: &LocomotionConfig,
    dt: f32,
) -> LocomotionStep {
    let direction = ground_aligned_direction(input.direction, ground, config.policy.align_to_ground);

    if direction == Vec3::ZERO {
        let drag = if ground.grounded && !ground.jumping {
            config.ground_drag
        } else {
            config.air_drag
        };
        return LocomotionStep {
            drag,
            velocity_change: None,
            direction,
        };
    }

    let sprint = if input.sprint {
        config.sprint_multiplier
    } else {
        1.0
    };
    let target_speed = config.max_speed * sprint * input.speed_scale.clamp(0.0, 1.0);

    // Only the planar part is steered, vertical motion belongs to gravity and jumps
    let reference = if ground.grounded {
        ground.normal.try_normalize().unwrap_or(ground.up)
    } else {
        ground.up
    };
    let planar = velocity.reject_from_normalized(reference);

    let along = planar.project_onto_normalized(direction);
    let orthogonal = planar - along;
    let desired = (direction * target_speed + orthogonal).clamp_length_max(target_speed);

    let authority = (config.acceleration * dt).min(1.0);
    let mut change = (desired - planar) * authority;
    if !ground.grounded {
        change *= config.air_control_factor;
    }

    LocomotionStep {
        drag: config.air_drag,
        velocity_change: change.is_finite().then_some(change),
        direction,
    }
}

/// Acceleration from gravity and the fall boost.
///
/// Zero while grounded. An invalid slope is not ground, so a character on one
/// keeps falling.
pub fn gravity_acceleration(velocity: Vec3, ground: &GroundContext, config: &LocomotionConfig) -> Vec3 {
    if ground.grounded {
        return Vec3::ZERO;
    }
    let mut acceleration = config.gravity;
    if velocity.dot(ground.up) <= config.fall_boost_threshold {
        acceleration -= ground.up * config.fall_boost;
    }
    acceleration
}
