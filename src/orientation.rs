//! Body facing and camera look.
//!
//! The two rotations are independent. Body facing turns toward the movement
//! direction, tilting to walkable slopes; look yaw and pitch accumulate from
//! input and drive a head or camera anchor, so pitch never rotates the body.

use bevy::prelude::*;

use crate::config::{LocomotionConfig, LookMode};

/// Marks an entity posed from a character's look angles.
///
/// In [`LookMode::FirstPerson`] the anchor is expected to be a child of the
/// character (a head) and gets a local pitch-only rotation. In
/// [`LookMode::ThirdPerson`] it is a free entity (a camera boom) that gets the
/// full yaw and pitch in world space and follows the character at `offset`.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct LookAnchor {
    /// The character whose look angles drive this anchor.
    pub character: Entity,
    /// World-space offset from the character, third person only.
    pub offset: Vec3,
}

impl LookAnchor {
    pub fn new(character: Entity) -> Self {
        Self {
            character,
            offset: Vec3::ZERO,
        }
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }
}

/// Rotation whose -Z axis points along `forward` with +Y toward `up`.
///
/// `None` when `forward` is degenerate or parallel to `up`.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    if !forward.is_finite() || !up.is_finite() {
        return None;
    }
    let forward = forward.try_normalize()?;
    let right = forward.cross(up).try_normalize()?;
    let up = right.cross(forward);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, -forward)).normalize())
}

/// Upright rotation for a yaw about `up`.
pub fn upright_yaw(yaw: f32, up: Vec3) -> Quat {
    Quat::from_rotation_arc(Vec3::Y, up) * Quat::from_rotation_y(yaw)
}

/// What the facing controller looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacingContext {
    pub grounded: bool,
    pub ground_normal: Vec3,
    pub up: Vec3,
    /// Ground-aligned movement direction, zero when idle.
    pub direction: Vec3,
    pub velocity: Vec3,
    pub current: Quat,
    /// Seconds since leaving the ground.
    pub airborne_elapsed: f32,
}

/// Target body rotation, or `None` to keep the current one.
pub fn facing_target(ctx: &FacingContext, config: &LocomotionConfig) -> Option<Quat> {
    let up = ctx.up;

    if ctx.grounded {
        let normal = ctx.ground_normal.try_normalize().unwrap_or(up);
        let flat = !config.policy.align_to_ground || normal.dot(up) >= config.flat_cos();
        if flat {
            return look_rotation(ctx.direction.reject_from_normalized(up), up);
        }

        // Decelerating on a slope: follow the slide instead of snapping
        let source = if ctx.direction.length_squared() > 1.0e-6 {
            ctx.direction
        } else if ctx.velocity.length_squared() > 1.0e-2 {
            ctx.velocity
        } else {
            return None;
        };
        return look_rotation(source.reject_from_normalized(normal), normal);
    }

    if ctx.airborne_elapsed < config.airborne_rotation_delay {
        return None;
    }
    look_rotation(ctx.direction.reject_from_normalized(up), up).or_else(|| {
        let forward = ctx.current * Vec3::NEG_Z;
        look_rotation(forward.reject_from_normalized(up), up)
    })
}

/// Slerp toward `target` by `turn_speed * dt` of the remaining angle.
pub fn turn_toward(current: Quat, target: Quat, turn_speed: f32, dt: f32) -> Quat {
    let t = (turn_speed * dt).clamp(0.0, 1.0);
    current.slerp(target, t).normalize()
}

/// Accumulate a look delta into yaw and pitch.
///
/// Positive `delta.x` turns right (yaw decreases about up), positive
/// `delta.y` looks up. Pitch is clamped to `±pitch_limit`.
pub fn apply_look_delta(yaw: f32, pitch: f32, delta: Vec2, config: &LocomotionConfig) -> (f32, f32) {
    if !delta.is_finite() {
        return (yaw, pitch);
    }
    let yaw = (yaw - delta.x * config.look_sensitivity).rem_euclid(std::f32::consts::TAU);
    let pitch = (pitch + delta.y * config.look_sensitivity)
        .clamp(-config.pitch_limit, config.pitch_limit);
    (yaw, pitch)
}

/// Pose of a look anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPose {
    pub rotation: Quat,
    /// World translation, only set for third person anchors.
    pub translation: Option<Vec3>,
}

/// Compute where a look anchor should be.
pub fn anchor_pose(
    mode: LookMode,
    yaw: f32,
    pitch: f32,
    character_position: Vec3,
    anchor: &LookAnchor,
    up: Vec3,
) -> AnchorPose {
    match mode {
        LookMode::FirstPerson => AnchorPose {
            rotation: Quat::from_rotation_x(pitch),
            translation: None,
        },
        LookMode::ThirdPerson => AnchorPose {
            rotation: upright_yaw(yaw, up) * Quat::from_rotation_x(pitch),
            translation: Some(character_position + anchor.offset),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1.0e-4
    }

    fn context() -> FacingContext {
        FacingContext {
            grounded: true,
            ground_normal: Vec3::Y,
            up: Vec3::Y,
            direction: Vec3::ZERO,
            velocity: Vec3::ZERO,
            current: Quat::IDENTITY,
            airborne_elapsed: 0.0,
        }
    }

    #[test]
    fn look_rotation_matches_bevy_forward() {
        let rotation = look_rotation(Vec3::NEG_Z, Vec3::Y).unwrap_or_default();
        assert!(rotation.angle_between(Quat::IDENTITY) < 1.0e-4);

        let rotation = look_rotation(Vec3::X, Vec3::Y).unwrap_or_default();
        assert!(approx(rotation * Vec3::NEG_Z, Vec3::X));
        assert!(approx(rotation * Vec3::Y, Vec3::Y));
    }

    #[test]
    fn look_rotation_rejects_degenerate_input() {
        assert_eq!(look_rotation(Vec3::ZERO, Vec3::Y), None);
        assert_eq!(look_rotation(Vec3::Y, Vec3::Y), None);
        assert_eq!(look_rotation(Vec3::splat(f32::NAN), Vec3::Y), None);
    }

    #[test]
    fn flat_ground_faces_movement_upright() {
        let config = LocomotionConfig::default();
        let ctx = FacingContext {
            direction: Vec3::X,
            ..context()
        };
        let target = facing_target(&ctx, &config).unwrap_or_default();
        assert!(approx(target * Vec3::NEG_Z, Vec3::X));
        assert!(approx(target * Vec3::Y, Vec3::Y));
    }

    #[test]
    fn idle_on_flat_ground_keeps_facing() {
        let config = LocomotionConfig::default();
        assert_eq!(facing_target(&context(), &config), None);
    }

    #[test]
    fn walkable_slope_tilts_facing() {
        let config = LocomotionConfig::default();
        let angle = 25f32.to_radians();
        let normal = Vec3::new(0.0, angle.cos(), -angle.sin());
        let ctx = FacingContext {
            ground_normal: normal,
            direction: Vec3::Z,
            ..context()
        };

        let target = facing_target(&ctx, &config).unwrap_or_default();
        assert!(approx(target * Vec3::Y, normal));
        assert!((target * Vec3::NEG_Z).dot(normal).abs() < 1.0e-4);
    }

    #[test]
    fn slope_without_input_follows_velocity() {
        let config = LocomotionConfig::default();
        let angle = 25f32.to_radians();
        let normal = Vec3::new(0.0, angle.cos(), -angle.sin());
        let ctx = FacingContext {
            ground_normal: normal,
            velocity: Vec3::new(2.0, 0.0, 0.0),
            ..context()
        };

        let target = facing_target(&ctx, &config).unwrap_or_default();
        assert!((target * Vec3::NEG_Z).x > 0.9);

        let resting = FacingContext {
            velocity: Vec3::ZERO,
            ..ctx
        };
        assert_eq!(facing_target(&resting, &config), None);
    }

    #[test]
    fn airborne_facing_waits_for_delay() {
        let config = LocomotionConfig::default();
        let ctx = FacingContext {
            grounded: false,
            direction: Vec3::X,
            airborne_elapsed: config.airborne_rotation_delay * 0.5,
            ..context()
        };
        assert_eq!(facing_target(&ctx, &config), None);

        let later = FacingContext {
            airborne_elapsed: config.airborne_rotation_delay,
            ..ctx
        };
        let target = facing_target(&later, &config).unwrap_or_default();
        assert!(approx(target * Vec3::NEG_Z, Vec3::X));
    }

    #[test]
    fn airborne_without_input_returns_upright() {
        let config = LocomotionConfig::default();
        let tilted = Quat::from_rotation_x(0.4) * Quat::from_rotation_y(0.3);
        let ctx = FacingContext {
            grounded: false,
            current: tilted,
            airborne_elapsed: 1.0,
            ..context()
        };

        let target = facing_target(&ctx, &config).unwrap_or_default();
        assert!(approx(target * Vec3::Y, Vec3::Y));
    }

    #[test]
    fn turn_toward_is_rate_limited() {
        let target = Quat::from_rotation_y(FRAC_PI_2);
        let halfway = turn_toward(Quat::IDENTITY, target, 5.0, 0.1);
        assert!((halfway.angle_between(target) - FRAC_PI_2 * 0.5).abs() < 1.0e-3);

        let snapped = turn_toward(Quat::IDENTITY, target, 100.0, 0.1);
        assert!(snapped.angle_between(target) < 1.0e-4);
    }

    #[test]
    fn look_pitch_is_clamped() {
        let config = LocomotionConfig::default().with_look(0.01, 1.0);
        let (_, pitch) = apply_look_delta(0.0, 0.0, Vec2::new(0.0, 500.0), &config);
        assert_eq!(pitch, 1.0);

        let (_, pitch) = apply_look_delta(0.0, 0.0, Vec2::new(0.0, -500.0), &config);
        assert_eq!(pitch, -1.0);
    }

    #[test]
    fn look_right_decreases_yaw() {
        let config = LocomotionConfig::default().with_look(0.01, 1.0);
        let (yaw, _) = apply_look_delta(1.0, 0.0, Vec2::new(10.0, 0.0), &config);
        assert!((yaw - 0.9).abs() < 1.0e-5);

        // Facing for the new yaw turned right (clockwise seen from above)
        let forward = upright_yaw(yaw, Vec3::Y) * Vec3::NEG_Z;
        let before = upright_yaw(1.0, Vec3::Y) * Vec3::NEG_Z;
        assert!(before.cross(forward).y < 0.0);
    }

    #[test]
    fn first_person_anchor_only_pitches() {
        let anchor = LookAnchor::new(Entity::PLACEHOLDER);
        let pose = anchor_pose(LookMode::FirstPerson, 1.2, 0.3, Vec3::ONE, &anchor, Vec3::Y);
        assert_eq!(pose.rotation, Quat::from_rotation_x(0.3));
        assert_eq!(pose.translation, None);
    }

    #[test]
    fn third_person_anchor_follows_character() {
        let anchor = LookAnchor::new(Entity::PLACEHOLDER).with_offset(Vec3::new(0.0, 1.5, 0.0));
        let pose = anchor_pose(LookMode::ThirdPerson, FRAC_PI_2, 0.0, Vec3::new(4.0, 0.0, 2.0), &anchor, Vec3::Y);

        assert_eq!(pose.translation, Some(Vec3::new(4.0, 1.5, 2.0)));
        assert!(approx(pose.rotation * Vec3::NEG_Z, Vec3::NEG_X));
    }
}
