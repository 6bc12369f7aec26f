//! Controller configuration components.
//!
//! This module defines the tunables of the locomotion controller: speeds,
//! drags, slope limits, jump charges, timers and look settings, plus the
//! named policy toggles that select between movement variants.

use std::time::Duration;

use bevy::prelude::*;
use thiserror::Error;

/// Errors raised when a character is set up with unusable configuration.
///
/// These are only produced at setup time. A character that fails validation
/// is marked with [`ControllerDisabled`](crate::state::ControllerDisabled)
/// and never driven.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("`{name}` must be positive, got {value}")]
    NonPositive { name: &'static str, value: f32 },

    #[error("`{name}` must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("`{name}` must be finite")]
    NonFinite { name: &'static str },

    #[error("entity {entity} is missing required component `{component}`")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error("entity {entity} has an unusable body: {reason}")]
    InvalidBody { entity: Entity, reason: String },
}

/// How a jump writes the vertical velocity.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JumpVelocityMode {
    /// Set vertical speed to the jump force, or add it when already rising faster.
    #[default]
    SetOrBoost,
    /// Always add the jump force to the current vertical speed.
    Push,
}

/// How the level jump signal maps onto jump requests.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JumpTrigger {
    /// A press fires a ground jump when grounded, otherwise an air jump.
    #[default]
    EdgeTriggered,
    /// Holding fires a ground jump whenever one is legal, a press fires air jumps.
    HoldAndPress,
}

/// Where the look yaw is applied.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookMode {
    /// Body takes the yaw, the head anchor takes the pitch.
    #[default]
    FirstPerson,
    /// A separate camera anchor takes yaw and pitch; the body turns with movement.
    ThirdPerson,
}

/// Named toggles selecting a movement variant.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct LocomotionPolicy {
    /// Re-project move direction onto the ground plane and tilt facing to slopes.
    pub align_to_ground: bool,
    /// Refine the averaged ground normal with a short forward ray at step edges.
    pub step_refinement: bool,
    /// Treat surfaces steeper than the walkable angle as not standable.
    pub invalidate_steep_slopes: bool,
    pub jump_velocity: JumpVelocityMode,
    pub jump_trigger: JumpTrigger,
    pub look_mode: LookMode,
}

impl Default for LocomotionPolicy {
    fn default() -> Self {
        Self {
            align_to_ground: true,
            step_refinement: false,
            invalidate_steep_slopes: true,
            jump_velocity: JumpVelocityMode::SetOrBoost,
            jump_trigger: JumpTrigger::EdgeTriggered,
            look_mode: LookMode::FirstPerson,
        }
    }
}

/// Configuration parameters for the locomotion controller.
///
/// Angles are radians, durations are seconds.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct LocomotionConfig {
    // === Movement ===
    /// Target horizontal speed (m/s).
    pub max_speed: f32,
    /// Fraction of the velocity error closed per second.
    pub acceleration: f32,
    /// Target speed multiplier while sprinting.
    pub sprint_multiplier: f32,
    /// Scale applied to the steering delta while airborne (0.0-1.0).
    pub air_control_factor: f32,
    /// Body drag while grounded with no input.
    pub ground_drag: f32,
    /// Body drag while moving or airborne.
    pub air_drag: f32,

    // === Gravity ===
    /// Gravity applied while airborne. The body's native gravity must be off.
    pub gravity: Vec3,
    /// Extra downward acceleration once vertical speed drops below the threshold.
    pub fall_boost: f32,
    /// Vertical speed (m/s) at or below which the fall boost applies.
    pub fall_boost_threshold: f32,

    // === Ground sensing ===
    /// How far below the capsule bottom the ground probe reaches.
    pub ground_check_distance: f32,
    /// Probe sphere radius as a fraction of the capsule radius.
    pub ground_check_radius_multiplier: f32,
    /// Collision group bits the probe tests against.
    pub ground_mask: u32,
    /// Steepest walkable slope.
    pub max_walkable_slope_angle: f32,
    /// Slopes up to this angle count as flat for facing.
    pub flat_ground_angle: f32,
    /// Reach of the step refinement ray below the capsule bottom.
    pub step_ray_length: f32,

    // === Jumping ===
    /// Vertical speed set (or added) by a jump (m/s).
    pub jump_force: f32,
    /// Air jump charges per airborne period.
    pub max_air_jumps: u32,
    /// Time after a jump during which ground detection is ignored.
    pub post_jump_grace: f32,

    // === Orientation ===
    /// Facing turn rate (fraction of the remaining angle per second).
    pub turn_speed: f32,
    /// Time after leaving the ground before facing returns upright.
    pub airborne_rotation_delay: f32,
    /// Radians of look rotation per unit of look delta.
    pub look_sensitivity: f32,
    /// Maximum absolute look pitch.
    pub pitch_limit: f32,

    pub policy: LocomotionPolicy,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            max_speed: 10.0,
            acceleration: 5.0,
            sprint_multiplier: 2.0,
            air_control_factor: 0.25,
            ground_drag: 15.0,
            air_drag: 0.002,

            gravity: Vec3::new(0.0, -9.81, 0.0),
            fall_boost: 7.5,
            fall_boost_threshold: 3.0,

            ground_check_distance: 0.1,
            ground_check_radius_multiplier: 0.9,
            ground_mask: u32::MAX,
            max_walkable_slope_angle: 50f32.to_radians(),
            flat_ground_angle: 5f32.to_radians(),
            step_ray_length: 0.3,

            jump_force: 6.0,
            max_air_jumps: 1,
            post_jump_grace: 0.15,

            turn_speed: 10.0,
            airborne_rotation_delay: 0.25,
            look_sensitivity: 0.002,
            pitch_limit: 88f32.to_radians(),

            policy: LocomotionPolicy::default(),
        }
    }
}

impl LocomotionConfig {
    /// Create a config tuned for a player character.
    pub fn player() -> Self {
        Self {
            acceleration: 8.0,
            turn_speed: 14.0,
            policy: LocomotionPolicy {
                step_refinement: true,
                ..default()
            },
            ..default()
        }
    }

    /// Create a config for AI-controlled characters.
    ///
    /// NPCs turn with movement, never air jump and use hold-to-jump input.
    pub fn npc() -> Self {
        Self {
            max_speed: 6.0,
            max_air_jumps: 0,
            turn_speed: 6.0,
            policy: LocomotionPolicy {
                jump_trigger: JumpTrigger::HoldAndPress,
                look_mode: LookMode::ThirdPerson,
                ..default()
            },
            ..default()
        }
    }

    /// World up, opposite to gravity. Falls back to +Y for zero gravity.
    #[inline]
    pub fn up(&self) -> Vec3 {
        (-self.gravity).try_normalize().unwrap_or(Vec3::Y)
    }

    /// Cosine of the walkable slope angle.
    ///
    /// A surface is walkable when its normal's dot with up is above this.
    #[inline]
    pub fn walkable_cos(&self) -> f32 {
        self.max_walkable_slope_angle.cos()
    }

    /// Cosine of the flat ground angle.
    #[inline]
    pub fn flat_cos(&self) -> f32 {
        self.flat_ground_angle.cos()
    }

    /// The post-jump grace window as a duration.
    pub fn post_jump_grace_duration(&self) -> Duration {
        Duration::from_secs_f32(self.post_jump_grace.max(0.0))
    }

    /// Check every tunable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("max_speed", self.max_speed),
            ("acceleration", self.acceleration),
            ("sprint_multiplier", self.sprint_multiplier),
            ("air_control_factor", self.air_control_factor),
            ("ground_drag", self.ground_drag),
            ("air_drag", self.air_drag),
            ("fall_boost", self.fall_boost),
            ("fall_boost_threshold", self.fall_boost_threshold),
            ("ground_check_distance", self.ground_check_distance),
            ("ground_check_radius_multiplier", self.ground_check_radius_multiplier),
            ("max_walkable_slope_angle", self.max_walkable_slope_angle),
            ("flat_ground_angle", self.flat_ground_angle),
            ("step_ray_length", self.step_ray_length),
            ("jump_force", self.jump_force),
            ("post_jump_grace", self.post_jump_grace),
            ("turn_speed", self.turn_speed),
            ("airborne_rotation_delay", self.airborne_rotation_delay),
            ("look_sensitivity", self.look_sensitivity),
            ("pitch_limit", self.pitch_limit),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name });
            }
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::NonFinite { name: "gravity" });
        }

        positive("max_speed", self.max_speed)?;
        positive("acceleration", self.acceleration)?;
        positive("sprint_multiplier", self.sprint_multiplier)?;
        positive("jump_force", self.jump_force)?;
        positive("turn_speed", self.turn_speed)?;
        positive("ground_check_radius_multiplier", self.ground_check_radius_multiplier)?;

        in_range("air_control_factor", self.air_control_factor, 0.0, 1.0)?;
        in_range("ground_drag", self.ground_drag, 0.0, f32::MAX)?;
        in_range("air_drag", self.air_drag, 0.0, f32::MAX)?;
        in_range("fall_boost", self.fall_boost, 0.0, f32::MAX)?;
        in_range("ground_check_distance", self.ground_check_distance, 0.0, f32::MAX)?;
        in_range("step_ray_length", self.step_ray_length, 0.0, f32::MAX)?;
        in_range("post_jump_grace", self.post_jump_grace, 0.0, f32::MAX)?;
        in_range("airborne_rotation_delay", self.airborne_rotation_delay, 0.0, f32::MAX)?;
        in_range("look_sensitivity", self.look_sensitivity, 0.0, f32::MAX)?;
        in_range(
            "max_walkable_slope_angle",
            self.max_walkable_slope_angle,
            0.0,
            std::f32::consts::FRAC_PI_2,
        )?;
        in_range(
            "flat_ground_angle",
            self.flat_ground_angle,
            0.0,
            self.max_walkable_slope_angle,
        )?;
        in_range("pitch_limit", self.pitch_limit, 0.0, std::f32::consts::FRAC_PI_2)?;

        Ok(())
    }

    /// Builder: set max speed.
    pub fn with_max_speed(mut self, max_speed: f32) -> Self {
        self.max_speed = max_speed;
        self
    }

    /// Builder: set movement parameters.
    pub fn with_movement(mut self, max_speed: f32, acceleration: f32) -> Self {
        self.max_speed = max_speed;
        self.acceleration = acceleration;
        self
    }

    /// Builder: set sprint multiplier.
    pub fn with_sprint_multiplier(mut self, multiplier: f32) -> Self {
        self.sprint_multiplier = multiplier;
        self
    }

    /// Builder: set air control factor.
    pub fn with_air_control(mut self, factor: f32) -> Self {
        self.air_control_factor = factor;
        self
    }

    /// Builder: set ground and air drag.
    pub fn with_drag(mut self, ground: f32, air: f32) -> Self {
        self.ground_drag = ground;
        self.air_drag = air;
        self
    }

    /// Builder: set gravity.
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Builder: set fall boost acceleration and threshold.
    pub fn with_fall_boost(mut self, boost: f32, threshold: f32) -> Self {
        self.fall_boost = boost;
        self.fall_boost_threshold = threshold;
        self
    }

    /// Builder: set jump force.
    pub fn with_jump_force(mut self, force: f32) -> Self {
        self.jump_force = force;
        self
    }

    /// Builder: set air jump charges.
    pub fn with_max_air_jumps(mut self, jumps: u32) -> Self {
        self.max_air_jumps = jumps;
        self
    }

    /// Builder: set post-jump grace window.
    pub fn with_post_jump_grace(mut self, seconds: f32) -> Self {
        self.post_jump_grace = seconds;
        self
    }

    /// Builder: set ground probe distance.
    pub fn with_ground_check_distance(mut self, distance: f32) -> Self {
        self.ground_check_distance = distance;
        self
    }

    /// Builder: set collision groups the ground probe tests against.
    pub fn with_ground_mask(mut self, mask: u32) -> Self {
        self.ground_mask = mask;
        self
    }

    /// Builder: set steepest walkable slope (radians).
    pub fn with_max_walkable_slope(mut self, angle: f32) -> Self {
        self.max_walkable_slope_angle = angle;
        self
    }

    /// Builder: set turn speed.
    pub fn with_turn_speed(mut self, speed: f32) -> Self {
        self.turn_speed = speed;
        self
    }

    /// Builder: set look sensitivity and pitch limit.
    pub fn with_look(mut self, sensitivity: f32, pitch_limit: f32) -> Self {
        self.look_sensitivity = sensitivity;
        self.pitch_limit = pitch_limit;
        self
    }

    /// Builder: set policy toggles.
    pub fn with_policy(mut self, policy: LocomotionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

fn in_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}
