//! Character state and marker components.
//!
//! [`CharacterState`] is owned by the controller and mutated once per physics
//! tick (and once per frame for orientation). Other systems should read the
//! published [`LocomotionReadout`] or the [`Grounded`] / [`Airborne`] markers.

use std::time::Duration;

use bevy::prelude::*;

use crate::constraint::Permissions;
use crate::jump::JumpEdge;

/// Mutable locomotion state of a character.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct CharacterState {
    // === Body mirror ===
    /// Linear velocity mirrored from the physics body each tick.
    pub velocity: Vec3,

    // === Ground ===
    pub is_grounded: bool,
    /// Unit ground normal. Keeps its last valid value while airborne.
    pub ground_normal: Vec3,
    /// A contact was found but it is too steep to stand on.
    pub on_invalid_slope: bool,
    /// Number of usable contacts in the last ground query.
    pub contact_count: usize,

    // === Jump ===
    pub is_jumping: bool,
    pub air_jumps_used: u32,
    /// Ground detection is ignored until the physics clock reaches this.
    pub ground_check_suppressed_until: Duration,
    pub(crate) jump_edge: JumpEdge,
    /// Height along up at takeoff, while a jump is being tracked.
    pub(crate) jump_takeoff: Option<f32>,
    pub(crate) jump_apex: f32,
    pub(crate) last_jump_height: f32,

    // === Orientation ===
    pub facing: Quat,
    pub look_yaw: f32,
    pub look_pitch: f32,
    /// Ground-aligned move direction used in the last locomotion step.
    pub last_move_direction: Vec3,
    /// Seconds since the character left the ground.
    pub airborne_elapsed: f32,
}

impl Default for CharacterState {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            is_grounded: false,
            ground_normal: Vec3::Y,
            on_invalid_slope: false,
            contact_count: 0,
            is_jumping: false,
            air_jumps_used: 0,
            ground_check_suppressed_until: Duration::ZERO,
            jump_edge: JumpEdge::default(),
            jump_takeoff: None,
            jump_apex: 0.0,
            last_jump_height: 0.0,
            facing: Quat::IDENTITY,
            look_yaw: 0.0,
            look_pitch: 0.0,
            last_move_direction: Vec3::ZERO,
            airborne_elapsed: 0.0,
        }
    }
}

impl CharacterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given look yaw, e.g. the spawn heading.
    pub fn with_yaw(yaw: f32) -> Self {
        Self {
            look_yaw: yaw,
            facing: Quat::from_rotation_y(yaw),
            ..default()
        }
    }

    /// Whether the post-jump grace window is still running at `now`.
    #[inline]
    pub fn ground_check_suppressed(&self, now: Duration) -> bool {
        now < self.ground_check_suppressed_until
    }

    /// Air jump charges left, given the configured maximum.
    pub fn air_jumps_remaining(&self, max_air_jumps: u32) -> u32 {
        max_air_jumps.saturating_sub(self.air_jumps_used)
    }

    /// Apex height of the last completed or ongoing jump.
    pub fn last_jump_height(&self) -> f32 {
        self.last_jump_height
    }

    /// Track the jump apex from the current height along up.
    pub(crate) fn track_jump_height(&mut self, height: f32) {
        let Some(takeoff) = self.jump_takeoff else {
            return;
        };
        if height > self.jump_apex {
            self.jump_apex = height;
            self.last_jump_height = self.jump_apex - takeoff;
        }
    }
}

/// Read-only snapshot published at the end of every physics tick.
///
/// HUDs, cameras and gameplay code should read this rather than
/// [`CharacterState`].
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct LocomotionReadout {
    pub is_grounded: bool,
    pub is_jumping: bool,
    pub air_jumps_remaining: u32,
    pub on_invalid_slope: bool,
    pub permissions: Permissions,
    /// Speed perpendicular to up (m/s).
    pub horizontal_speed: f32,
    /// Speed along up (m/s), positive when rising.
    pub vertical_speed: f32,
    /// Rise from takeoff to apex of the last jump.
    pub last_jump_height: f32,
}

/// Marker component indicating the character is grounded.
///
/// Mutually exclusive with [`Airborne`].
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use locomotion_controller::prelude::*;
///
/// fn count_grounded(q: Query<(), With<Grounded>>) -> usize {
///     q.iter().count()
/// }
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the character is airborne.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// Inserted when setup validation fails. Disabled characters are never driven.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct ControllerDisabled;

/// Inserted once setup validation passes. Only ready characters are driven.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct ControllerReady;

/// Query filter for characters the controller drives.
pub type ActiveCharacter = (With<ControllerReady>, Without<ControllerDisabled>);
