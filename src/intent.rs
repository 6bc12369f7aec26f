//! Movement intent component.
//!
//! The intent is the controller's only input. Player input, AI or network
//! code writes it before the physics tick; the controller systems read it.

use bevy::prelude::*;

/// Per-tick movement intent of a character.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use locomotion_controller::prelude::*;
///
/// let mut intent = MovementIntent::new();
/// // Forward on the stick, camera facing along -Z
/// intent.set_move_axes(Vec2::new(0.0, 1.0), 0.0);
/// assert!(intent.is_moving());
///
/// intent.clear();
/// assert!(!intent.is_moving());
/// ```
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct MovementIntent {
    /// World-space move direction. Unit length or zero.
    pub move_direction: Vec3,
    /// Target speed multiplier (0.0 to 1.0), for analog walking.
    pub speed_scale: f32,
    /// Whether sprint is requested.
    pub sprint: bool,
    /// Whether the jump action is currently held.
    ///
    /// This is a level signal. Call `set_jump_pressed` every frame with the
    /// current button state; press and release edges are derived inside the
    /// physics tick, so holding the button never fires repeated presses.
    ///
    /// # Example
    /// ```rust,ignore
    /// intent.set_jump_pressed(keyboard.pressed(KeyCode::Space));
    /// ```
    pub jump_pressed: bool,
    /// Look delta accumulated since the last frame tick.
    ///
    /// Positive x turns right, positive y looks up.
    pub look_delta: Vec2,
}

impl Default for MovementIntent {
    fn default() -> Self {
        Self {
            move_direction: Vec3::ZERO,
            speed_scale: 1.0,
            sprint: false,
            jump_pressed: false,
            look_delta: Vec2::ZERO,
        }
    }
}

impl MovementIntent {
    /// Create a new empty movement intent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the world-space move direction.
    ///
    /// Longer vectors are normalized, degenerate ones become zero.
    pub fn set_move_direction(&mut self, direction: Vec3) {
        self.move_direction = if direction.is_finite() {
            direction.normalize_or_zero()
        } else {
            Vec3::ZERO
        };
    }

    /// Set the move direction from 2D input axes relative to a yaw.
    ///
    /// `axes.y` moves along the yaw's forward, `axes.x` along its right, both
    /// flattened onto the horizontal plane. `yaw` is the rotation about +Y,
    /// zero facing -Z.
    pub fn set_move_axes(&mut self, axes: Vec2, yaw: f32) {
        let rotation = Quat::from_rotation_y(yaw);
        let forward = flatten(rotation * Vec3::NEG_Z);
        let right = flatten(rotation * Vec3::X);
        self.set_move_direction(forward * axes.y + right * axes.x);
    }

    /// Set the speed multiplier (0.0 to 1.0).
    pub fn set_speed_scale(&mut self, scale: f32) {
        self.speed_scale = scale.clamp(0.0, 1.0);
    }

    pub fn set_sprint(&mut self, sprint: bool) {
        self.sprint = sprint;
    }

    /// Set the jump level signal.
    pub fn set_jump_pressed(&mut self, pressed: bool) {
        self.jump_pressed = pressed;
    }

    /// Accumulate a look delta. Consumed by the next frame tick.
    pub fn add_look_delta(&mut self, delta: Vec2) {
        if delta.is_finite() {
            self.look_delta += delta;
        }
    }

    /// Take the accumulated look delta.
    pub fn take_look_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.look_delta)
    }

    /// Clear movement, sprint and jump. Look delta is left for the frame tick.
    pub fn clear(&mut self) {
        self.move_direction = Vec3::ZERO;
        self.sprint = false;
        self.jump_pressed = false;
    }

    /// Check if there is active movement input.
    pub fn is_moving(&self) -> bool {
        self.move_direction.length_squared() > 1.0e-6
    }
}

fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z).normalize_or_zero()
}
