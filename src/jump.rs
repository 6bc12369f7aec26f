//! Jump state machine.
//!
//! Ground jumps are legal while grounded. Air jumps draw from a finite pool of
//! charges that refills on landing, and are only legal once the post-jump
//! grace window has elapsed.
//!
//! Within one tick the air jump is evaluated first, against the state as it
//! was before any ground jump of that tick. A ground jump starts the grace
//! window, so an air jump request in the same tick as a ground jump is
//! always rejected.

use std::time::Duration;

use bevy::prelude::*;

use crate::config::{JumpTrigger, JumpVelocityMode, LocomotionConfig};
use crate::state::CharacterState;

/// Derives press and release edges from a level signal.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JumpEdge {
    previous: bool,
}

/// Rising edge and level of the jump signal for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JumpSignal {
    /// Rising edge this tick.
    pub pressed: bool,
    /// Level this tick.
    pub held: bool,
}

impl JumpEdge {
    /// Compare `level` to the previous tick's level and remember it.
    pub fn update(&mut self, level: bool) -> JumpSignal {
        let signal = JumpSignal {
            pressed: level && !self.previous,
            held: level,
        };
        self.previous = level;
        signal
    }
}

/// Which jump fired this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpOutcome {
    Ground { velocity: Vec3 },
    Air { velocity: Vec3 },
}

impl JumpOutcome {
    pub fn velocity(&self) -> Vec3 {
        match *self {
            JumpOutcome::Ground { velocity } | JumpOutcome::Air { velocity } => velocity,
        }
    }
}

/// New velocity after a jump along `up`.
///
/// In [`JumpVelocityMode::SetOrBoost`] the vertical speed is overwritten with
/// `jump_force`, unless the character already rises faster, in which case the
/// force is added so a jump never slows it down.
pub fn jump_velocity(velocity: Vec3, up: Vec3, jump_force: f32, mode: JumpVelocityMode) -> Vec3 {
    let vertical = velocity.dot(up);
    match mode {
        JumpVelocityMode::Push => velocity + up * jump_force,
        JumpVelocityMode::SetOrBoost if vertical <= jump_force => {
            velocity + up * (jump_force - vertical)
        }
        JumpVelocityMode::SetOrBoost => velocity + up * jump_force,
    }
}

/// Jump from the ground. Returns the new velocity, or `None` when not grounded.
pub fn try_ground_jump(
    state: &mut CharacterState,
    velocity: Vec3,
    up: Vec3,
    config: &LocomotionConfig,
    now: Duration,
) -> Option<Vec3> {
    if !state.is_grounded {
        return None;
    }

    state.is_jumping = true;
    state.is_grounded = false;
    state.air_jumps_used = 0;
    state.ground_check_suppressed_until = now + config.post_jump_grace_duration();

    Some(jump_velocity(
        velocity,
        up,
        config.jump_force,
        config.policy.jump_velocity,
    ))
}

/// Jump while airborne. Returns the new velocity, or `None` when illegal.
///
/// Illegal requests leave the state untouched.
pub fn try_air_jump(
    state: &mut CharacterState,
    velocity: Vec3,
    up: Vec3,
    config: &LocomotionConfig,
    now: Duration,
) -> Option<Vec3> {
    if state.is_grounded
        || !state.is_jumping
        || state.ground_check_suppressed(now)
        || state.air_jumps_used >= config.max_air_jumps
    {
        return None;
    }

    state.air_jumps_used += 1;

    Some(jump_velocity(
        velocity,
        up,
        config.jump_force,
        config.policy.jump_velocity,
    ))
}

/// Run one tick of the jump machine.
pub fn evaluate_jump(
    state: &mut CharacterState,
    signal: JumpSignal,
    velocity: Vec3,
    up: Vec3,
    config: &LocomotionConfig,
    now: Duration,
) -> Option<JumpOutcome> {
    let ground_request = match config.policy.jump_trigger {
        JumpTrigger::EdgeTriggered => signal.pressed,
        JumpTrigger::HoldAndPress => signal.held,
    };

    if signal.pressed {
        if let Some(velocity) = try_air_jump(state, velocity, up, config, now) {
            return Some(JumpOutcome::Air { velocity });
        }
    }

    if ground_request {
        if let Some(velocity) = try_ground_jump(state, velocity, up, config, now) {
            return Some(JumpOutcome::Ground { velocity });
        }
    }

    None
}
