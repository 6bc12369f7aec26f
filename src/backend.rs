//! Physics backend abstraction.
//!
//! This module defines the traits that physics backends must implement
//! to work with the locomotion controller. The controller never talks to a
//! physics engine directly: body mutation goes through
//! [`CharacterPhysicsBackend`] and scene queries go through [`SceneQuery`].

use bevy::prelude::*;

use crate::collision::{Contact, RayHit};
use crate::config::ConfigError;

/// How a vector passed to [`CharacterPhysicsBackend::add_force`] is applied.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceMode {
    /// Mass-independent acceleration integrated over the fixed timestep.
    #[default]
    Acceleration,
    /// Instant, mass-independent change of linear velocity.
    VelocityChange,
}

/// Trait for physics backend implementations.
///
/// Implement this trait to drive a rigid body from some physics engine.
/// All methods are static and operate on the ECS [`World`].
///
/// For an example implementation, see the `rapier` module's `Rapier3dBackend`.
pub trait CharacterPhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend (sensor systems etc).
    fn plugin() -> impl Plugin;

    /// Get the current linear velocity of an entity.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the linear velocity of an entity.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Apply a force to an entity.
    ///
    /// See [`ForceMode`] for how `vector` is interpreted.
    fn add_force(world: &mut World, entity: Entity, vector: Vec3, mode: ForceMode) {
        let velocity = Self::get_velocity(world, entity);
        let delta = match mode {
            ForceMode::Acceleration => vector * Self::get_fixed_timestep(world),
            ForceMode::VelocityChange => vector,
        };
        Self::set_velocity(world, entity, velocity + delta);
    }

    /// Set the linear drag (damping) coefficient of an entity.
    fn set_drag(world: &mut World, entity: Entity, drag: f32);

    /// Get the linear drag (damping) coefficient of an entity.
    fn get_drag(world: &World, entity: Entity) -> f32;

    /// Get the current world position of an entity.
    fn get_position(world: &World, entity: Entity) -> Vec3;

    /// Get the current world rotation of an entity.
    fn get_rotation(world: &World, entity: Entity) -> Quat;

    /// Set the world rotation of an entity.
    fn set_rotation(world: &mut World, entity: Entity, rotation: Quat);

    /// Get the fixed timestep delta time.
    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }

    /// Check that an entity carries everything this backend needs to drive it.
    ///
    /// Called once when a character is added. An error here disables the
    /// character instead of failing every tick.
    fn validate_body(world: &World, entity: Entity) -> Result<(), ConfigError>;
}

/// Scene queries consumed by the ground contact sensor.
///
/// Implementations exclude the querying character's own colliders.
pub trait SceneQuery {
    /// Every surface overlapping a sphere, with its penetration normal.
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: u32) -> Vec<Contact>;

    /// The closest surface hit along a ray, if any.
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: u32)
        -> Option<RayHit>;
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}
