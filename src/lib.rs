//! # `locomotion_controller`
//!
//! A physics-driven 3D character locomotion core with physics backend abstraction.
//!
//! This crate drives a dynamic capsule rigid body from an abstract movement
//! intent:
//! - Senses ground with a sphere overlap under the capsule, with optional
//!   step refinement raycast
//! - Steers toward a desired velocity along the ground, preserving momentum
//! - Applies its own gravity with a fall boost after the jump apex
//! - Handles ground jumps and a pool of air jumps with a grace window
//! - Turns the body toward movement and accumulates first or third person look
//! - Honors timed movement constraints (stuns, roots, sprint locks)
//! - Abstracts the physics backend for easy swapping (Rapier3D included)
//!
//! ## Architecture
//!
//! Every physics tick runs the [`LocomotionSet`] phases in order:
//! 1. `Preparation` validates characters spawned since the last check, then
//!    mirrors the body velocity into [`CharacterState`](state::CharacterState)
//! 2. `Sensors` queries the ground (backend provided)
//! 3. `Jump` evaluates ground and air jumps
//! 4. `Movement` applies gravity, then the locomotion step and drag
//! 5. `Publish` updates the markers and the [`LocomotionReadout`](state::LocomotionReadout)
//!
//! Orientation and look anchors update once per frame in `Update`.
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use locomotion_controller::prelude::*;
//!
//! // Core components for a player character
//! let bundle = CharacterBundle::new(LocomotionConfig::player());
//! assert!(bundle.config.validate().is_ok());
//!
//! // Spawn it together with the backend's body components and a capsule collider
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod collision;
pub mod config;
pub mod constraint;
pub mod intent;
pub mod jump;
pub mod locomotion;
pub mod orientation;
pub mod sensor;
pub mod state;
pub mod systems;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::{CharacterPhysicsBackend, ForceMode, SceneQuery};
    pub use crate::collision::{Contact, RayHit};
    pub use crate::config::{
        ConfigError, JumpTrigger, JumpVelocityMode, LocomotionConfig, LocomotionPolicy, LookMode,
    };
    pub use crate::constraint::{ConstraintHandle, MovementConstraint, MovementConstraints, Permissions};
    pub use crate::intent::MovementIntent;
    pub use crate::orientation::LookAnchor;
    pub use crate::state::{
        ActiveCharacter, Airborne, CharacterState, ControllerDisabled, ControllerReady, Grounded,
        LocomotionReadout,
    };
    pub use crate::{CharacterBundle, CharacterControllerPlugin, LocomotionSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle};
}

/// Phases of one physics tick, chained in [`FixedUpdate`].
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocomotionSet {
    Preparation,
    Sensors,
    Jump,
    Movement,
    Publish,
}

/// Core components of a controlled character.
///
/// Physics components (rigid body, velocity, damping, collider) come from the
/// backend, e.g. [`Rapier3dCharacterBundle`](rapier::Rapier3dCharacterBundle).
#[derive(Bundle, Clone, Default)]
pub struct CharacterBundle {
    pub state: state::CharacterState,
    pub config: config::LocomotionConfig,
    pub intent: intent::MovementIntent,
    pub constraints: constraint::MovementConstraints,
    pub readout: state::LocomotionReadout,
}

impl CharacterBundle {
    pub fn new(config: config::LocomotionConfig) -> Self {
        Self {
            config,
            ..default()
        }
    }

    /// Start facing and looking along `yaw`.
    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.state = state::CharacterState::with_yaw(yaw);
        self
    }
}

/// Main plugin for the locomotion controller.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (velocity, drag, scene queries, etc.).
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// With Rapier3D backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use locomotion_controller::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default().in_fixed_schedule())
///     .add_plugins(CharacterControllerPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct CharacterControllerPlugin<B: backend::CharacterPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::CharacterPhysicsBackend> Default for CharacterControllerPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::CharacterPhysicsBackend> Plugin for CharacterControllerPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::LocomotionConfig>();
        app.register_type::<config::LocomotionPolicy>();
        app.register_type::<intent::MovementIntent>();
        app.register_type::<constraint::MovementConstraints>();
        app.register_type::<state::CharacterState>();
        app.register_type::<state::LocomotionReadout>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<state::ControllerDisabled>();
        app.register_type::<state::ControllerReady>();
        app.register_type::<orientation::LookAnchor>();

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.configure_sets(
            FixedUpdate,
            (
                LocomotionSet::Preparation,
                LocomotionSet::Sensors,
                LocomotionSet::Jump,
                LocomotionSet::Movement,
                LocomotionSet::Publish,
            )
                .chain(),
        );

        app.add_systems(
            PreUpdate,
            (
                systems::validate_new_characters::<B>,
                systems::expire_constraints,
            )
                .chain(),
        );

        app.add_systems(
            FixedUpdate,
            (
                (systems::validate_new_characters::<B>, systems::prepare_characters::<B>)
                    .chain()
                    .in_set(LocomotionSet::Preparation),
                systems::apply_jump::<B>.in_set(LocomotionSet::Jump),
                (systems::apply_gravity::<B>, systems::apply_locomotion::<B>)
                    .chain()
                    .in_set(LocomotionSet::Movement),
                (systems::sync_state_markers, systems::publish_readout::<B>)
                    .chain()
                    .in_set(LocomotionSet::Publish),
            ),
        );

        // Rotation and look follow the frame rate, not the physics tick
        app.add_systems(
            Update,
            (
                systems::update_orientation::<B>,
                systems::update_look_anchors,
            )
                .chain(),
        );
    }
}
