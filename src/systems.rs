//! Core controller systems.
//!
//! These systems wire the pure locomotion modules to the ECS. They are
//! generic over the physics backend so that a different engine can drive
//! the same character. Ground sensing needs scene queries and lives in the
//! backend plugin, in [`LocomotionSet::Sensors`](crate::LocomotionSet).

use std::time::Duration;

use bevy::prelude::*;

use crate::backend::{CharacterPhysicsBackend, ForceMode};
use crate::config::{ConfigError, LocomotionConfig, LookMode};
use crate::constraint::{MovementConstraints, Permissions};
use crate::intent::MovementIntent;
use crate::jump::{self, JumpOutcome};
use crate::locomotion::{self, GroundContext, LocomotionInput};
use crate::orientation::{self, FacingContext, LookAnchor};
use crate::state::{
    ActiveCharacter, Airborne, CharacterState, ControllerDisabled, ControllerReady, Grounded,
    LocomotionReadout,
};

/// Physics clock used for jump grace windows.
fn physics_now(world: &World) -> Duration {
    world
        .get_resource::<Time<Fixed>>()
        .map(|t| t.elapsed())
        .unwrap_or_default()
}

fn permissions_of(constraints: Option<&MovementConstraints>) -> Permissions {
    constraints.map(|c| c.permissions()).unwrap_or_default()
}

fn ground_context(state: &CharacterState, up: Vec3) -> GroundContext {
    GroundContext {
        grounded: state.is_grounded,
        jumping: state.is_jumping,
        normal: state.ground_normal,
        up,
    }
}

fn validate_character<B: CharacterPhysicsBackend>(
    world: &World,
    entity: Entity,
) -> Result<(), ConfigError> {
    let config = world
        .get::<LocomotionConfig>(entity)
        .ok_or(ConfigError::MissingComponent {
            entity,
            component: "LocomotionConfig",
        })?;
    config.validate()?;

    if world.get::<MovementIntent>(entity).is_none() {
        return Err(ConfigError::MissingComponent {
            entity,
            component: "MovementIntent",
        });
    }

    B::validate_body(world, entity)
}

/// Validate every character that has not been validated yet.
///
/// A passing character gets [`ControllerReady`], a failing one gets
/// [`ControllerDisabled`]. Every other system only drives ready characters,
/// so this runs both before the frame and at the start of each physics tick.
pub fn validate_new_characters<B: CharacterPhysicsBackend>(world: &mut World) {
    let entities: Vec<Entity> = world
        .query_filtered::<Entity, (
            With<CharacterState>,
            Without<ControllerReady>,
            Without<ControllerDisabled>,
        )>()
        .iter(world)
        .collect();

    for entity in entities {
        match validate_character::<B>(world, entity) {
            Ok(()) => {
                debug!("Character {entity} ready");
                let mut character = world.entity_mut(entity);
                character.insert(ControllerReady);
                if !character.contains::<LocomotionReadout>() {
                    character.insert(LocomotionReadout::default());
                }
            }
            Err(err) => {
                error!("Character {entity} disabled: {err}");
                world.entity_mut(entity).insert(ControllerDisabled);
            }
        }
    }
}

/// Advance constraint leases on the frame clock.
pub fn expire_constraints(time: Res<Time<Virtual>>, mut q_constraints: Query<&mut MovementConstraints>) {
    let now = time.elapsed();
    for mut constraints in &mut q_constraints {
        constraints.start_clock(now);
        constraints.advance(now);
    }
}

/// Mirror body velocity into the character state.
pub fn prepare_characters<B: CharacterPhysicsBackend>(world: &mut World) {
    let entities: Vec<Entity> = world
        .query_filtered::<Entity, (With<CharacterState>, ActiveCharacter)>()
        .iter(world)
        .collect();

    for entity in entities {
        let velocity = B::get_velocity(world, entity);
        if let Some(mut state) = world.get_mut::<CharacterState>(entity) {
            state.velocity = velocity;
        }
    }
}

/// Evaluate ground and air jumps.
///
/// The jump edge is tracked every tick, even while movement is blocked, so
/// a press held through a stun does not fire when the stun ends.
pub fn apply_jump<B: CharacterPhysicsBackend>(world: &mut World) {
    let now = physics_now(world);

    let entities: Vec<(Entity, LocomotionConfig, bool, Permissions, CharacterState)> = world
        .query_filtered::<(
            Entity,
            &LocomotionConfig,
            &MovementIntent,
            Option<&MovementConstraints>,
            &CharacterState,
        ), ActiveCharacter>()
        .iter(world)
        .map(|(e, config, intent, constraints, state)| {
            (
                e,
                config.clone(),
                intent.jump_pressed,
                permissions_of(constraints),
                state.clone(),
            )
        })
        .collect();

    for (entity, config, level, permissions, mut state) in entities {
        let signal = state.jump_edge.update(level);

        if permissions.can_move {
            let up = config.up();
            let velocity = B::get_velocity(world, entity);

            match jump::evaluate_jump(&mut state, signal, velocity, up, &config, now) {
                Some(JumpOutcome::Ground { velocity }) => {
                    B::set_velocity(world, entity, velocity);
                    state.velocity = velocity;

                    let height = B::get_position(world, entity).dot(up);
                    state.jump_takeoff = Some(height);
                    state.jump_apex = height;
                    state.last_jump_height = 0.0;
                    debug!("Character {entity} jumped");
                }
                Some(JumpOutcome::Air { velocity }) => {
                    B::set_velocity(world, entity, velocity);
                    state.velocity = velocity;
                    debug!(
                        "Character {entity} air jumped ({}/{})",
                        state.air_jumps_used, config.max_air_jumps
                    );
                }
                None => {}
            }
        }

        if let Some(mut slot) = world.get_mut::<CharacterState>(entity) {
            *slot = state;
        }
    }
}

/// Apply explicit gravity and the fall boost while airborne.
pub fn apply_gravity<B: CharacterPhysicsBackend>(world: &mut World) {
    let entities: Vec<(Entity, LocomotionConfig, GroundContext)> = world
        .query_filtered::<(Entity, &LocomotionConfig, &CharacterState), ActiveCharacter>()
        .iter(world)
        .map(|(e, config, state)| (e, config.clone(), ground_context(state, config.up())))
        .collect();

    for (entity, config, ground) in entities {
        let velocity = B::get_velocity(world, entity);
        let acceleration = locomotion::gravity_acceleration(velocity, &ground, &config);
        if acceleration != Vec3::ZERO {
            B::add_force(world, entity, acceleration, ForceMode::Acceleration);
        }
    }
}

/// Steer the body toward the intended velocity and pick the drag.
pub fn apply_locomotion<B: CharacterPhysicsBackend>(world: &mut World) {
    let entities: Vec<(Entity, LocomotionConfig, MovementIntent, Permissions, GroundContext)> = world
        .query_filtered::<(
            Entity,
            &LocomotionConfig,
            &MovementIntent,
            Option<&MovementConstraints>,
            &CharacterState,
        ), ActiveCharacter>()
        .iter(world)
        .map(|(e, config, intent, constraints, state)| {
            (
                e,
                config.clone(),
                intent.clone(),
                permissions_of(constraints),
                ground_context(state, config.up()),
            )
        })
        .collect();

    let dt = B::get_fixed_timestep(world);

    for (entity, config, intent, permissions, ground) in entities {
        if !permissions.can_move {
            if let Some(mut state) = world.get_mut::<CharacterState>(entity) {
                state.last_move_direction = Vec3::ZERO;
            }
            continue;
        }

        let input = LocomotionInput {
            direction: intent.move_direction,
            sprint: intent.sprint && permissions.can_sprint,
            speed_scale: intent.speed_scale,
        };
        let velocity = B::get_velocity(world, entity);
        let step = locomotion::locomotion_step(velocity, input, &ground, &config, dt);

        B::set_drag(world, entity, step.drag);
        if let Some(change) = step.velocity_change {
            B::add_force(world, entity, change, ForceMode::VelocityChange);
        }

        let velocity = B::get_velocity(world, entity);
        if let Some(mut state) = world.get_mut::<CharacterState>(entity) {
            state.last_move_direction = step.direction;
            state.velocity = velocity;
        }
    }
}

/// Keep the [`Grounded`] / [`Airborne`] markers in sync with the state.
pub fn sync_state_markers(
    mut commands: Commands,
    q_characters: Query<(Entity, &CharacterState, Has<Grounded>, Has<Airborne>), ActiveCharacter>,
) {
    for (entity, state, has_grounded, has_airborne) in &q_characters {
        if state.is_grounded {
            if !has_grounded {
                commands.entity(entity).insert(Grounded);
            }
            if has_airborne {
                commands.entity(entity).remove::<Airborne>();
            }
        } else {
            if !has_airborne {
                commands.entity(entity).insert(Airborne);
            }
            if has_grounded {
                commands.entity(entity).remove::<Grounded>();
            }
        }
    }
}

/// Publish the read-only [`LocomotionReadout`] and track jump height.
pub fn publish_readout<B: CharacterPhysicsBackend>(world: &mut World) {
    let entities: Vec<(Entity, LocomotionConfig, Permissions)> = world
        .query_filtered::<(Entity, &LocomotionConfig, Option<&MovementConstraints>), (With<CharacterState>, ActiveCharacter)>()
        .iter(world)
        .map(|(e, config, constraints)| (e, config.clone(), permissions_of(constraints)))
        .collect();

    for (entity, config, permissions) in entities {
        let up = config.up();
        let height = B::get_position(world, entity).dot(up);
        let velocity = B::get_velocity(world, entity);

        let Some(mut state) = world.get_mut::<CharacterState>(entity) else {
            continue;
        };
        state.track_jump_height(height);

        let vertical_speed = velocity.dot(up);
        let readout = LocomotionReadout {
            is_grounded: state.is_grounded,
            is_jumping: state.is_jumping,
            air_jumps_remaining: state.air_jumps_remaining(config.max_air_jumps),
            on_invalid_slope: state.on_invalid_slope,
            permissions,
            horizontal_speed: (velocity - up * vertical_speed).length(),
            vertical_speed,
            last_jump_height: state.last_jump_height(),
        };

        match world.get_mut::<LocomotionReadout>(entity) {
            Some(mut slot) => *slot = readout,
            None => {
                world.entity_mut(entity).insert(readout);
            }
        }
    }
}

/// Turn the body and accumulate look angles, once per frame.
pub fn update_orientation<B: CharacterPhysicsBackend>(world: &mut World) {
    let dt = world
        .get_resource::<Time>()
        .map(|t| t.delta_secs())
        .unwrap_or(0.0);

    let entities: Vec<(Entity, LocomotionConfig, Vec2, Permissions, CharacterState)> = world
        .query_filtered::<(
            Entity,
            &LocomotionConfig,
            &mut MovementIntent,
            Option<&MovementConstraints>,
            &CharacterState,
        ), ActiveCharacter>()
        .iter_mut(world)
        .map(|(e, config, mut intent, constraints, state)| {
            (
                e,
                config.clone(),
                intent.take_look_delta(),
                permissions_of(constraints),
                state.clone(),
            )
        })
        .collect();

    for (entity, config, look_delta, permissions, mut state) in entities {
        if !state.is_grounded {
            state.airborne_elapsed += dt;
        }

        if permissions.can_rotate {
            let up = config.up();
            let (yaw, pitch) =
                orientation::apply_look_delta(state.look_yaw, state.look_pitch, look_delta, &config);
            state.look_yaw = yaw;
            state.look_pitch = pitch;

            let current = B::get_rotation(world, entity);
            let rotation = match config.policy.look_mode {
                LookMode::FirstPerson => Some(orientation::upright_yaw(yaw, up)),
                LookMode::ThirdPerson => {
                    let ctx = FacingContext {
                        grounded: state.is_grounded,
                        ground_normal: state.ground_normal,
                        up,
                        direction: state.last_move_direction,
                        velocity: state.velocity,
                        current,
                        airborne_elapsed: state.airborne_elapsed,
                    };
                    orientation::facing_target(&ctx, &config)
                        .map(|target| orientation::turn_toward(current, target, config.turn_speed, dt))
                }
            };

            if let Some(rotation) = rotation {
                B::set_rotation(world, entity, rotation);
                state.facing = rotation;
            }
        }

        if let Some(mut slot) = world.get_mut::<CharacterState>(entity) {
            *slot = state;
        }
    }
}

/// Pose every [`LookAnchor`] from its character's look angles.
pub fn update_look_anchors(
    q_characters: Query<(&CharacterState, &LocomotionConfig, &GlobalTransform), ActiveCharacter>,
    mut q_anchors: Query<(&LookAnchor, &mut Transform)>,
) {
    for (anchor, mut transform) in &mut q_anchors {
        let Ok((state, config, global)) = q_characters.get(anchor.character) else {
            continue;
        };
        let pose = orientation::anchor_pose(
            config.policy.look_mode,
            state.look_yaw,
            state.look_pitch,
            global.translation(),
            anchor,
            config.up(),
        );
        transform.rotation = pose.rotation;
        if let Some(translation) = pose.translation {
            transform.translation = translation;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoOpBackendPlugin;
    use crate::constraint::MovementConstraint;
    use crate::CharacterBundle;

    /// Body stored in a single component, integrated by hand.
    #[derive(Component, Default)]
    struct TestBody {
        position: Vec3,
        velocity: Vec3,
        rotation: Quat,
        drag: f32,
    }

    struct TestBackend;

    impl CharacterPhysicsBackend for TestBackend {
        fn plugin() -> impl Plugin {
            NoOpBackendPlugin
        }

        fn get_velocity(world: &World, entity: Entity) -> Vec3 {
            world.get::<TestBody>(entity).map(|b| b.velocity).unwrap_or(Vec3::ZERO)
        }

        fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
            if let Some(mut body) = world.get_mut::<TestBody>(entity) {
                body.velocity = velocity;
            }
        }

        fn set_drag(world: &mut World, entity: Entity, drag: f32) {
            if let Some(mut body) = world.get_mut::<TestBody>(entity) {
                body.drag = drag;
            }
        }

        fn get_drag(world: &World, entity: Entity) -> f32 {
            world.get::<TestBody>(entity).map(|b| b.drag).unwrap_or(0.0)
        }

        fn get_position(world: &World, entity: Entity) -> Vec3 {
            world.get::<TestBody>(entity).map(|b| b.position).unwrap_or(Vec3::ZERO)
        }

        fn get_rotation(world: &World, entity: Entity) -> Quat {
            world.get::<TestBody>(entity).map(|b| b.rotation).unwrap_or(Quat::IDENTITY)
        }

        fn set_rotation(world: &mut World, entity: Entity, rotation: Quat) {
            if let Some(mut body) = world.get_mut::<TestBody>(entity) {
                body.rotation = rotation;
            }
        }

        fn validate_body(world: &World, entity: Entity) -> Result<(), ConfigError> {
            world
                .get::<TestBody>(entity)
                .map(|_| ())
                .ok_or(ConfigError::MissingComponent {
                    entity,
                    component: "TestBody",
                })
        }
    }

    fn spawn_unvalidated(world: &mut World, state: CharacterState) -> Entity {
        world
            .spawn((
                state,
                LocomotionConfig::default(),
                MovementIntent::default(),
                MovementConstraints::default(),
                TestBody {
                    rotation: Quat::IDENTITY,
                    ..default()
                },
            ))
            .id()
    }

    fn spawn_character(world: &mut World, state: CharacterState) -> Entity {
        let entity = spawn_unvalidated(world, state);
        world.entity_mut(entity).insert(ControllerReady);
        entity
    }

    fn grounded() -> CharacterState {
        CharacterState {
            is_grounded: true,
            ..default()
        }
    }

    #[test]
    fn missing_body_disables_character() {
        let mut world = World::new();
        let entity = world
            .spawn((CharacterState::default(), LocomotionConfig::default(), MovementIntent::default()))
            .id();

        validate_new_characters::<TestBackend>(&mut world);

        assert!(world.get::<ControllerDisabled>(entity).is_some());
    }

    #[test]
    fn invalid_config_disables_character() {
        let mut world = World::new();
        let mut config = LocomotionConfig::default();
        config.max_speed = -1.0;
        let entity = world
            .spawn((CharacterState::default(), config, MovementIntent::default(), TestBody::default()))
            .id();

        validate_new_characters::<TestBackend>(&mut world);

        assert!(world.get::<ControllerDisabled>(entity).is_some());
    }

    #[test]
    fn valid_character_gets_readout() {
        let mut world = World::new();
        let entity = spawn_unvalidated(&mut world, CharacterState::default());

        validate_new_characters::<TestBackend>(&mut world);

        assert!(world.get::<ControllerDisabled>(entity).is_none());
        assert!(world.get::<ControllerReady>(entity).is_some());
        assert!(world.get::<LocomotionReadout>(entity).is_some());
    }

    #[test]
    fn unvalidated_character_is_not_driven() {
        let mut world = World::new();
        let entity = spawn_unvalidated(&mut world, CharacterState::default());
        world
            .get_mut::<MovementIntent>(entity)
            .unwrap()
            .set_move_direction(Vec3::X);

        apply_gravity::<TestBackend>(&mut world);
        apply_locomotion::<TestBackend>(&mut world);
        assert_eq!(TestBackend::get_velocity(&world, entity), Vec3::ZERO);

        validate_new_characters::<TestBackend>(&mut world);
        apply_gravity::<TestBackend>(&mut world);
        apply_locomotion::<TestBackend>(&mut world);

        let velocity = TestBackend::get_velocity(&world, entity);
        assert!(velocity.x > 0.0);
        assert!(velocity.y < 0.0);
    }

    #[test]
    fn validation_runs_once_per_character() {
        let mut world = World::new();
        let entity = spawn_unvalidated(&mut world, CharacterState::default());

        validate_new_characters::<TestBackend>(&mut world);
        // A later invalid config does not disable an already validated character
        world.get_mut::<LocomotionConfig>(entity).unwrap().max_speed = -1.0;
        validate_new_characters::<TestBackend>(&mut world);

        assert!(world.get::<ControllerReady>(entity).is_some());
        assert!(world.get::<ControllerDisabled>(entity).is_none());
    }

    #[test]
    fn character_spawned_in_fixed_step_is_validated_before_driving() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(crate::CharacterControllerPlugin::<TestBackend>::default());
        app.add_systems(FixedFirst, |mut commands: Commands, mut spawned: Local<bool>| {
            if !*spawned {
                *spawned = true;
                commands.spawn((
                    CharacterBundle::default(),
                    TestBody {
                        rotation: Quat::IDENTITY,
                        ..default()
                    },
                ));
                commands.spawn(CharacterBundle::default());
            }
        });
        app.insert_resource(Time::<Fixed>::from_hz(60.0));
        app.insert_resource(bevy::time::TimeUpdateStrategy::ManualDuration(
            Duration::from_secs_f64(1.0 / 60.0),
        ));

        for _ in 0..3 {
            app.update();
        }

        let world = app.world_mut();
        let mut ready = world.query_filtered::<&TestBody, With<ControllerReady>>();
        let falling: Vec<f32> = ready.iter(world).map(|body| body.velocity.y).collect();
        assert_eq!(falling.len(), 1);
        assert!(falling[0] < 0.0);

        let mut disabled = world.query_filtered::<Entity, (With<ControllerDisabled>, Without<TestBody>)>();
        assert_eq!(disabled.iter(world).count(), 1);
    }

    #[test]
    fn grounded_jump_sets_velocity_and_starts_tracking() {
        let mut world = World::new();
        let entity = spawn_character(&mut world, grounded());
        world.get_mut::<MovementIntent>(entity).unwrap().set_jump_pressed(true);

        apply_jump::<TestBackend>(&mut world);

        let velocity = TestBackend::get_velocity(&world, entity);
        assert!((velocity.y - 6.0).abs() < 1.0e-5);
        let state = world.get::<CharacterState>(entity).unwrap();
        assert!(state.is_jumping);
        assert_eq!(state.jump_takeoff, Some(0.0));
    }

    #[test]
    fn blocked_movement_blocks_jump() {
        let mut world = World::new();
        let entity = spawn_character(&mut world, grounded());
        world
            .get_mut::<MovementConstraints>(entity)
            .unwrap()
            .push(MovementConstraint::frozen(), Duration::from_secs(1));
        world.get_mut::<MovementIntent>(entity).unwrap().set_jump_pressed(true);

        apply_jump::<TestBackend>(&mut world);

        assert_eq!(TestBackend::get_velocity(&world, entity), Vec3::ZERO);
        assert!(!world.get::<CharacterState>(entity).unwrap().is_jumping);
    }

    #[test]
    fn held_jump_does_not_refire() {
        let mut world = World::new();
        let entity = spawn_character(&mut world, grounded());
        world.get_mut::<MovementIntent>(entity).unwrap().set_jump_pressed(true);

        apply_jump::<TestBackend>(&mut world);
        TestBackend::set_velocity(&mut world, entity, Vec3::ZERO);
        world.get_mut::<CharacterState>(entity).unwrap().is_grounded = true;
        apply_jump::<TestBackend>(&mut world);

        assert_eq!(TestBackend::get_velocity(&world, entity), Vec3::ZERO);
    }

    #[test]
    fn gravity_only_while_airborne() {
        let mut world = World::new();
        let standing = spawn_character(&mut world, grounded());
        let falling = spawn_character(&mut world, CharacterState::default());

        apply_gravity::<TestBackend>(&mut world);

        assert_eq!(TestBackend::get_velocity(&world, standing), Vec3::ZERO);
        assert!(TestBackend::get_velocity(&world, falling).y < 0.0);
    }

    #[test]
    fn locomotion_accelerates_and_sets_drag() {
        let mut world = World::new();
        let entity = spawn_character(&mut world, grounded());
        world
            .get_mut::<MovementIntent>(entity)
            .unwrap()
            .set_move_direction(Vec3::X);

        apply_locomotion::<TestBackend>(&mut world);

        assert!(TestBackend::get_velocity(&world, entity).x > 0.0);
        let config = LocomotionConfig::default();
        assert_eq!(TestBackend::get_drag(&world, entity), config.air_drag);
        assert_eq!(world.get::<CharacterState>(entity).unwrap().last_move_direction, Vec3::X);
    }

    #[test]
    fn rooted_character_does_not_accelerate() {
        let mut world = World::new();
        let entity = spawn_character(&mut world, grounded());
        world
            .get_mut::<MovementConstraints>(entity)
            .unwrap()
            .push(MovementConstraint::rooted(), Duration::from_secs(1));
        world
            .get_mut::<MovementIntent>(entity)
            .unwrap()
            .set_move_direction(Vec3::X);

        apply_locomotion::<TestBackend>(&mut world);

        assert_eq!(TestBackend::get_velocity(&world, entity), Vec3::ZERO);
        assert_eq!(world.get::<CharacterState>(entity).unwrap().last_move_direction, Vec3::ZERO);
    }

    #[test]
    fn readout_reports_speeds_and_charges() {
        let mut world = World::new();
        let entity = spawn_character(&mut world, CharacterState::default());
        TestBackend::set_velocity(&mut world, entity, Vec3::new(3.0, -2.0, 4.0));

        publish_readout::<TestBackend>(&mut world);

        let readout = world.get::<LocomotionReadout>(entity).unwrap();
        assert!((readout.horizontal_speed - 5.0).abs() < 1.0e-5);
        assert_eq!(readout.vertical_speed, -2.0);
        assert_eq!(readout.air_jumps_remaining, 1);
        assert!(readout.permissions.can_move);
    }
}
