//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.

use bevy::prelude::*;
use bevy_rapier3d::geometry::Group;
use bevy_rapier3d::parry::query as parry_query;
use bevy_rapier3d::parry::shape::Ball;
use bevy_rapier3d::prelude::*;
use bevy_rapier3d::rapier::math::{Isometry, Real};

use crate::backend::{CharacterPhysicsBackend, SceneQuery};
use crate::collision::{Contact, RayHit};
use crate::config::{ConfigError, LocomotionConfig};
use crate::sensor::{self, GroundProbe, GroundReading};
use crate::state::{ActiveCharacter, CharacterState};
use crate::LocomotionSet;

/// Rapier3D physics backend for the locomotion controller.
///
/// Body state goes through `Velocity`, `Damping` and `Transform`. Ground
/// sensing is handled by a dedicated Rapier system that receives the
/// `RapierContext` as a system parameter.
pub struct Rapier3dBackend;

impl CharacterPhysicsBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn set_drag(world: &mut World, entity: Entity, drag: f32) {
        if let Some(mut damping) = world.get_mut::<Damping>(entity) {
            if damping.linear_damping != drag {
                damping.linear_damping = drag;
            }
        }
    }

    fn get_drag(world: &World, entity: Entity) -> f32 {
        world
            .get::<Damping>(entity)
            .map(|d| d.linear_damping)
            .unwrap_or(0.0)
    }

    fn get_position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
            .or_else(|| world.get::<GlobalTransform>(entity).map(|t| t.translation()))
            .unwrap_or(Vec3::ZERO)
    }

    fn get_rotation(world: &World, entity: Entity) -> Quat {
        world
            .get::<Transform>(entity)
            .map(|t| t.rotation)
            .or_else(|| {
                world.get::<GlobalTransform>(entity).map(|t| {
                    let (_, rotation, _) = t.to_scale_rotation_translation();
                    rotation
                })
            })
            .unwrap_or(Quat::IDENTITY)
    }

    fn set_rotation(world: &mut World, entity: Entity, rotation: Quat) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.rotation = rotation;
        }
    }

    fn validate_body(world: &World, entity: Entity) -> Result<(), ConfigError> {
        let body = world
            .get::<RigidBody>(entity)
            .ok_or(ConfigError::MissingComponent {
                entity,
                component: "RigidBody",
            })?;
        if *body != RigidBody::Dynamic {
            return Err(ConfigError::InvalidBody {
                entity,
                reason: format!("expected a dynamic rigid body, found {body:?}"),
            });
        }

        if world.get::<Velocity>(entity).is_none() {
            return Err(ConfigError::MissingComponent {
                entity,
                component: "Velocity",
            });
        }
        if world.get::<Damping>(entity).is_none() {
            return Err(ConfigError::MissingComponent {
                entity,
                component: "Damping",
            });
        }

        let collider = world
            .get::<Collider>(entity)
            .ok_or(ConfigError::MissingComponent {
                entity,
                component: "Collider",
            })?;
        if capsule_dimensions(collider).is_none() {
            return Err(ConfigError::InvalidBody {
                entity,
                reason: "collider must be a capsule or a ball".to_string(),
            });
        }

        if world.get::<GravityScale>(entity).is_none_or(|g| g.0 != 0.0) {
            warn!("Character {entity} still receives engine gravity; add GravityScale(0.0)");
        }
        if world
            .get::<LockedAxes>(entity)
            .is_none_or(|axes| !axes.contains(LockedAxes::ROTATION_LOCKED))
        {
            warn!("Character {entity} can be tipped over by contacts; lock its rotation axes");
        }

        Ok(())
    }
}

/// Plugin that sets up Rapier3D-specific systems for the locomotion controller.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            rapier_ground_sensing.in_set(LocomotionSet::Sensors),
        );
    }
}

/// Local segment end points and radius of a capsule or ball collider.
///
/// A ball is a capsule whose end points both sit at its centre.
pub fn capsule_segment(collider: &Collider) -> Option<(Vec3, Vec3, f32)> {
    if let Some(capsule) = collider.as_capsule() {
        let segment = capsule.segment();
        Some((segment.a(), segment.b(), capsule.radius()))
    } else {
        collider
            .as_ball()
            .map(|ball| (Vec3::ZERO, Vec3::ZERO, ball.radius()))
    }
}

/// Half segment length and radius of a capsule or ball collider.
///
/// The segment is measured between the hemisphere centres, so the capsule
/// may be oriented along any local axis.
pub fn capsule_dimensions(collider: &Collider) -> Option<(f32, f32)> {
    capsule_segment(collider).map(|(a, b, radius)| ((a - b).length() / 2.0, radius))
}

fn isometry(translation: Vec3, rotation: Quat) -> Isometry<Real> {
    Isometry::from_parts(translation.into(), rotation.into())
}

/// [`SceneQuery`] over a Rapier context, excluding one rigid body.
pub struct RapierSceneQuery<'a, 'w, 's> {
    context: &'a RapierContext<'a>,
    colliders: &'a Query<'w, 's, (&'static Collider, &'static GlobalTransform)>,
    exclude: Entity,
}

impl<'a, 'w, 's> RapierSceneQuery<'a, 'w, 's> {
    pub fn new(
        context: &'a RapierContext<'a>,
        colliders: &'a Query<'w, 's, (&'static Collider, &'static GlobalTransform)>,
        exclude: Entity,
    ) -> Self {
        Self {
            context,
            colliders,
            exclude,
        }
    }

    fn filter(&self, mask: u32) -> QueryFilter<'static> {
        QueryFilter::default()
            .exclude_rigid_body(self.exclude)
            .exclude_sensors()
            .groups(CollisionGroups::new(Group::ALL, Group::from_bits_truncate(mask)))
    }
}

impl SceneQuery for RapierSceneQuery<'_, '_, '_> {
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: u32) -> Vec<Contact> {
        let mut hits = Vec::new();
        self.context.intersections_with_shape(
            center,
            Quat::IDENTITY,
            &Collider::ball(radius),
            self.filter(mask),
            |entity| {
                hits.push(entity);
                true
            },
        );

        // Intersections only report entities, the normal comes from a contact query
        let sphere_iso = isometry(center, Quat::IDENTITY);
        let sphere = Ball::new(radius);

        hits.into_iter()
            .filter_map(|entity| {
                let (collider, transform) = self.colliders.get(entity).ok()?;
                let (_, rotation, translation) = transform.to_scale_rotation_translation();
                let iso = isometry(translation, rotation);
                let contact = parry_query::contact(&iso, &*collider.raw, &sphere_iso, &sphere, 0.0)
                    .ok()
                    .flatten()?;
                let normal: Vec3 = contact.normal1.into_inner().into();
                Some(Contact::new(normal, (-contact.dist).max(0.0)))
            })
            .collect()
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: u32,
    ) -> Option<RayHit> {
        self.context
            .cast_ray_and_get_normal(origin, direction, max_distance, true, self.filter(mask))
            .map(|(_, hit)| RayHit::new(hit.time_of_impact, hit.normal, hit.point))
    }
}

/// Sense the ground under every character.
///
/// The overlap sphere hangs below the lowest end of the capsule segment in
/// world space. Up is derived from the configured gravity, never from the
/// body rotation.
fn rapier_ground_sensing(
    rapier_context: ReadRapierContext,
    time: Res<Time<Fixed>>,
    q_colliders: Query<(&'static Collider, &'static GlobalTransform)>,
    mut q_characters: Query<
        (
            Entity,
            &Transform,
            &Collider,
            &LocomotionConfig,
            &mut CharacterState,
        ),
        ActiveCharacter,
    >,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };
    let now = time.elapsed();

    for (entity, transform, collider, config, mut state) in &mut q_characters {
        let Some((a, b, radius)) = capsule_segment(collider) else {
            continue;
        };
        let up = config.up();

        let reading = if state.ground_check_suppressed(now) {
            GroundReading::airborne(state.ground_normal)
        } else {
            let sphere = GroundProbe::from_segment(
                transform.transform_point(a),
                transform.transform_point(b),
                up,
                radius,
                config,
            );
            let scene = RapierSceneQuery::new(&context, &q_colliders, entity);
            sensor::sense_ground(
                &scene,
                &sphere,
                state.last_move_direction,
                state.ground_normal,
                up,
                config,
            )
        };

        trace!(
            "Character {entity} ground: grounded={} contacts={} normal={:?}",
            reading.grounded,
            reading.contact_count,
            reading.normal
        );

        if sensor::apply_reading(&mut state, reading, now) {
            debug!("Character {entity} landed");
        }
    }
}

/// Bundle of Rapier components needed by a character.
///
/// Rotation is locked so contacts never tip the capsule over. Engine gravity
/// and contact friction are disabled, the controller applies gravity and drag
/// itself.
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    pub damping: Damping,
    pub locked_axes: LockedAxes,
    pub gravity_scale: GravityScale,
    pub friction: Friction,
}

impl Default for Rapier3dCharacterBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Rapier3dCharacterBundle {
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            damping: Damping::default(),
            locked_axes: LockedAxes::ROTATION_LOCKED,
            gravity_scale: GravityScale(0.0),
            friction: Friction {
                coefficient: 0.0,
                combine_rule: CoefficientCombineRule::Min,
            },
        }
    }

    /// Start with the given linear velocity.
    pub fn with_velocity(mut self, linvel: Vec3) -> Self {
        self.velocity = Velocity::linear(linvel);
        self
    }

    /// Start with the given linear damping.
    pub fn with_damping(mut self, linear_damping: f32) -> Self {
        self.damping.linear_damping = linear_damping;
        self
    }
}
