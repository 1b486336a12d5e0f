//! Movement and weapon step shared by server authority and client prediction.
//!
//! Everything here is a pure function of (state, command, delta time,
//! settings). The same code runs on both sides so a correctly predicted tick
//! produces bit-identical results.

use crate::command::PlayerCommand;
use crate::prediction::Executor;
use crate::settings::GameSettings;
use crate::tick::Tick;
use crate::world::{CommandQueue, EntityData, EntityKind, Marker, NetworkId, Transform, Weapon, World};
use glam::{EulerRot, Quat, Vec3};

/// Per-tick inputs every step function needs.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub tick: Tick,
    pub delta_time: f32,
    pub settings: &'a GameSettings,
}

impl<'a> StepContext<'a> {
    pub fn new(tick: Tick, delta_time: f32, settings: &'a GameSettings) -> Self {
        Self {
            tick,
            delta_time,
            settings,
        }
    }
}

/// A bullet the weapon decided to fire this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletSpawn {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
}

impl BulletSpawn {
    /// Builds the bullet entity, owned by `owner` and stamped with `tick`.
    pub fn into_entity(self, owner: NetworkId, tick: Tick, settings: &GameSettings) -> EntityData {
        EntityData::instantiate(EntityKind::Bullet, settings, tick)
            .with_position(self.position)
            .with_rotation(self.rotation)
            .with_velocity(self.velocity)
            .with_owner(owner)
            .with_prediction(tick)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepOutcome {
    pub bullet: Option<BulletSpawn>,
    pub self_destruct: bool,
}

/// Applies look, thrust or an absolute pose to a controlled entity.
pub fn apply_movement(
    transform: &mut Transform,
    velocity: &mut Vec3,
    command: &PlayerCommand,
    ctx: &StepContext,
) {
    if let Some(pose) = command.pose {
        transform.position = pose.position;
        transform.rotation = pose.rotation;
        return;
    }

    if command.look != glam::Vec2::ZERO {
        let (yaw, pitch, _) = transform.rotation.to_euler(EulerRot::YXZ);
        let speed = ctx.settings.look_speed.to_radians();
        let yaw = yaw + speed * command.look.x;
        let pitch = pitch - speed * command.look.y;
        transform.rotation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0);
    }

    let mut thrust = Vec3::ZERO;
    if command.is_pressed(PlayerCommand::RIGHT) {
        thrust += Vec3::X;
    }
    if command.is_pressed(PlayerCommand::LEFT) {
        thrust -= Vec3::X;
    }
    if command.is_pressed(PlayerCommand::THRUST) {
        thrust += Vec3::Z;
    }
    if command.is_pressed(PlayerCommand::REVERSE_THRUST) {
        thrust -= Vec3::Z;
    }
    if thrust != Vec3::ZERO {
        *velocity += transform.rotation * thrust * ctx.settings.player_force * ctx.delta_time;
    }
}

impl Weapon {
    /// Fire is allowed once the current tick reaches the cooldown tick.
    pub fn can_fire(&self, tick: Tick) -> bool {
        self.cooldown_tick
            .map_or(true, |cooldown| tick.is_at_or_after(cooldown))
    }
}

/// Fires the weapon if the command asks for it and the cooldown allows.
pub fn try_fire(
    weapon: &mut Weapon,
    transform: &Transform,
    velocity: Vec3,
    command: &PlayerCommand,
    ctx: &StepContext,
) -> Option<BulletSpawn> {
    if !command.is_pressed(PlayerCommand::SHOOT) || !weapon.can_fire(ctx.tick) {
        return None;
    }
    weapon.cooldown_tick = Some(ctx.tick.offset(ctx.settings.weapon_cooldown_ticks));

    let rotation = transform.rotation;
    Some(BulletSpawn {
        position: transform.position + rotation * weapon.offset,
        rotation,
        velocity: ctx.settings.bullet_velocity * (rotation * Vec3::Z) + velocity,
    })
}

/// One authoritative or predicted step of a controlled entity.
///
/// Self-destruct short-circuits: no movement and no firing that tick.
pub fn step_controlled(data: &mut EntityData, command: &PlayerCommand, ctx: &StepContext) -> StepOutcome {
    if command.is_pressed(PlayerCommand::SELF_DESTRUCT) {
        return StepOutcome {
            bullet: None,
            self_destruct: true,
        };
    }

    apply_movement(&mut data.transform, &mut data.velocity, command, ctx);

    let bullet = match data.weapon.as_mut() {
        Some(weapon) => try_fire(weapon, &data.transform, data.velocity, command, ctx),
        None => None,
    };
    StepOutcome {
        bullet,
        self_destruct: false,
    }
}

pub fn integrate(transform: &mut Transform, velocity: Vec3, delta_time: f32) {
    transform.position += velocity * delta_time;
}

/// Runs the movement and weapon step for every entity `executor` predicts.
///
/// Bullets are only recorded when `spawn_bullets` is set; a client replaying
/// a tick it already predicted once must not fire again.
pub fn simulate_controlled(
    world: &mut World,
    executor: Executor,
    ctx: &StepContext,
    spawn_bullets: bool,
) -> CommandQueue {
    world.par_for_each(|entity, data, queue| {
        if data.commands.is_none() || !executor.should_predict(data, ctx.tick) {
            return;
        }
        let (command, _found) = match data.commands.as_ref() {
            Some(history) => history.read(ctx.tick),
            None => return,
        };
        let outcome = step_controlled(data, &command, ctx);
        if outcome.self_destruct {
            queue.mark(entity, Marker::Destroy);
        }
        if let (Some(bullet), true) = (outcome.bullet, spawn_bullets) {
            let owner = data.owner.unwrap_or_default();
            queue.spawn(bullet.into_entity(owner, ctx.tick, ctx.settings));
        }
    })
}

/// Advances positions of every moving entity `executor` is responsible for.
pub fn integrate_all(world: &mut World, executor: Executor, ctx: &StepContext) {
    let dt = ctx.delta_time;
    let queue = world.par_for_each(|_, data, _| {
        let moves = match executor {
            Executor::Server => matches!(
                data.kind,
                EntityKind::Player | EntityKind::Bullet | EntityKind::Asteroid
            ),
            Executor::Client { .. } => executor.should_predict(data, ctx.tick),
        };
        if moves {
            integrate(&mut data.transform, data.velocity, dt);
        }
    });
    debug_assert!(queue.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn ctx(tick: u32, settings: &GameSettings) -> StepContext<'_> {
        StepContext::new(Tick(tick), 0.1, settings)
    }

    fn player(settings: &GameSettings) -> EntityData {
        EntityData::instantiate(EntityKind::Player, settings, Tick(1)).with_owner(1)
    }

    #[test]
    fn test_thrust_is_along_facing() {
        let settings = GameSettings::default();
        let mut data = player(&settings);
        data.transform.rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);

        let command = PlayerCommand::new(Tick(10), PlayerCommand::THRUST);
        step_controlled(&mut data, &command, &ctx(10, &settings));

        // Facing +Z rotated a quarter turn about Y points along +X.
        assert_approx_eq!(data.velocity.x, settings.player_force * 0.1, 1e-4);
        assert_approx_eq!(data.velocity.z, 0.0, 1e-4);
    }

    #[test]
    fn test_opposite_thrusts_cancel() {
        let settings = GameSettings::default();
        let mut data = player(&settings);
        let command = PlayerCommand::new(
            Tick(10),
            PlayerCommand::LEFT | PlayerCommand::RIGHT | PlayerCommand::THRUST | PlayerCommand::REVERSE_THRUST,
        );
        step_controlled(&mut data, &command, &ctx(10, &settings));
        assert_eq!(data.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_zero_look_is_noop_and_look_has_no_roll() {
        let settings = GameSettings::default();
        let mut data = player(&settings);
        let start = data.transform.rotation;

        step_controlled(&mut data, &PlayerCommand::neutral(Tick(5)), &ctx(5, &settings));
        assert_eq!(data.transform.rotation, start);

        let command = PlayerCommand::neutral(Tick(6)).with_look(10.0, 5.0);
        step_controlled(&mut data, &command, &ctx(6, &settings));
        let (yaw, pitch, roll) = data.transform.rotation.to_euler(EulerRot::YXZ);
        assert_approx_eq!(yaw, 20.0_f32.to_radians(), 1e-4);
        assert_approx_eq!(pitch, -10.0_f32.to_radians(), 1e-4);
        assert_approx_eq!(roll, 0.0, 1e-4);
    }

    #[test]
    fn test_pose_overrides_movement() {
        let settings = GameSettings::default();
        let mut data = player(&settings);
        let pose = crate::command::Pose {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_x(0.5),
        };
        let command = PlayerCommand::new(Tick(3), PlayerCommand::THRUST).with_pose(pose);
        step_controlled(&mut data, &command, &ctx(3, &settings));

        assert_eq!(data.transform.position, pose.position);
        assert_eq!(data.transform.rotation, pose.rotation);
        assert_eq!(data.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_fire_sets_cooldown_and_inherits_momentum() {
        let settings = GameSettings::default();
        let mut data = player(&settings).with_position(Vec3::new(1.0, 0.0, 0.0));
        data.velocity = Vec3::new(0.0, 2.0, 0.0);

        let command = PlayerCommand::new(Tick(103), PlayerCommand::SHOOT);
        let outcome = step_controlled(&mut data, &command, &ctx(103, &settings));

        let bullet = outcome.bullet.unwrap();
        assert_eq!(bullet.position, Vec3::new(1.0, 0.0, 1.5));
        assert_eq!(bullet.velocity, Vec3::new(0.0, 2.0, settings.bullet_velocity));
        assert_eq!(data.weapon.unwrap().cooldown_tick, Some(Tick(108)));
    }

    #[test]
    fn test_cooldown_gates_fire_until_reached() {
        let settings = GameSettings::default();
        let mut data = player(&settings);
        let shoot = |tick| PlayerCommand::new(Tick(tick), PlayerCommand::SHOOT);

        assert!(step_controlled(&mut data, &shoot(100), &ctx(100, &settings)).bullet.is_some());
        for tick in 100..105 {
            assert!(step_controlled(&mut data, &shoot(tick), &ctx(tick, &settings)).bullet.is_none());
        }
        assert!(step_controlled(&mut data, &shoot(105), &ctx(105, &settings)).bullet.is_some());
    }

    #[test]
    fn test_cooldown_across_wraparound() {
        let settings = GameSettings::default();
        let mut weapon = Weapon {
            offset: Vec3::ZERO,
            cooldown_tick: Some(Tick(u32::MAX).offset(3)),
        };
        assert!(!weapon.can_fire(Tick(u32::MAX)));
        assert!(weapon.can_fire(Tick(2)));

        weapon.cooldown_tick = Some(Tick(2));
        let transform = Transform::default();
        let command = PlayerCommand::new(Tick(2), PlayerCommand::SHOOT);
        assert!(try_fire(&mut weapon, &transform, Vec3::ZERO, &command, &ctx(2, &settings)).is_some());
    }

    #[test]
    fn test_cooldown_ending_on_tick_zero_still_gates() {
        let settings = GameSettings::default();
        let mut data = player(&settings);
        let shoot = |tick| PlayerCommand::new(Tick(tick), PlayerCommand::SHOOT);
        let fire_tick = 0u32.wrapping_sub(settings.weapon_cooldown_ticks);

        assert!(step_controlled(&mut data, &shoot(fire_tick), &ctx(fire_tick, &settings)).bullet.is_some());
        assert_eq!(data.weapon.unwrap().cooldown_tick, Some(Tick::ZERO));

        assert!(step_controlled(&mut data, &shoot(u32::MAX), &ctx(u32::MAX, &settings)).bullet.is_none());
        assert!(step_controlled(&mut data, &shoot(0), &ctx(0, &settings)).bullet.is_some());
    }

    #[test]
    fn test_self_destruct_has_no_other_effect() {
        let settings = GameSettings::default();
        let mut data = player(&settings);
        let command = PlayerCommand::new(
            Tick(7),
            PlayerCommand::SELF_DESTRUCT | PlayerCommand::SHOOT | PlayerCommand::THRUST,
        );
        let outcome = step_controlled(&mut data, &command, &ctx(7, &settings));

        assert!(outcome.self_destruct);
        assert!(outcome.bullet.is_none());
        assert_eq!(data.velocity, Vec3::ZERO);
        assert_eq!(data.weapon.unwrap().cooldown_tick, None);
    }

    #[test]
    fn test_server_simulation_reads_history_and_records_bullets() {
        let settings = GameSettings::default();
        let mut world = World::authoritative();
        let mut data = player(&settings);
        if let Some(history) = data.commands.as_mut() {
            history.write(PlayerCommand::new(Tick(20), PlayerCommand::SHOOT));
        }
        let entity = world.spawn(data);

        let mut queue = simulate_controlled(&mut world, Executor::Server, &ctx(20, &settings), true);
        let spawned = queue.playback(&mut world);
        assert_eq!(spawned.len(), 1);
        let bullet = world.get(spawned[0]).unwrap();
        assert_eq!(bullet.kind, EntityKind::Bullet);
        assert_eq!(bullet.owner, Some(1));
        assert_eq!(bullet.spawn_tick, Tick(20));

        // Missing command for tick 21 is neutral input, not an error.
        let queue = simulate_controlled(&mut world, Executor::Server, &ctx(21, &settings), true);
        assert!(queue.is_empty());
        assert!(world.contains(entity));
    }

    #[test]
    fn test_integrate_after_forces() {
        let settings = GameSettings::default();
        let mut world = World::authoritative();
        let entity = world.spawn(
            EntityData::instantiate(EntityKind::Asteroid, &settings, Tick(1))
                .with_velocity(Vec3::new(10.0, 0.0, -5.0)),
        );
        integrate_all(&mut world, Executor::Server, &ctx(2, &settings));
        let position = world.get(entity).unwrap().transform.position;
        assert_approx_eq!(position.x, 1.0, 1e-5);
        assert_approx_eq!(position.z, -0.5, 1e-5);
    }
}
