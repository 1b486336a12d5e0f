//! Integration tests for the server, client and shared protocol together
//!
//! Most tests drive an authoritative `ServerGame` and one or more `ClientGame`s
//! in lockstep, passing every packet through the wire codec but no sockets.

use assert_approx_eq::assert_approx_eq;
use client::game::ClientGame;
use client::input::InputAction;
use glam::Vec3;
use server::game::ServerGame;
use shared::{
    decode, encode, EntityKind, GameSettings, NetworkId, Packet, PlayerCommand, Tick, TickClock,
};

const LEAD_TICKS: u32 = 3;

fn quiet_settings() -> GameSettings {
    GameSettings {
        num_asteroids: 0,
        ..GameSettings::default()
    }
}

fn over_the_wire(packet: Packet) -> Packet {
    decode(&encode(&packet).unwrap()).unwrap()
}

fn command(buttons: u8) -> InputAction {
    InputAction::Command(PlayerCommand::new(Tick::ZERO, buttons))
}

/// A server and its clients, stepped one frame at a time.
struct Session {
    server: ServerGame,
    clients: Vec<ClientGame>,
}

impl Session {
    fn new(settings: GameSettings, names: &[&str]) -> Self {
        let mut server = ServerGame::with_seed(settings, TickClock::new(settings.tick_rate), 7);
        let mut clients = Vec::new();
        for (index, name) in names.iter().enumerate() {
            let network_id = index as NetworkId + 1;
            assert!(server.connect(network_id));
            let mut client = ClientGame::new(*name, LEAD_TICKS);
            client.handle_packet(over_the_wire(Packet::Connected { network_id }));
            clients.push(client);
        }
        Self { server, clients }
    }

    fn client(&self, network_id: NetworkId) -> &ClientGame {
        &self.clients[network_id as usize - 1]
    }

    fn send_to_server(&mut self, network_id: NetworkId, packets: Vec<Packet>) {
        for packet in packets {
            self.server.receive(network_id, over_the_wire(packet));
        }
    }

    /// One server tick followed by one client frame per client.
    fn step(&mut self, actions: &[InputAction]) {
        for (network_id, packet) in self.server.tick() {
            let replies = self.clients[network_id as usize - 1].handle_packet(over_the_wire(packet));
            self.send_to_server(network_id, replies);
        }
        for index in 0..self.clients.len() {
            let action = actions.get(index).copied().unwrap_or(InputAction::Idle);
            let packets = self.clients[index].advance(action);
            self.send_to_server(index as NetworkId + 1, packets);
        }
    }

    fn step_idle(&mut self, frames: usize) {
        for _ in 0..frames {
            self.step(&[]);
        }
    }

    /// Loads every client and spawns a ship for each.
    fn join_all(&mut self) {
        let spawn = vec![InputAction::SpawnRequest; self.clients.len()];
        for _ in 0..10 {
            if self.clients.iter().all(|client| client.target().is_some()) {
                return;
            }
            self.step(&spawn);
        }
        panic!("clients never took control of a ship");
    }

    fn server_target(&self, network_id: NetworkId) -> Option<shared::Entity> {
        self.server.connections().get(network_id)?.target
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;
    use server::network::Server;
    use shared::MAX_PACKET_SIZE;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    /// Tests the handshake against a real server over UDP
    #[tokio::test]
    async fn handshake_over_udp() {
        let mut server = Server::new("127.0.0.1:0", GameSettings::default(), 4)
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(&encode(&ClientGame::connect_packet()).unwrap(), server_addr)
            .await
            .unwrap();

        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            decode(&buffer[..len]).unwrap(),
            Packet::Connected { network_id: 1 }
        );

        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            decode(&buffer[..len]).unwrap(),
            Packet::ServerGameConfig(_)
        ));
    }

    /// Tests that a malformed server address is reported, not panicked on
    #[test]
    fn client_rejects_bad_address() {
        let result = tokio_test::block_on(client::network::Client::new("localhost", "alpha", 3, 0));
        assert!(matches!(
            result,
            Err(client::network::ClientError::Address { .. })
        ));
    }

    /// Tests that loading and naming happen in order after the config
    #[test]
    fn client_loads_after_config() {
        let mut session = Session::new(quiet_settings(), &["alpha"]);
        session.step_idle(2);

        let client = session.client(1);
        assert!(client.in_game());
        assert!(client.last_snapshot_tick().is_some());
        assert!(session.server.connections().get(1).unwrap().in_game);

        // The name arrived with the load, so a score record exists and replicates.
        let records = client
            .world()
            .iter()
            .filter_map(|(_, data)| data.score.clone())
            .collect::<Vec<_>>();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "alpha");
        assert_eq!(records[0].network_id, 1);
    }
}

/// SPAWN AND CLASSIFICATION TESTS
mod spawn_tests {
    use super::*;
    use shared::Marker;

    /// Tests that a spawn request ends with the client controlling its ship
    #[test]
    fn spawn_request_gives_control() {
        let mut session = Session::new(quiet_settings(), &["alpha"]);
        session.join_all();

        let client = session.client(1);
        let target = client.target().unwrap();
        let data = client.world().get(target).unwrap();
        assert!(data.is(EntityKind::Player));
        assert!(data.has(Marker::Classified));
        assert_eq!(data.owner, Some(1));

        let camera = client.camera().unwrap();
        assert_eq!(client.world().get(camera).unwrap().parent, Some(target));

        let server_target = session.server_target(1).unwrap();
        let server_data = session.server.world().get(server_target).unwrap();
        assert!(!server_data.has(Marker::SpawnInProgress));
        assert_eq!(server_data.ghost_id, data.ghost_id);
    }

    /// Tests that repeated spawn requests produce exactly one ship
    #[test]
    fn duplicate_spawn_requests_are_idempotent() {
        let mut session = Session::new(quiet_settings(), &["alpha"]);
        session.step_idle(2);

        for _ in 0..3 {
            session.server.receive(1, Packet::PlayerSpawnRequest);
        }
        session.step_idle(1);
        session.server.receive(1, Packet::PlayerSpawnRequest);
        session.step_idle(1);

        assert_eq!(session.server.world().count(|data| data.is(EntityKind::Player)), 1);
        assert_eq!(session.client(1).world().count(|data| data.is(EntityKind::Player)), 1);
    }

    /// Tests that a disconnect during spawning leaves no orphaned ship
    #[test]
    fn disconnect_mid_spawn_destroys_orphan() {
        let mut session = Session::new(quiet_settings(), &["alpha"]);
        session.step_idle(2);

        session.server.receive(1, Packet::PlayerSpawnRequest);
        session.server.receive(1, Packet::Disconnect);
        session.server.tick();

        assert_eq!(session.server.world().count(|data| data.is(EntityKind::Player)), 0);
        assert!(session.server.connections().get(1).is_none());
    }

    /// Tests respawning after the controlled ship is destroyed
    #[test]
    fn respawn_after_self_destruct() {
        let mut session = Session::new(quiet_settings(), &["alpha"]);
        session.join_all();
        let first_ship = session.client(1).target().unwrap();

        session.step(&[command(PlayerCommand::SELF_DESTRUCT)]);
        for _ in 0..(LEAD_TICKS as usize + 5) {
            if session.client(1).target().is_none() {
                break;
            }
            session.step_idle(1);
        }
        assert_eq!(session.client(1).target(), None);
        assert_eq!(session.client(1).camera(), None);
        assert_eq!(session.server_target(1), None);
        assert_eq!(session.server.world().count(|data| data.is(EntityKind::Player)), 0);

        session.join_all();
        let second_ship = session.client(1).target().unwrap();
        assert_ne!(first_ship, second_ship);
        assert_eq!(session.server.world().count(|data| data.is(EntityKind::Player)), 1);
        assert_eq!(
            session.client(1).world().count(|data| data.is(EntityKind::Camera)),
            1
        );
    }
}

/// PREDICTION AND RECONCILIATION TESTS
mod prediction_tests {
    use super::*;

    /// Tests that the client's predicted ship lands where the server puts it
    #[test]
    fn prediction_matches_authority() {
        let mut session = Session::new(quiet_settings(), &["alpha"]);
        session.join_all();

        let thrust = command(PlayerCommand::THRUST | PlayerCommand::LEFT);
        for _ in 0..10 {
            session.step(&[thrust]);
        }

        let client = session.client(1);
        let predicted_tick = client.predicted_tick().unwrap();
        let predicted = client
            .world()
            .get(client.target().unwrap())
            .unwrap()
            .transform
            .position;
        assert!(predicted_tick.is_newer_than(session.server.tick_number()));

        while predicted_tick.is_newer_than(session.server.tick_number()) {
            session.step(&[thrust]);
        }
        assert_eq!(session.server.tick_number(), predicted_tick);

        let authoritative = session
            .server
            .world()
            .get(session.server_target(1).unwrap())
            .unwrap()
            .transform
            .position;
        assert_approx_eq!(predicted.x, authoritative.x, 1e-4);
        assert_approx_eq!(predicted.y, authoritative.y, 1e-4);
        assert_approx_eq!(predicted.z, authoritative.z, 1e-4);
        assert!(authoritative.length() > 0.0);
    }

    /// Tests that commands are acknowledged once the server has used them
    #[test]
    fn commands_are_acknowledged() {
        let mut session = Session::new(quiet_settings(), &["alpha"]);
        session.join_all();
        for _ in 0..(LEAD_TICKS as usize + 2) {
            session.step(&[command(PlayerCommand::THRUST)]);
        }

        let client = session.client(1);
        let acked = client.acked_command_tick().unwrap();
        assert!(client.last_snapshot_tick().unwrap().is_at_or_after(acked));
    }

    /// Tests that a locally fired bullet is matched to the server's bullet
    #[test]
    fn predicted_bullet_is_confirmed() {
        let mut session = Session::new(quiet_settings(), &["alpha"]);
        session.join_all();

        session.step(&[command(PlayerCommand::SHOOT)]);
        assert_eq!(session.client(1).predicted_spawns().len(), 1);
        let placeholder = session.client(1).predicted_spawns()[0].entity;

        session.step_idle(LEAD_TICKS as usize + 2);

        let client = session.client(1);
        assert!(client.predicted_spawns().is_empty());
        assert_eq!(client.world().count(|data| data.is(EntityKind::Bullet)), 1);
        let bullet = client.world().get(placeholder).unwrap();
        assert!(bullet.ghost_id.is_some());
        assert_eq!(client.ghost(bullet.ghost_id.unwrap()), Some(placeholder));
        assert_eq!(session.server.world().count(|data| data.is(EntityKind::Bullet)), 1);
    }
}

/// SCORE AND RELEVANCE TESTS
mod replication_tests {
    use super::*;
    use shared::RelevancyMode;

    /// Tests a bullet from one player striking another
    #[test]
    fn hit_on_other_player_scores_ten() {
        let mut session = Session::new(quiet_settings(), &["alpha", "bravo"]);
        session.join_all();

        let shooter = session.server_target(1).unwrap();
        let victim = session.server_target(2).unwrap();
        let muzzle = session.server.world().get(shooter).unwrap().transform.position;
        session.server.world_mut().get_mut(victim).unwrap().transform.position =
            muzzle + Vec3::new(0.0, 0.0, 5.0);

        session.step(&[command(PlayerCommand::SHOOT)]);
        for _ in 0..30 {
            if session.server_target(2).is_none() {
                break;
            }
            session.step_idle(1);
        }
        assert_eq!(session.server_target(2), None);
        session.step_idle(1);

        let client = session.client(1);
        let score_of = |network_id: NetworkId| {
            client
                .world()
                .iter()
                .filter_map(|(_, data)| data.score.clone())
                .find(|score| score.network_id == network_id)
                .unwrap()
        };
        assert_eq!(score_of(1).current_score, 10);
        assert_eq!(score_of(1).high_score, 10);
        assert_eq!(score_of(2).current_score, 0);

        let highest = client
            .world()
            .iter()
            .find_map(|(_, data)| data.highest_score.clone())
            .unwrap();
        assert_eq!(highest.name, "alpha");
        assert_eq!(highest.value, 10);
        assert_eq!(session.client(2).target(), None);
    }

    /// Tests that distant ships are filtered but scores always replicate
    #[test]
    fn relevance_filters_distant_players_only() {
        let settings = GameSettings {
            relevancy_radius: 5.0,
            relevancy_mode: RelevancyMode::SetIsIrrelevant,
            ..quiet_settings()
        };
        let mut session = Session::new(settings, &["alpha", "bravo"]);
        session.join_all();

        let far = session.server_target(2).unwrap();
        session.server.world_mut().get_mut(far).unwrap().transform.position =
            Vec3::new(30.0, 30.0, 30.0);
        session.step_idle(2);

        let client = session.client(1);
        assert_eq!(client.world().count(|data| data.is(EntityKind::Player)), 1);
        assert_eq!(
            client.world().get(client.target().unwrap()).unwrap().owner,
            Some(1)
        );
        assert_eq!(client.world().count(|data| data.is(EntityKind::PlayerScore)), 2);
        assert_eq!(client.world().count(|data| data.is(EntityKind::HighestScore)), 1);
    }

    /// Tests that the asteroid field only lives while someone is connected
    #[test]
    fn asteroid_field_follows_connections() {
        let settings = GameSettings {
            num_asteroids: 12,
            asteroid_velocity: 0.0,
            relevancy_radius: 0.0,
            ..GameSettings::default()
        };
        let mut session = Session::new(settings, &["alpha"]);
        session.step_idle(3);

        assert_eq!(session.server.world().count(|data| data.is(EntityKind::Asteroid)), 12);
        assert_eq!(session.client(1).world().count(|data| data.is(EntityKind::Asteroid)), 12);

        session.server.disconnect(1);
        session.server.tick();
        session.server.tick();
        assert_eq!(session.server.world().count(|data| data.is(EntityKind::Asteroid)), 0);
    }
}

/// AUTHORITATIVE TIMING TESTS
mod timing_tests {
    use super::*;
    use shared::{Entity, Marker};

    /// A server whose clock has just passed `start`, with one ship under control
    fn server_with_ship(start: u32, clock: TickClock) -> (ServerGame, Entity) {
        let mut clock = clock;
        clock.set(Tick(start - 1));
        let mut server = ServerGame::with_seed(quiet_settings(), clock, 13);
        server.connect(1);
        server.receive(1, Packet::ClientGameLoaded);
        server.receive(1, Packet::PlayerSpawnRequest);
        server.tick();
        assert_eq!(server.tick_number(), Tick(start));

        let ship = server
            .connections()
            .get(1)
            .and_then(|identity| identity.target)
            .expect("ship under control");
        (server, ship)
    }

    fn bullets(server: &ServerGame) -> Vec<Tick> {
        let mut spawn_ticks: Vec<Tick> = server
            .world()
            .iter()
            .filter(|(_, data)| data.is(EntityKind::Bullet))
            .map(|(_, data)| data.spawn_tick)
            .collect();
        spawn_ticks.sort_by_key(|tick| tick.0);
        spawn_ticks
    }

    /// Tests that a single shoot command fires once and arms the cooldown
    #[test]
    fn single_shot_sets_cooldown() {
        let (mut server, ship) = server_with_ship(90, TickClock::new(60));

        let commands = (100..=105)
            .map(|tick| {
                let buttons = if tick == 103 { PlayerCommand::SHOOT } else { 0 };
                PlayerCommand::new(Tick(tick), buttons)
            })
            .collect();
        server.receive(1, Packet::Commands { commands });

        while server.tick_number() != Tick(105) {
            server.tick();
            if server.tick_number().0 < 103 {
                assert!(bullets(&server).is_empty());
            }
        }
        assert_eq!(bullets(&server), vec![Tick(103)]);
        let weapon = server.world().get(ship).unwrap().weapon.unwrap();
        assert_eq!(weapon.cooldown_tick, Some(Tick(108)));

        let commands = (106..=108)
            .map(|tick| PlayerCommand::new(Tick(tick), PlayerCommand::SHOOT))
            .collect();
        server.receive(1, Packet::Commands { commands });
        server.tick();
        server.tick();
        assert_eq!(bullets(&server).len(), 1);

        server.tick();
        assert_eq!(bullets(&server), vec![Tick(103), Tick(108)]);
    }

    /// Tests that a bullet is removed in the same tick it outlives its max age
    #[test]
    fn expired_bullet_removed_same_tick() {
        let (mut server, _) = server_with_ship(49, TickClock::with_delta_time(0.1));
        server.receive(
            1,
            Packet::Commands {
                commands: vec![PlayerCommand::new(Tick(50), PlayerCommand::SHOOT)],
            },
        );

        let max_age = server.settings().bullet_max_age;
        let mut removed_at = None;
        for _ in 0..40 {
            server.tick();
            let bullet = server
                .world()
                .iter()
                .find(|(_, data)| data.is(EntityKind::Bullet))
                .map(|(_, data)| data);
            match bullet {
                Some(data) => {
                    assert_eq!(data.spawn_tick, Tick(50));
                    assert!(!data.has(Marker::Destroy));
                    assert!(data.bullet_age.unwrap().age <= max_age);
                }
                None if server.tick_number().0 > 50 => {
                    removed_at = Some(server.tick_number());
                    break;
                }
                None => {}
            }
        }

        let removed_at = removed_at.expect("bullet never expired");
        assert!((79..=80).contains(&removed_at.0), "removed at {}", removed_at);
        assert_eq!(server.last_destruction().bullets, 1);
    }
}
