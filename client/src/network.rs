//! Client network layer: UDP socket, handshake and the fixed-rate frame loop

use crate::game::ClientGame;
use crate::input::InputManager;
use log::{debug, error, info, warn};
use shared::{decode, encode, CodecError, Packet, MAX_PACKET_SIZE};
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};

/// Frame rate used until the server's configuration arrives.
const DEFAULT_TICK_RATE: u32 = 60;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server address {addr}: {source}")]
    Address {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    game: ClientGame,
    input_manager: InputManager,
    fake_ping_ms: u64,
    tick_rate: u32,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        name: &str,
        lead_ticks: u32,
        fake_ping_ms: u64,
    ) -> Result<Self, ClientError> {
        let server_addr = server_addr.parse().map_err(|source| ClientError::Address {
            addr: server_addr.to_string(),
            source,
        })?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;

        Ok(Client {
            socket,
            server_addr,
            game: ClientGame::new(name, lead_ticks),
            input_manager: InputManager::new(),
            fake_ping_ms,
            tick_rate: DEFAULT_TICK_RATE,
        })
    }

    pub fn game(&self) -> &ClientGame {
        &self.game
    }

    async fn connect(&mut self) -> Result<(), ClientError> {
        info!("Connecting to server at {}...", self.server_addr);
        self.send_packet(&ClientGame::connect_packet()).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = encode(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn send_all(&self, packets: Vec<Packet>) {
        for packet in packets {
            if let Err(e) = self.send_packet(&packet).await {
                error!("Error sending {:?}: {}", packet, e);
            }
        }
    }

    fn frame_interval(tick_rate: u32) -> Interval {
        let mut frames = interval(Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        frames
    }

    /// Runs until the server disconnects us or Ctrl-C is pressed.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        self.connect().await?;

        let mut frames = Self::frame_interval(self.tick_rate);
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        let mut was_connected = false;

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) if addr == self.server_addr => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match decode(&buffer[..len]) {
                                Ok(packet) => {
                                    let replies = self.game.handle_packet(packet);
                                    self.send_all(replies).await;
                                }
                                Err(e) => warn!("Malformed packet from server: {}", e),
                            }

                            if self.game.network_id().is_some() {
                                was_connected = true;
                            } else if was_connected {
                                break;
                            }
                        }
                        Ok((_, addr)) => debug!("Ignoring packet from {}", addr),
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = frames.tick() => {
                    if let Some(settings) = self.game.settings() {
                        if settings.tick_rate != self.tick_rate {
                            self.tick_rate = settings.tick_rate;
                            info!("Stepping at {}Hz", self.tick_rate);
                            frames = Self::frame_interval(self.tick_rate);
                        }
                    }

                    let action = self.input_manager.update(self.game.target().is_some());
                    let packets = self.game.advance(action);
                    self.send_all(packets).await;
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
            }
        }

        if self.game.network_id().is_some() {
            if let Err(e) = self.send_packet(&Packet::Disconnect).await {
                warn!("Failed to send disconnect: {}", e);
            }
        }

        Ok(())
    }
}
