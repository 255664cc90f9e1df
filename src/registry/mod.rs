//! Connection registry - tracks every live client and routes its messages
//!
//! Each connection is in exactly one placement at a time: unassigned,
//! waiting in the matchmaking queue, or seated in a room.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::room::{RoomError, RoomId, TerminationReason};
use crate::game::{CardCatalog, PlayerInput, PlayerSlot, RoomRegistry};
use crate::matchmaking::{EnqueueOutcome, Matchmaker};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, PlayCardPayload, ServerMsg};

pub type ConnectionId = Uuid;

/// Where a connection currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Unassigned,
    Queued,
    InRoom { room_id: RoomId, slot: PlayerSlot },
}

/// A live client connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub outbound: mpsc::Sender<ServerMsg>,
    pub placement: Placement,
    pub connected_at: Instant,
}

/// Table of live connections, shared by the registry, matchmaker and rooms
#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: DashMap<ConnectionId, Connection>,
}

impl ConnectionTable {
    pub fn insert(&self, id: ConnectionId, outbound: mpsc::Sender<ServerMsg>) {
        self.connections.insert(
            id,
            Connection {
                id,
                outbound,
                placement: Placement::Unassigned,
                connected_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id).map(|(_, c)| c)
    }

    pub fn placement(&self, id: &ConnectionId) -> Option<Placement> {
        self.connections.get(id).map(|c| c.placement)
    }

    pub fn outbound(&self, id: &ConnectionId) -> Option<mpsc::Sender<ServerMsg>> {
        self.connections.get(id).map(|c| c.outbound.clone())
    }

    /// Move a connection from `from` to `to`. Fails if the connection is
    /// gone or is no longer in `from`.
    pub fn set_placement(&self, id: &ConnectionId, from: Placement, to: Placement) -> bool {
        match self.connections.get_mut(id) {
            Some(mut conn) if conn.placement == from => {
                conn.placement = to;
                true
            }
            _ => false,
        }
    }

    /// Return a connection seated in `room_id` to unassigned. A connection
    /// that has already moved on is left alone.
    pub fn release(&self, id: ConnectionId, room_id: RoomId) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut conn) => match conn.placement {
                Placement::InRoom { room_id: current, .. } if current == room_id => {
                    conn.placement = Placement::Unassigned;
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Front door for the transport layer: connect, route messages, disconnect
pub struct ConnectionRegistry {
    connections: Arc<ConnectionTable>,
    matchmaker: Arc<Matchmaker>,
    rooms: Arc<RoomRegistry>,
    outbound_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(catalog: Arc<CardCatalog>, game: GameConfig, outbound_capacity: usize) -> Self {
        let connections = Arc::new(ConnectionTable::default());
        let rooms = Arc::new(RoomRegistry::new());
        let matchmaker = Arc::new(Matchmaker::new(
            connections.clone(),
            rooms.clone(),
            catalog,
            game,
        ));

        Self {
            connections,
            matchmaker,
            rooms,
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Register a new connection. The receiver carries everything the server
    /// sends to this client, starting with a welcome message.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerMsg>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.outbound_capacity);

        let _ = tx.try_send(ServerMsg::Welcome {
            connection_id: id,
            server_time: unix_millis(),
        });
        self.connections.insert(id, tx);

        info!(connection_id = %id, connections = self.connections.len(), "Connection registered");
        (id, rx)
    }

    /// Route one decoded client message
    pub fn handle_message(&self, id: ConnectionId, msg: ClientMsg) {
        match msg {
            ClientMsg::FindGame => match self.matchmaker.enqueue(id) {
                EnqueueOutcome::Queued => debug!(connection_id = %id, "Waiting for opponent"),
                EnqueueOutcome::Paired(room_id) => {
                    debug!(connection_id = %id, room_id = %room_id, "Paired")
                }
                EnqueueOutcome::Ignored => {
                    debug!(connection_id = %id, "find_game ignored, not unassigned")
                }
            },
            ClientMsg::LeaveQueue => {
                if !self.matchmaker.leave(id) {
                    debug!(connection_id = %id, "leave_queue ignored, not queued");
                }
            }
            ClientMsg::PlayCard { payload } => self.play_card(id, payload),
            ClientMsg::Ping { t } => self.send(id, ServerMsg::Pong { t }),
            ClientMsg::Unknown => debug!(connection_id = %id, "Ignoring unknown message type"),
        }
    }

    fn play_card(&self, id: ConnectionId, payload: PlayCardPayload) {
        let Some(Placement::InRoom { room_id, slot }) = self.connections.placement(&id) else {
            debug!(connection_id = %id, "play_card outside of a room, ignoring");
            return;
        };
        let Some(room) = self.rooms.get(&room_id) else {
            debug!(connection_id = %id, room_id = %room_id, "play_card for a closed room");
            return;
        };

        let input = PlayerInput {
            slot,
            card_id: payload.card_id,
            placement: payload.placement,
            received_at: unix_millis(),
        };
        match room.submit_input(input) {
            Ok(()) => {}
            Err(RoomError::InputQueueFull(_)) => {
                warn!(connection_id = %id, room_id = %room_id, "Input queue full, play dropped")
            }
            Err(e @ RoomError::Terminated(_)) => {
                debug!(connection_id = %id, error = %e, "play_card rejected")
            }
        }
    }

    fn send(&self, id: ConnectionId, msg: ServerMsg) {
        let Some(outbound) = self.connections.outbound(&id) else {
            return;
        };
        if let Err(TrySendError::Full(_)) = outbound.try_send(msg) {
            warn!(connection_id = %id, "Outbound queue full, reply dropped");
        }
    }

    /// Forget a connection. A queued connection leaves the queue; a seated one
    /// ends its room with the opponent as winner.
    pub fn disconnect(&self, id: ConnectionId) {
        let Some(conn) = self.matchmaker.remove_connection(id) else {
            return;
        };

        if let Placement::InRoom { room_id, slot } = conn.placement {
            if let Some(room) = self.rooms.get(&room_id) {
                room.terminate(TerminationReason::Disconnected(slot));
            }
        }

        info!(
            connection_id = %id,
            placement = ?conn.placement,
            session_secs = conn.connected_at.elapsed().as_secs(),
            "Connection removed"
        );
    }

    pub fn placement(&self, id: &ConnectionId) -> Option<Placement> {
        self.connections.placement(id)
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn matchmaker(&self) -> &Arc<Matchmaker> {
        &self.matchmaker
    }

    /// Stop every room; returns how many were still running
    pub fn shutdown(&self) -> usize {
        self.rooms.shutdown_all()
    }
}
