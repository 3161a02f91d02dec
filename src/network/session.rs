//! Simulation Session
//!
//! Owns the world and one actor per entity, and drives the fixed-rate tick:
//!
//! 1. Lock every actor and collect its motion state
//! 2. Resolve move requests (`step_to`)
//! 3. Store the mutated motion states back
//! 4. Run the input, broad and narrow phases
//! 5. Remove entities that left the world
//! 6. Advance the clock and publish the snapshot, which unlocks the actors
//!
//! Players join and leave between ticks, through `SessionHandle` or a
//! controller's `disconnect`.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::core::coord::{Bounds, Cell, Direction};
use crate::core::hash::StateHash;
use crate::core::time::{Clock, WorldTime};
use crate::game::motion::MotionInfo;
use crate::game::phase::EntityCollision;
use crate::game::quad::QuadError;
use crate::game::state::{EntityId, EntityState, WorldState};
use crate::game::terrain::TerrainMap;
use crate::game::tick::{step_to, TickError};
use crate::game::world::World;
use crate::network::actor::{spawn_player, ActorError, LeaveRequest, PlayerController, PlayerHandle, PlayerMux};
use crate::network::protocol::{ErrorCode, ServerMessage};

// =============================================================================
// CONFIG
// =============================================================================

/// Configuration for a simulation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Ticks per second.
    pub fps: u32,
    /// The world spans `[-half_extent, half_extent)` on both axes.
    pub half_extent: i32,
    /// Quad-tree leaf split threshold.
    pub quad_threshold: usize,
    /// Cells visible around each entity.
    pub view_radius: i32,
    /// Ticks per cell for players that don't set a speed.
    pub default_speed: WorldTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps: 40,
            half_extent: 64,
            quad_threshold: 8,
            view_radius: 13,
            default_speed: 20,
        }
    }
}

impl SessionConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable variables keep their default.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            fps: parse_var(&lookup, "TILESIM_FPS")
                .filter(|&fps: &u32| fps > 0)
                .unwrap_or(defaults.fps),
            half_extent: parse_var(&lookup, "TILESIM_HALF_EXTENT")
                .filter(|&h: &i32| h > 0)
                .unwrap_or(defaults.half_extent),
            quad_threshold: parse_var(&lookup, "TILESIM_QUAD_THRESHOLD")
                .filter(|&t: &usize| t > 0)
                .unwrap_or(defaults.quad_threshold),
            view_radius: parse_var(&lookup, "TILESIM_VIEW_RADIUS")
                .filter(|&r: &i32| r >= 0)
                .unwrap_or(defaults.view_radius),
            default_speed: parse_var(&lookup, "TILESIM_DEFAULT_SPEED")
                .filter(|&s: &WorldTime| s > 0)
                .unwrap_or(defaults.default_speed),
        }
    }

    /// World bounds.
    pub fn bounds(&self) -> Bounds {
        let h = self.half_extent;
        Bounds::new(Cell::new(-h, h - 1), Cell::new(h - 1, -h))
    }

    /// Wall-clock duration of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.fps.max(1) as u64)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

// =============================================================================
// ERRORS
// =============================================================================

/// Session faults.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Spatial index fault (bad config or spawn outside the world).
    #[error("spatial index: {0}")]
    Quad(#[from] QuadError),

    /// Invariant fault while resolving motion.
    #[error("tick: {0}")]
    Tick(#[from] TickError),

    /// Actor fault.
    #[error("actor: {0}")]
    Actor(#[from] ActorError),

    /// The session loop is gone.
    #[error("session stopped")]
    Stopped,

    /// No such player.
    #[error("player {0} not found")]
    PlayerNotFound(EntityId),

    /// A player that could never finish a move.
    #[error("player {name:?} has zero speed")]
    ZeroSpeed {
        /// Player name
        name: String,
    },
}

// =============================================================================
// PLAYERS
// =============================================================================

/// Everything needed to add a player.
#[derive(Debug, Clone)]
pub struct PlayerDef {
    /// Display name.
    pub name: String,
    /// Spawn cell.
    pub coord: Cell,
    /// Initial facing.
    pub facing: Direction,
    /// Ticks per cell, `None` for the session default.
    pub speed: Option<WorldTime>,
    /// Where the player's frames go.
    pub transport: mpsc::Sender<ServerMessage>,
}

/// Outcome of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Tick the world advanced to.
    pub time: WorldTime,
    /// Motions started.
    pub started: usize,
    /// Motions completed.
    pub completed: usize,
    /// Move requests that lost a destination conflict.
    pub deferred: Vec<EntityId>,
    /// Move requests ignored because the entity has zero speed.
    pub stalled: Vec<EntityId>,
    /// Entities removed for leaving the world or losing their actor.
    pub removed: Vec<EntityId>,
    /// Realized collisions.
    pub collisions: Vec<EntityCollision>,
    /// Digest of the published snapshot.
    pub digest: StateHash,
}

// =============================================================================
// SESSION
// =============================================================================

/// A running world and its players.
pub struct Session {
    config: SessionConfig,
    clock: Clock,
    world: World,
    players: BTreeMap<EntityId, PlayerHandle>,
    next_id: u64,
    leave_tx: mpsc::Sender<LeaveRequest>,
    leave_rx: mpsc::Receiver<LeaveRequest>,
    latest: Arc<WorldState>,
}

impl Session {
    /// Create an empty session.
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let world = World::new(config.bounds(), config.quad_threshold)?;
        let (leave_tx, leave_rx) = mpsc::channel(64);
        let latest = Arc::new(world.snapshot(0));

        Ok(Self {
            config,
            clock: Clock::default(),
            world,
            players: BTreeMap::new(),
            next_id: 1,
            leave_tx,
            leave_rx,
            latest,
        })
    }

    /// Session configuration.
    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current tick.
    #[inline]
    pub fn now(&self) -> WorldTime {
        self.clock.now()
    }

    /// The world.
    #[inline]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Number of players.
    #[inline]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// The last published snapshot.
    pub fn latest(&self) -> Arc<WorldState> {
        Arc::clone(&self.latest)
    }

    /// Replace the terrain.
    pub fn set_terrain(&mut self, terrain: TerrainMap) {
        self.world.set_terrain(terrain);
    }

    /// Add a player and start its actor.
    #[instrument(skip(self, def), fields(name = %def.name))]
    pub fn add_player(&mut self, def: PlayerDef) -> Result<(EntityId, PlayerController), SessionError> {
        let id = EntityId(self.next_id);
        let speed = def.speed.unwrap_or(self.config.default_speed);
        if speed == 0 {
            return Err(SessionError::ZeroSpeed { name: def.name });
        }
        let motion = MotionInfo::new(def.coord, def.facing, speed);

        self.world.insert(EntityState::from_motion(id, def.name.clone(), &motion))?;
        self.next_id += 1;

        let mux = PlayerMux::new(id, def.name, motion, self.config.view_radius);
        let (handle, controller) = spawn_player(mux, def.transport, self.leave_tx.clone());
        self.players.insert(id, handle);

        info!(%id, coord = %def.coord, "player added");
        Ok((id, controller))
    }

    /// Remove a player: world entry and actor go together.
    #[instrument(skip(self))]
    pub async fn remove_player(&mut self, id: EntityId) -> Result<(), SessionError> {
        let handle = self.players.remove(&id).ok_or(SessionError::PlayerNotFound(id))?;
        self.world.remove(id);
        handle.stop().await?;
        info!("player removed");
        Ok(())
    }

    /// Handle any queued controller disconnects.
    pub async fn process_leave_requests(&mut self) {
        while let Ok(request) = self.leave_rx.try_recv() {
            self.handle_leave(request).await;
        }
    }

    async fn handle_leave(&mut self, request: LeaveRequest) {
        if let Err(e) = self.remove_player(request.id).await {
            warn!(id = %request.id, "disconnect failed: {}", e);
        }
        let _ = request.reply.send(());
    }

    /// Run one tick.
    #[instrument(level = "debug", skip(self), fields(now = self.clock.now()))]
    pub async fn step(&mut self) -> Result<TickReport, SessionError> {
        self.process_leave_requests().await;

        let now = self.clock.now();
        let target = now + 1;

        // 1. Lock
        let mut motions = BTreeMap::new();
        let mut lost = Vec::new();
        for (id, handle) in &self.players {
            match handle.access().await {
                Ok(motion) => {
                    motions.insert(*id, motion);
                }
                Err(e) => {
                    warn!(%id, "actor unreachable: {}", e);
                    lost.push(*id);
                }
            }
        }

        // 2. Resolve
        let result = match step_to(&mut motions, now, target) {
            Ok(result) => result,
            Err(e) => {
                error!("tick aborted: {}", e);
                self.publish(Arc::clone(&self.latest)).await;
                return Err(e.into());
            }
        };

        // 3. Store
        for (id, motion) in &motions {
            if let Some(handle) = self.players.get(id) {
                if let Err(e) = handle.store(motion.clone()).await {
                    warn!(%id, "actor unreachable: {}", e);
                    lost.push(*id);
                }
            }
        }
        for id in &lost {
            motions.remove(id);
            self.drop_player(*id).await;
        }

        // 4. Phases
        let phases = match self.world.apply_motions(&motions, target) {
            Ok(phases) => phases,
            Err(e) => {
                error!("phases aborted: {}", e);
                self.publish(Arc::clone(&self.latest)).await;
                return Err(e.into());
            }
        };

        // 5. Out of bounds
        let mut removed = lost;
        for entity in &phases.out_of_bounds {
            if let Some(handle) = self.players.remove(&entity.id) {
                warn!(id = %entity.id, coord = %entity.coord, "player left the world, disconnecting");
                let notice = ServerMessage::Error {
                    code: ErrorCode::Removed,
                    message: format!("left the world at {}", entity.coord),
                };
                if let Err(e) = handle.notify(notice).await {
                    debug!(id = %entity.id, "removal notice not delivered: {}", e);
                }
                if let Err(e) = handle.stop().await {
                    warn!(id = %entity.id, "actor did not stop cleanly: {}", e);
                }
            }
            removed.push(entity.id);
        }

        // 6. Publish
        self.clock = Clock(target);
        let snapshot = Arc::new(self.world.snapshot(target));
        let digest = snapshot.digest();
        self.publish(Arc::clone(&snapshot)).await;
        self.latest = snapshot;

        debug!(
            started = result.started.len(),
            completed = result.completed.len(),
            collisions = phases.collisions.len(),
            digest = %hex::encode(&digest[..8]),
            "tick complete"
        );

        Ok(TickReport {
            time: target,
            started: result.started.len(),
            completed: result.completed.len(),
            deferred: result.deferred,
            stalled: result.stalled,
            removed,
            collisions: phases.collisions,
            digest,
        })
    }

    /// Drop a player whose actor no longer answers.
    async fn drop_player(&mut self, id: EntityId) {
        self.world.remove(id);
        if let Some(handle) = self.players.remove(&id) {
            if let Err(e) = handle.stop().await {
                debug!(%id, "dead actor: {}", e);
            }
        }
        warn!(%id, "player dropped");
    }

    async fn publish(&self, snapshot: Arc<WorldState>) {
        for (id, handle) in &self.players {
            if let Err(e) = handle.publish(Arc::clone(&snapshot)).await {
                warn!(%id, "frame not delivered: {}", e);
            }
        }
    }

    /// Stop every actor.
    pub async fn shutdown(&mut self) {
        let players = std::mem::take(&mut self.players);
        for (id, handle) in players {
            if let Err(e) = handle.stop().await {
                warn!(%id, "actor did not stop cleanly: {}", e);
            }
        }
    }

    /// Run the session on its own task at `config.fps`.
    pub fn start(self) -> SessionHandle {
        let (request_tx, request_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel();
        let running = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(run_session(self, request_rx, stop_rx, Arc::clone(&running)));

        SessionHandle {
            requests: request_tx,
            stop: Some(stop_tx),
            running,
            task,
        }
    }
}

// =============================================================================
// SESSION LOOP
// =============================================================================

enum SessionRequest {
    AddPlayer {
        def: PlayerDef,
        reply: oneshot::Sender<Result<(EntityId, PlayerController), SessionError>>,
    },
    RemovePlayer {
        id: EntityId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Handle to a session running on its own task.
pub struct SessionHandle {
    requests: mpsc::Sender<SessionRequest>,
    stop: Option<oneshot::Sender<()>>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

#[instrument(skip_all)]
async fn run_session(
    mut session: Session,
    mut requests: mpsc::Receiver<SessionRequest>,
    mut stop: oneshot::Receiver<()>,
    running: Arc<AtomicBool>,
) {
    let mut ticker = interval(session.config.tick_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(fps = session.config.fps, bounds = %session.config.bounds(), "simulation started");

    loop {
        tokio::select! {
            biased;

            _ = &mut stop => break,

            Some(request) = requests.recv() => match request {
                SessionRequest::AddPlayer { def, reply } => {
                    let _ = reply.send(session.add_player(def));
                }
                SessionRequest::RemovePlayer { id, reply } => {
                    let _ = reply.send(session.remove_player(id).await);
                }
            },

            Some(request) = session.leave_rx.recv() => {
                session.handle_leave(request).await;
            }

            _ = ticker.tick() => {
                if let Err(e) = session.step().await {
                    error!("tick {} failed: {}", session.now(), e);
                }
            }
        }
    }

    session.shutdown().await;
    running.store(false, Ordering::SeqCst);
    info!(time = session.now(), "simulation stopped");
}

impl SessionHandle {
    /// True until the loop has shut down.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Add a player between ticks.
    pub async fn add_player(&self, def: PlayerDef) -> Result<(EntityId, PlayerController), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(SessionRequest::AddPlayer { def, reply })
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    /// Remove a player between ticks. Returns once it is gone.
    pub async fn remove_player(&self, id: EntityId) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(SessionRequest::RemovePlayer { id, reply })
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    /// Stop the loop and every actor.
    pub async fn stop(mut self) -> Result<(), SessionError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task).await.map_err(|_| SessionError::Stopped)
    }
}
