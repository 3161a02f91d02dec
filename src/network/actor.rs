//! Player Actor
//!
//! Single writer for one entity's motion state.
//!
//! The orchestrator locks the actor by taking a copy of its `MotionInfo`,
//! writes the mutated copy back, then publishes the tick's snapshot, which
//! unlocks it. Commands arriving from the controller while locked are held
//! back and applied in order on unlock, so the orchestrator never sees a
//! half-applied command.
//!
//! `PlayerMux` is the state machine; `spawn_player` drives it from a tokio
//! task with stop > control > command priority.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::core::coord::Bounds;
use crate::game::input::{InputCmd, InputError};
use crate::game::motion::MotionInfo;
use crate::game::state::{EntityId, EntityState, WorldState, WorldStateDiff};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage, WorldStateFrame};

// =============================================================================
// ERRORS
// =============================================================================

/// Actor faults.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The actor task is gone.
    #[error("player actor stopped")]
    Stopped,

    /// Store or publish without a prior grant.
    #[error("player actor is not locked")]
    NotLocked,

    /// The entity's transport was closed.
    #[error("player transport closed")]
    TransportClosed,

    /// Controller sent a malformed command.
    #[error(transparent)]
    Input(#[from] InputError),
}

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Whether the orchestrator currently holds the motion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxState {
    /// Commands apply immediately
    Unlocked,
    /// Commands are deferred until unlock
    Locked,
}

/// What happened to a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// Applied to the motion state
    Applied,
    /// Queued until the current tick is delivered
    Deferred,
}

/// What happened to an inbound client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The command reached the actor
    Submitted(Submitted),
    /// Malformed; the client was sent `ErrorCode::InvalidCommand`
    Rejected,
    /// The entity left its session
    Disconnected,
}

/// Transport-free actor state.
#[derive(Debug)]
pub struct PlayerMux {
    id: EntityId,
    name: String,
    motion: MotionInfo,
    state: MuxState,
    pending: Vec<InputCmd>,
    view_radius: i32,
    last_view: Option<WorldState>,
}

impl PlayerMux {
    /// Create an unlocked mux.
    pub fn new(id: EntityId, name: impl Into<String>, motion: MotionInfo, view_radius: i32) -> Self {
        Self {
            id,
            name: name.into(),
            motion,
            state: MuxState::Unlocked,
            pending: Vec::new(),
            view_radius,
            last_view: None,
        }
    }

    /// Entity id.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Display name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lock state.
    #[inline]
    pub fn state(&self) -> MuxState {
        self.state
    }

    /// Current motion state.
    #[inline]
    pub fn motion(&self) -> &MotionInfo {
        &self.motion
    }

    /// Snapshot value of the entity.
    pub fn entity_state(&self) -> EntityState {
        EntityState::from_motion(self.id, self.name.clone(), &self.motion)
    }

    /// Enter `Locked`.
    pub fn lock(&mut self) {
        self.state = MuxState::Locked;
    }

    /// Enter `Unlocked`, applying deferred commands in arrival order.
    pub fn unlock(&mut self) {
        self.state = MuxState::Unlocked;
        for cmd in std::mem::take(&mut self.pending) {
            self.motion.apply(&cmd);
        }
    }

    /// Apply a command now, or defer it while locked.
    pub fn submit(&mut self, cmd: InputCmd) -> Submitted {
        match self.state {
            MuxState::Unlocked => {
                self.motion.apply(&cmd);
                Submitted::Applied
            }
            MuxState::Locked => {
                self.pending.push(cmd);
                Submitted::Deferred
            }
        }
    }

    /// Hand out a copy of the motion state and lock.
    pub fn grant(&mut self) -> MotionInfo {
        self.lock();
        self.motion.clone()
    }

    /// Write back the orchestrator's copy.
    pub fn store(&mut self, motion: MotionInfo) -> Result<(), ActorError> {
        if self.state != MuxState::Locked {
            return Err(ActorError::NotLocked);
        }
        self.motion = motion;
        Ok(())
    }

    /// Cull `world` to this entity's viewport and diff it against the last
    /// delivered view. The first frame is a full diff.
    pub fn prepare_frame(&mut self, world: &WorldState) -> Result<WorldStateDiff, ActorError> {
        if self.state != MuxState::Locked {
            return Err(ActorError::NotLocked);
        }

        let viewport = Bounds::around(self.motion.coord, self.view_radius);
        let view = world.cull(&viewport);
        let diff = match &self.last_view {
            Some(last) => last.diff(&view),
            None => WorldState::empty(world.time, viewport).diff(&view),
        };
        self.last_view = Some(view);
        Ok(diff)
    }
}

// =============================================================================
// ACTOR TASK
// =============================================================================

#[derive(Debug)]
enum Control {
    Access {
        reply: oneshot::Sender<MotionInfo>,
    },
    Store {
        motion: MotionInfo,
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
    Publish {
        world: Arc<WorldState>,
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
    Notify {
        message: ServerMessage,
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
}

#[derive(Debug)]
struct Command {
    cmd: InputCmd,
    reply: oneshot::Sender<Submitted>,
}

/// A controller asking for its entity to be removed.
#[derive(Debug)]
pub struct LeaveRequest {
    /// Entity leaving
    pub id: EntityId,
    /// Signalled once the entity is gone
    pub reply: oneshot::Sender<()>,
}

/// Orchestrator side of an actor.
#[derive(Debug)]
pub struct PlayerHandle {
    id: EntityId,
    control: mpsc::Sender<Control>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<PlayerMux>,
}

/// Controller side of an actor.
#[derive(Debug, Clone)]
pub struct PlayerController {
    id: EntityId,
    commands: mpsc::Sender<Command>,
    leave: mpsc::Sender<LeaveRequest>,
    transport: mpsc::WeakSender<ServerMessage>,
}

/// Start an actor task for `mux`, delivering frames to `transport`.
///
/// `leave` is where the controller's disconnect requests go.
pub fn spawn_player(
    mux: PlayerMux,
    transport: mpsc::Sender<ServerMessage>,
    leave: mpsc::Sender<LeaveRequest>,
) -> (PlayerHandle, PlayerController) {
    let id = mux.id();
    let replies = transport.downgrade();
    let (control_tx, control_rx) = mpsc::channel(4);
    let (command_tx, command_rx) = mpsc::channel(64);
    let (stop_tx, stop_rx) = oneshot::channel();

    let task = tokio::spawn(run_player(mux, transport, stop_rx, control_rx, command_rx));

    let handle = PlayerHandle {
        id,
        control: control_tx,
        stop: Some(stop_tx),
        task,
    };
    let controller = PlayerController {
        id,
        commands: command_tx,
        leave,
        transport: replies,
    };
    (handle, controller)
}

#[instrument(skip_all, fields(id = %mux.id()))]
async fn run_player(
    mut mux: PlayerMux,
    transport: mpsc::Sender<ServerMessage>,
    mut stop: oneshot::Receiver<()>,
    mut control: mpsc::Receiver<Control>,
    mut commands: mpsc::Receiver<Command>,
) -> PlayerMux {
    debug!("player actor started");

    loop {
        tokio::select! {
            biased;

            _ = &mut stop => break,

            Some(request) = control.recv() => match request {
                Control::Access { reply } => {
                    let _ = reply.send(mux.grant());
                }
                Control::Store { motion, reply } => {
                    let _ = reply.send(mux.store(motion));
                }
                Control::Publish { world, reply } => {
                    let result = deliver(&mut mux, &transport, &world).await;
                    mux.unlock();
                    let _ = reply.send(result);
                }
                Control::Notify { message, reply } => {
                    let result = transport
                        .send(message)
                        .await
                        .map_err(|_| ActorError::TransportClosed);
                    let _ = reply.send(result);
                }
            },

            Some(Command { cmd, reply }) = commands.recv() => {
                let submitted = mux.submit(cmd);
                if submitted == Submitted::Deferred {
                    debug!(%cmd, "command deferred until delivery");
                }
                let _ = reply.send(submitted);
            }

            else => break,
        }
    }

    debug!("player actor stopped");
    mux
}

async fn deliver(
    mux: &mut PlayerMux,
    transport: &mpsc::Sender<ServerMessage>,
    world: &WorldState,
) -> Result<(), ActorError> {
    let diff = mux.prepare_frame(world)?;
    let frame = WorldStateFrame::from(&diff);
    transport
        .send(ServerMessage::WorldState(frame))
        .await
        .map_err(|_| {
            warn!("transport closed, frame dropped");
            ActorError::TransportClosed
        })
}

impl PlayerHandle {
    /// Entity id.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Control,
    ) -> Result<T, ActorError> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(build(tx))
            .await
            .map_err(|_| ActorError::Stopped)?;
        rx.await.map_err(|_| ActorError::Stopped)
    }

    /// Lock the actor and take a copy of its motion state.
    pub async fn access(&self) -> Result<MotionInfo, ActorError> {
        self.request(|reply| Control::Access { reply }).await
    }

    /// Write back a mutated motion state.
    pub async fn store(&self, motion: MotionInfo) -> Result<(), ActorError> {
        self.request(|reply| Control::Store { motion, reply }).await?
    }

    /// Deliver the tick's snapshot and unlock.
    pub async fn publish(&self, world: Arc<WorldState>) -> Result<(), ActorError> {
        self.request(|reply| Control::Publish { world, reply }).await?
    }

    /// Send an out-of-band message to the entity's transport.
    pub async fn notify(&self, message: ServerMessage) -> Result<(), ActorError> {
        self.request(|reply| Control::Notify { message, reply }).await?
    }

    #[cfg(test)]
    pub(crate) fn abort(&self) {
        self.task.abort();
    }

    /// Stop the task and return the final state.
    pub async fn stop(mut self) -> Result<PlayerMux, ActorError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.map_err(|_| ActorError::Stopped)
    }
}

impl PlayerController {
    /// Entity id.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Parse and submit a command string, e.g. `("move=12", "north")`.
    ///
    /// Malformed commands are rejected before reaching the actor.
    pub async fn submit(&self, cmd: &str, params: &str) -> Result<Submitted, ActorError> {
        let cmd = InputCmd::parse(cmd, params)?;
        self.submit_cmd(cmd).await
    }

    /// Submit an already parsed command.
    pub async fn submit_cmd(&self, cmd: InputCmd) -> Result<Submitted, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command { cmd, reply })
            .await
            .map_err(|_| ActorError::Stopped)?;
        rx.await.map_err(|_| ActorError::Stopped)
    }

    /// Route an inbound message from the entity's transport.
    pub async fn handle(&self, message: ClientMessage) -> Result<Handled, ActorError> {
        match message {
            ClientMessage::Command { cmd, params } => match InputCmd::parse(&cmd, &params) {
                Ok(cmd) => self.submit_cmd(cmd).await.map(Handled::Submitted),
                Err(e) => {
                    self.reject(e.to_string()).await?;
                    Ok(Handled::Rejected)
                }
            },
            ClientMessage::Disconnect => {
                self.clone().disconnect().await?;
                Ok(Handled::Disconnected)
            }
        }
    }

    /// Decode and route a JSON message.
    pub async fn handle_json(&self, text: &str) -> Result<Handled, ActorError> {
        match ClientMessage::from_json(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                self.reject(format!("malformed message: {}", e)).await?;
                Ok(Handled::Rejected)
            }
        }
    }

    async fn reject(&self, message: String) -> Result<(), ActorError> {
        debug!(id = %self.id, "command rejected: {}", message);
        let transport = self.transport.upgrade().ok_or(ActorError::TransportClosed)?;
        transport
            .send(ServerMessage::Error { code: ErrorCode::InvalidCommand, message })
            .await
            .map_err(|_| ActorError::TransportClosed)
    }

    /// Remove the entity from its session. Returns once it is gone.
    pub async fn disconnect(self) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.leave
            .send(LeaveRequest { id: self.id, reply })
            .await
            .map_err(|_| ActorError::Stopped)?;
        rx.await.map_err(|_| ActorError::Stopped)
    }
}
