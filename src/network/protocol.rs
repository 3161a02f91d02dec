//! Protocol Messages
//!
//! Wire format between the core and its transports.
//! Frames are serialized as camelCase JSON for debugging ease,
//! with binary (bincode) for production.
//!
//! Frame types are flat copies of the game types: bincode cannot encode
//! flattened or internally tagged serde shapes, so nothing here uses them
//! except the JSON-only `ClientMessage`.

use serde::{Serialize, Deserialize};

use crate::core::coord::{Bounds, Cell, Direction};
use crate::core::path::PathAction;
use crate::core::time::WorldTime;
use crate::game::state::{EntityState, WorldStateDiff};
use crate::game::terrain::{TerrainDiff, TerrainMap, TerrainTypeChange};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent by an entity's controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A move command, e.g. `{"cmd": "move=12", "params": "north"}`.
    Command {
        /// `"<cmd>=<issuedAtTick>"`
        cmd: String,
        /// Direction
        params: String,
    },

    /// The controller is leaving.
    Disconnect,
}

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages delivered to an entity's transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerMessage {
    /// Per-tick view diff.
    WorldState(WorldStateFrame),

    /// Error notification.
    Error {
        /// Error category
        code: ErrorCode,
        /// Human readable message
        message: String,
    },
}

/// Error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Command could not be parsed
    InvalidCommand,
    /// Entity was removed from the simulation
    Removed,
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary (bincode).
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// FRAMES
// =============================================================================

/// A world state diff as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldStateFrame {
    /// Tick
    pub time: WorldTime,
    /// Viewport
    pub bounds: Bounds,
    /// New or changed entities
    pub entities: Vec<EntityFrame>,
    /// Entities that left the viewport or the world
    pub removed: Vec<EntityFrame>,
    /// Terrain changes
    pub terrain_map: Option<TerrainMapFrame>,
}

/// One entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityFrame {
    /// Entity id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Current cell
    pub coord: Cell,
    /// Facing
    pub facing: Direction,
    /// In-flight motion
    pub path_actions: Vec<PathActionFrame>,
}

/// One path action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathActionFrame {
    /// First tick
    pub start: WorldTime,
    /// Arrival tick
    pub end: WorldTime,
    /// Cell being left
    pub orig: Cell,
    /// Cell being entered
    pub dest: Cell,
}

/// Terrain changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainMapFrame {
    /// Bounds of the viewport the terrain belongs to
    pub bounds: Bounds,
    /// Newly visible regions
    pub slices: Vec<TerrainSliceFrame>,
    /// Single cell changes
    pub changes: Vec<TerrainTypeChange>,
}

/// A rectangle of terrain in string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainSliceFrame {
    /// Region
    pub bounds: Bounds,
    /// Row-major terrain string
    pub terrain: String,
}

impl From<&PathAction> for PathActionFrame {
    fn from(path: &PathAction) -> Self {
        Self {
            start: path.span().start,
            end: path.span().end,
            orig: path.orig(),
            dest: path.dest(),
        }
    }
}

impl From<&EntityState> for EntityFrame {
    fn from(entity: &EntityState) -> Self {
        Self {
            id: entity.id.0,
            name: entity.name.clone(),
            coord: entity.coord,
            facing: entity.facing,
            path_actions: entity.path_actions.iter().map(PathActionFrame::from).collect(),
        }
    }
}

impl From<&TerrainMap> for TerrainSliceFrame {
    fn from(map: &TerrainMap) -> Self {
        Self {
            bounds: map.bounds(),
            terrain: map.to_string(),
        }
    }
}

impl TerrainMapFrame {
    /// Build the frame for a terrain diff inside `bounds`.
    pub fn new(bounds: Bounds, diff: &TerrainDiff) -> Self {
        Self {
            bounds,
            slices: diff.slices.iter().map(TerrainSliceFrame::from).collect(),
            changes: diff.changes.clone(),
        }
    }
}

impl From<&WorldStateDiff> for WorldStateFrame {
    fn from(diff: &WorldStateDiff) -> Self {
        Self {
            time: diff.time,
            bounds: diff.bounds,
            entities: diff.entities.iter().map(EntityFrame::from).collect(),
            removed: diff.removed.iter().map(EntityFrame::from).collect(),
            terrain_map: diff.terrain.as_ref().map(|t| TerrainMapFrame::new(diff.bounds, t)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::Span;
    use crate::game::state::{EntityId, WorldState};
    use crate::game::terrain::TerrainType;

    fn sample_diff() -> WorldStateDiff {
        let bounds = Bounds::new(Cell::new(0, 0), Cell::new(1, -1));
        let entity = EntityState {
            id: EntityId(4),
            name: "ana".to_string(),
            coord: Cell::new(0, 0),
            facing: Direction::East,
            path_actions: vec![
                PathAction::new(Span::new(3, 13), Cell::new(0, 0), Cell::new(1, 0)).unwrap(),
            ],
        };
        let terrain = TerrainMap::parse(bounds, "\nGD\nRG\n").unwrap();
        let next = WorldState::new(3, bounds, vec![entity], Some(terrain));
        WorldState::empty(0, bounds).diff(&next)
    }

    #[test]
    fn test_client_message_json() {
        let msg = ClientMessage::from_json(r#"{"type":"command","cmd":"move=12","params":"north"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Command { cmd: "move=12".to_string(), params: "north".to_string() }
        );

        let json = ClientMessage::Disconnect.to_json().unwrap();
        assert_eq!(ClientMessage::from_json(&json).unwrap(), ClientMessage::Disconnect);
    }

    #[test]
    fn test_world_state_frame_json_shape() {
        let frame = WorldStateFrame::from(&sample_diff());
        let json = serde_json::to_value(ServerMessage::WorldState(frame)).unwrap();

        let state = &json["worldState"];
        assert_eq!(state["time"], 3);
        assert_eq!(state["bounds"]["topL"]["x"], 0);
        assert_eq!(state["bounds"]["botR"]["y"], -1);

        let entity = &state["entities"][0];
        assert_eq!(entity["id"], 4);
        assert_eq!(entity["facing"], "east");
        assert_eq!(entity["pathActions"][0]["start"], 3);
        assert_eq!(entity["pathActions"][0]["end"], 13);
        assert_eq!(entity["pathActions"][0]["dest"]["x"], 1);

        let terrain = &state["terrainMap"];
        assert_eq!(terrain["slices"][0]["terrain"], "\nGD\nRG\n");
        assert!(terrain["changes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_terrain_change_json() {
        let change = TerrainTypeChange { cell: Cell::new(2, -1), terrain_type: TerrainType::Rock };
        let json = serde_json::to_value(change).unwrap();
        assert_eq!(json["terrainType"], "R");
        assert_eq!(json["cell"]["y"], -1);
    }

    #[test]
    fn test_binary_serialization_frame() {
        let msg = ServerMessage::WorldState(WorldStateFrame::from(&sample_diff()));
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(ServerMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::Error {
            code: ErrorCode::InvalidCommand,
            message: "unknown direction: \"up\"".to_string(),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("invalid_command"));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }
}
