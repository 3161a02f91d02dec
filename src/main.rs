//! Tilesim Server
//!
//! Runs a demo simulation: a few walkers on an empty map, stepping until
//! their moves complete, then reports the final snapshot digest.

use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tilesim::{
    VERSION,
    core::coord::{Cell, Direction},
    game::input::InputCmd,
    game::terrain::{TerrainMap, TerrainType},
    network::{
        protocol::ServerMessage,
        session::{PlayerDef, Session, SessionConfig},
    },
};

/// Ticks to run the demo for.
const DEMO_TICKS: u64 = 120;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = SessionConfig::from_env();
    info!("Tilesim Server v{}", VERSION);
    info!("Tick Rate: {} Hz", config.fps);
    info!("World: {}", config.bounds());

    demo(config).await
}

/// Demo: four walkers heading for the same crossing.
async fn demo(config: SessionConfig) -> anyhow::Result<()> {
    info!("=== Starting Demo ===");

    let mut session = Session::new(config.clone())?;
    session.set_terrain(TerrainMap::filled(config.bounds(), TerrainType::Grass));

    let walkers = [
        ("north", Cell::new(0, 3), Direction::South),
        ("south", Cell::new(0, -3), Direction::North),
        ("east", Cell::new(3, 0), Direction::West),
        ("west", Cell::new(-3, 0), Direction::East),
    ];

    let mut controllers = Vec::new();
    for (name, coord, heading) in walkers {
        let (transport, mut frames) = mpsc::channel::<ServerMessage>(64);
        let (id, controller) = session.add_player(PlayerDef {
            name: name.to_string(),
            coord,
            facing: heading,
            speed: None,
            transport,
        })?;

        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if let ServerMessage::WorldState(state) = frame {
                    debug!(%id, time = state.time, entities = state.entities.len(), "frame");
                }
            }
        });
        controllers.push((controller, heading));
    }

    let mut collisions = 0;
    for _ in 0..DEMO_TICKS {
        // Keep walking toward the center
        let now = session.now();
        if now % config.default_speed == 0 {
            for (controller, heading) in &controllers {
                controller.submit_cmd(InputCmd::move_to(now, *heading)).await?;
            }
        }

        let report = session.step().await?;
        collisions += report.collisions.len();
        if !report.deferred.is_empty() {
            info!("Tick {}: deferred {:?}", report.time, report.deferred);
        }
    }

    info!("=== Results ===");
    let latest = session.latest();
    for entity in &latest.entities {
        info!("{} ({}) at {} facing {}", entity.name, entity.id, entity.coord, entity.facing);
    }
    info!("Collisions observed: {}", collisions);
    info!("Final State Hash: {}", hex::encode(latest.digest()));

    session.shutdown().await;
    Ok(())
}
