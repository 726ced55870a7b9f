//! Headless platformer run -- a scripted player walks right, jumps now and
//! then, and the score is logged at the end.
//!
//! Run with:
//!   cargo run --example headless_platformer -p playfield-engine [config.json] [frames]
//!
//! Set `RUST_LOG=playfield_engine=debug` to see landings, jumps and
//! collections as they happen.

use anyhow::Context;
use playfield_engine::prelude::*;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            EngineConfig::from_json_str(&json).with_context(|| format!("parsing {path}"))?
        }
        None => EngineConfig::default(),
    };
    let frames: u64 = match args.next() {
        Some(n) => n.parse().context("frame count")?,
        None => 600,
    };
    init_tracing(&config.log_filter);

    let time = ManualTime::new();
    let surface = HeadlessSurface::new().keep_last(1);
    let mut host = Host::with_time_source(config, Box::new(surface.clone()), Box::new(time.clone()));
    host.start(Box::new(Platformer::default()))?;

    host.key_down("ArrowRight", "ArrowRight");
    for frame in 0..frames {
        if frame % 90 == 45 {
            host.key_down(" ", "Space");
        } else if frame % 90 == 46 {
            host.key_up(" ", "Space");
        }
        if frame % 240 == 120 {
            host.key_up("ArrowRight", "ArrowRight");
            host.key_down("ArrowLeft", "ArrowLeft");
        } else if frame % 240 == 0 && frame > 0 {
            host.key_up("ArrowLeft", "ArrowLeft");
            host.key_down("ArrowRight", "ArrowRight");
        }
        time.advance(1000.0 / 60.0);
        host.frame()?;
    }

    if let Some(state) = host.world().resource::<PlatformerState>() {
        tracing::info!(
            frames,
            score = state.score,
            jumps = state.jumps,
            boxes_remaining = state.boxes_remaining,
            presented = surface.presented(),
            "run finished"
        );
    }
    host.shutdown();
    Ok(())
}
