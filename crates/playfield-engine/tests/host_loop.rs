//! Host lifecycle and a full rhythm round driven through keyboard input.

use std::cell::Cell;
use std::rc::Rc;

use playfield_engine::prelude::*;

fn host_with(time: &ManualTime, surface: &HeadlessSurface) -> Host {
    Host::with_time_source(
        EngineConfig::default(),
        Box::new(surface.clone()),
        Box::new(time.clone()),
    )
}

fn step(host: &mut Host, time: &ManualTime) {
    time.advance(1000.0 / 60.0);
    host.frame().unwrap();
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn cancel_from_a_callback_ends_the_run() {
    let time = ManualTime::new();
    let surface = HeadlessSurface::new();
    let mut host = host_with(&time, &surface);

    let frames = Rc::new(Cell::new(0u32));
    let seen = frames.clone();
    let handle = Rc::new(Cell::new(None::<LoopHandle>));
    let slot = handle.clone();
    let game = Callbacks::new().on_update(move |_, _| {
        seen.set(seen.get() + 1);
        if seen.get() == 5 {
            if let Some(h) = slot.take() {
                h.cancel();
                h.cancel();
            }
        }
        Ok(())
    });

    handle.set(Some(host.start(Box::new(game)).unwrap()));
    let ran = host.run(Some(100)).unwrap();
    assert_eq!(ran, 5);
    assert_eq!(frames.get(), 5);
    assert!(!host.is_running());
    assert!(matches!(host.frame(), Err(EngineError::NotRunning)));

    host.shutdown();
    host.shutdown();
    assert!(surface.is_shut_down());
}

#[test]
fn host_can_start_again_after_shutdown() {
    let time = ManualTime::new();
    let surface = HeadlessSurface::new();
    let mut host = host_with(&time, &surface);

    host.start(Box::new(Platformer::default())).unwrap();
    step(&mut host, &time);
    host.shutdown();
    assert_eq!(host.world().entity_count(), 0);
    assert!(host.scheduler().is_empty());

    host.start(Box::new(Rhythm::default())).unwrap();
    step(&mut host, &time);
    assert!(host.world().has_resource::<RhythmState>());
    assert!(!host.world().has_resource::<PlatformerState>());
    host.shutdown();
}

// ---------------------------------------------------------------------------
// Rhythm round
// ---------------------------------------------------------------------------

fn live_notes(world: &World) -> Vec<(EntityId, Note, f64)> {
    world
        .entities()
        .filter_map(|e| {
            let note = world.get::<Note>(e.id)?;
            let t = world.get::<Transform>(e.id)?;
            Some((e.id, *note, t.position.y))
        })
        .collect()
}

#[test]
fn pressing_a_lane_key_in_the_zone_scores() {
    let time = ManualTime::new();
    let surface = HeadlessSurface::new();
    let mut host = host_with(&time, &surface);
    let config = RhythmConfig {
        note_speed: 600.0,
        spawn_interval_ms: 1000.0,
        ..RhythmConfig::default()
    };
    host.start(Box::new(Rhythm::new(config))).unwrap();

    let line_y = host.world().resource::<RhythmState>().unwrap().hit_line_y;
    let mut pressed = None;
    for _ in 0..200 {
        step(&mut host, &time);
        let in_zone = live_notes(host.world())
            .into_iter()
            .find(|(_, n, y)| n.active && (y - line_y).abs() <= 15.0);
        if let Some((entity, note, _)) = in_zone {
            let key = (note.lane + 1).to_string();
            host.key_down(&key, &format!("Digit{key}"));
            step(&mut host, &time);
            host.key_up(&key, &format!("Digit{key}"));
            pressed = Some(entity);
            break;
        }
    }

    let entity = pressed.expect("no note reached the hit line");
    assert!(!host.world().is_alive(entity));
    assert_eq!(host.world().resource::<RhythmState>().unwrap().score, 1);

    let frame = surface.last_frame().unwrap();
    assert!(frame.texts().contains(&"Score: 1"));
    host.shutdown();
}

#[test]
fn unplayed_notes_fall_off_and_vanish() {
    let time = ManualTime::new();
    let surface = HeadlessSurface::new();
    let mut host = host_with(&time, &surface);
    let config = RhythmConfig {
        note_speed: 600.0,
        spawn_interval_ms: 1000.0,
        ..RhythmConfig::default()
    };
    host.start(Box::new(Rhythm::new(config))).unwrap();

    let mut spawned: Vec<(EntityId, usize)> = Vec::new();
    for frame in 0..300 {
        step(&mut host, &time);
        for (e, _, _) in live_notes(host.world()) {
            if !spawned.iter().any(|&(s, _)| s == e) {
                spawned.push((e, frame));
            }
        }
    }
    assert!(spawned.len() >= 3);
    // 650 px at 600 px/s takes under 70 frames.
    let old: Vec<_> = spawned.iter().filter(|&&(_, f)| f + 90 < 300).collect();
    assert!(!old.is_empty());
    for &&(e, _) in &old {
        assert!(!host.world().is_alive(e));
    }
    assert_eq!(host.world().resource::<RhythmState>().unwrap().score, 0);
    host.shutdown();
}
