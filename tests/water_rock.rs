use bevy::prelude::*;

use meridian::game::config::InitialConfig;
use meridian::game::rocks::{Rock, RockField};
use meridian::game::seat::{SeatPlugin, SeatRequest, Session, SessionRole};
use meridian::game::simulation::{
    Bounce, Command, CommandKind, CommandQueue, SimPosition, SimulationPlugin, WaterMachine,
    WaterState,
};
use meridian::game::terrain::TerrainOracle;

fn build_app(config: InitialConfig) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(bevy::state::app::StatesPlugin);
    app.init_state::<meridian::game::GameState>();
    app.insert_resource(config);
    app.add_plugins(SimulationPlugin);
    app.add_plugins(SeatPlugin);
    app.insert_resource(Session {
        role: SessionRole::Offline,
        local_slot: 0,
    });
    app.update();
    app
}

fn step(app: &mut App, ticks: usize) {
    for _ in 0..ticks {
        app.world_mut().run_schedule(FixedUpdate);
    }
}

fn submit(app: &mut App, tick: u64, kind: CommandKind) {
    app.world_mut()
        .resource_mut::<CommandQueue>()
        .submit_command(Command {
            tick,
            slot: 0,
            unit_id: 0,
            kind,
        });
}

fn spawn_and_seat(app: &mut App, position: Vec3) {
    submit(
        app,
        1,
        CommandKind::Spawn {
            position,
            slot: 0,
            can_swim: false,
        },
    );
    step(app, 2);
    app.world_mut().write_message(SeatRequest {
            unit_id: 0,
            slot: 0,
            pin_guess: None,
        });
    step(app, 1);
}

fn unit_pos(app: &mut App) -> Vec3 {
    let mut query = app.world_mut().query::<&SimPosition>();
    query.iter(app.world()).next().unwrap().0
}

fn water_state(app: &mut App) -> WaterState {
    let mut query = app.world_mut().query::<&WaterMachine>();
    query.iter(app.world()).next().unwrap().state
}

fn bounce_state(app: &mut App) -> Bounce {
    let mut query = app.world_mut().query::<&Bounce>();
    *query.iter(app.world()).next().unwrap()
}

/// Walk a circle of directions on the procedural terrain and find a
/// dry -> wet -> dry crossing: returns surface points shortly before and
/// after a wet stretch of at least `min_wet` samples.
fn find_shore_crossing(terrain: &TerrainOracle, min_wet: usize, lat: f32) -> Option<(Vec3, Vec3)> {
    let samples = 4096usize;
    let margin = 8usize;
    let dir_at = move |i: usize| {
        let a = (i % samples) as f32 / samples as f32 * std::f32::consts::TAU;
        Vec3::new(a.cos(), lat, a.sin())
    };
    let submerged: Vec<bool> = (0..samples).map(|i| terrain.is_submerged(dir_at(i))).collect();

    let mut i = margin;
    while i + min_wet + 2 * margin < samples {
        // Shoreline: dry sample followed by a wet run.
        if submerged[i] || !submerged[i + 1] {
            i += 1;
            continue;
        }
        let wet_start = i + 1;
        let mut wet_end = wet_start;
        while wet_end < samples && submerged[wet_end] {
            wet_end += 1;
        }
        let wet_run = wet_end - wet_start;
        let dry_margin_ok = wet_run >= min_wet
            && wet_end + margin < samples
            && (1..=margin).all(|m| !submerged[i - m + 1] && !submerged[wet_end + m - 1]);
        if dry_margin_ok {
            return Some((
                terrain.surface_point(dir_at(i.saturating_sub(margin)), 0.0),
                terrain.surface_point(dir_at(wet_end + margin), 0.0),
            ));
        }
        i = wet_end;
    }
    None
}

#[test]
fn non_swimmer_crossing_water_runs_the_exit_automaton() {
    let config = InitialConfig {
        session_seed: 0xA11CE,
        terrain_seed: 1337,
        base_radius: 100.0,
        terrain_amplitude: 4.0,
        water_level: -0.8,
        rock_count: 0,
        ..Default::default()
    };
    let mut app = build_app(config.clone());

    let terrain = TerrainOracle::new(&config);
    let (shore_before, shore_after) = [0.17f32, 0.0, -0.3, 0.35, -0.55]
        .iter()
        .find_map(|lat| find_shore_crossing(&terrain, 30, *lat))
        .expect("terrain seed should produce a water crossing on a probe circle");

    spawn_and_seat(&mut app, shore_before);
    submit(
        &mut app,
        4,
        CommandKind::Move {
            point: shore_before,
        },
    );
    submit(
        &mut app,
        5,
        CommandKind::Move {
            point: shore_after,
        },
    );

    // Drive toward the water and find the shoreline crossing tick.
    let mut crossed_at = None;
    for tick in 0..800 {
        step(&mut app, 1);
        let depth = {
            let pos = unit_pos(&mut app);
            terrain.depth_at(pos)
        };
        if depth > 0.05 {
            crossed_at = Some(tick);
            break;
        }
    }
    let crossed_at = crossed_at.expect("unit should reach the water");

    // Slowing must engage within 20 ticks of the crossing.
    let mut slowing_seen = false;
    for _ in 0..20 {
        if water_state(&mut app) == WaterState::Slowing {
            slowing_seen = true;
            break;
        }
        step(&mut app, 1);
    }
    assert!(
        slowing_seen,
        "water machine did not slow within 20 ticks of crossing at tick {crossed_at}"
    );

    // The automaton must pass through shore exit and settle back to normal
    // on dry ground.
    let mut saw_shore_exit = false;
    let mut settled = false;
    for _ in 0..800 {
        step(&mut app, 1);
        match water_state(&mut app) {
            WaterState::ShoreExit => saw_shore_exit = true,
            WaterState::Normal if saw_shore_exit => {
                settled = true;
                break;
            }
            _ => {}
        }
    }
    assert!(saw_shore_exit, "shore exit never engaged");
    assert!(settled, "water machine never settled back to normal");

    let pos = unit_pos(&mut app);
    assert!(
        terrain.depth_at(pos) <= 0.05,
        "unit should finish above the water line"
    );
}

#[test]
fn head_on_rock_impact_bounces_and_recovers() {
    let config = InitialConfig {
        base_radius: 10.0,
        terrain_amplitude: 0.0,
        water_level: -1.0,
        rock_count: 0,
        ..Default::default()
    };
    let mut app = build_app(config);

    // One rock squarely on the route.
    let rock_dir = Vec3::new(0.35, 0.0, 0.94).normalize();
    app.insert_resource(RockField::from_rocks(vec![Rock {
        center: rock_dir * 10.0,
        radius: 1.0,
    }]));

    spawn_and_seat(&mut app, Vec3::new(0.0, 0.0, 10.0));
    submit(
        &mut app,
        4,
        CommandKind::Move {
            point: Vec3::new(7.0, 0.0, 7.0),
        },
    );

    // Run until impact.
    let mut impact_tick = None;
    for tick in 0..400 {
        step(&mut app, 1);
        let bounce = bounce_state(&mut app);
        if bounce.velocity > 0.0 {
            assert_eq!(
                bounce.cooldown, 0.5,
                "impact must arm the bounce cooldown"
            );
            assert!(bounce.direction.is_some());
            impact_tick = Some(tick);
            break;
        }
    }
    let impact_tick = impact_tick.expect("unit should hit the rock");

    // Park the unit so it stops ramming, then let the bounce decay: within
    // 2 s the rebound is spent and control is back.
    let now = app
        .world()
        .resource::<meridian::game::simulation::SimTick>()
        .get();
    submit(&mut app, now + 1, CommandKind::Pause);
    step(&mut app, 40);

    let bounce = bounce_state(&mut app);
    assert!(
        bounce.velocity <= 0.05,
        "bounce velocity should have decayed by 2 s after impact (impact at {impact_tick})"
    );
    assert!(bounce.direction.is_none(), "bounce lock should be released");

    // The unit never ended up inside the rock.
    let pos = unit_pos(&mut app);
    let rocks = app.world().resource::<RockField>();
    assert!(!rocks.contains(pos));
}
