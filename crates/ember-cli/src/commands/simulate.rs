//! Fixed-timestep scene simulation

use anyhow::{Context, Result};
use ember_particles::{PainterId, ParticleEvent, ParticlePainter, ParticleSystem, VertexPainter};
use ember_runtime::RuntimeSystem;
use serde::Serialize;

pub struct SimulateArgs {
    pub scene: String,
    pub frames: usize,
    pub fps: f64,
    pub format: String,
    pub quiet: bool,
}

#[derive(Serialize)]
struct GroupReport {
    name: String,
    capacity: usize,
    allocated: usize,
}

#[derive(Serialize)]
struct PainterReport {
    groups: Vec<String>,
    count: usize,
    commits: usize,
    visible: usize,
}

#[derive(Serialize)]
struct EventReport {
    frame: usize,
    time_ms: i64,
    event: String,
}

#[derive(Serialize)]
struct SimulationReport {
    scene: String,
    frames: usize,
    fps: f64,
    time_ms: i64,
    empty: bool,
    peak_allocated: usize,
    groups: Vec<GroupReport>,
    painters: Vec<PainterReport>,
    events: Vec<EventReport>,
}

pub fn run(args: SimulateArgs) -> Result<()> {
    let config = super::load_scene(&args.scene)?;
    if config.system.debug && !args.quiet && log::max_level() < log::LevelFilter::Debug {
        log::set_max_level(log::LevelFilter::Debug);
    }
    let mut scene = config
        .build()
        .with_context(|| format!("Failed to build scene {}", args.scene))?;
    let system = &mut scene.system;

    let dt = 1.0 / args.fps;
    let mut events = Vec::new();
    let mut peak_allocated = 0;
    for frame in 1..=args.frames {
        system.update(dt)?;
        system.sync_all();

        let allocated = total_allocated(system);
        peak_allocated = peak_allocated.max(allocated);
        for event in system.drain_events() {
            events.push(EventReport {
                frame,
                time_ms: system.time().as_millis(),
                event: describe(event),
            });
        }
        log::trace!("Frame {frame}: {allocated} particles at {}", system.time());
    }

    let system = &scene.system;
    let report = SimulationReport {
        scene: args.scene.clone(),
        frames: args.frames,
        fps: args.fps,
        time_ms: system.time().as_millis(),
        empty: system.is_empty(),
        peak_allocated,
        groups: system
            .groups()
            .iter()
            .map(|g| GroupReport {
                name: g.name().to_string(),
                capacity: g.size(),
                allocated: g.allocated(),
            })
            .collect(),
        painters: scene
            .painters
            .iter()
            .filter_map(|id| painter_report(system, *id))
            .collect(),
        events,
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_text(&report);
    }
    Ok(())
}

fn total_allocated(system: &ParticleSystem) -> usize {
    system.groups().iter().map(|g| g.allocated()).sum()
}

fn painter_report(system: &ParticleSystem, id: PainterId) -> Option<PainterReport> {
    let painter = system.painter_as::<VertexPainter>(id)?;
    Some(PainterReport {
        groups: painter.groups().to_vec(),
        count: painter.count(),
        commits: painter.commits(),
        visible: painter.visible_count(system.time()),
    })
}

fn describe(event: ParticleEvent) -> String {
    match event {
        ParticleEvent::RunningChanged(true) => "started".to_string(),
        ParticleEvent::RunningChanged(false) => "stopped".to_string(),
        ParticleEvent::PausedChanged(true) => "paused".to_string(),
        ParticleEvent::PausedChanged(false) => "resumed".to_string(),
        ParticleEvent::EmptyChanged(true) => "emptied".to_string(),
        ParticleEvent::EmptyChanged(false) => "filled".to_string(),
    }
}

fn group_label(name: &str) -> &str {
    if name.is_empty() {
        "(default)"
    } else {
        name
    }
}

fn print_report_text(report: &SimulationReport) {
    println!(
        "Simulated {} frame(s) of {} at {} fps, ending at {}ms",
        report.frames, report.scene, report.fps, report.time_ms
    );
    println!(
        "Peak particles: {}{}",
        report.peak_allocated,
        if report.empty { " (now empty)" } else { "" }
    );

    println!();
    println!("Groups:");
    for group in &report.groups {
        println!(
            "  {:<16} {:>6} / {:<6}",
            group_label(&group.name),
            group.allocated,
            group.capacity
        );
    }

    if !report.painters.is_empty() {
        println!();
        println!("Painters:");
        for (i, painter) in report.painters.iter().enumerate() {
            let groups: Vec<&str> = painter.groups.iter().map(|g| group_label(g)).collect();
            println!(
                "  [{}] groups: {}  slots: {}  visible: {}  commits: {}",
                i,
                if groups.is_empty() {
                    group_label("").to_string()
                } else {
                    groups.join(", ")
                },
                painter.count,
                painter.visible,
                painter.commits
            );
        }
    }

    if !report.events.is_empty() {
        println!();
        println!("Events:");
        for event in &report.events {
            println!("  frame {:>5} @ {:>7}ms  {}", event.frame, event.time_ms, event.event);
        }
    }
}
