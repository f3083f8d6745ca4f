//! Scene validation command

use anyhow::{Context, Result};

pub fn run(scene_path: &str) -> Result<()> {
    let config = super::load_scene(scene_path)?;
    let scene = config
        .build()
        .with_context(|| format!("Failed to build scene {}", scene_path))?;
    let system = &scene.system;

    println!("Scene {} is valid", scene_path);
    println!(
        "  {} emitter(s), {} affector(s), {} painter(s)",
        scene.emitters.len(),
        scene.affectors.len(),
        scene.painters.len()
    );
    if !system.is_running() {
        println!("  starts stopped");
    } else if system.is_paused() {
        println!("  starts paused");
    }

    println!();
    println!("Groups:");
    for group in system.groups() {
        let name = if group.name().is_empty() {
            "(default)"
        } else {
            group.name()
        };
        print!("  {:<16} capacity {}", name, group.size());
        if let Some(decl) = config.groups.iter().find(|g| g.name == group.name()) {
            if decl.duration_ms >= 0 {
                print!("  lasts {}ms", decl.duration_ms);
                if decl.duration_variation_ms > 0 {
                    print!(" ±{}ms", decl.duration_variation_ms);
                }
            }
            if !decl.to.is_empty() {
                let targets: Vec<String> = decl
                    .to
                    .iter()
                    .map(|(target, weight)| format!("{target} ({weight})"))
                    .collect();
                print!("  -> {}", targets.join(", "));
            }
        }
        println!();
    }
    println!();
    println!("Total capacity: {}", system.particle_count());
    Ok(())
}
