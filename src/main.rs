use anyhow::Result;

mod asset_loader;
mod camera;
mod config;
mod demo;
mod geometry;
mod input;
mod model;
mod orbit_controls;
mod rendering;
mod scene_graph;
mod viewer;
mod window;

fn main() -> Result<()> {
    pretty_env_logger::init();

    let config = config::AppConfig::load()?;

    pollster::block_on(window::run(config))?;

    Ok(())
}
