use std::sync::Arc;

use anyhow::Context;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::{config::AppConfig, demo::DemoScene, rendering::Renderer, viewer::Viewer};

struct App {
    config: AppConfig,
    demo: Option<DemoScene<Renderer>>,
}

impl App {
    fn from_config(config: AppConfig) -> Self {
        Self { config, demo: None }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let params = self.config.viewer.clone();

        let window_attributes = Window::default_attributes()
            .with_title(params.title.clone())
            .with_inner_size(LogicalSize::new(params.width, params.height));
        let window = event_loop
            .create_window(window_attributes)
            .context("Failed to create window")?;
        log::info!("Created window {:?}", window.inner_size());

        let renderer = pollster::block_on(Renderer::new(
            Arc::new(window),
            params.renderer.clone(),
        ))
        .context("Failed to create renderer")?;

        let viewer = Viewer::new(params, renderer);
        self.demo = Some(DemoScene::new(viewer, self.config.scene.clone())?);

        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(demo) = self.demo.as_mut() {
            demo.viewer.stop();
            if demo.has_pending_loads() {
                demo.cancel_loads();
            }
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.demo.is_some() {
            return;
        }

        if let Err(error) = self.init(event_loop) {
            log::error!("Failed to start viewer: {error:?}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(demo) = self.demo.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(new_size) => {
                if let Err(error) = demo.viewer.resize(new_size) {
                    log::error!("{error:?}");
                }
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let new_size = demo.viewer.surface().borrow().window.inner_size();
                if let Err(error) = demo.viewer.resize(new_size) {
                    log::error!("{error:?}");
                }
            }
            WindowEvent::RedrawRequested => {
                demo.poll_loads();

                if let Err(error) = demo.viewer.tick() {
                    match error.downcast_ref::<wgpu::SurfaceError>() {
                        Some(wgpu::SurfaceError::OutOfMemory) => {
                            log::error!("Out of memory");
                            self.shutdown(event_loop);
                        }
                        _ => log::error!("{error:?}"),
                    }
                }
            }
            other => {
                demo.viewer.handle_window_event(&other);
            }
        }
    }
}

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::from_config(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
