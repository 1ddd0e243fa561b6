mod registry;

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use anyhow::Context;
use winit::{dpi::PhysicalSize, event::WindowEvent};

use crate::{
    camera::PerspectiveCamera, config::ViewerParams, input::PointerInput, scene_graph::Scene,
};

pub use registry::Registry;

pub type SceneCallback = Box<dyn FnMut(&mut Scene, &mut PerspectiveCamera) -> anyhow::Result<()>>;

/// Where frames end up. Implemented by the wgpu renderer; tests use a recording fake.
pub trait RenderSurface {
    /// Current drawing-buffer size in physical pixels.
    fn size(&self) -> PhysicalSize<u32>;

    /// Resizes the drawing buffer to fit a container of the given size.
    fn resize(&mut self, container: PhysicalSize<u32>);

    /// Asks the host to schedule another frame.
    fn request_frame(&self);

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    /// Stopped, or camera or scene missing. No further frame was requested.
    Inert,
}

/// Owns the render surface, camera and scene, and dispatches the registered
/// per-frame and resize callbacks.
pub struct Viewer<S: RenderSurface> {
    scene: Option<Scene>,
    camera: Option<PerspectiveCamera>,
    surface: Rc<RefCell<S>>,
    container_size: Rc<Cell<PhysicalSize<u32>>>,
    input: Rc<RefCell<PointerInput>>,
    update_callbacks: Registry<SceneCallback>,
    resize_callbacks: Registry<SceneCallback>,
    running: bool,
    frames_rendered: u64,
}

impl<S: RenderSurface + 'static> Viewer<S> {
    pub fn new(params: ViewerParams, surface: S) -> Self {
        let size = surface.size();
        let aspect = size.width as f32 / size.height.max(1) as f32;
        let camera = PerspectiveCamera::from_params(&params.camera, aspect);

        let mut viewer = Self {
            scene: Some(Scene::new()),
            camera: Some(camera),
            surface: Rc::new(RefCell::new(surface)),
            container_size: Rc::new(Cell::new(size)),
            input: Rc::new(RefCell::new(PointerInput::new())),
            update_callbacks: Registry::new(),
            resize_callbacks: Registry::new(),
            running: false,
            frames_rendered: 0,
        };

        let surface = viewer.surface.clone();
        let container_size = viewer.container_size.clone();
        viewer.add_resize("resize_renderer", move |_, _| {
            surface.borrow_mut().resize(container_size.get());
            Ok(())
        });

        let surface = viewer.surface.clone();
        viewer.add_resize("resize_camera", move |_, camera| {
            let size = surface.borrow().size();
            camera.set_aspect(size.width as f32 / size.height.max(1) as f32);
            Ok(())
        });

        viewer.start();
        viewer
    }

    pub fn start(&mut self) {
        self.running = true;
        self.surface.borrow().request_frame();
    }

    pub fn stop(&mut self) {
        if self.running {
            log::info!(
                "Viewer stopped after {} frames with {} update callbacks",
                self.frames_rendered,
                self.update_callbacks.len()
            );
            log::debug!(
                "Update callbacks: {:?}",
                self.update_callbacks.keys().collect::<Vec<_>>()
            );
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn add_update<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: FnMut(&mut Scene, &mut PerspectiveCamera) -> anyhow::Result<()> + 'static,
    {
        let name = name.into();
        if self
            .update_callbacks
            .insert(name.clone(), Box::new(callback))
            .is_some()
        {
            log::debug!("Replaced update callback {name:?}");
        }
    }

    pub fn remove_update(&mut self, name: &str) {
        if self.update_callbacks.remove(name).is_some() {
            log::debug!("Removed update callback {name:?}");
        }
    }

    pub fn add_resize<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: FnMut(&mut Scene, &mut PerspectiveCamera) -> anyhow::Result<()> + 'static,
    {
        let name = name.into();
        if self
            .resize_callbacks
            .insert(name.clone(), Box::new(callback))
            .is_some()
        {
            log::debug!("Replaced resize callback {name:?}");
        }
    }

    pub fn remove_resize(&mut self, name: &str) {
        if self.resize_callbacks.remove(name).is_some() {
            log::debug!("Removed resize callback {name:?}");
        }
    }

    pub fn has_update(&self, name: &str) -> bool {
        self.update_callbacks.contains(name)
    }

    #[allow(dead_code)]
    pub fn has_resize(&self, name: &str) -> bool {
        self.resize_callbacks.contains(name)
    }

    /// One iteration of the render loop. The next frame is requested before any
    /// callback runs, so a failing callback does not stop the loop.
    pub fn tick(&mut self) -> anyhow::Result<FrameStatus> {
        if !self.running {
            return Ok(FrameStatus::Inert);
        }

        let (Some(scene), Some(camera)) = (self.scene.as_mut(), self.camera.as_mut()) else {
            return Ok(FrameStatus::Inert);
        };

        self.surface.borrow().request_frame();

        dispatch(&mut self.update_callbacks, scene, camera).context("Frame update failed")?;
        scene.late_update();

        self.surface.borrow_mut().render(scene, camera)?;
        self.frames_rendered += 1;

        Ok(FrameStatus::Rendered)
    }

    /// Handles a container resize, then runs the resize callbacks.
    pub fn resize(&mut self, container: PhysicalSize<u32>) -> anyhow::Result<()> {
        self.container_size.set(container);

        let (Some(scene), Some(camera)) = (self.scene.as_mut(), self.camera.as_mut()) else {
            return Ok(());
        };

        dispatch(&mut self.resize_callbacks, scene, camera).context("Resize handling failed")
    }

    /// Feeds pointer events to the shared input state. Returns true if consumed.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        self.input.borrow_mut().handle_window_event(event)
    }

    pub fn input(&self) -> Rc<RefCell<PointerInput>> {
        self.input.clone()
    }

    pub fn surface(&self) -> Rc<RefCell<S>> {
        self.surface.clone()
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    #[allow(dead_code)]
    pub fn set_scene(&mut self, scene: Scene) {
        self.scene = Some(scene);
    }

    #[allow(dead_code)]
    pub fn take_scene(&mut self) -> Option<Scene> {
        self.scene.take()
    }

    pub fn camera(&self) -> Option<&PerspectiveCamera> {
        self.camera.as_ref()
    }

    #[allow(dead_code)]
    pub fn camera_mut(&mut self) -> Option<&mut PerspectiveCamera> {
        self.camera.as_mut()
    }

    #[allow(dead_code)]
    pub fn set_camera(&mut self, camera: PerspectiveCamera) {
        self.camera = Some(camera);
    }

    #[allow(dead_code)]
    pub fn take_camera(&mut self) -> Option<PerspectiveCamera> {
        self.camera.take()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

/// Runs callbacks in registry order; the first error aborts the rest.
fn dispatch(
    callbacks: &mut Registry<SceneCallback>,
    scene: &mut Scene,
    camera: &mut PerspectiveCamera,
) -> anyhow::Result<()> {
    for (name, callback) in callbacks.iter_mut() {
        callback(&mut *scene, &mut *camera).with_context(|| format!("Callback {name:?} failed"))?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;

    use glam::Vec3;
    use proptest::prelude::*;

    use super::*;

    /// Surface that records what the viewer asked of it.
    #[derive(Default)]
    pub(crate) struct RecordingSurface {
        pub size: PhysicalSize<u32>,
        pub frame_requests: Cell<u32>,
        pub renders: u32,
        pub resizes: Vec<PhysicalSize<u32>>,
    }

    impl RecordingSurface {
        pub(crate) fn new(width: u32, height: u32) -> Self {
            Self {
                size: PhysicalSize::new(width, height),
                ..Default::default()
            }
        }
    }

    impl RenderSurface for RecordingSurface {
        fn size(&self) -> PhysicalSize<u32> {
            self.size
        }

        fn resize(&mut self, container: PhysicalSize<u32>) {
            self.resizes.push(container);
            if container.width > 0 && container.height > 0 {
                self.size = container;
            }
        }

        fn request_frame(&self) {
            self.frame_requests.set(self.frame_requests.get() + 1);
        }

        fn render(&mut self, _scene: &Scene, _camera: &PerspectiveCamera) -> anyhow::Result<()> {
            self.renders += 1;
            Ok(())
        }
    }

    pub(crate) fn test_viewer() -> Viewer<RecordingSurface> {
        Viewer::new(ViewerParams::default(), RecordingSurface::new(1600, 900))
    }

    fn log_calls(viewer: &mut Viewer<RecordingSurface>, names: &[String]) -> Rc<RefCell<Vec<String>>> {
        let calls = Rc::new(RefCell::new(Vec::new()));
        for name in names {
            let calls = calls.clone();
            let label = name.clone();
            viewer.add_update(name.clone(), move |_, _| {
                calls.borrow_mut().push(label.clone());
                Ok(())
            });
        }
        calls
    }

    #[test]
    fn construction_places_camera_and_starts_loop() {
        let viewer = test_viewer();
        let camera = viewer.camera().unwrap();

        assert_eq!(camera.position, Vec3::new(-5.0, 5.0, -10.0));
        assert_eq!(camera.target, Vec3::ZERO);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
        assert!(viewer.is_running());
        assert_eq!(viewer.surface().borrow().frame_requests.get(), 1);
        assert!(viewer.has_resize("resize_renderer"));
        assert!(viewer.has_resize("resize_camera"));
    }

    #[test]
    fn replaced_callback_is_never_invoked_again() {
        let mut viewer = test_viewer();
        let old_calls = Rc::new(Cell::new(0));
        let new_calls = Rc::new(Cell::new(0));

        let counter = old_calls.clone();
        viewer.add_update("spin", move |_, _| {
            counter.set(counter.get() + 1);
            Ok(())
        });
        viewer.tick().unwrap();

        let counter = new_calls.clone();
        viewer.add_update("spin", move |_, _| {
            counter.set(counter.get() + 1);
            Ok(())
        });
        viewer.tick().unwrap();
        viewer.tick().unwrap();

        assert_eq!(old_calls.get(), 1);
        assert_eq!(new_calls.get(), 2);
    }

    #[test]
    fn removing_unknown_callbacks_is_a_no_op() {
        let mut viewer = test_viewer();
        viewer.remove_update("missing");
        viewer.remove_resize("missing");

        assert!(viewer.has_resize("resize_camera"));
        assert_eq!(viewer.tick().unwrap(), FrameStatus::Rendered);
    }

    #[test]
    fn removed_callback_stops_running() {
        let mut viewer = test_viewer();
        let calls = log_calls(&mut viewer, &["a".to_string()]);

        viewer.tick().unwrap();
        viewer.remove_update("a");
        viewer.tick().unwrap();

        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn resize_runs_every_callback_once_with_current_state() {
        let mut viewer = test_viewer();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for name in ["first", "second"] {
            let seen = seen.clone();
            viewer.add_resize(name, move |scene, camera| {
                seen.borrow_mut()
                    .push((name, scene.top_level().len(), camera.position));
                Ok(())
            });
        }

        viewer.scene_mut().unwrap().spawn(crate::scene_graph::Node::group("marker"));
        viewer.resize(PhysicalSize::new(800, 800)).unwrap();

        let position = Vec3::new(-5.0, 5.0, -10.0);
        assert_eq!(
            *seen.borrow(),
            vec![("first", 1, position), ("second", 1, position)]
        );
    }

    #[test]
    fn builtin_resize_updates_surface_and_aspect() {
        let mut viewer = test_viewer();
        viewer.resize(PhysicalSize::new(1000, 500)).unwrap();

        let surface = viewer.surface();
        assert_eq!(surface.borrow().resizes, vec![PhysicalSize::new(1000, 500)]);
        assert_eq!(surface.borrow().size, PhysicalSize::new(1000, 500));
        assert!((viewer.camera().unwrap().aspect - 2.0).abs() < 1e-6);
    }

    #[test]
    fn loop_keeps_requesting_frames_until_camera_is_cleared() {
        let mut viewer = test_viewer();

        for _ in 0..5 {
            assert_eq!(viewer.tick().unwrap(), FrameStatus::Rendered);
        }
        assert_eq!(viewer.surface().borrow().frame_requests.get(), 6);
        assert_eq!(viewer.surface().borrow().renders, 5);

        let camera = viewer.take_camera().unwrap();
        assert_eq!(viewer.tick().unwrap(), FrameStatus::Inert);
        assert_eq!(viewer.surface().borrow().frame_requests.get(), 6);
        assert_eq!(viewer.surface().borrow().renders, 5);

        viewer.set_camera(camera);
        assert_eq!(viewer.tick().unwrap(), FrameStatus::Rendered);
    }

    #[test]
    fn clearing_scene_or_stopping_makes_loop_inert() {
        let mut viewer = test_viewer();
        let scene = viewer.take_scene().unwrap();
        assert_eq!(viewer.tick().unwrap(), FrameStatus::Inert);
        assert!(viewer.resize(PhysicalSize::new(10, 10)).is_ok());
        assert!(viewer.surface().borrow().resizes.is_empty());

        viewer.set_scene(scene);
        viewer.stop();
        assert_eq!(viewer.tick().unwrap(), FrameStatus::Inert);
        assert_eq!(viewer.frames_rendered(), 0);
    }

    #[test]
    fn failing_callback_aborts_the_rest_of_the_tick_only() {
        let mut viewer = test_viewer();
        let calls = Rc::new(Cell::new(0));

        viewer.add_update("fails", |_, _| anyhow::bail!("boom"));
        let counter = calls.clone();
        viewer.add_update("after", move |_, _| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        assert!(viewer.tick().is_err());
        assert_eq!(calls.get(), 0);
        assert_eq!(viewer.surface().borrow().renders, 0);
        assert_eq!(viewer.surface().borrow().frame_requests.get(), 2);

        viewer.remove_update("fails");
        assert_eq!(viewer.tick().unwrap(), FrameStatus::Rendered);
        assert_eq!(calls.get(), 1);
    }

    proptest! {
        #[test]
        fn next_frame_invokes_exactly_the_registered_set(
            names in prop::collection::hash_set("[a-z]{1,8}", 0..16)
        ) {
            let mut viewer = test_viewer();
            let names: Vec<String> = names.into_iter().collect();
            let calls = log_calls(&mut viewer, &names);

            viewer.tick().unwrap();

            let invoked: HashSet<String> = calls.borrow().iter().cloned().collect();
            prop_assert_eq!(calls.borrow().len(), names.len());
            prop_assert_eq!(invoked, names.into_iter().collect::<HashSet<_>>());
        }
    }
}
