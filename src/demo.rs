use glam::{Quat, Vec3, Vec4};
use serde::Deserialize;

use crate::{
    asset_loader::{AssetLoader, LoadHandle, LoadOutcome},
    config::{srgb_to_linear, SceneParams},
    geometry,
    model::{Material, ModelPrefab},
    orbit_controls::OrbitControls,
    scene_graph::{Light, Node, NodeId},
    viewer::{RenderSurface, Viewer},
};

/// Which demo composition to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoSceneKind {
    /// Loaded glTF model spinning above the floor.
    #[default]
    SoccerBall,
    /// Box house with a pyramid roof and window panels.
    House,
    /// Cube circling the origin with a sphere chasing it.
    OrbitingCube,
}

/// Where to attach a window panel. Nothing is attached without a parent.
#[derive(Debug, Clone, Copy)]
pub struct WindowPlacement {
    pub position: Vec3,
    /// XYZ Euler angles in radians.
    pub rotation: Vec3,
    pub parent: Option<NodeId>,
}

/// Populates a viewer's scene and registers the demo behaviours.
pub struct DemoScene<S: RenderSurface> {
    pub viewer: Viewer<S>,
    params: SceneParams,
    loader: AssetLoader,
    pending_loads: Vec<LoadHandle>,

    /// Parent of the roof and windows.
    foundation: Option<NodeId>,
    /// Pulled towards the cube every frame.
    sphere: Option<NodeId>,
}

impl<S: RenderSurface + 'static> DemoScene<S> {
    pub fn new(viewer: Viewer<S>, params: SceneParams) -> anyhow::Result<Self> {
        let mut demo = Self {
            viewer,
            params,
            loader: AssetLoader::new()?,
            pending_loads: Vec::new(),
            foundation: None,
            sphere: None,
        };

        demo.init();
        Ok(demo)
    }

    fn init(&mut self) {
        log::info!("Building {:?} scene", self.params.kind);

        self.add_light();
        self.add_orbit_camera();
        self.add_floor();

        match self.params.kind {
            DemoSceneKind::SoccerBall => self.add_model(),
            DemoSceneKind::House => self.add_home(),
            DemoSceneKind::OrbitingCube => {
                self.add_grid();
                self.add_sphere();
                self.add_cube();
            }
        }
    }

    pub fn add_light(&mut self) {
        let Some(scene) = self.viewer.scene_mut() else {
            return;
        };

        let mut directional = Node::light(
            "Directional light",
            Light::Directional {
                color: Vec4::ONE,
                intensity: 1.0,
                target: Vec3::ZERO,
            },
        )
        .with_translation(Vec3::new(20.0, 20.0, 10.0));
        directional.cast_shadow = true;
        scene.spawn(directional);

        let ambient = Node::light(
            "Ambient light",
            Light::Ambient {
                color: Vec4::ONE,
                intensity: 0.2,
            },
        );
        scene.spawn(ambient);
    }

    pub fn add_orbit_camera(&mut self) {
        let Some(camera) = self.viewer.camera() else {
            return;
        };

        let mut controls = OrbitControls::new(camera, self.viewer.input());

        self.viewer.add_update("orbit_controls", move |_, camera| {
            controls.update(camera);
            Ok(())
        });
    }

    pub fn add_floor(&mut self) {
        let Some(scene) = self.viewer.scene_mut() else {
            return;
        };

        let mesh = scene.add_mesh(geometry::box_mesh(20.0, 0.01, 20.0));
        let mut floor = Node::mesh("Floor", mesh, Material::standard(srgb(0x999999)))
            .with_translation(Vec3::new(0.0, -0.5, 0.0));
        floor.receive_shadow = true;
        scene.spawn(floor);
    }

    /// Starts loading the configured model. Setup continues without waiting;
    /// [`DemoScene::poll_loads`] finishes the job once the file is imported.
    pub fn add_model(&mut self) {
        let handle = self.loader.load(&self.params.model_path);
        self.pending_loads.push(handle);
    }

    /// Applies finished model loads. Called once per frame.
    pub fn poll_loads(&mut self) {
        for event in self.loader.poll() {
            match event.outcome {
                LoadOutcome::Loaded(prefab) => {
                    log::info!(
                        "Loaded model {} (load {}) with {} meshes",
                        event.path.display(),
                        event.id,
                        prefab.mesh_node_count()
                    );
                    self.on_model_loaded(&prefab);
                }
                LoadOutcome::Failed(error) => {
                    log::error!("Failed to load model {}: {error:?}", event.path.display());
                }
            }
        }

        self.pending_loads.retain(|handle| !handle.is_finished());
    }

    pub fn has_pending_loads(&self) -> bool {
        !self.pending_loads.is_empty()
    }

    pub fn cancel_loads(&mut self) {
        for handle in self.pending_loads.drain(..) {
            self.loader.cancel(&handle);
        }
    }

    pub fn on_model_loaded(&mut self, prefab: &ModelPrefab) -> Option<NodeId> {
        let scene = self.viewer.scene_mut()?;

        let model = scene.instantiate(prefab);
        scene.set_node_translation(model, Vec3::new(0.0, 0.6, 0.0));
        scene.traverse(model, |_, node| {
            if node.is_mesh() {
                node.cast_shadow = true;
            }
        });
        scene.add(model);

        self.viewer.add_update("model_rotation", move |scene, _| {
            scene.rotate_node(model, Quat::from_rotation_x(0.05));
            Ok(())
        });

        Some(model)
    }

    pub fn add_home(&mut self) {
        self.add_foundation();
        self.add_roof();

        let parent = self.foundation;
        let half_pi = 1.57;
        for (position, rotation) in [
            (Vec3::new(0.0, 0.0, 0.5), Vec3::ZERO),
            (Vec3::new(0.5, 0.0, 0.0), Vec3::new(0.0, half_pi, 0.0)),
            (Vec3::new(-0.5, 0.0, 0.0), Vec3::new(0.0, -half_pi, 0.0)),
            (Vec3::new(0.0, 0.0, -0.5), Vec3::ZERO),
        ] {
            self.add_window(WindowPlacement {
                position,
                rotation,
                parent,
            });
        }
    }

    pub fn add_foundation(&mut self) {
        let Some(scene) = self.viewer.scene_mut() else {
            return;
        };

        let mesh = scene.add_mesh(geometry::box_mesh(1.0, 1.0, 1.0));
        let foundation = scene.add_node(
            Node::mesh("Foundation", mesh, Material::phong(srgb(0xffde70)))
                .with_translation(Vec3::new(0.0, 0.0, -5.0)),
        );
        scene.set_node_euler(foundation, Vec3::new(0.2, 0.0, 0.0));
        scene.add(foundation);
        self.foundation = Some(foundation);

        self.viewer.add_update("rotation", move |scene, _| {
            scene.rotate_node(foundation, Quat::from_rotation_y(0.02));
            Ok(())
        });
    }

    pub fn add_roof(&mut self) {
        let Some(scene) = self.viewer.scene_mut() else {
            return;
        };

        let mesh = scene.add_mesh(geometry::cone_mesh(1.0, 0.7, 4));
        let roof = scene.add_node(
            Node::mesh("Roof", mesh, Material::phong(srgb(0xbd1307)))
                .with_translation(Vec3::new(0.0, 0.7, 0.0)),
        );
        scene.set_node_euler(roof, Vec3::new(0.0, 2.35, 0.0));

        if let Some(foundation) = self.foundation {
            scene.add_child(foundation, roof);
        }
    }

    pub fn add_window(&mut self, placement: WindowPlacement) -> Option<NodeId> {
        let parent = placement.parent?;
        let scene = self.viewer.scene_mut()?;

        let mesh = scene.add_mesh(geometry::box_mesh(0.4, 0.4, 0.01));
        let window = scene.add_node(
            Node::mesh("Window", mesh, Material::phong(srgb(0x0caedf)))
                .with_translation(placement.position),
        );
        scene.set_node_euler(window, placement.rotation);
        scene.add_child(parent, window);

        Some(window)
    }

    pub fn add_grid(&mut self) {
        let Some(scene) = self.viewer.scene_mut() else {
            return;
        };

        let mesh = scene.add_mesh(geometry::grid_mesh(10.0, 10));
        scene.spawn(Node::mesh("Grid", mesh, Material::unlit(srgb(0x888888))));
    }

    pub fn add_sphere(&mut self) {
        let Some(scene) = self.viewer.scene_mut() else {
            return;
        };

        let mesh = scene.add_mesh(geometry::sphere_mesh(0.5, 100, 100));
        let sphere = Node::mesh("Sphere", mesh, Material::phong(srgb(0x15aca4)))
            .with_translation(Vec3::new(-2.5, 0.0, 3.5));
        self.sphere = Some(scene.spawn(sphere));
    }

    /// The cube circles the origin; a sphere added earlier is pulled towards it.
    pub fn add_cube(&mut self) {
        let Some(scene) = self.viewer.scene_mut() else {
            return;
        };

        let mesh = scene.add_mesh(geometry::box_mesh(1.0, 1.0, 1.0));
        let mut cube = Node::mesh("Cube", mesh, Material::phong(srgb(0x641111)))
            .with_translation(Vec3::new(0.5, 0.0, 0.5));
        cube.cast_shadow = true;
        let cube = scene.spawn(cube);

        let sphere = self.sphere;
        self.viewer.add_update("attract", move |scene, _| {
            let Some(sphere) = sphere else {
                return Ok(());
            };
            if let (Some(cube_position), Some(sphere_position)) =
                (scene.node_translation(cube), scene.node_translation(sphere))
            {
                let step = (cube_position - sphere_position).normalize_or_zero() * 0.04;
                scene.translate_node(sphere, step);
            }
            Ok(())
        });

        let mut angle = 0.0f32;
        self.viewer.add_update("orbit", move |scene, _| {
            angle += 0.05;
            if let Some(position) = scene.node_translation(cube) {
                let position = Vec3::new(2.0 * angle.sin(), position.y, 2.0 * angle.cos());
                scene.set_node_translation(cube, position);
                scene.rotate_node(cube, Quat::from_rotation_y(0.03));
            }
            Ok(())
        });
    }
}

/// sRGB hex color to a linear RGBA material color.
fn srgb(hex: u32) -> Vec4 {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    Vec4::new(channel(16), channel(8), channel(0), 1.0)
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use glam::Vec2;
    use winit::event::MouseButton;

    use super::*;
    use crate::{
        model::tests::TRIANGLE_GLTF,
        scene_graph::Scene,
        viewer::tests::{test_viewer, RecordingSurface},
    };

    fn demo(kind: DemoSceneKind, model_path: PathBuf) -> DemoScene<RecordingSurface> {
        DemoScene::new(test_viewer(), SceneParams { kind, model_path }).unwrap()
    }

    fn wait_for_loads(demo: &mut DemoScene<RecordingSurface>) {
        for _ in 0..500 {
            demo.poll_loads();
            if !demo.has_pending_loads() {
                // A finished task may have sent its outcome after the last poll.
                demo.poll_loads();
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("model load did not finish");
    }

    fn triangle_prefab() -> ModelPrefab {
        ModelPrefab::from_slice("triangle", TRIANGLE_GLTF.as_bytes()).unwrap()
    }

    fn find(scene: &Scene, name: &str) -> NodeId {
        scene
            .nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(id, _)| id)
            .unwrap_or_else(|| panic!("no node named {name}"))
    }

    #[test]
    fn soccer_ball_scene_adds_lights_floor_and_orbit() {
        let demo = demo(DemoSceneKind::SoccerBall, PathBuf::from("missing.gltf"));
        let scene = demo.viewer.scene().unwrap();

        assert_eq!(scene.top_level().len(), 3);
        assert!(demo.viewer.has_update("orbit_controls"));

        let floor = scene.get_node(find(scene, "Floor")).unwrap();
        assert!(floor.receive_shadow);
        assert_eq!(floor.transform.translation(), Vec3::new(0.0, -0.5, 0.0));

        let light = scene.get_node(find(scene, "Directional light")).unwrap();
        assert!(light.cast_shadow);
        assert_eq!(light.transform.translation(), Vec3::new(20.0, 20.0, 10.0));
    }

    #[test]
    fn loaded_model_adds_one_top_level_node_casting_shadows() {
        let mut demo = demo(DemoSceneKind::SoccerBall, PathBuf::from("missing.gltf"));
        demo.cancel_loads();
        let before = demo.viewer.scene().unwrap().top_level().len();

        let model = demo.on_model_loaded(&triangle_prefab()).unwrap();

        let scene = demo.viewer.scene_mut().unwrap();
        assert_eq!(scene.top_level().len(), before + 1);
        assert_eq!(scene.top_level().last(), Some(&model));
        assert_eq!(scene.node_translation(model), Some(Vec3::new(0.0, 0.6, 0.0)));

        let mut meshes = 0;
        scene.traverse(model, |_, node| {
            if node.is_mesh() {
                meshes += 1;
                assert!(node.cast_shadow);
            }
        });
        assert_eq!(meshes, 1);
        assert!(demo.viewer.has_update("model_rotation"));
        assert!(demo.viewer.has_update("orbit_controls"));
    }

    #[test]
    fn loaded_model_spins_every_frame() {
        let mut demo = demo(DemoSceneKind::SoccerBall, PathBuf::from("missing.gltf"));
        demo.cancel_loads();
        let model = demo.on_model_loaded(&triangle_prefab()).unwrap();

        for _ in 0..4 {
            demo.viewer.tick().unwrap();
        }

        let rotation = demo.viewer.scene().unwrap().get_node(model).unwrap().transform.rotation();
        let (axis, angle) = rotation.to_axis_angle();
        assert!(axis.abs_diff_eq(Vec3::X, 1e-4));
        assert!((angle - 0.2).abs() < 1e-4);
    }

    #[test]
    fn model_file_is_loaded_asynchronously() {
        let path = std::env::temp_dir().join(format!("house-viewer-demo-{}.gltf", std::process::id()));
        std::fs::write(&path, TRIANGLE_GLTF).unwrap();

        let mut demo = demo(DemoSceneKind::SoccerBall, path.clone());
        wait_for_loads(&mut demo);

        assert!(demo.viewer.has_update("model_rotation"));
        let scene = demo.viewer.scene().unwrap();
        assert_eq!(scene.top_level().len(), 4);
        let name = path.file_stem().unwrap().to_string_lossy().into_owned();
        assert_eq!(scene.top_level().last(), Some(&find(scene, &name)));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn failed_load_leaves_scene_without_model() {
        let mut demo = demo(DemoSceneKind::SoccerBall, PathBuf::from("no/such/model.gltf"));
        wait_for_loads(&mut demo);

        assert_eq!(demo.viewer.scene().unwrap().top_level().len(), 3);
        assert!(!demo.viewer.has_update("model_rotation"));
    }

    #[test]
    fn house_has_roof_and_four_windows_on_foundation() {
        let demo = demo(DemoSceneKind::House, PathBuf::new());
        let scene = demo.viewer.scene().unwrap();

        let foundation = scene.get_node(find(scene, "Foundation")).unwrap();
        assert_eq!(foundation.child_ids.len(), 5);
        assert_eq!(foundation.child_ids[0], find(scene, "Roof"));
        assert_eq!(scene.top_level().len(), 4);
        assert!(demo.viewer.has_update("rotation"));
        assert!(!demo.has_pending_loads());
    }

    #[test]
    fn window_without_parent_is_not_added() {
        let mut demo = demo(DemoSceneKind::House, PathBuf::new());
        let nodes = demo.viewer.scene().unwrap().nodes.len();

        let window = demo.add_window(WindowPlacement {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            parent: None,
        });

        assert!(window.is_none());
        assert_eq!(demo.viewer.scene().unwrap().nodes.len(), nodes);
    }

    #[test]
    fn cube_orbits_and_sphere_follows() {
        let mut demo = demo(DemoSceneKind::OrbitingCube, PathBuf::new());
        let scene = demo.viewer.scene().unwrap();
        let (cube, sphere) = (find(scene, "Cube"), find(scene, "Sphere"));
        let start = Vec3::new(-2.5, 0.0, 3.5);

        demo.viewer.tick().unwrap();

        let scene = demo.viewer.scene().unwrap();
        let sphere_position = scene.node_translation(sphere).unwrap();
        assert!(((sphere_position - start).length() - 0.04).abs() < 1e-5);
        assert!((sphere_position - start)
            .normalize()
            .abs_diff_eq((Vec3::new(0.5, 0.0, 0.5) - start).normalize(), 1e-5));

        let cube_position = scene.node_translation(cube).unwrap();
        assert!(cube_position.abs_diff_eq(
            Vec3::new(2.0 * 0.05f32.sin(), 0.0, 2.0 * 0.05f32.cos()),
            1e-5
        ));
        assert!(scene.top_level().contains(&find(scene, "Grid")));
    }

    #[test]
    fn pointer_drag_orbits_camera_on_next_tick() {
        let mut demo = demo(DemoSceneKind::House, PathBuf::new());
        let start = demo.viewer.camera().unwrap().position;

        {
            let input = demo.viewer.input();
            let mut input = input.borrow_mut();
            input.move_cursor(Vec2::ZERO);
            input.set_button(MouseButton::Left, true);
            input.move_cursor(Vec2::new(100.0, 0.0));
        }
        demo.viewer.tick().unwrap();

        let moved = demo.viewer.camera().unwrap().position;
        assert!(!moved.abs_diff_eq(start, 1e-3));
        assert!((moved.length() - start.length()).abs() < 1e-3);
        assert!((moved.y - start.y).abs() < 1e-3);

        // The drag was consumed by the first tick.
        demo.viewer.tick().unwrap();
        assert!(demo.viewer.camera().unwrap().position.abs_diff_eq(moved, 1e-4));
    }

    #[test]
    fn wheel_zooms_camera_through_the_update_loop() {
        let mut demo = demo(DemoSceneKind::House, PathBuf::new());
        let start = demo.viewer.camera().unwrap().position;

        demo.viewer.input().borrow_mut().scroll(2.0);
        demo.viewer.tick().unwrap();

        let camera = demo.viewer.camera().unwrap();
        assert!((camera.position.length() - start.length() * 0.95f32.powi(2)).abs() < 1e-3);
        assert!(camera.forward().abs_diff_eq(-camera.position.normalize(), 1e-4));
    }
}
