use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use wgpu::CommandEncoderDescriptor;
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    camera::{CameraUniform, PerspectiveCamera},
    config::RendererParams,
    model::Topology,
    rendering::{
        instance::{gather_instances, DrawBatch, DrawKey},
        lights::LightsUniform,
        passes::{
            pass::Pass,
            scene_pass::{ScenePass, SceneTextureViews},
            shadow_pass::{ShadowPass, ShadowTextureViews},
            upscale_pass::{UpscalePass, UpscaleTextureViews},
        },
        render_common::{FrameSizes, RenderCommon},
        render_mesh::RenderMesh,
        texture::{RenderTarget, Texture},
    },
    scene_graph::{MeshId, Scene, TextureId},
    viewer::RenderSurface,
};

/// A base color texture with the bind group the scene pass samples it through.
struct RenderMaterial {
    _texture: Texture,
    bind_group: wgpu::BindGroup,
}

impl RenderMaterial {
    fn new(device: &wgpu::Device, scene_pass: &ScenePass, texture: Texture, name: &str) -> Self {
        let bind_group =
            scene_pass.create_material_bind_group(device, &texture, &format!("Material ({name})"));

        Self {
            _texture: texture,
            bind_group,
        }
    }
}

pub struct Renderer {
    pub window: Arc<Window>,
    sizes: FrameSizes,
    params: RendererParams,

    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,

    common: RenderCommon,
    depth_texture: RenderTarget,
    msaa_texture: Option<RenderTarget>,
    scene_color: RenderTarget,
    camera_uniform: CameraUniform,
    meshes: HashMap<MeshId, RenderMesh>,
    batches: HashMap<DrawKey, DrawBatch>,
    materials: HashMap<TextureId, RenderMaterial>,
    default_material: RenderMaterial,

    shadow_pass: ShadowPass,
    scene_pass: ScenePass,
    upscale_pass: UpscalePass,
}

impl Renderer {
    pub async fn new(window: Arc<Window>, params: RendererParams) -> anyhow::Result<Renderer> {
        let sizes = FrameSizes::for_window(
            window.inner_size(),
            window.scale_factor(),
            params.pixel_ratio,
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable graphics adapter")?;

        log::info!("Using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to create device")?;

        let camera_uniform = CameraUniform::default();
        let common = RenderCommon::new(
            &device,
            &adapter,
            &surface,
            sizes.surface,
            &params,
            camera_uniform.create_buffer(&device),
        )?;

        let depth_texture =
            RenderTarget::depth(&device, sizes.buffer, common.sample_count, "Depth Texture");
        let msaa_texture = Self::create_msaa_texture(&device, &common, sizes.buffer);
        let scene_color =
            RenderTarget::sampled(&device, sizes.buffer, common.format(), "Scene color texture");

        let shadow_pass = ShadowPass::create(&device, &common)?;
        let scene_pass = ScenePass::create(&device, &common)?;
        let mut upscale_pass = UpscalePass::create(&device, &common)?;
        upscale_pass.set_source(&device, scene_color.view());

        let default_material =
            RenderMaterial::new(&device, &scene_pass, Texture::white(&device, &queue), "default");

        log::info!(
            "Surface {}x{}, drawing buffer {}x{}",
            sizes.surface.width,
            sizes.surface.height,
            sizes.buffer.width,
            sizes.buffer.height
        );

        Ok(Self {
            window,
            sizes,
            params,
            surface,
            device,
            queue,
            common,
            depth_texture,
            msaa_texture,
            scene_color,
            camera_uniform,
            meshes: HashMap::new(),
            batches: HashMap::new(),
            materials: HashMap::new(),
            default_material,
            shadow_pass,
            scene_pass,
            upscale_pass,
        })
    }

    fn create_msaa_texture(
        device: &wgpu::Device,
        common: &RenderCommon,
        size: PhysicalSize<u32>,
    ) -> Option<RenderTarget> {
        (common.sample_count > 1).then(|| {
            RenderTarget::new(
                device,
                size,
                common.format(),
                common.sample_count,
                "MSAA color texture",
            )
        })
    }

    fn reconfigure(&mut self) {
        self.surface
            .configure(&self.device, &self.common.output_surface_config);
    }

    fn upload_meshes(&mut self, scene: &Scene) {
        for (mesh_id, mesh) in scene.meshes.iter() {
            if self.meshes.contains_key(&mesh_id) {
                continue;
            }

            log::debug!(
                "Uploading mesh {} ({} vertices, {} indices)",
                mesh.name,
                mesh.vertices.len(),
                mesh.indices.len()
            );
            self.meshes
                .insert(mesh_id, RenderMesh::from_mesh(&self.device, mesh));
        }
    }

    fn upload_textures(&mut self, scene: &Scene) {
        for (texture_id, data) in scene.textures.iter() {
            if self.materials.contains_key(&texture_id) {
                continue;
            }

            log::debug!(
                "Uploading texture {} ({}x{})",
                data.name,
                data.width,
                data.height
            );
            let texture = Texture::from_data(&self.device, &self.queue, data);
            self.materials.insert(
                texture_id,
                RenderMaterial::new(&self.device, &self.scene_pass, texture, &data.name),
            );
        }
    }

    fn prepare_instances(&mut self, scene: &Scene) {
        let mut groups = gather_instances(scene);

        for key in groups.keys() {
            if !self.batches.contains_key(key) {
                let name = scene
                    .meshes
                    .get(key.mesh)
                    .map_or("unnamed", |mesh| mesh.name.as_str());
                self.batches
                    .insert(*key, DrawBatch::new(&self.device, name));
            }
        }

        for (key, batch) in self.batches.iter_mut() {
            let Some(group) = groups.remove(key) else {
                batch.clear();
                continue;
            };

            batch
                .instances
                .write(&self.device, &self.queue, &group.instances);
            // Lines never cast shadows.
            batch.casters = match self.meshes.get(&key.mesh).map(|mesh| mesh.topology) {
                Some(Topology::Triangles) => group.casters,
                _ => 0,
            };
        }
    }

    fn material(&self, texture: Option<TextureId>) -> &wgpu::BindGroup {
        texture
            .and_then(|texture_id| self.materials.get(&texture_id))
            .map_or(&self.default_material.bind_group, |material| {
                &material.bind_group
            })
    }

    fn batches_of(
        &self,
        topology: Topology,
    ) -> impl Iterator<Item = (&RenderMesh, &DrawKey, &DrawBatch)> {
        self.batches.iter().filter_map(move |(key, batch)| {
            let render_mesh = self.meshes.get(&key.mesh)?;
            (render_mesh.topology == topology && batch.instances.len() > 0)
                .then_some((render_mesh, key, batch))
        })
    }
}

impl RenderSurface for Renderer {
    /// The drawing buffer size, which the camera aspect follows.
    fn size(&self) -> PhysicalSize<u32> {
        self.sizes.buffer
    }

    fn resize(&mut self, container: PhysicalSize<u32>) {
        if container.width == 0 || container.height == 0 {
            return;
        }

        let sizes =
            FrameSizes::for_window(container, self.window.scale_factor(), self.params.pixel_ratio);

        self.sizes = sizes;
        self.common.output_surface_config.width = sizes.surface.width;
        self.common.output_surface_config.height = sizes.surface.height;
        self.reconfigure();

        self.depth_texture.resize(&self.device, sizes.buffer);
        if let Some(msaa_texture) = self.msaa_texture.as_mut() {
            msaa_texture.resize(&self.device, sizes.buffer);
        }
        self.scene_color.resize(&self.device, sizes.buffer);
        self.upscale_pass
            .set_source(&self.device, self.scene_color.view());
    }

    fn request_frame(&self) {
        self.window.request_redraw();
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> anyhow::Result<()> {
        self.upload_meshes(scene);
        self.upload_textures(scene);
        self.prepare_instances(scene);

        let lights = LightsUniform::gather(scene, self.params.shadows);
        self.common.lights.update(&self.queue, &lights);

        self.camera_uniform.update(camera);
        self.camera_uniform
            .update_buffer(&self.queue, &self.common.camera_uniform_buffer);

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Timeout");
                return Ok(());
            }
            Err(other) => return Err(other.into()),
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        if lights.has_shadow_light() {
            self.shadow_pass.render(
                &ShadowTextureViews {
                    depth: self.common.shadow_map.view(),
                },
                &mut encoder,
                |render_pass| {
                    for (render_mesh, _, batch) in self.batches_of(Topology::Triangles) {
                        render_mesh.draw(render_pass, &batch.instances, 0..batch.casters);
                    }
                },
            );
        }

        let (color, resolve_target) = match &self.msaa_texture {
            Some(msaa_texture) => (msaa_texture.view(), Some(self.scene_color.view())),
            None => (self.scene_color.view(), None),
        };

        self.scene_pass.render(
            &SceneTextureViews {
                color,
                resolve_target,
                depth: self.depth_texture.view(),
            },
            &mut encoder,
            |render_pass| {
                for (render_mesh, key, batch) in self.batches_of(Topology::Triangles) {
                    render_pass.set_bind_group(2, self.material(key.texture), &[]);
                    render_mesh.draw(render_pass, &batch.instances, 0..batch.instances.len());
                }

                let mut lines = self.batches_of(Topology::Lines).peekable();
                if lines.peek().is_some() {
                    render_pass.set_pipeline(self.scene_pass.line_pipeline());
                    for (render_mesh, key, batch) in lines {
                        render_pass.set_bind_group(2, self.material(key.texture), &[]);
                        render_mesh.draw(render_pass, &batch.instances, 0..batch.instances.len());
                    }
                }
            },
        );

        self.upscale_pass.render(
            &UpscaleTextureViews { output: &view },
            &mut encoder,
            |render_pass| render_pass.draw(0..3, 0..1),
        );

        self.queue.submit([encoder.finish()]);
        output.present();

        Ok(())
    }
}
