use glam::{Mat4, Vec3, Vec4};
use wgpu::util::DeviceExt;

use crate::scene_graph::{Light, NodeKind, Scene};

pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
pub const SHADOW_MAP_SIZE: u32 = 2048;

/// Marks "no shadow-casting light" in `LightsUniform::counts.y`.
const NO_SHADOW_LIGHT: u32 = u32::MAX;

const SHADOW_EXTENT: f32 = 5.0;
const SHADOW_NEAR: f32 = 0.5;
const SHADOW_FAR: f32 = 500.0;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirectionalLightData {
    /// Direction the light travels in, world space.
    pub direction: Vec4,
    /// Color premultiplied by intensity.
    pub color: Vec4,
}

/// This should match `Lights` in the WGSL shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightsUniform {
    pub ambient: Vec4,
    pub directional: [DirectionalLightData; MAX_DIRECTIONAL_LIGHTS],
    pub light_view_proj: Mat4,
    /// x: directional light count, y: index of the shadow-casting light.
    pub counts: [u32; 4],
}

impl Default for LightsUniform {
    fn default() -> Self {
        Self {
            ambient: Vec4::ZERO,
            directional: [DirectionalLightData::default(); MAX_DIRECTIONAL_LIGHTS],
            light_view_proj: Mat4::IDENTITY,
            counts: [0, NO_SHADOW_LIGHT, 0, 0],
        }
    }
}

impl LightsUniform {
    /// Sums the reachable ambient lights and takes the first
    /// [`MAX_DIRECTIONAL_LIGHTS`] directional ones. The first directional light
    /// that casts a shadow gets the shadow map when `shadows` is on.
    pub fn gather(scene: &Scene, shadows: bool) -> Self {
        let mut uniform = LightsUniform::default();
        let mut count = 0usize;
        let mut skipped = 0usize;

        scene.visit_visible(|_, node| {
            let NodeKind::Light(light) = &node.kind else {
                return;
            };

            match *light {
                Light::Ambient { color, intensity } => {
                    uniform.ambient += (color * intensity).truncate().extend(0.0);
                }
                Light::Directional {
                    color,
                    intensity,
                    target,
                } => {
                    if count == MAX_DIRECTIONAL_LIGHTS {
                        skipped += 1;
                        return;
                    }

                    let position = node.transform.get_world_matrix().w_axis.truncate();
                    let direction = (target - position).normalize_or(Vec3::NEG_Y);

                    uniform.directional[count] = DirectionalLightData {
                        direction: direction.extend(0.0),
                        color: (color * intensity).truncate().extend(1.0),
                    };

                    if shadows && node.cast_shadow && uniform.counts[1] == NO_SHADOW_LIGHT {
                        uniform.counts[1] = count as u32;
                        uniform.light_view_proj = shadow_view_proj(position, target);
                    }

                    count += 1;
                }
            }
        });

        if skipped > 0 {
            log::warn!("Ignoring {skipped} directional lights beyond {MAX_DIRECTIONAL_LIGHTS}");
        }

        uniform.counts[0] = count as u32;
        uniform
    }

    pub fn has_shadow_light(&self) -> bool {
        self.counts[1] != NO_SHADOW_LIGHT
    }
}

/// Orthographic light-space matrix covering a 10x10 box around the target.
pub fn shadow_view_proj(position: Vec3, target: Vec3) -> Mat4 {
    let direction = (target - position).normalize_or(Vec3::NEG_Y);
    let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };

    let view = Mat4::look_at_rh(position, target, up);
    let projection = Mat4::orthographic_rh(
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        SHADOW_NEAR,
        SHADOW_FAR,
    );

    projection * view
}

pub struct LightsBuffer {
    buffer: wgpu::Buffer,
}

impl LightsBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lights uniform buffer"),
            contents: bytemuck::cast_slice(&[LightsUniform::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self { buffer }
    }

    pub fn update(&self, queue: &wgpu::Queue, lights: &LightsUniform) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[*lights]));
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}
