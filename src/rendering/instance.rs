use std::{collections::HashMap, mem::size_of};

use glam::{Mat4, Vec4};
use wgpu::BufferUsages;

use crate::scene_graph::{MeshId, NodeKind, Scene, TextureId};

/// Per-instance vertex data. Must match `InstanceInput` in the WGSL shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceData {
    pub model: Mat4,
    pub normal: Mat4,
    pub color: Vec4,
    /// x: receives shadow, y: unlit, z: shininess.
    pub params: Vec4,
}

impl InstanceData {
    pub fn descriptor() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 10] = wgpu::vertex_attr_array![
            5 => Float32x4,
            6 => Float32x4,
            7 => Float32x4,
            8 => Float32x4,
            9 => Float32x4,
            10 => Float32x4,
            11 => Float32x4,
            12 => Float32x4,
            13 => Float32x4,
            14 => Float32x4,
        ];

        wgpu::VertexBufferLayout {
            array_stride: size_of::<InstanceData>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Everything drawn with one draw call: a mesh and the base color texture
/// bound while drawing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawKey {
    pub mesh: MeshId,
    pub texture: Option<TextureId>,
}

/// Instances of one draw key for the current frame. Shadow casters come first
/// so the shadow pass can draw `0..casters`.
#[derive(Debug, Default)]
pub struct InstanceGroup {
    pub instances: Vec<InstanceData>,
    pub casters: u32,
}

/// Collects an instance for every mesh node reachable from the scene's top
/// level, grouped by mesh and texture.
pub fn gather_instances(scene: &Scene) -> HashMap<DrawKey, InstanceGroup> {
    let mut casters: HashMap<DrawKey, Vec<InstanceData>> = HashMap::new();
    let mut others: HashMap<DrawKey, Vec<InstanceData>> = HashMap::new();

    scene.visit_visible(|_, node| {
        let NodeKind::Mesh { mesh, material } = &node.kind else {
            return;
        };
        let key = DrawKey {
            mesh: *mesh,
            texture: material.base_color_texture,
        };

        let instance = InstanceData {
            model: *node.transform.get_world_matrix(),
            normal: *node.transform.get_normal_matrix(),
            color: material.base_color,
            params: Vec4::new(
                if node.receive_shadow { 1.0 } else { 0.0 },
                if material.is_unlit() { 1.0 } else { 0.0 },
                material.shininess.max(0.0),
                0.0,
            ),
        };

        let target = if node.cast_shadow {
            &mut casters
        } else {
            &mut others
        };
        target.entry(key).or_default().push(instance);
    });

    let mut groups: HashMap<DrawKey, InstanceGroup> = HashMap::new();

    for (key, instances) in casters {
        let group = groups.entry(key).or_default();
        group.casters = instances.len() as u32;
        group.instances = instances;
    }

    for (key, instances) in others {
        groups.entry(key).or_default().instances.extend(instances);
    }

    groups
}

/// GPU side of an [`InstanceGroup`], kept across frames.
pub struct DrawBatch {
    pub instances: InstanceBuffer,
    pub casters: u32,
}

impl DrawBatch {
    pub fn new(device: &wgpu::Device, name: &str) -> Self {
        Self {
            instances: InstanceBuffer::new(device, name),
            casters: 0,
        }
    }

    pub fn clear(&mut self) {
        self.instances.clear();
        self.casters = 0;
    }
}

/// Vertex buffer for instance data that grows to fit the largest frame seen.
pub struct InstanceBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
    len: u32,
    label: String,
}

impl InstanceBuffer {
    const INITIAL_CAPACITY: u64 = 4;

    pub fn new(device: &wgpu::Device, name: &str) -> Self {
        let label = format!("Instance buffer ({})", name);
        let buffer = Self::create_buffer(device, &label, Self::INITIAL_CAPACITY);

        Self {
            buffer,
            capacity: Self::INITIAL_CAPACITY,
            len: 0,
            label,
        }
    }

    fn create_buffer(device: &wgpu::Device, label: &str, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size_of::<InstanceData>() as u64 * capacity,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, instances: &[InstanceData]) {
        let required = instances.len() as u64;

        if required > self.capacity {
            self.capacity = required.next_power_of_two();
            self.buffer = Self::create_buffer(device, &self.label, self.capacity);
            log::debug!("Grew {} to {} instances", self.label, self.capacity);
        }

        if !instances.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(instances));
        }
        self.len = instances.len() as u32;
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn bind(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(1, self.buffer.slice(..));
    }
}
