use std::path::Path;

use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec2, Vec3, Vec4};
use gltf::{buffer, image};
use itertools::izip;

use crate::scene_graph::TextureId;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coords: Vec2,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self::textured(position, normal, Vec2::ZERO)
    }

    pub fn textured(position: Vec3, normal: Vec3, tex_coords: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coords,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Triangles,
    Lines,
}

#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

impl MeshData {
    pub fn triangles(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            topology: Topology::Triangles,
        }
    }

    pub fn lines(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            topology: Topology::Lines,
        }
    }
}

/// Decoded RGBA8 image in sRGB, referenced by a material.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn from_gltf(name: impl Into<String>, data: image::Data) -> anyhow::Result<Self> {
        let pixels = match data.format {
            image::Format::R8G8B8A8 => data.pixels,
            image::Format::R8G8B8 => data
                .pixels
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
                .collect(),
            image::Format::R8 => data
                .pixels
                .iter()
                .flat_map(|&luma| [luma, luma, luma, 255])
                .collect(),
            other => anyhow::bail!("Unsupported texture format {other:?}"),
        };

        Ok(Self {
            name: name.into(),
            width: data.width,
            height: data.height,
            pixels,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub base_color: Vec4,
    /// Multiplied with `base_color` when present.
    pub base_color_texture: Option<TextureId>,
    /// Blinn-Phong exponent. Zero disables the specular term.
    pub shininess: f32,
}

impl Material {
    pub fn phong(base_color: Vec4) -> Self {
        Self {
            base_color,
            base_color_texture: None,
            shininess: 30.0,
        }
    }

    pub fn standard(base_color: Vec4) -> Self {
        Self {
            base_color,
            base_color_texture: None,
            shininess: 0.0,
        }
    }

    /// Lines and helpers ignore lighting entirely.
    pub fn unlit(base_color: Vec4) -> Self {
        Self {
            base_color,
            base_color_texture: None,
            shininess: -1.0,
        }
    }

    pub fn with_texture(self, texture: Option<TextureId>) -> Self {
        Self {
            base_color_texture: texture,
            ..self
        }
    }

    pub fn is_unlit(&self) -> bool {
        self.shininess < 0.0
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::standard(Vec4::ONE)
    }
}

/// A drawable piece of a prefab: one glTF primitive with its material.
/// `texture` indexes [`ModelPrefab::textures`].
#[derive(Debug, Clone)]
pub struct PrefabPrimitive {
    pub mesh: usize,
    pub material: Material,
    pub texture: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PrefabNode {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub primitives: Vec<PrefabPrimitive>,
    pub children: Vec<usize>,
}

/// Plain-data copy of a glTF scene, built off the main thread and instantiated
/// into a [`crate::scene_graph::Scene`] afterwards.
#[derive(Debug, Clone)]
pub struct ModelPrefab {
    pub name: String,
    pub meshes: Vec<MeshData>,
    pub textures: Vec<TextureData>,
    pub nodes: Vec<PrefabNode>,
    pub roots: Vec<usize>,
}

pub type Buffers<'a> = &'a [buffer::Data];

/// Per-import state: decoded images are moved out on first use.
struct ImportContext<'a> {
    buffers: Buffers<'a>,
    images: Vec<Option<image::Data>>,
    image_textures: Vec<Option<usize>>,
    mesh_primitives: Vec<Option<Vec<PrefabPrimitive>>>,
}

impl ModelPrefab {
    pub fn import(path: &Path) -> anyhow::Result<ModelPrefab> {
        let (document, buffers, images) = gltf::import(path)
            .with_context(|| format!("Failed to import glTF file {}", path.display()))?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Model".to_string());

        Self::from_document(name, &document, &buffers, images)
    }

    /// Imports a self-contained glTF. Images must live in buffer views, since
    /// URIs have no base directory to resolve against.
    pub fn from_slice(name: impl Into<String>, bytes: &[u8]) -> anyhow::Result<ModelPrefab> {
        let (document, buffers, images) =
            gltf::import_slice(bytes).context("Failed to import glTF from memory")?;

        Self::from_document(name.into(), &document, &buffers, images)
    }

    fn from_document(
        name: String,
        document: &gltf::Document,
        buffers: Buffers,
        images: Vec<image::Data>,
    ) -> anyhow::Result<ModelPrefab> {
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .context("No scenes in gltf")?;

        let mut prefab = ModelPrefab {
            name,
            meshes: Vec::new(),
            textures: Vec::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
        };

        // glTF meshes and images may be shared; keep one copy of each.
        let mut context = ImportContext {
            buffers,
            image_textures: vec![None; images.len()],
            images: images.into_iter().map(Some).collect(),
            mesh_primitives: vec![None; document.meshes().len()],
        };

        for node in scene.nodes() {
            let index = prefab.add_gltf_node(&node, &mut context)?;
            prefab.roots.push(index);
        }

        Ok(prefab)
    }

    fn add_gltf_node(
        &mut self,
        node: &gltf::Node,
        context: &mut ImportContext,
    ) -> anyhow::Result<usize> {
        let (translation, rotation, scale) = node.transform().decomposed();

        let mut prefab_node = PrefabNode {
            name: node.name().unwrap_or("Unnamed").to_string(),
            translation: Vec3::from(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from(scale),
            primitives: Vec::new(),
            children: Vec::new(),
        };

        if let Some(mesh) = node.mesh() {
            if context.mesh_primitives[mesh.index()].is_none() {
                let primitives = self.add_gltf_mesh(&mesh, context)?;
                context.mesh_primitives[mesh.index()] = Some(primitives);
            }
            prefab_node.primitives = context.mesh_primitives[mesh.index()]
                .clone()
                .unwrap_or_default();
        }

        let index = self.nodes.len();
        self.nodes.push(prefab_node);

        for child in node.children() {
            let child_index = self.add_gltf_node(&child, context)?;
            self.nodes[index].children.push(child_index);
        }

        Ok(index)
    }

    fn add_gltf_mesh(
        &mut self,
        mesh: &gltf::Mesh,
        context: &mut ImportContext,
    ) -> anyhow::Result<Vec<PrefabPrimitive>> {
        let buffers = context.buffers;
        let mesh_name = mesh.name().unwrap_or("Unnamed mesh");
        let mut primitives = Vec::new();

        for primitive in mesh.primitives() {
            let topology = match primitive.mode() {
                gltf::mesh::Mode::Triangles => Topology::Triangles,
                gltf::mesh::Mode::Lines => Topology::Lines,
                other => {
                    log::warn!("Skipping {mesh_name} primitive with unsupported mode {other:?}");
                    continue;
                }
            };

            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

            let positions: Vec<Vec3> = reader
                .read_positions()
                .with_context(|| format!("Primitive of {mesh_name} has no positions"))?
                .map(Vec3::from)
                .collect();

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            let normals: Vec<Vec3> = match reader.read_normals() {
                Some(normals) => normals.map(Vec3::from).collect(),
                None if topology == Topology::Triangles => {
                    compute_vertex_normals(&positions, &indices)
                }
                None => vec![Vec3::Y; positions.len()],
            };

            let tex_coords: Vec<Vec2> = match reader.read_tex_coords(0) {
                Some(tex_coords) => tex_coords.into_f32().map(Vec2::from).collect(),
                None => vec![Vec2::ZERO; positions.len()],
            };

            let vertices = izip!(positions, normals, tex_coords)
                .map(|(position, normal, tex_coords)| {
                    Vertex::textured(position, normal, tex_coords)
                })
                .collect::<Vec<Vertex>>();

            let pbr = primitive.material().pbr_metallic_roughness();
            let base_color = pbr.base_color_factor();
            let texture = pbr
                .base_color_texture()
                .and_then(|info| self.add_gltf_texture(&info, context));

            let mesh_index = self.meshes.len();
            self.meshes.push(MeshData {
                name: format!("{} (primitive {})", mesh_name, primitive.index()),
                vertices,
                indices,
                topology,
            });

            primitives.push(PrefabPrimitive {
                mesh: mesh_index,
                material: Material::standard(Vec4::from(base_color)),
                texture,
            });
        }

        if primitives.is_empty() {
            log::warn!("Mesh {mesh_name} has no drawable primitives");
        }

        Ok(primitives)
    }

    fn add_gltf_texture(
        &mut self,
        info: &gltf::texture::Info,
        context: &mut ImportContext,
    ) -> Option<usize> {
        if info.tex_coord() != 0 {
            log::warn!("Texture coordinate set {} is not supported", info.tex_coord());
        }

        let source = info.texture().source();
        let image_index = source.index();

        if let Some(texture) = context.image_textures.get(image_index).copied().flatten() {
            return Some(texture);
        }

        let data = context.images.get_mut(image_index)?.take()?;
        let name = source.name().unwrap_or("Unnamed texture");

        match TextureData::from_gltf(name, data) {
            Ok(texture) => {
                let texture_index = self.textures.len();
                self.textures.push(texture);
                context.image_textures[image_index] = Some(texture_index);
                Some(texture_index)
            }
            Err(error) => {
                log::warn!("Skipping texture {name}: {error}");
                None
            }
        }
    }

    pub fn mesh_node_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| !node.primitives.is_empty())
            .count()
    }
}

/// Area-weighted smooth normals for meshes that ship without them.
pub fn compute_vertex_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }

    normals
        .into_iter()
        .map(|normal| normal.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A single triangle in one node named "Triangle", nested under a "Root" node
    /// translated by (0, 1, 0). Buffer holds 3 positions then 3 u16 indices.
    pub(crate) const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "Root", "translation": [0.0, 1.0, 0.0], "children": [1] },
            { "name": "Triangle", "mesh": 0 }
        ],
        "meshes": [{
            "name": "Triangle",
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
        }],
        "materials": [{
            "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.5, 0.25, 1.0] }
        }],
        "buffers": [{
            "byteLength": 44,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;

    /// The triangle again, with UVs and a 1x1 red PNG as its base color texture.
    /// The image is a data URI, so it only resolves through [`ModelPrefab::import`].
    pub(crate) const TEXTURED_TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Triangle", "mesh": 0 }],
        "meshes": [{
            "name": "Triangle",
            "primitives": [{
                "attributes": { "POSITION": 0, "TEXCOORD_0": 2 },
                "indices": 1,
                "material": 0
            }]
        }],
        "materials": [{
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 1.0, 1.0, 0.5],
                "baseColorTexture": { "index": 0 }
            }
        }],
        "textures": [{ "source": 0 }],
        "images": [{
            "name": "Red",
            "uri": "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR4nGP4z8DwHwAFAAH/iZk9HQAAAABJRU5ErkJggg=="
        }],
        "buffers": [{
            "byteLength": 68,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAAAAAAAAAAAAAAAgD8AAAAAAAAAAAAAgD8="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 },
            { "buffer": 0, "byteOffset": 44, "byteLength": 24 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" },
            { "bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC2" }
        ]
    }"#;

    pub(crate) fn import_textured_triangle() -> ModelPrefab {
        let path = std::env::temp_dir().join(format!(
            "house-viewer-textured-{}-{:?}.gltf",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&path, TEXTURED_TRIANGLE_GLTF).unwrap();
        let prefab = ModelPrefab::import(&path);
        std::fs::remove_file(&path).ok();
        prefab.unwrap()
    }

    #[test]
    fn imports_node_tree_from_gltf() {
        let prefab = ModelPrefab::from_slice("triangle", TRIANGLE_GLTF.as_bytes()).unwrap();

        assert_eq!(prefab.roots, vec![0]);
        assert_eq!(prefab.nodes.len(), 2);
        assert_eq!(prefab.nodes[0].name, "Root");
        assert_eq!(prefab.nodes[0].children, vec![1]);
        assert_eq!(prefab.nodes[0].translation, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(prefab.mesh_node_count(), 1);

        let mesh = &prefab.meshes[prefab.nodes[1].primitives[0].mesh];
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.topology, Topology::Triangles);
    }

    #[test]
    fn missing_normals_are_generated() {
        let prefab = ModelPrefab::from_slice("triangle", TRIANGLE_GLTF.as_bytes()).unwrap();
        let mesh = &prefab.meshes[0];

        for vertex in &mesh.vertices {
            assert!(vertex.normal.abs_diff_eq(Vec3::Z, 1e-5));
        }
    }

    #[test]
    fn reads_base_color_factor() {
        let prefab = ModelPrefab::from_slice("triangle", TRIANGLE_GLTF.as_bytes()).unwrap();
        let material = prefab.nodes[1].primitives[0].material;

        assert_eq!(material.base_color, Vec4::new(1.0, 0.5, 0.25, 1.0));
    }

    #[test]
    fn textured_primitive_keeps_its_base_color_texture() {
        let prefab = import_textured_triangle();
        let primitive = &prefab.nodes[0].primitives[0];

        assert_eq!(primitive.texture, Some(0));
        assert_eq!(primitive.material.base_color, Vec4::new(1.0, 1.0, 1.0, 0.5));

        let texture = &prefab.textures[0];
        assert_eq!(texture.name, "Red");
        assert_eq!((texture.width, texture.height), (1, 1));
        assert_eq!(texture.pixels, vec![255, 0, 0, 255]);

        let tex_coords: Vec<Vec2> = prefab.meshes[0]
            .vertices
            .iter()
            .map(|vertex| vertex.tex_coords)
            .collect();
        assert_eq!(tex_coords, vec![Vec2::ZERO, Vec2::X, Vec2::Y]);
    }

    #[test]
    fn untextured_primitive_has_no_texture() {
        let prefab = ModelPrefab::from_slice("triangle", TRIANGLE_GLTF.as_bytes()).unwrap();

        assert!(prefab.textures.is_empty());
        assert_eq!(prefab.nodes[1].primitives[0].texture, None);
        assert!(prefab.meshes[0]
            .vertices
            .iter()
            .all(|vertex| vertex.tex_coords == Vec2::ZERO));
    }

    #[test]
    fn rgb_images_are_expanded_to_rgba() {
        let data = image::Data {
            pixels: vec![1, 2, 3, 4, 5, 6],
            format: image::Format::R8G8B8,
            width: 2,
            height: 1,
        };

        let texture = TextureData::from_gltf("rgb", data).unwrap();
        assert_eq!(texture.pixels, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn bundled_soccer_ball_is_textured() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join(crate::config::SceneParams::default().model_path);
        let prefab = ModelPrefab::import(&path).unwrap();

        assert_eq!(prefab.mesh_node_count(), 1);
        assert_eq!(prefab.textures.len(), 1);
        assert_eq!(prefab.nodes[0].primitives[0].texture, Some(0));
        assert_eq!(prefab.meshes[0].topology, Topology::Triangles);
    }

    #[test]
    fn invalid_gltf_is_an_error() {
        assert!(ModelPrefab::from_slice("broken", b"{ not gltf").is_err());
    }
}
