use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::demo::DemoSceneKind;

pub const CONFIG_FILE: &str = "house-viewer.toml";
pub const CONFIG_ENV: &str = "HOUSE_VIEWER_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub initial_pos: [f32; 3],
    pub look_at: [f32; 3],
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            fov: 45.0,
            near: 0.1,
            far: 1000.0,
            initial_pos: [-5.0, 5.0, -10.0],
            look_at: [0.0, 0.0, 0.0],
        }
    }
}

/// A CSS-style color: a name ("lightgray"), a hex string ("#999999") or a
/// 0xRRGGBB number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ColorValue {
    Hex(u32),
    Name(String),
}

impl ColorValue {
    pub fn to_rgb(&self) -> anyhow::Result<[f32; 3]> {
        match self {
            ColorValue::Hex(value) => {
                if *value > 0xff_ffff {
                    anyhow::bail!("Color {value:#x} does not fit in 0xRRGGBB");
                }
                Ok(rgb_from_hex(*value))
            }
            ColorValue::Name(name) => parse_color_name(name),
        }
    }

    pub fn to_wgpu(&self, alpha: f64) -> anyhow::Result<wgpu::Color> {
        let [r, g, b] = self.to_rgb()?;
        Ok(wgpu::Color {
            r: srgb_to_linear(r) as f64,
            g: srgb_to_linear(g) as f64,
            b: srgb_to_linear(b) as f64,
            a: alpha,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererParams {
    pub antialias: bool,
    pub alpha: bool,
    pub clear_color: ColorValue,
    pub pixel_ratio: f32,
    pub shadows: bool,
}

impl Default for RendererParams {
    fn default() -> Self {
        Self {
            antialias: true,
            alpha: true,
            clear_color: ColorValue::Name("lightgray".to_string()),
            pixel_ratio: 1.0,
            shadows: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerParams {
    pub camera: CameraParams,
    /// Window title; the window is the display element the surface lives in.
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub renderer: RendererParams,
}

impl Default for ViewerParams {
    fn default() -> Self {
        Self {
            camera: CameraParams::default(),
            title: "House".to_string(),
            width: 1280,
            height: 720,
            renderer: RendererParams::default(),
        }
    }
}

impl ViewerParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        let camera = &self.camera;
        if !(camera.fov > 0.0 && camera.fov < 180.0) {
            anyhow::bail!("Camera fov must be in (0, 180) degrees, got {}", camera.fov);
        }
        if !(camera.near > 0.0 && camera.near < camera.far) {
            anyhow::bail!(
                "Camera clip planes must satisfy 0 < near < far, got near {} far {}",
                camera.near,
                camera.far
            );
        }
        if self.width == 0 || self.height == 0 {
            anyhow::bail!("Viewer size must be non-zero, got {}x{}", self.width, self.height);
        }
        if !(self.renderer.pixel_ratio > 0.0 && self.renderer.pixel_ratio.is_finite()) {
            anyhow::bail!("Pixel ratio must be positive, got {}", self.renderer.pixel_ratio);
        }
        self.renderer
            .clear_color
            .to_rgb()
            .context("Invalid renderer clear color")?;

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneParams {
    pub kind: DemoSceneKind,
    pub model_path: PathBuf,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            kind: DemoSceneKind::default(),
            model_path: PathBuf::from("assets/models/soccer_ball/scene.gltf"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub viewer: ViewerParams,
    pub scene: SceneParams,
}

impl AppConfig {
    pub fn from_toml_str(source: &str) -> anyhow::Result<AppConfig> {
        let config: AppConfig = toml::from_str(source).context("Failed to parse config")?;
        config.viewer.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<AppConfig> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("In config file {}", path.display()))
    }

    /// Reads the file named by `HOUSE_VIEWER_CONFIG`, else `house-viewer.toml`
    /// if it exists, else the built-in defaults.
    pub fn load() -> anyhow::Result<AppConfig> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        let default_path = Path::new(CONFIG_FILE);
        if default_path.exists() {
            return Self::from_file(default_path);
        }

        let config = AppConfig::default();
        config.viewer.validate()?;
        Ok(config)
    }
}

fn rgb_from_hex(value: u32) -> [f32; 3] {
    [
        ((value >> 16) & 0xff) as f32 / 255.0,
        ((value >> 8) & 0xff) as f32 / 255.0,
        (value & 0xff) as f32 / 255.0,
    ]
}

pub fn parse_color_name(name: &str) -> anyhow::Result<[f32; 3]> {
    let name = name.trim().to_ascii_lowercase();

    if let Some(hex) = name.strip_prefix('#') {
        let value = u32::from_str_radix(hex, 16)
            .with_context(|| format!("Invalid hex color #{hex}"))?;
        return match hex.len() {
            6 => Ok(rgb_from_hex(value)),
            3 => {
                let expand = |nibble: u32| (nibble * 17) as f32 / 255.0;
                Ok([
                    expand((value >> 8) & 0xf),
                    expand((value >> 4) & 0xf),
                    expand(value & 0xf),
                ])
            }
            _ => anyhow::bail!("Hex color #{hex} must have 3 or 6 digits"),
        };
    }

    let value = match name.as_str() {
        "black" => 0x000000,
        "white" => 0xffffff,
        "red" => 0xff0000,
        "green" => 0x008000,
        "lime" => 0x00ff00,
        "blue" => 0x0000ff,
        "yellow" => 0xffff00,
        "cyan" | "aqua" => 0x00ffff,
        "magenta" | "fuchsia" => 0xff00ff,
        "gray" | "grey" => 0x808080,
        "lightgray" | "lightgrey" => 0xd3d3d3,
        "darkgray" | "darkgrey" => 0xa9a9a9,
        "dimgray" | "dimgrey" => 0x696969,
        "silver" => 0xc0c0c0,
        "skyblue" => 0x87ceeb,
        "navy" => 0x000080,
        "orange" => 0xffa500,
        _ => anyhow::bail!("Unknown color name {name:?}"),
    };

    Ok(rgb_from_hex(value))
}

pub fn srgb_to_linear(channel: f32) -> f32 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}
