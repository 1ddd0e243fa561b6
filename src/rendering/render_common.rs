use wgpu::SurfaceConfiguration;
use winit::dpi::PhysicalSize;

use crate::{
    config::RendererParams,
    rendering::{
        lights::{LightsBuffer, SHADOW_MAP_SIZE},
        texture::ShadowMap,
    },
};

/// State shared by the render passes.
pub struct RenderCommon {
    pub output_surface_config: SurfaceConfiguration,
    pub sample_count: u32,
    pub clear_color: wgpu::Color,
    pub camera_uniform_buffer: wgpu::Buffer,
    pub lights: LightsBuffer,
    pub shadow_map: ShadowMap,
}

impl RenderCommon {
    pub fn new(
        device: &wgpu::Device,
        adapter: &wgpu::Adapter,
        surface: &wgpu::Surface,
        surface_size: PhysicalSize<u32>,
        params: &RendererParams,
        camera_uniform_buffer: wgpu::Buffer,
    ) -> anyhow::Result<Self> {
        let surface_caps = surface.get_capabilities(adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Surface is not supported by the adapter"))?;

        let alpha_mode = choose_alpha_mode(&surface_caps.alpha_modes, params.alpha);

        let output_surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: surface_size.width.max(1),
            height: surface_size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(device, &output_surface_config);

        let format_flags = adapter.get_texture_format_features(surface_format).flags;
        let sample_count = if params.antialias && format_flags.sample_count_supported(4) {
            4
        } else {
            1
        };

        log::info!(
            "Surface {:?}, {:?}, {}x MSAA",
            surface_format,
            alpha_mode,
            sample_count
        );

        Ok(Self {
            output_surface_config,
            sample_count,
            clear_color: params.clear_color.to_wgpu(1.0)?,
            camera_uniform_buffer,
            lights: LightsBuffer::new(device),
            shadow_map: ShadowMap::new(device, SHADOW_MAP_SIZE),
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.output_surface_config.format
    }
}

/// Premultiplied alpha when transparency is requested and the surface
/// supports it, otherwise the surface's preferred mode.
pub fn choose_alpha_mode(
    supported: &[wgpu::CompositeAlphaMode],
    alpha: bool,
) -> wgpu::CompositeAlphaMode {
    let preferred = supported
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    if !alpha {
        return preferred;
    }

    [
        wgpu::CompositeAlphaMode::PreMultiplied,
        wgpu::CompositeAlphaMode::PostMultiplied,
    ]
    .into_iter()
    .find(|mode| supported.contains(mode))
    .unwrap_or(preferred)
}

/// Sizes of one frame: the surface always covers the window, the scene is
/// drawn at the drawing buffer size and stretched over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSizes {
    pub surface: PhysicalSize<u32>,
    pub buffer: PhysicalSize<u32>,
}

impl FrameSizes {
    pub fn for_window(inner_size: PhysicalSize<u32>, scale_factor: f64, pixel_ratio: f32) -> Self {
        Self {
            surface: PhysicalSize::new(inner_size.width.max(1), inner_size.height.max(1)),
            buffer: drawing_buffer_size(inner_size, scale_factor, pixel_ratio),
        }
    }
}

/// Drawing buffer size for a container, with `pixel_ratio` device pixels per
/// logical pixel. Never larger than the container itself.
pub fn drawing_buffer_size(
    container: PhysicalSize<u32>,
    scale_factor: f64,
    pixel_ratio: f32,
) -> PhysicalSize<u32> {
    let scale = (pixel_ratio as f64 / scale_factor.max(f64::EPSILON)).min(1.0);
    let scaled = |extent: u32| ((extent as f64 * scale).round() as u32).clamp(1, extent.max(1));

    PhysicalSize::new(scaled(container.width), scaled(container.height))
}
