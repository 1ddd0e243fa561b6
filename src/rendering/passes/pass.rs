use wgpu::RenderPass;

use crate::rendering::render_common::RenderCommon;

pub(crate) trait Pass {
    type TextureViews<'v>;

    fn create(device: &wgpu::Device, common: &RenderCommon) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn render<'a, F>(
        &self,
        texture_views: &Self::TextureViews<'_>,
        encoder: &mut wgpu::CommandEncoder,
        render_callback: F,
    ) where
        F: FnOnce(&mut RenderPass) + 'a;
}
