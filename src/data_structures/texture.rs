//! GPU textures.
//!
//! [`Texture`] wraps a wgpu texture with its view and sampler. Colour textures
//! are created from a decoded [`TextureResource`] together with the sampler
//! settings the parser attached to the material; depth textures back the
//! render pass.

use image::{RgbaImage, imageops::FilterType};

use crate::resources::texture::{ColorSpace, FilterMode, SamplerConfig, TextureResource, WrapMode};

/// A GPU texture with a view and optional sampler.
#[derive(Clone, Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            sampler: None,
        }
    }

    /**
     * Uploads a decoded texture. With `generate_mipmaps` the full mip chain is
     * built on the CPU and written level by level, which also works on WebGL2
     * where render-to-mip blits aren't available.
     */
    pub fn from_resource(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        resource: &TextureResource,
        sampler: &SamplerConfig,
    ) -> Self {
        let max_dimension = device.limits().max_texture_dimension_2d;
        let fitted = fit_within(&resource.image, max_dimension);
        if let Some(smaller) = &fitted {
            let (width, height) = resource.dimensions();
            log::warn!(
                "Texture {} is {width}x{height}, more than this device allows ({max_dimension}); uploading it at {}x{}",
                resource.key,
                smaller.width(),
                smaller.height()
            );
        }
        let image = fitted.as_ref().unwrap_or(&resource.image);

        let levels = if sampler.generate_mipmaps {
            mip_chain(image)
        } else {
            vec![image.clone()]
        };
        let (width, height) = image.dimensions();
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let format = match sampler.color_space {
            ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&resource.key),
            size,
            mip_level_count: levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, img) in levels.iter().enumerate() {
            let (w, h) = img.dimensions();
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                },
                img.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * w),
                    rows_per_image: Some(h),
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = Some(create_sampler(device, sampler));
        Self {
            texture,
            view,
            sampler,
        }
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

/// A copy scaled down so neither side exceeds `max_dimension`, keeping the
/// aspect ratio. `None` when the image already fits.
pub fn fit_within(image: &RgbaImage, max_dimension: u32) -> Option<RgbaImage> {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if longest <= max_dimension || max_dimension == 0 {
        return None;
    }
    let shrink = |side: u32| ((side as u64 * max_dimension as u64 / longest as u64) as u32).max(1);
    Some(image::imageops::resize(
        image,
        shrink(width),
        shrink(height),
        FilterType::Triangle,
    ))
}

/// Number of mip levels down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// The image followed by successively halved copies, down to 1x1.
pub fn mip_chain(image: &RgbaImage) -> Vec<RgbaImage> {
    let (width, height) = image.dimensions();
    let count = mip_level_count(width, height);
    let mut levels = Vec::with_capacity(count as usize);
    levels.push(image.clone());
    for level in 1..count {
        let w = (width >> level).max(1);
        let h = (height >> level).max(1);
        let Some(previous) = levels.last() else {
            break;
        };
        let next = image::imageops::resize(previous, w, h, FilterType::Triangle);
        levels.push(next);
    }
    levels
}

fn address_mode(mode: WrapMode) -> wgpu::AddressMode {
    match mode {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

pub fn create_sampler(device: &wgpu::Device, config: &SamplerConfig) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: address_mode(config.wrap_u),
        address_mode_v: address_mode(config.wrap_v),
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: filter_mode(config.mag_filter),
        min_filter: filter_mode(config.min_filter),
        mipmap_filter: filter_mode(config.mipmap_filter),
        ..Default::default()
    })
}

/// Bind group layout of a material: base colour texture and its sampler.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("material_bind_group_layout"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels_reach_one_texel() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(300, 20), 9);
    }

    #[test]
    fn mip_chain_halves_each_level() {
        let image = RgbaImage::from_pixel(8, 2, image::Rgba([200, 100, 50, 255]));
        let chain = mip_chain(&image);
        let sizes: Vec<_> = chain.iter().map(|level| level.dimensions()).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
        assert_eq!(chain[3].get_pixel(0, 0), &image::Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn oversized_images_shrink_to_the_device_limit() {
        let image = RgbaImage::from_pixel(4096, 1024, image::Rgba([10, 20, 30, 255]));
        let fitted = fit_within(&image, 2048).expect("too wide for the limit");
        assert_eq!(fitted.dimensions(), (2048, 512));
        assert_eq!(fitted.get_pixel(100, 100), &image::Rgba([10, 20, 30, 255]));

        let tall = RgbaImage::new(3, 5000);
        assert_eq!(fit_within(&tall, 1000).map(|i| i.dimensions()), Some((1, 1000)));
    }

    #[test]
    fn images_within_the_limit_are_left_alone() {
        let image = RgbaImage::new(2048, 2048);
        assert!(fit_within(&image, 2048).is_none());
        assert!(fit_within(&image, 8192).is_none());
    }
}
