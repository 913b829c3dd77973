use wgpu::util::DeviceExt;

use crate::scene::Light;

/// Lights the mesh shader evaluates; the scene keeps a key and a fill light.
pub const MAX_LIGHTS: usize = 2;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightRaw {
    position: [f32; 3],
    // Due to uniforms requiring 16 byte (4 float) spacing, we need to use a padding field here
    _padding: u32,
    color: [f32; 3],
    _padding2: u32,
}

impl From<&Light> for LightRaw {
    fn from(light: &Light) -> Self {
        Self {
            position: light.position.into(),
            _padding: 0,
            color: light.color.into(),
            _padding2: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    lights: [LightRaw; MAX_LIGHTS],
    ambient: [f32; 4],
}

impl LightUniform {
    /// Packs up to [`MAX_LIGHTS`] lights; missing slots stay black.
    pub fn new(lights: &[Light], ambient: f32) -> Self {
        let mut raw = [LightRaw::default(); MAX_LIGHTS];
        for (slot, light) in raw.iter_mut().zip(lights) {
            *slot = light.into();
        }
        if lights.len() > MAX_LIGHTS {
            log::warn!("Only the first {MAX_LIGHTS} of {} lights are shaded", lights.len());
        }
        Self {
            lights: raw,
            ambient: [ambient, ambient, ambient, 1.0],
        }
    }
}

#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, uniform: LightUniform) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("light_bind_group"),
        });
        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn write(&mut self, queue: &wgpu::Queue, uniform: LightUniform) {
        self.uniform = uniform;
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[uniform]));
    }
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("light_bind_group_layout"),
    })
}

#[cfg(test)]
mod tests {
    use cgmath::{Point3, Vector3};

    use super::*;

    #[test]
    fn uniform_matches_the_shader_layout() {
        // Two 32 byte lights followed by one vec4
        assert_eq!(std::mem::size_of::<LightUniform>(), 80);
    }

    #[test]
    fn extra_lights_are_dropped_and_missing_ones_black() {
        let light = Light {
            position: Point3::new(1.0, 2.0, 3.0),
            color: Vector3::new(1.0, 0.5, 0.25),
        };
        let one = LightUniform::new(&[light], 0.1);
        assert_eq!(one.lights[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(one.lights[1], LightRaw::default());

        let three = LightUniform::new(&[light; 3], 0.1);
        assert_eq!(three.lights[1].color, [1.0, 0.5, 0.25]);
    }
}
