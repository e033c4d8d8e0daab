//! Headless GPU context.
//!
//! Owns the wgpu device, the offscreen render targets matching the output
//! geometry, and the readback path that turns a rendered target back into
//! a packed RGB24 frame. Frames cross the CPU/GPU boundary as RGBA because
//! no 24-bit texture format exists; the conversion lives here.

use std::sync::mpsc;

use tracing::info;

use crate::error::{RenderError, RenderResult};

/// Offscreen GPU state for one render run.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
    readback: wgpu::Buffer,
    rgba_scratch: Vec<u8>,
}

impl GpuContext {
    /// Bring up a headless device on the best available adapter.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| RenderError::gpu("no suitable GPU adapter found"))?;

        let info = adapter.get_info();
        info!(adapter = %info.name, backend = ?info.backend, "GPU adapter selected");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("vlog-render device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::gpu(format!("failed to acquire GPU device: {e}")))?;

        let padded_bytes_per_row = padded_bytes_per_row(width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame readback"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            device,
            queue,
            width,
            height,
            padded_bytes_per_row,
            readback,
            rgba_scratch: vec![0u8; width as usize * height as usize * 4],
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    /// Sampled texture fed from the CPU (decoded frames, overlays).
    pub fn create_source_texture(&self, label: &str) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: self.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        })
    }

    /// Render target that later passes can sample and the CPU can read back.
    pub fn create_target_texture(&self, label: &str) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: self.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Upload a packed RGB24 frame into a source texture.
    pub fn upload_rgb(&mut self, texture: &wgpu::Texture, rgb: &[u8]) {
        rgb_to_rgba(rgb, &mut self.rgba_scratch);
        self.write_texture(texture, &self.rgba_scratch);
    }

    /// Upload a full-frame RGBA raster into a source texture.
    pub fn upload_rgba(&self, texture: &wgpu::Texture, rgba: &[u8]) {
        self.write_texture(texture, rgba);
    }

    fn write_texture(&self, texture: &wgpu::Texture, rgba: &[u8]) {
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
    }

    /// Queue a copy of the finished target into the readback buffer.
    pub fn copy_to_readback(&self, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture) {
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            self.extent(),
        );
    }

    /// Map the readback buffer and return the frame as packed RGB24.
    ///
    /// Must follow a submitted `copy_to_readback`.
    pub fn read_frame_rgb(&self) -> RenderResult<Vec<u8>> {
        let slice = self.readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| RenderError::gpu("readback mapping callback dropped"))?
            .map_err(|e| RenderError::gpu(format!("readback mapping failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let rgb = padded_rgba_to_rgb(&mapped, self.padded_bytes_per_row, self.width, self.height);
        drop(mapped);
        self.readback.unmap();
        Ok(rgb)
    }
}

/// Bytes per readback row, aligned for buffer copies.
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Expand packed RGB24 into an opaque RGBA buffer.
fn rgb_to_rgba(rgb: &[u8], rgba: &mut [u8]) {
    debug_assert_eq!(rgb.len() / 3 * 4, rgba.len());
    for (src, dst) in rgb.chunks_exact(3).zip(rgba.chunks_exact_mut(4)) {
        dst[0] = src[0];
        dst[1] = src[1];
        dst[2] = src[2];
        dst[3] = 255;
    }
}

/// Strip row padding and the alpha channel from a mapped readback buffer.
fn padded_rgba_to_rgb(padded: &[u8], padded_bytes_per_row: u32, width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for row in 0..height as usize {
        let start = row * padded_bytes_per_row as usize;
        let row_data = &padded[start..start + width as usize * 4];
        for px in row_data.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_padding_honors_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1920), 7680); // already aligned
        assert_eq!(padded_bytes_per_row(100), 512); // 400 -> 512
        assert_eq!(padded_bytes_per_row(64), 256);
    }

    #[test]
    fn rgb_rgba_round_trip() {
        let rgb: Vec<u8> = (0..2 * 2 * 3).map(|i| i as u8).collect();
        let mut rgba = vec![0u8; 2 * 2 * 4];
        rgb_to_rgba(&rgb, &mut rgba);
        assert_eq!(&rgba[..4], &[0, 1, 2, 255]);

        // pack rows into a padded buffer and convert back
        let padded_bpr = 256;
        let mut padded = vec![0u8; padded_bpr * 2];
        padded[..8].copy_from_slice(&rgba[..8]);
        padded[padded_bpr..padded_bpr + 8].copy_from_slice(&rgba[8..16]);
        let back = padded_rgba_to_rgb(&padded, padded_bpr as u32, 2, 2);
        assert_eq!(back, rgb);
    }
}
