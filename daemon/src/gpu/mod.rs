/// GPU-accelerated rendering: an offscreen wgpu render target that gets
/// read back to the CPU and presented through a pooled `wl_shm` buffer,
/// since layer-shell surfaces have no live `wgpu::Surface` to target.
///
/// Architecture:
/// - `context`: wgpu device/queue/adapter setup
/// - `renderer`: present and cross-fade render passes
/// - `pipeline_builder`: shared render pipeline construction
/// - `texture`: texture upload, the render-target cache, and readback
pub mod context;
pub mod pipeline_builder;
pub mod renderer;
pub mod texture;

pub use context::GpuContext;
pub use renderer::Renderer;
pub use texture::{GpuTexture, TextureCache};

/// GPU rendering capabilities, logged once at startup.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub adapter_name: String,
    pub backend: String,
    pub max_texture_size: u32,
    pub supports_compute: bool,
}

impl GpuCapabilities {
    pub fn log_info(&self) {
        log::info!("GPU Capabilities:");
        log::info!("  Adapter: {}", self.adapter_name);
        log::info!("  Backend: {}", self.backend);
        log::info!(
            "  Max Texture Size: {}x{}",
            self.max_texture_size,
            self.max_texture_size
        );
        log::info!(
            "  Compute Shaders: {}",
            if self.supports_compute { "Yes" } else { "No" }
        );
    }
}
