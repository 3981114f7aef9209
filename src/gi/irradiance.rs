//! Irradiance probe grid and its cache file
//!
//! The cache is a raw native-endian dump: one [`CacheHeader`] followed by
//! `num_probes` [`ProbeRecord`]s, no version field.

use std::fs;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec2, Vec3};

use super::sh::{SphericalHarmonics, SH_COEFFICIENTS};
use crate::backend::*;
use crate::error::{RendererError, RendererResult};
use crate::pipeline::{draw_fullscreen, set_camera_uniforms, FrameContext};
use crate::shaders::ShaderId;
use crate::stats::FrameStats;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CacheHeader {
    pub num_probes: i32,
    pub dims: [f32; 3],
    pub start: [f32; 3],
    pub end: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ProbeRecord {
    pub pos: [f32; 3],
    pub local: [f32; 3],
    pub index: i32,
    pub sh: [[f32; 3]; SH_COEFFICIENTS],
}

pub const HEADER_SIZE: usize = std::mem::size_of::<CacheHeader>();
pub const RECORD_SIZE: usize = std::mem::size_of::<ProbeRecord>();

/// One lattice point of the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub pos: Vec3,
    /// Lattice coordinate
    pub local: UVec3,
    pub index: usize,
    pub sh: SphericalHarmonics,
}

/// Probes on a regular lattice between `start` and `end`
#[derive(Debug, Clone, PartialEq)]
pub struct IrradianceGrid {
    pub start: Vec3,
    pub end: Vec3,
    pub dims: UVec3,
    /// Ordered x-fastest, then y, then z
    pub probes: Vec<Probe>,
    /// Coefficients on the GPU: 9 texels per row, one row per probe
    pub texture: Option<TextureHandle>,
}

impl IrradianceGrid {
    /// Lay out an unbaked grid
    pub fn new(start: Vec3, end: Vec3, dims: UVec3) -> Self {
        let dims = dims.max(UVec3::ONE);
        let delta = (end - start) / (dims.as_vec3() - Vec3::ONE).max(Vec3::ONE);
        let mut probes = Vec::with_capacity((dims.x * dims.y * dims.z) as usize);
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let local = UVec3::new(x, y, z);
                    probes.push(Probe {
                        pos: start + delta * local.as_vec3(),
                        local,
                        index: probes.len(),
                        sh: SphericalHarmonics::default(),
                    });
                }
            }
        }
        Self {
            start,
            end,
            dims,
            probes,
            texture: None,
        }
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Spacing between neighbouring probes
    pub fn delta(&self) -> Vec3 {
        (self.end - self.start) / (self.dims.as_vec3() - Vec3::ONE).max(Vec3::ONE)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header = CacheHeader {
            num_probes: self.probes.len() as i32,
            dims: self.dims.as_vec3().to_array(),
            start: self.start.to_array(),
            end: self.end.to_array(),
        };
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.probes.len() * RECORD_SIZE);
        bytes.extend_from_slice(bytemuck::bytes_of(&header));
        for probe in &self.probes {
            let record = ProbeRecord {
                pos: probe.pos.to_array(),
                local: probe.local.as_vec3().to_array(),
                index: probe.index as i32,
                sh: probe.sh.to_array(),
            };
            bytes.extend_from_slice(bytemuck::bytes_of(&record));
        }
        bytes
    }

    /// Parse a cache, rejecting any inconsistent layout
    pub fn from_bytes(bytes: &[u8]) -> RendererResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RendererError::CacheFormat(format!(
                "expected at least {} header bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        let header: CacheHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]);
        let count = usize::try_from(header.num_probes).map_err(|_| {
            RendererError::CacheFormat(format!("negative probe count {}", header.num_probes))
        })?;
        let expected = HEADER_SIZE + count * RECORD_SIZE;
        if bytes.len() != expected {
            return Err(RendererError::CacheFormat(format!(
                "{} probes need {} bytes, got {}",
                count,
                expected,
                bytes.len()
            )));
        }
        let dims = Vec3::from(header.dims);
        if dims.min_element() < 1.0 || dims.fract() != Vec3::ZERO {
            return Err(RendererError::CacheFormat(format!("invalid grid dimensions {dims}")));
        }
        let dims = dims.as_uvec3();
        let capacity = u64::from(dims.x)
            .checked_mul(u64::from(dims.y))
            .and_then(|xy| xy.checked_mul(u64::from(dims.z)));
        if capacity != Some(count as u64) {
            return Err(RendererError::CacheFormat(format!(
                "grid {}x{}x{} does not hold {} probes",
                dims.x, dims.y, dims.z, count
            )));
        }

        let mut grid = IrradianceGrid::new(Vec3::from(header.start), Vec3::from(header.end), dims);
        for (i, chunk) in bytes[HEADER_SIZE..].chunks_exact(RECORD_SIZE).enumerate() {
            let record: ProbeRecord = bytemuck::pod_read_unaligned(chunk);
            if record.index as usize != i || record.index < 0 {
                return Err(RendererError::CacheFormat(format!(
                    "probe {} stored with index {}",
                    i, record.index
                )));
            }
            let probe = &mut grid.probes[i];
            probe.pos = Vec3::from(record.pos);
            probe.sh = SphericalHarmonics::from_array(record.sh);
        }
        Ok(grid)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> RendererResult<()> {
        fs::write(path.as_ref(), self.to_bytes())?;
        log::info!(
            "Irradiance cache written to {} ({} probes)",
            path.as_ref().display(),
            self.len()
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> RendererResult<Self> {
        let bytes = fs::read(path.as_ref())?;
        let grid = Self::from_bytes(&bytes)?;
        log::info!(
            "Irradiance cache read from {} ({} probes)",
            path.as_ref().display(),
            grid.len()
        );
        Ok(grid)
    }

    /// Coefficients as `Rgb32Float` texels, probe by probe
    pub fn coefficient_data(&self) -> Vec<f32> {
        self.probes
            .iter()
            .flat_map(|probe| probe.sh.to_array())
            .flatten()
            .collect()
    }

    /// Upload the coefficient texture, replacing any previous one
    pub fn upload(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<TextureHandle> {
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some("irradiance_probes".into()),
            width: SH_COEFFICIENTS as u32,
            height: self.probes.len() as u32,
            format: TextureFormat::Rgb32Float,
            filter: FilterMode::Nearest,
            mipmaps: false,
        })?;
        backend.write_texture(texture, bytemuck::cast_slice(&self.coefficient_data()));
        if let Some(old) = self.texture.replace(texture) {
            backend.destroy_texture(old);
        }
        Ok(texture)
    }

    /// Release the coefficient texture
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(texture) = self.texture.take() {
            backend.destroy_texture(texture);
        }
    }
}

/// Add probe lighting to the lit image
pub fn apply(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    grid: &IrradianceGrid,
    gbuffer: &Framebuffer,
    stats: &mut FrameStats,
) {
    let Some(probes_texture) = grid.texture else {
        return;
    };
    if !ctx.shaders.has(ShaderId::Irradiance) {
        return;
    }
    stats.begin_pass("irradiance");
    ctx.shaders.enable(backend, ShaderId::Irradiance);
    backend.set_pipeline_state(
        &PipelineState::fullscreen().with_blend(Some(BlendState::additive())),
    );
    set_camera_uniforms(backend, ctx.camera, ctx.time);

    let settings = &ctx.settings.irradiance;
    backend.set_uniform("u_irr_start", Uniform::Vec3(grid.start));
    backend.set_uniform("u_irr_end", Uniform::Vec3(grid.end));
    backend.set_uniform("u_irr_dims", Uniform::Vec3(grid.dims.as_vec3()));
    backend.set_uniform("u_irr_delta", Uniform::Vec3(grid.delta()));
    backend.set_uniform("u_num_probes", Uniform::Int(grid.len() as i32));
    backend.set_uniform("u_irr_multiplier", Uniform::Float(settings.multiplier));
    backend.set_uniform("u_irr_trilinear", Uniform::from(settings.trilinear));
    backend.set_uniform(
        "u_iRes",
        Uniform::Vec2(Vec2::new(1.0 / gbuffer.width as f32, 1.0 / gbuffer.height as f32)),
    );
    backend.set_texture("u_probes_texture", probes_texture, 0);
    if let Some(depth) = gbuffer.depth {
        backend.set_texture("u_depth_texture", depth, 1);
    }
    if let [albedo, normal, ..] = gbuffer.color.as_slice() {
        backend.set_texture("u_albedo_texture", *albedo, 2);
        backend.set_texture("u_normal_texture", *normal, 3);
    }
    draw_fullscreen(backend, stats);
}
