//! Intermediate render targets
//!
//! Each target is created on first use and sized from the viewport (or an
//! absolute size). A resize marks the registry dirty; at the start of the
//! next frame every viewport-relative target is destroyed, and the next
//! [`RenderTargets::ensure`] recreates it at the new size before it is bound.

use std::collections::HashMap;

use crate::backend::*;

/// Describes texture dimensions that can be relative to screen size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Absolute size in pixels
    Absolute { width: u32, height: u32 },
    /// Relative to screen size (1.0 = full screen)
    Relative { width_scale: f32, height_scale: f32 },
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::Relative {
            width_scale: 1.0,
            height_scale: 1.0,
        }
    }
}

impl TextureSize {
    pub fn scaled(scale: f32) -> Self {
        TextureSize::Relative {
            width_scale: scale,
            height_scale: scale,
        }
    }

    pub fn resolve(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        match self {
            TextureSize::Absolute { width, height } => (*width, *height),
            TextureSize::Relative {
                width_scale,
                height_scale,
            } => (
                (((screen_width as f32) * width_scale) as u32).max(1),
                (((screen_height as f32) * height_scale) as u32).max(1),
            ),
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, TextureSize::Relative { .. })
    }
}

/// Every intermediate target the pipelines render into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Albedo, normal, extra + depth
    GBuffer,
    /// Pre-decal copies of depth, normal and extra
    DecalClone,
    Ssao,
    SsaoBlur,
    ForwardHdr,
    /// Resolve target; renders against the G-buffer depth
    DeferredHdr,
    Volumetric,
    Ssr,
    PostA,
    PostB,
    /// Level `n` of the bloom chain, at 1/2^(n+1) resolution
    BloomMip(u8),
    /// Blur partner of `BloomMip(n)`
    BloomScratch(u8),
    PlanarReflection,
    IrradianceCapture,
}

impl TargetKind {
    pub fn label(&self) -> String {
        match self {
            TargetKind::BloomMip(level) => format!("bloom_mip_{level}"),
            TargetKind::BloomScratch(level) => format!("bloom_scratch_{level}"),
            other => format!("{other:?}"),
        }
    }

    /// Size, formats and depth of this target
    pub fn layout(&self, capture_size: u32) -> TargetLayout {
        let hdr = TextureFormat::Rgba16Float;
        match self {
            TargetKind::GBuffer => TargetLayout::new(
                TextureSize::default(),
                vec![
                    TextureFormat::Rgba8Unorm,
                    TextureFormat::Rgba16Float,
                    TextureFormat::Rgba8Unorm,
                ],
                TargetDepth::Owned,
            ),
            TargetKind::DecalClone => TargetLayout::new(
                TextureSize::default(),
                vec![TextureFormat::Rgba16Float, TextureFormat::Rgba8Unorm],
                TargetDepth::Owned,
            ),
            TargetKind::Ssao | TargetKind::SsaoBlur => {
                TargetLayout::new(
                    TextureSize::default(),
                    vec![TextureFormat::R8Unorm],
                    TargetDepth::None,
                )
            }
            TargetKind::ForwardHdr => {
                TargetLayout::new(TextureSize::default(), vec![hdr], TargetDepth::Owned)
            }
            TargetKind::DeferredHdr => TargetLayout::new(
                TextureSize::default(),
                vec![hdr],
                TargetDepth::SharedWith(TargetKind::GBuffer),
            ),
            TargetKind::Volumetric => {
                TargetLayout::new(TextureSize::scaled(0.5), vec![hdr], TargetDepth::None)
            }
            TargetKind::Ssr | TargetKind::PostA | TargetKind::PostB => {
                TargetLayout::new(TextureSize::default(), vec![hdr], TargetDepth::None)
            }
            TargetKind::BloomMip(level) | TargetKind::BloomScratch(level) => TargetLayout::new(
                TextureSize::scaled(1.0 / (2u32 << *level) as f32),
                vec![hdr],
                TargetDepth::None,
            ),
            TargetKind::PlanarReflection => {
                TargetLayout::new(TextureSize::scaled(0.5), vec![hdr], TargetDepth::Owned)
            }
            TargetKind::IrradianceCapture => TargetLayout::new(
                TextureSize::Absolute {
                    width: capture_size,
                    height: capture_size,
                },
                vec![TextureFormat::Rgba32Float],
                TargetDepth::Owned,
            ),
        }
    }
}

/// Depth attachment of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDepth {
    None,
    Owned,
    SharedWith(TargetKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetLayout {
    pub size: TextureSize,
    pub color_formats: Vec<TextureFormat>,
    pub depth: TargetDepth,
}

impl TargetLayout {
    fn new(size: TextureSize, color_formats: Vec<TextureFormat>, depth: TargetDepth) -> Self {
        Self {
            size,
            color_formats,
            depth,
        }
    }
}

/// Lazily created intermediate targets
#[derive(Debug)]
pub struct RenderTargets {
    targets: HashMap<TargetKind, Framebuffer>,
    width: u32,
    height: u32,
    capture_size: u32,
    resize_pending: bool,
}

impl RenderTargets {
    pub fn new(width: u32, height: u32, capture_size: u32) -> Self {
        Self {
            targets: HashMap::new(),
            width,
            height,
            capture_size,
            resize_pending: false,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Record a viewport change; applied by [`RenderTargets::apply_resize`]
    pub fn on_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.resize_pending = true;
        }
    }

    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Destroy every viewport-relative target if a resize happened
    pub fn apply_resize(&mut self, backend: &mut dyn GraphicsBackend) {
        if !self.resize_pending {
            return;
        }
        self.resize_pending = false;
        let capture_size = self.capture_size;
        let stale: Vec<TargetKind> = self
            .targets
            .keys()
            .copied()
            .filter(|kind| kind.layout(capture_size).size.is_relative())
            .collect();
        // Destroy targets sharing a depth before the owner of that depth
        let (sharing, owning): (Vec<_>, Vec<_>) = stale.into_iter().partition(|kind| {
            matches!(kind.layout(capture_size).depth, TargetDepth::SharedWith(_))
        });
        for kind in sharing.into_iter().chain(owning) {
            if let Some(framebuffer) = self.targets.remove(&kind) {
                backend.destroy_framebuffer(&framebuffer);
            }
        }
        log::debug!("Render targets invalidated for {}x{}", self.width, self.height);
    }

    pub fn get(&self, kind: TargetKind) -> Option<&Framebuffer> {
        self.targets.get(&kind)
    }

    /// Return the target, creating it at the current size if needed
    pub fn ensure(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        kind: TargetKind,
    ) -> BackendResult<Framebuffer> {
        if let Some(framebuffer) = self.targets.get(&kind) {
            return Ok(framebuffer.clone());
        }
        let layout = kind.layout(self.capture_size);
        let depth = match layout.depth {
            TargetDepth::None => DepthAttachment::None,
            TargetDepth::Owned => DepthAttachment::Owned(TextureFormat::Depth24Plus),
            TargetDepth::SharedWith(owner) => {
                let owner = self.ensure(backend, owner)?;
                let texture = owner.depth.ok_or_else(|| {
                    BackendError::FramebufferCreationFailed(format!(
                        "{} shares a depth buffer that does not exist",
                        kind.label()
                    ))
                })?;
                DepthAttachment::Shared(texture)
            }
        };
        let (width, height) = layout.size.resolve(self.width, self.height);
        let framebuffer = backend.create_framebuffer(&FramebufferDescriptor {
            label: Some(kind.label()),
            width,
            height,
            color_formats: layout.color_formats,
            depth,
            cubemap: false,
            mipmaps: false,
        })?;
        log::debug!("Created render target {} ({}x{})", kind.label(), width, height);
        self.targets.insert(kind, framebuffer.clone());
        Ok(framebuffer)
    }

    /// Destroy one target; it is recreated on the next `ensure`
    ///
    /// Targets borrowing its depth go first.
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend, kind: TargetKind) {
        let capture_size = self.capture_size;
        let borrowers: Vec<TargetKind> = self
            .targets
            .keys()
            .copied()
            .filter(|other| other.layout(capture_size).depth == TargetDepth::SharedWith(kind))
            .collect();
        for borrower in borrowers {
            if let Some(framebuffer) = self.targets.remove(&borrower) {
                backend.destroy_framebuffer(&framebuffer);
            }
        }
        if let Some(framebuffer) = self.targets.remove(&kind) {
            backend.destroy_framebuffer(&framebuffer);
        }
    }

    /// Destroy every target
    pub fn release_all(&mut self, backend: &mut dyn GraphicsBackend) {
        let kinds: Vec<TargetKind> = self.targets.keys().copied().collect();
        for kind in kinds {
            self.release(backend, kind);
        }
    }
}

/// Two slots used alternately as read source and write target
#[derive(Debug, Clone)]
pub struct PingPong<T> {
    slots: [T; 2],
    target: usize,
}

impl<T> PingPong<T> {
    /// `first` is written first
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            target: 0,
        }
    }

    /// Slot written by the next stage
    pub fn target(&self) -> &T {
        &self.slots[self.target]
    }

    /// Slot written by the previous stage
    pub fn source(&self) -> &T {
        &self.slots[1 - self.target]
    }

    pub fn swap(&mut self) {
        self.target = 1 - self.target;
    }
}
