//! Eye-sphere construction and the black cross-fade mask.

use std::task::Poll;

use thiserror::Error;

use super::mesh::{self, UvTransform};
use crate::media::MediaFormat;
use crate::platform::PlatformProfile;
use crate::ports::{
    ChannelOrder, EyeLayer, GeometryId, GraphicsPort, MaterialDesc, MaterialId, MediaElementId,
    MeshDraw, TextureFormat, TextureId, TextureTicket, VideoTextureParams,
};
use crate::tween::{Easing, Tween};

const EYE_RENDER_ORDER: i32 = -1;
const MASK_RENDER_ORDER: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositorError {
    #[error("Unable to load texture from \"{url}\"")]
    TextureLoad { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SphereSource {
    Photo { url: String },
    Video {
        element: MediaElementId,
        format: MediaFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeMesh {
    pub layer: EyeLayer,
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub uv: UvTransform,
}

/// Left and right eye meshes sampling one shared texture.
#[derive(Debug, Clone, PartialEq)]
pub struct EyePair {
    pub texture: TextureId,
    pub left: EyeMesh,
    pub right: EyeMesh,
    pub stereo: bool,
    pub source: SphereSource,
}

#[derive(Debug, Clone)]
struct PendingPhoto {
    ticket: TextureTicket,
    url: String,
    stereo: bool,
}

/// Completion handle for one [`SphereCompositor::set_opacity`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpacityTicket(u64);

#[derive(Debug, Clone)]
struct OpacityTransition {
    serial: u64,
    tween: Tween<f32>,
}

/// Owns the sphere pair under the content group and the opacity mask in
/// front of it.
///
/// Photospheres resolve when the requested texture decodes, video spheres
/// resolve immediately, and opacity transitions resolve once the mask tween
/// completes. Only the newest photosphere request may attach; anything older
/// that lands later is released on arrival.
#[derive(Debug)]
pub struct SphereCompositor {
    hls_texture_workaround: bool,
    swizzle_bgra: bool,
    mask_geometry: GeometryId,
    mask_material: MaterialId,
    mask_opacity: f32,
    eyes: Option<EyePair>,
    pending_photo: Option<PendingPhoto>,
    next_texture_serial: u64,
    transition: Option<OpacityTransition>,
    next_opacity_serial: u64,
    opacity_settled_through: u64,
}

impl SphereCompositor {
    pub fn new(graphics: &mut dyn GraphicsPort, profile: &PlatformProfile) -> Self {
        let mask_geometry = graphics.create_geometry(&mesh::mask_sphere());
        let mask_material = graphics.create_material(&MaterialDesc::Solid {
            color: [0.0, 0.0, 0.0],
            opacity: 0.0,
            transparent: true,
            double_sided: true,
        });
        Self {
            hls_texture_workaround: profile.needs_hls_texture_workaround(),
            swizzle_bgra: profile.swizzles_bgra(),
            mask_geometry,
            mask_material,
            mask_opacity: 0.0,
            eyes: None,
            pending_photo: None,
            next_texture_serial: 0,
            transition: None,
            next_opacity_serial: 0,
            opacity_settled_through: 0,
        }
    }

    pub fn eyes(&self) -> Option<&EyePair> {
        self.eyes.as_ref()
    }

    pub fn mask_opacity(&self) -> f32 {
        self.mask_opacity
    }

    pub fn has_pending_photo(&self) -> bool {
        self.pending_photo.is_some()
    }

    /// Start decoding `url`; the eyes are rebuilt when the returned ticket
    /// completes through [`complete_texture`](Self::complete_texture).
    pub fn begin_photosphere(
        &mut self,
        graphics: &mut dyn GraphicsPort,
        generation: u64,
        url: &str,
        stereo: bool,
    ) -> TextureTicket {
        self.next_texture_serial += 1;
        let ticket = TextureTicket {
            generation,
            serial: self.next_texture_serial,
        };
        self.pending_photo = Some(PendingPhoto {
            ticket,
            url: url.to_string(),
            stereo,
        });
        graphics.request_texture(ticket, url);
        ticket
    }

    /// Attach a decoded texture. Returns `false` (and releases the texture)
    /// when the ticket is not the outstanding request.
    pub fn complete_texture(
        &mut self,
        graphics: &mut dyn GraphicsPort,
        ticket: TextureTicket,
        texture: TextureId,
    ) -> bool {
        let pending = match self.pending_photo.take() {
            Some(pending) if pending.ticket == ticket => pending,
            other => {
                self.pending_photo = other;
                log::debug!("releasing stale texture for ticket {:?}", ticket);
                graphics.release_texture(texture);
                return false;
            }
        };
        let material = MaterialDesc::Textured { texture };
        self.attach_eyes(
            graphics,
            texture,
            material,
            pending.stereo,
            SphereSource::Photo { url: pending.url },
        );
        true
    }

    /// Reject the outstanding request. `None` when the ticket is stale.
    pub fn texture_failed(&mut self, ticket: TextureTicket) -> Option<CompositorError> {
        match self.pending_photo.take() {
            Some(pending) if pending.ticket == ticket => {
                Some(CompositorError::TextureLoad { url: pending.url })
            }
            other => {
                self.pending_photo = other;
                None
            }
        }
    }

    pub fn set_videosphere(
        &mut self,
        graphics: &mut dyn GraphicsPort,
        element: MediaElementId,
        format: MediaFormat,
        stereo: bool,
    ) -> Result<(), CompositorError> {
        self.pending_photo = None;
        let raw_rgba = self.hls_texture_workaround && format == MediaFormat::Hls;
        let params = if raw_rgba {
            VideoTextureParams {
                format: TextureFormat::Rgba,
                flip_y: false,
            }
        } else {
            VideoTextureParams {
                format: TextureFormat::Rgb,
                flip_y: true,
            }
        };
        let texture = graphics.create_video_texture(element, params);
        let material = if raw_rgba {
            MaterialDesc::SwizzledVideo {
                texture,
                order: if self.swizzle_bgra {
                    ChannelOrder::Bgra
                } else {
                    ChannelOrder::Rgba
                },
            }
        } else {
            MaterialDesc::Textured { texture }
        };
        self.attach_eyes(
            graphics,
            texture,
            material,
            stereo,
            SphereSource::Video { element, format },
        );
        Ok(())
    }

    fn attach_eyes(
        &mut self,
        graphics: &mut dyn GraphicsPort,
        texture: TextureId,
        material: MaterialDesc,
        stereo: bool,
        source: SphereSource,
    ) {
        self.clear_eyes(graphics);
        let (left_uv, right_uv) = UvTransform::eye_pair(stereo);
        let mut build = |layer: EyeLayer, uv: UvTransform| EyeMesh {
            layer,
            geometry: graphics.create_geometry(&mesh::eye_sphere(uv)),
            material: graphics.create_material(&material),
            uv,
        };
        let left = build(EyeLayer::Left, left_uv);
        let right = build(EyeLayer::Right, right_uv);
        self.eyes = Some(EyePair {
            texture,
            left,
            right,
            stereo,
            source,
        });
    }

    /// Release the eye pair. The shared texture goes first, then each eye's
    /// material and geometry.
    pub fn clear_eyes(&mut self, graphics: &mut dyn GraphicsPort) {
        if let Some(eyes) = self.eyes.take() {
            graphics.release_texture(eyes.texture);
            for eye in [eyes.left, eyes.right] {
                graphics.release_material(eye.material);
                graphics.release_geometry(eye.geometry);
            }
        }
    }

    /// Drop the eyes and forget any outstanding photosphere request.
    pub fn clear(&mut self, graphics: &mut dyn GraphicsPort) {
        self.pending_photo = None;
        self.clear_eyes(graphics);
    }

    /// Fade the panorama toward `target` (0 black, 1 full colour). A
    /// transition still running is settled at its end value first.
    pub fn set_opacity(
        &mut self,
        graphics: &mut dyn GraphicsPort,
        target: f32,
        duration_ms: f64,
    ) -> OpacityTicket {
        if let Some(previous) = self.transition.take() {
            self.mask_opacity = previous.tween.target();
            self.opacity_settled_through = previous.serial;
            graphics.set_material_opacity(self.mask_material, self.mask_opacity);
        }
        self.next_opacity_serial += 1;
        let overlay = 1.0 - target.clamp(0.0, 1.0);
        self.transition = Some(OpacityTransition {
            serial: self.next_opacity_serial,
            tween: Tween::new(self.mask_opacity, overlay, duration_ms, Easing::QuadraticInOut),
        });
        OpacityTicket(self.next_opacity_serial)
    }

    pub fn poll_opacity(&self, ticket: OpacityTicket) -> Poll<()> {
        if ticket.0 <= self.opacity_settled_through {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    /// Step the mask tween to `now_ms`.
    pub fn advance(&mut self, graphics: &mut dyn GraphicsPort, now_ms: f64) {
        let Some(transition) = self.transition.as_mut() else {
            return;
        };
        self.mask_opacity = transition.tween.sample(now_ms);
        graphics.set_material_opacity(self.mask_material, self.mask_opacity);
        if transition.tween.is_finished() {
            self.opacity_settled_through = transition.serial;
            self.transition = None;
        }
    }

    /// Draw list for this frame: eyes first, mask last.
    pub fn draws(&self) -> Vec<MeshDraw> {
        let mut draws = Vec::with_capacity(3);
        if let Some(eyes) = &self.eyes {
            for eye in [&eyes.left, &eyes.right] {
                draws.push(MeshDraw {
                    geometry: eye.geometry,
                    material: eye.material,
                    layer: Some(eye.layer),
                    render_order: EYE_RENDER_ORDER,
                });
            }
        }
        draws.push(MeshDraw {
            geometry: self.mask_geometry,
            material: self.mask_material,
            layer: None,
            render_order: MASK_RENDER_ORDER,
        });
        draws
    }

    /// Release everything including the mask.
    pub fn dispose(&mut self, graphics: &mut dyn GraphicsPort) {
        self.transition = None;
        self.clear(graphics);
        graphics.release_material(self.mask_material);
        graphics.release_geometry(self.mask_geometry);
    }
}
