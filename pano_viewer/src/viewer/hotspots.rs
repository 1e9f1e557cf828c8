//! Interactive disc markers placed on the sphere.
//!
//! Hit-testing runs every frame against the inner discs along the pointer ray
//! (the screen center while presenting). Focus, blur and click are published
//! on the layer's event bus; focus and press state are recomputed from input
//! rather than stored on the hotspot.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::Receiver;

use glam::{Vec2, Vec3};
use pano_stream::HotspotSpec;
use thiserror::Error;

use super::camera::CameraRig;
use crate::events::EventBus;
use crate::ports::{HotspotSprite, PointerEvent, PointerKind, PointerPhase};
use crate::tween::{Easing, Tween};

const NORMAL_SCALE: f32 = 1.0;
const FOCUS_SCALE: f32 = 1.2;
const FOCUS_DURATION_MS: f64 = 200.0;

const INACTIVE_COLOR: [f32; 3] = [1.0, 1.0, 1.0];
const ACTIVE_COLOR: [f32; 3] = [0.8, 0.0, 0.0];
const ACTIVE_DURATION_MS: f64 = 100.0;

pub const MAX_INNER_OPACITY: f32 = 0.8;
pub const MAX_OUTER_OPACITY: f32 = 0.5;
const FADE_START_ANGLE_DEG: f32 = 35.0;
const FADE_END_ANGLE_DEG: f32 = 60.0;

pub const DWELL_CLICK_MS: f64 = 1200.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotspotEvent {
    Focus(String),
    Blur(String),
    Click(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HotspotError {
    #[error("Attempt to add hotspot with existing id {0}.")]
    DuplicateId(String),
    #[error("Attempt to remove non-existing hotspot with id {0}.")]
    UnknownId(String),
}

#[derive(Debug, Clone)]
struct Hotspot {
    center: Vec3,
    radius: f32,
    scale: f32,
    scale_tween: Option<Tween<f32>>,
    color: [f32; 3],
    color_tween: Option<Tween<[f32; 3]>>,
    fade: f32,
    dwell_since_ms: Option<f64>,
    dwell_fired: bool,
}

impl Hotspot {
    fn new(spec: &HotspotSpec) -> Self {
        Self {
            center: direction(spec.pitch, spec.yaw) * spec.distance,
            radius: spec.radius,
            scale: NORMAL_SCALE,
            scale_tween: None,
            color: INACTIVE_COLOR,
            color_tween: None,
            fade: 1.0,
            dwell_since_ms: None,
            dwell_fired: false,
        }
    }

    /// Distance along the ray to the inner disc, if the ray hits it.
    fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        let normal = -self.center.normalize_or_zero();
        let denom = dir.dot(normal);
        if denom.abs() < 1e-6 {
            return None;
        }
        let t = (self.center - origin).dot(normal) / denom;
        if t <= 0.0 {
            return None;
        }
        let hit = origin + dir * t;
        (hit.distance(self.center) <= self.radius * self.scale).then_some(t)
    }

    fn tween_scale(&mut self, to: f32) {
        self.scale_tween = Some(Tween::new(
            self.scale,
            to,
            FOCUS_DURATION_MS,
            Easing::QuadraticInOut,
        ));
    }

    fn tween_color(&mut self, to: [f32; 3]) {
        self.color_tween = Some(Tween::new(
            self.color,
            to,
            ACTIVE_DURATION_MS,
            Easing::Linear,
        ));
    }

    fn advance(&mut self, now_ms: f64) {
        if let Some(tween) = self.scale_tween.as_mut() {
            self.scale = tween.sample(now_ms);
            if tween.is_finished() {
                self.scale_tween = None;
            }
        }
        if let Some(tween) = self.color_tween.as_mut() {
            self.color = tween.sample(now_ms);
            if tween.is_finished() {
                self.color_tween = None;
            }
        }
    }
}

/// Unit direction for a (pitch, yaw) placement in degrees; (0, 0) is
/// straight ahead of an unrotated camera.
pub fn direction(pitch_deg: f32, yaw_deg: f32) -> Vec3 {
    let pitch = pitch_deg.to_radians();
    let yaw = yaw_deg.to_radians();
    Vec3::new(
        -pitch.cos() * yaw.sin(),
        pitch.sin(),
        -pitch.cos() * yaw.cos(),
    )
}

/// Opacity factor for a hotspot `angle_deg` away from the view direction.
pub fn edge_fade(angle_deg: f32) -> f32 {
    if angle_deg < FADE_START_ANGLE_DEG {
        1.0
    } else if angle_deg > FADE_END_ANGLE_DEG {
        0.0
    } else {
        (FADE_END_ANGLE_DEG - angle_deg) / (FADE_END_ANGLE_DEG - FADE_START_ANGLE_DEG)
    }
}

/// Where the layer sits relative to the camera this frame.
#[derive(Debug, Clone, Copy)]
pub struct HotspotFrame<'a> {
    pub camera: &'a CameraRig,
    pub content_offset: Vec3,
    pub presenting: bool,
    pub now_ms: f64,
}

#[derive(Debug)]
pub struct HotspotLayer {
    hotspots: BTreeMap<String, Hotspot>,
    selected: BTreeSet<String>,
    down: BTreeSet<String>,
    pointer: Vec2,
    mouse_enabled: bool,
    visible: bool,
    events: EventBus<HotspotEvent>,
}

impl HotspotLayer {
    pub fn new(mouse_enabled: bool) -> Self {
        Self {
            hotspots: BTreeMap::new(),
            selected: BTreeSet::new(),
            down: BTreeSet::new(),
            pointer: Vec2::ONE,
            mouse_enabled,
            visible: true,
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<HotspotEvent> {
        self.events.subscribe()
    }

    pub fn add(&mut self, spec: &HotspotSpec) -> Result<(), HotspotError> {
        if self.hotspots.contains_key(&spec.id) {
            let err = HotspotError::DuplicateId(spec.id.clone());
            log::error!("{err}");
            return Err(err);
        }
        self.hotspots.insert(spec.id.clone(), Hotspot::new(spec));
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<(), HotspotError> {
        if self.hotspots.remove(id).is_none() {
            let err = HotspotError::UnknownId(id.to_string());
            log::error!("{err}");
            return Err(err);
        }
        self.selected.remove(id);
        self.down.remove(id);
        self.events.emit(HotspotEvent::Blur(id.to_string()));
        Ok(())
    }

    pub fn clear_all(&mut self) {
        let ids: Vec<String> = self.hotspots.keys().cloned().collect();
        for id in ids {
            let _ = self.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.hotspots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotspots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.hotspots.contains_key(id)
    }

    pub fn center(&self, id: &str) -> Option<Vec3> {
        self.hotspots.get(id).map(|hotspot| hotspot.center)
    }

    pub fn scale(&self, id: &str) -> Option<f32> {
        self.hotspots.get(id).map(|hotspot| hotspot.scale)
    }

    pub fn is_focused(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Per-frame hit test, edge fade, dwell clicks and animation.
    pub fn update(&mut self, frame: &HotspotFrame<'_>) {
        if frame.presenting {
            self.pointer = Vec2::ZERO;
        }
        let origin = frame.camera.world_position() - frame.content_offset;
        let dir = frame.camera.ray(self.pointer);
        let forward = frame.camera.forward();

        for (id, hotspot) in self.hotspots.iter_mut() {
            let angle = hotspot.center.angle_between(forward).to_degrees();
            hotspot.fade = edge_fade(angle);

            let hit = hotspot.intersect(origin, dir).is_some();
            let was_selected = self.selected.contains(id);
            if hit && !was_selected {
                self.events.emit(HotspotEvent::Focus(id.clone()));
                hotspot.tween_scale(FOCUS_SCALE);
                hotspot.dwell_since_ms = frame.presenting.then_some(frame.now_ms);
                hotspot.dwell_fired = false;
                self.selected.insert(id.clone());
            } else if !hit && was_selected {
                self.events.emit(HotspotEvent::Blur(id.clone()));
                hotspot.tween_scale(NORMAL_SCALE);
                hotspot.dwell_since_ms = None;
                hotspot.dwell_fired = false;
                self.selected.remove(id);
            }

            if hit && frame.presenting && !hotspot.dwell_fired {
                let since = *hotspot.dwell_since_ms.get_or_insert(frame.now_ms);
                if frame.now_ms - since >= DWELL_CLICK_MS {
                    hotspot.dwell_fired = true;
                    self.events.emit(HotspotEvent::Click(Some(id.clone())));
                }
            } else if !frame.presenting {
                hotspot.dwell_since_ms = None;
            }

            hotspot.advance(frame.now_ms);
        }
    }

    pub fn pointer(&mut self, event: &PointerEvent, frame: &HotspotFrame<'_>) {
        match event.kind {
            PointerKind::Mouse => {
                if !self.mouse_enabled {
                    return;
                }
                self.pointer = frame.camera.to_ndc(event.x, event.y);
                match event.phase {
                    PointerPhase::Down => self.press(),
                    PointerPhase::Move => {}
                    PointerPhase::Up => self.release(true),
                }
            }
            PointerKind::Touch => match event.phase {
                PointerPhase::Down => {
                    if !frame.presenting {
                        self.pointer = frame.camera.to_ndc(event.x, event.y);
                    }
                    self.update(frame);
                    self.press();
                }
                PointerPhase::Move => {}
                PointerPhase::Up => self.release(false),
            },
        }
    }

    fn press(&mut self) {
        self.down = self.selected.clone();
        for id in &self.down {
            if let Some(hotspot) = self.hotspots.get_mut(id) {
                hotspot.tween_color(ACTIVE_COLOR);
            }
        }
    }

    /// Mouse clicks need the hotspot still focused; touch clicks only need
    /// it to have been pressed.
    fn release(&mut self, require_focus: bool) {
        let down = std::mem::take(&mut self.down);
        if down.is_empty() {
            self.events.emit(HotspotEvent::Click(None));
            return;
        }
        for id in &down {
            if !require_focus || self.selected.contains(id) {
                self.events.emit(HotspotEvent::Click(Some(id.clone())));
            }
            if let Some(hotspot) = self.hotspots.get_mut(id) {
                hotspot.tween_color(INACTIVE_COLOR);
            }
        }
    }

    pub fn sprites(&self, content_offset: Vec3) -> Vec<HotspotSprite> {
        self.hotspots
            .iter()
            .map(|(id, hotspot)| HotspotSprite {
                id: id.clone(),
                center: content_offset + hotspot.center,
                radius: hotspot.radius,
                scale: hotspot.scale,
                inner_opacity: hotspot.fade * MAX_INNER_OPACITY,
                outer_opacity: hotspot.fade * MAX_OUTER_OPACITY,
                inner_color: hotspot.color,
            })
            .collect()
    }
}
