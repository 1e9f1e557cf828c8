use std::fmt;

use crate::error::ViewerError;
use crate::ports::{Pose, VrDevice};

/// Which presentation API a discovered device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayApi {
    WebVr,
    WebXr,
}

/// The single display the controller renders through.
///
/// Chosen once per discovery: a device speaking WebVR submits each frame
/// explicitly, a WebXR session submits implicitly at the end of its frame
/// callback, and with no device the view is driven by orbit controls.
#[derive(Default)]
pub enum DisplayBackend {
    WebVr(Box<dyn VrDevice>),
    WebXr(Box<dyn VrDevice>),
    #[default]
    Orbit,
}

impl fmt::Debug for DisplayBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayBackend::WebVr(device) => f.debug_tuple("WebVr").field(&device.name()).finish(),
            DisplayBackend::WebXr(device) => f.debug_tuple("WebXr").field(&device.name()).finish(),
            DisplayBackend::Orbit => f.write_str("Orbit"),
        }
    }
}

impl DisplayBackend {
    pub fn probe(api: Option<DisplayApi>, device: Option<Box<dyn VrDevice>>) -> Self {
        match (api, device) {
            (Some(DisplayApi::WebXr), Some(device)) => DisplayBackend::WebXr(device),
            (Some(DisplayApi::WebVr), Some(device)) => DisplayBackend::WebVr(device),
            _ => DisplayBackend::Orbit,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DisplayBackend::WebVr(_) => "webvr",
            DisplayBackend::WebXr(_) => "webxr",
            DisplayBackend::Orbit => "orbit",
        }
    }

    pub fn has_device(&self) -> bool {
        !matches!(self, DisplayBackend::Orbit)
    }

    fn device(&self) -> Option<&dyn VrDevice> {
        match self {
            DisplayBackend::WebVr(device) | DisplayBackend::WebXr(device) => Some(device.as_ref()),
            DisplayBackend::Orbit => None,
        }
    }

    fn device_mut(&mut self) -> Option<&mut (dyn VrDevice + 'static)> {
        match self {
            DisplayBackend::WebVr(device) | DisplayBackend::WebXr(device) => Some(device.as_mut()),
            DisplayBackend::Orbit => None,
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device().map(|device| device.name())
    }

    pub fn is_presenting(&self) -> bool {
        self.device().is_some_and(|device| device.is_presenting())
    }

    /// Ask the device to start presenting. Completion arrives later as a
    /// present-change event.
    pub fn request_present(&mut self) -> Result<(), ViewerError> {
        let device = self.device_mut().ok_or(ViewerError::DisplayUnavailable)?;
        device.request_present().map_err(ViewerError::Load)
    }

    pub fn exit_present(&mut self) {
        if let Some(device) = self.device_mut() {
            if device.is_presenting() {
                device.exit_present();
            }
        }
    }

    /// Hand the rendered frame to the device. Returns whether a submit
    /// happened.
    pub fn submit_frame(&mut self) -> bool {
        match self {
            DisplayBackend::WebVr(device) if device.is_presenting() => {
                device.submit_frame();
                true
            }
            _ => false,
        }
    }

    /// Tracked pose while presenting.
    pub fn pose(&self) -> Option<Pose> {
        self.device()
            .filter(|device| device.is_presenting())
            .map(|device| device.pose())
    }
}
