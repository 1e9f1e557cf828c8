//! Shared host/viewer message protocol.
//!
//! The embedding page talks to the viewer with `{type, data}` envelopes and
//! the viewer answers with the same shape. This crate keeps the envelope
//! parsing, payload coercion and outbound encoding in one place so the viewer
//! and any host-side tooling stay interoperable.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Message kinds a host may send to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    Play,
    Pause,
    SetContent,
    SetVolume,
    Muted,
    SetCurrentTime,
    GetPosition,
    SetFullscreen,
    AddHotspot,
    RemoveHotspot,
}

impl InboundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::SetContent => "setimage",
            Self::SetVolume => "setvolume",
            Self::Muted => "muted",
            Self::SetCurrentTime => "setcurrenttime",
            Self::GetPosition => "getposition",
            Self::SetFullscreen => "setfullscreen",
            Self::AddHotspot => "addhotspot",
            Self::RemoveHotspot => "removehotspot",
        }
    }
}

impl TryFrom<&str> for InboundKind {
    type Error = ();

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "play" => Ok(Self::Play),
            "pause" => Ok(Self::Pause),
            "setimage" => Ok(Self::SetContent),
            "setvolume" => Ok(Self::SetVolume),
            "muted" => Ok(Self::Muted),
            "setcurrenttime" => Ok(Self::SetCurrentTime),
            "getposition" => Ok(Self::GetPosition),
            "setfullscreen" => Ok(Self::SetFullscreen),
            "addhotspot" => Ok(Self::AddHotspot),
            "removehotspot" => Ok(Self::RemoveHotspot),
            _ => Err(()),
        }
    }
}

/// Raw envelope as it arrives from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Scene parameters carried by `setimage`, keyed by their snake_case names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentParams(pub BTreeMap<String, String>);

impl ContentParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let mut params = BTreeMap::new();
        for (key, value) in object {
            let text = match value {
                Value::Null => continue,
                Value::String(text) => text.clone(),
                Value::Bool(flag) => flag.to_string(),
                Value::Number(number) => number.to_string(),
                other => other.to_string(),
            };
            params.insert(key.clone(), text);
        }
        Self(params)
    }
}

/// Placement of a hotspot requested by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotSpec {
    pub id: String,
    pub pitch: f32,
    pub yaw: f32,
    pub radius: f32,
    pub distance: f32,
}

/// Typed command decoded from an inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Play,
    Pause,
    SetContent(ContentParams),
    SetVolume(f64),
    SetMuted(bool),
    SetCurrentTime(f64),
    GetPosition,
    SetFullscreen,
    AddHotspot(HotspotSpec),
    RemoveHotspot { id: String },
}

impl HostCommand {
    pub fn kind(&self) -> InboundKind {
        match self {
            Self::Play => InboundKind::Play,
            Self::Pause => InboundKind::Pause,
            Self::SetContent(_) => InboundKind::SetContent,
            Self::SetVolume(_) => InboundKind::SetVolume,
            Self::SetMuted(_) => InboundKind::Muted,
            Self::SetCurrentTime(_) => InboundKind::SetCurrentTime,
            Self::GetPosition => InboundKind::GetPosition,
            Self::SetFullscreen => InboundKind::SetFullscreen,
            Self::AddHotspot(_) => InboundKind::AddHotspot,
            Self::RemoveHotspot { .. } => InboundKind::RemoveHotspot,
        }
    }

    /// Decode an envelope. Unknown message types yield `Ok(None)`.
    pub fn from_envelope(envelope: &InboundEnvelope) -> Result<Option<Self>, ProtocolError> {
        let kind = match InboundKind::try_from(envelope.kind.as_str()) {
            Ok(kind) => kind,
            Err(()) => return Ok(None),
        };
        let data = &envelope.data;
        let command = match kind {
            InboundKind::Play => Self::Play,
            InboundKind::Pause => Self::Pause,
            InboundKind::GetPosition => Self::GetPosition,
            InboundKind::SetFullscreen => Self::SetFullscreen,
            InboundKind::SetContent => {
                let object = data
                    .get("contentInfo")
                    .unwrap_or(data)
                    .as_object()
                    .ok_or_else(|| malformed(kind, "expected an object of scene parameters"))?;
                Self::SetContent(ContentParams::from_object(object))
            }
            InboundKind::SetVolume => {
                let level = number_field(data, "volumeLevel")
                    .ok_or_else(|| malformed(kind, "expected a volume level"))?;
                Self::SetVolume(level.clamp(0.0, 1.0))
            }
            InboundKind::Muted => {
                let muted = bool_field(data, "muteState")
                    .ok_or_else(|| malformed(kind, "expected a boolean mute state"))?;
                Self::SetMuted(muted)
            }
            InboundKind::SetCurrentTime => {
                let seconds = number_field(data, "currentTime")
                    .ok_or_else(|| malformed(kind, "expected a time in seconds"))?;
                Self::SetCurrentTime(seconds.max(0.0))
            }
            InboundKind::AddHotspot => {
                let id = string_field(data, "id")
                    .ok_or_else(|| malformed(kind, "hotspot id missing"))?;
                let field = |name: &str| {
                    number_field(data, name)
                        .map(|value| value as f32)
                        .ok_or_else(|| malformed(kind, &format!("hotspot {name} missing")))
                };
                Self::AddHotspot(HotspotSpec {
                    pitch: field("pitch")?,
                    yaw: field("yaw")?,
                    radius: field("radius")?,
                    distance: field("distance")?,
                    id,
                })
            }
            InboundKind::RemoveHotspot => {
                let id = string_field(data, "id")
                    .ok_or_else(|| malformed(kind, "hotspot id missing"))?;
                Self::RemoveHotspot { id }
            }
        };
        Ok(Some(command))
    }
}

fn malformed(kind: InboundKind, reason: &str) -> ProtocolError {
    ProtocolError::MalformedPayload {
        kind: kind.as_str(),
        reason: reason.to_string(),
    }
}

/// Accepts either a bare scalar or an object carrying `key`; numeric strings
/// are parsed the same way a browser `parseFloat` would for plain decimals.
fn number_field(data: &Value, key: &str) -> Option<f64> {
    let value = match data {
        Value::Object(object) => object.get(key)?,
        other => other,
    };
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn bool_field(data: &Value, key: &str) -> Option<bool> {
    let value = match data {
        Value::Object(object) => object.get(key)?,
        other => other,
    };
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => Some(parse_flag(text)),
        Value::Number(number) => Some(number.as_f64()? != 0.0),
        _ => None,
    }
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Boolean parameters are true for `"true"` or `"1"` in any case.
pub fn parse_flag(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.eq_ignore_ascii_case("true") || trimmed == "1"
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadyInfo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewPosition {
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickInfo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
}

/// Messages the viewer posts back to its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ViewerMessage {
    #[serde(rename = "ready")]
    Ready(ReadyInfo),
    #[serde(rename = "error")]
    Error(String),
    #[serde(rename = "modechange")]
    ModeChange(bool),
    #[serde(rename = "paused")]
    Paused(bool),
    #[serde(rename = "timeupdate")]
    TimeUpdate(f64),
    #[serde(rename = "ended")]
    Ended(bool),
    #[serde(rename = "getposition")]
    Position(ViewPosition),
    #[serde(rename = "enter-fullscreen")]
    EnterFullscreen,
    #[serde(rename = "exit-fullscreen")]
    ExitFullscreen,
    #[serde(rename = "volumechange")]
    VolumeChange(f64),
    #[serde(rename = "muted")]
    Muted(bool),
    #[serde(rename = "click")]
    Click(ClickInfo),
}

impl ViewerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::Error(_) => "error",
            Self::ModeChange(_) => "modechange",
            Self::Paused(_) => "paused",
            Self::TimeUpdate(_) => "timeupdate",
            Self::Ended(_) => "ended",
            Self::Position(_) => "getposition",
            Self::EnterFullscreen => "enter-fullscreen",
            Self::ExitFullscreen => "exit-fullscreen",
            Self::VolumeChange(_) => "volumechange",
            Self::Muted(_) => "muted",
            Self::Click(_) => "click",
        }
    }
}

/// Error conditions returned by the protocol helpers.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload { kind: &'static str, reason: String },
    #[error("message encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Parse a raw JSON envelope into a command. Unknown types yield `Ok(None)`.
pub fn decode_command(raw: &str) -> Result<Option<HostCommand>, ProtocolError> {
    let envelope: InboundEnvelope = serde_json::from_str(raw).map_err(ProtocolError::InvalidJson)?;
    HostCommand::from_envelope(&envelope)
}

/// Serialize an outbound message as a `{type, data}` JSON string.
pub fn encode_message(message: &ViewerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Unregistered,
    Registered,
    Closed,
}

/// Single process-wide entry point for host messages.
///
/// The dispatcher starts unregistered; hosts call [`register`](Self::register)
/// once the viewer is ready to receive commands and
/// [`unregister`](Self::unregister) at teardown. Messages routed outside that
/// window are dropped.
#[derive(Debug)]
pub struct InboundDispatcher {
    registration: Registration,
    debug: bool,
}

impl InboundDispatcher {
    pub fn new(debug: bool) -> Self {
        Self {
            registration: Registration::Unregistered,
            debug,
        }
    }

    pub fn register(&mut self) {
        if self.registration == Registration::Unregistered {
            self.registration = Registration::Registered;
        }
    }

    pub fn unregister(&mut self) {
        self.registration = Registration::Closed;
    }

    pub fn is_registered(&self) -> bool {
        self.registration == Registration::Registered
    }

    pub fn route_json(&self, raw: &str) -> Option<HostCommand> {
        if !self.is_registered() {
            return None;
        }
        match serde_json::from_str::<InboundEnvelope>(raw) {
            Ok(envelope) => self.route(&envelope),
            Err(err) => {
                log::warn!("dropping host message: {}", ProtocolError::InvalidJson(err));
                None
            }
        }
    }

    pub fn route(&self, envelope: &InboundEnvelope) -> Option<HostCommand> {
        if !self.is_registered() {
            return None;
        }
        if self.debug {
            log::info!("host message {} {}", envelope.kind, envelope.data);
        }
        match HostCommand::from_envelope(envelope) {
            Ok(Some(command)) => Some(command),
            Ok(None) => {
                if self.debug {
                    log::warn!("ignoring unknown host message type {}", envelope.kind);
                }
                None
            }
            Err(err) => {
                log::warn!("dropping host message: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_types_case_insensitively() {
        let command = decode_command(r#"{"type":"PLAY"}"#).expect("decode");
        assert_eq!(command, Some(HostCommand::Play));
        let command = decode_command(r#"{"type":"setVolume","data":0.25}"#).expect("decode");
        assert_eq!(command, Some(HostCommand::SetVolume(0.25)));
    }

    #[test]
    fn unknown_types_are_ignored() {
        let command = decode_command(r#"{"type":"devicemotion","data":{}}"#).expect("decode");
        assert!(command.is_none());
    }

    #[test]
    fn accepts_wrapped_scalar_payloads() {
        let command =
            decode_command(r#"{"type":"setvolume","data":{"volumeLevel":"0.5"}}"#).expect("decode");
        assert_eq!(command, Some(HostCommand::SetVolume(0.5)));
        let command =
            decode_command(r#"{"type":"muted","data":{"muteState":true}}"#).expect("decode");
        assert_eq!(command, Some(HostCommand::SetMuted(true)));
        let command = decode_command(r#"{"type":"setcurrenttime","data":{"currentTime":12}}"#)
            .expect("decode");
        assert_eq!(command, Some(HostCommand::SetCurrentTime(12.0)));
    }

    #[test]
    fn set_content_flattens_content_info() {
        let raw = json!({
            "type": "setimage",
            "data": {"contentInfo": {"image": "b.jpg", "is_stereo": true, "volume": 0.4}}
        })
        .to_string();
        let command = decode_command(&raw).expect("decode").expect("known type");
        let HostCommand::SetContent(params) = command else {
            panic!("expected set content");
        };
        assert_eq!(params.get("image"), Some("b.jpg"));
        assert_eq!(params.get("is_stereo"), Some("true"));
        assert_eq!(params.get("volume"), Some("0.4"));
    }

    #[test]
    fn malformed_payload_reports_kind() {
        let err = decode_command(r#"{"type":"setvolume","data":"loud"}"#).expect_err("malformed");
        assert!(err.to_string().contains("setvolume"));
    }

    #[test]
    fn add_hotspot_parses_numeric_strings() {
        let raw = json!({
            "type": "addhotspot",
            "data": {"id": "door", "pitch": "10", "yaw": -20, "radius": 0.05, "distance": 1}
        })
        .to_string();
        let command = decode_command(&raw).expect("decode");
        assert_eq!(
            command,
            Some(HostCommand::AddHotspot(HotspotSpec {
                id: "door".to_string(),
                pitch: 10.0,
                yaw: -20.0,
                radius: 0.05,
                distance: 1.0,
            }))
        );
    }

    #[test]
    fn outbound_messages_use_type_data_envelopes() {
        let encoded = encode_message(&ViewerMessage::Paused(true)).expect("encode");
        assert_eq!(encoded, r#"{"type":"paused","data":true}"#);
        let encoded = encode_message(&ViewerMessage::ExitFullscreen).expect("encode");
        assert_eq!(encoded, r#"{"type":"exit-fullscreen"}"#);
        let encoded = encode_message(&ViewerMessage::Ready(ReadyInfo::default())).expect("encode");
        assert_eq!(encoded, r#"{"type":"ready","data":{}}"#);
    }

    #[test]
    fn dispatcher_drops_messages_outside_registration() {
        let mut dispatcher = InboundDispatcher::new(false);
        assert!(dispatcher.route_json(r#"{"type":"play"}"#).is_none());
        dispatcher.register();
        assert_eq!(
            dispatcher.route_json(r#"{"type":"play"}"#),
            Some(HostCommand::Play)
        );
        dispatcher.unregister();
        assert!(dispatcher.route_json(r#"{"type":"play"}"#).is_none());
        dispatcher.register();
        assert!(!dispatcher.is_registered());
    }

    #[test]
    fn flags_accept_true_and_one() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag(""));
    }
}
