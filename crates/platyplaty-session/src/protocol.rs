//! Wire protocol types shared by the client and the stand-in renderer

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Pseudo-preset telling the renderer to show nothing.
pub const IDLE_URL: &str = "idle://";

/// `source` value carried by every renderer diagnostic event.
pub const EVENT_SOURCE: &str = "PLATYPLATY";

/// Line the renderer prints on stdout once its socket accepts connections.
pub const SOCKET_READY: &str = "SOCKET READY";

pub const CHANGE_AUDIO_SOURCE: &str = "CHANGE AUDIO SOURCE";
pub const INIT: &str = "INIT";
pub const LOAD_PRESET: &str = "LOAD PRESET";
pub const SHOW_WINDOW: &str = "SHOW WINDOW";
pub const SET_FULLSCREEN: &str = "SET FULLSCREEN";
pub const GET_STATUS: &str = "GET STATUS";
pub const QUIT: &str = "QUIT";

/// What a `LOAD PRESET` points the renderer at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Preset {
    Idle,
    File(PathBuf),
}

impl Preset {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Preset::File(path.into())
    }

    /// Parse the `path` parameter as it appears on the wire.
    pub fn from_wire(path: &str) -> Self {
        if path == IDLE_URL {
            Preset::Idle
        } else {
            Preset::File(PathBuf::from(path))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Preset::Idle => None,
            Preset::File(p) => Some(p),
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            Preset::Idle => IDLE_URL.to_string(),
            Preset::File(p) => p.to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    Soft,
    #[default]
    Hard,
}

impl TransitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionType::Soft => "soft",
            TransitionType::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "soft" => Some(TransitionType::Soft),
            "hard" => Some(TransitionType::Hard),
            _ => None,
        }
    }
}

/// A request before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub params: Map<String, Value>,
    /// Set for `LOAD PRESET` so the session can remember what it sent.
    preset: Option<Preset>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
            preset: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn change_audio_source(source: &str) -> Self {
        Self::new(CHANGE_AUDIO_SOURCE).with_param("audio_source", source)
    }

    pub fn init() -> Self {
        Self::new(INIT)
    }

    pub fn load_preset(preset: &Preset, transition: TransitionType) -> Self {
        let mut cmd = Self::new(LOAD_PRESET)
            .with_param("path", preset.to_wire())
            .with_param("transition_type", transition.as_str());
        cmd.preset = Some(preset.clone());
        cmd
    }

    pub fn show_window() -> Self {
        Self::new(SHOW_WINDOW)
    }

    pub fn set_fullscreen(enabled: bool) -> Self {
        Self::new(SET_FULLSCREEN).with_param("enabled", enabled)
    }

    pub fn get_status() -> Self {
        Self::new(GET_STATUS)
    }

    pub fn quit() -> Self {
        Self::new(QUIT)
    }

    pub fn preset(&self) -> Option<&Preset> {
        self.preset.as_ref()
    }

    /// Build the JSON request object `{"command", "id", ...params}`.
    pub fn to_request(&self, id: u64) -> Value {
        let mut obj = Map::with_capacity(self.params.len() + 2);
        for (k, v) in &self.params {
            obj.insert(k.clone(), v.clone());
        }
        obj.insert("command".to_string(), Value::String(self.name.clone()));
        obj.insert("id".to_string(), Value::from(id));
        Value::Object(obj)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: Option<u64>,
    pub success: bool,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok(id: Option<u64>, data: Option<Map<String, Value>>) -> Self {
        Self {
            id,
            success: true,
            data,
            error: None,
        }
    }

    pub fn err(id: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Diagnostic event the renderer writes to stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StderrEvent {
    KeyPressed { key: String },
    Disconnect { reason: String },
    AudioError { reason: String },
    Quit { reason: String },
}

impl StderrEvent {
    /// JSON payload including the `source` marker.
    pub fn to_payload(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(obj) = &mut value {
            obj.insert("source".to_string(), Value::from(EVENT_SOURCE));
        }
        value.to_string()
    }
}

/// Interpret a decoded stderr payload.
///
/// Anything that is not JSON, lacks the `PLATYPLATY` source, or does not
/// match a known event shape yields `None` and must be passed through.
pub fn parse_stderr_event(payload: &str) -> Option<StderrEvent> {
    let value: Value = serde_json::from_str(payload).ok()?;
    if value.get("source").and_then(Value::as_str) != Some(EVENT_SOURCE) {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn default_audio_source() -> String {
    "@DEFAULT_SINK@.monitor".to_string()
}

/// Settings for one renderer session and the tasks around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub socket_path: PathBuf,
    /// Falls back to `PLATYPLATY_RENDERER`, then a sibling of the current executable.
    #[serde(default)]
    pub renderer_binary: Option<PathBuf>,
    #[serde(default = "default_audio_source")]
    pub audio_source: String,
    #[serde(default)]
    pub transition_type: TransitionType,
    /// Seconds each preset plays under autoplay.
    pub preset_duration: u64,
    #[serde(default)]
    pub fullscreen: bool,
    pub handshake_timeout_ms: u64,
    pub queue_poll_ms: u64,
    pub quit_timeout_ms: u64,
    #[serde(default)]
    pub keybindings: crate::dispatch::RendererKeybindings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_path: std::env::temp_dir().join("platyplaty.sock"),
            renderer_binary: None,
            audio_source: default_audio_source(),
            transition_type: TransitionType::Hard,
            preset_duration: 30,
            fullscreen: false,
            handshake_timeout_ms: 10_000,
            queue_poll_ms: 500,
            quit_timeout_ms: 2_000,
            keybindings: crate::dispatch::RendererKeybindings::default(),
        }
    }
}
