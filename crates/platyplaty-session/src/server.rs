//! Scripted stand-in renderer - runs in its own process
//!
//! Speaks the renderer side of the protocol without drawing anything, so the
//! controller can be exercised end to end. Preset file names steer it:
//!
//! - `crash`: the process dies without answering
//! - `reject`: the load is refused with `success: false`
//! - `slow`: the answer is delayed, optionally after reporting a key press
//! - `quit`: the load succeeds, then the renderer announces QUIT and exits
//! - `wrongid`: the answer carries somebody else's request id
//! - `garbage`: the answer is a frame that is not JSON

use crate::error::Result;
use crate::netstring;
use crate::protocol::{
    CommandResponse, StderrEvent, TransitionType, CHANGE_AUDIO_SOURCE, GET_STATUS, IDLE_URL,
    INIT, LOAD_PRESET, QUIT, SET_FULLSCREEN, SHOW_WINDOW, SOCKET_READY,
};
use crate::transport::{MessageTransport, TransportListener};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exit before printing `SOCKET READY`.
pub const EXIT_BEFORE_READY_ENV: &str = "MOCK_RENDERER_EXIT_BEFORE_READY";
/// Offset added to the request id by `wrongid` presets.
pub const WRONG_ID_OFFSET: u64 = 1000;
/// Frame sent back for `garbage` presets.
pub const GARBAGE_FRAME: &str = "this is not a response";

/// Framed non-event payload written to stderr once a client connects.
pub const NOISE_ENV: &str = "MOCK_RENDERER_NOISE";
/// Key reported on stderr while a `slow` preset is loading.
pub const SLOW_KEY_ENV: &str = "MOCK_RENDERER_SLOW_KEY";

const SLOW_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConfig {
    pub socket_path: PathBuf,
    pub exit_before_ready: bool,
    pub noise: Option<String>,
    pub slow_key: Option<String>,
    pub slow_delay: Duration,
}

impl MockConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            exit_before_ready: false,
            noise: None,
            slow_key: None,
            slow_delay: SLOW_DELAY,
        }
    }

    /// Read the `MOCK_RENDERER_*` knobs from the environment.
    pub fn from_env(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            exit_before_ready: std::env::var_os(EXIT_BEFORE_READY_ENV).is_some(),
            noise: std::env::var(NOISE_ENV).ok(),
            slow_key: std::env::var(SLOW_KEY_ENV).ok(),
            ..Self::new(socket_path)
        }
    }
}

/// How the stand-in renderer stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockExit {
    BeforeReady,
    ClientClosed,
    Quit,
    /// A `crash` preset was loaded; the caller should die abnormally.
    Crash(PathBuf),
}

enum Action {
    Reply(CommandResponse),
    /// Sent as is; the renderer keeps serving afterwards.
    Raw(String),
    Slow(CommandResponse),
    Quit(CommandResponse, String),
    Crash(PathBuf),
}

/// Renderer state as far as the protocol can observe it.
#[derive(Debug, Default)]
pub struct MockRenderer {
    config: Option<MockConfig>,
    initialized: bool,
    audio_source: Option<String>,
    window_visible: bool,
    fullscreen: bool,
    preset: Option<String>,
    loads: u64,
}

impl MockRenderer {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config: Some(config),
            ..Default::default()
        }
    }

    /// Bind, announce readiness on stdout, then serve one client.
    pub async fn run(&mut self) -> Result<MockExit> {
        let Some(config) = self.config.clone() else {
            return Ok(MockExit::ClientClosed);
        };
        if config.exit_before_ready {
            tracing::info!("Exiting before ready");
            return Ok(MockExit::BeforeReady);
        }

        let listener = TransportListener::bind(&config.socket_path).await?;
        {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", SOCKET_READY)?;
            stdout.flush()?;
        }

        let transport = listener.accept().await?;
        tracing::info!("Controller connected");

        if let Some(noise) = &config.noise {
            emit_raw(noise);
        }

        let exit = self.serve(transport).await;
        // A crashing renderer leaves its socket file behind.
        if !matches!(exit, Ok(MockExit::Crash(_))) {
            let _ = std::fs::remove_file(&config.socket_path);
        }
        exit
    }

    /// Answer requests on one connection until it closes or the renderer exits.
    pub async fn serve(&mut self, mut transport: MessageTransport) -> Result<MockExit> {
        loop {
            let payload = match transport.recv_frame().await {
                Ok(payload) => payload,
                Err(crate::error::SessionError::ConnectionClosed) => {
                    return Ok(MockExit::ClientClosed)
                }
                Err(e) => return Err(e),
            };

            let response = match self.handle(&payload) {
                Action::Reply(response) => response,
                Action::Raw(frame) => {
                    transport.send_frame(&frame).await?;
                    continue;
                }
                Action::Slow(response) => {
                    let (key, delay) = self
                        .config
                        .as_ref()
                        .map(|c| (c.slow_key.clone(), c.slow_delay))
                        .unwrap_or((None, SLOW_DELAY));
                    if let Some(key) = key {
                        emit(&StderrEvent::KeyPressed { key });
                    }
                    tokio::time::sleep(delay).await;
                    response
                }
                Action::Quit(response, reason) => {
                    transport
                        .send_frame(&serde_json::to_string(&response)?)
                        .await?;
                    emit(&StderrEvent::Quit { reason });
                    transport.shutdown().await;
                    return Ok(MockExit::Quit);
                }
                Action::Crash(path) => {
                    tracing::error!("Crashing on {}", path.display());
                    return Ok(MockExit::Crash(path));
                }
            };

            transport
                .send_frame(&serde_json::to_string(&response)?)
                .await?;
        }
    }

    fn handle(&mut self, payload: &str) -> Action {
        let request: Map<String, Value> = match serde_json::from_str(payload) {
            Ok(Value::Object(obj)) => obj,
            _ => return Action::Reply(CommandResponse::err(None, "invalid request")),
        };
        let id = request.get("id").and_then(Value::as_u64);
        let command = request
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default();
        tracing::debug!(id, command, "request");

        let fail = |message: &str| Action::Reply(CommandResponse::err(id, message));
        let ok = || Action::Reply(CommandResponse::ok(id, None));

        match command {
            CHANGE_AUDIO_SOURCE => {
                if self.initialized {
                    return fail("audio source must be set before INIT");
                }
                match request.get("audio_source").and_then(Value::as_str) {
                    Some(source) => {
                        self.audio_source = Some(source.to_string());
                        ok()
                    }
                    None => fail("missing audio_source"),
                }
            }
            INIT => {
                if self.initialized {
                    return fail("already initialized");
                }
                self.initialized = true;
                ok()
            }
            LOAD_PRESET => self.load_preset(id, &request),
            SHOW_WINDOW => {
                self.window_visible = true;
                ok()
            }
            SET_FULLSCREEN => {
                if !self.window_visible {
                    return fail("window is not visible");
                }
                match request.get("enabled").and_then(Value::as_bool) {
                    Some(enabled) => {
                        self.fullscreen = enabled;
                        ok()
                    }
                    None => fail("missing enabled"),
                }
            }
            GET_STATUS => Action::Reply(CommandResponse::ok(id, Some(self.status()))),
            QUIT => Action::Quit(CommandResponse::ok(id, None), "quit command".into()),
            _ => fail("unknown command"),
        }
    }

    fn load_preset(&mut self, id: Option<u64>, request: &Map<String, Value>) -> Action {
        let fail = |message: &str| Action::Reply(CommandResponse::err(id, message));

        if !self.initialized {
            return fail("not initialized");
        }
        let Some(path) = request.get("path").and_then(Value::as_str) else {
            return fail("missing path");
        };
        if path != IDLE_URL && !Path::new(path).is_absolute() {
            return fail("path must be absolute");
        }
        let transition = request.get("transition_type").and_then(Value::as_str);
        if transition.and_then(TransitionType::parse).is_none() {
            return fail("invalid transition_type");
        }

        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.contains("crash") {
            return Action::Crash(PathBuf::from(path));
        }
        if name.contains("reject") {
            return fail(&format!("failed to compile preset {}", name));
        }
        if name.contains("wrongid") {
            let wrong = CommandResponse::ok(id.map(|i| i + WRONG_ID_OFFSET), None);
            return match serde_json::to_string(&wrong) {
                Ok(frame) => Action::Raw(frame),
                Err(e) => fail(&e.to_string()),
            };
        }
        if name.contains("garbage") {
            return Action::Raw(GARBAGE_FRAME.to_string());
        }

        self.preset = Some(path.to_string());
        self.loads += 1;
        let response = CommandResponse::ok(id, None);
        if name.contains("slow") {
            Action::Slow(response)
        } else if name.contains("quit") {
            Action::Quit(response, "window closed".into())
        } else {
            Action::Reply(response)
        }
    }

    fn status(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("initialized".into(), self.initialized.into());
        data.insert(
            "audio_source".into(),
            self.audio_source.clone().map_or(Value::Null, Value::from),
        );
        data.insert(
            "preset".into(),
            self.preset.clone().map_or(Value::Null, Value::from),
        );
        data.insert("loads".into(), self.loads.into());
        data.insert("window_visible".into(), self.window_visible.into());
        data.insert("fullscreen".into(), self.fullscreen.into());
        data.insert("pid".into(), std::process::id().into());
        data
    }
}

/// Write one framed diagnostic event to stderr.
pub fn emit(event: &StderrEvent) {
    emit_raw(&event.to_payload());
}

fn emit_raw(payload: &str) {
    let mut stderr = std::io::stderr().lock();
    let _ = stderr.write_all(&netstring::encode(payload));
    let _ = stderr.flush();
}
