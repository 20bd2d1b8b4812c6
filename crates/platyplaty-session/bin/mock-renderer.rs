//! Stand-in renderer process entry point
//!
//! Spawned by the controller in place of the real renderer. Usage:
//! `mock-renderer --socket-path <path>`.

use platyplaty_session::netstring;
use platyplaty_session::server::{MockConfig, MockExit, MockRenderer};
use std::io::Write;

/// Log lines go to stderr as netstring frames so they never break the
/// framing of diagnostic events; the controller passes them through.
struct FramedStderr;

impl Write for FramedStderr {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let frame = netstring::encode(&String::from_utf8_lossy(buf));
        std::io::stderr().lock().write_all(&frame)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()
    }
}

fn socket_path_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--socket-path" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--socket-path=") {
            return Some(path.to_string());
        }
    }
    None
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(|| FramedStderr)
        .with_ansi(false)
        .init();

    let Some(socket_path) = socket_path_arg() else {
        eprintln!("usage: mock-renderer --socket-path <path>");
        std::process::exit(2);
    };

    tracing::info!("Mock renderer starting on {}", socket_path);

    let mut renderer = MockRenderer::new(MockConfig::from_env(socket_path));
    match renderer.run().await {
        Ok(MockExit::BeforeReady) => std::process::exit(3),
        Ok(MockExit::Crash(_)) => std::process::exit(134),
        Ok(exit) => tracing::info!(?exit, "Mock renderer shutting down"),
        Err(e) => {
            tracing::error!("Mock renderer failed: {}", e);
            std::process::exit(1);
        }
    }
}
