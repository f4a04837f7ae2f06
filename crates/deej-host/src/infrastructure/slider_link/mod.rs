//! Slider link: the serial connection to the board.
//!
//! The link owns the connection lifecycle and the [`FrameDecoder`]:
//!
//! ```text
//!  LineTransport::open ──► reader task ──► lines ──► FrameDecoder ──► subscribers
//!          ▲                                                  (registration order)
//!          └── retry every 2 s / reconnect 2 s after a lost connection
//! ```
//!
//! # Back-pressure (for beginners)
//!
//! Every subscriber gets its own `mpsc` channel with capacity 1, and events
//! are delivered with `send().await` one subscriber after the other.  A slow
//! subscriber therefore stalls the link instead of losing slider positions.
//! In practice there is exactly one subscriber: the routing use case.
//!
//! # Settings changes
//!
//! [`LinkSettings`] arrive on a `watch` channel.  Any change resets the
//! decoder so the next frame re-emits every slider; a change of port or baud
//! rate also drops the connection and reopens it with the new parameters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deej_core::{DecoderSettings, FrameDecoder, SliderMoveEvent};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

pub mod device;
pub mod mock;

/// Baud rate used when none (or a non-positive one) is configured.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Lines buffered between the reader task and the decoder.
const LINE_BUFFER: usize = 16;

/// Longest serial line kept.  Anything longer is dropped as line noise.
const MAX_LINE_BYTES: u64 = 512;

/// Errors that can occur in the slider link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No serial port is configured.
    #[error("no serial port configured")]
    NoPort,

    /// The transport could not open the port.
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from an open connection failed.
    #[error("serial read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Returns the conventional serial device for the current platform.
pub fn default_port() -> &'static str {
    #[cfg(target_os = "windows")]
    return "COM4";
    #[cfg(target_os = "macos")]
    return "/dev/tty.usbmodem1401";
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    return "/dev/ttyUSB0";
}

/// Everything the link reads from configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkSettings {
    pub connection: ConnectionSettings,
    pub decoder: DecoderSettings,
}

/// An open connection, read line by line.
pub type LineReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Opens connections to the board.
///
/// Implementations: [`device::DeviceLineTransport`] for real device paths,
/// [`mock::MockLineTransport`] for tests.
#[async_trait]
pub trait LineTransport: Send + Sync {
    async fn open(&self, settings: &ConnectionSettings) -> Result<LineReader, LinkError>;
}

/// Connection state changes published to state subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Connected { port: String },
    Disconnected,
}

/// Retry timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    /// Delay between failed connection attempts.
    pub connect_retry: Duration,
    /// Delay before reconnecting after a lost connection.
    pub reconnect_delay: Duration,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            connect_retry: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Why a connection ended.
enum Disconnect {
    Shutdown,
    Reconfigured,
    Lost,
}

/// Reads slider frames from the board and fans out move events.
pub struct SliderLink {
    transport: Arc<dyn LineTransport>,
    settings: watch::Receiver<LinkSettings>,
    settings_open: bool,
    timing: LinkTiming,
    verbose: bool,
    subscribers: Vec<mpsc::Sender<SliderMoveEvent>>,
    state_tx: broadcast::Sender<LinkState>,
}

impl SliderLink {
    pub fn new(transport: Arc<dyn LineTransport>, settings: watch::Receiver<LinkSettings>) -> Self {
        let (state_tx, _) = broadcast::channel(16);
        Self {
            transport,
            settings,
            settings_open: true,
            timing: LinkTiming::default(),
            verbose: false,
            subscribers: Vec::new(),
            state_tx,
        }
    }

    pub fn with_timing(mut self, timing: LinkTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Logs every raw line and every emitted move at `debug`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Registers a move subscriber.  Subscribers are served in registration
    /// order.
    pub fn subscribe_moves(&mut self) -> mpsc::Receiver<SliderMoveEvent> {
        let (tx, rx) = mpsc::channel(1);
        self.subscribers.push(tx);
        rx
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    /// Connects, reads and reconnects until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut decoder = FrameDecoder::new(self.settings.borrow().decoder);

        loop {
            let settings = self.settings.borrow_and_update().clone();
            decoder.set_settings(settings.decoder);
            let connection = settings.connection;

            let opened = tokio::select! {
                _ = shutdown.recv() => break,
                opened = self.transport.open(&connection) => opened,
            };
            let reader = match opened {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(port = %connection.port, error = %e, "failed to connect to serial port");
                    if !pause(self.timing.connect_retry, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            info!(port = %connection.port, baud_rate = connection.baud_rate, "connected to serial port");
            self.publish_state(LinkState::Connected {
                port: connection.port.clone(),
            });
            decoder.reset();

            let (mut lines, reader_task) = spawn_line_reader(reader);
            let reason = self
                .read_frames(&mut lines, &mut decoder, &connection, &mut shutdown)
                .await;
            reader_task.abort();
            self.publish_state(LinkState::Disconnected);

            match reason {
                Disconnect::Shutdown => break,
                Disconnect::Reconfigured => continue,
                Disconnect::Lost => {
                    info!(delay = ?self.timing.reconnect_delay, "serial connection lost, reconnecting");
                    if !pause(self.timing.reconnect_delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }
        debug!("slider link stopped");
    }

    async fn read_frames(
        &mut self,
        lines: &mut mpsc::Receiver<Result<String, LinkError>>,
        decoder: &mut FrameDecoder,
        connection: &ConnectionSettings,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Disconnect {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return Disconnect::Shutdown,
                changed = self.settings.changed(), if self.settings_open => {
                    if changed.is_err() {
                        self.settings_open = false;
                        continue;
                    }
                    let settings = self.settings.borrow_and_update().clone();
                    decoder.set_settings(settings.decoder);
                    decoder.reset();
                    if settings.connection != *connection {
                        info!(
                            port = %settings.connection.port,
                            baud_rate = settings.connection.baud_rate,
                            "serial connection settings changed, reconnecting"
                        );
                        return Disconnect::Reconfigured;
                    }
                    debug!("slider settings updated, re-emitting all sliders");
                }
                line = lines.recv() => match line {
                    Some(Ok(line)) => self.dispatch(decoder, &line).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "failed to read line from serial port");
                        return Disconnect::Lost;
                    }
                    None => {
                        warn!(port = %connection.port, "serial port closed");
                        return Disconnect::Lost;
                    }
                },
            }
        }
    }

    async fn dispatch(&self, decoder: &mut FrameDecoder, line: &str) {
        if self.verbose {
            debug!(line = line.trim_end(), "read line from serial port");
        }

        for event in decoder.decode(line) {
            if self.verbose {
                debug!(slider = event.slider_id, value = event.percent_value, "slider moved");
            }
            for subscriber in &self.subscribers {
                if subscriber.send(event).await.is_err() {
                    debug!(slider = event.slider_id, "move subscriber gone");
                }
            }
        }
    }

    fn publish_state(&self, state: LinkState) {
        // no state subscribers is fine
        let _ = self.state_tx.send(state);
    }
}

/// Moves blocking line reads onto their own task.
///
/// `read_until` loses a partially read line when cancelled, so it must not
/// sit in a `select!` next to the settings and shutdown branches.  The
/// channel closes at end of stream.  Lines longer than [`MAX_LINE_BYTES`]
/// are skipped up to the next newline.
fn spawn_line_reader(
    mut reader: LineReader,
) -> (mpsc::Receiver<Result<String, LinkError>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    let task = tokio::spawn(async move {
        let mut discarding = false;
        loop {
            let mut raw = Vec::new();
            match (&mut reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {
                    let terminated = raw.last() == Some(&b'\n');
                    if !terminated && raw.len() as u64 >= MAX_LINE_BYTES {
                        discarding = true;
                        continue;
                    }
                    if discarding {
                        discarding = false;
                        debug!("dropped overlong serial line");
                        continue;
                    }
                    // garbage bytes after connecting are routine; the decoder
                    // rejects whatever the lossy conversion produces
                    let line = String::from_utf8_lossy(&raw).into_owned();
                    if tx.send(Ok(line)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(LinkError::Read(e))).await;
                    break;
                }
            }
        }
    });
    (rx, task)
}

/// Sleeps for `delay`.  Returns `false` if shutdown fired first.
async fn pause(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = shutdown.recv() => false,
        _ = time::sleep(delay) => true,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
