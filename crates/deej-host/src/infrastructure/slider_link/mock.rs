//! Scripted line transport for tests.
//!
//! # Why a mock transport?
//!
//! A real serial board cannot be attached to a CI machine.  The
//! `MockLineTransport` hands out one scripted connection per `open` call:
//!
//! - [`push_lines`](MockLineTransport::push_lines) – a connection that yields
//!   the given text and then ends (simulates unplugging the board).
//! - [`push_stream`](MockLineTransport::push_stream) – a live connection; the
//!   test writes into the returned half whenever it wants.
//! - [`push_failure`](MockLineTransport::push_failure) – an `open` that fails.
//!
//! When the script runs out, `open` fails with `NotFound`, like a port that
//! is not plugged in.
//!
//! # Usage in tests
//!
//! ```ignore
//! let transport = Arc::new(MockLineTransport::new());
//! let mut board = transport.push_stream();
//! board.write_all(b"512|0|1023\r\n").await.unwrap();
//! ```

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{BufReader, DuplexStream};

use crate::infrastructure::slider_link::{ConnectionSettings, LineReader, LineTransport, LinkError};

/// Buffer size of the in-memory pipe behind `push_stream`.
const STREAM_BUFFER: usize = 4096;

enum Scripted {
    Lines(String),
    Stream(DuplexStream),
    Failure(String),
}

/// Records every `open` and replays scripted connections in order.
#[derive(Default)]
pub struct MockLineTransport {
    script: Mutex<VecDeque<Scripted>>,
    opened: Mutex<Vec<ConnectionSettings>>,
}

impl MockLineTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a connection that yields `data` and then reaches end of stream.
    pub fn push_lines(&self, data: &str) {
        self.push(Scripted::Lines(data.to_string()));
    }

    /// Queues a live connection and returns the board side of it.
    pub fn push_stream(&self) -> DuplexStream {
        let (board, host) = tokio::io::duplex(STREAM_BUFFER);
        self.push(Scripted::Stream(host));
        board
    }

    /// Queues a failed `open`.
    pub fn push_failure(&self, reason: &str) {
        self.push(Scripted::Failure(reason.to_string()));
    }

    /// Number of `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Settings passed to each `open` call, in order.
    pub fn opened_settings(&self) -> Vec<ConnectionSettings> {
        self.opened.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn push(&self, scripted: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(scripted);
    }
}

#[async_trait]
impl LineTransport for MockLineTransport {
    async fn open(&self, settings: &ConnectionSettings) -> Result<LineReader, LinkError> {
        self.opened
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(settings.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();

        let open_error = |reason: String| LinkError::Open {
            port: settings.port.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, reason),
        };

        match next {
            Some(Scripted::Lines(data)) => Ok(Box::new(Cursor::new(data.into_bytes()))),
            Some(Scripted::Stream(host)) => Ok(Box::new(BufReader::new(host))),
            Some(Scripted::Failure(reason)) => Err(open_error(reason)),
            None => Err(open_error("no scripted connection left".to_string())),
        }
    }
}
