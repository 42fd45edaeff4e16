#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lib_sheetcast::{Channel, ChannelError, FetchError, RawRow, RowSource, Snapshot, WireMessage};

pub fn snap(items: &[(&str, f64)]) -> Snapshot {
    items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

pub fn rows(items: &[(&str, &str)]) -> Vec<RawRow> {
    items
        .iter()
        .map(|(name, value)| vec![name.to_string(), value.to_string()])
        .collect()
}

/// Channel that records every frame it accepts.
#[derive(Default)]
pub struct RecordingChannel {
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
    not_ready: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn set_not_ready(&self, value: bool) {
        self.not_ready.store(value, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<WireMessage> {
        self.frames()
            .iter()
            .map(|f| serde_json::from_str(f).expect("frame is a wire message"))
            .collect()
    }

    pub fn updates(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| matches!(m, WireMessage::Update(_)))
            .count()
    }

    /// Rebuilds the subscriber's view from its message sequence.
    pub fn mirror(&self) -> Snapshot {
        let mut view = Snapshot::new();
        for message in self.messages() {
            match message {
                WireMessage::Full(full) => view = full,
                WireMessage::Update(changes) => view = changes.apply_to(&view),
            }
        }
        view
    }
}

impl Channel for RecordingChannel {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn send(&self, frame: Arc<str>) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        if self.not_ready.load(Ordering::SeqCst) {
            return Err(ChannelError::NotReady);
        }
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }
}

/// Source that replays a script of fetch results, repeating the last one.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<RawRow>, FetchError>>>,
    last: Mutex<Result<Vec<RawRow>, FetchError>>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<RawRow>, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Ok(Vec::new())),
            calls: AtomicUsize::new(0),
        }
    }
}

impl RowSource for ScriptedSource {
    async fn fetch_rows(&self) -> Result<Vec<RawRow>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => {
                *self.last.lock().unwrap() = result.clone();
                result
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

/// Source whose fetch takes `delay` and tracks how many fetches overlap.
pub struct SlowSource {
    pub delay: Duration,
    pub rows: Vec<RawRow>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl SlowSource {
    pub fn new(delay: Duration, rows: Vec<RawRow>) -> Self {
        Self {
            delay,
            rows,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl RowSource for SlowSource {
    async fn fetch_rows(&self) -> Result<Vec<RawRow>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }
}
