//! Single-task client loop tying the session, canvas and viewport together.

pub mod input;

pub use input::{InputEvent, InputParseError};

use bytes::Bytes;
use place_proto::wire::{self, PixelRecord};
use place_proto::{ValidationError, palette};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::canvas::PixelStore;
use crate::identity::Identity;
use crate::session::{
    ConnectionManager, ConnectionState, Notice, SendOutcome, SessionError, SessionEvent,
};
use crate::telemetry::SnapshotTimer;
use crate::viewport::ViewportEngine;

const CLOSE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("crosshair is off the canvas")]
    OffCanvas,
}

/// Change hooks for rendering or status collaborators. Everything they get
/// is a read-only borrow.
pub trait CanvasObserver {
    fn buffer_changed(&mut self, _store: &PixelStore) {}
    fn viewport_changed(&mut self, _viewport: &ViewportEngine) {}
    fn notice(&mut self, _notice: &Notice) {}
    fn connection_changed(&mut self, _state: ConnectionState) {}
}

impl CanvasObserver for () {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaintOutcome {
    /// The server echoed the pixel back.
    Confirmed,
    Rejected(Notice),
    /// Not sent because a handshake was in flight.
    Dropped,
    TimedOut,
}

pub struct PlaceClient<O> {
    store: PixelStore,
    viewport: ViewportEngine,
    session: ConnectionManager,
    observer: O,
    selected: u8,
}

impl<O: CanvasObserver> PlaceClient<O> {
    pub fn new(session: ConnectionManager, viewport: ViewportEngine, observer: O) -> Self {
        Self {
            store: PixelStore::new(),
            viewport,
            session,
            observer,
            selected: 0,
        }
    }

    pub fn store(&self) -> &PixelStore {
        &self.store
    }

    pub fn viewport(&self) -> &ViewportEngine {
        &self.viewport
    }

    pub fn session(&self) -> &ConnectionManager {
        &self.session
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn selected_color(&self) -> u8 {
        self.selected
    }

    pub fn select_color(&mut self, color: u8) -> Result<(), ClientError> {
        if !palette::is_valid(color as usize) {
            return Err(ValidationError::ColorOutOfRange(color).into());
        }
        self.selected = color;
        debug!(target: "place::client", color, "color selected");
        Ok(())
    }

    pub async fn start(&mut self, identity: Identity) -> Result<SendOutcome, ClientError> {
        Ok(self.session.start(identity).await?)
    }

    /// Sends a paint request for the selected color. The local canvas only
    /// changes once the server echoes the pixel.
    pub async fn paint(&mut self, x: u16, y: u16) -> Result<SendOutcome, ClientError> {
        let record = PixelRecord::paint(self.selected, u32::from(x), u32::from(y))?;
        let frame = wire::encode_paint(&record);
        let outcome = self.session.send(Bytes::copy_from_slice(&frame)).await?;
        debug!(target: "place::client", x, y, color = self.selected, ?outcome, "paint requested");
        Ok(outcome)
    }

    /// Paints under the crosshair.
    pub async fn apply(&mut self) -> Result<SendOutcome, ClientError> {
        let (x, y) = self
            .viewport
            .targeted_pixel()
            .ok_or(ClientError::OffCanvas)?;
        self.paint(x, y).await
    }

    /// Paints once and waits for the server's echo or an error notice.
    pub async fn paint_and_confirm(
        &mut self,
        x: u16,
        y: u16,
        wait: Duration,
    ) -> Result<PaintOutcome, ClientError> {
        if self.paint(x, y).await? == SendOutcome::Dropped {
            return Ok(PaintOutcome::Dropped);
        }
        let color = self.selected;
        let waited = tokio::time::timeout(wait, async {
            while let Some(event) = self.session.next_event().await {
                self.handle_session_event(event.clone());
                match event {
                    SessionEvent::Pixel(record)
                        if record.x == x && record.y == y && record.color == color =>
                    {
                        return PaintOutcome::Confirmed;
                    }
                    SessionEvent::Notice(notice) if notice.is_error() => {
                        return PaintOutcome::Rejected(notice);
                    }
                    _ => {}
                }
            }
            PaintOutcome::TimedOut
        })
        .await;
        Ok(waited.unwrap_or(PaintOutcome::TimedOut))
    }

    pub async fn handle_input(&mut self, event: InputEvent) -> Result<(), ClientError> {
        let before = self.viewport.revision();
        match event {
            InputEvent::DragStart(p) => self.viewport.begin_drag(p),
            InputEvent::DragMove(p) => {
                self.viewport.drag_to(p);
            }
            InputEvent::DragEnd => self.viewport.end_drag(),
            InputEvent::Pan(delta) => self.viewport.pan(delta),
            InputEvent::Wheel(delta_y) => {
                self.viewport.wheel(delta_y);
            }
            InputEvent::ZoomIn => {
                self.viewport.zoom_in();
            }
            InputEvent::ZoomOut => {
                self.viewport.zoom_out();
            }
            InputEvent::Reset => {
                self.viewport.reset();
            }
            InputEvent::Click(screen) => match self.viewport.hit_test(screen) {
                Some((x, y)) => {
                    self.paint(x, y).await?;
                }
                None => debug!(target: "place::client", x = screen.x, y = screen.y, "click off canvas"),
            },
            InputEvent::SelectColor(color) => self.select_color(color)?,
            InputEvent::Apply => {
                self.apply().await?;
            }
            InputEvent::Resize { width, height } => self.viewport.resize(width, height),
            InputEvent::Quit => {}
        }
        if self.viewport.revision() != before {
            self.observer.viewport_changed(&self.viewport);
        }
        Ok(())
    }

    pub fn handle_session_event(&mut self, event: SessionEvent) {
        let before = self.store.revision();
        match event {
            SessionEvent::Connected => {
                self.observer.connection_changed(ConnectionState::Connected);
            }
            SessionEvent::Pixel(record) => {
                // Rejections are already logged by the store.
                let _ = self
                    .store
                    .set_pixel(u32::from(record.x), u32::from(record.y), record.color);
            }
            SessionEvent::Snapshot(payload) => {
                let _timer = SnapshotTimer::start(payload.len());
                let indices = wire::unpack_snapshot(&payload);
                if let Err(err) = self.store.load_snapshot(&indices) {
                    warn!(target: "place::client", error = %err, "snapshot discarded");
                }
            }
            SessionEvent::Notice(notice) => self.observer.notice(&notice),
            SessionEvent::Closed(kind) => {
                debug!(target: "place::client", code = kind.code(), "session closed");
                self.observer.connection_changed(self.session.state());
            }
        }
        if self.store.revision() != before {
            self.observer.buffer_changed(&self.store);
        }
    }

    /// Next session event, already applied to the canvas and observer.
    pub async fn pump(&mut self) -> Option<SessionEvent> {
        let event = self.session.next_event().await?;
        self.handle_session_event(event.clone());
        Some(event)
    }

    /// Runs until `Quit` arrives or the input channel closes. Failures on
    /// individual inputs are logged and the loop continues.
    pub async fn run(&mut self, identity: Identity, mut inputs: mpsc::Receiver<InputEvent>) {
        if let Err(err) = self.start(identity).await {
            warn!(target: "place::client", error = %err, "initial snapshot request failed");
        }
        loop {
            tokio::select! {
                event = self.session.next_event() => match event {
                    Some(event) => self.handle_session_event(event),
                    None => break,
                },
                input = inputs.recv() => match input {
                    None | Some(InputEvent::Quit) => break,
                    Some(input) => {
                        if let Err(err) = self.handle_input(input).await {
                            warn!(target: "place::client", error = %err, ?input, "input rejected");
                        }
                    }
                },
            }
        }
        self.shutdown().await;
    }

    /// Closes the session and waits briefly for the server to acknowledge.
    pub async fn shutdown(&mut self) {
        self.session.close();
        if self.session.state() != ConnectionState::Closing {
            return;
        }
        let drained = tokio::time::timeout(CLOSE_GRACE, async {
            while let Some(event) = self.session.next_event().await {
                let closed = matches!(event, SessionEvent::Closed(_));
                self.handle_session_event(event);
                if closed {
                    break;
                }
            }
        })
        .await;
        if drained.is_err() {
            info!(target: "place::client", "server did not acknowledge close in time");
        }
    }
}
