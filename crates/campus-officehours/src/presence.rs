//! Proof-of-presence check-in: scan the provider's QR code or type it.
//!
//! The camera is held only while the student's entry is Ready and the flow
//! is running. It is released on every exit path (decode, cancel, session
//! superseded, camera failure, or the flow future being dropped) by a guard
//! owning the stream.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use campus_core::config::PresenceConfig;
use campus_core::types::EntryId;
use campus_core::{AppError, AppResult, ErrorKind};

use crate::state::StudentView;

/// One captured video frame (8-bit luma, row-major).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub luma: Vec<u8>,
}

/// An open camera stream.
pub trait VideoStream: Send {
    /// Grab the current frame. `Ok(None)` means no frame is ready yet; an
    /// error means the stream is gone.
    fn capture(&mut self) -> AppResult<Option<Frame>>;

    /// Release the device. Must be idempotent.
    fn stop(&mut self);
}

/// Camera device access.
#[async_trait]
pub trait Camera: Send + Sync + fmt::Debug {
    /// Open a stream. Fails with `CameraPermissionDenied` or
    /// `CameraUnavailable`.
    async fn open(&self) -> AppResult<Box<dyn VideoStream>>;
}

/// QR decoding capability.
pub trait QrDecoder: Send + Sync + fmt::Debug {
    /// Decode a payload from one frame. `None` is a per-frame miss.
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// Where a decoded or typed token is submitted.
#[async_trait]
pub trait CheckInSink: Send + Sync + fmt::Debug {
    async fn check_in(&self, token: &str) -> AppResult<()>;
}

/// Why scanning is not possible and the token must be typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualEntryReason {
    /// The user refused camera access.
    PermissionDenied,
    /// No camera, or the stream failed.
    CameraUnavailable,
    /// The runtime cannot decode QR codes.
    DecodeUnsupported,
}

impl ManualEntryReason {
    /// The error kind reported for this reason.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied => ErrorKind::CameraPermissionDenied,
            Self::CameraUnavailable => ErrorKind::CameraUnavailable,
            Self::DecodeUnsupported => ErrorKind::DecodeUnsupported,
        }
    }
}

/// How the token reached the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Scanned,
    Typed,
}

/// Result of one proof-of-presence attempt.
#[derive(Debug, Clone)]
pub enum PresenceOutcome {
    /// The server accepted the token.
    CheckedIn(TokenSource),
    /// The server rejected the token (`InvalidOrExpiredToken`).
    TokenRejected(AppError),
    /// Scanning is not possible; offer manual entry.
    ManualEntryRequired(ManualEntryReason),
    /// Submission failed for a non-token reason (network, auth).
    Failed(AppError),
    /// Cancelled by the user or by teardown.
    Cancelled,
    /// The Ready session is no longer current.
    Superseded,
}

/// Stops the stream when dropped.
struct StreamGuard {
    stream: Box<dyn VideoStream>,
    stopped: bool,
}

impl StreamGuard {
    fn new(stream: Box<dyn VideoStream>) -> Self {
        Self {
            stream,
            stopped: false,
        }
    }

    fn capture(&mut self) -> AppResult<Option<Frame>> {
        self.stream.capture()
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.stream.stop();
            debug!("Camera stream stopped");
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// QR check-in flow for one student.
#[derive(Debug, Clone)]
pub struct ProofOfPresenceFlow {
    camera: Option<Arc<dyn Camera>>,
    decoder: Option<Arc<dyn QrDecoder>>,
    sink: Arc<dyn CheckInSink>,
    scan_interval: Duration,
    cancel: CancellationToken,
}

impl ProofOfPresenceFlow {
    /// Create a flow. A missing camera or decoder degrades to manual entry.
    pub fn new(
        camera: Option<Arc<dyn Camera>>,
        decoder: Option<Arc<dyn QrDecoder>>,
        sink: Arc<dyn CheckInSink>,
        config: &PresenceConfig,
    ) -> Self {
        Self {
            camera,
            decoder,
            sink,
            scan_interval: config.scan_interval(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelling the running scan. Cancellation is permanent for
    /// this flow.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel scanning and release the camera.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Scan until a payload is decoded and submitted, or until a stop
    /// condition. `view` is the student's live view; the flow stops as soon
    /// as the entry that was Ready at start is no longer Ready.
    pub async fn scan(&self, mut view: watch::Receiver<StudentView>) -> PresenceOutcome {
        let Some(entry_id) = ready_entry(&view.borrow_and_update()) else {
            return PresenceOutcome::Superseded;
        };
        let Some(decoder) = self.decoder.clone() else {
            info!(entry_id = %entry_id, "QR decoding unsupported, manual entry required");
            return PresenceOutcome::ManualEntryRequired(ManualEntryReason::DecodeUnsupported);
        };
        let Some(camera) = self.camera.clone() else {
            info!(entry_id = %entry_id, "No camera, manual entry required");
            return PresenceOutcome::ManualEntryRequired(ManualEntryReason::CameraUnavailable);
        };

        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return PresenceOutcome::Cancelled,
            opened = camera.open() => opened,
        };
        let mut stream = match opened {
            Ok(stream) => StreamGuard::new(stream),
            Err(e) => return camera_failure(&e),
        };
        info!(entry_id = %entry_id, "Camera stream acquired");

        // The session may have moved on while the camera was opening.
        if ready_entry(&view.borrow_and_update()) != Some(entry_id) {
            return PresenceOutcome::Superseded;
        }

        let mut ticker = time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let token = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(entry_id = %entry_id, "Scan cancelled");
                    return PresenceOutcome::Cancelled;
                }
                changed = view.changed() => {
                    if changed.is_err() || ready_entry(&view.borrow_and_update()) != Some(entry_id) {
                        info!(entry_id = %entry_id, "Ready session superseded, stopping scan");
                        return PresenceOutcome::Superseded;
                    }
                }
                _ = ticker.tick() => {
                    let frame = match stream.capture() {
                        Ok(Some(frame)) => frame,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(entry_id = %entry_id, error = %e, "Camera stream lost");
                            return PresenceOutcome::ManualEntryRequired(ManualEntryReason::CameraUnavailable);
                        }
                    };
                    if let Some(payload) = decoder.decode(&frame) {
                        let payload = payload.trim().to_string();
                        if !payload.is_empty() {
                            break payload;
                        }
                    }
                }
            }
        };

        stream.stop();
        info!(entry_id = %entry_id, "QR payload decoded");
        self.submit(&token, TokenSource::Scanned).await
    }

    /// Submit a typed token.
    pub async fn submit_manual(&self, token: &str) -> PresenceOutcome {
        self.submit(token, TokenSource::Typed).await
    }

    async fn submit(&self, token: &str, source: TokenSource) -> PresenceOutcome {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return PresenceOutcome::Cancelled,
            result = self.sink.check_in(token) => result,
        };
        match result {
            Ok(()) => {
                info!(?source, "Checked in");
                PresenceOutcome::CheckedIn(source)
            }
            Err(e) if e.is(ErrorKind::InvalidOrExpiredToken) => {
                info!(?source, "Token rejected");
                PresenceOutcome::TokenRejected(e)
            }
            Err(e) => {
                warn!(?source, error = %e, "Check-in failed");
                PresenceOutcome::Failed(e)
            }
        }
    }
}

fn ready_entry(view: &StudentView) -> Option<EntryId> {
    view.ready_session().map(|s| s.entry_id)
}

fn camera_failure(error: &AppError) -> PresenceOutcome {
    let reason = if error.is(ErrorKind::CameraPermissionDenied) {
        ManualEntryReason::PermissionDenied
    } else {
        ManualEntryReason::CameraUnavailable
    };
    warn!(error = %error, ?reason, "Camera could not be opened");
    PresenceOutcome::ManualEntryRequired(reason)
}
