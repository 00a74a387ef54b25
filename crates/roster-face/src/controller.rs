//! Camera ownership for one capture session.
//!
//! The controller holds the only stream, the "active" and "face visible"
//! flags, and a generation counter. Every read and every publish carries the
//! generation it started under; [`CameraController::stop`] advances it under
//! the same lock, so once `stop` returns no earlier sample can flip
//! "face visible" back on.
//!
//! Frame reads happen outside the state lock, so a stalled camera cannot
//! hold up `stop`. A reader that finishes after a stop releases the stream
//! itself.

use crate::loader::lock;
use roster_hw::{CameraError, Frame, StreamConstraints, StreamSettings, VideoDevice, VideoStream};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

/// Delay between the stream going live and the first detection.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// How long `stop` waits for an in-flight read before handing the release
/// to that reader.
const STOP_WAIT: Duration = Duration::from_millis(250);

type SharedStream = Arc<Mutex<Box<dyn VideoStream>>>;

#[derive(Default)]
struct CameraState {
    stream: Option<SharedStream>,
    settings: Option<StreamSettings>,
    active: bool,
    face_visible: bool,
    generation: u64,
}

pub struct CameraController {
    device: Arc<dyn VideoDevice>,
    constraints: StreamConstraints,
    state: Mutex<CameraState>,
}

impl CameraController {
    pub fn new(device: Arc<dyn VideoDevice>) -> Self {
        Self::with_constraints(device, StreamConstraints::default())
    }

    pub fn with_constraints(device: Arc<dyn VideoDevice>, constraints: StreamConstraints) -> Self {
        Self {
            device,
            constraints,
            state: Mutex::new(CameraState::default()),
        }
    }

    /// Acquire the stream and return the current generation.
    ///
    /// Starting while a stream is live is a no-op. On failure the stream
    /// stays empty and the error is returned as-is; there is no retry.
    pub fn start(&self) -> Result<u64, CameraError> {
        let mut state = lock(&self.state);
        if state.stream.as_ref().is_some_and(is_live) {
            return Ok(state.generation);
        }

        let stream = self.device.open_stream(&self.constraints).map_err(|e| {
            tracing::warn!(error = %e, "camera start failed");
            e
        })?;
        let settings = stream.settings().clone();
        tracing::info!(
            device = %settings.device,
            width = settings.width,
            height = settings.height,
            generation = state.generation,
            "camera active"
        );
        state.stream = Some(Arc::new(Mutex::new(stream)));
        state.settings = Some(settings);
        state.active = true;
        state.face_visible = false;
        Ok(state.generation)
    }

    /// Release the stream and invalidate the current generation. Idempotent.
    ///
    /// Returns within [`STOP_WAIT`] even when a read is stuck; the stuck
    /// reader stops the stream once its read returns.
    pub fn stop(&self) {
        let (stream, generation) = {
            let mut state = lock(&self.state);
            let stream = state.stream.take();
            state.settings = None;
            state.active = false;
            state.face_visible = false;
            state.generation += 1;
            (stream, state.generation - 1)
        };
        let Some(stream) = stream else {
            return;
        };

        let deadline = Instant::now() + STOP_WAIT;
        loop {
            match stream.try_lock() {
                Ok(mut s) => {
                    s.stop();
                    tracing::info!(generation, "camera stopped");
                    return;
                }
                Err(TryLockError::Poisoned(poisoned)) => {
                    poisoned.into_inner().stop();
                    tracing::info!(generation, "camera stopped");
                    return;
                }
                Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(TryLockError::WouldBlock) => {
                    tracing::warn!(generation, "camera read in flight, release deferred to reader");
                    return;
                }
            }
        }
    }

    /// Next frame from the live stream, or `None` once `generation` is stale.
    pub fn grab_frame(&self, generation: u64) -> Result<Option<Frame>, CameraError> {
        let stream = {
            let state = lock(&self.state);
            if state.generation != generation {
                return Ok(None);
            }
            match &state.stream {
                Some(stream) => Arc::clone(stream),
                None => return Ok(None),
            }
        };

        let mut stream = lock(&stream);
        if self.generation() != generation {
            stream.stop();
            return Ok(None);
        }
        let frame = stream.read_frame();
        if self.generation() != generation {
            stream.stop();
            return Ok(None);
        }
        frame.map(Some)
    }

    /// Record a detection result. Returns `false` (and changes nothing) when
    /// the session that produced it has been stopped.
    pub fn publish_face_visible(&self, generation: u64, visible: bool) -> bool {
        let mut state = lock(&self.state);
        if state.generation != generation || !state.active {
            return false;
        }
        state.face_visible = visible;
        true
    }

    pub fn is_current(&self, generation: u64) -> bool {
        let state = lock(&self.state);
        state.active && state.generation == generation
    }

    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    pub fn face_visible(&self) -> bool {
        lock(&self.state).face_visible
    }

    pub fn settings(&self) -> Option<StreamSettings> {
        lock(&self.state).settings.clone()
    }
}

/// A stream busy in a read counts as live.
fn is_live(stream: &SharedStream) -> bool {
    match stream.try_lock() {
        Ok(s) => s.is_live(),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_live(),
        Err(TryLockError::WouldBlock) => true,
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.stop();
    }
}
