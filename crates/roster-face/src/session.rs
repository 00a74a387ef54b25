//! Enrollment and face-login sessions.
//!
//! A session owns the camera from open until it closes. Closing happens on
//! success, on an explicit [`close`](EnrollmentSession::close), or when the
//! session is dropped, whichever comes first.

use crate::controller::CameraController;
use crate::detection::spawn_detection_loop;
use crate::loader::{lock, ModelLoader, SharedRuntime};
use crate::runtime::{FaceDetection, FaceRuntime, RuntimeError};
use roster_core::{
    DescriptorPayload, EnrollmentStatus, FaceBackend, RecordId, VerifiedIdentity, VerifyOutcome,
};
use roster_hw::{CameraError, VideoDevice};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// How long an enrollment result stays on screen before the caller closes it.
pub const AUTO_CLOSE_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("face models are not loaded")]
    ModelsNotLoaded,
    #[error("face runtime: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("camera is not running")]
    CameraInactive,
    #[error("server request failed: {0}")]
    Backend(String),
    #[error("session already finished")]
    Closed,
    #[error("capture worker failed: {0}")]
    Worker(String),
}

impl SessionError {
    fn backend(e: impl std::error::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Nothing sent; the camera keeps running.
    NoFace,
    Enrolled(EnrollmentStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyAttempt {
    /// Nothing sent; the camera keeps running.
    NoFace,
    /// The success callback has run and the camera is off.
    Matched,
    /// The server did not recognize the face; the camera keeps running.
    NotRecognized { message: Option<String> },
}

/// Live camera plus detection loop, shared by both session kinds.
struct Capture<R> {
    camera: Arc<CameraController>,
    runtime: SharedRuntime<R>,
    detection: Option<JoinHandle<()>>,
}

impl<R: FaceRuntime> Capture<R> {
    fn open(
        device: Arc<dyn VideoDevice>,
        loader: &ModelLoader<R>,
        settle: Duration,
    ) -> Result<Self, SessionError> {
        if !loader.load_models() {
            return Err(SessionError::ModelsNotLoaded);
        }
        let runtime = loader.runtime().ok_or(SessionError::ModelsNotLoaded)?;

        let camera = Arc::new(CameraController::new(device));
        let generation = camera.start()?;
        let detection =
            spawn_detection_loop(Arc::clone(&camera), Arc::clone(&runtime), generation, settle)
                .map_err(|e| SessionError::Worker(e.to_string()))?;

        Ok(Self {
            camera,
            runtime,
            detection: Some(detection),
        })
    }

    /// One fresh detection, independent of the loop's last result.
    async fn sample(&self) -> Result<Option<FaceDetection>, SessionError> {
        let generation = self.camera.generation();
        if !self.camera.is_current(generation) {
            return Err(SessionError::CameraInactive);
        }
        let camera = Arc::clone(&self.camera);
        let runtime = Arc::clone(&self.runtime);
        tokio::task::spawn_blocking(move || -> Result<Option<FaceDetection>, SessionError> {
            let frame = camera
                .grab_frame(generation)?
                .ok_or(SessionError::CameraInactive)?;
            let found = lock(&runtime).detect_single_face(&frame)?;
            Ok(found)
        })
        .await
        .map_err(|e| SessionError::Worker(e.to_string()))?
    }

    fn close(&mut self) {
        self.camera.stop();
        // The loop exits on its own at the next generation check.
        self.detection.take();
    }
}

impl<R> Drop for Capture<R> {
    fn drop(&mut self) {
        self.camera.stop();
    }
}

/// Captures one descriptor and enrolls it for a person.
pub struct EnrollmentSession<R: FaceRuntime, B: FaceBackend> {
    capture: Capture<R>,
    backend: Arc<B>,
    personnel_id: RecordId,
    status: Option<EnrollmentStatus>,
}

impl<R: FaceRuntime, B: FaceBackend> EnrollmentSession<R, B> {
    /// Load models if needed, start the camera and, after `settle`, the
    /// detection loop.
    pub fn open(
        device: Arc<dyn VideoDevice>,
        loader: &ModelLoader<R>,
        backend: Arc<B>,
        personnel_id: RecordId,
        settle: Duration,
    ) -> Result<Self, SessionError> {
        let capture = Capture::open(device, loader, settle)?;
        tracing::info!(personnel_id = %personnel_id, "enrollment session opened");
        Ok(Self {
            capture,
            backend,
            personnel_id,
            status: None,
        })
    }

    pub fn camera(&self) -> &CameraController {
        &self.capture.camera
    }

    pub fn face_visible(&self) -> bool {
        self.capture.camera.face_visible()
    }

    /// Latest enrollment status, once enrolled.
    pub fn status(&self) -> Option<&EnrollmentStatus> {
        self.status.as_ref()
    }

    /// Sample once and, if a face is found, send exactly one enroll request.
    pub async fn capture_face(&mut self) -> Result<CaptureOutcome, SessionError> {
        if self.status.is_some() {
            return Err(SessionError::Closed);
        }
        let Some(detection) = self.capture.sample().await? else {
            tracing::warn!("no face detected; look at the camera and try again");
            return Ok(CaptureOutcome::NoFace);
        };

        let payload = DescriptorPayload::enroll(self.personnel_id.clone(), detection.descriptor);
        let mut status = self
            .backend
            .enroll(&payload)
            .await
            .map_err(SessionError::backend)?;
        status.enrolled = true;

        self.capture.close();
        tracing::info!(personnel_id = %self.personnel_id, "face enrolled");
        self.status = Some(status.clone());
        Ok(CaptureOutcome::Enrolled(status))
    }

    pub fn close(&mut self) {
        self.capture.close();
    }
}

/// Face login: verifies descriptors until one matches, then hands the
/// identity to `on_success` exactly once.
pub struct VerificationSession<R, B, F>
where
    R: FaceRuntime,
    B: FaceBackend,
    F: FnOnce(VerifiedIdentity) + Send,
{
    capture: Capture<R>,
    backend: Arc<B>,
    on_success: Option<F>,
}

impl<R, B, F> VerificationSession<R, B, F>
where
    R: FaceRuntime,
    B: FaceBackend,
    F: FnOnce(VerifiedIdentity) + Send,
{
    pub fn open(
        device: Arc<dyn VideoDevice>,
        loader: &ModelLoader<R>,
        backend: Arc<B>,
        settle: Duration,
        on_success: F,
    ) -> Result<Self, SessionError> {
        let capture = Capture::open(device, loader, settle)?;
        tracing::info!("face login session opened");
        Ok(Self {
            capture,
            backend,
            on_success: Some(on_success),
        })
    }

    pub fn camera(&self) -> &CameraController {
        &self.capture.camera
    }

    pub fn face_visible(&self) -> bool {
        self.capture.camera.face_visible()
    }

    /// Sample once and, if a face is found, send exactly one verify request.
    ///
    /// A non-match is an ordinary outcome: the camera stays on so the user
    /// can retry or fall back to password login.
    pub async fn verify_face(&mut self) -> Result<VerifyAttempt, SessionError> {
        if self.on_success.is_none() {
            return Err(SessionError::Closed);
        }
        let Some(detection) = self.capture.sample().await? else {
            tracing::warn!("no face detected; look at the camera and try again");
            return Ok(VerifyAttempt::NoFace);
        };

        let payload = DescriptorPayload::verify(detection.descriptor);
        match self
            .backend
            .verify(&payload)
            .await
            .map_err(SessionError::backend)?
        {
            VerifyOutcome::Matched(identity) => {
                self.capture.close();
                tracing::info!(name = %identity.display_name(), "face recognized");
                if let Some(on_success) = self.on_success.take() {
                    on_success(identity);
                }
                Ok(VerifyAttempt::Matched)
            }
            VerifyOutcome::NoMatch { message } => {
                tracing::info!(message = message.as_deref().unwrap_or(""), "face not recognized");
                Ok(VerifyAttempt::NotRecognized { message })
            }
        }
    }

    pub fn close(&mut self) {
        self.capture.close();
    }
}
