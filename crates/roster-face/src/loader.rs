//! Model loading, once per application context.

use crate::onnx::OnnxRuntime;
use crate::runtime::{FaceRuntime, RuntimeError};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The loaded runtime. The mutex keeps at most one sample in flight.
pub type SharedRuntime<R> = Arc<Mutex<R>>;

type Factory<R> = Box<dyn Fn() -> Result<R, RuntimeError> + Send + Sync>;

/// Loads the face runtime on demand and keeps it for later sessions.
///
/// A failed load is logged and leaves the loader empty; nothing retries on
/// its own, but a later [`load_models`](Self::load_models) call tries again.
pub struct ModelLoader<R> {
    factory: Factory<R>,
    runtime: Mutex<Option<SharedRuntime<R>>>,
}

impl<R: FaceRuntime> ModelLoader<R> {
    pub fn new(factory: impl Fn() -> Result<R, RuntimeError> + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            runtime: Mutex::new(None),
        }
    }

    /// Load if not already loaded. Returns whether a runtime is available.
    pub fn load_models(&self) -> bool {
        let mut slot = lock(&self.runtime);
        if slot.is_some() {
            return true;
        }
        let started = std::time::Instant::now();
        match (self.factory)() {
            Ok(runtime) => {
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "face models loaded");
                *slot = Some(Arc::new(Mutex::new(runtime)));
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load face models");
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.runtime).is_some()
    }

    pub fn runtime(&self) -> Option<SharedRuntime<R>> {
        lock(&self.runtime).clone()
    }
}

impl ModelLoader<OnnxRuntime> {
    /// Loader for the ONNX bundles in `model_dir`.
    pub fn onnx(model_dir: PathBuf) -> Self {
        Self::new(move || {
            tracing::debug!(dir = %model_dir.display(), "loading ONNX face models");
            OnnxRuntime::load(&model_dir)
        })
    }
}

/// Lock ignoring poison; the guarded state stays consistent across panics.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
