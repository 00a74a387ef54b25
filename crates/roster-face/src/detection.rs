//! Frame-paced detection loop.

use crate::controller::CameraController;
use crate::loader::{lock, SharedRuntime};
use crate::runtime::FaceRuntime;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Spawn the loop on its own thread. It waits `settle`, then runs one
/// detection per captured frame until `generation` goes stale.
pub fn spawn_detection_loop<R: FaceRuntime>(
    camera: Arc<CameraController>,
    runtime: SharedRuntime<R>,
    generation: u64,
    settle: Duration,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("roster-detect".into())
        .spawn(move || {
            std::thread::sleep(settle);
            if !camera.is_current(generation) {
                tracing::debug!(generation, "session closed before detection started");
                return;
            }
            let frames = run(&camera, &runtime, generation);
            tracing::debug!(generation, frames, "detection loop exited");
        })
}

/// Returns how many frames were examined.
fn run<R: FaceRuntime>(camera: &CameraController, runtime: &SharedRuntime<R>, generation: u64) -> u64 {
    let mut frames = 0u64;
    loop {
        let frame = match camera.grab_frame(generation) {
            Ok(Some(frame)) => frame,
            Ok(None) => return frames,
            Err(e) => {
                tracing::warn!(error = %e, "frame read failed, stopping detection");
                return frames;
            }
        };
        frames += 1;

        let visible = match lock(runtime).detect_single_face(&frame) {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::debug!(error = %e, sequence = frame.sequence, "detection failed");
                false
            }
        };

        if !camera.publish_face_visible(generation, visible) {
            return frames;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::FakeDevice;
    use crate::runtime::testing::ScriptedRuntime;
    use std::sync::Mutex;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..500 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_loop_publishes_and_stops_with_camera() {
        let camera = Arc::new(CameraController::new(Arc::new(FakeDevice::default())));
        let runtime = ScriptedRuntime::new(true);
        let shared = Arc::new(Mutex::new(runtime.clone()));
        let generation = camera.start().unwrap();

        let handle =
            spawn_detection_loop(camera.clone(), shared, generation, Duration::ZERO).unwrap();
        assert!(wait_for(|| camera.face_visible()));

        camera.stop();
        assert!(!camera.face_visible());
        handle.join().unwrap();
        assert!(!camera.face_visible());
    }

    #[test]
    fn test_loop_tracks_face_leaving() {
        let camera = Arc::new(CameraController::new(Arc::new(FakeDevice::default())));
        let runtime = ScriptedRuntime::new(true);
        let shared = Arc::new(Mutex::new(runtime.clone()));
        let generation = camera.start().unwrap();
        let handle =
            spawn_detection_loop(camera.clone(), shared, generation, Duration::ZERO).unwrap();

        assert!(wait_for(|| camera.face_visible()));
        runtime.set_face(false);
        assert!(wait_for(|| !camera.face_visible()));

        camera.stop();
        handle.join().unwrap();
    }

    #[test]
    fn test_stop_during_settle_skips_loop() {
        let camera = Arc::new(CameraController::new(Arc::new(FakeDevice::default())));
        let runtime = ScriptedRuntime::new(true);
        let shared = Arc::new(Mutex::new(runtime.clone()));
        let generation = camera.start().unwrap();
        let handle =
            spawn_detection_loop(camera.clone(), shared, generation, Duration::from_millis(50))
                .unwrap();
        camera.stop();
        handle.join().unwrap();
        assert_eq!(runtime.samples(), 0);
        assert!(!camera.face_visible());
    }
}
