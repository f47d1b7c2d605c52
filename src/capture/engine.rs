use super::{CameraDevice, Frame, Resolution, StreamState};
use crate::config::{millis, settle, CameraConfig};
use crate::errors::{Result, RigError};
use crate::registry::{DeviceKind, DeviceRegistry, DeviceToken};
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

struct Shared {
    state: StreamState,
    latest: Option<Frame>,
    last_access: Instant,
    error: Option<String>,
    next_sequence: u64,
}

struct Inner {
    shared: Mutex<Shared>,
    frame_ready: Condvar,
    camera: Mutex<Option<Box<dyn CameraDevice>>>,
    stream_thread: Mutex<Option<JoinHandle<()>>>,
    stop_flag: AtomicBool,
    photo_mode: AtomicBool,
    /// Serializes frame requests against stills and reconfiguration
    exclusive: Mutex<()>,
    stream_resolution: Mutex<Resolution>,
    config: CameraConfig,
}

/// Owns the camera and multiplexes a live stream with exclusive stills.
///
/// The stream runs on a background thread that is started on demand by
/// [`CaptureEngine::get_frame`] and stops by itself once nobody asked for a
/// frame within the idle window. Stills stop the stream first and wait for
/// the thread to join before touching the camera.
pub struct CaptureEngine {
    inner: Arc<Inner>,
    _token: DeviceToken,
}

impl CaptureEngine {
    pub fn new(
        registry: &DeviceRegistry,
        camera: Box<dyn CameraDevice>,
        config: CameraConfig,
    ) -> Result<Self> {
        let token = registry.claim(DeviceKind::Camera)?;
        let stream_resolution = Resolution::from(config.stream_resolution);

        Ok(Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    state: StreamState::Idle,
                    latest: None,
                    last_access: Instant::now(),
                    error: None,
                    next_sequence: 1,
                }),
                frame_ready: Condvar::new(),
                camera: Mutex::new(Some(camera)),
                stream_thread: Mutex::new(None),
                stop_flag: AtomicBool::new(false),
                photo_mode: AtomicBool::new(false),
                exclusive: Mutex::new(()),
                stream_resolution: Mutex::new(stream_resolution),
                config,
            }),
            _token: token,
        })
    }

    /// Newest streamed frame, starting the stream if it is not running.
    pub fn get_frame(&self) -> Result<Frame> {
        let _exclusive = self.inner.exclusive.lock()?;
        self.inner.shared.lock()?.last_access = Instant::now();
        self.ensure_streaming()?;

        let timeout = millis(self.inner.config.first_frame_timeout_ms);
        let deadline = Instant::now() + timeout;
        let mut shared = self.inner.shared.lock()?;
        loop {
            if let Some(frame) = &shared.latest {
                return Ok(frame.clone());
            }

            if matches!(shared.state, StreamState::Idle | StreamState::Stopping) {
                if let Some(err) = shared.error.take() {
                    return Err(RigError::Camera(err));
                }
                // The thread exited between the start check and now.
                shared.last_access = Instant::now();
                drop(shared);
                self.ensure_streaming()?;
                shared = self.inner.shared.lock()?;
            }

            let now = Instant::now();
            if now >= deadline {
                log::warn!("No frame within {:?}", timeout);
                return Err(RigError::CaptureTimeout(timeout));
            }
            let (guard, _) = self
                .inner
                .frame_ready
                .wait_timeout(shared, deadline - now)?;
            shared = guard;
        }
    }

    /// Capture a full-resolution still. The stream is stopped and joined
    /// first and restarts on the next [`CaptureEngine::get_frame`].
    pub fn get_photo(&self) -> Result<Vec<u8>> {
        let _exclusive = self.inner.exclusive.lock()?;
        self.inner.photo_mode.store(true, Ordering::SeqCst);
        let result = self.capture_still_exclusive();
        self.inner.photo_mode.store(false, Ordering::SeqCst);
        result
    }

    pub fn save_photo<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let data = self.get_photo()?;
        fs::write(path, &data)?;
        log::info!("Photo saved to {:?}", path);
        Ok(())
    }

    pub fn change_stream_resolution(&self, resolution: Resolution) -> Result<()> {
        let _exclusive = self.inner.exclusive.lock()?;
        self.inner.photo_mode.store(true, Ordering::SeqCst);
        let result = self.reconfigure_stream(resolution);
        self.inner.photo_mode.store(false, Ordering::SeqCst);
        result
    }

    /// Stop the stream and wait for the thread to exit.
    pub fn stop(&self) -> Result<()> {
        let _exclusive = self.inner.exclusive.lock()?;
        self.stop_streaming()
    }

    pub fn state(&self) -> StreamState {
        lock(&self.inner.shared).state
    }

    pub fn is_photo_mode(&self) -> bool {
        self.inner.photo_mode.load(Ordering::SeqCst)
    }

    pub fn stream_resolution(&self) -> Resolution {
        *lock(&self.inner.stream_resolution)
    }

    fn capture_still_exclusive(&self) -> Result<Vec<u8>> {
        self.stop_streaming()?;

        let resolution = Resolution::from(self.inner.config.photo_resolution);
        let data = {
            let mut slot = self.inner.camera.lock()?;
            let camera = slot.as_mut().ok_or_else(camera_unavailable)?;
            camera.configure(resolution)?;
            camera.capture_still()?
        };

        log::info!("Photo taken at {} ({} bytes)", resolution, data.len());
        settle(self.inner.config.photo_settle_ms);
        Ok(data)
    }

    fn reconfigure_stream(&self, resolution: Resolution) -> Result<()> {
        self.stop_streaming()?;
        {
            let mut slot = self.inner.camera.lock()?;
            let camera = slot.as_mut().ok_or_else(camera_unavailable)?;
            camera.configure(resolution)?;
        }
        *self.inner.stream_resolution.lock()? = resolution;
        log::info!("Stream resolution changed to {}", resolution);
        Ok(())
    }

    fn ensure_streaming(&self) -> Result<()> {
        let mut slot = self.inner.stream_thread.lock()?;

        let alive = slot.as_ref().is_some_and(|h| !h.is_finished());
        let active = matches!(
            self.inner.shared.lock()?.state,
            StreamState::Starting | StreamState::Streaming
        );
        if alive && active {
            return Ok(());
        }

        if let Some(handle) = slot.take() {
            log::info!("Capture thread ended, reaping before restart");
            self.inner.stop_flag.store(true, Ordering::SeqCst);
            if handle.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }

        {
            let mut shared = self.inner.shared.lock()?;
            shared.state = StreamState::Starting;
            shared.latest = None;
            shared.error = None;
        }
        self.inner.stop_flag.store(false, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("stagecam-stream".to_string())
            .spawn(move || stream_loop(inner))?;
        *slot = Some(handle);
        log::info!("Capture thread started");
        Ok(())
    }

    fn stop_streaming(&self) -> Result<()> {
        let handle = self.inner.stream_thread.lock()?.take();
        if let Some(handle) = handle {
            log::info!("Stopping capture thread");
            self.inner.stop_flag.store(true, Ordering::SeqCst);
            handle
                .join()
                .map_err(|_| RigError::WorkerPanicked("stagecam-stream".to_string()))?;
            log::info!("Capture thread joined");
        }
        self.inner.stop_flag.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.inner.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = lock(&self.inner.stream_thread).take() {
            let _ = handle.join();
        }
    }
}

fn camera_unavailable() -> RigError {
    RigError::Camera("camera unavailable".to_string())
}

/// Lock for use where errors cannot propagate (streaming thread, drop).
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn finish(inner: &Inner, error: Option<String>) {
    let mut shared = lock(&inner.shared);
    shared.state = StreamState::Stopping;
    shared.latest = None;
    if error.is_some() {
        shared.error = error;
    }
    inner.frame_ready.notify_all();
}

fn stream_loop(inner: Arc<Inner>) {
    let mut camera = match lock(&inner.camera).take() {
        Some(camera) => camera,
        None => {
            finish(&inner, Some("camera unavailable".to_string()));
            lock(&inner.shared).state = StreamState::Idle;
            return;
        }
    };

    let resolution = *lock(&inner.stream_resolution);
    let idle_timeout = millis(inner.config.idle_timeout_ms);
    let mut error = None;

    match camera.configure(resolution) {
        Ok(()) => {
            lock(&inner.shared).state = StreamState::Streaming;
            log::debug!("Streaming at {}", resolution);
        }
        Err(e) => error = Some(e.to_string()),
    }

    while error.is_none() {
        if inner.stop_flag.load(Ordering::SeqCst) {
            log::debug!("Capture thread stop requested");
            break;
        }
        if lock(&inner.shared).last_access.elapsed() > idle_timeout {
            log::info!("No frame requested for {:?}, stopping stream", idle_timeout);
            break;
        }

        match camera.capture_frame() {
            Ok(data) => {
                let mut shared = lock(&inner.shared);
                let sequence = shared.next_sequence;
                shared.next_sequence += 1;
                shared.latest = Some(Frame {
                    sequence,
                    captured_at: Utc::now(),
                    resolution,
                    data,
                });
                inner.frame_ready.notify_all();
            }
            Err(e) => {
                log::error!("Frame capture failed: {}", e);
                error = Some(e.to_string());
            }
        }
    }

    finish(&inner, error);
    *lock(&inner.camera) = Some(camera);
    lock(&inner.shared).state = StreamState::Idle;
    inner.frame_ready.notify_all();
    log::info!("Capture thread ended");
}
