/// Async bridge - dispatches blocking native calls off the caller's context
///
/// Every call:
/// - Runs exactly one native routine on tokio's blocking pool
/// - Resolves exactly one completion handle (or callback) with its outcome
/// - Never retries, batches or reorders; failures are forwarded verbatim
use crate::error::{MarsupialError, Result};
use crate::native::NativeBackend;
use crate::types::{Detection, TrainerConfig, TrainingRecord};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;

/// Configuration for the bridge's own runtime
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Async core threads (only used to drive completions)
    pub worker_threads: usize,
    /// Ceiling of the blocking pool; one thread per in-flight native call
    pub max_blocking_threads: usize,
    /// Name given to runtime threads
    pub thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            worker_threads: 1,
            max_blocking_threads: 512,
            thread_name: "marsupial-worker".to_string(),
        }
    }
}

/// Eventual outcome of one dispatched native call
///
/// Await it from async code, or call [`CompletionHandle::wait`] from a plain
/// thread. Consuming the handle is the only way to observe the outcome, so it
/// is observed at most once.
#[must_use = "a completion handle does nothing unless awaited or waited on"]
#[derive(Debug)]
pub struct CompletionHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> CompletionHandle<T> {
    /// Block the current thread until the native call finishes
    ///
    /// Panics if called from within an async execution context.
    pub fn wait(self) -> Result<T> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(worker_lost()))
    }
}

impl<T> Future for CompletionHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or_else(|_| Err(worker_lost())))
    }
}

fn worker_lost() -> MarsupialError {
    MarsupialError::worker_lost("native call ended without reporting an outcome")
}

/// Dispatches training and detection to a native backend
pub struct AsyncBridge {
    backend: Arc<dyn NativeBackend>,
    trainer_config: TrainerConfig,
    handle: Handle,
    /// Present when the bridge built its own runtime
    runtime: Option<Runtime>,
}

impl AsyncBridge {
    /// Create a bridge that owns a dedicated tokio runtime
    pub fn new(backend: Arc<dyn NativeBackend>, config: BridgeConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.max_blocking_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| MarsupialError::Runtime(e.to_string()))?;

        log::debug!(
            "Bridge runtime started for {} backend ({} blocking threads max)",
            backend.name(),
            config.max_blocking_threads
        );

        Ok(Self {
            backend,
            trainer_config: TrainerConfig::default(),
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Create a bridge that dispatches onto an existing runtime
    pub fn with_handle(backend: Arc<dyn NativeBackend>, handle: Handle) -> Self {
        Self {
            backend,
            trainer_config: TrainerConfig::default(),
            handle,
            runtime: None,
        }
    }

    /// Create a bridge on the runtime the caller is running in
    pub fn from_current(backend: Arc<dyn NativeBackend>) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| MarsupialError::Runtime(e.to_string()))?;
        Ok(Self::with_handle(backend, handle))
    }

    /// Replace the parameters forwarded to the native trainer
    pub fn with_trainer_config(mut self, config: TrainerConfig) -> Self {
        self.trainer_config = config;
        self
    }

    pub fn trainer_config(&self) -> &TrainerConfig {
        &self.trainer_config
    }

    pub fn backend(&self) -> &Arc<dyn NativeBackend> {
        &self.backend
    }

    /// Train a detector from labeled images, writing it to `output_path`
    ///
    /// Concurrent calls targeting the same `output_path` are not serialized;
    /// the caller decides the ordering of writers to one artifact.
    pub fn train_object_detector<P: Into<PathBuf>>(
        &self,
        records: Vec<TrainingRecord>,
        output_path: P,
    ) -> CompletionHandle<()> {
        let (tx, rx) = oneshot::channel();
        self.train_object_detector_with(records, output_path, move |outcome| {
            let _ = tx.send(outcome);
        });
        CompletionHandle { rx }
    }

    /// Run the detector at `detector_path` against `image_path`
    pub fn detect_objects<P: Into<PathBuf>, Q: Into<PathBuf>>(
        &self,
        image_path: P,
        detector_path: Q,
    ) -> CompletionHandle<Vec<Detection>> {
        let (tx, rx) = oneshot::channel();
        self.detect_objects_with(image_path, detector_path, move |outcome| {
            let _ = tx.send(outcome);
        });
        CompletionHandle { rx }
    }

    /// Callback flavour of [`AsyncBridge::train_object_detector`]
    ///
    /// `on_complete` runs exactly once, on the worker thread.
    pub fn train_object_detector_with<P, F>(
        &self,
        records: Vec<TrainingRecord>,
        output_path: P,
        on_complete: F,
    ) where
        P: Into<PathBuf>,
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let config = self.trainer_config.clone();
        let output_path = output_path.into();

        log::debug!(
            "Dispatching training of {} records to {}",
            records.len(),
            output_path.display()
        );
        self.dispatch("train", on_complete, move || {
            backend.train_object_detector(&records, &output_path, &config)
        });
    }

    /// Callback flavour of [`AsyncBridge::detect_objects`]
    ///
    /// `on_complete` runs exactly once, on the worker thread.
    pub fn detect_objects_with<P, Q, F>(&self, image_path: P, detector_path: Q, on_complete: F)
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
        F: FnOnce(Result<Vec<Detection>>) + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let image_path = image_path.into();
        let detector_path = detector_path.into();

        log::debug!(
            "Dispatching detection on {} with {}",
            image_path.display(),
            detector_path.display()
        );
        self.dispatch("detect", on_complete, move || {
            backend.detect_objects(&image_path, &detector_path)
        });
    }

    /// Run `call` on the blocking pool and hand its outcome to `on_complete`
    ///
    /// If the worker never reports (panic in the native call, runtime gone),
    /// `on_complete` still runs once with `WorkerLost`.
    fn dispatch<T, C, F>(&self, op: &'static str, on_complete: F, call: C)
    where
        T: Send + 'static,
        C: FnOnce() -> std::result::Result<T, crate::native::NativeError> + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let completion = Completion::new(on_complete);
        self.handle.spawn_blocking(move || {
            let started = Instant::now();
            let outcome = call().map_err(MarsupialError::Native);
            log::debug!(
                "Native {} finished in {:.1}ms (ok: {})",
                op,
                started.elapsed().as_secs_f64() * 1000.0,
                outcome.is_ok()
            );
            completion.resolve(outcome);
        });
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        // In-flight native calls keep running and still resolve their handles
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// One-shot completion that fires `WorkerLost` if dropped unresolved
struct Completion<T, F: FnOnce(Result<T>)> {
    on_complete: Option<F>,
    _outcome: std::marker::PhantomData<fn(T)>,
}

impl<T, F: FnOnce(Result<T>)> Completion<T, F> {
    fn new(on_complete: F) -> Self {
        Self {
            on_complete: Some(on_complete),
            _outcome: std::marker::PhantomData,
        }
    }

    fn resolve(mut self, outcome: Result<T>) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(outcome);
        }
    }
}

impl<T, F: FnOnce(Result<T>)> Drop for Completion<T, F> {
    fn drop(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(Err(worker_lost()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_stub::StubBackend;
    use crate::native::NativeError;
    use crate::types::BoundingBox;
    use std::path::Path;
    use std::sync::mpsc;
    use std::time::Duration;

    struct PanickingBackend;

    impl NativeBackend for PanickingBackend {
        fn train_object_detector(
            &self,
            _records: &[TrainingRecord],
            _output_path: &Path,
            _config: &TrainerConfig,
        ) -> std::result::Result<(), NativeError> {
            panic!("native trainer crashed");
        }

        fn detect_objects(
            &self,
            _image_path: &Path,
            _detector_path: &Path,
        ) -> std::result::Result<Vec<Detection>, NativeError> {
            panic!("native detector crashed");
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn write_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(32, 32).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_train_then_detect() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), "sign.png");
        let detector = dir.path().join("object_detector.svm");
        let bbox = BoundingBox::new(4, 6, 20, 20);

        let bridge = AsyncBridge::from_current(Arc::new(StubBackend::new())).unwrap();
        bridge
            .train_object_detector(vec![TrainingRecord::new(&image, vec![bbox])], &detector)
            .await
            .unwrap();
        assert!(detector.is_file());

        let detected = bridge.detect_objects(&image, &detector).await.unwrap();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].bbox, bbox);
    }

    #[tokio::test]
    async fn test_native_errors_pass_through_unchanged() {
        let bridge = AsyncBridge::from_current(Arc::new(StubBackend::failing("error"))).unwrap();

        let err = bridge
            .train_object_detector(vec![], "b")
            .await
            .unwrap_err();
        assert_eq!(err.as_native(), Some(&NativeError::new("error")));

        let err = bridge.detect_objects("a", "b").await.unwrap_err();
        assert_eq!(err.as_native(), Some(&NativeError::new("error")));
    }

    #[tokio::test]
    async fn test_detect_on_untrained_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path(), "probe.png");

        let bridge = AsyncBridge::from_current(Arc::new(StubBackend::new())).unwrap();
        let err = bridge
            .detect_objects(&image, dir.path().join("never_trained.svm"))
            .await
            .unwrap_err();
        assert!(err.as_native().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatch_does_not_block_caller() {
        let backend = Arc::new(StubBackend::failing("slow").with_delay(Duration::from_millis(300)));
        let bridge = AsyncBridge::from_current(backend.clone()).unwrap();

        let started = Instant::now();
        let handle = bridge.detect_objects("a", "b");
        assert!(started.elapsed() < Duration::from_millis(300));

        assert!(handle.await.is_err());
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_calls_each_resolve_once() {
        let backend = Arc::new(StubBackend::failing("busy").with_delay(Duration::from_millis(50)));
        let bridge = AsyncBridge::from_current(backend.clone()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| bridge.detect_objects(format!("img_{i}.png"), "det.svm"))
            .collect();
        for handle in handles {
            assert!(handle.await.is_err());
        }
        assert_eq!(backend.calls(), 8);
    }

    #[tokio::test]
    async fn test_panicking_worker_reports_worker_lost() {
        let bridge = AsyncBridge::from_current(Arc::new(PanickingBackend)).unwrap();

        let err = bridge.detect_objects("a", "b").await.unwrap_err();
        assert!(matches!(err, MarsupialError::WorkerLost(_)));
    }

    #[test]
    fn test_blocking_wait_on_owned_runtime() {
        let bridge =
            AsyncBridge::new(Arc::new(StubBackend::failing("error")), BridgeConfig::default())
                .unwrap();

        let err = bridge.detect_objects("a", "b").wait().unwrap_err();
        assert_eq!(err.to_string(), "error");
    }

    #[test]
    fn test_callback_runs_exactly_once() {
        let bridge = AsyncBridge::new(Arc::new(PanickingBackend), BridgeConfig::default()).unwrap();
        let (tx, rx) = mpsc::channel();

        bridge.train_object_detector_with(vec![], "out.svm", move |outcome| {
            tx.send(outcome.is_err()).unwrap();
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_trainer_config_is_forwarded() {
        let config = TrainerConfig {
            num_threads: 1,
            ..TrainerConfig::default()
        };
        let bridge = AsyncBridge::new(Arc::new(StubBackend::new()), BridgeConfig::default())
            .unwrap()
            .with_trainer_config(config.clone());
        assert_eq!(bridge.trainer_config(), &config);
        assert_eq!(bridge.backend().name(), "stub");
    }
}
