//! Region factory: open-mode policy and retries over a backend.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::{ShmError, ShmResult};
use super::in_process::InProcessBackend;
use super::region::{AccessMode, OpenMode, OpenParams, RemoteAccess, SharedRegion};
use super::RegionBackend;

/// Default attempts per open before giving up.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Pause before the second attempt; grows linearly after that.
const RETRY_BACKOFF: Duration = Duration::from_millis(2);

/// Opens and creates named regions through one backend.
///
/// Owned explicitly by whoever needs regions; there is no process-wide
/// instance.
pub struct RegionFactory {
    backend: Box<dyn RegionBackend>,
    attempts: u32,
}

impl RegionFactory {
    /// Factory over the OS backend of the current target, or the in-process
    /// backend where the OS offers none.
    #[cfg(any(unix, windows))]
    #[must_use]
    pub fn platform() -> Self {
        Self::with_backend(super::PlatformBackend::default())
    }

    /// Factory over the OS backend of the current target, or the in-process
    /// backend where the OS offers none.
    #[cfg(not(any(unix, windows)))]
    #[must_use]
    pub fn platform() -> Self {
        warn!("no OS shared memory on this target, regions are process-local");
        Self::in_process()
    }

    /// Factory whose regions are only visible inside this process.
    #[must_use]
    pub fn in_process() -> Self {
        Self::with_backend(InProcessBackend::new())
    }

    /// Factory over an explicit backend.
    #[must_use]
    pub fn with_backend(backend: impl RegionBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    /// Overrides the number of attempts per open (at least one).
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Backend name for logs.
    #[must_use]
    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Opens or creates a region according to `params.open_mode`.
    ///
    /// Each attempt tries to open first (unless `CreateOnly`), then to create
    /// (unless `OpenOnly`). Transient failures are retried, [`DEFAULT_ATTEMPTS`]
    /// times unless overridden with [`RegionFactory::with_attempts`], to ride
    /// out create/open races between processes. A region found but not yet
    /// sized is never created over; the next attempt opens it again.
    ///
    /// # Errors
    ///
    /// The last failure seen, or [`ShmError::InvalidParameters`] for an
    /// unusable name or size.
    pub fn open(&self, params: &OpenParams) -> ShmResult<SharedRegion> {
        if let Err(err) = params.validate() {
            warn!(name = %params.name, size = params.min_size, "invalid shared region parameters");
            return Err(err);
        }
        debug!(
            name = %params.name,
            size = params.min_size,
            backend = self.backend.kind(),
            "opening shared region"
        );

        let replace = params.open_mode == OpenMode::CreateOnly;
        let mut last_error = ShmError::RegionUnavailable;
        for attempt in 1..=self.attempts {
            if attempt > 1 {
                thread::sleep(RETRY_BACKOFF * (attempt - 1));
            }

            if params.open_mode != OpenMode::CreateOnly {
                match self
                    .backend
                    .attempt_open(&params.name, params.min_size, params.access)
                {
                    Ok(region) => return Ok(region),
                    Err(err) => {
                        debug!(name = %params.name, attempt, error = %err, "open attempt failed");
                        last_error = err;
                    }
                }
            }
            if !is_transient(&last_error) {
                break;
            }

            let creatable = !matches!(last_error, ShmError::NotReady);
            if params.open_mode != OpenMode::OpenOnly && creatable {
                match self.backend.attempt_create(
                    &params.name,
                    params.min_size,
                    params.access,
                    params.remote,
                    replace,
                ) {
                    Ok(region) => return Ok(region),
                    Err(err) => {
                        debug!(name = %params.name, attempt, error = %err, "create attempt failed");
                        last_error = err;
                    }
                }
            }
            if !is_transient(&last_error) {
                break;
            }
        }
        Err(last_error)
    }

    /// Creates a fresh read-write region.
    ///
    /// # Errors
    ///
    /// See [`RegionFactory::open`].
    pub fn create(
        &self,
        name: &str,
        min_size: usize,
        remote: RemoteAccess,
    ) -> ShmResult<SharedRegion> {
        self.open(
            &OpenParams::new(name, min_size)
                .open_mode(OpenMode::CreateOnly)
                .remote(remote),
        )
    }

    /// Attaches to an existing region.
    ///
    /// # Errors
    ///
    /// [`ShmError::RegionUnavailable`] when no such region exists.
    pub fn open_existing(
        &self,
        name: &str,
        min_size: usize,
        access: AccessMode,
    ) -> ShmResult<SharedRegion> {
        self.open(
            &OpenParams::new(name, min_size)
                .open_mode(OpenMode::OpenOnly)
                .access(access),
        )
    }

    /// Attaches read-write, creating the region if it does not exist.
    ///
    /// Tries [`DEFAULT_ATTEMPTS`] times by default. An existing region is
    /// never replaced.
    ///
    /// # Errors
    ///
    /// See [`RegionFactory::open`].
    pub fn create_or_open(
        &self,
        name: &str,
        min_size: usize,
        remote: RemoteAccess,
    ) -> ShmResult<SharedRegion> {
        self.open(&OpenParams::new(name, min_size).remote(remote))
    }
}

/// Failures worth another attempt.
fn is_transient(err: &ShmError) -> bool {
    matches!(
        err,
        ShmError::RegionUnavailable
            | ShmError::NotReady
            | ShmError::AlreadyExists
            | ShmError::Os(_)
    )
}

impl Default for RegionFactory {
    fn default() -> Self {
        Self::platform()
    }
}

impl std::fmt::Debug for RegionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionFactory")
            .field("backend", &self.backend.kind())
            .field("attempts", &self.attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Backend that fails a fixed number of times before delegating.
    struct Flaky {
        failures_left: AtomicU32,
        calls: Arc<AtomicU32>,
        inner: InProcessBackend,
    }

    impl RegionBackend for Flaky {
        fn kind(&self) -> &'static str {
            "flaky"
        }

        fn attempt_open(
            &self,
            name: &str,
            min_size: usize,
            access: AccessMode,
        ) -> ShmResult<SharedRegion> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.attempt_open(name, min_size, access)
        }

        fn attempt_create(
            &self,
            name: &str,
            min_size: usize,
            access: AccessMode,
            remote: RemoteAccess,
            replace: bool,
        ) -> ShmResult<SharedRegion> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let left = self.failures_left.load(Ordering::Relaxed);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::Relaxed);
                return Err(ShmError::AlreadyExists);
            }
            self.inner.attempt_create(name, min_size, access, remote, replace)
        }
    }

    fn flaky(failures: u32) -> (RegionFactory, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let backend = Flaky {
            failures_left: AtomicU32::new(failures),
            calls: Arc::clone(&calls),
            inner: InProcessBackend::new(),
        };
        (RegionFactory::with_backend(backend), calls)
    }

    #[test]
    fn test_retries_transient_create_failures() {
        let (factory, calls) = flaky(2);
        let region = factory.create("pose", 64, RemoteAccess::ReadOnly).unwrap();
        assert_eq!(region.len(), 64);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_gives_up_after_three_attempts() {
        let (factory, calls) = flaky(10);
        let result = factory.create("pose", 64, RemoteAccess::ReadOnly);
        assert!(matches!(result, Err(ShmError::AlreadyExists)));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_attempts_default_and_override() {
        let (factory, calls) = flaky(10);
        let factory = factory.with_attempts(5);
        assert!(factory.create("pose", 64, RemoteAccess::ReadOnly).is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 5);
        assert_eq!(DEFAULT_ATTEMPTS, 3);
        assert!(format!("{:?}", RegionFactory::in_process()).contains("attempts: 3"));
    }

    /// Backend whose region exists but stays unsized for a few opens.
    struct Unsized {
        unsized_opens: AtomicU32,
        creates: Arc<AtomicU32>,
        inner: InProcessBackend,
        _sized: SharedRegion,
    }

    impl RegionBackend for Unsized {
        fn kind(&self) -> &'static str {
            "unsized"
        }

        fn attempt_open(
            &self,
            name: &str,
            min_size: usize,
            access: AccessMode,
        ) -> ShmResult<SharedRegion> {
            let left = self.unsized_opens.load(Ordering::Relaxed);
            if left > 0 {
                self.unsized_opens.store(left - 1, Ordering::Relaxed);
                return Err(ShmError::NotReady);
            }
            self.inner.attempt_open(name, min_size, access)
        }

        fn attempt_create(
            &self,
            name: &str,
            min_size: usize,
            access: AccessMode,
            remote: RemoteAccess,
            replace: bool,
        ) -> ShmResult<SharedRegion> {
            self.creates.fetch_add(1, Ordering::Relaxed);
            self.inner.attempt_create(name, min_size, access, remote, replace)
        }
    }

    fn still_sizing(unsized_opens: u32) -> (RegionFactory, Arc<AtomicU32>) {
        let creates = Arc::new(AtomicU32::new(0));
        let inner = InProcessBackend::new();
        let sized = inner
            .attempt_create("pose", 64, AccessMode::ReadWrite, RemoteAccess::ReadOnly, false)
            .unwrap();
        let backend = Unsized {
            unsized_opens: AtomicU32::new(unsized_opens),
            creates: Arc::clone(&creates),
            inner,
            _sized: sized,
        };
        (RegionFactory::with_backend(backend), creates)
    }

    #[test]
    fn test_unsized_region_is_reopened_not_created_over() {
        let (factory, creates) = still_sizing(2);
        let region = factory.create_or_open("pose", 64, RemoteAccess::ReadOnly).unwrap();
        assert_eq!(region.len(), 64);
        assert_eq!(creates.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_region_that_never_gets_sized_reports_not_ready() {
        let (factory, creates) = still_sizing(10);
        let err = factory
            .create_or_open("pose", 64, RemoteAccess::ReadOnly)
            .unwrap_err();
        assert!(matches!(err, ShmError::NotReady));
        assert!(err.is_recoverable());
        assert_eq!(creates.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_open_only_never_creates() {
        let factory = RegionFactory::in_process();
        let result = factory.open_existing("missing", 64, AccessMode::ReadOnly);
        assert!(matches!(result, Err(ShmError::RegionUnavailable)));
    }

    #[test]
    fn test_create_or_open_attaches_to_existing() {
        let factory = RegionFactory::in_process();
        let first = factory.create_or_open("pose", 64, RemoteAccess::ReadOnly).unwrap();
        let second = factory.create_or_open("pose", 64, RemoteAccess::ReadOnly).unwrap();
        assert_eq!(first.as_ptr(), second.as_ptr());
    }

    #[test]
    fn test_invalid_params_rejected_without_attempts() {
        let (factory, calls) = flaky(0);
        let result = factory.open(&OpenParams::new("", 64));
        assert!(matches!(result, Err(ShmError::InvalidParameters)));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }
}
