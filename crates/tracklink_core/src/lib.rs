//! # TRACKLINK Core
//!
//! Distributes one fixed-layout state value from a single writer to any
//! number of reader processes through named shared memory, without locks.
//!
//! ## Architecture Rules
//!
//! 1. **The writer never blocks** - publishing is two counter bumps and a copy
//! 2. **Readers never write** - they map the region read-only
//! 3. **Readers never see a torn value** - torn copies are detected and retried
//!
//! ## Example
//!
//! ```rust,ignore
//! use tracklink_core::{RegionFactory, StateReader, StateWriter};
//!
//! let factory = RegionFactory::platform();
//! let mut writer = StateWriter::<MyState>::open(&factory, "my_state")?;
//! writer.set_state(next);
//!
//! // In another process:
//! let reader = StateReader::<MyState>::open(&factory, "my_state")?;
//! let latest = reader.get_state();
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod shm;
pub mod state;
pub mod sync;

pub use clock::monotonic_seconds;
pub use shm::{
    AccessMode, InProcessBackend, OpenMode, OpenParams, RegionBackend, RegionFactory,
    RemoteAccess, SharedRegion, ShmError, ShmResult, DEFAULT_ATTEMPTS,
};
pub use state::{region_size, StateReader, StateWriter};
pub use sync::{Envelope, LocklessCell, LocklessPublisher, ENVELOPE_CAPACITY};
