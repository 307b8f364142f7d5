//! Integration tests for shared state regions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracklink_core::{
    region_size, AccessMode, LocklessCell, RegionFactory, RemoteAccess, ShmError, StateReader,
    StateWriter,
};
use tracklink_shared::{LocklessSensorState, PoseSample, StatusFlags, Vec3d};

fn unique_name(tag: &str) -> String {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("tracklink_test_{tag}_{}_{id}", std::process::id())
}

fn sample(counter: u32) -> LocklessSensorState {
    let t = f64::from(counter);
    LocklessSensorState {
        world_from_imu: PoseSample {
            linear_velocity: Vec3d::new(t, t, t),
            time_in_seconds: t,
            ..PoseSample::default()
        },
        status_flags: StatusFlags::ORIENTATION_TRACKED | StatusFlags::HMD_CONNECTED,
        last_camera_frame_counter: counter,
        ..LocklessSensorState::default()
    }
}

#[test]
fn test_in_process_writer_many_readers() {
    let factory = RegionFactory::in_process();
    let mut writer = StateWriter::<LocklessSensorState>::open(&factory, "sensor").unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reader = StateReader::<LocklessSensorState>::open(&factory, "sensor").unwrap();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut last = 0u32;
                let mut reads = 0u64;
                loop {
                    let done = stop.load(Ordering::Relaxed);
                    let state = reader.get_state();
                    let counter = state.last_camera_frame_counter;
                    // Every field of one publish carries the same counter.
                    assert_eq!(state.world_from_imu.time_in_seconds, f64::from(counter));
                    assert_eq!(state.world_from_imu.linear_velocity.z, f64::from(counter));
                    assert!(counter >= last);
                    last = counter;
                    reads += 1;
                    if done {
                        break reads;
                    }
                }
            })
        })
        .collect();

    for counter in 1..=50_000u32 {
        writer.set_state(sample(counter));
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
}

#[test]
fn test_reader_sees_latest_after_writer_stops() {
    let factory = RegionFactory::in_process();
    let mut writer = StateWriter::<LocklessSensorState>::open(&factory, "latest").unwrap();
    let reader = StateReader::<LocklessSensorState>::open(&factory, "latest").unwrap();

    for counter in 1..=10 {
        writer.set_state(sample(counter));
    }
    assert_eq!(reader.get_state(), sample(10));
}

#[test]
#[allow(unsafe_code)]
fn test_restarted_writer_recovers_interrupted_publish() {
    let factory = RegionFactory::in_process();
    let size = region_size::<LocklessSensorState>();
    let mut first = StateWriter::<LocklessSensorState>::open(&factory, "restart").unwrap();
    let reader = StateReader::<LocklessSensorState>::open(&factory, "restart").unwrap();
    for counter in 1..=3 {
        first.set_state(sample(counter));
    }
    drop(first);

    // The first writer died between its two counter increments.
    let raw = factory
        .open_existing("restart", size, AccessMode::ReadWrite)
        .unwrap();
    let cell_offset = size - std::mem::size_of::<LocklessCell<LocklessSensorState>>();
    let base = raw.as_mut_ptr().unwrap();
    // SAFETY: `begin` is the cell's first field, inside the mapped region.
    let begin = unsafe {
        &*base
            .as_ptr()
            .add(cell_offset)
            .cast::<std::sync::atomic::AtomicU32>()
    };
    begin.fetch_add(1, Ordering::AcqRel);

    let mut second = StateWriter::<LocklessSensorState>::open(&factory, "restart").unwrap();
    assert_eq!(reader.get_state(), LocklessSensorState::default());
    for counter in 10..=12 {
        second.set_state(sample(counter));
        assert_eq!(reader.get_state(), sample(counter));
    }
}

#[test]
fn test_reader_region_is_read_only() {
    let factory = RegionFactory::in_process();
    let _writer = StateWriter::<LocklessSensorState>::open(&factory, "ro").unwrap();
    let region = factory
        .open_existing("ro", region_size::<LocklessSensorState>(), AccessMode::ReadOnly)
        .unwrap();
    assert!(region.as_mut_ptr().is_none());
}

#[test]
fn test_second_create_only_fails_in_process() {
    let factory = RegionFactory::in_process();
    let _first = factory.create("dup", 64, RemoteAccess::ReadOnly).unwrap();
    let second = factory.create("dup", 64, RemoteAccess::ReadOnly);
    assert!(matches!(second, Err(ShmError::AlreadyExists)));
}

#[cfg(unix)]
mod posix {
    use super::*;
    use std::fs::File;
    use std::os::unix::fs::MetadataExt;

    use nix::fcntl::OFlag;
    use nix::sys::mman::shm_open;
    use nix::sys::stat::Mode;
    use tracklink_core::shm::PosixBackend;

    fn inode(name: &str) -> u64 {
        let fd = shm_open(format!("/{name}").as_str(), OFlag::O_RDONLY, Mode::empty()).unwrap();
        File::from(fd).metadata().unwrap().ino()
    }

    #[test]
    fn test_posix_create_or_open_waits_for_unsized_segment() {
        let name = unique_name("unsized");
        // Another process has created the segment but not sized it yet.
        let fd = shm_open(
            format!("/{name}").as_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .unwrap();
        let creator = File::from(fd);
        let created = creator.metadata().unwrap().ino();

        let factory = RegionFactory::platform().with_attempts(2);
        let err = factory
            .create_or_open(&name, 4096, RemoteAccess::ReadOnly)
            .unwrap_err();
        assert!(matches!(err, ShmError::NotReady));
        assert!(err.is_recoverable());
        assert_eq!(inode(&name), created, "segment was replaced");

        creator.set_len(4096).unwrap();
        let region = factory
            .create_or_open(&name, 4096, RemoteAccess::ReadOnly)
            .unwrap();
        assert_eq!(region.len(), 4096);
        assert_eq!(inode(&name), created);

        PosixBackend::unlink(&name).unwrap();
    }

    #[test]
    fn test_posix_restarted_writer_reaches_attached_readers() {
        let name = unique_name("restart");
        let factory = RegionFactory::platform();

        let mut first = StateWriter::<LocklessSensorState>::open(&factory, &name).unwrap();
        let reader = StateReader::<LocklessSensorState>::open(&factory, &name).unwrap();
        first.set_state(sample(3));
        let created = inode(&name);
        drop(first);

        let mut second = StateWriter::<LocklessSensorState>::open(&factory, &name).unwrap();
        assert_eq!(inode(&name), created);
        assert_eq!(reader.get_state(), LocklessSensorState::default());
        second.set_state(sample(4));
        assert_eq!(reader.get_state(), sample(4));

        PosixBackend::unlink(&name).unwrap();
    }

    #[test]
    fn test_posix_round_trip() {
        let name = unique_name("roundtrip");
        let factory = RegionFactory::platform();

        let mut writer = StateWriter::<LocklessSensorState>::open(&factory, &name).unwrap();
        let reader = StateReader::<LocklessSensorState>::open(&factory, &name).unwrap();
        assert!(reader.is_published());

        writer.set_state(sample(7));
        assert_eq!(reader.get_state(), sample(7));

        PosixBackend::unlink(&name).unwrap();
    }

    #[test]
    fn test_posix_reader_without_writer() {
        let name = unique_name("absent");
        let factory = RegionFactory::platform();
        let err = StateReader::<LocklessSensorState>::open(&factory, &name).unwrap_err();
        assert!(matches!(err, ShmError::RegionUnavailable));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_posix_exclusive_create_without_replace() {
        let name = unique_name("exclusive");
        let factory = RegionFactory::with_backend(PosixBackend::new().with_replace_stale(false));

        let _first = factory.create(&name, 4096, RemoteAccess::ReadOnly).unwrap();
        let second = factory.create(&name, 4096, RemoteAccess::ReadOnly);
        assert!(matches!(second, Err(ShmError::AlreadyExists)));

        PosixBackend::unlink(&name).unwrap();
    }

    #[test]
    fn test_posix_read_only_open_of_small_segment() {
        let name = unique_name("small");
        let factory = RegionFactory::platform();

        let _small = factory.create(&name, 64, RemoteAccess::ReadOnly).unwrap();
        let err = factory
            .open_existing(&name, 1 << 20, AccessMode::ReadOnly)
            .unwrap_err();
        assert!(matches!(
            err,
            ShmError::SizeMismatch { expected, .. } if expected == 1 << 20
        ));

        PosixBackend::unlink(&name).unwrap();
    }
}
