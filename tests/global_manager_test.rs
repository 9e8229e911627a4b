/*!
 * Global Manager Tests
 *
 * Process-wide singleton lifecycle and the free-function interface
 */

use dmabuf_sync::sync;
use dmabuf_sync::{AccessMode, Buffer, SyncConfig, SyncError};
use serial_test::serial;
use std::thread;

#[test]
#[serial]
fn test_init_twice_is_rejected() {
    sync::init(SyncConfig::immediate()).unwrap();
    assert!(matches!(
        sync::init(SyncConfig::immediate()),
        Err(SyncError::AlreadyInitialized)
    ));
    assert!(sync::shutdown().is_some());
    assert!(sync::shutdown().is_none());
}

#[test]
#[serial]
fn test_calls_before_init_fail() {
    assert!(!sync::is_initialized());
    let buffer = Buffer::new("b", 64);
    assert!(matches!(sync::create_context("ctx"), Err(SyncError::NotInitialized)));
    assert!(matches!(
        sync::wait_one(&buffer, AccessMode::READ),
        Err(SyncError::NotInitialized)
    ));
    assert!(matches!(sync::global(), Err(SyncError::NotInitialized)));
}

#[test]
#[serial]
fn test_invalid_config_is_not_installed() {
    let config = SyncConfig::default().with_reclaim_delay(std::time::Duration::from_secs(3600));
    assert!(matches!(sync::init(config), Err(SyncError::InvalidConfig(_))));
    assert!(!sync::is_initialized());
}

#[test]
#[serial]
fn test_free_function_round_trip() {
    sync::init(SyncConfig::immediate()).unwrap();
    let buffer = Buffer::new("frame", 4096);

    let ctx = sync::create_context("render").unwrap();
    sync::add_buffer(&ctx, &buffer, AccessMode::WRITE).unwrap();
    sync::wait_all(&ctx).unwrap();
    sync::signal_all(&ctx).unwrap();
    sync::release_buffer(&ctx, &buffer);
    assert_eq!(sync::release_all(&ctx), 0);
    sync::destroy_context(ctx);

    sync::wait_one(&buffer, AccessMode::DMA_READ).unwrap();
    assert_eq!(
        sync::signal_one(&buffer).and_then(|_| sync::signal_one(&buffer)),
        Err(SyncError::NotHeld(buffer.id()))
    );
    assert_eq!(sync::global().unwrap().last_released(), Some(buffer.id()));

    let stats = sync::shutdown().unwrap();
    assert!(stats.is_quiescent());
    assert_eq!(stats.grants, 2);
}

#[test]
#[serial]
fn test_shutdown_releases_single_objects_of_other_threads() {
    sync::init(SyncConfig::default()).unwrap();
    let buffer = Buffer::new("scanout", 4096);

    {
        let buffer = buffer.clone();
        thread::spawn(move || sync::wait_one(&buffer, AccessMode::READ).unwrap())
            .join()
            .unwrap();
    }
    assert!(!buffer.reservation().is_idle());

    let stats = sync::shutdown().unwrap();
    assert_eq!(stats.forced_releases, 1);
    assert!(stats.is_quiescent());
    assert!(buffer.reservation().is_idle());
}
