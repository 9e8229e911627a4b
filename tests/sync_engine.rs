/*!
 * Sync Engine Integration Tests
 *
 * End-to-end ownership scenarios across execution contexts
 */

use dmabuf_sync::{AccessMode, Buffer, SyncConfig, SyncManager};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn manager(config: SyncConfig) -> SyncManager {
    SyncManager::new(config).unwrap()
}

#[test]
fn test_single_writer_gets_full_timeout() {
    let manager = manager(SyncConfig::default().with_deferred_reclaim(false));
    let buffer = Buffer::new("b", 4096);
    let ctx = manager.create_context("writer");

    ctx.add(&buffer, AccessMode::WRITE).unwrap();
    let remaining = ctx.wait_all().unwrap();

    // Empty queue: nothing to wait for
    assert!(remaining > Duration::from_millis(4900));
    assert!(buffer.reservation().exclusive_fence().is_some());

    ctx.signal_all().unwrap();
    assert!(buffer.reservation().exclusive_fence().is_none());
}

#[test]
fn test_second_writer_waits_for_first_signal() {
    let manager = manager(SyncConfig::default().with_deferred_reclaim(false));
    let buffer = Buffer::new("b", 4096);

    let first = manager.create_context("first");
    first.add(&buffer, AccessMode::WRITE).unwrap();
    first.wait_all().unwrap();

    let second = {
        let manager = manager.clone();
        let buffer = buffer.clone();
        thread::spawn(move || {
            let ctx = manager.create_context("second");
            ctx.add(&buffer, AccessMode::WRITE).unwrap();
            let start = Instant::now();
            let remaining = ctx.wait_all().unwrap();
            let elapsed = start.elapsed();
            ctx.signal_all().unwrap();
            (remaining, elapsed)
        })
    };

    thread::sleep(Duration::from_millis(100));
    first.signal_all().unwrap();

    let (remaining, elapsed) = second.join().unwrap();
    // Woken by the signal, not by the timeout
    assert!(elapsed >= Duration::from_millis(80));
    assert!(elapsed < Duration::from_secs(2));
    assert!(remaining > Duration::from_secs(3));
    assert_eq!(manager.stats().timeouts, 0);
}

#[test]
fn test_readers_overlap_and_writer_waits_for_both() {
    let manager = manager(SyncConfig::default().with_deferred_reclaim(false));
    let buffer = Buffer::new("b", 4096);
    let both_granted = Arc::new(Barrier::new(3));
    let hold = Duration::from_millis(100);

    let readers: Vec<_> = (0..2)
        .map(|i| {
            let manager = manager.clone();
            let buffer = buffer.clone();
            let both_granted = both_granted.clone();
            thread::spawn(move || {
                let ctx = manager.create_context(&format!("reader-{i}"));
                ctx.add(&buffer, AccessMode::READ).unwrap();
                let start = Instant::now();
                ctx.wait_all().unwrap();
                let waited = start.elapsed();
                both_granted.wait();
                thread::sleep(hold);
                ctx.signal_all().unwrap();
                waited
            })
        })
        .collect();

    both_granted.wait();
    assert_eq!(buffer.reservation().shared_fences().len(), 2);

    let writer = manager.create_context("writer");
    writer.add(&buffer, AccessMode::WRITE).unwrap();
    let start = Instant::now();
    writer.wait_all().unwrap();
    let writer_waited = start.elapsed();

    for reader in readers {
        assert!(reader.join().unwrap() < Duration::from_millis(100));
    }
    assert!(writer_waited >= Duration::from_millis(50));
    assert!(buffer.reservation().shared_fences().is_empty());
    writer.signal_all().unwrap();
}

#[test]
fn test_wait_on_stuck_holder_times_out() {
    let manager = manager(SyncConfig::default().with_deferred_reclaim(false));
    let buffer = Buffer::new("b", 4096);

    let holder = manager.create_context("stuck");
    holder.add(&buffer, AccessMode::WRITE).unwrap();
    holder.wait_all().unwrap();

    let waiter = manager.create_context("waiter");
    waiter.add(&buffer, AccessMode::WRITE).unwrap();
    let start = Instant::now();
    let remaining = waiter.wait_all().unwrap();
    let elapsed = start.elapsed();

    assert_eq!(remaining, Duration::ZERO);
    assert!(elapsed >= Duration::from_millis(4900));
    assert!(elapsed < Duration::from_millis(6500));
    assert_eq!(manager.stats().timeouts, 1);
}

#[test]
fn test_read_then_write_with_pending_reclaim_leaves_nothing_behind() {
    let delay = Duration::from_millis(150);
    let manager = manager(SyncConfig::default().with_reclaim_delay(delay));
    let buffer = Buffer::new("b", 4096);

    {
        let reader = manager.create_context("reader");
        let writer = manager.create_context("writer");
        reader.add(&buffer, AccessMode::READ).unwrap();
        writer.add(&buffer, AccessMode::WRITE).unwrap();

        reader.wait_all().unwrap();
        reader.signal_all().unwrap();
        writer.wait_all().unwrap();
        writer.signal_all().unwrap();

        // The reader fence is still held by the reclaim timer
        let stats = manager.stats();
        assert_eq!(stats.pending_reclaims, 1);
        assert!(stats.live_fences >= 1);
    }

    thread::sleep(delay * 4);
    let stats = manager.stats();
    assert!(stats.is_quiescent(), "{stats:?}");
    assert_eq!(stats.live_contexts, 0);

    let stats = manager.shutdown();
    assert_eq!(stats.live_fences, 0);
    assert_eq!(stats.live_objects, 0);
}

#[test]
fn test_frame_rate_reads_keep_one_reclaim_reference() {
    let manager = manager(SyncConfig::default().with_reclaim_delay(Duration::from_millis(200)));
    let buffer = Buffer::new("scanout", 4096);
    let ctx = manager.create_context("compositor");

    // Reads arrive faster than the reclaim delay, so the task never expires
    for _ in 0..40 {
        ctx.add(&buffer, AccessMode::READ).unwrap();
        ctx.wait_all().unwrap();
        ctx.signal_all().unwrap();

        let stats = manager.stats();
        assert_eq!(stats.pending_reclaims, 1);
        assert!(stats.live_fences <= 2, "{stats:?}");
        thread::sleep(Duration::from_millis(20));
    }

    ctx.fini();
    assert_eq!(manager.flush_reclaim(), 1);
    assert!(manager.stats().is_quiescent());
}

#[test]
fn test_dma_write_then_cpu_read_records_domains() {
    let manager = manager(SyncConfig::immediate());
    let buffer = Buffer::new("b", 4096);
    let ctx = manager.create_context("pipeline");

    ctx.add(&buffer, AccessMode::DMA_WRITE).unwrap();
    ctx.wait_all().unwrap();
    ctx.signal_all().unwrap();
    assert_eq!(buffer.reservation().last_access(), dmabuf_sync::AccessType::DmaWrite);

    ctx.add(&buffer, AccessMode::READ).unwrap();
    ctx.wait_all().unwrap();
    assert_eq!(buffer.reservation().last_access(), dmabuf_sync::AccessType::Read);
    ctx.signal_all().unwrap();
}
