/*!
 * Fairness and Exclusion Tests
 *
 * Cross-context FCFS ordering and randomized reader/writer exclusion
 */

use dmabuf_sync::{AccessMode, Buffer, ObjectPhase, SyncConfig, SyncContext, SyncManager};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_for_phase(ctx: &SyncContext, buffer: &Buffer, phase: ObjectPhase) {
    let start = Instant::now();
    while ctx.phase(buffer) != Some(phase) {
        assert!(start.elapsed() < Duration::from_secs(2), "never reached {phase:?}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_earlier_request_is_granted_first() {
    let manager = SyncManager::new(SyncConfig::default().with_deferred_reclaim(false)).unwrap();
    let buffer = Buffer::new("b", 64);
    let order = Arc::new(Mutex::new(Vec::new()));

    let holder = manager.create_context("holder");
    holder.add(&buffer, AccessMode::WRITE).unwrap();
    holder.wait_all().unwrap();

    let spawn_writer = |label: &'static str| {
        let ctx = Arc::new(manager.create_context(label));
        ctx.add(&buffer, AccessMode::WRITE).unwrap();
        let handle = {
            let ctx = ctx.clone();
            let order = order.clone();
            thread::spawn(move || {
                ctx.wait_all().unwrap();
                order.lock().push(label);
                thread::sleep(Duration::from_millis(30));
                ctx.signal_all().unwrap();
            })
        };
        (ctx, handle)
    };

    let (first, first_handle) = spawn_writer("A");
    wait_for_phase(&first, &buffer, ObjectPhase::Queued);
    let (second, second_handle) = spawn_writer("C");
    wait_for_phase(&second, &buffer, ObjectPhase::Queued);

    holder.signal_all().unwrap();
    first_handle.join().unwrap();
    second_handle.join().unwrap();

    assert_eq!(*order.lock(), vec!["A", "C"]);
    assert_eq!(manager.stats().timeouts, 0);
    assert_eq!(manager.stats().queued_waits, 0);
}

#[test]
fn test_reader_queued_behind_writer_is_not_overtaking() {
    let manager = SyncManager::new(SyncConfig::default().with_deferred_reclaim(false)).unwrap();
    let buffer = Buffer::new("b", 64);

    let reader = manager.create_context("reader");
    reader.add(&buffer, AccessMode::READ).unwrap();
    reader.wait_all().unwrap();

    let writer = Arc::new(manager.create_context("writer"));
    writer.add(&buffer, AccessMode::WRITE).unwrap();
    let writer_handle = {
        let writer = writer.clone();
        thread::spawn(move || writer.wait_all().unwrap())
    };
    wait_for_phase(&writer, &buffer, ObjectPhase::Queued);

    // A second reader must queue behind the pending writer
    let late = Arc::new(manager.create_context("late-reader"));
    late.add(&buffer, AccessMode::READ).unwrap();
    let late_handle = {
        let late = late.clone();
        thread::spawn(move || late.wait_all().unwrap())
    };
    wait_for_phase(&late, &buffer, ObjectPhase::Queued);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(late.phase(&buffer), Some(ObjectPhase::Queued));

    reader.signal_all().unwrap();
    writer_handle.join().unwrap();
    assert_eq!(writer.phase(&buffer), Some(ObjectPhase::Granted));
    assert_eq!(late.phase(&buffer), Some(ObjectPhase::Queued));

    writer.signal_all().unwrap();
    late_handle.join().unwrap();
    assert_eq!(late.phase(&buffer), Some(ObjectPhase::Granted));
    late.signal_all().unwrap();
}

#[test]
fn test_same_context_never_blocks_itself() {
    let manager = SyncManager::new(SyncConfig::immediate()).unwrap();
    let buffer = Buffer::new("b", 64);
    let ctx = manager.create_context("self");

    ctx.add(&buffer, AccessMode::WRITE).unwrap();
    ctx.wait_all().unwrap();
    ctx.signal_all().unwrap();

    ctx.add(&buffer, AccessMode::READ).unwrap();
    let start = Instant::now();
    ctx.wait_all().unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    ctx.signal_all().unwrap();
    assert_eq!(manager.stats().timeouts, 0);
}

#[test]
fn test_randomized_reader_writer_exclusion() {
    const THREADS: u64 = 6;
    const ROUNDS: usize = 40;

    let manager = SyncManager::new(
        SyncConfig::default()
            .with_wait_timeout(Duration::from_secs(30))
            .with_reclaim_delay(Duration::from_millis(10)),
    )
    .unwrap();
    let buffer = Buffer::new("contended", 64);
    let readers = Arc::new(AtomicUsize::new(0));
    let writers = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|seed| {
            let manager = manager.clone();
            let buffer = buffer.clone();
            let readers = readers.clone();
            let writers = writers.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let ctx = manager.create_context(&format!("worker-{seed}"));

                for _ in 0..ROUNDS {
                    let write = rng.gen_bool(0.3);
                    let mode = if write { AccessMode::WRITE } else { AccessMode::READ };
                    ctx.add(&buffer, mode).unwrap();
                    ctx.wait_all().unwrap();

                    if write {
                        assert_eq!(writers.fetch_add(1, Ordering::SeqCst), 0);
                        assert_eq!(readers.load(Ordering::SeqCst), 0);
                    } else {
                        readers.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(writers.load(Ordering::SeqCst), 0);
                    }

                    thread::sleep(Duration::from_micros(rng.gen_range(0..500)));

                    if write {
                        writers.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        readers.fetch_sub(1, Ordering::SeqCst);
                    }
                    ctx.signal_all().unwrap();
                }
                ctx.release_all();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = manager.shutdown();
    assert_eq!(stats.timeouts, 0);
    assert_eq!(stats.grants, THREADS * ROUNDS as u64);
    assert!(stats.is_quiescent(), "{stats:?}");
}
