/*!
 * Buffer Sync Demo - Main Entry Point
 *
 * Drives one frame of a small display pipeline through the sync engine:
 * - Two compositor threads read the same surface concurrently
 * - A render thread then writes it, waiting for both readers
 * - A DMA engine scans the result out
 */

use std::error::Error;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::info;

use dmabuf_sync::{init_tracing, sync, AccessMode, Buffer, SyncConfig};

/// Block until `readers` grants are reported or every reader has exited
fn await_readers(granted: &mpsc::Receiver<i32>, readers: usize) -> usize {
    granted.iter().take(readers).count()
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize structured tracing
    init_tracing();

    info!("Buffer sync demo starting...");

    let config = SyncConfig::from_env();
    info!(?config, "Loaded configuration");
    sync::init(config)?;

    let surface = Buffer::new("surface", 1920 * 1080 * 4);
    let (granted_tx, granted_rx) = mpsc::channel();

    let readers: Vec<_> = (0..2)
        .map(|i| {
            let surface = surface.clone();
            let granted_tx = granted_tx.clone();
            thread::Builder::new()
                .name(format!("compositor-{i}"))
                .spawn(move || -> Result<(), dmabuf_sync::SyncError> {
                    let ctx = sync::create_context(&format!("compose-{i}"))?;
                    sync::add_buffer(&ctx, &surface, AccessMode::READ)?;
                    let remaining = sync::wait_all(&ctx)?;
                    let _ = granted_tx.send(i);
                    drop(granted_tx);
                    info!(reader = i, remaining_ms = remaining.as_millis() as u64, "reading surface");
                    thread::sleep(Duration::from_millis(20));
                    sync::signal_all(&ctx)?;
                    sync::destroy_context(ctx);
                    Ok(())
                })
        })
        .collect::<Result<_, _>>()?;

    // Both readers hold their grants before the writer queues. A reader that
    // fails drops its sender, so this never outlives the reader threads.
    drop(granted_tx);
    let granted = await_readers(&granted_rx, 2);
    info!(granted, "compositor readers holding surface");

    let render = sync::create_context("render")?;
    sync::add_buffer(&render, &surface, AccessMode::WRITE)?;
    let remaining = sync::wait_all(&render)?;
    info!(remaining_ms = remaining.as_millis() as u64, "render pass owns surface");
    sync::signal_all(&render)?;
    sync::destroy_context(render);

    for reader in readers {
        reader.join().map_err(|_| "compositor thread panicked")??;
    }

    let remaining = sync::wait_one(&surface, AccessMode::DMA_READ)?;
    info!(remaining_ms = remaining.as_millis() as u64, "scanout owns surface");
    sync::signal_one(&surface)?;

    let global = sync::global()?;
    global.flush_reclaim();
    if let Some(stats) = sync::shutdown() {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    info!("Buffer sync demo finished");
    Ok(())
}
