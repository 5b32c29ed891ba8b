//! Background threads report content changes while the main thread plays the
//! UI thread and services the resulting layout passes.
//!
//! Run with `RUST_LOG=arbor_core=debug` to watch each pass.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arbor_core::{LayoutCoordinator, ViewId};
use arbor_runtime_std::LayoutRuntime;
use arbor_testing::ViewArena;

const SECTIONS: usize = 3;
const ROWS_PER_SECTION: usize = 4;
const UPDATES_PER_PRODUCER: usize = 20;

/// Wires the propagation a real container would do: a view's size change
/// feeds its parent's size and asks the parent to re-arrange its children.
fn install_propagation(
    arena: &ViewArena,
    coordinator: &Arc<LayoutCoordinator<ViewArena>>,
    view: ViewId,
) {
    let Some(parent) = arena.parent(view) else {
        return;
    };
    let coordinator = Arc::downgrade(coordinator);
    arena.on_sizing(view, move |_| {
        if let Some(coordinator) = coordinator.upgrade() {
            coordinator.request_sizing_update(parent);
            coordinator.request_layout_update(parent);
        }
    });
}

fn build_tree(arena: &ViewArena) -> Result<Vec<ViewId>, Box<dyn Error>> {
    let mut leaves = Vec::new();
    for _ in 0..SECTIONS {
        let section = arena.insert_child(arena.root())?;
        for _ in 0..ROWS_PER_SECTION {
            leaves.push(arena.insert_child(section)?);
        }
    }
    Ok(leaves)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let arena = Arc::new(ViewArena::new());
    arena.bind_ui_thread();
    let leaves = build_tree(&arena)?;

    let runtime = LayoutRuntime::new(arena.clone());
    let coordinator = runtime.coordinator();
    for &leaf in &leaves {
        install_propagation(&arena, &coordinator, leaf);
    }
    for section in arena.children(arena.root()) {
        install_propagation(&arena, &coordinator, section);
    }

    let running = Arc::new(AtomicBool::new(true));
    let producers: Vec<_> = leaves
        .chunks(ROWS_PER_SECTION)
        .map(|rows| {
            let rows = rows.to_vec();
            let coordinator = runtime.coordinator();
            thread::spawn(move || {
                for step in 0..UPDATES_PER_PRODUCER {
                    let row = rows[step % rows.len()];
                    coordinator.request_sizing_update(row);
                    thread::sleep(Duration::from_millis(2));
                }
            })
        })
        .collect();

    {
        let running = running.clone();
        thread::spawn(move || {
            for producer in producers {
                if producer.join().is_err() {
                    log::error!("producer thread panicked");
                }
            }
            running.store(false, Ordering::SeqCst);
        });
    }

    let scheduler = runtime.scheduler();
    while running.load(Ordering::SeqCst) {
        scheduler.wait_and_drain(Duration::from_millis(10));
    }
    runtime.run_until_idle();

    let stats = coordinator.stats();
    log::info!(
        "{} passes serviced {} sizing and {} layout updates for {} requests",
        stats.passes,
        stats.sizing_updates,
        stats.layout_updates,
        SECTIONS * UPDATES_PER_PRODUCER
    );
    println!("recorded {} recompute calls", arena.take_calls().len());
    Ok(())
}
