//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `containerstore_core` linkage with a tiny end-to-end probe.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `containerstore_cli [DATABASE_PATH]`. Without a path the store runs
//! in memory.

use containerstore_core::{Container, ContainerSize, ContainerStore, OwnedRecord, StoreEvent};

const DEMO_KEY: &str = "DEMO0000001";

fn main() {
    println!("containerstore_core version={}", containerstore_core::core_version());

    let store: ContainerStore<OwnedRecord> = match std::env::args_os().nth(1) {
        Some(path) => ContainerStore::open(path),
        None => ContainerStore::in_memory(),
    };
    let events = store.subscribe();

    let mut demo = Container::new(DEMO_KEY, ContainerSize::FortyFtHighCube);
    demo.add_destination("port-a");
    store.add(DEMO_KEY, Box::new(demo), 0.0, f64::NAN);

    if let Some(reason) = store.degraded_reason() {
        println!("degraded={reason}");
    }
    for event in events.try_iter() {
        if let StoreEvent::StorageError(message) = event {
            println!("storage_error={message}");
        }
    }
    println!("mode={} size={}", store.mode().as_str(), store.size());
}
