use containerstore_core::db::open_db;
use containerstore_core::{
    ClearScope, Container, ContainerSize, ContainerStore, HaulerType, OwnedRecord, Package,
    StoreConfig, StoreEvent, StoreMode, StoreSignals,
};
use rusqlite::Connection;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use tempfile::TempDir;

fn record(id: &str) -> OwnedRecord {
    let mut container = Container::new(id, ContainerSize::FortyFt);
    container.current_location = "yard".to_string();
    Box::new(container)
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("containers.db")
}

fn open(path: &Path, capacity: usize) -> ContainerStore {
    ContainerStore::try_open(StoreConfig::persistent(path).with_cache_capacity(capacity)).unwrap()
}

fn storage_errors(events: &Receiver<StoreEvent>) -> Vec<String> {
    events
        .try_iter()
        .filter_map(|event| match event {
            StoreEvent::StorageError(message) => Some(message),
            StoreEvent::Changed => None,
        })
        .collect()
}

#[test]
fn added_records_survive_a_resident_clear() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&db_path(&dir), 8);
    assert_eq!(store.mode(), StoreMode::Persistent);

    store.add("C-1", record("C-1"), 1.5, f64::NAN);
    store.clear(ClearScope::Resident);

    assert!(store.latest_containers().is_empty());
    let reloaded = store.get_snapshot("C-1").unwrap();
    assert_eq!(reloaded.current_location, "yard");
    assert_eq!(reloaded.added_time, 1.5);
    assert!(reloaded.leaving_time.is_nan());
}

#[test]
fn records_survive_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    {
        let store = open(&path, 8);
        store.add("C-1", record("C-1"), 1.0, 2.0);
        store.update("C-1", |record| record.add_destination("tallinn"));
    }

    let store = open(&path, 8);
    assert_eq!(store.size(), 1);
    assert_eq!(
        store.get_snapshot("C-1").unwrap().next_destinations,
        vec!["tallinn"]
    );
}

#[test]
fn eviction_keeps_rows_and_cache_stays_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&db_path(&dir), 2);

    for key in ["A", "B", "C", "D"] {
        store.add(key, record(key), 0.0, 0.0);
    }

    assert_eq!(store.latest_containers().len(), 2);
    assert_eq!(store.size(), 4);
    assert_eq!(store.keys(), vec!["A", "B", "C", "D"]);
    assert_eq!(store.all_containers().len(), 4);
    assert!(store.get("A").is_some());
    assert!(store.latest_containers().contains_key("A"));
    assert_eq!(store.latest_containers().len(), 2);
}

#[test]
fn remove_deletes_the_backing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let store = open(&path, 4);
    store.add("C-1", record("C-1"), 0.0, 0.0);
    store.add("C-2", record("C-2"), 0.0, 0.0);

    store.remove("C-1");

    assert!(!store.contains("C-1"));
    assert_eq!(store.size(), 1);
    store.clear(ClearScope::Resident);
    assert!(store.get("C-1").is_none());
    assert!(store.get("C-2").is_some());
}

fn create_tables_without_cascade(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE Containers (
            id TEXT PRIMARY KEY,
            size INTEGER,
            currentLocation TEXT,
            addedTime REAL,
            leavingTime REAL
        );
        CREATE TABLE NextDestinations (
            container_id TEXT,
            destination TEXT,
            FOREIGN KEY(container_id) REFERENCES Containers(id)
        );
        CREATE TABLE MovementHistory (
            container_id TEXT,
            history TEXT,
            FOREIGN KEY(container_id) REFERENCES Containers(id)
        );
        CREATE TABLE Packages (
            id TEXT PRIMARY KEY,
            container_id TEXT,
            FOREIGN KEY(container_id) REFERENCES Containers(id)
        );
        CREATE TABLE CustomVariables (
            hauler_type INTEGER,
            container_id TEXT,
            key TEXT,
            value TEXT,
            PRIMARY KEY(hauler_type, container_id, key),
            FOREIGN KEY(container_id) REFERENCES Containers(id)
        );",
    )
    .unwrap();
}

fn loaded_record(id: &str) -> OwnedRecord {
    let mut container = Container::new(id, ContainerSize::TwentyFt);
    container.add_destination("gdansk");
    container.add_movement_history("gate-in");
    container.add_package(Package::new(format!("{id}-pkg")));
    container.set_custom_variable(HaulerType::Truck, "plate", "XY-9");
    Box::new(container)
}

#[test]
fn remove_and_clear_work_on_tables_without_cascade() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    create_tables_without_cascade(&path);
    let store = open(&path, 4);
    let events = store.subscribe();

    for key in ["L-1", "L-2", "L-3"] {
        store.add(key, loaded_record(key), 1.0, 0.0);
    }
    store.remove("L-1");

    assert!(!store.contains("L-1"));
    assert_eq!(store.size(), 2);

    assert_eq!(store.dequeue_by_next_destination("gdansk").len(), 2);
    assert_eq!(store.size(), 0);

    store.add("L-4", loaded_record("L-4"), 1.0, 0.0);
    store.clear(ClearScope::Persisted);
    assert_eq!(store.size(), 0);

    assert!(storage_errors(&events).is_empty());
    let conn = open_db(&path).unwrap();
    for table in ["Packages", "CustomVariables", "NextDestinations", "MovementHistory"] {
        let rows: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(rows, 0, "table {table}");
    }
}

#[test]
fn readding_a_key_replaces_packages_and_variables_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&db_path(&dir), 4);

    store.add("K", loaded_record("K"), 0.0, 0.0);
    store.add("K", record("K"), 0.0, 0.0);
    store.clear(ClearScope::Resident);

    let reloaded = store.get_snapshot("K").unwrap();
    assert!(reloaded.packages.is_empty());
    assert!(reloaded.custom_variables.is_empty());
    assert_eq!(reloaded.current_location, "yard");
}

#[test]
fn update_that_removes_a_variable_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&db_path(&dir), 4);
    store.add("K", loaded_record("K"), 0.0, 0.0);

    assert!(store.update("K", |record| {
        record.remove_custom_variable(HaulerType::Truck, "plate");
        record.packages.clear();
    }));
    store.clear(ClearScope::Resident);

    let reloaded = store.get_snapshot("K").unwrap();
    assert!(reloaded.custom_variable(HaulerType::Truck, "plate").is_none());
    assert!(reloaded.packages.is_empty());
    assert_eq!(reloaded.next_destinations, vec!["gdansk"]);
}

#[test]
fn persisted_clear_truncates_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let store = open(&path, 4);
    store.add("C-1", record("C-1"), 0.0, 0.0);

    store.clear(ClearScope::Persisted);

    assert_eq!(store.size(), 0);
    let conn = open_db(&path).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM Containers;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn queries_see_evicted_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&db_path(&dir), 1);
    for (index, key) in ["A", "B", "C", "D"].into_iter().enumerate() {
        let mut container = Container::new(key, ContainerSize::TwentyFt);
        if index % 2 == 0 {
            container.add_destination("riga");
        }
        store.add(key, Box::new(container), (index + 1) as f64, f64::NAN);
    }

    assert_eq!(store.count_by_added_time(">", 2.0), 2);
    assert_eq!(store.count_by_leaving_time("!=", 0.0), 4);
    assert_eq!(store.count_by_leaving_time("=", 0.0), 0);
    assert_eq!(store.count_by_next_destination("riga"), 2);

    let mut ids: Vec<String> = store
        .containers_by_next_destination("riga")
        .into_iter()
        .map(|container| container.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["A", "C"]);
}

#[test]
fn dequeue_removes_matches_from_cache_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&db_path(&dir), 2);
    for (index, key) in ["A", "B", "C", "D"].into_iter().enumerate() {
        store.add(key, record(key), (index + 1) as f64, 0.0);
    }

    let released = store.dequeue_by_added_time(">", 2.0);

    let mut ids: Vec<String> = released.iter().map(|record| record.id.clone()).collect();
    ids.sort();
    assert_eq!(ids, vec!["C", "D"]);
    assert_eq!(store.size(), 2);
    assert!(store.containers_by_added_time(">", 2.0).is_empty());
    assert!(store
        .latest_containers()
        .keys()
        .all(|key| key == "A" || key == "B"));
}

#[test]
fn unopenable_database_degrades_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("containers.db");
    let signals = StoreSignals::new();
    let events = signals.subscribe();

    let store: ContainerStore =
        ContainerStore::with_signals(StoreConfig::persistent(&path), signals);

    assert_eq!(store.mode(), StoreMode::InMemory);
    assert!(store.degraded_reason().unwrap().contains("containers.db"));
    assert_eq!(storage_errors(&events).len(), 1);

    store.add("C-1", record("C-1"), 0.0, 0.0);
    assert_eq!(store.size(), 1);
}

#[test]
fn strict_open_reports_the_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("containers.db");

    assert!(ContainerStore::<OwnedRecord>::try_open(StoreConfig::persistent(path)).is_err());
}

#[test]
fn failed_save_keeps_the_cached_record_and_signals() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let store = open(&path, 4);
    let events = store.subscribe();

    let saboteur = open_db(&path).unwrap();
    saboteur
        .execute_batch(
            "CREATE TRIGGER fail_history BEFORE INSERT ON MovementHistory
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .unwrap();

    let mut container = Container::new("C-1", ContainerSize::TenFt);
    container.add_movement_history("gate-in");
    store.add("C-1", Box::new(container), 0.0, 0.0);

    let errors = storage_errors(&events);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("C-1"));
    assert!(store.latest_containers().contains_key("C-1"));
    assert_eq!(store.size(), 0);
}

#[test]
fn load_failure_returns_none_and_signals() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let store = open(&path, 4);
    store.add("C-1", record("C-1"), 0.0, 0.0);
    store.clear(ClearScope::Resident);
    let events = store.subscribe();

    let saboteur = open_db(&path).unwrap();
    saboteur.execute_batch("DROP TABLE Packages;").unwrap();

    assert!(store.get("C-1").is_none());
    assert_eq!(storage_errors(&events).len(), 1);
}

#[test]
fn copy_between_modes_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let persistent = open(&db_path(&dir), 1);
    persistent.add("A", record("A"), 1.0, 2.0);
    persistent.add("B", record("B"), 3.0, 4.0);

    let memory: ContainerStore = ContainerStore::in_memory();
    memory.copy_from(&persistent);
    assert_eq!(memory.size(), 2);
    assert_eq!(memory.get_snapshot("A").unwrap().leaving_time, 2.0);

    let other_dir = tempfile::tempdir().unwrap();
    let copy = open(&db_path(&other_dir), 1);
    copy.copy_from(&memory);
    copy.clear(ClearScope::Resident);
    assert_eq!(copy.get_snapshot("B").unwrap().added_time, 3.0);
}

#[test]
fn copying_out_leaves_the_source_cache_alone() {
    let dir = tempfile::tempdir().unwrap();
    let source = open(&db_path(&dir), 1);
    for key in ["C", "B", "A"] {
        source.add(key, record(key), 0.0, 0.0);
    }
    let resident_before: Vec<String> = source.latest_containers().into_keys().collect();

    let copy: ContainerStore = ContainerStore::in_memory();
    copy.copy_from(&source);

    assert_eq!(copy.size(), 3);
    let resident_after: Vec<String> = source.latest_containers().into_keys().collect();
    assert_eq!(resident_after, resident_before);
    assert_eq!(resident_after, vec!["A"]);
}

#[test]
fn json_description_reopens_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let store = open(&path, 4);
    store.add("C-1", record("C-1"), 1.0, 2.0);

    let document = store.to_json();
    assert_eq!(
        document,
        json!({ "databaseLocation": path.to_string_lossy() })
    );
    drop(store);

    let restored: ContainerStore = ContainerStore::from_json(&document);
    assert_eq!(restored.mode(), StoreMode::Persistent);
    assert_eq!(restored.get_snapshot("C-1").unwrap().leaving_time, 2.0);
}

#[test]
fn degraded_store_describes_itself_by_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("containers.db");
    let store: ContainerStore = ContainerStore::open(&path);
    store.add("C-1", record("C-1"), 0.0, 0.0);

    let document = store.to_json();

    assert!(document.get("databaseLocation").is_none());
    assert_eq!(document["containers"].as_array().unwrap().len(), 1);
}

#[test]
fn concurrent_adds_are_all_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&db_path(&dir), 16);

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for item in 0..25 {
                    let key = format!("W{worker}-{item}");
                    store.add(key.clone(), record(&key), item as f64, f64::NAN);
                }
            });
        }
    });

    assert_eq!(store.size(), 100);
    assert_eq!(store.latest_containers().len(), 16);
    assert_eq!(store.count_by_added_time(">=", 20.0), 20);
}
