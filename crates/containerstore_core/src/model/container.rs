//! Container domain model.
//!
//! # Responsibility
//! - Define the canonical container record stored by `ContainerStore`.
//! - Provide accessor helpers for destination/history/package/variable lists.
//!
//! # Invariants
//! - `added_time` / `leaving_time` use `NaN` for "unset", never a sentinel.
//! - `Clone` is a full deep copy; no sub-object is shared between clones.
//! - Structural equality treats two unset (`NaN`) timestamps as equal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable string identity of a container.
pub type ContainerId = String;

/// Per-hauler custom payloads; values are opaque to the store.
pub type CustomVariables = BTreeMap<HaulerType, BTreeMap<String, serde_json::Value>>;

/// ISO container size classes.
///
/// Persisted as the integer returned by [`ContainerSize::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerSize {
    #[default]
    TwentyFt,
    TwentyFtHighCube,
    FortyFt,
    FortyFtHighCube,
    FortyFiveFt,
    FortyFiveFtHighCube,
    TenFt,
    ThirtyFt,
    FortyEightFt,
    FiftyThreeFt,
    SixtyFt,
}

impl ContainerSize {
    const ALL: [ContainerSize; 11] = [
        Self::TwentyFt,
        Self::TwentyFtHighCube,
        Self::FortyFt,
        Self::FortyFtHighCube,
        Self::FortyFiveFt,
        Self::FortyFiveFtHighCube,
        Self::TenFt,
        Self::ThirtyFt,
        Self::FortyEightFt,
        Self::FiftyThreeFt,
        Self::SixtyFt,
    ];

    /// Stable integer code used by the `Containers.size` column.
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }
}

/// Transport mode a custom variable applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaulerType {
    Truck,
    Train,
    WaterTransport,
    AirTransport,
    NoHauler,
}

impl HaulerType {
    const ALL: [HaulerType; 5] = [
        Self::Truck,
        Self::Train,
        Self::WaterTransport,
        Self::AirTransport,
        Self::NoHauler,
    ];

    /// Stable integer code used by the `CustomVariables.hauler_type` column.
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }
}

/// Opaque sub-item carried by a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    pub package_id: String,
}

impl Package {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
        }
    }
}

/// Canonical container record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    #[serde(default)]
    pub size: ContainerSize,
    #[serde(default)]
    pub current_location: String,
    /// Time the container entered the store; `NaN` when unset.
    #[serde(default = "unset_time", with = "nan_as_null")]
    pub added_time: f64,
    /// Planned departure time; `NaN` when unset.
    #[serde(default = "unset_time", with = "nan_as_null")]
    pub leaving_time: f64,
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(default)]
    pub custom_variables: CustomVariables,
    #[serde(default)]
    pub next_destinations: Vec<String>,
    #[serde(default)]
    pub movement_history: Vec<String>,
}

impl Container {
    /// Creates an empty container with both timestamps unset.
    pub fn new(id: impl Into<ContainerId>, size: ContainerSize) -> Self {
        Self {
            id: id.into(),
            size,
            current_location: String::new(),
            added_time: f64::NAN,
            leaving_time: f64::NAN,
            packages: Vec::new(),
            custom_variables: CustomVariables::new(),
            next_destinations: Vec::new(),
            movement_history: Vec::new(),
        }
    }

    pub fn add_package(&mut self, package: Package) {
        self.packages.push(package);
    }

    pub fn add_destination(&mut self, destination: impl Into<String>) {
        self.next_destinations.push(destination.into());
    }

    /// Removes the first matching destination; returns whether one was found.
    pub fn remove_destination(&mut self, destination: &str) -> bool {
        remove_first(&mut self.next_destinations, destination)
    }

    /// Exact membership test used by destination queries.
    pub fn has_destination(&self, destination: &str) -> bool {
        self.next_destinations.iter().any(|item| item == destination)
    }

    pub fn add_movement_history(&mut self, entry: impl Into<String>) {
        self.movement_history.push(entry.into());
    }

    pub fn remove_movement_history(&mut self, entry: &str) -> bool {
        remove_first(&mut self.movement_history, entry)
    }

    pub fn set_custom_variable(
        &mut self,
        hauler: HaulerType,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) {
        self.custom_variables
            .entry(hauler)
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn custom_variable(&self, hauler: HaulerType, key: &str) -> Option<&serde_json::Value> {
        self.custom_variables
            .get(&hauler)
            .and_then(|variables| variables.get(key))
    }

    /// Removes one variable; drops the hauler bucket once it is empty.
    pub fn remove_custom_variable(&mut self, hauler: HaulerType, key: &str) -> bool {
        let Some(variables) = self.custom_variables.get_mut(&hauler) else {
            return false;
        };
        let removed = variables.remove(key).is_some();
        if variables.is_empty() {
            self.custom_variables.remove(&hauler);
        }
        removed
    }

    pub fn variables_for_hauler(&self, hauler: HaulerType) -> BTreeMap<String, serde_json::Value> {
        self.custom_variables
            .get(&hauler)
            .cloned()
            .unwrap_or_default()
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.size == other.size
            && self.current_location == other.current_location
            && same_time(self.added_time, other.added_time)
            && same_time(self.leaving_time, other.leaving_time)
            && self.packages == other.packages
            && self.custom_variables == other.custom_variables
            && self.next_destinations == other.next_destinations
            && self.movement_history == other.movement_history
    }
}

fn same_time(left: f64, right: f64) -> bool {
    left == right || (left.is_nan() && right.is_nan())
}

fn remove_first(items: &mut Vec<String>, value: &str) -> bool {
    match items.iter().position(|item| item == value) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

fn unset_time() -> f64 {
    f64::NAN
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
