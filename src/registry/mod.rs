//! Process-wide metric registry.
//!
//! Holds named, typed, labeled metric families and their lazily
//! materialized instances. The registry is created once at startup and
//! shared between the collection pipeline (writer) and the exposition
//! endpoint (reader): cloning a [`Registry`] is cheap and clones observe
//! the same underlying state.
//!
//! Instances are keyed by their label values and live for the process
//! lifetime; cardinality is bounded by the configured servers times the
//! fixed label domains. Numeric cells are single atomics, so mutations
//! never expose a half-written value to a concurrent [`Registry::snapshot`].

pub mod exposition;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The supported metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Settable numeric value.
    Gauge,
    /// Monotonically increasing numeric value.
    Counter,
    /// Static key/value description with a constant sample value of 1.
    Info,
    /// One-of-N string state out of a closed set.
    Enum,
}

/// Registry misuse. These indicate a static wiring defect and are surfaced
/// at registration/startup time rather than silently recovered.
#[derive(Debug)]
pub enum RegistryError {
    /// A metric with this name is already registered.
    DuplicateMetric(String),
    /// Supplied label value count does not match the definition.
    LabelCardinality {
        metric: String,
        expected: usize,
        got: usize,
    },
    /// Enum state outside the declared closed set.
    InvalidState { metric: String, state: String },
    /// Lookup of a metric that was never registered (or with another kind).
    UnknownMetric(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateMetric(name) => {
                write!(f, "metric {} is already registered", name)
            }
            RegistryError::LabelCardinality {
                metric,
                expected,
                got,
            } => write!(
                f,
                "metric {} expects {} label values, got {}",
                metric, expected, got
            ),
            RegistryError::InvalidState { metric, state } => {
                write!(f, "metric {}: state {:?} is not declared", metric, state)
            }
            RegistryError::UnknownMetric(name) => {
                write!(f, "metric {} is not registered", name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// One value cell shared between an instrument handle and the registry.
enum InstanceValue {
    /// f64 stored as its bit pattern; gauges and counters.
    Number(AtomicU64),
    /// Index into the family's declared state list.
    State(AtomicUsize),
    /// Info key/value pairs, replaced wholesale under a short lock.
    Pairs(Mutex<Vec<(String, String)>>),
}

impl InstanceValue {
    fn number(&self) -> &AtomicU64 {
        match self {
            InstanceValue::Number(cell) => cell,
            _ => unreachable!("numeric cell on a non-numeric family"),
        }
    }

    fn state(&self) -> &AtomicUsize {
        match self {
            InstanceValue::State(cell) => cell,
            _ => unreachable!("state cell on a non-enum family"),
        }
    }

    fn pairs(&self) -> &Mutex<Vec<(String, String)>> {
        match self {
            InstanceValue::Pairs(cell) => cell,
            _ => unreachable!("pairs cell on a non-info family"),
        }
    }
}

struct Instance {
    label_values: Vec<String>,
    value: Arc<InstanceValue>,
}

struct Family {
    name: String,
    help: String,
    kind: MetricKind,
    label_names: Vec<String>,
    /// Declared states, Enum kind only.
    states: Vec<String>,
    /// Insertion order is exposition order.
    instances: Mutex<Vec<Instance>>,
}

impl Family {
    /// Returns the value cell for one label tuple, materializing it on
    /// first use. Repeated calls with the same values return the same cell.
    fn instance(&self, values: &[&str]) -> Result<Arc<InstanceValue>, RegistryError> {
        if values.len() != self.label_names.len() {
            return Err(RegistryError::LabelCardinality {
                metric: self.name.clone(),
                expected: self.label_names.len(),
                got: values.len(),
            });
        }
        let mut instances = self.instances.lock().unwrap();
        if let Some(existing) = instances
            .iter()
            .find(|i| i.label_values.iter().map(String::as_str).eq(values.iter().copied()))
        {
            return Ok(existing.value.clone());
        }
        let value = Arc::new(match self.kind {
            MetricKind::Gauge | MetricKind::Counter => InstanceValue::Number(AtomicU64::new(0)),
            MetricKind::Enum => InstanceValue::State(AtomicUsize::new(0)),
            MetricKind::Info => InstanceValue::Pairs(Mutex::new(Vec::new())),
        });
        instances.push(Instance {
            label_values: values.iter().map(|v| v.to_string()).collect(),
            value: value.clone(),
        });
        Ok(value)
    }
}

struct RegistryInner {
    namespace: Option<String>,
    /// Registration order is exposition order.
    families: Mutex<Vec<Arc<Family>>>,
}

/// Shared metric registry. Clones are handles to the same state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry without a name prefix.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                namespace: None,
                families: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates an empty registry whose metric names are prefixed with
    /// `namespace_`.
    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                namespace: Some(namespace.to_string()),
                families: Mutex::new(Vec::new()),
            }),
        }
    }

    fn register(
        &self,
        kind: MetricKind,
        name: &str,
        help: &str,
        label_names: &[&str],
        states: &[&str],
    ) -> Result<Arc<Family>, RegistryError> {
        let full_name = match &self.inner.namespace {
            Some(ns) => format!("{}_{}", ns, name),
            None => name.to_string(),
        };
        let mut families = self.inner.families.lock().unwrap();
        if families.iter().any(|f| f.name == full_name) {
            return Err(RegistryError::DuplicateMetric(full_name));
        }
        let family = Arc::new(Family {
            name: full_name,
            help: help.to_string(),
            kind,
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
            states: states.iter().map(|s| s.to_string()).collect(),
            instances: Mutex::new(Vec::new()),
        });
        families.push(family.clone());
        Ok(family)
    }

    /// Registers a Gauge family.
    pub fn gauge(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<GaugeVec, RegistryError> {
        Ok(GaugeVec {
            family: self.register(MetricKind::Gauge, name, help, label_names, &[])?,
        })
    }

    /// Registers a Counter family.
    pub fn counter(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<CounterVec, RegistryError> {
        Ok(CounterVec {
            family: self.register(MetricKind::Counter, name, help, label_names, &[])?,
        })
    }

    /// Registers an Info family.
    pub fn info(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<InfoVec, RegistryError> {
        Ok(InfoVec {
            family: self.register(MetricKind::Info, name, help, label_names, &[])?,
        })
    }

    /// Registers an Enum family with its closed state set. The first
    /// declared state is the initial state of every instance.
    pub fn enum_metric(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
        states: &[&str],
    ) -> Result<EnumVec, RegistryError> {
        Ok(EnumVec {
            family: self.register(MetricKind::Enum, name, help, label_names, states)?,
        })
    }

    /// Looks up a registered Gauge family by full name. Used to resolve the
    /// static column mapping tables against the registry at startup.
    pub fn find_gauge(&self, name: &str) -> Result<GaugeVec, RegistryError> {
        let families = self.inner.families.lock().unwrap();
        families
            .iter()
            .find(|f| f.name == name && f.kind == MetricKind::Gauge)
            .map(|f| GaugeVec { family: f.clone() })
            .ok_or_else(|| RegistryError::UnknownMetric(name.to_string()))
    }

    /// Number of registered families.
    pub fn family_count(&self) -> usize {
        self.inner.families.lock().unwrap().len()
    }

    /// Takes a consistent point-in-time view of all families and instances,
    /// in registration/materialization order. Safe to call concurrently
    /// with in-progress mutations; each instance read is atomic, no
    /// cross-instance transaction is implied.
    pub fn snapshot(&self) -> Vec<FamilySnapshot> {
        let families = self.inner.families.lock().unwrap();
        families
            .iter()
            .map(|family| {
                let instances = family.instances.lock().unwrap();
                FamilySnapshot {
                    name: family.name.clone(),
                    help: family.help.clone(),
                    kind: family.kind,
                    label_names: family.label_names.clone(),
                    states: family.states.clone(),
                    samples: instances
                        .iter()
                        .map(|instance| InstanceSnapshot {
                            label_values: instance.label_values.clone(),
                            value: match &*instance.value {
                                InstanceValue::Number(cell) => SnapshotValue::Number(
                                    f64::from_bits(cell.load(Ordering::Relaxed)),
                                ),
                                InstanceValue::State(cell) => {
                                    SnapshotValue::StateIndex(cell.load(Ordering::Relaxed))
                                }
                                InstanceValue::Pairs(cell) => {
                                    SnapshotValue::Pairs(cell.lock().unwrap().clone())
                                }
                            },
                        })
                        .collect(),
                }
            })
            .collect()
    }
}

/// Point-in-time view of one family.
pub struct FamilySnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub label_names: Vec<String>,
    pub states: Vec<String>,
    pub samples: Vec<InstanceSnapshot>,
}

/// Point-in-time view of one instance.
pub struct InstanceSnapshot {
    pub label_values: Vec<String>,
    pub value: SnapshotValue,
}

/// Instance value as observed by a snapshot.
pub enum SnapshotValue {
    Number(f64),
    StateIndex(usize),
    Pairs(Vec<(String, String)>),
}

/// Gauge family handle.
#[derive(Clone)]
pub struct GaugeVec {
    family: Arc<Family>,
}

impl std::fmt::Debug for GaugeVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeVec")
            .field("label_count", &self.label_count())
            .finish()
    }
}

impl GaugeVec {
    /// Returns the instance for one label tuple, materializing it on first
    /// use.
    pub fn with_label_values(&self, values: &[&str]) -> Result<Gauge, RegistryError> {
        Ok(Gauge {
            value: self.family.instance(values)?,
        })
    }

    /// Number of declared label names.
    pub fn label_count(&self) -> usize {
        self.family.label_names.len()
    }
}

/// One Gauge instance.
pub struct Gauge {
    value: Arc<InstanceValue>,
}

impl std::fmt::Debug for Gauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gauge").field("value", &self.get()).finish()
    }
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.value.number().store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.number().load(Ordering::Relaxed))
    }
}

/// Counter family handle.
#[derive(Clone)]
pub struct CounterVec {
    family: Arc<Family>,
}

impl CounterVec {
    pub fn with_label_values(&self, values: &[&str]) -> Result<Counter, RegistryError> {
        Ok(Counter {
            value: self.family.instance(values)?,
        })
    }
}

/// One Counter instance.
pub struct Counter {
    value: Arc<InstanceValue>,
}

impl Counter {
    /// Adds `by` to the counter with a compare-and-swap loop, so concurrent
    /// increments never lose updates.
    pub fn inc_by(&self, by: f64) {
        let cell = self.value.number();
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + by).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn inc(&self) {
        self.inc_by(1.0);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.number().load(Ordering::Relaxed))
    }
}

/// Info family handle.
#[derive(Clone)]
pub struct InfoVec {
    family: Arc<Family>,
}

impl InfoVec {
    pub fn with_label_values(&self, values: &[&str]) -> Result<Info, RegistryError> {
        Ok(Info {
            value: self.family.instance(values)?,
        })
    }
}

/// One Info instance.
pub struct Info {
    value: Arc<InstanceValue>,
}

impl Info {
    /// Replaces the descriptive key/value set.
    pub fn set(&self, pairs: &[(&str, &str)]) {
        let mut guard = self.value.pairs().lock().unwrap();
        *guard = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }
}

/// Enum family handle.
#[derive(Clone)]
pub struct EnumVec {
    family: Arc<Family>,
}

impl EnumVec {
    pub fn with_label_values(&self, values: &[&str]) -> Result<EnumState, RegistryError> {
        Ok(EnumState {
            family: self.family.clone(),
            value: self.family.instance(values)?,
        })
    }
}

/// One Enum instance.
pub struct EnumState {
    family: Arc<Family>,
    value: Arc<InstanceValue>,
}

impl EnumState {
    /// Switches the instance to `state`. Fails without touching the current
    /// state if `state` is outside the declared set.
    pub fn set_state(&self, state: &str) -> Result<(), RegistryError> {
        let index = self
            .family
            .states
            .iter()
            .position(|s| s == state)
            .ok_or_else(|| RegistryError::InvalidState {
                metric: self.family.name.clone(),
                state: state.to_string(),
            })?;
        self.value.state().store(index, Ordering::Relaxed);
        Ok(())
    }

    /// Currently active state.
    pub fn state(&self) -> &str {
        &self.family.states[self.value.state().load(Ordering::Relaxed)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Registry::new();
        registry.gauge("up", "server is up", &["server"]).unwrap();
        let err = registry.gauge("up", "server is up", &["server"]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateMetric(name) if name == "up"));
        assert_eq!(registry.family_count(), 1);
    }

    #[test]
    fn duplicate_across_kinds_is_rejected() {
        let registry = Registry::new();
        registry.gauge("x", "x", &[]).unwrap();
        assert!(registry.counter("x", "x", &[]).is_err());
    }

    #[test]
    fn label_cardinality_mismatch_is_rejected() {
        let registry = Registry::new();
        let gauge = registry
            .gauge("used", "used ratio", &["server", "storage_type"])
            .unwrap();
        let err = gauge.with_label_values(&["s1"]).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::LabelCardinality {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    #[test]
    fn same_label_values_return_the_same_instance() {
        let registry = Registry::new();
        let gauge = registry
            .gauge("used", "used ratio", &["server", "storage_type"])
            .unwrap();
        gauge.with_label_values(&["s1", "asp"]).unwrap().set(0.5);
        gauge.with_label_values(&["s1", "asp"]).unwrap().set(0.7);
        assert_eq!(gauge.with_label_values(&["s1", "asp"]).unwrap().get(), 0.7);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].samples.len(), 1);
    }

    #[test]
    fn enum_rejects_undeclared_state_and_keeps_previous() {
        let registry = Registry::new();
        let status = registry
            .enum_metric(
                "subsystem_status",
                "subsystem status",
                &["server"],
                &["ACTIVE", "INACTIVE"],
            )
            .unwrap();
        let instance = status.with_label_values(&["s1"]).unwrap();
        instance.set_state("INACTIVE").unwrap();
        let err = instance.set_state("BROKEN").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { state, .. } if state == "BROKEN"));
        assert_eq!(instance.state(), "INACTIVE");
    }

    #[test]
    fn enum_starts_in_first_declared_state() {
        let registry = Registry::new();
        let status = registry
            .enum_metric("s", "s", &[], &["ACTIVE", "ENDING"])
            .unwrap();
        assert_eq!(status.with_label_values(&[]).unwrap().state(), "ACTIVE");
    }

    #[test]
    fn counter_accumulates() {
        let registry = Registry::new();
        let counter = registry.counter("cycles", "cycles", &[]).unwrap();
        let instance = counter.with_label_values(&[]).unwrap();
        instance.inc();
        instance.inc_by(2.5);
        assert_eq!(instance.get(), 3.5);
    }

    #[test]
    fn info_replaces_pairs() {
        let registry = Registry::new();
        let info = registry.info("environment", "env", &["server"]).unwrap();
        let instance = info.with_label_values(&["s1"]).unwrap();
        instance.set(&[("os_version", "V7R3"), ("host_name", "H1")]);
        instance.set(&[("os_version", "V7R4")]);
        let snapshot = registry.snapshot();
        match &snapshot[0].samples[0].value {
            SnapshotValue::Pairs(pairs) => {
                assert_eq!(pairs, &[("os_version".to_string(), "V7R4".to_string())]);
            }
            _ => panic!("expected pairs"),
        }
    }

    #[test]
    fn namespace_prefixes_names() {
        let registry = Registry::with_namespace("ibmi");
        registry.gauge("up", "up", &[]).unwrap();
        assert_eq!(registry.snapshot()[0].name, "ibmi_up");
        assert!(registry.find_gauge("ibmi_up").is_ok());
        assert!(registry.find_gauge("up").is_err());
    }

    #[test]
    fn find_gauge_checks_kind() {
        let registry = Registry::new();
        registry.counter("c", "c", &[]).unwrap();
        assert!(matches!(
            registry.find_gauge("c"),
            Err(RegistryError::UnknownMetric(_))
        ));
    }

    #[test]
    fn snapshot_keeps_registration_order() {
        let registry = Registry::new();
        registry.gauge("b_second", "b", &[]).unwrap();
        registry.gauge("a_first", "a", &[]).unwrap();
        let names: Vec<_> = registry.snapshot().into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["b_second", "a_first"]);
    }

    #[test]
    fn snapshot_is_safe_during_concurrent_writes() {
        let registry = Registry::new();
        let gauge = registry.gauge("g", "g", &["server"]).unwrap();
        let writer = {
            let gauge = gauge.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    gauge
                        .with_label_values(&["s1"])
                        .unwrap()
                        .set(f64::from(i));
                }
            })
        };
        for _ in 0..100 {
            for family in registry.snapshot() {
                for sample in family.samples {
                    if let SnapshotValue::Number(v) = sample.value {
                        assert!((0.0..1000.0).contains(&v));
                    }
                }
            }
        }
        writer.join().unwrap();
    }
}
