//! Bootstrap phase engine
//!
//! Runs a fixed list of phases in order and stops at the first one that is
//! not done yet. Each phase looks up one object by fixed identity and either
//! creates it, refreshes its spec, or waits for it to become ready.

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::controller::Action;
use std::time::Duration;
use tracing::{debug, error, info};

use super::object::{Kind, Object, ObjectKey};
use super::store::{ObjectStore, StoreError};
use super::types::{OperatorError, Result, CONFLICT_REQUEUE};

/// Outcome of one phase.
#[derive(Debug)]
pub enum PhaseResult {
    /// Phase is satisfied, run the next one.
    Continue,
    /// Stop here and try again after `after`. A carried error is expected
    /// (for instance a lost update race) and is not reported as a failure.
    Requeue {
        after: Duration,
        error: Option<OperatorError>,
    },
    Error(OperatorError),
}

impl PhaseResult {
    pub fn requeue(after: Duration) -> Self {
        PhaseResult::Requeue { after, error: None }
    }
}

#[async_trait]
pub trait Phase: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, store: &dyn ObjectStore) -> PhaseResult;
}

/// Readiness check on an existing object; `false` requeues after `delay`.
#[derive(Clone, Copy)]
pub struct Readiness {
    pub check: fn(&Object) -> bool,
    pub delay: Duration,
}

/// Ensures one object exists and, optionally, that its spec is current.
pub struct ObjectPhase {
    name: &'static str,
    desired: Object,
    create_delay: Duration,
    update_spec: bool,
    readiness: Option<Readiness>,
}

impl ObjectPhase {
    pub fn new(name: &'static str, desired: impl Into<Object>, create_delay: Duration) -> Self {
        Self {
            name,
            desired: desired.into(),
            create_delay,
            update_spec: false,
            readiness: None,
        }
    }

    /// Overwrite the stored spec with the desired one on every pass.
    pub fn update_spec(mut self) -> Self {
        self.update_spec = true;
        self
    }

    pub fn ready_when(mut self, check: fn(&Object) -> bool, delay: Duration) -> Self {
        self.readiness = Some(Readiness { check, delay });
        self
    }

    async fn create(&self, store: &dyn ObjectStore, key: &ObjectKey) -> PhaseResult {
        match store.create(&self.desired).await {
            Ok(_) => {
                info!(phase = self.name, %key, "created");
                PhaseResult::requeue(self.create_delay)
            }
            Err(StoreError::AlreadyExists(_)) => PhaseResult::Continue,
            Err(e) => PhaseResult::Error(e.into()),
        }
    }

    async fn refresh(&self, store: &dyn ObjectStore, existing: Object) -> PhaseResult {
        let updated = match with_spec_of(existing.clone(), &self.desired) {
            Ok(updated) => updated,
            Err(e) => return PhaseResult::Error(e),
        };
        if updated == existing {
            return PhaseResult::Continue;
        }

        match store.update(&updated).await {
            Ok(_) => {
                info!(phase = self.name, key = %updated.key(), "updated");
                PhaseResult::Continue
            }
            Err(e @ (StoreError::Conflict(_) | StoreError::NotFound(_))) => PhaseResult::Requeue {
                after: CONFLICT_REQUEUE,
                error: Some(e.into()),
            },
            Err(e) => PhaseResult::Error(e.into()),
        }
    }
}

#[async_trait]
impl Phase for ObjectPhase {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, store: &dyn ObjectStore) -> PhaseResult {
        let key = self.desired.key();
        let existing = match store.get(&key).await {
            Ok(existing) => existing,
            Err(e) => return PhaseResult::Error(e.into()),
        };

        let Some(existing) = existing else {
            return self.create(store, &key).await;
        };

        if let Some(readiness) = self.readiness {
            if !(readiness.check)(&existing) {
                debug!(phase = self.name, %key, "present but not ready");
                return PhaseResult::requeue(readiness.delay);
            }
        }

        if self.update_spec {
            self.refresh(store, existing).await
        } else {
            PhaseResult::Continue
        }
    }
}

/// `existing` with its spec replaced by the one in `desired`.
fn with_spec_of(existing: Object, desired: &Object) -> Result<Object> {
    match (existing, desired) {
        (Object::OperatorGroup(mut current), Object::OperatorGroup(wanted)) => {
            current.spec = wanted.spec.clone();
            Ok(current.into())
        }
        (Object::Subscription(mut current), Object::Subscription(wanted)) => {
            current.spec = wanted.spec.clone();
            Ok(current.into())
        }
        (Object::Grafana(mut current), Object::Grafana(wanted)) => {
            current.spec = wanted.spec.clone();
            Ok(current.into())
        }
        (current, wanted) if current.kind() == wanted.kind() => Ok(current),
        (current, wanted) => Err(OperatorError::TypeMismatch {
            expected: wanted.kind(),
            actual: current.kind(),
        }),
    }
}

/// Waits for a CustomResourceDefinition to report `Established=True`.
pub struct EstablishedPhase {
    name: &'static str,
    crd: String,
    absent_delay: Duration,
    pending_delay: Duration,
}

impl EstablishedPhase {
    pub fn new(name: &'static str, crd: impl Into<String>) -> Self {
        Self {
            name,
            crd: crd.into(),
            absent_delay: Duration::from_secs(10),
            pending_delay: Duration::from_secs(2),
        }
    }
}

fn is_established(crd: &CustomResourceDefinition) -> bool {
    crd.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Established" && c.status == "True")
        })
}

#[async_trait]
impl Phase for EstablishedPhase {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, store: &dyn ObjectStore) -> PhaseResult {
        let key = ObjectKey::cluster(Kind::CustomResourceDefinition, self.crd.as_str());
        let object = match store.get(&key).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                debug!(phase = self.name, crd = %self.crd, "definition not installed yet");
                return PhaseResult::requeue(self.absent_delay);
            }
            Err(e) => return PhaseResult::Error(e.into()),
        };

        let crd = match CustomResourceDefinition::try_from(object) {
            Ok(crd) => crd,
            Err(e) => return PhaseResult::Error(e),
        };
        if is_established(&crd) {
            PhaseResult::Continue
        } else {
            debug!(phase = self.name, crd = %self.crd, "definition not established yet");
            PhaseResult::requeue(self.pending_delay)
        }
    }
}

/// Readiness check for namespaces: status phase must be `Active`.
pub fn namespace_active(object: &Object) -> bool {
    match object {
        Object::Namespace(Namespace { status, .. }) => status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == "Active"),
        _ => false,
    }
}

/// Ordered phases run as one pass.
pub struct PhaseEngine {
    phases: Vec<Box<dyn Phase>>,
}

impl PhaseEngine {
    pub fn new(phases: Vec<Box<dyn Phase>>) -> Self {
        Self { phases }
    }

    pub fn phase_names(&self) -> Vec<&'static str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    /// Runs phases in order until one is not satisfied.
    ///
    /// Phase `k + 1` never runs in a pass where phase `k` did not continue.
    pub async fn run(&self, store: &dyn ObjectStore) -> Result<Action> {
        for phase in &self.phases {
            match phase.run(store).await {
                PhaseResult::Continue => {
                    debug!(phase = phase.name(), "phase satisfied");
                }
                PhaseResult::Requeue { after, error } => {
                    match error {
                        Some(e) => debug!(phase = phase.name(), ?after, error = %e, "requeueing"),
                        None => debug!(phase = phase.name(), ?after, "requeueing"),
                    }
                    return Ok(Action::requeue(after));
                }
                PhaseResult::Error(e) => {
                    error!(phase = phase.name(), error = %e, "bootstrap phase failed");
                    return Err(e);
                }
            }
        }
        Ok(Action::await_change())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::external::{OperatorGroup, OperatorGroupSpec};
    use crate::operator::store::memory::MemoryStore;
    use crate::operator::store::MockObjectStore;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
        CustomResourceDefinitionCondition, CustomResourceDefinitionStatus,
    };
    use kube::api::ObjectMeta;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Copy)]
    enum Step {
        Pass,
        Wait,
        Fail,
    }

    struct Scripted {
        name: &'static str,
        step: Step,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Phase for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _store: &dyn ObjectStore) -> PhaseResult {
            self.log.lock().unwrap().push(self.name);
            match self.step {
                Step::Pass => PhaseResult::Continue,
                Step::Wait => PhaseResult::requeue(Duration::from_secs(5)),
                Step::Fail => PhaseResult::Error(OperatorError::InvalidSpec("broken".into())),
            }
        }
    }

    fn engine(script: &[(&'static str, Step)]) -> (PhaseEngine, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let phases = script
            .iter()
            .map(|&(name, step)| {
                Box::new(Scripted {
                    name,
                    step,
                    log: log.clone(),
                }) as Box<dyn Phase>
            })
            .collect();
        (PhaseEngine::new(phases), log)
    }

    #[tokio::test]
    async fn stops_at_first_requeue() {
        let (engine, log) = engine(&[("a", Step::Pass), ("b", Step::Wait), ("c", Step::Pass)]);
        let action = engine.run(&MemoryStore::new()).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn error_stops_and_surfaces() {
        let (engine, log) = engine(&[("a", Step::Fail), ("b", Step::Pass)]);
        assert!(engine.run(&MemoryStore::new()).await.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn all_continue_awaits_change() {
        let (engine, log) = engine(&[("a", Step::Pass), ("b", Step::Pass)]);
        assert_eq!(engine.run(&MemoryStore::new()).await.unwrap(), Action::await_change());
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    fn group(targets: &[&str]) -> OperatorGroup {
        OperatorGroup {
            metadata: ObjectMeta {
                name: Some("group".into()),
                namespace: Some("mso".into()),
                ..Default::default()
            },
            spec: OperatorGroupSpec {
                target_namespaces: targets.iter().map(|t| t.to_string()).collect(),
            },
        }
    }

    #[tokio::test]
    async fn object_phase_refreshes_drifted_spec() {
        let store = MemoryStore::new();
        store.insert(group(&["elsewhere"]).into());
        let phase = ObjectPhase::new("group", group(&["mso"]), Duration::from_secs(5)).update_spec();

        assert!(matches!(phase.run(&store).await, PhaseResult::Continue));
        let stored = OperatorGroup::try_from(
            store
                .object(&ObjectKey::namespaced(Kind::OperatorGroup, "mso", "group"))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(stored.spec.target_namespaces, vec!["mso".to_string()]);

        // already current: no write
        let before = store.mutations();
        assert!(matches!(phase.run(&store).await, PhaseResult::Continue));
        assert_eq!(store.mutations(), before);
    }

    #[tokio::test]
    async fn object_phase_update_conflict_requeues_quietly() {
        let store = MemoryStore::new();
        store.insert(group(&["elsewhere"]).into());
        store.inject_conflicts(1);
        let phase = ObjectPhase::new("group", group(&["mso"]), Duration::from_secs(5)).update_spec();

        match phase.run(&store).await {
            PhaseResult::Requeue { after, error } => {
                assert_eq!(after, CONFLICT_REQUEUE);
                assert!(error.is_some());
            }
            other => panic!("expected requeue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_racing_another_writer_continues() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_create()
            .returning(|object| Err(StoreError::AlreadyExists(object.key())));
        let phase = ObjectPhase::new("group", group(&["mso"]), Duration::from_secs(5));

        assert!(matches!(phase.run(&store).await, PhaseResult::Continue));
    }

    #[tokio::test]
    async fn read_failure_is_an_error() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|key| {
            Err(StoreError::Invalid {
                key: key.clone(),
                message: "forbidden".into(),
            })
        });
        let phase = EstablishedPhase::new("crd", "grafanas.integreatly.org");

        assert!(matches!(phase.run(&store).await, PhaseResult::Error(_)));
    }

    fn crd(established: Option<&str>) -> CustomResourceDefinition {
        CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some("grafanas.integreatly.org".into()),
                ..Default::default()
            },
            status: established.map(|status| CustomResourceDefinitionStatus {
                conditions: Some(vec![CustomResourceDefinitionCondition {
                    type_: "Established".into(),
                    status: status.into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn established_phase_waits_for_condition() {
        let store = MemoryStore::new();
        let phase = EstablishedPhase::new("crd", "grafanas.integreatly.org");
        assert!(matches!(
            phase.run(&store).await,
            PhaseResult::Requeue { after, .. } if after == Duration::from_secs(10)
        ));

        store.insert(crd(Some("False")).into());
        assert!(matches!(
            phase.run(&store).await,
            PhaseResult::Requeue { after, .. } if after == Duration::from_secs(2)
        ));

        store.insert(crd(Some("True")).into());
        assert!(matches!(phase.run(&store).await, PhaseResult::Continue));
    }

    #[test]
    fn namespace_readiness() {
        let mut ns = Namespace::default();
        assert!(!namespace_active(&ns.clone().into()));
        ns.status = Some(k8s_openapi::api::core::v1::NamespaceStatus {
            phase: Some("Terminating".into()),
            ..Default::default()
        });
        assert!(!namespace_active(&ns.clone().into()));
        ns.status.as_mut().unwrap().phase = Some("Active".into());
        assert!(namespace_active(&ns.into()));
    }
}
