//! Grafana Operator bootstrap controller
//!
//! Installs the grafana-operator through OLM and creates the shared Grafana
//! instance. There is no spec object: a single fixed identity is reconciled
//! on a timer and whenever one of the installed objects changes. The
//! controller is keyed on the bootstrap namespace, so a first pass runs
//! before the watches start to make sure it exists.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::bootstrap::{namespace_active, EstablishedPhase, ObjectPhase, Phase, PhaseEngine};
use super::controller::{run_controller, ErrorBackoff, Reconciler};
use super::events::{named, ticker, Identity};
use super::external::{Grafana, OperatorGroup, Subscription};
use super::resources::grafana::{
    self, GRAFANA_CRD_NAME, GRAFANA_NAME, OPERATOR_GROUP_NAME, SUBSCRIPTION_NAME,
};
use super::store::ObjectStore;
use super::types::Result;
use crate::config::OperatorConfig;

/// Name of the single identity this controller reconciles.
pub const BOOTSTRAP_NAME: &str = "grafana-operator";

const NAMESPACE_PENDING: Duration = Duration::from_secs(5);

pub fn bootstrap_identity(namespace: &str) -> Identity {
    Identity::namespaced(namespace, BOOTSTRAP_NAME)
}

/// Namespace, operator group, subscription, CRD readiness, Grafana instance.
pub fn bootstrap_phases(namespace: &str) -> PhaseEngine {
    let phases: Vec<Box<dyn Phase>> = vec![
        Box::new(
            ObjectPhase::new("namespace", grafana::namespace(namespace), Duration::ZERO)
                .ready_when(namespace_active, NAMESPACE_PENDING),
        ),
        Box::new(
            ObjectPhase::new(
                "operator-group",
                grafana::operator_group(namespace),
                Duration::from_secs(5),
            )
            .update_spec(),
        ),
        Box::new(
            ObjectPhase::new(
                "subscription",
                grafana::subscription(namespace),
                Duration::from_secs(15),
            )
            .update_spec(),
        ),
        Box::new(EstablishedPhase::new("grafana-crd", GRAFANA_CRD_NAME)),
        Box::new(
            ObjectPhase::new("grafana", grafana::grafana(namespace), Duration::from_secs(20))
                .update_spec(),
        ),
    ];
    PhaseEngine::new(phases)
}

pub struct GrafanaBootstrapReconciler {
    store: Arc<dyn ObjectStore>,
    identity: Identity,
    engine: PhaseEngine,
}

impl GrafanaBootstrapReconciler {
    pub fn new(store: Arc<dyn ObjectStore>, namespace: &str) -> Self {
        Self {
            store,
            identity: bootstrap_identity(namespace),
            engine: bootstrap_phases(namespace),
        }
    }

    /// Runs passes until one completes, backing off after failures.
    /// Returns false if `cancel` fires first.
    pub async fn prime(&self, cancel: &CancellationToken) -> bool {
        let backoff = ErrorBackoff::default();
        loop {
            match self.reconcile(&self.identity).await {
                Ok(_) => return true,
                Err(e) => {
                    let delay = backoff.next(&self.identity);
                    error!(identity = %self.identity, error = %e, retry_in = ?delay, "bootstrap pass failed");
                    tokio::select! {
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Reconciler for GrafanaBootstrapReconciler {
    type Resource = Namespace;

    fn name(&self) -> &'static str {
        "grafana-operator"
    }

    /// Every trigger maps to the single bootstrap identity.
    fn identity(&self, _namespace: &Namespace) -> Identity {
        self.identity.clone()
    }

    async fn reconcile(&self, identity: &Identity) -> Result<Action> {
        info!(%identity, phases = ?self.engine.phase_names(), "Reconciling Grafana Operator bootstrap");
        self.engine.run(self.store.as_ref()).await
    }
}

/// Maps any change of a watched object to the bootstrap namespace.
fn to_namespace<T: 'static>(
    namespace: &str,
) -> impl Fn(T) -> Option<ObjectRef<Namespace>> + Send + Sync + 'static {
    let target = ObjectRef::new(namespace);
    move |_| Some(target.clone())
}

/// Start the bootstrap controller; passes never overlap.
///
/// Triggered by a periodic tick and by name-restricted watches on the
/// installed objects.
pub async fn run_grafana_controller(
    client: Client,
    store: Arc<dyn ObjectStore>,
    config: &OperatorConfig,
    cancel: CancellationToken,
) {
    let namespace = config.namespace.as_str();
    let reconciler = GrafanaBootstrapReconciler::new(store, namespace);
    if !reconciler.prime(&cancel).await {
        return;
    }

    let controller = Controller::new(Api::<Namespace>::all(client.clone()), named(namespace))
        .watches(
            Api::<OperatorGroup>::namespaced(client.clone(), namespace),
            named(OPERATOR_GROUP_NAME),
            to_namespace(namespace),
        )
        .watches(
            Api::<Subscription>::namespaced(client.clone(), namespace),
            named(SUBSCRIPTION_NAME),
            to_namespace(namespace),
        )
        .watches(
            Api::<Grafana>::namespaced(client, namespace),
            named(GRAFANA_NAME),
            to_namespace(namespace),
        )
        .reconcile_all_on(ticker(config.resync_interval));

    run_controller(controller, reconciler, 1, cancel).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::object::{Kind, Object, ObjectKey};
    use crate::operator::store::memory::MemoryStore;
    use crate::operator::store::{MockObjectStore, StoreError};
    use k8s_openapi::api::core::v1::NamespaceStatus;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
        CustomResourceDefinition, CustomResourceDefinitionCondition,
        CustomResourceDefinitionStatus,
    };
    use kube::api::ObjectMeta;

    const NS: &str = "monitoring-stack-operator";

    fn crd(status: &str) -> Object {
        CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some(GRAFANA_CRD_NAME.into()),
                ..Default::default()
            },
            status: Some(CustomResourceDefinitionStatus {
                conditions: Some(vec![CustomResourceDefinitionCondition {
                    type_: "Established".into(),
                    status: status.into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
        .into()
    }

    async fn pass(reconciler: &GrafanaBootstrapReconciler) -> Action {
        reconciler.reconcile(&bootstrap_identity(NS)).await.unwrap()
    }

    fn requeue(secs: u64) -> Action {
        Action::requeue(Duration::from_secs(secs))
    }

    #[tokio::test]
    async fn bootstrap_sequence_from_empty_store() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = GrafanaBootstrapReconciler::new(store.clone(), NS);

        assert_eq!(pass(&reconciler).await, Action::requeue(Duration::ZERO));
        assert!(store.object(&ObjectKey::cluster(Kind::Namespace, NS)).is_some());

        assert_eq!(pass(&reconciler).await, requeue(5));
        assert_eq!(pass(&reconciler).await, requeue(15));
        assert_eq!(pass(&reconciler).await, requeue(10));

        store.insert(crd("False"));
        assert_eq!(pass(&reconciler).await, requeue(2));

        store.insert(crd("True"));
        assert_eq!(pass(&reconciler).await, requeue(20));
        assert!(store
            .object(&ObjectKey::namespaced(Kind::Grafana, NS, GRAFANA_NAME))
            .is_some());

        let writes = store.mutations();
        assert_eq!(pass(&reconciler).await, Action::await_change());
        assert_eq!(store.mutations(), writes);
    }

    #[tokio::test]
    async fn priming_creates_the_namespace() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = GrafanaBootstrapReconciler::new(store.clone(), NS);

        assert!(reconciler.prime(&CancellationToken::new()).await);
        assert!(store.object(&ObjectKey::cluster(Kind::Namespace, NS)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn priming_retries_until_cancelled() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .returning(|key| Err(StoreError::MissingNamespace(key.kind)));
        let reconciler = GrafanaBootstrapReconciler::new(Arc::new(store), NS);

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            stop.cancel();
        });
        assert!(!reconciler.prime(&cancel).await);
    }

    #[test]
    fn every_trigger_maps_to_the_bootstrap_identity() {
        let reconciler = GrafanaBootstrapReconciler::new(Arc::new(MemoryStore::new()), NS);
        assert_eq!(
            reconciler.identity(&grafana::namespace("elsewhere")),
            bootstrap_identity(NS)
        );

        let map = to_namespace::<Subscription>(NS);
        let target = map(grafana::subscription(NS)).unwrap();
        assert_eq!(target.name, NS);
        assert_eq!(target.namespace, None);
    }

    #[tokio::test]
    async fn inactive_namespace_blocks_later_phases() {
        let store = Arc::new(MemoryStore::new());
        let mut namespace = grafana::namespace(NS);
        namespace.status = Some(NamespaceStatus {
            phase: Some("Terminating".into()),
            ..Default::default()
        });
        store.insert(namespace.into());

        let reconciler = GrafanaBootstrapReconciler::new(store.clone(), NS);
        assert_eq!(pass(&reconciler).await, requeue(5));
        assert_eq!(store.keys().len(), 1);
    }

    #[tokio::test]
    async fn drifted_subscription_is_restored() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = GrafanaBootstrapReconciler::new(store.clone(), NS);
        for _ in 0..3 {
            pass(&reconciler).await;
        }

        let key = ObjectKey::namespaced(Kind::Subscription, NS, SUBSCRIPTION_NAME);
        let mut drifted = Subscription::try_from(store.object(&key).unwrap()).unwrap();
        drifted.spec.channel = "v3".into();
        store.insert(drifted.into());

        // subscription refreshed, then waits for the CRD
        assert_eq!(pass(&reconciler).await, requeue(10));
        let restored = Subscription::try_from(store.object(&key).unwrap()).unwrap();
        assert_eq!(restored.spec.channel, "v4");
    }
}
