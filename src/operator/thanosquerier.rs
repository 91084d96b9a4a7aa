//! ThanosQuerier Controller
//!
//! Runs one query frontend per querier, pointed at the sidecars of every
//! MonitoringStack the querier selects.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::apply::apply_all_forced;
use super::controller::{run_controller, Reconciler};
use super::crd::{MonitoringStack, ThanosQuerier};
use super::events::Identity;
use super::load_live;
use super::object::{Kind, Object};
use super::relationship::{find_consumers_affected_by, find_dependencies_for};
use super::resources::thanosquerier::component_labels;
use super::resources::{ensure_labels, owner_reference, querier_objects};
use super::store::ObjectStore;
use super::types::{OperatorError, Result, THANOS_QUERIER_FIELD_MANAGER};
use crate::config::OperatorConfig;

pub struct ThanosQuerierReconciler {
    store: Arc<dyn ObjectStore>,
}

impl ThanosQuerierReconciler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

async fn list_typed<K>(store: &dyn ObjectStore, kind: Kind) -> Result<Vec<K>>
where
    K: TryFrom<Object, Error = OperatorError>,
{
    store
        .list(kind, None)
        .await?
        .into_iter()
        .map(K::try_from)
        .collect()
}

#[async_trait]
impl Reconciler for ThanosQuerierReconciler {
    type Resource = ThanosQuerier;

    fn name(&self) -> &'static str {
        "thanos-querier"
    }

    async fn reconcile(&self, identity: &Identity) -> Result<Action> {
        let store = self.store.as_ref();
        let Some(querier) = load_live::<ThanosQuerier>(store, Kind::ThanosQuerier, identity).await?
        else {
            debug!(%identity, "querier gone or deleting, nothing to do");
            return Ok(Action::await_change());
        };

        info!(%identity, "Reconciling ThanosQuerier");
        let stacks: Vec<MonitoringStack> = list_typed(store, Kind::MonitoringStack).await?;
        let endpoints = find_dependencies_for(&querier, &stacks)?;
        debug!(%identity, endpoints = endpoints.len(), "resolved sidecar endpoints");

        let labels = component_labels(&querier.name_any());
        let owner = owner_reference(&querier)?;
        let mut objects = querier_objects(&querier, &endpoints)?;
        for object in &mut objects {
            ensure_labels(object, &labels);
            // owner references cannot cross namespaces
            if object.meta().namespace == querier.metadata.namespace {
                object.meta_mut().owner_references = Some(vec![owner.clone()]);
            }
        }

        apply_all_forced(store, &objects, THANOS_QUERIER_FIELD_MANAGER).await
    }
}

/// Cached queriers whose selector matches `stack`.
pub fn affected_queriers(
    stack: &MonitoringStack,
    queriers: &[Arc<ThanosQuerier>],
) -> Vec<ObjectRef<ThanosQuerier>> {
    let affected = find_consumers_affected_by(stack, queriers.iter().map(Arc::as_ref));
    debug!(
        stack = %Identity::of(&stack.metadata),
        queriers = affected.len(),
        "stack change affects queriers"
    );
    affected.iter().map(Identity::object_ref).collect()
}

/// Start the ThanosQuerier controller
///
/// Triggered by querier changes, changes to owned components, and stack
/// changes mapped through the selectors of the known queriers.
pub async fn run_thanosquerier_controller(
    client: Client,
    store: Arc<dyn ObjectStore>,
    config: &OperatorConfig,
    cancel: CancellationToken,
) {
    let reconciler = ThanosQuerierReconciler::new(store);

    let controller = Controller::new(
        Api::<ThanosQuerier>::all(client.clone()),
        WatcherConfig::default(),
    );
    let queriers = controller.store();
    let controller = controller
        .owns(Api::<Deployment>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<ServiceAccount>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<Service>::all(client.clone()), WatcherConfig::default())
        .watches(
            Api::<MonitoringStack>::all(client),
            WatcherConfig::default(),
            move |stack| affected_queriers(&stack, &queriers.state()),
        );

    run_controller(controller, reconciler, config.workers, cancel).await;
}
