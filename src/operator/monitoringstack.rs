//! MonitoringStack Controller
//!
//! Converges every stack into its metrics, alerting and dashboard children.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::apply::apply_all;
use super::controller::{run_controller, Reconciler};
use super::crd::MonitoringStack;
use super::events::{annotated_owner, Identity};
use super::external::{Alertmanager, GrafanaDataSource, Prometheus};
use super::load_live;
use super::object::Kind;
use super::resources::stack_descriptors;
use super::store::ObjectStore;
use super::types::Result;
use crate::config::{InstanceSelector, OperatorConfig};

pub struct MonitoringStackReconciler {
    store: Arc<dyn ObjectStore>,
    selector: InstanceSelector,
    datasource_namespace: String,
}

impl MonitoringStackReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        selector: InstanceSelector,
        datasource_namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            selector,
            datasource_namespace: datasource_namespace.into(),
        }
    }
}

#[async_trait]
impl Reconciler for MonitoringStackReconciler {
    type Resource = MonitoringStack;

    fn name(&self) -> &'static str {
        "monitoring-stack"
    }

    async fn reconcile(&self, identity: &Identity) -> Result<Action> {
        let Some(ms) =
            load_live::<MonitoringStack>(self.store.as_ref(), Kind::MonitoringStack, identity)
                .await?
        else {
            debug!(%identity, "stack gone or deleting, nothing to do");
            return Ok(Action::await_change());
        };

        info!(%identity, "Reconciling MonitoringStack");
        let descriptors = stack_descriptors(&ms, &self.selector, &self.datasource_namespace)?;
        apply_all(self.store.as_ref(), &descriptors).await
    }
}

/// Stack the data source `datasource` was registered for.
pub fn datasource_owner(datasource: &GrafanaDataSource) -> Option<ObjectRef<MonitoringStack>> {
    annotated_owner(datasource.meta()).map(|owner| owner.object_ref())
}

/// Start the MonitoringStack controller
///
/// Triggered by stack changes, changes to any owned child, and changes to
/// the data sources registered in the operator namespace.
pub async fn run_monitoringstack_controller(
    client: Client,
    store: Arc<dyn ObjectStore>,
    config: &OperatorConfig,
    cancel: CancellationToken,
) {
    let reconciler = MonitoringStackReconciler::new(
        store,
        config.instance_selector.clone(),
        config.namespace.clone(),
    );

    let controller = Controller::new(
        Api::<MonitoringStack>::all(client.clone()),
        WatcherConfig::default(),
    )
    .owns(Api::<ServiceAccount>::all(client.clone()), WatcherConfig::default())
    .owns(Api::<Role>::all(client.clone()), WatcherConfig::default())
    .owns(Api::<RoleBinding>::all(client.clone()), WatcherConfig::default())
    .owns(Api::<Secret>::all(client.clone()), WatcherConfig::default())
    .owns(Api::<Alertmanager>::all(client.clone()), WatcherConfig::default())
    .owns(Api::<Service>::all(client.clone()), WatcherConfig::default())
    .owns(Api::<PodDisruptionBudget>::all(client.clone()), WatcherConfig::default())
    .owns(Api::<Prometheus>::all(client.clone()), WatcherConfig::default())
    .watches(
        Api::<GrafanaDataSource>::namespaced(client, &config.namespace),
        WatcherConfig::default(),
        |datasource| datasource_owner(&datasource),
    );

    run_controller(controller, reconciler, config.workers, cancel).await;
}
