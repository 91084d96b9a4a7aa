//! Reconciliation core
//!
//! Three controllers share one object store: MonitoringStacks, ThanosQueriers
//! and the Grafana Operator bootstrap. Each runs as its own
//! [`kube::runtime::Controller`].

pub mod apply;
pub mod bootstrap;
pub mod controller;
pub mod crd;
pub mod events;
pub mod external;
pub mod grafana;
pub mod monitoringstack;
pub mod object;
pub mod relationship;
pub mod resources;
pub mod store;
pub mod thanosquerier;
mod types;

pub use crd::{
    MonitoringStack, MonitoringStackSpec, MonitoringStackStatus, ThanosQuerier,
    ThanosQuerierSpec, ThanosQuerierStatus,
};
pub use object::{Kind, Object, ObjectKey};
pub use controller::{ErrorBackoff, Reconciler};
pub use store::{KubeStore, ObjectStore, StoreError};
pub use types::*;

use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::OperatorConfig;
use events::Identity;

/// Reads the primary object behind `identity`.
///
/// Missing objects and objects being deleted both yield `None`: there is
/// nothing left to converge.
pub(crate) async fn load_live<K>(
    store: &dyn ObjectStore,
    kind: Kind,
    identity: &Identity,
) -> Result<Option<K>>
where
    K: TryFrom<Object, Error = OperatorError>,
{
    let key = ObjectKey {
        kind,
        namespace: identity.namespace.clone(),
        name: identity.name.clone(),
    };
    let Some(object) = store.get(&key).await? else {
        return Ok(None);
    };
    if object.meta().deletion_timestamp.is_some() {
        return Ok(None);
    }
    K::try_from(object).map(Some)
}

/// All controllers of the operator process.
pub struct Operator {
    client: Client,
    config: OperatorConfig,
}

impl Operator {
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self { client, config }
    }

    /// Runs every controller until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(self.client.clone()));
        info!(
            namespace = %self.config.namespace,
            instance_selector = %self.config.instance_selector,
            workers = self.config.workers,
            "starting controllers"
        );

        tokio::join!(
            monitoringstack::run_monitoringstack_controller(
                self.client.clone(),
                store.clone(),
                &self.config,
                cancel.clone(),
            ),
            thanosquerier::run_thanosquerier_controller(
                self.client.clone(),
                store.clone(),
                &self.config,
                cancel.clone(),
            ),
            grafana::run_grafana_controller(self.client.clone(), store, &self.config, cancel),
        );
        info!("all controllers stopped");
    }
}
