//! Controller plumbing
//!
//! Every controller is a [`kube::runtime::Controller`] over its primary kind.
//! A [`Reconciler`] holds the domain logic and works on an [`Identity`];
//! this module wires it into the runtime and keeps the per-object error
//! backoff.

use async_trait::async_trait;
use futures::StreamExt;
use kube::runtime::controller::{Action, Config as ControllerConfig, Controller};
use kube::Resource;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::Identity;
use super::types::{OperatorError, Result};

/// Retry delay after the first failed pass.
pub const BACKOFF_BASE: Duration = Duration::from_millis(5);
/// Retry delay ceiling.
pub const BACKOFF_MAX: Duration = Duration::from_secs(1000);

/// One reconciliation pass over an identity.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Kind whose watch drives the controller.
    type Resource: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static;

    /// Controller name used in logs.
    fn name(&self) -> &'static str;

    /// Identity a pass works on when `object` triggers it.
    fn identity(&self, object: &Self::Resource) -> Identity {
        Identity::of(object.meta())
    }

    async fn reconcile(&self, identity: &Identity) -> Result<Action>;
}

/// Exponential retry delays per identity.
#[derive(Debug, Default)]
pub struct ErrorBackoff {
    failures: Mutex<HashMap<Identity, Duration>>,
}

impl ErrorBackoff {
    /// Records a failure and returns the delay before the next attempt.
    pub fn next(&self, identity: &Identity) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let delay = match failures.get(identity) {
            Some(previous) => (*previous * 2).min(BACKOFF_MAX),
            None => BACKOFF_BASE,
        };
        failures.insert(identity.clone(), delay);
        delay
    }

    pub fn reset(&self, identity: &Identity) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity);
    }
}

/// Shared state handed to every pass of one controller.
pub struct Context<R> {
    reconciler: R,
    backoff: ErrorBackoff,
}

impl<R> Context<R> {
    pub fn new(reconciler: R) -> Self {
        Self {
            reconciler,
            backoff: ErrorBackoff::default(),
        }
    }
}

async fn reconcile<R: Reconciler>(object: Arc<R::Resource>, ctx: Arc<Context<R>>) -> Result<Action> {
    let identity = ctx.reconciler.identity(&object);
    let action = ctx.reconciler.reconcile(&identity).await?;
    ctx.backoff.reset(&identity);
    Ok(action)
}

/// Error handler for the controller
fn error_policy<R: Reconciler>(
    object: Arc<R::Resource>,
    error: &OperatorError,
    ctx: Arc<Context<R>>,
) -> Action {
    let identity = ctx.reconciler.identity(&object);
    let delay = ctx.backoff.next(&identity);
    error!(
        controller = ctx.reconciler.name(),
        %identity,
        error = %error,
        retry_in = ?delay,
        "Reconciliation error"
    );
    Action::requeue(delay)
}

/// Drives `controller` with `reconciler` until `cancel` fires.
pub async fn run_controller<R: Reconciler>(
    controller: Controller<R::Resource>,
    reconciler: R,
    workers: usize,
    cancel: CancellationToken,
) {
    let name = reconciler.name();
    let concurrency = u16::try_from(workers.max(1)).unwrap_or(u16::MAX);
    info!(controller = name, workers = concurrency, "Starting controller");

    controller
        .with_config(ControllerConfig::default().concurrency(concurrency))
        .graceful_shutdown_on(cancel.cancelled_owned())
        .run(reconcile::<R>, error_policy::<R>, Arc::new(Context::new(reconciler)))
        .for_each(|res| async move {
            match res {
                Ok((object, action)) => {
                    debug!(controller = name, %object, ?action, "Reconciled");
                }
                Err(e) => {
                    warn!(controller = name, error = %e, "Reconciliation failed");
                }
            }
        })
        .await;

    info!(controller = name, "controller stopped");
}
