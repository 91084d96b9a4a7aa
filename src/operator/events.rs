//! Event sources
//!
//! Triggers the controllers feed into [`kube::runtime::Controller`]: a
//! periodic ticker, name-restricted watches, and mappers from related
//! objects back to the identity they affect. Owner-linked watches use
//! `Controller::owns` directly.

use futures::{Stream, StreamExt};
use kube::api::ObjectMeta;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::Resource;
use std::fmt;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

use super::types::{DATASOURCE_OWNER_NAME, DATASOURCE_OWNER_NAMESPACE};

/// Name and namespace of the object a pass works on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub namespace: Option<String>,
    pub name: String,
}

impl Identity {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn of(meta: &ObjectMeta) -> Self {
        Self {
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    /// Reference the controller runtime schedules passes by.
    pub fn object_ref<K: Resource<DynamicType = ()>>(&self) -> ObjectRef<K> {
        let reference = ObjectRef::new(&self.name);
        match &self.namespace {
            Some(namespace) => reference.within(namespace),
            None => reference,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Fires immediately and then every `period`.
pub fn ticker(period: Duration) -> impl Stream<Item = ()> + Send + Sync + 'static {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    IntervalStream::new(timer).map(|_| ())
}

/// Watch configuration restricted to the object called `name`.
pub fn named(name: &str) -> watcher::Config {
    watcher::Config::default().fields(&format!("metadata.name={name}"))
}

/// Identity recorded in the owner annotations of a cross-namespace child.
pub fn annotated_owner(meta: &ObjectMeta) -> Option<Identity> {
    let annotations = meta.annotations.as_ref()?;
    Some(Identity::namespaced(
        annotations.get(DATASOURCE_OWNER_NAMESPACE)?,
        annotations.get(DATASOURCE_OWNER_NAME)?,
    ))
}
