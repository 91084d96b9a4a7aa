//! Apply primitive
//!
//! Idempotent create-or-update of one child object against the store, with
//! store failures folded into a small set of outcomes.

use std::time::Duration;
use tracing::{debug, error};

use kube::runtime::controller::Action;

use super::object::{Object, ObjectKey};
use super::store::{ObjectStore, StoreError};
use super::types::{OperatorError, Result, CONFLICT_REQUEUE};

/// Result of converging one descriptor.
#[derive(Debug)]
pub enum Outcome {
    /// The store was written.
    Applied,
    /// The stored object already had the effective payload; nothing was written.
    Unchanged,
    /// Create raced with another writer; the object exists now.
    Benign,
    /// Lost an optimistic-concurrency race; try again later.
    Requeue(Duration),
    Fatal(OperatorError),
}

/// Store call an outcome is classified from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Write {
    Create,
    Update,
    Apply,
}

impl Outcome {
    fn from_write(key: &ObjectKey, write: Write, result: std::result::Result<Object, StoreError>) -> Self {
        match result {
            Ok(_) => Outcome::Applied,
            Err(StoreError::AlreadyExists(_)) => {
                debug!(%key, "object created concurrently");
                Outcome::Benign
            }
            Err(StoreError::Conflict(_)) => {
                debug!(%key, "stale read, requeueing");
                Outcome::Requeue(CONFLICT_REQUEUE)
            }
            // deleted between read and update
            Err(StoreError::NotFound(_)) if write == Write::Update => {
                debug!(%key, "object vanished before update, requeueing");
                Outcome::Requeue(CONFLICT_REQUEUE)
            }
            Err(e) => Outcome::Fatal(e.into()),
        }
    }
}

/// Desired form of one child object.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    desired: Object,
}

impl Descriptor {
    pub fn new(desired: impl Into<Object>) -> Self {
        Self {
            desired: desired.into(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.desired.key()
    }

    pub fn desired(&self) -> &Object {
        &self.desired
    }

    pub fn into_desired(self) -> Object {
        self.desired
    }

    /// Effective object to write given what the store currently holds.
    ///
    /// The desired payload wins except for store-assigned fields, which are
    /// carried over from `existing`.
    pub fn merge(&self, existing: Option<&Object>) -> Result<Object> {
        let mut effective = self.desired.clone();
        if let Some(existing) = existing {
            effective.merge_immutable_fields(existing)?;
        }
        Ok(effective)
    }
}

/// Converges one descriptor: read, then create or update.
pub async fn apply(store: &dyn ObjectStore, descriptor: &Descriptor) -> Outcome {
    let key = descriptor.key();

    let existing = match store.get(&key).await {
        Ok(existing) => existing,
        Err(e) if e.is_not_found() => None,
        Err(e) => return Outcome::Fatal(e.into()),
    };

    let Some(existing) = existing else {
        debug!(%key, "creating");
        return Outcome::from_write(&key, Write::Create, store.create(descriptor.desired()).await);
    };

    let effective = match descriptor.merge(Some(&existing)) {
        Ok(effective) => effective,
        Err(e) => return Outcome::Fatal(e),
    };
    if effective == existing {
        return Outcome::Unchanged;
    }

    debug!(%key, "updating");
    Outcome::from_write(&key, Write::Update, store.update(&effective).await)
}

/// Server-side apply of `object` with forced field ownership.
pub async fn apply_forced(store: &dyn ObjectStore, object: &Object, field_manager: &str) -> Outcome {
    let key = object.key();
    debug!(%key, field_manager, "applying");
    Outcome::from_write(&key, Write::Apply, store.apply(object, field_manager).await)
}

/// Folds one outcome into the pass. `None` means keep going.
fn settle(component: &ObjectKey, outcome: Outcome) -> Option<Result<Action>> {
    match outcome {
        Outcome::Applied | Outcome::Unchanged | Outcome::Benign => None,
        Outcome::Requeue(after) => Some(Ok(Action::requeue(after))),
        Outcome::Fatal(e) => {
            error!(component = %component, error = %e, "failed to converge child object");
            Some(Err(e))
        }
    }
}

/// Applies descriptors in order, stopping at the first requeue or fatal
/// outcome. Later descriptors wait for the next pass.
pub async fn apply_all(store: &dyn ObjectStore, descriptors: &[Descriptor]) -> Result<Action> {
    for descriptor in descriptors {
        let outcome = apply(store, descriptor).await;
        if let Some(done) = settle(&descriptor.key(), outcome) {
            return done;
        }
    }
    Ok(Action::await_change())
}

/// Like [`apply_all`] but every object goes through server-side apply.
pub async fn apply_all_forced(
    store: &dyn ObjectStore,
    objects: &[Object],
    field_manager: &str,
) -> Result<Action> {
    for object in objects {
        let outcome = apply_forced(store, object, field_manager).await;
        if let Some(done) = settle(&object.key(), outcome) {
            return done;
        }
    }
    Ok(Action::await_change())
}
