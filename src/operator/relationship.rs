//! Relationship resolver
//!
//! Matches ThanosQuerier selectors against MonitoringStack labels in both
//! directions. No indexing: every call walks the full lists.

use kube::core::{Selector, SelectorExt};
use kube::ResourceExt;
use tracing::warn;

use super::crd::{MonitoringStack, ThanosQuerier};
use super::events::Identity;
use super::types::{OperatorError, Result};

/// Query endpoint of the sidecar service of stack `name` in `namespace`.
pub fn endpoint_url(name: &str, namespace: &str) -> String {
    format!(
        "dnssrv+_grpc._tcp.{}.{}.svc.cluster.local",
        sidecar_service_name(name),
        namespace
    )
}

pub fn sidecar_service_name(stack: &str) -> String {
    format!("{stack}-thanos-sidecar")
}

fn querier_selector(querier: &ThanosQuerier) -> Result<Selector> {
    Selector::try_from(querier.spec.selector.clone()).map_err(|e| OperatorError::InvalidSelector {
        owner: format!("ThanosQuerier {}", Identity::of(&querier.metadata)),
        reason: e.to_string(),
    })
}

/// Endpoints of every stack `querier` selects, sorted.
///
/// A stack counts when its labels match the querier's selector and its
/// namespace passes the querier's namespace selector.
pub fn find_dependencies_for(
    querier: &ThanosQuerier,
    stacks: &[MonitoringStack],
) -> Result<Vec<String>> {
    let selector = querier_selector(querier)?;
    let mut endpoints: Vec<String> = stacks
        .iter()
        .filter(|stack| selector.matches(stack.labels()))
        .filter_map(|stack| {
            let namespace = stack.namespace()?;
            querier
                .matches_namespace(&namespace)
                .then(|| endpoint_url(&stack.name_any(), &namespace))
        })
        .collect();
    endpoints.sort();
    endpoints.dedup();
    Ok(endpoints)
}

/// Identities of every querier whose selector matches `stack`'s labels.
///
/// Queriers with a malformed selector are skipped; their own pass reports
/// the error.
pub fn find_consumers_affected_by<'a>(
    stack: &MonitoringStack,
    queriers: impl IntoIterator<Item = &'a ThanosQuerier>,
) -> Vec<Identity> {
    queriers
        .into_iter()
        .filter(|querier| match querier_selector(querier) {
            Ok(selector) => selector.matches(stack.labels()),
            Err(e) => {
                warn!(error = %e, "skipping querier");
                false
            }
        })
        .map(|querier| Identity::of(&querier.metadata))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::crd::{MonitoringStackSpec, NamespaceSelector, ThanosQuerierSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
    use kube::api::ObjectMeta;
    use maplit::btreemap;

    fn stack(namespace: &str, name: &str, team: &str) -> MonitoringStack {
        let mut ms = MonitoringStack::new(name, MonitoringStackSpec::default());
        ms.metadata = ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            labels: Some(btreemap! { "team".to_string() => team.to_string() }),
            ..Default::default()
        };
        ms
    }

    fn querier(namespace: &str, selector: LabelSelector, any: bool) -> ThanosQuerier {
        let mut tq = ThanosQuerier::new(
            "q",
            ThanosQuerierSpec {
                selector,
                namespace_selector: NamespaceSelector {
                    any,
                    match_names: vec![],
                },
                replica_labels: vec![],
            },
        );
        tq.metadata.namespace = Some(namespace.into());
        tq
    }

    fn team(value: &str) -> LabelSelector {
        LabelSelector {
            match_labels: Some(btreemap! { "team".to_string() => value.to_string() }),
            ..Default::default()
        }
    }

    #[test]
    fn endpoint_format() {
        assert_eq!(
            endpoint_url("bar", "ns"),
            "dnssrv+_grpc._tcp.bar-thanos-sidecar.ns.svc.cluster.local"
        );
    }

    #[test]
    fn selector_match_is_symmetric() {
        let consumer = querier("ns", team("a"), false);
        let mut producers = vec![stack("ns", "first", "a"), stack("ns", "second", "b")];

        let endpoints = find_dependencies_for(&consumer, &producers).unwrap();
        assert_eq!(endpoints, vec![endpoint_url("first", "ns")]);
        assert!(find_consumers_affected_by(&producers[1], &[consumer.clone()]).is_empty());

        producers[1] = stack("ns", "second", "a");
        let requests = find_consumers_affected_by(&producers[1], &[consumer.clone()]);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], Identity::namespaced("ns", "q"));
        assert_eq!(find_dependencies_for(&consumer, &producers).unwrap().len(), 2);
    }

    #[test]
    fn namespace_scope_limits_dependencies() {
        let producers = vec![stack("ns", "local", "a"), stack("other", "remote", "a")];

        let scoped = querier("ns", team("a"), false);
        assert_eq!(
            find_dependencies_for(&scoped, &producers).unwrap(),
            vec![endpoint_url("local", "ns")]
        );

        let everywhere = querier("ns", team("a"), true);
        assert_eq!(
            find_dependencies_for(&everywhere, &producers).unwrap(),
            vec![endpoint_url("local", "ns"), endpoint_url("remote", "other")]
        );
    }

    #[test]
    fn malformed_selector_is_reported_and_skipped() {
        let broken = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "team".into(),
                operator: "Sometimes".into(),
                values: None,
            }]),
            ..Default::default()
        };
        let bad = querier("ns", broken, false);
        let mut good = querier("ns", team("a"), false);
        good.metadata.name = Some("good".into());

        assert!(matches!(
            find_dependencies_for(&bad, &[stack("ns", "foo", "a")]),
            Err(OperatorError::InvalidSelector { .. })
        ));

        let requests = find_consumers_affected_by(&stack("ns", "foo", "a"), &[bad, good]);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "good");
    }
}
