//! Shared Grafana installation objects
//!
//! Everything lives in the configured bootstrap namespace.

use k8s_openapi::api::apps::v1::{DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use maplit::btreemap;
use std::collections::BTreeMap;

use super::metadata;
use crate::operator::external::{
    Grafana, GrafanaConfig, GrafanaConfigAuth, GrafanaConfigAuthAnonymous, GrafanaConfigLog,
    GrafanaConfigUsers, GrafanaDeployment, GrafanaIngress, GrafanaSpec, OperatorGroup,
    OperatorGroupSpec, Subscription, SubscriptionSpec,
};
use crate::operator::types::LABEL_PART_OF;

pub const SUBSCRIPTION_NAME: &str = "monitoring-stack-operator-grafana-operator";
pub const OPERATOR_GROUP_NAME: &str = "monitoring-stack-operator-grafana-operator";
pub const GRAFANA_NAME: &str = "monitoring-stack-operator-grafana";
pub const GRAFANA_CRD_NAME: &str = "grafanas.integreatly.org";

const DASHBOARD_PART_OF: &str = "monitoring-stack-operator";

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn operator_group(namespace: &str) -> OperatorGroup {
    OperatorGroup {
        metadata: metadata(OPERATOR_GROUP_NAME, namespace, BTreeMap::new(), None),
        spec: OperatorGroupSpec {
            target_namespaces: vec![namespace.to_string()],
        },
    }
}

pub fn subscription(namespace: &str) -> Subscription {
    Subscription {
        metadata: metadata(SUBSCRIPTION_NAME, namespace, BTreeMap::new(), None),
        spec: SubscriptionSpec {
            catalog_source: String::new(),
            catalog_source_namespace: String::new(),
            package: "grafana-operator".to_string(),
            channel: "v4".to_string(),
            install_plan_approval: Some("Automatic".to_string()),
            starting_csv: "grafana-operator.v4.0.1".to_string(),
        },
    }
}

/// Single-replica Grafana with anonymous viewer access, picking up dashboards
/// labelled as part of this operator.
pub fn grafana(namespace: &str) -> Grafana {
    Grafana {
        metadata: metadata(GRAFANA_NAME, namespace, BTreeMap::new(), None),
        spec: GrafanaSpec {
            ingress: Some(GrafanaIngress {
                enabled: true,
                path_type: "Prefix".to_string(),
                path: "/".to_string(),
            }),
            deployment: Some(GrafanaDeployment {
                replicas: Some(1),
                strategy: Some(DeploymentStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: Some(RollingUpdateDeployment {
                        max_unavailable: Some(IntOrString::Int(0)),
                        max_surge: Some(IntOrString::Int(1)),
                    }),
                }),
            }),
            dashboard_label_selector: vec![LabelSelector {
                match_labels: Some(btreemap! {
                    LABEL_PART_OF.to_string() => DASHBOARD_PART_OF.to_string(),
                }),
                ..Default::default()
            }],
            config: GrafanaConfig {
                log: Some(GrafanaConfigLog {
                    mode: "console".to_string(),
                    level: "error".to_string(),
                }),
                auth: Some(GrafanaConfigAuth {
                    disable_login_form: Some(true),
                    disable_signout_menu: Some(true),
                }),
                auth_anonymous: Some(GrafanaConfigAuthAnonymous {
                    enabled: Some(true),
                }),
                users: Some(GrafanaConfigUsers {
                    viewers_can_edit: Some(true),
                }),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_land_in_bootstrap_namespace() {
        assert_eq!(
            operator_group("mso").spec.target_namespaces,
            vec!["mso".to_string()]
        );
        assert_eq!(subscription("mso").metadata.namespace.as_deref(), Some("mso"));
        assert_eq!(grafana("mso").metadata.name.as_deref(), Some(GRAFANA_NAME));
        assert!(namespace("mso").metadata.namespace.is_none());
    }

    #[test]
    fn grafana_config_uses_ini_section_names() {
        let json = serde_json::to_value(&grafana("mso").spec).unwrap();
        assert_eq!(json["config"]["auth.anonymous"]["enabled"], true);
        assert_eq!(json["dashboardLabelSelector"][0]["matchLabels"][LABEL_PART_OF], "monitoring-stack-operator");
        assert_eq!(json["deployment"]["strategy"]["rollingUpdate"]["maxSurge"], 1);
    }

    #[test]
    fn subscription_wire_names() {
        let json = serde_json::to_value(&subscription("mso").spec).unwrap();
        assert_eq!(json["name"], "grafana-operator");
        assert_eq!(json["startingCSV"], "grafana-operator.v4.0.1");
        assert_eq!(json["installPlanApproval"], "Automatic");
    }
}
