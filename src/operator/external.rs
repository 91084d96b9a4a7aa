//! Third-party resource types
//!
//! Partial schemas of the resources owned by other operators (prometheus-operator,
//! grafana-operator and OLM). Only the fields this operator writes are modelled;
//! unknown fields returned by the API server are dropped on read.

use k8s_openapi::api::apps::v1::DeploymentStrategy;
use k8s_openapi::api::core::v1::{PersistentVolumeClaimSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==================== prometheus-operator ====================

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "Prometheus",
    plural = "prometheuses",
    schema = "disabled",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_metadata: Option<EmbeddedObjectMetadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_monitor_selector: Option<LabelSelector>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_monitor_selector: Option<LabelSelector>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_selector: Option<LabelSelector>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerting: Option<AlertingSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_scrape_configs: Option<SecretKeySelector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_write: Vec<RemoteWriteSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thanos: Option<ThanosSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedObjectMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingSpec {
    pub alertmanagers: Vec<AlertmanagerEndpoints>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerEndpoints {
    pub api_version: String,
    pub name: String,
    pub namespace: String,
    pub scheme: String,
    pub port: IntOrString,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteWriteSpec {
    /// Endpoint receiving the samples
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    pub volume_claim_template: EmbeddedPersistentVolumeClaim,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EmbeddedPersistentVolumeClaim {
    pub spec: PersistentVolumeClaimSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThanosSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "Alertmanager",
    plural = "alertmanagers",
    schema = "disabled",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_metadata: Option<EmbeddedObjectMetadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

// ==================== grafana-operator ====================

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "integreatly.org",
    version = "v1alpha1",
    kind = "GrafanaDataSource",
    plural = "grafanadatasources",
    schema = "disabled",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDataSourceSpec {
    pub name: String,
    pub datasources: Vec<GrafanaDataSourceFields>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDataSourceFields {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub access: String,
    pub url: String,
    pub version: i32,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "integreatly.org",
    version = "v1alpha1",
    kind = "Grafana",
    plural = "grafanas",
    schema = "disabled",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<GrafanaIngress>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<GrafanaDeployment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dashboard_label_selector: Vec<LabelSelector>,

    #[serde(default)]
    pub config: GrafanaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaIngress {
    pub enabled: bool,
    pub path_type: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDeployment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeploymentStrategy>,
}

/// Mirrors grafana.ini sections, hence the snake_case and dotted keys.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GrafanaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<GrafanaConfigLog>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<GrafanaConfigAuth>,

    #[serde(rename = "auth.anonymous", skip_serializing_if = "Option::is_none")]
    pub auth_anonymous: Option<GrafanaConfigAuthAnonymous>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<GrafanaConfigUsers>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GrafanaConfigLog {
    pub mode: String,
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GrafanaConfigAuth {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_login_form: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_signout_menu: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GrafanaConfigAuthAnonymous {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GrafanaConfigUsers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewers_can_edit: Option<bool>,
}

// ==================== OLM ====================

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "operators.coreos.com",
    version = "v1",
    kind = "OperatorGroup",
    plural = "operatorgroups",
    schema = "disabled",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct OperatorGroupSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_namespaces: Vec<String>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "Subscription",
    plural = "subscriptions",
    schema = "disabled",
    derive = "PartialEq",
    namespaced
)]
pub struct SubscriptionSpec {
    #[serde(rename = "source")]
    pub catalog_source: String,

    #[serde(rename = "sourceNamespace")]
    pub catalog_source_namespace: String,

    #[serde(rename = "name")]
    pub package: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,

    #[serde(rename = "installPlanApproval", skip_serializing_if = "Option::is_none")]
    pub install_plan_approval: Option<String>,

    #[serde(rename = "startingCSV", default, skip_serializing_if = "String::is_empty")]
    pub starting_csv: String,
}
