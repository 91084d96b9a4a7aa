//! # monitoring-stack-operator
//!
//! Kubernetes operator that turns `MonitoringStack` resources into a
//! Prometheus, Alertmanager and Grafana data source setup, federates them
//! through `ThanosQuerier` resources, and bootstraps the Grafana operator
//! the dashboards depend on.

pub mod config;
pub mod error;
pub mod logging;
pub mod operator;

pub use error::{Error, Result};
pub use operator::Operator;
