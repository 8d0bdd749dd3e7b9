// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Workload stack: the application manifest and the cluster add-on charts

use crate::config::Config;
use crate::constants::IMAGE_PLACEHOLDER;
use crate::error::{Result, StackError};
use crate::plan::Stack;
use crate::types::resource::{HelmChart, Manifest};
use crate::types::{ClusterHandle, ImageReference, ResourceId, ResourceSpec, StageDescriptor};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};
use url::Url;

const CILIUM_REPO: &str = "https://helm.cilium.io/";

/// Substitute the image into the template and parse every document in it.
/// Nothing is returned unless the placeholder was present and all documents parse.
pub fn render_manifest(template: &str, image: &ImageReference, source: &str) -> Result<Vec<Value>> {
    if !template.contains(IMAGE_PLACEHOLDER) {
        return Err(StackError::PlaceholderMissing {
            placeholder: IMAGE_PLACEHOLDER.to_string(),
            template: source.to_string(),
        });
    }
    let rendered = template.replace(IMAGE_PLACEHOLDER, &image.to_string());

    let mut objects = Vec::new();
    for (i, document) in serde_yaml::Deserializer::from_str(&rendered).enumerate() {
        let value = Value::deserialize(document)
            .map_err(|e| StackError::ManifestParse(format!("{} document {}: {}", source, i, e)))?;
        if value.is_null() {
            continue;
        }
        validate_object(&value)
            .map_err(|reason| StackError::ManifestParse(format!("{} document {}: {}", source, i, reason)))?;
        objects.push(value);
    }

    if objects.is_empty() {
        return Err(StackError::ManifestParse(format!("{} has no objects", source)));
    }
    Ok(objects)
}

fn validate_object(value: &Value) -> std::result::Result<(), String> {
    if !value.is_object() {
        return Err("not a mapping".to_string());
    }
    for field in ["apiVersion", "kind"] {
        if !value.get(field).is_some_and(Value::is_string) {
            return Err(format!("missing {}", field));
        }
    }
    if !value
        .pointer("/metadata/name")
        .is_some_and(Value::is_string)
    {
        return Err("missing metadata.name".to_string());
    }
    Ok(())
}

/// Load and render the template file
pub fn load_manifest(path: &Path, image: &ImageReference) -> Result<Vec<Value>> {
    let template = fs::read_to_string(path)?;
    render_manifest(&template, image, &path.display().to_string())
}

fn validate_repository(repository: &str) -> Result<()> {
    let url = Url::parse(repository)
        .map_err(|e| StackError::InvalidConfig(format!("chart repository '{}': {}", repository, e)))?;
    match url.scheme() {
        "https" | "oci" => Ok(()),
        other => Err(StackError::InvalidConfig(format!(
            "chart repository '{}' uses unsupported scheme {}",
            repository, other
        ))),
    }
}

pub fn cilium(cluster_name: &str) -> HelmChart {
    HelmChart {
        cluster_name: cluster_name.to_string(),
        chart: "cilium".to_string(),
        repository: CILIUM_REPO.to_string(),
        release: "cilium".to_string(),
        namespace: "kube-system".to_string(),
        version: Some("1.15.1".to_string()),
        create_namespace: false,
        values: json!({
            "eni": { "enabled": true },
            "ipam": { "mode": "eni" },
            "egressMasqueradeInterfaces": "eth0",
            "operator": { "replicas": 1 },
            "routingMode": "native",
            "encryption": {
                "type": "wireguard",
                "enabled": true,
                "nodeEncryption": true,
            },
        }),
    }
}

pub fn tetragon(cluster_name: &str) -> HelmChart {
    HelmChart {
        cluster_name: cluster_name.to_string(),
        chart: "tetragon".to_string(),
        repository: CILIUM_REPO.to_string(),
        release: "tetragon".to_string(),
        namespace: "kube-system".to_string(),
        version: Some("1.0.2".to_string()),
        create_namespace: false,
        values: json!({}),
    }
}

pub fn flux(cluster_name: &str) -> HelmChart {
    HelmChart {
        cluster_name: cluster_name.to_string(),
        chart: "helm-controller".to_string(),
        repository: "oci://public.ecr.aws/l0g8r8j6/fluxcd".to_string(),
        release: "flux".to_string(),
        namespace: "flux-system".to_string(),
        version: None,
        create_namespace: true,
        values: json!({}),
    }
}

pub fn kyverno_policies(cluster_name: &str) -> HelmChart {
    HelmChart {
        cluster_name: cluster_name.to_string(),
        chart: "kyverno-policies".to_string(),
        repository: "https://kyverno.github.io/kyverno/".to_string(),
        release: "kyverno-policies".to_string(),
        namespace: "kyverno".to_string(),
        version: Some("3.0.4".to_string()),
        create_namespace: false,
        values: json!({}),
    }
}

/// Charts installed after the manifest; they carry no edges between each other
pub fn charts(config: &Config) -> Vec<(&'static str, HelmChart)> {
    let mut charts = vec![
        ("cilium", cilium(&config.cluster_name)),
        ("tetragon", tetragon(&config.cluster_name)),
    ];
    if config.gitops_addons {
        charts.push(("fluxOciChart", flux(&config.cluster_name)));
        charts.push(("kyvernoPolicies", kyverno_policies(&config.cluster_name)));
    }
    charts
}

#[instrument(skip_all, fields(cluster = %cluster.name(), image = %image))]
pub fn provision(
    config: &Config,
    cluster: &ClusterHandle,
    image: &ImageReference,
    image_asset: &ResourceId,
) -> Result<Stack> {
    // render first: a bad template must stop the stage before anything is declared
    let objects = load_manifest(&config.manifest_template, image)?;
    debug!("Rendered {} objects from the manifest template", objects.len());

    let charts = charts(config);
    for (_, chart) in &charts {
        validate_repository(&chart.repository)?;
    }

    let mut stack = Stack::new(StageDescriptor::workload());

    let manifest = stack.add(
        "deployment",
        ResourceSpec::Manifest(Manifest {
            cluster_name: cluster.name().to_string(),
            objects,
        }),
    )?;
    stack.add_dependency(&manifest, cluster.id())?;
    stack.add_dependency(&manifest, image_asset)?;

    for (logical_id, chart) in charts {
        let id = stack.add(logical_id, ResourceSpec::HelmChart(chart))?;
        stack.add_dependency(&id, &manifest)?;
        stack.add_dependency(&id, cluster.id())?;
    }

    info!(
        "Workload stack declared {} resources",
        stack.resources().len()
    );
    Ok(stack)
}
