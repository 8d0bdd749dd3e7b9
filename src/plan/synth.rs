// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Writes a plan to disk as an assembly directory: one template per stack plus a manifest.

use crate::error::Result;
use crate::plan::{Plan, Stack};
use crate::types::{ArtifactKind, StageKind};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssemblyManifest<'a> {
    version: &'static str,
    stacks: Vec<StackEntry<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StackEntry<'a> {
    name: &'static str,
    description: &'a str,
    template_file: String,
    dependencies: Vec<&'static str>,
    produces: ArtifactKind,
}

fn template_file(stack: &Stack) -> String {
    format!("{}.template.yaml", stack.name())
}

/// Render one stack as YAML, resources listed in deployment order
pub fn render_stack(plan: &Plan, kind: StageKind) -> Result<String> {
    let Some(stack) = plan.stack(kind) else {
        return Ok(String::new());
    };

    let mut resources = Mapping::new();
    for resource in plan
        .deployment_order()
        .into_iter()
        .filter(|r| r.id.stack == stack.name())
    {
        resources.insert(
            Value::String(resource.id.logical_id.clone()),
            serde_yaml::to_value(resource)?,
        );
    }

    let mut template = Mapping::new();
    template.insert(
        Value::String("Description".to_string()),
        Value::String(stack.descriptor().description.clone()),
    );
    template.insert(
        Value::String("Tags".to_string()),
        serde_yaml::to_value(stack.tags())?,
    );
    template.insert(Value::String("Resources".to_string()), Value::Mapping(resources));

    Ok(serde_yaml::to_string(&Value::Mapping(template))?)
}

/// Write every stack template and the assembly manifest into `out_dir`
#[instrument(skip(plan))]
pub fn write_assembly(plan: &Plan, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    for stack in plan.stacks() {
        let path = out_dir.join(template_file(stack));
        fs::write(&path, render_stack(plan, stack.kind())?)?;
        info!("Wrote {} ({} resources)", path.display(), stack.resources().len());
        written.push(path);
    }

    let manifest = AssemblyManifest {
        version: env!("CARGO_PKG_VERSION"),
        stacks: plan
            .stacks()
            .iter()
            .map(|s| StackEntry {
                name: s.name(),
                description: &s.descriptor().description,
                template_file: template_file(s),
                dependencies: s.descriptor().requires.iter().map(|k| k.stack_name()).collect(),
                produces: s.descriptor().produces,
            })
            .collect(),
    };
    let path = out_dir.join(MANIFEST_FILE);
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
    written.push(path);

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::build_plan;
    use crate::test_utils::make_workspace;

    #[test]
    fn test_write_assembly_files() {
        let (dir, config) = make_workspace();
        let plan = build_plan(&config).unwrap();
        let out = dir.path().join("cdk.out");

        let written = write_assembly(&plan, &out).unwrap();
        assert_eq!(written.len(), 5);
        for name in [
            "VpcStack.template.yaml",
            "EksStack.template.yaml",
            "EcrStack.template.yaml",
            "WorkloadDeployStack.template.yaml",
            MANIFEST_FILE,
        ] {
            assert!(out.join(name).is_file(), "{} missing", name);
        }
    }

    #[test]
    fn test_manifest_lists_stack_dependencies() {
        let (dir, config) = make_workspace();
        let plan = build_plan(&config).unwrap();
        let out = dir.path().join("cdk.out");
        write_assembly(&plan, &out).unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(MANIFEST_FILE)).unwrap()).unwrap();
        let stacks = manifest["stacks"].as_array().unwrap();
        assert_eq!(stacks.len(), 4);
        assert_eq!(stacks[0]["dependencies"], serde_json::json!([]));
        assert_eq!(stacks[1]["dependencies"], serde_json::json!(["VpcStack"]));
        assert_eq!(stacks[3]["dependencies"], serde_json::json!(["EcrStack"]));
        assert_eq!(stacks[3]["description"], "Deploy Streamlit App");
    }

    #[test]
    fn test_rendered_stack_keeps_deployment_order() {
        let (_dir, config) = make_workspace();
        let plan = build_plan(&config).unwrap();

        let rendered = render_stack(&plan, StageKind::Cluster).unwrap();
        let template: Value = serde_yaml::from_str(&rendered).unwrap();

        assert_eq!(
            template["Description"],
            Value::String("Provision EKS cluster resources for GenAI Bedrock App".to_string())
        );
        let Value::Mapping(resources) = &template["Resources"] else {
            panic!("Resources is not a mapping");
        };
        let ids: Vec<_> = resources.keys().filter_map(Value::as_str).collect();
        let pos = |id: &str| ids.iter().position(|i| *i == id).unwrap();
        assert!(pos("EksCluster") < pos("AuthModeEnabler"));
        assert!(pos("InstanceRole") < pos("custom-node-group"));
        assert_eq!(
            template["Resources"]["AuthModeEnabler"]["Type"],
            Value::String("Custom::AuthModeUpdate".to_string())
        );
        assert_eq!(
            template["Tags"]["owner"],
            Value::String("validation".to_string())
        );
    }
}
