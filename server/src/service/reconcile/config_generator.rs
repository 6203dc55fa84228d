//! Manifest generation for the agent
//!
//! Renders the Kubernetes resources of one workspace as a multi-document YAML
//! string. Output depends only on its inputs, so repeated passes over an
//! unchanged workspace produce byte-identical manifests.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::domain::agent_config::WorkspacesAgentConfig;
use crate::domain::workspace::{DesiredState, Workspace};
use crate::error::Result;
use crate::infra::devfile::{ContainerComponent, DevfileFlattener, FlattenedDevfile};

use super::transition::ConfigRequest;

const LABEL_AGENT_ID: &str = "agent.workspaces.remote.dev/id";
const LABEL_WORKSPACE_NAME: &str = "workspaces.remote.dev/name";
const LABEL_INVENTORY_ID: &str = "cli-utils.sigs.k8s.io/inventory-id";
const ANNOTATION_HOST_TEMPLATE: &str = "workspaces.remote.dev/host-template";
const ANNOTATION_WORKSPACE_ID: &str = "workspaces.remote.dev/id";
const ANNOTATION_CONFIG_VERSION: &str = "workspaces.remote.dev/agent-config-version";
const ANNOTATION_OWNING_INVENTORY: &str = "config.k8s.io/owning-inventory";

/// Namespace of the proxy that routes traffic into workspaces
const PROXY_NAMESPACE: &str = "remote-workspaces-proxy";
const WORKSPACE_DATA_VOLUME: &str = "workspace-data";
const WORKSPACE_DATA_SIZE: &str = "50Gi";
const PROJECTS_ROOT: &str = "/projects";
const WORKSPACE_USER_ID: i64 = 5001;

/// Everything one manifest is rendered from
#[derive(Debug, Clone, Copy)]
pub struct ManifestInput<'a> {
    pub workspace: &'a Workspace,
    /// Desired state resolved for this pass
    pub desired_state: DesiredState,
    /// Pinned agent config snapshot
    pub config: &'a WorkspacesAgentConfig,
    pub request: ConfigRequest,
}

/// Builds the manifest the agent applies for a workspace
pub struct ConfigGenerator {
    flattener: Arc<dyn DevfileFlattener>,
}

impl ConfigGenerator {
    pub fn new(flattener: Arc<dyn DevfileFlattener>) -> Self {
        Self { flattener }
    }

    pub fn generate(&self, input: &ManifestInput<'_>) -> Result<String> {
        let names = ResourceNames::new(input.workspace);
        let mut documents = vec![inventory_config_map(input, &names.workspace_inventory)];

        if input.desired_state != DesiredState::Terminated {
            let devfile = self.flattener.flatten(&input.workspace.devfile)?;

            documents.push(deployment(input, &names, &devfile));
            if let Some(service) = service(input, &names, &devfile) {
                documents.push(service);
            }
            documents.push(persistent_volume_claim(input, &names));
            if input.config.network_policy_enabled {
                documents.push(network_policy(input, &names));
            }
        }

        if input.request.include_all_resources {
            documents.push(inventory_config_map(input, &names.secrets_inventory));
            if input.desired_state != DesiredState::Terminated {
                if !input.config.max_resources_per_workspace.is_empty() {
                    documents.push(resource_quota(input, &names));
                }
                documents.push(env_secret(input, &names));
            }
        }

        let mut manifest = String::new();
        for document in &documents {
            manifest.push_str("---\n");
            manifest.push_str(&serde_yaml::to_string(document)?);
        }

        Ok(manifest)
    }
}

struct ResourceNames {
    workspace_inventory: String,
    secrets_inventory: String,
    data_claim: String,
    env_secret: String,
}

impl ResourceNames {
    fn new(workspace: &Workspace) -> Self {
        Self {
            workspace_inventory: format!("{}-workspace-inventory", workspace.name),
            secrets_inventory: format!("{}-secrets-inventory", workspace.name),
            data_claim: format!("{}-{}", workspace.name, WORKSPACE_DATA_VOLUME),
            env_secret: format!("{}-env-var", workspace.name),
        }
    }
}

/// Host template the proxy expands per exposed port
fn host_template(workspace: &Workspace, config: &WorkspacesAgentConfig) -> String {
    format!("{{{{.port}}}}-{}.{}", workspace.name, config.dns_zone)
}

fn labels(input: &ManifestInput<'_>) -> Value {
    json!({
        LABEL_AGENT_ID: input.workspace.agent_id,
        LABEL_WORKSPACE_NAME: input.workspace.name,
    })
}

fn annotations(input: &ManifestInput<'_>, owning_inventory: &str) -> Value {
    json!({
        ANNOTATION_OWNING_INVENTORY: owning_inventory,
        ANNOTATION_HOST_TEMPLATE: host_template(input.workspace, input.config),
        ANNOTATION_WORKSPACE_ID: input.workspace.id,
        ANNOTATION_CONFIG_VERSION: input.config.version.to_string(),
    })
}

fn metadata(input: &ManifestInput<'_>, name: &str, owning_inventory: &str) -> Value {
    json!({
        "name": name,
        "namespace": input.workspace.namespace,
        "labels": labels(input),
        "annotations": annotations(input, owning_inventory),
    })
}

fn inventory_config_map(input: &ManifestInput<'_>, name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": name,
            "namespace": input.workspace.namespace,
            "labels": {
                LABEL_AGENT_ID: input.workspace.agent_id,
                LABEL_INVENTORY_ID: name,
            },
        },
    })
}

fn deployment(input: &ManifestInput<'_>, names: &ResourceNames, devfile: &FlattenedDevfile) -> Value {
    let name = &input.workspace.name;
    let config = input.config;

    let mut volumes = vec![json!({
        "name": WORKSPACE_DATA_VOLUME,
        "persistentVolumeClaim": { "claimName": names.data_claim },
    })];
    for volume in &devfile.volumes {
        let mut empty_dir = Map::new();
        if let Some(size) = &volume.size {
            empty_dir.insert("sizeLimit".to_string(), json!(size));
        }
        volumes.push(json!({ "name": volume.name, "emptyDir": empty_dir }));
    }

    let mut pod_spec = Map::new();
    pod_spec.insert(
        "containers".to_string(),
        devfile
            .containers
            .iter()
            .map(|component| container(component, config, names))
            .collect(),
    );
    pod_spec.insert("volumes".to_string(), Value::Array(volumes));
    pod_spec.insert(
        "securityContext".to_string(),
        json!({
            "runAsNonRoot": true,
            "runAsUser": WORKSPACE_USER_ID,
            "fsGroup": 0,
            "fsGroupChangePolicy": "OnRootMismatch",
        }),
    );
    if !config.image_pull_secrets.is_empty() {
        pod_spec.insert(
            "imagePullSecrets".to_string(),
            config
                .image_pull_secrets
                .iter()
                .map(|secret| json!({ "name": secret.name }))
                .collect(),
        );
    }

    let replicas = if input.request.started { 1 } else { 0 };

    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": metadata(input, name, &names.workspace_inventory),
        "spec": {
            "replicas": replicas,
            "selector": { "matchLabels": labels(input) },
            "strategy": { "type": "Recreate" },
            "template": {
                "metadata": metadata(input, name, &names.workspace_inventory),
                "spec": pod_spec,
            },
        },
    })
}

/// Container resources: agent defaults, overridden by the component's own values
fn container_resources(component: &ContainerComponent, config: &WorkspacesAgentConfig) -> Value {
    let defaults = &config.default_resources_per_workspace_container;
    let mut limits: BTreeMap<String, String> = defaults.limits.clone();
    let mut requests: BTreeMap<String, String> = defaults.requests.clone();

    if let Some(memory) = &component.memory_limit {
        limits.insert("memory".to_string(), memory.clone());
    }
    if let Some(cpu) = &component.cpu_limit {
        limits.insert("cpu".to_string(), cpu.clone());
    }
    if let Some(memory) = &component.memory_request {
        requests.insert("memory".to_string(), memory.clone());
    }
    if let Some(cpu) = &component.cpu_request {
        requests.insert("cpu".to_string(), cpu.clone());
    }

    let mut resources = Map::new();
    if !limits.is_empty() {
        resources.insert("limits".to_string(), json!(limits));
    }
    if !requests.is_empty() {
        resources.insert("requests".to_string(), json!(requests));
    }
    Value::Object(resources)
}

fn container(
    component: &ContainerComponent,
    config: &WorkspacesAgentConfig,
    names: &ResourceNames,
) -> Value {
    let mut spec = Map::new();
    spec.insert("name".to_string(), json!(component.name));
    spec.insert("image".to_string(), json!(component.image));
    spec.insert("imagePullPolicy".to_string(), json!("IfNotPresent"));
    if !component.command.is_empty() {
        spec.insert("command".to_string(), json!(component.command));
    }
    if !component.args.is_empty() {
        spec.insert("args".to_string(), json!(component.args));
    }

    let mut env: Vec<Value> = component
        .env
        .iter()
        .map(|var| json!({ "name": var.name, "value": var.value }))
        .collect();
    if component.mount_sources {
        env.push(json!({ "name": "PROJECTS_ROOT", "value": PROJECTS_ROOT }));
    }
    if !env.is_empty() {
        spec.insert("env".to_string(), Value::Array(env));
    }
    spec.insert(
        "envFrom".to_string(),
        json!([{ "secretRef": { "name": names.env_secret, "optional": true } }]),
    );

    if !component.endpoints.is_empty() {
        spec.insert(
            "ports".to_string(),
            component
                .endpoints
                .iter()
                .map(|endpoint| {
                    json!({
                        "name": endpoint.name,
                        "containerPort": endpoint.target_port,
                        "protocol": "TCP",
                    })
                })
                .collect(),
        );
    }

    spec.insert("resources".to_string(), container_resources(component, config));

    let mut mounts = Vec::new();
    if component.mount_sources {
        mounts.push(json!({ "name": WORKSPACE_DATA_VOLUME, "mountPath": PROJECTS_ROOT }));
    }
    for mount in &component.volume_mounts {
        mounts.push(json!({ "name": mount.name, "mountPath": mount.path }));
    }
    if !mounts.is_empty() {
        spec.insert("volumeMounts".to_string(), Value::Array(mounts));
    }

    spec.insert(
        "securityContext".to_string(),
        json!({
            "allowPrivilegeEscalation": false,
            "privileged": false,
            "runAsNonRoot": true,
            "runAsUser": WORKSPACE_USER_ID,
        }),
    );

    Value::Object(spec)
}

fn service(
    input: &ManifestInput<'_>,
    names: &ResourceNames,
    devfile: &FlattenedDevfile,
) -> Option<Value> {
    let ports: Vec<Value> = devfile
        .containers
        .iter()
        .flat_map(|component| component.endpoints.iter())
        .map(|endpoint| {
            json!({
                "name": endpoint.name,
                "port": endpoint.target_port,
                "targetPort": endpoint.target_port,
            })
        })
        .collect();

    if ports.is_empty() {
        return None;
    }

    Some(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": metadata(input, &input.workspace.name, &names.workspace_inventory),
        "spec": {
            "type": "ClusterIP",
            "ports": ports,
            "selector": labels(input),
        },
    }))
}

fn persistent_volume_claim(input: &ManifestInput<'_>, names: &ResourceNames) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": metadata(input, &names.data_claim, &names.workspace_inventory),
        "spec": {
            "accessModes": ["ReadWriteOnce"],
            "resources": { "requests": { "storage": WORKSPACE_DATA_SIZE } },
        },
    })
}

fn network_policy(input: &ManifestInput<'_>, names: &ResourceNames) -> Value {
    let mut egress = vec![json!({
        "ports": [
            { "port": 53, "protocol": "TCP" },
            { "port": 53, "protocol": "UDP" },
        ],
        "to": [{
            "namespaceSelector": {
                "matchLabels": { "kubernetes.io/metadata.name": "kube-system" },
            },
        }],
    })];
    for rule in &input.config.network_policy_egress {
        let mut ip_block = Map::new();
        ip_block.insert("cidr".to_string(), json!(rule.allow));
        if !rule.except.is_empty() {
            ip_block.insert("except".to_string(), json!(rule.except));
        }
        egress.push(json!({ "to": [{ "ipBlock": ip_block }] }));
    }

    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "NetworkPolicy",
        "metadata": metadata(input, &input.workspace.name, &names.workspace_inventory),
        "spec": {
            "podSelector": {},
            "policyTypes": ["Ingress", "Egress"],
            "ingress": [{
                "from": [{
                    "namespaceSelector": {
                        "matchLabels": { "kubernetes.io/metadata.name": PROXY_NAMESPACE },
                    },
                }],
            }],
            "egress": egress,
        },
    })
}

fn resource_quota(input: &ManifestInput<'_>, names: &ResourceNames) -> Value {
    let max = &input.config.max_resources_per_workspace;
    let hard: BTreeMap<String, &String> = max
        .limits
        .iter()
        .map(|(key, value)| (format!("limits.{}", key), value))
        .chain(
            max.requests
                .iter()
                .map(|(key, value)| (format!("requests.{}", key), value)),
        )
        .collect();

    json!({
        "apiVersion": "v1",
        "kind": "ResourceQuota",
        "metadata": metadata(input, &input.workspace.name, &names.secrets_inventory),
        "spec": { "hard": hard },
    })
}

fn env_secret(input: &ManifestInput<'_>, names: &ResourceNames) -> Value {
    let domain_template = format!(
        "${{PORT}}-{}.{}",
        input.workspace.name, input.config.dns_zone
    );

    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": metadata(input, &names.env_secret, &names.secrets_inventory),
        "stringData": {
            "WORKSPACE_NAME": input.workspace.name,
            "WORKSPACE_NAMESPACE": input.workspace.namespace,
            "WORKSPACE_DOMAIN_TEMPLATE": domain_template,
        },
    })
}

/// Parse a generated manifest back into its documents
#[cfg(test)]
pub fn parse_documents(manifest: &str) -> Vec<Value> {
    use serde::Deserialize;

    serde_yaml::Deserializer::from_str(manifest)
        .map(|document| Value::deserialize(document).expect("Invalid manifest document"))
        .collect()
}

#[cfg(test)]
pub fn find_kind<'a>(documents: &'a [Value], kind: &str) -> Option<&'a Value> {
    documents.iter().find(|document| document["kind"] == kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent_config::{AgentConfigParams, ImagePullSecret};
    use crate::domain::workspace::ActualState;
    use crate::error::Error;
    use crate::infra::devfile::{MockDevfileFlattener, YamlDevfileFlattener};
    use chrono::Utc;

    const DEVFILE: &str = r#"
schemaVersion: 2.2.0
components:
  - name: tooling
    container:
      image: registry.example.dev/tooling:1.0
      memoryLimit: 4Gi
      endpoints:
        - name: editor
          targetPort: 60001
"#;

    fn workspace() -> Workspace {
        let now = Utc::now();
        Workspace {
            id: "ws-1".to_string(),
            agent_id: "agent-1".to_string(),
            user_id: "user-1".to_string(),
            name: "workspace-agent-1-user-1-abc123".to_string(),
            namespace: "rd-ns-agent-1-user-1-abc123".to_string(),
            desired_state: DesiredState::Running,
            actual_state: ActualState::CreationRequested,
            desired_state_updated_at: now,
            responded_to_agent_at: None,
            deployment_resource_version: None,
            devfile: DEVFILE.to_string(),
            desired_config_generator_version: Some(1),
            lock_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn agent_config(dns_zone: &str) -> WorkspacesAgentConfig {
        let params = AgentConfigParams::new(dns_zone);
        let mut config = WorkspacesAgentConfig {
            agent_id: "agent-1".to_string(),
            version: 1,
            dns_zone: params.dns_zone,
            network_policy_enabled: params.network_policy_enabled,
            network_policy_egress: params.network_policy_egress,
            default_resources_per_workspace_container: params
                .default_resources_per_workspace_container,
            max_resources_per_workspace: params.max_resources_per_workspace,
            image_pull_secrets: vec![ImagePullSecret {
                name: "registry-creds".to_string(),
                namespace: "default".to_string(),
            }],
            max_active_hours_before_stop: params.max_active_hours_before_stop,
            max_stopped_hours_before_termination: params.max_stopped_hours_before_termination,
            created_at: Utc::now(),
        };
        config
            .default_resources_per_workspace_container
            .limits
            .insert("memory".to_string(), "1Gi".to_string());
        config
            .default_resources_per_workspace_container
            .requests
            .insert("cpu".to_string(), "250m".to_string());
        config
            .max_resources_per_workspace
            .limits
            .insert("cpu".to_string(), "4".to_string());
        config
    }

    fn generate(
        workspace: &Workspace,
        config: &WorkspacesAgentConfig,
        desired_state: DesiredState,
        request: ConfigRequest,
    ) -> Result<String> {
        ConfigGenerator::new(Arc::new(YamlDevfileFlattener)).generate(&ManifestInput {
            workspace,
            desired_state,
            config,
            request,
        })
    }

    const FIRST_START: ConfigRequest = ConfigRequest {
        started: true,
        include_all_resources: true,
    };

    #[test]
    fn test_first_provisioning_includes_all_resources() {
        let manifest = generate(
            &workspace(),
            &agent_config("ws.example.dev"),
            DesiredState::Running,
            FIRST_START,
        )
        .unwrap();
        let documents = parse_documents(&manifest);

        let kinds: Vec<&str> = documents
            .iter()
            .map(|document| document["kind"].as_str().unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "ConfigMap",
                "Deployment",
                "Service",
                "PersistentVolumeClaim",
                "NetworkPolicy",
                "ConfigMap",
                "ResourceQuota",
                "Secret",
            ]
        );

        let quota = find_kind(&documents, "ResourceQuota").unwrap();
        assert_eq!(quota["spec"]["hard"]["limits.cpu"], "4");
    }

    #[test]
    fn test_deployment_carries_started_flag_and_pinned_dns_zone() {
        let ws = workspace();
        let manifest = generate(
            &ws,
            &agent_config("ws.example.dev"),
            DesiredState::Running,
            FIRST_START,
        )
        .unwrap();
        let documents = parse_documents(&manifest);
        let deployment = find_kind(&documents, "Deployment").unwrap();

        assert_eq!(deployment["spec"]["replicas"], 1);
        assert_eq!(
            deployment["metadata"]["annotations"][ANNOTATION_HOST_TEMPLATE],
            format!("{{{{.port}}}}-{}.ws.example.dev", ws.name)
        );
        assert_eq!(deployment["metadata"]["annotations"][ANNOTATION_CONFIG_VERSION], "1");

        let pod = &deployment["spec"]["template"]["spec"];
        assert_eq!(pod["imagePullSecrets"][0]["name"], "registry-creds");
        let container = &pod["containers"][0];
        assert_eq!(container["ports"][0]["containerPort"], 60001);
        // Component limit wins over the agent default, default request kept.
        assert_eq!(container["resources"]["limits"]["memory"], "4Gi");
        assert_eq!(container["resources"]["requests"]["cpu"], "250m");
        assert_eq!(container["volumeMounts"][0]["mountPath"], PROJECTS_ROOT);
    }

    #[test]
    fn test_stopped_workspace_scales_to_zero_without_secrets() {
        let manifest = generate(
            &workspace(),
            &agent_config("ws.example.dev"),
            DesiredState::Stopped,
            ConfigRequest {
                started: false,
                include_all_resources: false,
            },
        )
        .unwrap();
        let documents = parse_documents(&manifest);

        let deployment = find_kind(&documents, "Deployment").unwrap();
        assert_eq!(deployment["spec"]["replicas"], 0);
        assert!(find_kind(&documents, "Secret").is_none());
        assert!(find_kind(&documents, "ResourceQuota").is_none());
    }

    #[test]
    fn test_terminated_workspace_only_keeps_inventory() {
        let mut ws = workspace();
        ws.devfile = "not: [a devfile".to_string();

        let manifest = generate(
            &ws,
            &agent_config("ws.example.dev"),
            DesiredState::Terminated,
            ConfigRequest {
                started: false,
                include_all_resources: false,
            },
        )
        .expect("Terminated workspaces do not need a devfile");
        let documents = parse_documents(&manifest);

        assert_eq!(documents.len(), 1);
        assert_eq!(
            documents[0]["metadata"]["name"],
            format!("{}-workspace-inventory", ws.name)
        );
    }

    #[test]
    fn test_network_policy_can_be_disabled() {
        let mut config = agent_config("ws.example.dev");
        config.network_policy_enabled = false;

        let manifest = generate(&workspace(), &config, DesiredState::Running, FIRST_START).unwrap();
        assert!(find_kind(&parse_documents(&manifest), "NetworkPolicy").is_none());
    }

    #[test]
    fn test_output_is_deterministic() {
        let ws = workspace();
        let config = agent_config("ws.example.dev");

        let first = generate(&ws, &config, DesiredState::Running, FIRST_START).unwrap();
        let second = generate(&ws, &config, DesiredState::Running, FIRST_START).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_flattener_failure_propagates() {
        let mut flattener = MockDevfileFlattener::new();
        flattener
            .expect_flatten()
            .returning(|_| Err(Error::InvalidDevfile("broken".to_string())));

        let ws = workspace();
        let config = agent_config("ws.example.dev");
        let result = ConfigGenerator::new(Arc::new(flattener)).generate(&ManifestInput {
            workspace: &ws,
            desired_state: DesiredState::Running,
            config: &config,
            request: FIRST_START,
        });

        assert!(matches!(result, Err(Error::InvalidDevfile(_))));
    }
}
