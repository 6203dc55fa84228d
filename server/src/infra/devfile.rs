//! Devfile flattening
//!
//! Turns a devfile 2.x document into the flat list of containers and volumes
//! the manifest generator renders. Only container and volume components are
//! supported; parents and plugins are rejected rather than resolved.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Flattens devfile sources into renderable components
#[cfg_attr(test, mockall::automock)]
pub trait DevfileFlattener: Send + Sync {
    fn flatten(&self, devfile: &str) -> Result<FlattenedDevfile>;
}

/// Environment variable of a container component
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Port exposed by a container component
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub name: String,
    pub target_port: u16,
}

/// Mount of a devfile volume component into a container
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerComponent {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
    pub endpoints: Vec<Endpoint>,
    pub memory_limit: Option<String>,
    pub cpu_limit: Option<String>,
    pub memory_request: Option<String>,
    pub cpu_request: Option<String>,
    pub mount_sources: bool,
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeComponent {
    pub name: String,
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenedDevfile {
    pub containers: Vec<ContainerComponent>,
    pub volumes: Vec<VolumeComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDevfile {
    schema_version: Option<String>,
    parent: Option<serde_yaml::Value>,
    #[serde(default)]
    components: Vec<RawComponent>,
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    name: String,
    container: Option<RawContainer>,
    volume: Option<RawVolume>,
    #[serde(flatten)]
    other: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContainer {
    image: String,
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: Vec<EnvVar>,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
    memory_limit: Option<String>,
    cpu_limit: Option<String>,
    memory_request: Option<String>,
    cpu_request: Option<String>,
    #[serde(default = "default_mount_sources")]
    mount_sources: bool,
    #[serde(default)]
    volume_mounts: Vec<VolumeMount>,
}

fn default_mount_sources() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawVolume {
    size: Option<String>,
}

/// Flattener for plain YAML devfiles
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlDevfileFlattener;

impl DevfileFlattener for YamlDevfileFlattener {
    fn flatten(&self, devfile: &str) -> Result<FlattenedDevfile> {
        let raw: RawDevfile = serde_yaml::from_str(devfile)
            .map_err(|e| Error::InvalidDevfile(format!("not a valid devfile document: {}", e)))?;

        match raw.schema_version.as_deref() {
            Some(version) if version.starts_with("2.") => {}
            Some(version) => {
                return Err(Error::InvalidDevfile(format!(
                    "unsupported schemaVersion {}",
                    version
                )))
            }
            None => return Err(Error::InvalidDevfile("schemaVersion is missing".to_string())),
        }

        if raw.parent.is_some() {
            return Err(Error::InvalidDevfile("parent devfiles are not supported".to_string()));
        }

        let mut names = HashSet::new();
        let mut flattened = FlattenedDevfile::default();

        for component in raw.components {
            if !names.insert(component.name.clone()) {
                return Err(Error::InvalidDevfile(format!(
                    "duplicate component name {}",
                    component.name
                )));
            }

            match (component.container, component.volume) {
                (Some(container), None) => {
                    flattened.containers.push(ContainerComponent {
                        name: component.name,
                        image: container.image,
                        command: container.command,
                        args: container.args,
                        env: container.env,
                        endpoints: container.endpoints,
                        memory_limit: container.memory_limit,
                        cpu_limit: container.cpu_limit,
                        memory_request: container.memory_request,
                        cpu_request: container.cpu_request,
                        mount_sources: container.mount_sources,
                        volume_mounts: container.volume_mounts,
                    });
                }
                (None, Some(volume)) => {
                    flattened.volumes.push(VolumeComponent {
                        name: component.name,
                        size: volume.size,
                    });
                }
                _ => {
                    let kind = component
                        .other
                        .keys()
                        .filter_map(|key| key.as_str())
                        .next()
                        .unwrap_or("unknown")
                        .to_string();
                    return Err(Error::InvalidDevfile(format!(
                        "component {} has unsupported type {}",
                        component.name, kind
                    )));
                }
            }
        }

        if flattened.containers.is_empty() {
            return Err(Error::InvalidDevfile(
                "at least one container component is required".to_string(),
            ));
        }

        let volume_names: HashSet<&str> =
            flattened.volumes.iter().map(|v| v.name.as_str()).collect();
        for container in &flattened.containers {
            if let Some(mount) = container
                .volume_mounts
                .iter()
                .find(|mount| !volume_names.contains(mount.name.as_str()))
            {
                return Err(Error::InvalidDevfile(format!(
                    "container {} mounts undefined volume {}",
                    container.name, mount.name
                )));
            }
        }

        Ok(flattened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVFILE: &str = r#"
schemaVersion: 2.2.0
components:
  - name: tooling
    container:
      image: registry.example.dev/tooling:1.0
      args: ["sleep", "infinity"]
      memoryLimit: 2Gi
      env:
        - name: EDITOR
          value: vim
      endpoints:
        - name: http
          targetPort: 8000
      volumeMounts:
        - name: cache
          path: /cache
  - name: database
    container:
      image: postgres:16
      mountSources: false
  - name: cache
    volume:
      size: 1Gi
"#;

    #[test]
    fn test_flatten_containers_and_volumes() {
        let flattened = YamlDevfileFlattener.flatten(DEVFILE).expect("Failed to flatten");

        assert_eq!(flattened.containers.len(), 2);
        let tooling = &flattened.containers[0];
        assert_eq!(tooling.name, "tooling");
        assert_eq!(tooling.memory_limit.as_deref(), Some("2Gi"));
        assert_eq!(tooling.endpoints[0].target_port, 8000);
        assert!(tooling.mount_sources);
        assert!(!flattened.containers[1].mount_sources);
        assert_eq!(flattened.volumes[0].size.as_deref(), Some("1Gi"));
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        let result = YamlDevfileFlattener.flatten("schemaVersion: [unterminated");
        assert!(matches!(result, Err(Error::InvalidDevfile(_))));
    }

    #[test]
    fn test_rejects_missing_or_old_schema_version() {
        let missing = "components:\n  - name: a\n    container:\n      image: busybox\n";
        assert!(YamlDevfileFlattener.flatten(missing).is_err());

        let old = "schemaVersion: 1.0.0\ncomponents: []\n";
        assert!(YamlDevfileFlattener.flatten(old).is_err());
    }

    #[test]
    fn test_rejects_parent_and_unsupported_components() {
        let parent = "schemaVersion: 2.2.0\nparent:\n  id: nodejs\n";
        assert!(YamlDevfileFlattener.flatten(parent).is_err());

        let kubernetes = r#"
schemaVersion: 2.2.0
components:
  - name: tooling
    container:
      image: busybox
  - name: extra
    kubernetes:
      uri: deploy.yaml
"#;
        let err = YamlDevfileFlattener.flatten(kubernetes).unwrap_err();
        assert!(err.to_string().contains("kubernetes"));
    }

    #[test]
    fn test_rejects_duplicates_and_dangling_mounts() {
        let duplicate = r#"
schemaVersion: 2.2.0
components:
  - name: tooling
    container:
      image: busybox
  - name: tooling
    container:
      image: alpine
"#;
        assert!(YamlDevfileFlattener.flatten(duplicate).is_err());

        let dangling = r#"
schemaVersion: 2.2.0
components:
  - name: tooling
    container:
      image: busybox
      volumeMounts:
        - name: missing
          path: /data
"#;
        assert!(YamlDevfileFlattener.flatten(dangling).is_err());
    }

    #[test]
    fn test_requires_a_container() {
        let volumes_only = "schemaVersion: 2.2.0\ncomponents:\n  - name: cache\n    volume: {}\n";
        assert!(YamlDevfileFlattener.flatten(volumes_only).is_err());
    }
}
