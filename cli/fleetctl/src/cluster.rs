//! [`Orchestrator`] over `kubectl`.
//!
//! Each bot is a StatefulSet named after its identity. The release
//! checksum travels as a pod-template annotation, so the live revision,
//! every instance and a rolled-back revision all report the checksum they
//! were rendered from.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use fleet_reconcile::{InstanceState, Orchestrator, Release, SpecHash, WorkloadState};
use fleet_render::manifests::{CONFIG_COMPONENT, LABEL_COMPONENT, RELEASE_CHECKSUM_ANNOTATION};
use fleet_render::workload::LABEL_INSTANCE;

use crate::kubectl::Kubectl;

pub struct KubectlOrchestrator {
    kubectl: Kubectl,
}

impl KubectlOrchestrator {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }

    pub fn kubectl(&self) -> &Kubectl {
        &self.kubectl
    }
}

fn stateful_set(identity: &str) -> String {
    format!("statefulset/{identity}")
}

fn instance_selector(identity: &str) -> String {
    format!("{LABEL_INSTANCE}={identity}")
}

impl KubectlOrchestrator {
    async fn stateful_set_json(&self, identity: &str) -> Result<String> {
        self.kubectl
            .output([
                "get",
                "statefulset",
                identity,
                "--ignore-not-found",
                "-o",
                "json",
            ])
            .await
    }

    /// `kubectl delete <kind> <names...>` without waiting for termination.
    async fn delete(&self, kind: &str, names: Vec<String>) -> Result<()> {
        let mut args = vec![
            "delete".to_string(),
            kind.to_string(),
            "--ignore-not-found".to_string(),
            "--wait=false".to_string(),
        ];
        args.extend(names);
        self.kubectl.output(args).await?;
        Ok(())
    }
}

#[async_trait]
impl Orchestrator for KubectlOrchestrator {
    async fn workload(&self, identity: &str) -> Result<Option<WorkloadState>> {
        let text = self.stateful_set_json(identity).await?;
        parse_workload(identity, &text)
    }

    async fn instances(&self, identity: &str) -> Result<Vec<InstanceState>> {
        let selector = instance_selector(identity);
        let text = self
            .kubectl
            .output(["get", "pods", "-l", selector.as_str(), "-o", "json"])
            .await?;
        parse_instances(&text)
    }

    async fn apply(&self, release: &Release) -> Result<()> {
        let out = self.kubectl.apply(&release.manifest).await?;
        info!(identity = %release.identity, applied = %out.trim(), "release applied");
        Ok(())
    }

    async fn set_replicas(&self, identity: &str, replicas: u32) -> Result<()> {
        let replicas = format!("--replicas={replicas}");
        self.kubectl
            .output(["scale", stateful_set(identity).as_str(), replicas.as_str()])
            .await?;
        Ok(())
    }

    /// `rollout undo`, then delete pods still on the abandoned revision.
    ///
    /// With ordered pod management a pod stuck unready on a broken revision
    /// is never replaced by the rolling update on its own.
    async fn rollback(&self, identity: &str) -> Result<()> {
        self.kubectl
            .output(["rollout", "undo", stateful_set(identity).as_str()])
            .await?;

        let restored = self.workload(identity).await?.and_then(|s| s.checksum);
        let stale = stale_instances(self.instances(identity).await?, restored.as_ref());
        if stale.is_empty() {
            return Ok(());
        }

        info!(identity, ?stale, "replacing instances left on the abandoned revision");
        self.delete("pod", stale).await
    }

    async fn prune(&self, identity: &str) -> Result<()> {
        let set = self.stateful_set_json(identity).await?;
        let revisions_selector = instance_selector(identity);
        let revisions = self
            .kubectl
            .output([
                "get",
                "controllerrevisions",
                "-l",
                revisions_selector.as_str(),
                "-o",
                "json",
            ])
            .await?;
        let config_selector = format!(
            "{},{LABEL_COMPONENT}={CONFIG_COMPONENT}",
            instance_selector(identity)
        );
        let config_maps = self
            .kubectl
            .output(["get", "configmaps", "-l", config_selector.as_str(), "-o", "json"])
            .await?;

        let superseded = superseded_config_maps(&set, &revisions, &config_maps)?;
        if superseded.is_empty() {
            return Ok(());
        }

        info!(identity, ?superseded, "pruning superseded config maps");
        self.delete("configmap", superseded).await
    }

    async fn restart(&self, identity: &str) -> Result<()> {
        self.kubectl
            .output(["rollout", "restart", stateful_set(identity).as_str()])
            .await?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    generation: i64,
    annotations: BTreeMap<String, String>,
    deletion_timestamp: Option<String>,
}

impl ObjectMeta {
    fn release_checksum(&self) -> Option<SpecHash> {
        self.annotations
            .get(RELEASE_CHECKSUM_ANNOTATION)
            .and_then(|v| SpecHash::parse(v))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatefulSetJson {
    metadata: ObjectMeta,
    spec: StatefulSetSpecJson,
    status: StatefulSetStatusJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatefulSetSpecJson {
    replicas: Option<u32>,
    template: PodTemplateJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodTemplateJson {
    metadata: ObjectMeta,
    spec: PodSpecJson,
}

impl PodTemplateJson {
    fn config_maps(&self) -> impl Iterator<Item = &str> {
        self.spec
            .volumes
            .iter()
            .filter_map(|v| v.config_map.as_ref())
            .map(|c| c.name.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodSpecJson {
    volumes: Vec<VolumeJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VolumeJson {
    config_map: Option<ConfigMapRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigMapRef {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatefulSetStatusJson {
    observed_generation: i64,
    ready_replicas: u32,
    updated_replicas: u32,
}

/// Parse `kubectl get statefulset -o json`; empty output means absent.
pub fn parse_workload(identity: &str, text: &str) -> Result<Option<WorkloadState>> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let set: StatefulSetJson =
        serde_json::from_str(text).with_context(|| format!("Malformed StatefulSet {identity}"))?;

    // Until the controller has seen the latest spec, nothing counts as updated.
    let updated = if set.status.observed_generation < set.metadata.generation {
        0
    } else {
        set.status.updated_replicas
    };

    Ok(Some(WorkloadState {
        identity: identity.to_string(),
        desired: set.spec.replicas.unwrap_or(1),
        ready: set.status.ready_replicas,
        updated,
        checksum: set.spec.template.metadata.release_checksum(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodListJson {
    items: Vec<PodJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodJson {
    metadata: ObjectMeta,
    status: PodStatusJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PodStatusJson {
    conditions: Vec<PodCondition>,
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ContainerStatus {
    restart_count: u32,
}

/// Parse `kubectl get pods -o json`. Terminating pods are left out.
pub fn parse_instances(text: &str) -> Result<Vec<InstanceState>> {
    let list: PodListJson = serde_json::from_str(text).context("Malformed pod list")?;

    let mut instances: Vec<InstanceState> = list
        .items
        .into_iter()
        .filter(|pod| pod.metadata.deletion_timestamp.is_none())
        .map(|pod| InstanceState {
            ready: pod
                .status
                .conditions
                .iter()
                .any(|c| c.kind == "Ready" && c.status == "True"),
            restarts: pod
                .status
                .container_statuses
                .iter()
                .map(|c| c.restart_count)
                .sum(),
            checksum: pod.metadata.release_checksum(),
            name: pod.metadata.name,
        })
        .collect();

    instances.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(instances)
}

/// Instances not created from the restored revision.
pub fn stale_instances(instances: Vec<InstanceState>, restored: Option<&SpecHash>) -> Vec<String> {
    instances
        .into_iter()
        .filter(|i| i.checksum.as_ref() != restored)
        .map(|i| i.name)
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ObjectListJson<T> {
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ControllerRevisionJson {
    data: RevisionDataJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RevisionDataJson {
    spec: StatefulSetSpecJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NamedJson {
    metadata: ObjectMeta,
}

/// Config maps referenced neither by the live StatefulSet template nor by
/// any of its controller revisions. An absent StatefulSet keeps everything.
pub fn superseded_config_maps(
    stateful_set: &str,
    revisions: &str,
    config_maps: &str,
) -> Result<Vec<String>> {
    if stateful_set.trim().is_empty() {
        return Ok(Vec::new());
    }

    let set: StatefulSetJson =
        serde_json::from_str(stateful_set).context("Malformed StatefulSet")?;
    let revisions: ObjectListJson<ControllerRevisionJson> =
        serde_json::from_str(revisions).context("Malformed controller revision list")?;
    let config_maps: ObjectListJson<NamedJson> =
        serde_json::from_str(config_maps).context("Malformed config map list")?;

    let referenced: BTreeSet<&str> = set
        .spec
        .template
        .config_maps()
        .chain(
            revisions
                .items
                .iter()
                .flat_map(|r| r.data.spec.template.config_maps()),
        )
        .collect();

    let mut superseded: Vec<String> = config_maps
        .items
        .into_iter()
        .map(|c| c.metadata.name)
        .filter(|name| !referenced.contains(name.as_str()))
        .collect();
    superseded.sort();
    Ok(superseded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CHECKSUM: &str = "sha256:0123456789abcdef0123456789abcdef";

    #[test]
    fn absent_workload() {
        assert_eq!(parse_workload("tiksimpro-bot1", "\n").unwrap(), None);
    }

    #[test]
    fn stateful_set_state() {
        let text = json!({
            "metadata": { "name": "tiksimpro-bot1", "generation": 4 },
            "spec": {
                "replicas": 3,
                "template": { "metadata": { "annotations": {
                    RELEASE_CHECKSUM_ANNOTATION: CHECKSUM
                } } }
            },
            "status": { "observedGeneration": 4, "readyReplicas": 2, "updatedReplicas": 3 }
        })
        .to_string();

        let state = parse_workload("tiksimpro-bot1", &text).unwrap().unwrap();
        assert_eq!(state.desired, 3);
        assert_eq!(state.ready, 2);
        assert_eq!(state.updated, 3);
        assert_eq!(state.checksum, SpecHash::parse(CHECKSUM));
        assert!(!state.is_settled());
    }

    #[test]
    fn stale_status_counts_nothing_as_updated() {
        let text = json!({
            "metadata": { "generation": 5 },
            "spec": { "replicas": 1 },
            "status": { "observedGeneration": 4, "readyReplicas": 1, "updatedReplicas": 1 }
        })
        .to_string();

        let state = parse_workload("tiksimpro-bot1", &text).unwrap().unwrap();
        assert_eq!(state.updated, 0);
        assert_eq!(state.checksum, None);
    }

    #[test]
    fn pod_list() {
        let text = json!({ "items": [
            {
                "metadata": { "name": "tiksimpro-bot1-1",
                              "annotations": { RELEASE_CHECKSUM_ANNOTATION: CHECKSUM } },
                "status": {
                    "conditions": [{ "type": "Ready", "status": "False" }],
                    "containerStatuses": [{ "restartCount": 4 }]
                }
            },
            {
                "metadata": { "name": "tiksimpro-bot1-0" },
                "status": { "conditions": [
                    { "type": "PodScheduled", "status": "True" },
                    { "type": "Ready", "status": "True" }
                ] }
            },
            {
                "metadata": { "name": "tiksimpro-bot1-2",
                              "deletionTimestamp": "2026-01-01T00:00:00Z" }
            }
        ] })
        .to_string();

        let instances = parse_instances(&text).unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].name, "tiksimpro-bot1-0");
        assert!(instances[0].ready);
        assert!(!instances[1].ready);
        assert_eq!(instances[1].restarts, 4);
        assert_eq!(instances[1].checksum, SpecHash::parse(CHECKSUM));
    }

    fn config_volume(name: &str) -> serde_json::Value {
        json!({ "spec": { "volumes": [
            { "name": "media", "emptyDir": {} },
            { "name": "config", "configMap": { "name": name } }
        ] } })
    }

    #[test]
    fn prunes_config_maps_no_revision_refers_to() {
        let set = json!({ "spec": { "template": config_volume("tiksimpro-bot1-config-cccc") } })
            .to_string();
        let revisions = json!({ "items": [
            { "data": { "spec": { "template": config_volume("tiksimpro-bot1-config-bbbb") } } },
            { "data": { "spec": { "template": config_volume("tiksimpro-bot1-config-cccc") } } }
        ] })
        .to_string();
        let config_maps = json!({ "items": [
            { "metadata": { "name": "tiksimpro-bot1-config-aaaa" } },
            { "metadata": { "name": "tiksimpro-bot1-config-bbbb" } },
            { "metadata": { "name": "tiksimpro-bot1-config-cccc" } }
        ] })
        .to_string();

        let superseded = superseded_config_maps(&set, &revisions, &config_maps).unwrap();
        assert_eq!(superseded, vec!["tiksimpro-bot1-config-aaaa"]);

        // Without a live StatefulSet nothing is known to be superseded.
        assert!(superseded_config_maps("", &revisions, &config_maps)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn stale_instances_are_off_the_restored_revision() {
        let restored = SpecHash::from_bytes(b"v1");
        let broken = SpecHash::from_bytes(b"v2");
        let instance = |name: &str, checksum: &SpecHash| InstanceState {
            name: name.to_string(),
            ready: false,
            restarts: 0,
            checksum: Some(checksum.clone()),
        };

        let stale = stale_instances(
            vec![
                instance("tiksimpro-bot1-0", &restored),
                instance("tiksimpro-bot1-1", &broken),
            ],
            Some(&restored),
        );
        assert_eq!(stale, vec!["tiksimpro-bot1-1"]);
    }
}
