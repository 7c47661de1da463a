//! Kubernetes manifest emitters.
//!
//! Everything renders through `serde_json::json!` values serialized as YAML;
//! `serde_json`'s map keeps keys sorted, which is what makes rendering
//! deterministic. Sample resources are deliberately generic: they exist so
//! category-level verbs have something to act on, not to match any specific
//! question wording.

use kubeprep_common::{PrereqKind, ResourceCategory, Track};
use serde_json::{json, Value};

/// Label stamped on every generated resource.
pub const MANAGED_BY: &str = "kubeprep";

const SAMPLE_IMAGE: &str = "nginx:1.25-alpine";

fn labels(app: &str) -> Value {
    json!({
        "app": app,
        "app.kubernetes.io/managed-by": MANAGED_BY,
    })
}

pub fn namespace(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "labels": { "app.kubernetes.io/managed-by": MANAGED_BY },
        },
    })
}

/// Exact-match tier: one named resource per parsed prerequisite.
pub fn prerequisite(kind: PrereqKind, name: &str, namespace: &str) -> Value {
    match kind {
        PrereqKind::Deployment => deployment(name, namespace, 1),
        PrereqKind::ConfigMap => config_map(name, namespace),
        PrereqKind::Secret => secret(name, namespace),
        PrereqKind::ServiceAccount => json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": { "name": name, "namespace": namespace, "labels": labels(name) },
        }),
        PrereqKind::Pod => pod(name, namespace),
        PrereqKind::PersistentVolumeClaim => pvc(name, namespace),
    }
}

/// Category-presence tier: one generic resource per themed namespace.
/// Rbac expands to a Role plus its binding, everything else to one document.
pub fn samples(category: ResourceCategory, namespace: &str) -> Vec<Value> {
    match category {
        ResourceCategory::Deployment => vec![deployment("sample-deployment", namespace, 1)],
        ResourceCategory::Service => vec![json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": "sample-service",
                "namespace": namespace,
                "labels": labels("sample-app"),
            },
            "spec": {
                "selector": { "app": "sample-app" },
                "ports": [ { "port": 80, "protocol": "TCP", "targetPort": 80 } ],
            },
        })],
        ResourceCategory::ConfigMap => vec![config_map("sample-config", namespace)],
        ResourceCategory::Secret => vec![secret("sample-secret", namespace)],
        ResourceCategory::PersistentVolumeClaim => vec![pvc("sample-pvc", namespace)],
        ResourceCategory::NetworkPolicy => vec![json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": {
                "name": "sample-netpol",
                "namespace": namespace,
                "labels": labels("sample-app"),
            },
            "spec": {
                "podSelector": {},
                "policyTypes": ["Ingress"],
                "ingress": [ { "from": [ { "podSelector": {} } ] } ],
            },
        })],
        ResourceCategory::Rbac => vec![
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "Role",
                "metadata": {
                    "name": "sample-role",
                    "namespace": namespace,
                    "labels": labels("sample-app"),
                },
                "rules": [ {
                    "apiGroups": [""],
                    "resources": ["pods", "configmaps"],
                    "verbs": ["get", "list", "watch"],
                } ],
            }),
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "RoleBinding",
                "metadata": {
                    "name": "sample-role-binding",
                    "namespace": namespace,
                    "labels": labels("sample-app"),
                },
                "roleRef": {
                    "apiGroup": "rbac.authorization.k8s.io",
                    "kind": "Role",
                    "name": "sample-role",
                },
                "subjects": [ {
                    "kind": "ServiceAccount",
                    "name": "default",
                    "namespace": namespace,
                } ],
            }),
        ],
    }
}

/// Administration track layer: a cluster role wide enough for admin
/// exercises, bound to the track namespace's default service account.
pub fn admin_rbac(track: Track) -> Vec<Value> {
    let role_name = format!("exam-{}-admin", track.as_str());
    let binding_name = format!("{role_name}-binding");
    vec![
        json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRole",
            "metadata": { "name": role_name.clone(), "labels": labels("exam-admin") },
            "rules": [ {
                "apiGroups": ["", "apps", "batch"],
                "resources": ["*"],
                "verbs": ["*"],
            } ],
        }),
        json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRoleBinding",
            "metadata": { "name": binding_name, "labels": labels("exam-admin") },
            "roleRef": {
                "apiGroup": "rbac.authorization.k8s.io",
                "kind": "ClusterRole",
                "name": role_name,
            },
            "subjects": [ {
                "kind": "ServiceAccount",
                "name": "default",
                "namespace": track.track_namespace(),
            } ],
        }),
    ]
}

/// Security track layer: deny-all policy for one themed namespace.
pub fn deny_all_policy(namespace: &str) -> Value {
    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "NetworkPolicy",
        "metadata": {
            "name": "default-deny-all",
            "namespace": namespace,
            "labels": labels("exam-security"),
        },
        "spec": {
            "podSelector": {},
            "policyTypes": ["Ingress", "Egress"],
        },
    })
}

fn deployment(name: &str, namespace: &str, replicas: u32) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "namespace": namespace, "labels": labels(name) },
        "spec": {
            "replicas": replicas,
            "selector": { "matchLabels": { "app": name } },
            "template": {
                "metadata": { "labels": { "app": name } },
                "spec": {
                    "containers": [ {
                        "name": name,
                        "image": SAMPLE_IMAGE,
                        "ports": [ { "containerPort": 80 } ],
                    } ],
                },
            },
        },
    })
}

fn pod(name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": namespace, "labels": labels(name) },
        "spec": {
            "containers": [ { "name": name, "image": SAMPLE_IMAGE } ],
        },
    })
}

fn config_map(name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "namespace": namespace, "labels": labels(name) },
        "data": { "environment": "exam", "owner": MANAGED_BY },
    })
}

fn secret(name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": namespace, "labels": labels(name) },
        "type": "Opaque",
        "stringData": { "username": "examuser", "password": "practice-only" },
    })
}

fn pvc(name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": { "name": name, "namespace": namespace, "labels": labels(name) },
        "spec": {
            "accessModes": ["ReadWriteOnce"],
            "resources": { "requests": { "storage": "100Mi" } },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisite_kinds_map_to_expected_api_kinds() {
        let cases = [
            (PrereqKind::Deployment, "Deployment"),
            (PrereqKind::ConfigMap, "ConfigMap"),
            (PrereqKind::Secret, "Secret"),
            (PrereqKind::ServiceAccount, "ServiceAccount"),
            (PrereqKind::Pod, "Pod"),
            (PrereqKind::PersistentVolumeClaim, "PersistentVolumeClaim"),
        ];
        for (kind, expected) in cases {
            let manifest = prerequisite(kind, "thing", "saturn");
            assert_eq!(manifest["kind"], expected);
            assert_eq!(manifest["metadata"]["namespace"], "saturn");
            assert_eq!(manifest["metadata"]["name"], "thing");
        }
    }

    #[test]
    fn rbac_samples_come_as_role_and_binding() {
        let docs = samples(ResourceCategory::Rbac, "mars");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "Role");
        assert_eq!(docs[1]["kind"], "RoleBinding");
    }

    #[test]
    fn deny_all_blocks_both_directions() {
        let policy = deny_all_policy("pluto");
        let types = policy["spec"]["policyTypes"].as_array().unwrap();
        assert_eq!(types.len(), 2);
    }
}
