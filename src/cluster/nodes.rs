use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error("no ready schedulable node in the cluster ({total} nodes listed)")]
    NoneReady { total: usize },
}

/// Check whether a Node reports `Ready=True`.
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Not cordoned, and no taint that keeps ordinary pods off.
pub fn is_node_schedulable(node: &Node) -> bool {
    let Some(spec) = node.spec.as_ref() else {
        return true;
    };
    if spec.unschedulable.unwrap_or(false) {
        return false;
    }
    !spec
        .taints
        .as_ref()
        .map(|taints| {
            taints
                .iter()
                .any(|t| t.effect == "NoSchedule" || t.effect == "NoExecute")
        })
        .unwrap_or(false)
}

fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or("<unknown>")
}

/// Pick the first ready, schedulable node by name.
pub async fn pick_ready_schedulable_node(client: Client) -> Result<Node, NodeError> {
    let nodes: Api<Node> = Api::all(client);
    let listed = nodes.list(&ListParams::default()).await?.items;
    let total = listed.len();

    let mut candidates: Vec<Node> = listed
        .into_iter()
        .filter(|node| {
            let usable = is_node_ready(node) && is_node_schedulable(node);
            if !usable {
                debug!(node = node_name(node), "skipping node that is not ready and schedulable");
            }
            usable
        })
        .collect();
    candidates.sort_by(|a, b| node_name(a).cmp(node_name(b)));

    let node = candidates
        .into_iter()
        .next()
        .ok_or(NodeError::NoneReady { total })?;
    info!(node = node_name(&node), "picked node for preflight");
    Ok(node)
}

/// Why the suite cannot run against this node, if it cannot.
///
/// Windows nodes have no CFS quota. arm64 nodes are not covered by this
/// check.
pub fn preflight_skip_reason(node: &Node) -> Option<String> {
    let info = node.status.as_ref()?.node_info.as_ref()?;
    if info.operating_system.eq_ignore_ascii_case("windows") {
        return Some(format!("node {} runs windows", node_name(node)));
    }
    if info.architecture == "arm64" {
        return Some(format!("node {} is arm64", node_name(node)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::{Request, Response};
    use k8s_openapi::api::core::v1::{NodeCondition, NodeSpec, NodeStatus, NodeSystemInfo, Taint};
    use kube::api::ObjectMeta;
    use kube::client::Body;

    type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

    fn mock_client() -> (Client, ApiServerHandle) {
        let (mock_svc, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_svc, "default");
        (client, handle)
    }

    fn node_list_response(nodes: Vec<Node>) -> Response<Body> {
        let list = serde_json::json!({
            "apiVersion": "v1",
            "kind": "NodeList",
            "metadata": { "resourceVersion": "1" },
            "items": nodes,
        });
        Response::builder()
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&list).unwrap()))
            .unwrap()
    }

    fn spawn_mock_api(mut handle: ApiServerHandle, nodes: Vec<Node>) {
        tokio::spawn(async move {
            while let Some((request, send)) = handle.next_request().await {
                let path = request.uri().path().to_string();
                assert_eq!(path, "/api/v1/nodes", "unexpected request");
                send.send_response(node_list_response(nodes.clone()));
            }
        });
    }

    fn make_node(name: &str, ready: bool) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec: Some(NodeSpec::default()),
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".into(),
                    status: (if ready { "True" } else { "False" }).into(),
                    ..Default::default()
                }]),
                node_info: Some(NodeSystemInfo {
                    architecture: "amd64".into(),
                    operating_system: "linux".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }

    fn with_taint(mut node: Node, effect: &str) -> Node {
        node.spec.as_mut().unwrap().taints = Some(vec![Taint {
            key: "node-role.kubernetes.io/control-plane".into(),
            effect: effect.into(),
            ..Default::default()
        }]);
        node
    }

    #[test]
    fn readiness_follows_ready_condition() {
        assert!(is_node_ready(&make_node("a", true)));
        assert!(!is_node_ready(&make_node("a", false)));
        assert!(!is_node_ready(&Node::default()));
    }

    #[test]
    fn cordoned_node_is_not_schedulable() {
        let mut node = make_node("a", true);
        node.spec.as_mut().unwrap().unschedulable = Some(true);
        assert!(!is_node_schedulable(&node));
    }

    #[test]
    fn blocking_taints_make_node_unschedulable() {
        assert!(!is_node_schedulable(&with_taint(make_node("a", true), "NoSchedule")));
        assert!(!is_node_schedulable(&with_taint(make_node("a", true), "NoExecute")));
        assert!(is_node_schedulable(&with_taint(make_node("a", true), "PreferNoSchedule")));
        assert!(is_node_schedulable(&make_node("a", true)));
    }

    #[test]
    fn preflight_skips_windows_and_arm64() {
        let mut windows = make_node("win", true);
        windows.status.as_mut().unwrap().node_info.as_mut().unwrap().operating_system =
            "windows".into();
        assert!(preflight_skip_reason(&windows).unwrap().contains("windows"));

        let mut arm = make_node("arm", true);
        arm.status.as_mut().unwrap().node_info.as_mut().unwrap().architecture = "arm64".into();
        assert!(preflight_skip_reason(&arm).unwrap().contains("arm64"));

        assert_eq!(preflight_skip_reason(&make_node("x86", true)), None);
        assert_eq!(preflight_skip_reason(&Node::default()), None);
    }

    #[tokio::test]
    async fn picks_first_ready_schedulable_node_by_name() {
        let (client, handle) = mock_client();
        spawn_mock_api(
            handle,
            vec![
                make_node("node-c", true),
                with_taint(make_node("node-a", true), "NoSchedule"),
                make_node("node-b", true),
                make_node("node-0", false),
            ],
        );

        let node = pick_ready_schedulable_node(client).await.unwrap();
        assert_eq!(node.metadata.name.as_deref(), Some("node-b"));
    }

    #[tokio::test]
    async fn no_usable_node_is_an_error() {
        let (client, handle) = mock_client();
        spawn_mock_api(handle, vec![make_node("node-0", false)]);

        let err = pick_ready_schedulable_node(client).await.unwrap_err();
        assert!(matches!(err, NodeError::NoneReady { total: 1 }));
    }
}
