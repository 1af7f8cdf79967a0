// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Snapshot of the handler graph for inspection and export.

use serde::Serialize;

use crate::core::clocks::Clock;
use crate::core::error::{Result, StreamError};
use crate::core::runtime::StreamRuntime;

#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    pub nodes: Vec<NodeInfo>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub handler_id: String,
    pub class_name: String,
    pub dispatcher: String,
    pub adapter: bool,
    pub inputs: Vec<PortInfo>,
    pub outputs: Vec<PortInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    pub port_name: String,
    pub kind: String,
    pub capabilities: String,
}

/// One physical link. Links of a bridged connection share `connection`.
#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub connection: String,
    pub from_handler: String,
    pub from_port: String,
    pub to_handler: String,
    pub to_port: String,
    pub policy: String,
}

impl Topology {
    pub fn from_runtime<C: Clock>(runtime: &StreamRuntime<C>) -> Self {
        let nodes = runtime
            .handlers
            .iter()
            .map(|entry| {
                let port_info = |name: &str, spec: &crate::core::ports::PortSpec| PortInfo {
                    port_name: name.to_string(),
                    kind: spec.kind().to_string(),
                    capabilities: spec.capabilities().to_string(),
                };
                NodeInfo {
                    handler_id: entry.record.id().to_string(),
                    class_name: entry.record.class_name().to_string(),
                    dispatcher: entry.record.dispatcher().to_string(),
                    adapter: entry.record.is_adapter(),
                    inputs: entry
                        .ports
                        .inputs()
                        .iter()
                        .map(|port| port_info(port.name(), port.spec()))
                        .collect(),
                    outputs: entry
                        .ports
                        .outputs()
                        .iter()
                        .map(|port| port_info(port.name(), port.spec()))
                        .collect(),
                }
            })
            .collect();

        let edges = runtime
            .connections()
            .iter()
            .flat_map(|connection| {
                connection.links().iter().map(move |link| Edge {
                    connection: connection.id().to_string(),
                    from_handler: link.from().handler().to_string(),
                    from_port: link.from().port().to_string(),
                    to_handler: link.to().handler().to_string(),
                    to_port: link.to().port().to_string(),
                    policy: link.policy().to_string(),
                })
            })
            .collect();

        Self { nodes, edges }
    }

    pub fn adapter_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.adapter).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StreamError::Runtime(format!("Failed to serialize topology: {}", e)))
    }

    pub fn to_graphviz(&self) -> String {
        let mut dot = String::from("digraph StreamGraph {\n");
        dot.push_str("  rankdir=LR;\n");
        dot.push_str("  node [shape=box];\n\n");

        for node in &self.nodes {
            let style = if node.adapter { ", style=dashed" } else { "" };
            dot.push_str(&format!(
                "  \"{}\" [label=\"{}\\n({})\"{}];\n",
                node.handler_id, node.handler_id, node.class_name, style
            ));
        }

        dot.push('\n');

        for edge in &self.edges {
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}→{}\"];\n",
                edge.from_handler, edge.to_handler, edge.from_port, edge.to_port
            ));
        }

        dot.push_str("}\n");
        dot
    }

    /// Log the graph at info level.
    pub fn log(&self) {
        tracing::info!(
            "[Topology] {} node(s), {} edge(s), {} adapter(s)",
            self.nodes.len(),
            self.edges.len(),
            self.adapter_count()
        );
        for edge in &self.edges {
            tracing::info!(
                "[Topology]   {}.{} -> {}.{} ({}, {})",
                edge.from_handler,
                edge.from_port,
                edge.to_handler,
                edge.to_port,
                edge.policy,
                edge.connection
            );
        }
    }
}

impl<C: Clock> StreamRuntime<C> {
    pub fn topology(&self) -> Topology {
        Topology::from_runtime(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ProcessContext;
    use crate::core::handler::StreamHandler;
    use crate::core::ports::{Capabilities, PortSpec, video_input, video_output};
    use crate::core::registry::ActorRegistry;
    use std::sync::Arc;

    struct Node(Vec<PortSpec>);

    impl StreamHandler for Node {
        fn ports(&self) -> Vec<PortSpec> {
            self.0.clone()
        }

        fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn bridged_runtime() -> StreamRuntime {
        let mut rt = StreamRuntime::new(30.0)
            .unwrap()
            .with_registry(Arc::new(ActorRegistry::new()));
        rt.add_handler_with_id("A", Node(vec![video_output("out")])).unwrap();
        rt.add_handler_with_id(
            "B",
            Node(vec![video_input("in").with_capabilities(Capabilities::DEVICE)]),
        )
        .unwrap();
        rt.connect_by_id("A.out", "B.in").unwrap();
        rt
    }

    #[test]
    fn test_empty_topology() {
        let rt = StreamRuntime::new(30.0)
            .unwrap()
            .with_registry(Arc::new(ActorRegistry::new()));
        let topology = rt.topology();
        assert!(topology.nodes.is_empty());
        assert!(topology.edges.is_empty());
    }

    #[test]
    fn test_bridged_connection_shows_adapter() {
        let topology = bridged_runtime().topology();

        assert_eq!(topology.nodes.len(), 3);
        assert_eq!(topology.adapter_count(), 1);
        assert_eq!(topology.edges.len(), 2);
        assert!(topology.edges.iter().all(|edge| edge.connection == "conn_0"));
        assert_eq!(topology.edges[0].to_handler, "host_to_device_adapter_0");
        assert_eq!(topology.nodes[1].inputs[0].capabilities, "device");
    }

    #[test]
    fn test_to_graphviz() {
        let dot = bridged_runtime().topology().to_graphviz();

        assert!(dot.contains("digraph StreamGraph"));
        assert!(dot.contains("\"A\""));
        assert!(dot.contains("\"B\""));
        assert!(dot.contains("style=dashed"));
        assert!(dot.contains("->"));
    }

    #[test]
    fn test_to_json() {
        let json = bridged_runtime().topology().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["nodes"][0]["handler_id"], "A");
        assert_eq!(value["edges"][1]["to_port"], "in");
        assert_eq!(value["nodes"][2]["adapter"], true);
    }
}
