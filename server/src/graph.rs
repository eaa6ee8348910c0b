//! Graphviz rendering of resource status
//!
//! One root node, one node per resource group and one node per virtual
//! machine, coloured by status. Rewritten on every status change.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

use crate::inventory::ResourceKind;
use crate::observer::StatusObserver;
use crate::resource::Resource;

const ROOT_LABEL: &str = "Azure";
const GROUP_COLOUR: &str = "lightblue";
const GRAPH_ATTRS: &str = "    graph [ layout = neato overlap = prism ]\n";

#[derive(Debug, Clone)]
struct GraphNode {
    label: String,
    fill: &'static str,
}

/// Render the status graph as DOT
pub fn render(resources: &[Resource]) -> String {
    let mut graph: DiGraph<GraphNode, ()> = DiGraph::new();
    let root = graph.add_node(GraphNode {
        label: ROOT_LABEL.to_string(),
        fill: GROUP_COLOUR,
    });
    let mut groups: HashMap<&str, NodeIndex> = HashMap::new();

    for resource in resources {
        let group = *groups.entry(resource.owner.as_str()).or_insert_with(|| {
            let idx = graph.add_node(GraphNode {
                label: resource.owner.clone(),
                fill: GROUP_COLOUR,
            });
            graph.add_edge(root, idx, ());
            idx
        });

        if resource.kind == ResourceKind::VirtualMachine {
            let vm = graph.add_node(GraphNode {
                label: resource.name.clone(),
                fill: resource.status.colour(),
            });
            graph.add_edge(group, vm, ());
        } else {
            graph[group].fill = resource.status.colour();
        }
    }

    let dot = format!(
        "{:?}",
        Dot::with_attr_getters(
            &graph,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, _| String::new(),
            &|_, (_, node)| format!(
                "label = {:?} style = filled fillcolor = {}",
                node.label, node.fill
            ),
        )
    );

    match dot.split_once('\n') {
        Some((header, body)) => format!("{header}\n{GRAPH_ATTRS}{body}"),
        None => dot,
    }
}

/// Observer that keeps a `.gv` file in step with the registry
#[derive(Debug, Clone)]
pub struct GraphWriter {
    path: PathBuf,
}

impl GraphWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StatusObserver for GraphWriter {
    fn on_status_change(&self, resources: &[Resource]) {
        let dot = render(resources);
        let write = || fs::write(&self.path, dot);
        // block_in_place panics on a current-thread runtime
        let result = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(write)
            }
            _ => write(),
        };
        if let Err(e) = result {
            warn!("Failed to write {}: {e}", self.path.display());
        }
    }
}
