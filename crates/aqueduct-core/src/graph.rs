//! Audio graphs.
//!
//! A [`Graph`] owns a native graph object plus a mirror of its nodes and
//! connections. Every topology change is validated against the lifecycle
//! state and the mirror before the engine is called, and the mirror is
//! updated only after the engine accepts the change.
//!
//! Connections are keyed by destination input: connecting into an input
//! that already has a source replaces that connection, as the engine does.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::config::ComponentDescription;
use crate::engine::{CreateArgs, Engine, NodeId};
use crate::error::{Error, Reason, Result};
use crate::handle::ResourceHandle;
use crate::lifecycle::Operation;
use crate::status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphNode {
    pub id: NodeId,
    pub description: ComponentDescription,
}

/// `(source, source_output) -> (dest, dest_input)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub source: NodeId,
    pub source_output: u32,
    pub dest: NodeId,
    pub dest_input: u32,
}

#[derive(Debug)]
pub struct Graph {
    handle: ResourceHandle,
    nodes: BTreeMap<NodeId, GraphNode>,
    connections: BTreeMap<(NodeId, u32), Connection>,
    output_node: Option<NodeId>,
}

impl Graph {
    /// Create an empty graph in the `Closed` state.
    pub fn new(engine: Arc<dyn Engine>) -> Result<Self> {
        let handle = ResourceHandle::create(engine, &CreateArgs::Graph)?;
        Ok(Self {
            handle,
            nodes: BTreeMap::new(),
            connections: BTreeMap::new(),
            output_node: None,
        })
    }

    /// Add a node. At most one output node per graph.
    pub fn add_node(&mut self, description: ComponentDescription) -> Result<NodeId> {
        self.handle.check_operation(Operation::AddNode)?;
        if description.is_output() && self.output_node.is_some() {
            return Err(Error::Recoverable(Reason::OutputNodeConflict));
        }

        let mut node = 0;
        status::check(self.handle.engine().add_node(
            self.handle.native_id(),
            &description,
            &mut node,
        ))?;
        if self.nodes.contains_key(&node) {
            // The engine handed out an id we still track.
            return Err(Error::Fatal(Reason::InvalidState));
        }

        self.nodes.insert(node, GraphNode { id: node, description });
        if description.is_output() {
            self.output_node = Some(node);
        }
        log::debug!("graph {:?}: added node {}", self.handle.native_id(), node);
        Ok(node)
    }

    /// Remove a node and every connection touching it.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        self.handle.check_operation(Operation::RemoveNode)?;
        self.require_node(node)?;
        status::check(
            self.handle
                .engine()
                .remove_node(self.handle.native_id(), node),
        )?;

        self.nodes.remove(&node);
        self.connections
            .retain(|_, c| c.source != node && c.dest != node);
        if self.output_node == Some(node) {
            self.output_node = None;
        }
        Ok(())
    }

    /// Connect `source`'s output to `dest`'s input, replacing whatever fed
    /// that input before.
    pub fn connect(
        &mut self,
        source: NodeId,
        source_output: u32,
        dest: NodeId,
        dest_input: u32,
    ) -> Result<()> {
        self.handle.check_operation(Operation::Connect)?;
        self.require_node(source)?;
        self.require_node(dest)?;
        if source == dest {
            return Err(Error::Fatal(Reason::InvalidConnection));
        }
        status::check(self.handle.engine().connect(
            self.handle.native_id(),
            source,
            source_output,
            dest,
            dest_input,
        ))?;

        let connection = Connection {
            source,
            source_output,
            dest,
            dest_input,
        };
        if let Some(previous) = self.connections.insert((dest, dest_input), connection) {
            log::debug!(
                "graph {:?}: input {}:{} now fed by {} instead of {}",
                self.handle.native_id(),
                dest,
                dest_input,
                source,
                previous.source
            );
        }
        Ok(())
    }

    /// Disconnect whatever feeds `dest`'s input.
    pub fn disconnect(&mut self, dest: NodeId, dest_input: u32) -> Result<()> {
        self.handle.check_operation(Operation::Disconnect)?;
        self.require_node(dest)?;
        if !self.connections.contains_key(&(dest, dest_input)) {
            return Err(Error::Fatal(Reason::NoConnection));
        }
        status::check(self.handle.engine().disconnect(
            self.handle.native_id(),
            dest,
            dest_input,
        ))?;
        self.connections.remove(&(dest, dest_input));
        Ok(())
    }

    fn require_node(&self, node: NodeId) -> Result<()> {
        if self.nodes.contains_key(&node) {
            Ok(())
        } else {
            Err(Error::Fatal(Reason::NodeNotFound))
        }
    }

    pub fn node(&self, node: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// The connection feeding `dest`'s input, if any.
    pub fn connection_into(&self, dest: NodeId, dest_input: u32) -> Option<&Connection> {
        self.connections.get(&(dest, dest_input))
    }

    pub fn output_node(&self) -> Option<NodeId> {
        self.output_node
    }

    /// Tear the graph down together with its nodes and connections.
    pub fn teardown(&mut self) {
        self.handle.teardown();
        self.nodes.clear();
        self.connections.clear();
        self.output_node = None;
    }
}

impl Deref for Graph {
    type Target = ResourceHandle;

    fn deref(&self) -> &ResourceHandle {
        &self.handle
    }
}

impl DerefMut for Graph {
    fn deref_mut(&mut self) -> &mut ResourceHandle {
        &mut self.handle
    }
}
