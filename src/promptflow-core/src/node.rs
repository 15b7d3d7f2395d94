//! The prompt graph.
//!
//! Nodes live in an arena owned by [`PromptGraph`] and are addressed by
//! [`NodeId`]. Each edge carries a [`Guard`]; when a node completes, the
//! first child whose guard accepts the updated data is entered next. Cycles
//! (including a node pointing at itself) are allowed.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::data::PromptData;
use crate::error::{DialogueError, DialogueResult};
use crate::prompt::Prompt;

/// Handle to a node of a [`PromptGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type GuardFn<D> = Arc<dyn Fn(&D) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

/// Condition on entering a child node.
pub struct Guard<D> {
    check: Option<GuardFn<D>>,
}

impl<D> Clone for Guard<D> {
    fn clone(&self) -> Self {
        Self {
            check: self.check.clone(),
        }
    }
}

impl<D> std::fmt::Debug for Guard<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.check.is_some() {
            "Guard(condition)"
        } else {
            "Guard(always)"
        })
    }
}

impl<D: PromptData> Guard<D> {
    /// Always accepts.
    pub fn always() -> Self {
        Self { check: None }
    }

    /// Accepts when `predicate` holds for the data.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&D) -> bool + Send + Sync + 'static,
    {
        Self {
            check: Some(Arc::new(move |data: &D| {
                let allowed = predicate(data);
                async move { Ok::<_, anyhow::Error>(allowed) }.boxed()
            })),
        }
    }

    /// Asynchronous condition. An error aborts the run.
    pub fn when_async<F, Fut>(predicate: F) -> Self
    where
        F: Fn(&D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self {
            check: Some(Arc::new(move |data: &D| predicate(data).boxed())),
        }
    }

    pub async fn allows(&self, data: &D) -> anyhow::Result<bool> {
        match &self.check {
            Some(check) => check(data).await,
            None => Ok(true),
        }
    }
}

/// Edge to a child node.
#[derive(Debug)]
pub struct Edge<D> {
    pub target: NodeId,
    pub guard: Guard<D>,
}

impl<D> Clone for Edge<D> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            guard: self.guard.clone(),
        }
    }
}

struct Node<D> {
    prompt: Arc<Prompt<D>>,
    children: Vec<Edge<D>>,
}

/// Directed graph of prompts.
pub struct PromptGraph<D> {
    nodes: Vec<Node<D>>,
}

impl<D> Default for PromptGraph<D> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<D> std::fmt::Debug for PromptGraph<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let edges: Vec<Vec<usize>> = self
            .nodes
            .iter()
            .map(|n| n.children.iter().map(|e| e.target.0).collect())
            .collect();
        f.debug_struct("PromptGraph").field("edges", &edges).finish()
    }
}

impl<D: PromptData> PromptGraph<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, prompt: Prompt<D>) -> NodeId {
        self.add_shared_node(Arc::new(prompt))
    }

    /// Add a node for a prompt already shared with other graphs.
    pub fn add_shared_node(&mut self, prompt: Arc<Prompt<D>>) -> NodeId {
        self.nodes.push(Node {
            prompt,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Append an unconditional edge `parent -> child`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> DialogueResult<&mut Self> {
        self.add_guarded_child(parent, child, Guard::always())
    }

    /// Append an edge `parent -> child` taken only when `guard` allows.
    pub fn add_guarded_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        guard: Guard<D>,
    ) -> DialogueResult<&mut Self> {
        self.check(child)?;
        self.node_mut(parent)?.children.push(Edge {
            target: child,
            guard,
        });
        Ok(self)
    }

    /// Replace the children of `parent`, in priority order.
    pub fn set_children(
        &mut self,
        parent: NodeId,
        children: Vec<(NodeId, Guard<D>)>,
    ) -> DialogueResult<&mut Self> {
        for (child, _) in &children {
            self.check(*child)?;
        }
        self.node_mut(parent)?.children = children
            .into_iter()
            .map(|(target, guard)| Edge { target, guard })
            .collect();
        Ok(self)
    }

    pub fn children(&self, id: NodeId) -> DialogueResult<&[Edge<D>]> {
        Ok(&self.node(id)?.children)
    }

    pub fn prompt(&self, id: NodeId) -> DialogueResult<&Arc<Prompt<D>>> {
        Ok(&self.node(id)?.prompt)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First child of `id`, in insertion order, whose guard accepts `data`.
    pub async fn next_node(&self, id: NodeId, data: &D) -> DialogueResult<Option<NodeId>> {
        for edge in self.children(id)? {
            if edge.guard.allows(data).await? {
                return Ok(Some(edge.target));
            }
        }
        Ok(None)
    }

    fn check(&self, id: NodeId) -> DialogueResult<()> {
        self.node(id).map(|_| ())
    }

    fn node(&self, id: NodeId) -> DialogueResult<&Node<D>> {
        self.nodes
            .get(id.0)
            .ok_or(DialogueError::UnknownNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> DialogueResult<&mut Node<D>> {
        self.nodes
            .get_mut(id.0)
            .ok_or(DialogueError::UnknownNode(id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;
    use crate::visual::Visual;
    use pretty_assertions::assert_eq;

    fn prompt(text: &str) -> Prompt<Record> {
        Prompt::fixed(Visual::message(text)).build()
    }

    #[tokio::test]
    async fn test_first_accepting_child_wins() {
        let mut graph = PromptGraph::new();
        let root = graph.add_node(prompt("root"));
        let small = graph.add_node(prompt("small"));
        let large = graph.add_node(prompt("large"));
        let fallback = graph.add_node(prompt("fallback"));

        graph
            .add_guarded_child(root, small, Guard::when(|d: &Record| d.get_i64("n") < Some(10)))
            .unwrap()
            .add_guarded_child(root, large, Guard::when(|d: &Record| d.get_i64("n") >= Some(10)))
            .unwrap()
            .add_child(root, fallback)
            .unwrap();

        let three = Record::new("u").with("n", 3);
        let thirty = Record::new("u").with("n", 30);
        assert_eq!(graph.next_node(root, &three).await.unwrap(), Some(small));
        assert_eq!(graph.next_node(root, &thirty).await.unwrap(), Some(large));
        assert_eq!(
            graph.next_node(root, &Record::new("u")).await.unwrap(),
            Some(small)
        );
        assert_eq!(graph.next_node(fallback, &Record::new("u")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_self_loop() {
        let mut graph = PromptGraph::new();
        let node = graph.add_node(prompt("again"));
        graph
            .add_guarded_child(
                node,
                node,
                Guard::when(|d: &Record| d.get_array("names").len() < 2),
            )
            .unwrap();

        let one = Record::new("u").with_appended("names", "a");
        let two = one.clone().with_appended("names", "b");
        assert_eq!(graph.next_node(node, &one).await.unwrap(), Some(node));
        assert_eq!(graph.next_node(node, &two).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_children_replaces_edges() {
        let mut graph = PromptGraph::new();
        let a = graph.add_node(prompt("a"));
        let b = graph.add_node(prompt("b"));
        let c = graph.add_node(prompt("c"));
        graph.add_child(a, b).unwrap();
        graph
            .set_children(a, vec![(c, Guard::always()), (b, Guard::always())])
            .unwrap();

        let targets: Vec<NodeId> = graph.children(a).unwrap().iter().map(|e| e.target).collect();
        assert_eq!(targets, vec![c, b]);
    }

    #[tokio::test]
    async fn test_unknown_nodes_are_errors() {
        let mut graph = PromptGraph::<Record>::new();
        let a = graph.add_node(prompt("a"));
        let ghost = NodeId(7);

        assert!(matches!(
            graph.add_child(a, ghost),
            Err(DialogueError::UnknownNode(7))
        ));
        assert!(matches!(
            graph.next_node(ghost, &Record::new("u")).await,
            Err(DialogueError::UnknownNode(7))
        ));
        assert!(graph.children(a).unwrap().is_empty());
        assert_eq!(graph.len(), 1);
    }

    #[tokio::test]
    async fn test_async_guard_error_propagates() {
        let mut graph = PromptGraph::new();
        let a = graph.add_node(prompt("a"));
        let b = graph.add_node(prompt("b"));
        graph
            .add_guarded_child(
                a,
                b,
                Guard::when_async(|_: &Record| async { Err(anyhow::anyhow!("lookup failed")) }),
            )
            .unwrap();

        let err = graph.next_node(a, &Record::new("u")).await.unwrap_err();
        assert_eq!(err.kind(), "unexpected");
    }
}
