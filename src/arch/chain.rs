use ndarray::{concatenate, ArrayD, ArrayView, ArrayViewD, Axis, IxDyn};

use super::layers::Layer;
use crate::{LrpErr, Result};

/// How the outputs of the branches of a [`Parallel`] block are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Merge {
    /// Elementwise sum, every branch must produce the same shape.
    Sum,
    /// Concatenation along `axis`, where axis 0 is the batch axis.
    Concat { axis: usize },
}

impl Merge {
    pub fn apply(&self, outputs: &[ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let Some(first) = outputs.first() else {
            return Err(LrpErr::shape("parallel branches", &[0], "at least one"));
        };

        match self {
            Merge::Sum => {
                let mut acc = first.clone();
                for out in &outputs[1..] {
                    if out.shape() != acc.shape() {
                        return Err(LrpErr::shape(
                            "summed branch output",
                            out.shape(),
                            format!("{:?}", acc.shape()),
                        ));
                    }
                    acc += out;
                }
                Ok(acc)
            }
            Merge::Concat { axis } => {
                let views: Vec<ArrayView<f32, IxDyn>> = outputs.iter().map(|o| o.view()).collect();
                concatenate(Axis(*axis), &views).map_err(|_| {
                    LrpErr::shape(
                        "concatenated branch output",
                        first.shape(),
                        format!("branches agreeing on every axis but {axis}"),
                    )
                })
            }
        }
    }
}

/// A block whose branches all read the same input and whose outputs are merged.
#[derive(Clone, Debug)]
pub struct Parallel {
    merge: Merge,
    branches: Vec<Node>,
}

impl Parallel {
    pub fn new<I>(merge: Merge, branches: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        let branches: Vec<Node> = branches.into_iter().map(Into::into).collect();
        if branches.is_empty() {
            return Err(LrpErr::shape("parallel branches", &[0], "at least one"));
        }

        Ok(Self { merge, branches })
    }

    pub fn merge(&self) -> Merge {
        self.merge
    }

    pub fn branches(&self) -> &[Node] {
        &self.branches
    }

    /// Returns the output of every branch, in order.
    pub fn branch_outputs(&self, x: ArrayViewD<f32>) -> Result<Vec<ArrayD<f32>>> {
        self.branches.iter().map(|b| b.forward(x.view())).collect()
    }

    pub fn forward(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        self.merge.apply(&self.branch_outputs(x)?)
    }
}

/// An element of a [`Chain`].
#[derive(Clone, Debug)]
pub enum Node {
    Layer(Layer),
    Chain(Chain),
    Parallel(Parallel),
}

impl Node {
    pub fn forward(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Node::Layer(l) => l.forward(x),
            Node::Chain(c) => c.forward(x),
            Node::Parallel(p) => p.forward(x),
        }
    }

    /// Nesting depth, 0 for a plain layer.
    pub fn depth(&self) -> usize {
        match self {
            Node::Layer(_) => 0,
            Node::Chain(c) => c.depth(),
            Node::Parallel(p) => 1 + p.branches.iter().map(Node::depth).max().unwrap_or(0),
        }
    }

    fn flatten_into(&self, out: &mut Vec<Node>) {
        match self {
            Node::Layer(l) => out.push(Node::Layer(l.clone())),
            Node::Chain(c) => out.extend(c.flatten().nodes),
            Node::Parallel(p) => {
                let branches = p
                    .branches
                    .iter()
                    .map(|b| match b {
                        Node::Chain(c) => Node::Chain(c.flatten()),
                        other => {
                            let mut nodes = Vec::new();
                            other.flatten_into(&mut nodes);
                            match nodes.len() {
                                1 => nodes.remove(0),
                                _ => Node::Chain(Chain { nodes }),
                            }
                        }
                    })
                    .collect();
                out.push(Node::Parallel(Parallel {
                    merge: p.merge,
                    branches,
                }));
            }
        }
    }

    fn walk<'a>(&'a self, walk: Walk, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, &'a Layer)>) {
        match self {
            Node::Layer(l) => out.push((path.clone(), l)),
            Node::Chain(c) => c.walk(walk, path, out),
            Node::Parallel(p) => {
                for (b, branch) in p.branches.iter().enumerate() {
                    path.push(b + 1);
                    branch.walk(walk, path, out);
                    path.pop();
                }
            }
        }
    }
}

impl From<Layer> for Node {
    fn from(layer: Layer) -> Self {
        Node::Layer(layer)
    }
}

impl From<Chain> for Node {
    fn from(chain: Chain) -> Self {
        Node::Chain(chain)
    }
}

impl From<Parallel> for Node {
    fn from(parallel: Parallel) -> Self {
        Node::Parallel(parallel)
    }
}

/// Which top-level positions of every chain a layer walk descends into.
#[derive(Clone, Copy)]
enum Walk {
    All,
    First,
    Last,
}

/// A sequential model: an ordered list of layers, nested chains and parallel blocks.
#[derive(Clone, Debug, Default)]
pub struct Chain {
    nodes: Vec<Node>,
}

impl Chain {
    /// Creates a new `Chain`.
    ///
    /// # Arguments
    /// * `nodes` - The layers, chains or parallel blocks the chain is composed of.
    pub fn new<I>(nodes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The number of top-level positions.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nesting depth, 1 for a chain of plain layers.
    pub fn depth(&self) -> usize {
        1 + self.nodes.iter().map(Node::depth).max().unwrap_or(0)
    }

    /// Inlines every nested chain, preserving execution order.
    ///
    /// Parallel blocks stay in place, with each of their branches flattened on its own.
    pub fn flatten(&self) -> Chain {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            node.flatten_into(&mut nodes);
        }

        Chain { nodes }
    }

    /// Every layer of the model in depth-first order, with its 1-based position path.
    pub fn leaves(&self) -> Vec<(Vec<usize>, &Layer)> {
        let mut out = Vec::new();
        self.walk(Walk::All, &mut Vec::new(), &mut out);
        out
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// The layers that read the model input, one per branch when the model starts with a
    /// parallel block.
    pub fn first_layers(&self) -> Vec<(Vec<usize>, &Layer)> {
        let mut out = Vec::new();
        self.walk(Walk::First, &mut Vec::new(), &mut out);
        out
    }

    /// The layers that produce the model output.
    pub fn last_layers(&self) -> Vec<(Vec<usize>, &Layer)> {
        let mut out = Vec::new();
        self.walk(Walk::Last, &mut Vec::new(), &mut out);
        out
    }

    fn walk<'a>(&'a self, walk: Walk, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, &'a Layer)>) {
        let len = self.len();
        let range = match walk {
            Walk::All => 0..len,
            Walk::First => 0..len.min(1),
            Walk::Last => len.saturating_sub(1)..len,
        };
        for (i, node) in self.nodes.iter().enumerate().skip(range.start).take(range.len()) {
            path.push(i + 1);
            node.walk(walk, path, out);
            path.pop();
        }
    }

    pub fn forward(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let mut a = x.to_owned();
        for node in &self.nodes {
            a = node.forward(a.view())?;
        }

        Ok(a)
    }

    /// Runs a forward pass keeping the input and the output of every top-level position.
    pub fn activations(&self, x: ArrayViewD<f32>) -> Result<Vec<ArrayD<f32>>> {
        let mut acts = Vec::with_capacity(self.nodes.len() + 1);
        acts.push(x.to_owned());
        for (k, node) in self.nodes.iter().enumerate() {
            let a = node.forward(acts[k].view())?;
            acts.push(a);
        }

        Ok(acts)
    }
}

/// Renders a position path as `2.1.3`.
pub fn fmt_position(path: &[usize]) -> String {
    path.iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use ndarray::{arr2, Array1, Array2};

    use super::*;
    use crate::arch::{activations::ActFn, layers::Dense};

    fn dense(i: usize, o: usize) -> Layer {
        Layer::dense(Dense::new(Array2::ones((i, o)), Array1::zeros(o), Some(ActFn::Relu)).unwrap())
    }

    #[test]
    fn flatten_inlines_nested_chains_in_order() {
        let inner1 = Chain::new([dense(2, 3), dense(3, 4)]);
        let inner2 = Chain::new([dense(4, 5), dense(5, 6), dense(6, 7)]);
        let model = Chain::new([Node::from(inner1), Node::from(inner2)]);

        let flat = model.flatten();

        assert_eq!(model.len(), 2);
        assert_eq!(flat.len(), 5);
        assert_eq!(flat.depth(), 1);
        let dims: Vec<String> = flat.nodes().iter().map(|n| format!("{n:?}")).collect();
        assert!(dims[0].contains("2 => 3"));
        assert!(dims[4].contains("6 => 7"));
    }

    #[test]
    fn flatten_keeps_parallel_blocks() {
        let parallel = Parallel::new(
            Merge::Sum,
            [Node::from(Chain::new([Node::from(Chain::new([dense(2, 2)])), dense(2, 2).into()])), dense(2, 2).into()],
        )
        .unwrap();
        let model = Chain::new([dense(2, 2).into(), Node::from(parallel)]);

        let flat = model.flatten();

        assert_eq!(flat.len(), 2);
        let Node::Parallel(p) = &flat.nodes()[1] else {
            panic!("expected a parallel block");
        };
        let Node::Chain(branch) = &p.branches()[0] else {
            panic!("expected a chain branch");
        };
        assert_eq!(branch.len(), 2);
        assert_eq!(flat.leaf_count(), 4);
    }

    #[test]
    fn parallel_sum_merges_branch_outputs() {
        let parallel = Parallel::new(Merge::Sum, [dense(2, 2), dense(2, 2)]).unwrap();
        let x = arr2(&[[1.0, 2.0]]).into_dyn();

        let y = parallel.forward(x.view()).unwrap();

        assert_eq!(y, arr2(&[[6.0, 6.0]]).into_dyn());
    }

    #[test]
    fn leaves_are_addressed_by_path() {
        let parallel = Parallel::new(Merge::Sum, [dense(2, 2), dense(2, 2)]).unwrap();
        let model = Chain::new([dense(2, 2).into(), Node::from(parallel)]);

        let paths: Vec<String> = model.leaves().iter().map(|(p, _)| fmt_position(p)).collect();

        assert_eq!(paths, vec!["1", "2.1", "2.2"]);
    }

    #[test]
    fn edge_layers_descend_into_every_branch() {
        let parallel = Parallel::new(
            Merge::Sum,
            [Node::from(Chain::new([dense(2, 2), dense(2, 2)])), dense(2, 2).into()],
        )
        .unwrap();
        let model = Chain::new([Node::from(Chain::new([dense(2, 2), dense(2, 2)])), Node::from(parallel)]);
        let paths = |layers: Vec<(Vec<usize>, &Layer)>| -> Vec<String> {
            layers.iter().map(|(p, _)| fmt_position(p)).collect()
        };

        assert_eq!(paths(model.first_layers()), vec!["1.1"]);
        assert_eq!(paths(model.last_layers()), vec!["2.1.2", "2.2"]);
        assert_eq!(model.leaf_count(), 5);
        assert!(Chain::default().first_layers().is_empty());
    }
}
