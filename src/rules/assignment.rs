use super::Rule;
use crate::{
    arch::{fmt_position, layers::Layer, Chain, Node},
    LrpErr, Result,
};

/// One rule per layer, nested like the model it was built for.
#[derive(Clone, Debug)]
pub enum Rules {
    Rule(Rule),
    Chain(Vec<Rules>),
    Parallel(Vec<Rules>),
}

impl Rules {
    pub fn chain<I>(rules: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Rules>,
    {
        Rules::Chain(rules.into_iter().map(Into::into).collect())
    }

    pub fn parallel<I>(rules: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Rules>,
    {
        Rules::Parallel(rules.into_iter().map(Into::into).collect())
    }

    /// Builds an assignment for `chain` by asking `f` for the rule of every layer.
    pub fn from_fn<F>(chain: &Chain, mut f: F) -> Result<Self>
    where
        F: FnMut(&[usize], &Layer) -> Result<Rule>,
    {
        fn walk_node<F>(node: &Node, path: &mut Vec<usize>, f: &mut F) -> Result<Rules>
        where
            F: FnMut(&[usize], &Layer) -> Result<Rule>,
        {
            match node {
                Node::Layer(layer) => Ok(Rules::Rule(f(path, layer)?)),
                Node::Chain(c) => walk_chain(c, path, f),
                Node::Parallel(p) => {
                    let mut rules = Vec::with_capacity(p.branches().len());
                    for (b, branch) in p.branches().iter().enumerate() {
                        path.push(b + 1);
                        rules.push(walk_node(branch, path, f)?);
                        path.pop();
                    }
                    Ok(Rules::Parallel(rules))
                }
            }
        }

        fn walk_chain<F>(c: &Chain, path: &mut Vec<usize>, f: &mut F) -> Result<Rules>
        where
            F: FnMut(&[usize], &Layer) -> Result<Rule>,
        {
            let mut rules = Vec::with_capacity(c.len());
            for (i, n) in c.nodes().iter().enumerate() {
                path.push(i + 1);
                rules.push(walk_node(n, path, f)?);
                path.pop();
            }
            Ok(Rules::Chain(rules))
        }

        walk_chain(chain, &mut Vec::new(), &mut f)
    }

    /// Inlines nested chains the same way [`Chain::flatten`] does, so that a flattened model and
    /// its flattened rules stay isomorphic.
    pub fn flatten(&self) -> Rules {
        match self {
            Rules::Chain(rules) => {
                let mut out = Vec::with_capacity(rules.len());
                for r in rules {
                    r.flatten_into(&mut out);
                }
                Rules::Chain(out)
            }
            other => {
                let mut out = Vec::new();
                other.flatten_into(&mut out);
                Rules::Chain(out)
            }
        }
    }

    fn flatten_into(&self, out: &mut Vec<Rules>) {
        match self {
            Rules::Rule(r) => out.push(Rules::Rule(r.clone())),
            Rules::Chain(_) => {
                if let Rules::Chain(rules) = self.flatten() {
                    out.extend(rules);
                }
            }
            Rules::Parallel(branches) => {
                let branches = branches
                    .iter()
                    .map(|b| match b {
                        Rules::Chain(_) => b.flatten(),
                        other => {
                            let mut rules = Vec::new();
                            other.flatten_into(&mut rules);
                            match rules.len() {
                                1 => rules.remove(0),
                                _ => Rules::Chain(rules),
                            }
                        }
                    })
                    .collect();
                out.push(Rules::Parallel(branches));
            }
        }
    }

    /// The rules of every layer in depth-first order.
    pub fn leaves(&self) -> Vec<&Rule> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Rule>) {
        match self {
            Rules::Rule(r) => out.push(r),
            Rules::Chain(rules) | Rules::Parallel(rules) => {
                for r in rules {
                    r.collect_leaves(out);
                }
            }
        }
    }

    pub(crate) fn mismatch(path: &[usize]) -> LrpErr {
        LrpErr::RuleShapeMismatch {
            position: match path {
                [] => "root".to_string(),
                path => fmt_position(path),
            },
        }
    }
}

impl From<Rule> for Rules {
    fn from(rule: Rule) -> Self {
        Rules::Rule(rule)
    }
}
