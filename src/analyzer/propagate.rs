use log::debug;
use ndarray::{ArrayD, ArrayViewD, IxDyn};

use super::laws::redistribute;
use crate::{
    arch::{fmt_position, Merge, Node, Parallel},
    rules::{stabilize, Modified, Rules, DEFAULT_STABILIZER},
    LrpErr, Result,
};

/// Runs the backward sweep over a sequence of nodes.
///
/// `acts` holds the input and the output of every node, `r_out` the relevance of the last output.
/// Returns the relevance at every one of those positions, input first.
pub(super) fn sweep(
    nodes: &[Node],
    modified: &[Modified],
    acts: &[ArrayD<f32>],
    r_out: ArrayD<f32>,
    path: &mut Vec<usize>,
) -> Result<Vec<ArrayD<f32>>> {
    let mut rels = vec![ArrayD::zeros(IxDyn(&[0])); nodes.len()];
    rels.push(r_out);

    for k in (0..nodes.len()).rev() {
        path.push(k + 1);
        let r = backward(&nodes[k], &modified[k], acts[k].view(), &acts[k + 1], rels[k + 1].view(), path)?;
        rels[k] = r;
        path.pop();
    }

    Ok(rels)
}

fn backward(
    node: &Node,
    modified: &Modified,
    a_in: ArrayViewD<f32>,
    a_out: &ArrayD<f32>,
    r_out: ArrayViewD<f32>,
    path: &mut Vec<usize>,
) -> Result<ArrayD<f32>> {
    match (node, modified) {
        (Node::Layer(_), Modified::Layer(rule, layer)) => {
            debug!("position {}: {rule:?}", fmt_position(path));
            redistribute(rule, layer, a_in, r_out, path)
        }
        (Node::Chain(chain), Modified::Chain(modified)) => {
            let acts = chain.activations(a_in)?;
            let mut rels = sweep(chain.nodes(), modified, &acts, r_out.to_owned(), path)?;
            Ok(rels.swap_remove(0))
        }
        (Node::Parallel(parallel), Modified::Parallel(modified)) => {
            backward_parallel(parallel, modified, a_in, a_out, r_out, path)
        }
        _ => Err(Rules::mismatch(path)),
    }
}

/// Splits the relevance of a summed output across the branches in proportion to each branch's
/// output, then sums the input relevance every branch produced.
fn backward_parallel(
    parallel: &Parallel,
    modified: &[Modified],
    a_in: ArrayViewD<f32>,
    a_out: &ArrayD<f32>,
    r_out: ArrayViewD<f32>,
    path: &mut Vec<usize>,
) -> Result<ArrayD<f32>> {
    if let merge @ Merge::Concat { .. } = parallel.merge() {
        return Err(LrpErr::UnsupportedMerge {
            merge: format!("{merge:?}"),
        });
    }

    let outs = parallel.branch_outputs(a_in.view())?;
    let denom = stabilize(a_out.clone(), DEFAULT_STABILIZER);

    let mut r_in = ArrayD::zeros(a_in.raw_dim());
    for (b, ((branch, modified), out)) in parallel.branches().iter().zip(modified).zip(&outs).enumerate() {
        let r_branch = &r_out * out / &denom;
        path.push(b + 1);
        r_in += &backward(branch, modified, a_in.view(), out, r_branch.view(), path)?;
        path.pop();
    }

    Ok(r_in)
}
