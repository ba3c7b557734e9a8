//! Per-layer relevance redistribution, one function per propagation law.

use log::debug;
use ndarray::{ArrayD, ArrayViewD};

use crate::{
    arch::{
        fmt_position,
        layers::{reshape, Layer},
    },
    rules::{stabilize, ModifiedLayer, Rule, DEFAULT_STABILIZER},
    LrpErr, Result,
};

/// Denominators below this magnitude are reported before being stabilized.
const NEAR_ZERO: f32 = 1e-6;

/// Computes the relevance of the input `a` of a layer from the relevance `r` of its output.
pub(super) fn redistribute(
    rule: &Rule,
    modified: &ModifiedLayer,
    a: ArrayViewD<f32>,
    r: ArrayViewD<f32>,
    path: &[usize],
) -> Result<ArrayD<f32>> {
    match (rule, modified) {
        (_, ModifiedLayer::Pass) => reshape(r, a.shape()),
        (Rule::ZBox { low, high }, ModifiedLayer::ZBox { layer, pos, neg }) => {
            zbox(layer, pos, neg, a, r, (*low, *high), path)
        }
        (Rule::AlphaBeta { alpha, beta }, ModifiedLayer::AlphaBeta { pos, neg, pos_nobias, neg_nobias }) => {
            let halves = Halves {
                pos,
                neg,
                pos_nobias,
                neg_nobias,
            };
            alpha_beta(&halves, a, r, (*alpha, *beta), path)
        }
        (rule, ModifiedLayer::Generic(layer)) => generic(rule, layer, a, r, path),
        (rule, modified) => Err(LrpErr::IncompatibleRule {
            position: fmt_position(path),
            rule: rule.name(),
            layer: format!("{modified:?}"),
        }),
    }
}

/// `R = x' ⊙ (J(x')ᵀ · R_out / modify_denominator(layer'(x')))`.
fn generic(
    rule: &Rule,
    layer: &Layer,
    a: ArrayViewD<f32>,
    r: ArrayViewD<f32>,
    path: &[usize],
) -> Result<ArrayD<f32>> {
    let x = rule.modify_input(a.to_owned());
    let z = layer.forward(x.view())?;
    report_near_zero(&z, path);

    let s = &r / &rule.modify_denominator(z);
    let c = layer.pullback(x.view(), s.view())?;
    Ok(x * c)
}

fn zbox(
    layer: &Layer,
    pos: &Layer,
    neg: &Layer,
    a: ArrayViewD<f32>,
    r: ArrayViewD<f32>,
    (low, high): (f32, f32),
    path: &[usize],
) -> Result<ArrayD<f32>> {
    let l = ArrayD::from_elem(a.raw_dim(), low);
    let h = ArrayD::from_elem(a.raw_dim(), high);

    let z = layer.forward(a.view())? - pos.forward(l.view())? - neg.forward(h.view())?;
    report_near_zero(&z, path);

    let s = &r / &stabilize(z, DEFAULT_STABILIZER);
    let ra = &a * &layer.pullback(a.view(), s.view())?;
    let rl = &l * &pos.pullback(l.view(), s.view())?;
    let rh = &h * &neg.pullback(h.view(), s.view())?;
    Ok(ra - rl - rh)
}

/// The positive and negative parts of an affine layer.
struct Halves<'a> {
    pos: &'a Layer,
    neg: &'a Layer,
    pos_nobias: &'a Layer,
    neg_nobias: &'a Layer,
}

/// Relevance is split into the share of the activating contributions, weighted by `alpha`, and
/// the share of the inhibiting ones, weighted by `beta`.
fn alpha_beta(
    halves: &Halves,
    a: ArrayViewD<f32>,
    r: ArrayViewD<f32>,
    (alpha, beta): (f32, f32),
    path: &[usize],
) -> Result<ArrayD<f32>> {
    let a_pos = a.mapv(|x| x.max(0.));
    let a_neg = a.mapv(|x| x.min(0.));

    let z_pos = halves.pos.forward(a_pos.view())? + halves.neg_nobias.forward(a_neg.view())?;
    let z_neg = halves.pos_nobias.forward(a_neg.view())? + halves.neg.forward(a_pos.view())?;
    report_near_zero(&z_pos, path);

    let s_pos = &r / &stabilize(z_pos, DEFAULT_STABILIZER);
    let s_neg = &r / &stabilize(z_neg, DEFAULT_STABILIZER);

    let activating = &a_pos * &halves.pos.pullback(a_pos.view(), s_pos.view())?
        + &a_neg * &halves.neg.pullback(a_neg.view(), s_pos.view())?;
    let inhibiting = &a_neg * &halves.pos.pullback(a_neg.view(), s_neg.view())?
        + &a_pos * &halves.neg.pullback(a_pos.view(), s_neg.view())?;

    Ok(activating * alpha - inhibiting * beta)
}

fn report_near_zero(z: &ArrayD<f32>, path: &[usize]) {
    let count = z.iter().filter(|d| d.abs() < NEAR_ZERO).count();
    if count > 0 {
        debug!(
            "{count} of {} denominators at position {} are close to zero",
            z.len(),
            fmt_position(path)
        );
    }
}
