use ndarray::{ArrayView1, ArrayViewD, Axis};

use crate::{LrpErr, Result};

/// Picks the output neuron whose relevance seeds the backward pass.
pub trait NeuronSelector {
    /// Returns the index of the selected neuron in a single sample's output.
    fn select(&self, output: ArrayView1<f32>) -> usize;
}

/// Selects the neuron with the largest activation, the first one on ties.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaxActivation;

impl NeuronSelector for MaxActivation {
    fn select(&self, output: ArrayView1<f32>) -> usize {
        let mut best = 0;
        for (i, &x) in output.iter().enumerate() {
            if x > output[best] {
                best = i;
            }
        }

        best
    }
}

/// Always selects the same neuron.
#[derive(Clone, Copy, Debug)]
pub struct Index(pub usize);

impl NeuronSelector for Index {
    fn select(&self, _output: ArrayView1<f32>) -> usize {
        self.0
    }
}

impl NeuronSelector for usize {
    fn select(&self, _output: ArrayView1<f32>) -> usize {
        *self
    }
}

/// Applies `selector` to every sample of a batched output, each sample flattened.
///
/// # Errors
/// `InvalidNeuron` if a selected index lies outside the sample's output.
pub(crate) fn select_per_sample<S>(selector: &S, output: ArrayViewD<f32>) -> Result<Vec<usize>>
where
    S: NeuronSelector + ?Sized,
{
    output
        .axis_iter(Axis(0))
        .map(|sample| {
            let flat: Vec<f32> = sample.iter().copied().collect();
            let index = selector.select(ArrayView1::from(flat.as_slice()));
            if index >= flat.len() {
                return Err(LrpErr::InvalidNeuron {
                    index,
                    len: flat.len(),
                });
            }
            Ok(index)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};

    use super::*;

    #[test]
    fn max_activation_picks_the_largest_output() {
        let out = arr1(&[-2.17, 2.40, 0.99, -0.15, 1.03]);

        assert_eq!(MaxActivation.select(out.view()), 1);
    }

    #[test]
    fn max_activation_breaks_ties_by_first_occurrence() {
        let out = arr1(&[0.5, 3.0, 3.0, 1.0]);

        assert_eq!(MaxActivation.select(out.view()), 1);
    }

    #[test]
    fn index_ignores_the_output() {
        for out in [arr1(&[1.0, 2.0, 3.0]), arr1(&[9.0, -9.0, 0.0])] {
            assert_eq!(Index(2).select(out.view()), 2);
        }
    }

    #[test]
    fn selection_is_applied_per_sample() {
        let out = arr2(&[[0.1, 0.7, 0.2], [0.9, 0.0, 0.3]]).into_dyn();

        let selected = select_per_sample(&MaxActivation, out.view()).unwrap();

        assert_eq!(selected, vec![1, 0]);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let out = arr2(&[[0.1, 0.7, 0.2]]).into_dyn();

        let err = select_per_sample(&Index(3), out.view()).unwrap_err();

        assert!(matches!(err, LrpErr::InvalidNeuron { index: 3, len: 3 }));
    }
}
