use ndarray::prelude::*;

use crate::{LrpErr, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    Mean,
}

/// A 2D pooling layer over `(batch, channels, height, width)` inputs, without padding.
#[derive(Clone, Debug)]
pub struct Pool {
    kind: PoolKind,
    window: (usize, usize),
    stride: (usize, usize),
}

impl Pool {
    pub fn new(kind: PoolKind, window: (usize, usize), stride: (usize, usize)) -> Result<Self> {
        if window.0 == 0 || window.1 == 0 || stride.0 == 0 || stride.1 == 0 {
            return Err(LrpErr::shape(
                "pool window and stride",
                &[window.0, window.1, stride.0, stride.1],
                "non zero",
            ));
        }

        Ok(Self {
            kind,
            window,
            stride,
        })
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn window(&self) -> (usize, usize) {
        self.window
    }

    pub fn forward(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let x = view_input(x)?;
        let (batch, channels, h, w) = x.dim();
        let (oh, ow) = self.output_hw(h, w)?;

        let mut y = Array4::zeros((batch, channels, oh, ow));
        for ((n, c, i, j), y) in y.indexed_iter_mut() {
            let window = self.window_of(x, n, c, i, j);
            *y = match self.kind {
                PoolKind::Max => window.fold(f32::NEG_INFINITY, |m, &v| m.max(v)),
                PoolKind::Mean => window.mean().unwrap_or_default(),
            };
        }

        Ok(y.into_dyn())
    }

    /// Routes the cotangent to the first maximum of each window, or spreads it evenly for mean pooling.
    pub fn pullback(&self, x: ArrayViewD<f32>, d: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let x = view_input(x)?;
        let (batch, channels, h, w) = x.dim();
        let (oh, ow) = self.output_hw(h, w)?;
        let d = d
            .into_dimensionality::<Ix4>()
            .map_err(|_| LrpErr::shape("pool cotangent", &[], "a rank 4 tensor"))?;
        if d.dim() != (batch, channels, oh, ow) {
            return Err(LrpErr::shape(
                "pool cotangent",
                d.shape(),
                format!("{:?}", (batch, channels, oh, ow)),
            ));
        }

        let (kh, kw) = self.window;
        let area = (kh * kw) as f32;
        let mut grad = Array4::zeros((batch, channels, h, w));
        for ((n, c, i, j), &g) in d.indexed_iter() {
            let (y0, x0) = (i * self.stride.0, j * self.stride.1);
            match self.kind {
                PoolKind::Max => {
                    let window = self.window_of(x, n, c, i, j);
                    let mut best = (0, 0);
                    for ((u, v), &val) in window.indexed_iter() {
                        if val > window[best] {
                            best = (u, v);
                        }
                    }
                    grad[[n, c, y0 + best.0, x0 + best.1]] += g;
                }
                PoolKind::Mean => {
                    grad.slice_mut(s![n, c, y0..y0 + kh, x0..x0 + kw])
                        .mapv_inplace(|v| v + g / area);
                }
            }
        }

        Ok(grad.into_dyn())
    }

    fn window_of<'a>(
        &self,
        x: ArrayView4<'a, f32>,
        n: usize,
        c: usize,
        i: usize,
        j: usize,
    ) -> ArrayView2<'a, f32> {
        let (y0, x0) = (i * self.stride.0, j * self.stride.1);
        x.slice_move(s![n, c, y0..y0 + self.window.0, x0..x0 + self.window.1])
    }

    fn output_hw(&self, h: usize, w: usize) -> Result<(usize, usize)> {
        let (kh, kw) = self.window;
        if h < kh || w < kw {
            return Err(LrpErr::shape(
                "pool input",
                &[h, w],
                format!("at least {kh}x{kw}"),
            ));
        }

        Ok(((h - kh) / self.stride.0 + 1, (w - kw) / self.stride.1 + 1))
    }
}

fn view_input(x: ArrayViewD<f32>) -> Result<ArrayView4<'_, f32>> {
    let shape = x.shape().to_vec();
    x.into_dimensionality::<Ix4>()
        .map_err(|_| LrpErr::shape("pool input", &shape, "[batch, channels, height, width]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pool_routes_to_first_maximum() {
        let pool = Pool::new(PoolKind::Max, (2, 2), (2, 2)).unwrap();
        let x = Array4::from_shape_vec((1, 1, 2, 2), vec![1.0, 3.0, 3.0, 0.0])
            .unwrap()
            .into_dyn();
        let d = Array4::from_elem((1, 1, 1, 1), 2.0).into_dyn();

        assert_eq!(pool.forward(x.view()).unwrap()[[0, 0, 0, 0]], 3.0);

        let grad = pool.pullback(x.view(), d.view()).unwrap();
        assert_eq!(grad.iter().copied().collect::<Vec<_>>(), vec![0.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn mean_pool_spreads_evenly() {
        let pool = Pool::new(PoolKind::Mean, (2, 2), (2, 2)).unwrap();
        let x = Array4::<f32>::ones((1, 1, 4, 4)).into_dyn();
        let d = Array4::from_elem((1, 1, 2, 2), 4.0).into_dyn();

        let grad = pool.pullback(x.view(), d.view()).unwrap();

        assert!(grad.iter().all(|&g| g == 1.0));
    }
}
