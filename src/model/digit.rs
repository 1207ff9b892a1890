//! Reference classifier: linear, batch norm, relu, linear.
//!
//! Small enough to train in tests, yet it carries every parameter kind
//! the round loop has to handle: learnable tensors, running statistics,
//! and a batch counter that never receives a gradient.

use crate::core::error::{Error, Result};
use crate::model::loss;
use crate::model::params::ParamMap;
use crate::model::Model;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Axis, Ix1, Ix2, IxDyn};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

const BN_EPS: f32 = 1e-5;
const BN_MOMENTUM: f32 = 0.1;

/// Two-layer network with a batch-normalized hidden layer.
#[derive(Clone, Debug)]
pub struct DigitNet {
    input_dim: usize,
    hidden_dim: usize,
    nclasses: usize,
    params: ParamMap,
}

impl DigitNet {
    /// Build a freshly initialized network.
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        nclasses: usize,
        rng: &mut StdRng,
    ) -> Result<Self> {
        if input_dim == 0 || hidden_dim == 0 || nclasses == 0 {
            return Err(Error::Config(
                "model dimensions must all be at least 1".into(),
            ));
        }
        let mut params = ParamMap::new();
        params.insert(
            "fc1.weight",
            gaussian(rng, &[hidden_dim, input_dim], (2.0 / input_dim as f32).sqrt())?,
        );
        params.insert("fc1.bias", ArrayD::zeros(IxDyn(&[hidden_dim])));
        params.insert("bn1.weight", ArrayD::from_elem(IxDyn(&[hidden_dim]), 1.0));
        params.insert("bn1.bias", ArrayD::zeros(IxDyn(&[hidden_dim])));
        params.insert("bn1.running_mean", ArrayD::zeros(IxDyn(&[hidden_dim])));
        params.insert(
            "bn1.running_var",
            ArrayD::from_elem(IxDyn(&[hidden_dim]), 1.0),
        );
        params.insert("bn1.num_batches_tracked", ArrayD::zeros(IxDyn(&[1])));
        params.insert(
            "fc2.weight",
            gaussian(rng, &[nclasses, hidden_dim], (2.0 / hidden_dim as f32).sqrt())?,
        );
        params.insert("fc2.bias", ArrayD::zeros(IxDyn(&[nclasses])));
        Ok(Self {
            input_dim,
            hidden_dim,
            nclasses,
            params,
        })
    }

    /// Input feature dimension.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Hidden layer width.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Number of output classes.
    pub fn nclasses(&self) -> usize {
        self.nclasses
    }

    fn view1(&self, name: &str) -> Result<ArrayView1<'_, f32>> {
        self.params
            .require(name)?
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|_| Error::ShapeMismatch(format!("{name} is not 1-dimensional")))
    }

    fn view2(&self, name: &str) -> Result<ArrayView2<'_, f32>> {
        self.params
            .require(name)?
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| Error::ShapeMismatch(format!("{name} is not 2-dimensional")))
    }

    fn check_batch(&self, inputs: &Array2<f32>, targets: Option<&[usize]>) -> Result<()> {
        if inputs.nrows() == 0 {
            return Err(Error::ShapeMismatch("empty batch".into()));
        }
        if inputs.ncols() != self.input_dim {
            return Err(Error::ShapeMismatch(format!(
                "expected {} input features, got {}",
                self.input_dim,
                inputs.ncols()
            )));
        }
        if let Some(t) = targets {
            if t.len() != inputs.nrows() {
                return Err(Error::ShapeMismatch(format!(
                    "{} inputs vs {} targets",
                    inputs.nrows(),
                    t.len()
                )));
            }
        }
        Ok(())
    }
}

fn gaussian(rng: &mut StdRng, shape: &[usize], std: f32) -> Result<ArrayD<f32>> {
    let normal =
        Normal::new(0.0f32, std).map_err(|e| Error::Internal(format!("bad init std: {e}")))?;
    let len: usize = shape.iter().product();
    let values: Vec<f32> = (0..len).map(|_| normal.sample(rng)).collect();
    ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| Error::ShapeMismatch(e.to_string()))
}

impl Model for DigitNet {
    fn params(&self) -> &ParamMap {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamMap {
        &mut self.params
    }

    fn predict(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_batch(inputs, None)?;
        let w1 = self.view2("fc1.weight")?;
        let b1 = self.view1("fc1.bias")?;
        let gamma = self.view1("bn1.weight")?;
        let beta = self.view1("bn1.bias")?;
        let mean = self.view1("bn1.running_mean")?;
        let var = self.view1("bn1.running_var")?;
        let w2 = self.view2("fc2.weight")?;
        let b2 = self.view1("fc2.bias")?;

        let z1 = inputs.dot(&w1.t()) + &b1;
        let inv_std = var.mapv(|v| 1.0 / (v + BN_EPS).sqrt());
        let zbn = (&z1 - &mean) * &inv_std * &gamma + &beta;
        let act = zbn.mapv(|v| v.max(0.0));
        Ok(act.dot(&w2.t()) + &b2)
    }

    fn backward(&mut self, inputs: &Array2<f32>, targets: &[usize]) -> Result<(f32, ParamMap)> {
        self.check_batch(inputs, Some(targets))?;
        let batch = inputs.nrows() as f32;

        // Forward with batch statistics.
        let (logits, act, xhat, inv_std, mu, var) = {
            let w1 = self.view2("fc1.weight")?;
            let b1 = self.view1("fc1.bias")?;
            let gamma = self.view1("bn1.weight")?;
            let beta = self.view1("bn1.bias")?;
            let w2 = self.view2("fc2.weight")?;
            let b2 = self.view1("fc2.bias")?;

            let z1 = inputs.dot(&w1.t()) + &b1;
            let mu = z1
                .mean_axis(Axis(0))
                .ok_or_else(|| Error::ShapeMismatch("empty batch".into()))?;
            let centered = &z1 - &mu;
            let var = centered
                .mapv(|v| v * v)
                .mean_axis(Axis(0))
                .ok_or_else(|| Error::ShapeMismatch("empty batch".into()))?;
            let inv_std = var.mapv(|v| 1.0 / (v + BN_EPS).sqrt());
            let xhat = &centered * &inv_std;
            let zbn = &xhat * &gamma + &beta;
            let act = zbn.mapv(|v| v.max(0.0));
            let logits = act.dot(&w2.t()) + &b2;
            (logits, act, xhat, inv_std, mu, var)
        };
        let loss_value = loss::cross_entropy(&logits, targets)?;

        // Running statistics track the batch moments; the variance uses
        // the unbiased estimate when the batch allows one.
        let unbiased = if batch > 1.0 {
            var.mapv(|v| v * batch / (batch - 1.0))
        } else {
            var.clone()
        };
        self.params
            .require_mut("bn1.running_mean")?
            .zip_mut_with(&mu, |r, &m| {
                *r = (1.0 - BN_MOMENTUM) * *r + BN_MOMENTUM * m;
            });
        self.params
            .require_mut("bn1.running_var")?
            .zip_mut_with(&unbiased, |r, &v| {
                *r = (1.0 - BN_MOMENTUM) * *r + BN_MOMENTUM * v;
            });
        self.params.require_mut("bn1.num_batches_tracked")?[[0]] += 1.0;

        // Backward.
        let w2 = self.view2("fc2.weight")?;
        let gamma = self.view1("bn1.weight")?;

        let mut dlogits = loss::softmax(&logits);
        for (i, &t) in targets.iter().enumerate() {
            dlogits[[i, t]] -= 1.0;
        }
        dlogits.mapv_inplace(|v| v / batch);

        let gw2 = dlogits.t().dot(&act);
        let gb2 = dlogits.sum_axis(Axis(0));

        let da = dlogits.dot(&w2);
        let mut dz = da;
        dz.zip_mut_with(&act, |d, &a| {
            if a <= 0.0 {
                *d = 0.0;
            }
        });

        let dgamma = (&dz * &xhat).sum_axis(Axis(0));
        let dbeta = dz.sum_axis(Axis(0));
        let dxhat = &dz * &gamma;

        let sum_dxhat = dxhat.sum_axis(Axis(0));
        let sum_dxhat_xhat = (&dxhat * &xhat).sum_axis(Axis(0));
        let mut dz1 = &dxhat * batch;
        dz1 -= &sum_dxhat;
        dz1 -= &(&xhat * &sum_dxhat_xhat);
        let scale: Array1<f32> = inv_std.mapv(|v| v / batch);
        dz1 *= &scale;

        let gw1 = dz1.t().dot(inputs);
        let gb1 = dz1.sum_axis(Axis(0));

        let mut grads = ParamMap::new();
        grads.insert("fc1.weight", gw1.into_dyn());
        grads.insert("fc1.bias", gb1.into_dyn());
        grads.insert("bn1.weight", dgamma.into_dyn());
        grads.insert("bn1.bias", dbeta.into_dyn());
        grads.insert("fc2.weight", gw2.into_dyn());
        grads.insert("fc2.bias", gb2.into_dyn());
        Ok((loss_value, grads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    /// Two well-separated gaussian blobs, 16 samples per class.
    fn blobs(rng: &mut StdRng, dim: usize) -> (Array2<f32>, Vec<usize>) {
        let normal = Normal::new(0.0f32, 0.3).unwrap();
        let per_class = 16;
        let mut rows = Vec::with_capacity(2 * per_class * dim);
        let mut labels = Vec::with_capacity(2 * per_class);
        for class in 0..2usize {
            let center = if class == 0 { 2.0 } else { -2.0 };
            for _ in 0..per_class {
                for d in 0..dim {
                    let base = if d == 0 { center } else { 0.0 };
                    rows.push(base + normal.sample(rng));
                }
                labels.push(class);
            }
        }
        let x = Array2::from_shape_vec((2 * per_class, dim), rows).unwrap();
        (x, labels)
    }

    #[test]
    fn test_new_rejects_zero_dimensions() {
        let mut r = rng();
        assert!(DigitNet::new(0, 4, 2, &mut r).is_err());
        assert!(DigitNet::new(4, 0, 2, &mut r).is_err());
        assert!(DigitNet::new(4, 4, 0, &mut r).is_err());
    }

    #[test]
    fn test_predict_shape() {
        let mut r = rng();
        let net = DigitNet::new(6, 8, 3, &mut r).unwrap();
        let x = Array2::zeros((5, 6));
        let scores = net.predict(&x).unwrap();
        assert_eq!(scores.dim(), (5, 3));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let mut r = rng();
        let net = DigitNet::new(6, 8, 3, &mut r).unwrap();
        let x = Array2::zeros((5, 7));
        assert!(net.predict(&x).is_err());
    }

    #[test]
    fn test_predict_leaves_state_untouched() {
        let mut r = rng();
        let net = DigitNet::new(4, 8, 2, &mut r).unwrap();
        let before = net.params().clone();
        let (x, _) = blobs(&mut r, 4);
        net.predict(&x).unwrap();
        assert_eq!(*net.params(), before);
    }

    #[test]
    fn test_backward_gradient_names() {
        let mut r = rng();
        let mut net = DigitNet::new(4, 8, 2, &mut r).unwrap();
        let (x, y) = blobs(&mut r, 4);
        let (_, grads) = net.backward(&x, &y).unwrap();

        for name in [
            "fc1.weight",
            "fc1.bias",
            "bn1.weight",
            "bn1.bias",
            "fc2.weight",
            "fc2.bias",
        ] {
            assert!(grads.contains(name), "missing gradient for {name}");
        }
        assert!(!grads.contains("bn1.running_mean"));
        assert!(!grads.contains("bn1.running_var"));
        assert!(!grads.contains("bn1.num_batches_tracked"));
    }

    #[test]
    fn test_backward_updates_running_state() {
        let mut r = rng();
        let mut net = DigitNet::new(4, 8, 2, &mut r).unwrap();
        let (x, y) = blobs(&mut r, 4);

        net.backward(&x, &y).unwrap();
        net.backward(&x, &y).unwrap();

        let counter = net.params().require("bn1.num_batches_tracked").unwrap();
        assert!((counter[[0]] - 2.0).abs() < 1e-6);
        let mean = net.params().require("bn1.running_mean").unwrap();
        assert!(mean.iter().any(|&v| v.abs() > 1e-6));
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut r = rng();
        let mut net = DigitNet::new(6, 12, 2, &mut r).unwrap();
        let (x, y) = blobs(&mut r, 6);

        let (first_loss, _) = net.backward(&x, &y).unwrap();
        for _ in 0..40 {
            let (_, grads) = net.backward(&x, &y).unwrap();
            net.params_mut().axpy(-0.1, &grads).unwrap();
        }
        let (last_loss, _) = net.backward(&x, &y).unwrap();
        assert!(
            last_loss < first_loss,
            "loss did not improve: {first_loss} -> {last_loss}"
        );
    }

    #[test]
    fn test_last_layer_gradient_matches_finite_difference() {
        let mut r = rng();
        let net = DigitNet::new(4, 6, 3, &mut r).unwrap();
        let (x, mut y) = blobs(&mut r, 4);
        for (i, label) in y.iter_mut().enumerate() {
            *label = i % 3;
        }

        let (_, grads) = net.clone().backward(&x, &y).unwrap();
        let analytic = grads.require("fc2.weight").unwrap().clone();

        let eps = 5e-2f32;
        for &(i, j) in &[(0usize, 0usize), (1, 3), (2, 5)] {
            let mut plus = net.clone();
            plus.params_mut().require_mut("fc2.weight").unwrap()[[i, j]] += eps;
            let (loss_plus, _) = plus.backward(&x, &y).unwrap();

            let mut minus = net.clone();
            minus.params_mut().require_mut("fc2.weight").unwrap()[[i, j]] -= eps;
            let (loss_minus, _) = minus.backward(&x, &y).unwrap();

            let fd = (loss_plus - loss_minus) / (2.0 * eps);
            let g = analytic[[i, j]];
            let tol = 0.1 * fd.abs().max(g.abs()) + 5e-3;
            assert!(
                (fd - g).abs() <= tol,
                "fc2.weight[{i},{j}]: finite difference {fd} vs analytic {g}"
            );
        }
    }

    #[test]
    fn test_single_sample_batch_stays_finite() {
        let mut r = rng();
        let mut net = DigitNet::new(4, 8, 2, &mut r).unwrap();
        let x = Array2::from_shape_vec((1, 4), vec![0.5, -0.25, 1.0, 0.0]).unwrap();
        let (loss, grads) = net.backward(&x, &[1]).unwrap();
        assert!(loss.is_finite());
        assert!(grads.iter().all(|(_, g)| g.iter().all(|v| v.is_finite())));
        let var = net.params().require("bn1.running_var").unwrap();
        assert!(var.iter().all(|v| v.is_finite()));
    }
}
