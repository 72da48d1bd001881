// math.rs
// ============================================================================
// Note: numeric helpers shared by the layers: row softmax and its backward
//       pass, cross-entropy loss/gradient, gradient clipping, argmax and
//       random weight initialization.
// ============================================================================

#![forbid(unsafe_code)]

use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView1, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{ModelError, Result};

// ---------------- Softmax ----------------

/// Numerically stable softmax over each row, rows processed in parallel.
pub fn softmax_rows(m: &Array2<f32>) -> Array2<f32> {
    let mut out = m.clone();
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| {
            let max_v = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0f32;
            for v in row.iter_mut() {
                *v = (*v - max_v).exp();
                sum += *v;
            }
            if sum > 0.0 {
                for v in row.iter_mut() {
                    *v /= sum;
                }
            }
        });
    out
}

/// Row-wise Jacobian-vector product of softmax: `y ⊙ (dy − ⟨y, dy⟩)`.
pub fn softmax_backward_rows(softmax_out: &Array2<f32>, grad_out: &Array2<f32>) -> Array2<f32> {
    let mut grad_in = Array2::<f32>::zeros(softmax_out.dim());
    for ((mut g_row, s_row), go_row) in grad_in
        .axis_iter_mut(Axis(0))
        .zip(softmax_out.axis_iter(Axis(0)))
        .zip(grad_out.axis_iter(Axis(0)))
    {
        let dot: f32 = s_row.iter().zip(go_row.iter()).map(|(&y, &dy)| y * dy).sum();
        for ((g, &y), &dy) in g_row.iter_mut().zip(s_row.iter()).zip(go_row.iter()) {
            *g = y * (dy - dot);
        }
    }
    grad_in
}

// ---------------- Loss ----------------

/// Mean negative log-likelihood of `targets` under row probabilities `probs`.
pub fn cross_entropy_loss(probs: &Array2<f32>, targets: &[usize]) -> f32 {
    if targets.is_empty() {
        return 0.0;
    }
    let mut loss = 0.0;
    for (row, &target) in targets.iter().enumerate() {
        loss -= probs[(row, target)].max(1e-15).ln();
    }
    loss / targets.len() as f32
}

/// Gradient of the mean cross-entropy with respect to the logits,
/// `(softmax − onehot) / L`.
pub fn cross_entropy_grad(probs: &Array2<f32>, targets: &[usize]) -> Array2<f32> {
    let mut grad = probs.clone();
    for (row, &target) in targets.iter().enumerate() {
        grad[(row, target)] -= 1.0;
    }
    let n = targets.len().max(1) as f32;
    grad.mapv_inplace(|x| x / n);
    grad
}

/// Rescales `grads` in place so its global L2 norm is at most `max_norm`.
pub fn clip_gradients(grads: &mut Array2<f32>, max_norm: f32) {
    let norm: f32 = grads.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        grads.mapv_inplace(|x| x * scale);
    }
}

// ---------------- Decoding ----------------

/// Index of the largest entry; ties resolve to the lowest index.
///
/// Returns `None` for an empty row.
pub fn argmax(row: ArrayView1<'_, f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in row.iter().enumerate() {
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

// ---------------- Initialization ----------------

/// `rows × cols` matrix drawn from `N(0, std²)`.
pub fn random_normal<R: Rng + ?Sized>(
    shape: (usize, usize),
    std: f32,
    rng: &mut R,
) -> Result<Array2<f32>> {
    let normal = Normal::new(0.0, std)
        .map_err(|e| ModelError::InvalidConfig(format!("normal(0, {std}): {e}")))?;
    Ok(Array2::from_shape_fn(shape, |_| normal.sample(&mut *rng)))
}

/// He initialization scale for a layer with `fan_in` inputs.
pub fn he_std(fan_in: usize) -> f32 {
    (2.0 / fan_in.max(1) as f32).sqrt()
}
