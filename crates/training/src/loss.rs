use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Probabilities are clamped into `[EPS, 1 - EPS]` before taking logs.
pub const EPS: f32 = 1e-6;

/// Mean binary cross-entropy between sigmoid outputs and `{0, 1}` targets.
pub fn binary_cross_entropy<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let pred = pred.clamp(EPS, 1.0 - EPS);
    let ones = Tensor::<B, 4>::ones(target.dims(), &target.device());
    let target_inv = ones.clone() - target.clone();
    let pred_inv = ones - pred.clone();
    -((target * pred.log()) + (target_inv * pred_inv.log())).mean()
}

/// First element of a tensor as `f32` (0.0 if unreadable).
pub fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn t4(values: Vec<f32>) -> Tensor<B, 4> {
        let n = values.len();
        Tensor::from_data(TensorData::new(values, [1, 1, 1, n]), &Default::default())
    }

    #[test]
    fn perfect_prediction_is_near_zero() {
        let loss = scalar(binary_cross_entropy(
            t4(vec![1.0, 0.0]),
            t4(vec![1.0, 0.0]),
        ));
        assert!(loss < 1e-4, "loss {loss}");
    }

    #[test]
    fn coin_flip_is_ln2() {
        let loss = scalar(binary_cross_entropy(
            t4(vec![0.5, 0.5]),
            t4(vec![1.0, 0.0]),
        ));
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-5, "loss {loss}");
    }

    #[test]
    fn confident_mistakes_stay_finite() {
        let loss = scalar(binary_cross_entropy(
            t4(vec![0.0, 1.0]),
            t4(vec![1.0, 0.0]),
        ));
        assert!(loss.is_finite());
        assert!(loss > 10.0);
    }
}
