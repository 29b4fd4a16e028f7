use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::Axis;
use raster_dataset::{FeatureTensor, LabelVector};

/// Sample indices for the fitted and held-out parts of a training split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

/// Hold out the tail of `len` samples for validation, before any shuffling.
///
/// The boundary is `floor(len * (1 - fraction))`, so the held-out part is
/// always the last samples of the last shards.
pub fn validation_split(len: usize, fraction: f64) -> SplitIndices {
    let fraction = fraction.clamp(0.0, 1.0);
    let split_at = ((len as f64) * (1.0 - fraction)) as usize;
    let split_at = split_at.min(len);
    SplitIndices {
        train: (0..split_at).collect(),
        val: (split_at..len).collect(),
    }
}

/// Gather the samples at `indices` into a `[batch, C, H, W]` tensor.
pub fn features_batch<B: Backend>(
    features: &FeatureTensor,
    indices: &[usize],
    device: &B::Device,
) -> Tensor<B, 4> {
    let (_, c, h, w) = features.dim();
    let mut buf: Vec<f32> = Vec::with_capacity(indices.len() * c * h * w);
    for &idx in indices {
        buf.extend(features.index_axis(Axis(0), idx).iter().copied());
    }
    Tensor::<B, 4>::from_data(TensorData::new(buf, [indices.len(), c, h, w]), device)
}

/// Gather the labels at `indices` into a `[batch, 1]` tensor.
pub fn labels_batch<B: Backend>(
    labels: &LabelVector,
    indices: &[usize],
    device: &B::Device,
) -> Tensor<B, 2> {
    let buf: Vec<f32> = indices.iter().map(|&idx| labels[idx]).collect();
    Tensor::<B, 2>::from_data(TensorData::new(buf, [indices.len(), 1]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use ndarray::{Array1, Array4};

    type B = NdArray<f32>;

    #[test]
    fn validation_takes_the_tail() {
        let split = validation_split(100, 0.15);
        assert_eq!(split.train.len(), 85);
        assert_eq!(split.val, (85..100).collect::<Vec<_>>());

        let split = validation_split(3, 0.15);
        assert_eq!(split.train, vec![0, 1]);
        assert_eq!(split.val, vec![2]);

        let split = validation_split(10, 0.0);
        assert_eq!(split.train.len(), 10);
        assert!(split.val.is_empty());
    }

    #[test]
    fn batches_follow_index_order() {
        let features = Array4::from_shape_fn((4, 2, 2, 2), |(i, c, _, _)| (i * 10 + c) as f32);
        let labels = Array1::from_vec(vec![0.5, 1.5, 2.5, 3.5]);
        let device = Default::default();

        let x = features_batch::<B>(&features, &[3, 1], &device);
        assert_eq!(x.dims(), [2, 2, 2, 2]);
        let values = x.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&values[..8], &[30.0, 30.0, 30.0, 30.0, 31.0, 31.0, 31.0, 31.0]);
        assert_eq!(values[8], 10.0);

        let y = labels_batch::<B>(&labels, &[3, 1], &device);
        assert_eq!(y.dims(), [2, 1]);
        assert_eq!(y.into_data().to_vec::<f32>().unwrap(), vec![3.5, 1.5]);
    }
}
