use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Generate every continuous index of a grid.
///
/// Returns a tensor of shape `[N, D]` where N is the number of nodes. Rows
/// follow the tensor memory order (first index component fastest) so the
/// result of a per-row operation reshapes directly into the tensor layout.
///
/// # Arguments
/// * `size` - Grid size ordered like indices, `(x, y, z)` in 3-D
/// * `device` - The device to create the tensor on
pub fn generate_grid<B, const D: usize>(size: [usize; D], device: &B::Device) -> Tensor<B, 2>
where
    B: Backend,
{
    let total: usize = size.iter().product();
    let mut grid = Vec::with_capacity(total * D);
    let mut index = [0usize; D];
    for _ in 0..total {
        grid.extend(index.iter().map(|&i| i as f32));
        for axis in 0..D {
            index[axis] += 1;
            if index[axis] < size[axis] {
                break;
            }
            index[axis] = 0;
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * D])), device)
        .reshape([total, D])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_grid_order_is_x_fastest() {
        let device = Default::default();
        let grid = generate_grid::<TestBackend, 3>([2, 2, 2], &device);
        assert_eq!(grid.dims(), [8, 3]);
        let data = grid.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&data[0..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&data[3..6], &[1.0, 0.0, 0.0]);
        assert_eq!(&data[6..9], &[0.0, 1.0, 0.0]);
        assert_eq!(&data[21..24], &[1.0, 1.0, 1.0]);
    }
}
