//! Bicubic upscaling of coarse thermal grids
//!
//! Uses the Keys cubic convolution kernel with pixel-centre alignment and
//! edge replication, computed separably in f64. Each output is clamped to the
//! range of the 4x4 source samples it was built from, so the kernel's negative
//! lobes never ring above the hottest sample or below the coldest one. The
//! same input always yields bit-identical output.

use crate::constants::detection::CUBIC_A;

/// A dense row-major grid of interpolated temperatures
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f64>,
}

/// Source taps and weights for one destination coordinate
#[derive(Debug, Clone, Copy)]
struct Taps {
    index: [usize; 4],
    weight: [f64; 4],
}

fn cubic_weights(t: f64) -> [f64; 4] {
    let a = CUBIC_A;
    let w0 = ((a * (t + 1.0) - 5.0 * a) * (t + 1.0) + 8.0 * a) * (t + 1.0) - 4.0 * a;
    let w1 = ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0;
    let w2 = ((a + 2.0) * (1.0 - t) - (a + 3.0)) * (1.0 - t) * (1.0 - t) + 1.0;
    let w3 = 1.0 - w0 - w1 - w2;
    [w0, w1, w2, w3]
}

fn axis_taps(src_len: usize, dst_len: usize) -> Vec<Taps> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len as isize - 1;

    (0..dst_len)
        .map(|d| {
            let f = (d as f64 + 0.5) * scale - 0.5;
            let base = f.floor();
            let t = f - base;
            let base = base as isize;
            let mut index = [0usize; 4];
            for (k, slot) in index.iter_mut().enumerate() {
                *slot = (base - 1 + k as isize).clamp(0, last) as usize;
            }
            Taps {
                index,
                weight: cubic_weights(t),
            }
        })
        .collect()
}

/// Resize a row-major `rows x cols` grid to `width x height`
///
/// Every dimension must be non-zero.
pub fn resize_cubic(src: &[f32], rows: usize, cols: usize, width: usize, height: usize) -> Grid {
    debug_assert_eq!(src.len(), rows * cols);

    let x_taps = axis_taps(cols, width);
    let y_taps = axis_taps(rows, height);

    // Horizontal pass: rows x width, with the raw range under each output
    let mut horizontal = vec![0.0f64; rows * width];
    let mut low = vec![f64::INFINITY; rows * width];
    let mut high = vec![f64::NEG_INFINITY; rows * width];
    for r in 0..rows {
        let row = &src[r * cols..(r + 1) * cols];
        for (x, taps) in x_taps.iter().enumerate() {
            let at = r * width + x;
            for (&i, &w) in taps.index.iter().zip(taps.weight.iter()) {
                let sample = f64::from(row[i]);
                horizontal[at] += sample * w;
                low[at] = low[at].min(sample);
                high[at] = high[at].max(sample);
            }
        }
    }

    // Vertical pass: height x width, clamped to the 4x4 source range
    let mut values = vec![0.0f64; height * width];
    for (y, taps) in y_taps.iter().enumerate() {
        for x in 0..width {
            let mut sum = 0.0;
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for (&r, &w) in taps.index.iter().zip(taps.weight.iter()) {
                let at = r * width + x;
                sum += horizontal[at] * w;
                min = min.min(low[at]);
                max = max.max(high[at]);
            }
            values[y * width + x] = sum.clamp(min, max);
        }
    }

    Grid { width, height, values }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        for t in [0.0, 0.1, 0.25, 0.5, 0.75, 0.9] {
            let sum: f64 = cubic_weights(t).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
        // At t = 0 the kernel passes the sample through untouched
        let w = cubic_weights(0.0);
        assert!((w[1] - 1.0).abs() < 1e-12);
        assert!(w[0].abs() < 1e-12 && w[2].abs() < 1e-12 && w[3].abs() < 1e-12);
    }

    #[test]
    fn test_uniform_grid_stays_uniform() {
        let src = vec![21.5f32; 24 * 32];
        let grid = resize_cubic(&src, 24, 32, 160, 120);
        assert_eq!(grid.values.len(), 160 * 120);
        assert!(grid.values.iter().all(|v| (v - 21.5).abs() < 1e-9));
    }

    #[test]
    fn test_impulse_peaks_at_sample_centre() {
        // 5x upscale: destination pixel 5c+2 lands exactly on source sample c
        let mut src = vec![20.0f32; 4 * 4];
        src[1 * 4 + 2] = 40.0;
        let grid = resize_cubic(&src, 4, 4, 20, 20);
        let at = |x: usize, y: usize| grid.values[y * grid.width + x];
        assert!((at(12, 7) - 40.0).abs() < 1e-9);
        assert!(at(11, 7) < 40.0);
        assert!(at(12, 6) < 40.0);
    }

    #[test]
    fn test_step_edge_does_not_ring() {
        // A sharp plateau makes the unclamped kernel overshoot both levels
        let mut src = vec![20.0f32; 12 * 12];
        for r in 3..9 {
            for c in 3..9 {
                src[r * 12 + c] = 32.9;
            }
        }
        let grid = resize_cubic(&src, 12, 12, 60, 60);
        let max = grid.values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = grid.values.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(max <= f64::from(32.9f32));
        assert!(min >= 20.0);
        // The plateau interior is reproduced exactly
        assert_eq!(grid.values[30 * 60 + 30], f64::from(32.9f32));
    }

    #[test]
    fn test_deterministic() {
        let src: Vec<f32> = (0..24 * 32).map(|i| 20.0 + (i % 17) as f32 * 0.7).collect();
        let a = resize_cubic(&src, 24, 32, 160, 120);
        let b = resize_cubic(&src, 24, 32, 160, 120);
        assert_eq!(a, b);
    }
}
