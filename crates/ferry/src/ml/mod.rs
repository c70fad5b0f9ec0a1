//! Linear algebra, nearest-neighbour search & statistics

pub mod gauss;
pub mod kdtree;
pub mod matrix;
pub mod probability;
pub mod regression;

#[allow(dead_code)]
fn all_close(lhs: &[f64], rhs: &[f64], eps: f64) -> bool {
    lhs.len() == rhs.len()
        && lhs
            .iter()
            .zip(rhs.iter())
            .all(|(l, r)| (l - r).abs() <= eps)
}

pub fn mean(slice: &[f64]) -> f64 {
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Sample standard deviation (N - 1 degrees of freedom). Undefined for
/// fewer than two observations
pub fn std(slice: &[f64]) -> Option<f64> {
    if slice.len() < 2 {
        return None;
    }
    let mean = mean(slice);
    let x = slice.iter().fold(0.0, |acc, x| acc + (x - mean).powi(2));
    Some((x / (slice.len() - 1) as f64).sqrt())
}

/// Median of the finite values in `slice`, or `None` if there are none
pub fn median<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let mut values = values
        .into_iter()
        .filter(|x| x.is_finite())
        .collect::<Vec<_>>();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    match values.len() % 2 {
        0 => Some((values[mid - 1] + values[mid]) / 2.0),
        _ => Some(values[mid]),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn median_ignores_nan() {
        assert_eq!(median([3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median([4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median([f64::NAN, 1.0, 5.0]), Some(3.0));
        assert_eq!(median([f64::NAN, f64::INFINITY]), None);
        assert_eq!(median(Vec::new()), None);
    }

    #[test]
    fn sample_std() {
        assert_eq!(std(&[1.0]), None);
        let s = std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((s - 2.138089935299395).abs() < 1e-12);
    }
}
