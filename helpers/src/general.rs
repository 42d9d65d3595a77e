/// mean returns the arithmetic mean of the values in x, or None if x is empty.
pub fn mean(x: &[f64]) -> Option<f64> {
    if x.is_empty() {
        return None;
    }

    Some(x.iter().sum::<f64>() / x.len() as f64)
}

/// max returns the maximum value in the array x, or None if x is empty.
pub fn max<T: std::cmp::PartialOrd + std::marker::Copy>(x: &[T]) -> Option<T> {
    let (first, rest) = x.split_first()?;

    let max_val = rest.iter().fold(
        *first,
        |val_max, &val| {
            if val_max >= val {
                val_max
            } else {
                val
            }
        },
    );
    Some(max_val)
}

/// lerp linearly interpolates between a and b. t is not clamped.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_max() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(max::<u64>(&[]), None);
        assert_eq!(max(&[3u64, 9, 4]), Some(9));
    }

    #[test]
    fn test_lerp() {
        assert_eq!(lerp(10.0, 20.0, 0.0), 10.0);
        assert_eq!(lerp(10.0, 20.0, 0.5), 15.0);
        assert_eq!(lerp(10.0, 20.0, 1.0), 20.0);
    }
}
