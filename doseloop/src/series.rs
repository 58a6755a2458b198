// src/series.rs
//
// Fixed-horizon minute-indexed series. Length is set at construction and
// every access is bounds-checked; out-of-range indices are errors, never
// clamped or wrapped.

use crate::error::SimError;

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(horizon: usize) -> Self {
        Self {
            values: vec![0.0; horizon],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn check(&self, index: usize) -> Result<(), SimError> {
        if index >= self.values.len() {
            return Err(SimError::IndexOutOfRange {
                index,
                horizon: self.values.len(),
            });
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<f64, SimError> {
        self.check(index)?;
        Ok(self.values[index])
    }

    pub fn set(&mut self, index: usize, value: f64) -> Result<(), SimError> {
        self.check(index)?;
        self.values[index] = value;
        Ok(())
    }

    pub fn add(&mut self, index: usize, delta: f64) -> Result<(), SimError> {
        self.check(index)?;
        self.values[index] += delta;
        Ok(())
    }

    /// Add `scale * curve[i]` to `values[start + i]`; the curve is cut at the horizon.
    pub fn fold_from(
        &mut self,
        start: usize,
        scale: f64,
        curve: impl Fn(usize) -> f64,
    ) -> Result<(), SimError> {
        self.check(start)?;
        for (i, slot) in self.values[start..].iter_mut().enumerate() {
            *slot += scale * curve(i);
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_is_an_error() {
        let mut s = TimeSeries::new(10);
        assert_eq!(
            s.get(10),
            Err(SimError::IndexOutOfRange {
                index: 10,
                horizon: 10
            })
        );
        assert!(s.set(11, 1.0).is_err());
        assert!(s.add(usize::MAX, 1.0).is_err());
        assert_eq!(s.get(9), Ok(0.0));
    }

    #[test]
    fn fold_adds_from_start_to_end() {
        let mut s = TimeSeries::new(5);
        s.fold_from(2, 2.0, |i| i as f64 + 1.0).unwrap();
        assert_eq!(s.as_slice(), &[0.0, 0.0, 2.0, 4.0, 6.0]);
        s.fold_from(4, 1.0, |_| 1.0).unwrap();
        assert_eq!(s.get(4), Ok(7.0));
        assert!(s.fold_from(5, 1.0, |_| 1.0).is_err());
    }
}
