//! Array selections
//!
//! A [`Selection`] names the logical positions a read or write targets. It is
//! either an outer-product selection with one [`DimSelector`] per dimension,
//! or a vectorized selection of zipped coordinate lists. The two modes are
//! separate variants and never mix.

use crate::error::{ArrayError, Result};
use std::ops::Range;

/// Selector for a single dimension of an outer-product selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimSelector {
    /// A single index; the dimension is dropped from the output shape
    Index(i64),
    /// A strided range, numpy style. Bounds are clamped, step must be positive.
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    /// Explicit indices, possibly unsorted or repeated
    Indices(Vec<i64>),
    /// A boolean mask with one entry per position of the dimension
    Mask(Vec<bool>),
}

impl DimSelector {
    /// Select the whole dimension
    pub fn all() -> Self {
        DimSelector::Slice {
            start: None,
            stop: None,
            step: None,
        }
    }

    /// Select `start..stop` with unit step
    pub fn range(start: i64, stop: i64) -> Self {
        DimSelector::Slice {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }

    /// Select `start..stop` every `step` positions
    pub fn stepped(start: i64, stop: i64, step: i64) -> Self {
        DimSelector::Slice {
            start: Some(start),
            stop: Some(stop),
            step: Some(step),
        }
    }

    fn normalize(&self, axis: usize, len: u64) -> Result<NormalizedDim> {
        match self {
            DimSelector::Index(i) => Ok(NormalizedDim::Index(wrap_index(*i, axis, len)?)),
            DimSelector::Slice { start, stop, step } => {
                let step = step.unwrap_or(1);
                if step < 1 {
                    return Err(ArrayError::index(format!(
                        "slice step must be positive, got {step} for axis {axis}"
                    )));
                }
                let clamp = |v: i64| -> u64 {
                    let len_i = len as i64;
                    let v = if v < 0 { v + len_i } else { v };
                    v.clamp(0, len_i) as u64
                };
                let start = start.map_or(0, clamp);
                let stop = stop.map_or(len, clamp);
                Ok(NormalizedDim::Range {
                    start,
                    stop: stop.max(start),
                    step: step as u64,
                })
            }
            DimSelector::Indices(indices) => Ok(NormalizedDim::Points(
                indices
                    .iter()
                    .map(|&i| wrap_index(i, axis, len))
                    .collect::<Result<Vec<_>>>()?,
            )),
            DimSelector::Mask(mask) => {
                if mask.len() as u64 != len {
                    return Err(ArrayError::index(format!(
                        "mask of length {} does not match axis {} of size {}",
                        mask.len(),
                        axis,
                        len
                    )));
                }
                Ok(NormalizedDim::Points(
                    mask.iter()
                        .enumerate()
                        .filter(|(_, m)| **m)
                        .map(|(i, _)| i as u64)
                        .collect(),
                ))
            }
        }
    }
}

impl From<Range<u64>> for DimSelector {
    fn from(range: Range<u64>) -> Self {
        DimSelector::range(range.start as i64, range.end as i64)
    }
}

fn wrap_index(index: i64, axis: usize, len: u64) -> Result<u64> {
    let wrapped = if index < 0 { index + len as i64 } else { index };
    if wrapped < 0 || wrapped as u64 >= len {
        return Err(ArrayError::index(format!(
            "index {index} is out of bounds for axis {axis} with size {len}"
        )));
    }
    Ok(wrapped as u64)
}

/// A selection of logical array positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Outer-product selection. Missing trailing dimensions select everything.
    Outer(Vec<DimSelector>),
    /// Vectorized selection: one coordinate list per dimension, zipped into points.
    Vectorized(Vec<Vec<i64>>),
}

impl Selection {
    /// Select the entire array
    pub fn all() -> Self {
        Selection::Outer(Vec::new())
    }

    /// Select a hyper-rectangle given per-dimension ranges
    pub fn ranges(ranges: &[Range<u64>]) -> Self {
        Selection::Outer(ranges.iter().cloned().map(DimSelector::from).collect())
    }

    /// Normalize against an array shape, rejecting out-of-bounds indices.
    pub fn normalize(&self, shape: &[u64]) -> Result<NormalizedSelection> {
        match self {
            Selection::Outer(selectors) => {
                if selectors.len() > shape.len() {
                    return Err(ArrayError::index(format!(
                        "too many selectors: {} for an array of rank {}",
                        selectors.len(),
                        shape.len()
                    )));
                }
                let all = DimSelector::all();
                shape
                    .iter()
                    .enumerate()
                    .map(|(axis, &len)| selectors.get(axis).unwrap_or(&all).normalize(axis, len))
                    .collect::<Result<Vec<_>>>()
                    .map(NormalizedSelection::Outer)
            }
            Selection::Vectorized(coords) => {
                if coords.len() != shape.len() {
                    return Err(ArrayError::index(format!(
                        "vectorized selection has {} coordinate lists for an array of rank {}",
                        coords.len(),
                        shape.len()
                    )));
                }
                let n = coords.first().map_or(0, Vec::len);
                if coords.iter().any(|c| c.len() != n) {
                    return Err(ArrayError::index(
                        "vectorized coordinate lists must have equal lengths",
                    ));
                }
                coords
                    .iter()
                    .zip(shape)
                    .enumerate()
                    .map(|(axis, (list, &len))| {
                        list.iter()
                            .map(|&i| wrap_index(i, axis, len))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(|points| NormalizedSelection::Vectorized { points, len: n })
            }
        }
    }

    /// Shape of the buffer produced by reading this selection
    pub fn output_shape(&self, shape: &[u64]) -> Result<Vec<u64>> {
        Ok(self.normalize(shape)?.output_shape())
    }
}

/// A per-dimension selector resolved against the array shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedDim {
    Index(u64),
    Range { start: u64, stop: u64, step: u64 },
    Points(Vec<u64>),
}

impl NormalizedDim {
    /// Number of selected positions
    pub fn len(&self) -> u64 {
        match self {
            NormalizedDim::Index(_) => 1,
            NormalizedDim::Range { start, stop, step } => {
                if stop > start {
                    (stop - start).div_ceil(*step)
                } else {
                    0
                }
            }
            NormalizedDim::Points(points) => points.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A selection resolved against the array shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedSelection {
    Outer(Vec<NormalizedDim>),
    Vectorized { points: Vec<Vec<u64>>, len: usize },
}

impl NormalizedSelection {
    /// Output shape with integer-indexed dimensions kept as size 1
    pub fn full_output_shape(&self) -> Vec<u64> {
        match self {
            NormalizedSelection::Outer(dims) => dims.iter().map(NormalizedDim::len).collect(),
            NormalizedSelection::Vectorized { len, .. } => vec![*len as u64],
        }
    }

    /// Output shape with integer-indexed dimensions dropped
    pub fn output_shape(&self) -> Vec<u64> {
        match self {
            NormalizedSelection::Outer(dims) => dims
                .iter()
                .filter(|d| !matches!(d, NormalizedDim::Index(_)))
                .map(NormalizedDim::len)
                .collect(),
            NormalizedSelection::Vectorized { len, .. } => vec![*len as u64],
        }
    }

    pub fn num_elements(&self) -> u64 {
        self.full_output_shape().iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_normalization() {
        let sel = Selection::Outer(vec![
            DimSelector::range(1, 3),
            DimSelector::Slice {
                start: Some(-3),
                stop: None,
                step: Some(2),
            },
            DimSelector::range(5, 100),
        ]);
        let norm = sel.normalize(&[4, 10, 8]).unwrap();
        assert_eq!(
            norm,
            NormalizedSelection::Outer(vec![
                NormalizedDim::Range { start: 1, stop: 3, step: 1 },
                NormalizedDim::Range { start: 7, stop: 10, step: 2 },
                NormalizedDim::Range { start: 5, stop: 8, step: 1 },
            ])
        );
        assert_eq!(norm.output_shape(), vec![2, 2, 3]);
    }

    #[test]
    fn test_missing_dims_select_all() {
        let sel = Selection::Outer(vec![DimSelector::Index(-1)]);
        let norm = sel.normalize(&[4, 6]).unwrap();
        assert_eq!(norm.full_output_shape(), vec![1, 6]);
        assert_eq!(norm.output_shape(), vec![6]);
    }

    #[test]
    fn test_out_of_bounds() {
        let err = Selection::Outer(vec![DimSelector::Index(5)])
            .normalize(&[5])
            .unwrap_err();
        assert!(matches!(err, ArrayError::Index(_)));
        assert!(Selection::Outer(vec![DimSelector::Indices(vec![0, -6])])
            .normalize(&[5])
            .is_err());
        assert!(Selection::Outer(vec![DimSelector::all(), DimSelector::all()])
            .normalize(&[5])
            .is_err());
        assert!(Selection::Outer(vec![DimSelector::stepped(0, 4, 0)])
            .normalize(&[5])
            .is_err());
    }

    #[test]
    fn test_mask() {
        let sel = Selection::Outer(vec![DimSelector::Mask(vec![true, false, true])]);
        assert_eq!(
            sel.normalize(&[3]).unwrap(),
            NormalizedSelection::Outer(vec![NormalizedDim::Points(vec![0, 2])])
        );
        let sel = Selection::Outer(vec![DimSelector::Mask(vec![true])]);
        assert!(sel.normalize(&[3]).is_err());
    }

    #[test]
    fn test_vectorized() {
        let sel = Selection::Vectorized(vec![vec![0, 3, -1], vec![1, 1, 0]]);
        let norm = sel.normalize(&[4, 2]).unwrap();
        assert_eq!(norm.output_shape(), vec![3]);
        assert_eq!(
            norm,
            NormalizedSelection::Vectorized {
                points: vec![vec![0, 3, 3], vec![1, 1, 0]],
                len: 3
            }
        );

        assert!(Selection::Vectorized(vec![vec![0, 1], vec![0]])
            .normalize(&[4, 2])
            .is_err());
        assert!(Selection::Vectorized(vec![vec![0]]).normalize(&[4, 2]).is_err());
    }

    #[test]
    fn test_empty_slice() {
        let norm = Selection::Outer(vec![DimSelector::range(3, 1)])
            .normalize(&[5])
            .unwrap();
        assert_eq!(norm.num_elements(), 0);
    }
}
