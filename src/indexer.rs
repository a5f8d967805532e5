//! Selection decomposition: turning a selection into per-chunk operations
//!
//! [`decompose`] resolves a [`Selection`] against the array and chunk shapes
//! and returns a lazy, restartable iterator of [`ChunkOperation`]s. Each
//! operation names one chunk, the region of that chunk involved, and the
//! corresponding region of the caller's buffer.
//!
//! Outer-product selections are projected per dimension and the projections
//! are combined lazily in row-major order (last dimension fastest), so the
//! number of chunks touched never has to be materialized. Vectorized
//! selections are grouped by owning chunk, keeping request order within each
//! group.

use crate::buffer::c_strides;
use crate::error::{ArrayError, Result};
use crate::selection::{NormalizedDim, NormalizedSelection, Selection};
use std::collections::{BTreeMap, BTreeSet};

/// Row-major odometer over the positions of a multi-dimensional grid
#[derive(Debug, Clone)]
pub struct CartesianProduct {
    lens: Vec<u64>,
    next: Option<Vec<u64>>,
}

impl CartesianProduct {
    pub fn new(lens: Vec<u64>) -> Self {
        let next = if lens.iter().any(|&l| l == 0) {
            None
        } else {
            Some(vec![0; lens.len()])
        };
        Self { lens, next }
    }
}

impl Iterator for CartesianProduct {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut succ = current.clone();
        for dim in (0..self.lens.len()).rev() {
            succ[dim] += 1;
            if succ[dim] < self.lens[dim] {
                self.next = Some(succ);
                return Some(current);
            }
            succ[dim] = 0;
        }
        Some(current)
    }
}

/// The positions selected along one dimension of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimRegion {
    /// `start..stop` every `step`
    Range { start: u64, stop: u64, step: u64 },
    /// Explicit positions in iteration order
    Points(Vec<u64>),
}

impl DimRegion {
    /// Build from explicit positions, collapsing a unit-step run to a range
    fn from_points(points: Vec<u64>) -> Self {
        let contiguous = points.windows(2).all(|w| w[1] == w[0] + 1);
        match (contiguous, points.first(), points.last()) {
            (true, Some(&first), Some(&last)) => DimRegion::Range {
                start: first,
                stop: last + 1,
                step: 1,
            },
            _ => DimRegion::Points(points),
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            DimRegion::Range { start, stop, step } => {
                if stop > start {
                    (stop - start).div_ceil(*step)
                } else {
                    0
                }
            }
            DimRegion::Points(points) => points.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selected positions in iteration order
    pub fn indices(&self) -> Vec<u64> {
        match self {
            DimRegion::Range { start, stop, step } => {
                (*start..*stop).step_by(*step as usize).collect()
            }
            DimRegion::Points(points) => points.clone(),
        }
    }

    /// True if every position in `0..extent` is selected
    fn covers(&self, extent: u64) -> bool {
        match self {
            DimRegion::Range { start, stop, step } => {
                *start == 0 && (*step == 1 || extent <= 1) && *stop >= extent
            }
            DimRegion::Points(points) => {
                let distinct: BTreeSet<u64> = points.iter().copied().collect();
                distinct.len() as u64 == extent && distinct.iter().all(|&p| p < extent)
            }
        }
    }
}

/// A region of a buffer, in that buffer's own coordinate space
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionSelection {
    /// Outer product of per-dimension regions
    Orthogonal(Vec<DimRegion>),
    /// Explicit points, each one coordinate per dimension
    Coordinates(Vec<Vec<u64>>),
}

impl RegionSelection {
    pub fn num_elements(&self) -> u64 {
        match self {
            RegionSelection::Orthogonal(dims) => dims.iter().map(DimRegion::len).product(),
            RegionSelection::Coordinates(points) => points.len() as u64,
        }
    }

    /// Linear element offsets of the region within a buffer of `shape`,
    /// in the region's iteration order.
    pub fn offsets<'a>(&'a self, shape: &[u64]) -> Box<dyn Iterator<Item = u64> + Send + 'a> {
        let strides = c_strides(shape);
        match self {
            RegionSelection::Orthogonal(dims) => {
                let lists: Vec<Vec<u64>> = dims.iter().map(DimRegion::indices).collect();
                let lens = lists.iter().map(|list| list.len() as u64).collect();
                Box::new(CartesianProduct::new(lens).map(move |pos| {
                    pos.iter()
                        .zip(&lists)
                        .zip(&strides)
                        .map(|((&p, list), &stride)| list[p as usize] * stride)
                        .sum()
                }))
            }
            RegionSelection::Coordinates(points) => Box::new(points.iter().map(move |point| {
                point
                    .iter()
                    .zip(&strides)
                    .map(|(&i, &stride)| i * stride)
                    .sum()
            })),
        }
    }

    /// True if the region selects every position of a buffer of `extent`
    pub fn covers(&self, extent: &[u64]) -> bool {
        match self {
            RegionSelection::Orthogonal(dims) => {
                dims.len() == extent.len() && dims.iter().zip(extent).all(|(d, &e)| d.covers(e))
            }
            RegionSelection::Coordinates(points) => {
                let distinct: BTreeSet<&Vec<u64>> = points.iter().collect();
                distinct.len() as u64 == extent.iter().product::<u64>()
                    && distinct
                        .iter()
                        .all(|p| p.iter().zip(extent).all(|(&i, &e)| i < e))
            }
        }
    }
}

/// One unit of work produced by decomposition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOperation {
    /// Grid coordinates of the chunk
    pub chunk_coords: Vec<u64>,
    /// Region within the chunk, in chunk-local coordinates
    pub chunk_selection: RegionSelection,
    /// Matching region of the caller's buffer, by parallel position
    pub out_selection: RegionSelection,
}

#[derive(Debug, Clone)]
struct DimProjection {
    chunk_index: u64,
    chunk_region: DimRegion,
    out_region: DimRegion,
}

/// The chunk projections of one dimension, indexable without materializing
/// one entry per chunk for ranges.
#[derive(Debug, Clone)]
enum DimProjections {
    Range {
        start: u64,
        stop: u64,
        step: u64,
        chunk_len: u64,
    },
    Explicit(Vec<DimProjection>),
}

impl DimProjections {
    fn new(dim: &NormalizedDim, chunk_len: u64) -> Self {
        match dim {
            NormalizedDim::Index(i) => {
                let local = i % chunk_len;
                DimProjections::Explicit(vec![DimProjection {
                    chunk_index: i / chunk_len,
                    chunk_region: DimRegion::Range {
                        start: local,
                        stop: local + 1,
                        step: 1,
                    },
                    out_region: DimRegion::Range {
                        start: 0,
                        stop: 1,
                        step: 1,
                    },
                }])
            }
            NormalizedDim::Range { start, stop, step } => DimProjections::Range {
                start: *start,
                stop: *stop,
                step: *step,
                chunk_len,
            },
            NormalizedDim::Points(points) => {
                let mut grouped: BTreeMap<u64, (Vec<u64>, Vec<u64>)> = BTreeMap::new();
                for (out_pos, &p) in points.iter().enumerate() {
                    let entry = grouped.entry(p / chunk_len).or_default();
                    entry.0.push(p % chunk_len);
                    entry.1.push(out_pos as u64);
                }
                DimProjections::Explicit(
                    grouped
                        .into_iter()
                        .map(|(chunk_index, (locals, outs))| DimProjection {
                            chunk_index,
                            chunk_region: DimRegion::from_points(locals),
                            out_region: DimRegion::from_points(outs),
                        })
                        .collect(),
                )
            }
        }
    }

    fn len(&self) -> u64 {
        match self {
            DimProjections::Range {
                start,
                stop,
                step,
                chunk_len,
            } => {
                if stop <= start {
                    0
                } else if step > chunk_len {
                    // every selected position lies in its own chunk
                    (stop - start).div_ceil(*step)
                } else {
                    let last = start + ((stop - start - 1) / step) * step;
                    last / chunk_len - start / chunk_len + 1
                }
            }
            DimProjections::Explicit(projections) => projections.len() as u64,
        }
    }

    fn get(&self, i: u64) -> DimProjection {
        match self {
            DimProjections::Range {
                start,
                stop,
                step,
                chunk_len,
            } => {
                let (start, stop, step, chunk_len) = (*start, *stop, *step, *chunk_len);
                let pos = if step > chunk_len {
                    start + i * step
                } else {
                    let chunk_origin = (start / chunk_len + i) * chunk_len;
                    let from = start.max(chunk_origin);
                    start + (from - start).div_ceil(step) * step
                };
                let chunk_index = pos / chunk_len;
                let chunk_origin = chunk_index * chunk_len;
                let end = stop.min(chunk_origin + chunk_len);
                let n = (end - pos).div_ceil(step);
                let local = pos - chunk_origin;
                let out_start = (pos - start) / step;
                DimProjection {
                    chunk_index,
                    chunk_region: DimRegion::Range {
                        start: local,
                        stop: local + (n - 1) * step + 1,
                        step,
                    },
                    out_region: DimRegion::Range {
                        start: out_start,
                        stop: out_start + n,
                        step: 1,
                    },
                }
            }
            DimProjections::Explicit(projections) => projections[i as usize].clone(),
        }
    }
}

type PointGroup = (Vec<u64>, Vec<(Vec<u64>, u64)>);

#[derive(Debug, Clone)]
enum Operations {
    Outer {
        projections: Vec<DimProjections>,
        product: CartesianProduct,
    },
    Vectorized {
        groups: std::vec::IntoIter<PointGroup>,
    },
}

/// Lazy, restartable (`Clone`) sequence of chunk operations
#[derive(Debug, Clone)]
pub struct ChunkOperations {
    inner: Operations,
}

impl Iterator for ChunkOperations {
    type Item = ChunkOperation;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Operations::Outer {
                projections,
                product,
            } => {
                let pos = product.next()?;
                let parts: Vec<DimProjection> = pos
                    .iter()
                    .zip(projections.iter())
                    .map(|(&p, dim)| dim.get(p))
                    .collect();
                Some(ChunkOperation {
                    chunk_coords: parts.iter().map(|p| p.chunk_index).collect(),
                    chunk_selection: RegionSelection::Orthogonal(
                        parts.iter().map(|p| p.chunk_region.clone()).collect(),
                    ),
                    out_selection: RegionSelection::Orthogonal(
                        parts.into_iter().map(|p| p.out_region).collect(),
                    ),
                })
            }
            Operations::Vectorized { groups } => {
                let (chunk_coords, members) = groups.next()?;
                let (locals, outs): (Vec<_>, Vec<_>) = members.into_iter().unzip();
                Some(ChunkOperation {
                    chunk_coords,
                    chunk_selection: RegionSelection::Coordinates(locals),
                    out_selection: RegionSelection::Coordinates(
                        outs.into_iter().map(|o| vec![o]).collect(),
                    ),
                })
            }
        }
    }
}

/// Decompose a selection into per-chunk operations.
///
/// Fails with an index error, before any I/O, if the selection is malformed
/// or out of bounds.
pub fn decompose(
    selection: &Selection,
    shape: &[u64],
    chunk_shape: &[u64],
) -> Result<ChunkOperations> {
    if shape.len() != chunk_shape.len() {
        return Err(ArrayError::validation(format!(
            "array rank {} does not match chunk rank {}",
            shape.len(),
            chunk_shape.len()
        )));
    }
    if chunk_shape.contains(&0) {
        return Err(ArrayError::validation("chunk dimensions must be positive"));
    }
    let normalized = selection.normalize(shape)?;
    Ok(decompose_normalized(&normalized, chunk_shape))
}

/// Decompose an already normalized selection
pub fn decompose_normalized(
    selection: &NormalizedSelection,
    chunk_shape: &[u64],
) -> ChunkOperations {
    let inner = match selection {
        NormalizedSelection::Outer(dims) => {
            let projections: Vec<DimProjections> = dims
                .iter()
                .zip(chunk_shape)
                .map(|(dim, &c)| DimProjections::new(dim, c))
                .collect();
            let product =
                CartesianProduct::new(projections.iter().map(DimProjections::len).collect());
            Operations::Outer {
                projections,
                product,
            }
        }
        NormalizedSelection::Vectorized { points, len } => {
            let mut grouped: BTreeMap<Vec<u64>, Vec<(Vec<u64>, u64)>> = BTreeMap::new();
            for i in 0..*len {
                let (chunk, local): (Vec<u64>, Vec<u64>) = points
                    .iter()
                    .zip(chunk_shape)
                    .map(|(list, &c)| (list[i] / c, list[i] % c))
                    .unzip();
                grouped.entry(chunk).or_default().push((local, i as u64));
            }
            Operations::Vectorized {
                groups: grouped.into_iter().collect::<Vec<_>>().into_iter(),
            }
        }
    };
    ChunkOperations { inner }
}
