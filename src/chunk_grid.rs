//! Regular chunk grid - how an array is divided into chunks

use crate::error::{ArrayError, Result};
use crate::indexer::{decompose, ChunkOperations};
use crate::selection::Selection;
use std::ops::Range;

/// A regular grid of equally shaped chunks covering an array
///
/// Chunks along the upper edge of a dimension may extend past the array;
/// only their in-bounds part holds array data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGrid {
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
}

impl ChunkGrid {
    /// Create a grid for an array of `shape` split into `chunk_shape` chunks
    pub fn new(shape: Vec<u64>, chunk_shape: Vec<u64>) -> Result<Self> {
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
        Ok(Self::new_unchecked(shape, chunk_shape))
    }

    /// Create a grid from shapes already validated by array metadata
    pub(crate) fn new_unchecked(shape: Vec<u64>, chunk_shape: Vec<u64>) -> Self {
        Self { shape, chunk_shape }
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// Number of chunks along each dimension
    pub fn grid_shape(&self) -> Vec<u64> {
        self.shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&s, &c)| s.div_ceil(c))
            .collect()
    }

    /// Total number of chunks in the grid
    pub fn chunk_count(&self) -> u64 {
        self.grid_shape().iter().product()
    }

    /// Chunk holding the element at `index`, and the element's offset within it
    pub fn chunk_of(&self, index: &[u64]) -> Result<(Vec<u64>, Vec<u64>)> {
        if !self.is_in_bounds(index) {
            return Err(ArrayError::index(format!(
                "index {:?} is out of bounds for array of shape {:?}",
                index, self.shape
            )));
        }
        Ok(index
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&i, &c)| (i / c, i % c))
            .unzip())
    }

    /// Check if element coordinates are within the array
    pub fn is_in_bounds(&self, index: &[u64]) -> bool {
        index.len() == self.shape.len() && index.iter().zip(&self.shape).all(|(&i, &s)| i < s)
    }

    /// Check if chunk coordinates are within the grid
    pub fn is_valid_chunk(&self, chunk_coords: &[u64]) -> bool {
        chunk_coords.len() == self.shape.len()
            && chunk_coords
                .iter()
                .zip(self.grid_shape())
                .all(|(&c, g)| c < g)
    }

    /// Element ranges covered by a chunk, clipped to the array
    pub fn chunk_extent(&self, chunk_coords: &[u64]) -> Vec<Range<u64>> {
        chunk_coords
            .iter()
            .zip(self.chunk_shape.iter().zip(&self.shape))
            .map(|(&coord, (&chunk, &len))| {
                let start = (coord * chunk).min(len);
                let end = (start + chunk).min(len);
                start..end
            })
            .collect()
    }

    /// Shape of the in-bounds part of a chunk
    pub fn chunk_in_bounds_shape(&self, chunk_coords: &[u64]) -> Vec<u64> {
        self.chunk_extent(chunk_coords)
            .iter()
            .map(|r| r.end - r.start)
            .collect()
    }

    /// Convert a linear chunk index (row-major) to chunk coordinates
    pub fn chunk_index_to_coords(&self, index: u64) -> Vec<u64> {
        let grid_shape = self.grid_shape();
        let mut coords = vec![0; grid_shape.len()];
        let mut remaining = index;
        for (i, coord) in coords.iter_mut().enumerate() {
            let stride: u64 = grid_shape.iter().skip(i + 1).product();
            *coord = remaining / stride;
            remaining %= stride;
        }
        coords
    }

    /// Convert chunk coordinates to a linear chunk index (row-major)
    pub fn chunk_coords_to_index(&self, coords: &[u64]) -> u64 {
        let grid_shape = self.grid_shape();
        coords
            .iter()
            .enumerate()
            .map(|(i, &coord)| coord * grid_shape.iter().skip(i + 1).product::<u64>())
            .sum()
    }

    /// Lazily enumerate the chunks touched by `selection`, in row-major order
    ///
    /// Fails with an index error if the selection is out of bounds.
    pub fn chunks_covering(&self, selection: &Selection) -> Result<ChunkCoordsIter> {
        Ok(ChunkCoordsIter {
            operations: decompose(selection, &self.shape, &self.chunk_shape)?,
        })
    }
}

/// Iterator over chunk coordinates, see [`ChunkGrid::chunks_covering`]
#[derive(Debug, Clone)]
pub struct ChunkCoordsIter {
    operations: ChunkOperations,
}

impl Iterator for ChunkCoordsIter {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        self.operations.next().map(|op| op.chunk_coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::DimSelector;

    fn create_test_grid() -> ChunkGrid {
        ChunkGrid::new(vec![1000, 800, 500], vec![64, 64, 64]).unwrap()
    }

    #[test]
    fn test_grid_shape() {
        let grid = create_test_grid();
        assert_eq!(grid.grid_shape(), vec![16, 13, 8]);
        assert_eq!(grid.chunk_count(), 16 * 13 * 8);
    }

    #[test]
    fn test_invalid_grid() {
        assert!(ChunkGrid::new(vec![10, 10], vec![5]).is_err());
        assert!(ChunkGrid::new(vec![10], vec![0]).is_err());
    }

    #[test]
    fn test_chunk_of() {
        let grid = create_test_grid();
        let (chunk, local) = grid.chunk_of(&[130, 0, 499]).unwrap();
        assert_eq!(chunk, vec![2, 0, 7]);
        assert_eq!(local, vec![2, 0, 51]);
        assert!(matches!(
            grid.chunk_of(&[1000, 0, 0]),
            Err(ArrayError::Index(_))
        ));
    }

    #[test]
    fn test_chunk_index_conversion() {
        let grid = create_test_grid();
        let coords = vec![5, 7, 3];
        let index = grid.chunk_coords_to_index(&coords);
        assert_eq!(grid.chunk_index_to_coords(index), coords);
    }

    #[test]
    fn test_chunk_extent() {
        let grid = create_test_grid();
        assert_eq!(grid.chunk_extent(&[0, 0, 0]), vec![0..64, 0..64, 0..64]);

        // Last chunk is clipped to the array
        assert_eq!(
            grid.chunk_extent(&[15, 12, 7]),
            vec![960..1000, 768..800, 448..500]
        );
        assert_eq!(grid.chunk_in_bounds_shape(&[15, 12, 7]), vec![40, 32, 52]);
    }

    #[test]
    fn test_boundary_chunk() {
        let grid = ChunkGrid::new(vec![5], vec![2]).unwrap();
        assert_eq!(grid.grid_shape(), vec![3]);
        assert_eq!(grid.chunk_extent(&[2]), vec![4..5]);
        assert!(grid.is_valid_chunk(&[2]));
        assert!(!grid.is_valid_chunk(&[3]));
    }

    #[test]
    fn test_chunks_covering() {
        let grid = ChunkGrid::new(vec![4, 4], vec![2, 2]).unwrap();
        let chunks: Vec<_> = grid
            .chunks_covering(&Selection::ranges(&[1..3, 0..4]))
            .unwrap()
            .collect();
        assert_eq!(chunks, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);

        let chunks: Vec<_> = grid
            .chunks_covering(&Selection::Outer(vec![DimSelector::Indices(vec![3, 0])]))
            .unwrap()
            .collect();
        assert_eq!(chunks, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);

        assert!(grid
            .chunks_covering(&Selection::Outer(vec![DimSelector::Index(4)]))
            .is_err());
    }

    #[test]
    fn test_chunks_covering_is_lazy() {
        let grid = ChunkGrid::new(vec![1 << 40, 1 << 40], vec![1, 1]).unwrap();
        let first: Vec<_> = grid
            .chunks_covering(&Selection::all())
            .unwrap()
            .take(2)
            .collect();
        assert_eq!(first, vec![vec![0, 0], vec![0, 1]]);
    }
}
