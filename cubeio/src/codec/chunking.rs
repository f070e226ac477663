use std::ops::Range;

/// Resolve requested chunk sizes against an array shape.
///
/// Each chunk size is clamped to the length of its dimension (and to at least 1). With no request,
/// or a request for the wrong number of dimensions, the whole array is one chunk.
///
pub(crate) fn chunk_shape(shape: &[usize], requested: Option<&[usize]>) -> Vec<usize> {
    match requested {
        Some(chunks) if chunks.len() == shape.len() => shape
            .iter()
            .zip(chunks)
            .map(|(&len, &chunk)| chunk.clamp(1, len.max(1)))
            .collect(),
        _ => shape.iter().map(|&len| len.max(1)).collect(),
    }
}

/// Iterates over the chunks of an N dimensional array in row major order, yielding the index range
/// covered by each chunk along each dimension.
///
pub(crate) struct ChunkGrid {
    shape: Vec<usize>,
    chunks: Vec<usize>,

    /// Start index of the next chunk, or `None` when done
    next: Option<Vec<usize>>,
}

impl ChunkGrid {
    pub(crate) fn new(shape: &[usize], chunks: &[usize]) -> Self {
        let empty = shape.iter().any(|&len| len == 0);
        Self {
            shape: shape.to_vec(),
            chunks: chunks.to_vec(),
            next: if empty { None } else { Some(vec![0; shape.len()]) },
        }
    }
}

impl Iterator for ChunkGrid {
    type Item = Vec<Range<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next.take()?;
        let ranges: Vec<Range<usize>> = start
            .iter()
            .zip(self.chunks.iter().zip(&self.shape))
            .map(|(&start, (&chunk, &len))| start..(start + chunk).min(len))
            .collect();

        // Advance like an odometer, last dimension fastest
        let mut following = start;
        for dim in (0..following.len()).rev() {
            following[dim] += self.chunks[dim];
            if following[dim] < self.shape[dim] {
                self.next = Some(following);
                break;
            }
            following[dim] = 0;
        }

        Some(ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_shape() {
        assert_eq!(chunk_shape(&[10, 4, 6], None), vec![10, 4, 6]);
        assert_eq!(chunk_shape(&[10, 4, 6], Some(&[1, 4, 6])), vec![1, 4, 6]);
        assert_eq!(chunk_shape(&[10, 4, 6], Some(&[20, 0, 6])), vec![10, 1, 6]);
        assert_eq!(chunk_shape(&[10, 4, 6], Some(&[1, 1])), vec![10, 4, 6]);
        assert_eq!(chunk_shape(&[0, 4], None), vec![1, 4]);
    }

    #[test]
    fn test_grid() {
        let grid: Vec<_> = ChunkGrid::new(&[3, 4], &[2, 3]).collect();
        assert_eq!(
            grid,
            vec![
                vec![0..2, 0..3],
                vec![0..2, 3..4],
                vec![2..3, 0..3],
                vec![2..3, 3..4],
            ]
        );
    }

    #[test]
    fn test_grid_single_chunk() {
        let grid: Vec<_> = ChunkGrid::new(&[3, 4], &[3, 4]).collect();
        assert_eq!(grid, vec![vec![0..3, 0..4]]);
    }

    #[test]
    fn test_grid_scalar() {
        let grid: Vec<_> = ChunkGrid::new(&[], &[]).collect();
        assert_eq!(grid, vec![Vec::<Range<usize>>::new()]);
    }

    #[test]
    fn test_grid_empty() {
        assert_eq!(ChunkGrid::new(&[3, 0], &[1, 1]).count(), 0);
    }
}
