//! Quadtree partitioning of index entries by extent.
//!
//! An entry's key is its quad path: the sequence of quadrants, starting from
//! the index's maximum bounds, whose cells fully contain the entry's extent.
//! A bucket at depth `d` is quadrant `d` of the path. Entries whose extent
//! straddles a quadrant boundary have a shorter path and stay in the parent
//! node, so every node's bounds cover the entries below it.

use geovc_store::Node;
use geovc_tree::Partitioner;
use geovc_types::Envelope;

/// Default deepest quadtree level.
pub const DEFAULT_QUAD_MAX_DEPTH: usize = 12;
/// Hard limit on quadtree depth, whatever an index asks for.
pub const MAX_QUAD_DEPTH: usize = 32;

/// Quadrants of the deepest cell of `max_bounds` that fully contains
/// `extent`, at most `max_depth` (and never more than [`MAX_QUAD_DEPTH`])
/// of them.
///
/// An extent outside `max_bounds` has an empty path.
pub fn quad_path(max_bounds: &Envelope, extent: &Envelope, max_depth: usize) -> Vec<u8> {
    let max_depth = max_depth.min(MAX_QUAD_DEPTH);
    let mut path = Vec::with_capacity(max_depth);
    if !max_bounds.contains(extent) {
        return path;
    }
    let mut cell = *max_bounds;
    'descend: while path.len() < max_depth {
        for quadrant in 0..4u8 {
            let Some(child) = cell.quadrant(u32::from(quadrant)) else {
                break 'descend;
            };
            if child.contains(extent) {
                path.push(quadrant);
                cell = child;
                continue 'descend;
            }
        }
        break;
    }
    path
}

/// The cell of `max_bounds` addressed by `path`.
pub fn cell_of(max_bounds: &Envelope, path: &[u8]) -> Envelope {
    path.iter().fold(*max_bounds, |cell, q| {
        cell.quadrant(u32::from(*q)).unwrap_or(cell)
    })
}

/// Routes index nodes by the quad path of their extent.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadTreePartitioner {
    max_bounds: Envelope,
    max_depth: usize,
    max_leaf_entries: usize,
}

impl QuadTreePartitioner {
    pub fn new(max_bounds: Envelope, max_depth: usize, max_leaf_entries: usize) -> Self {
        Self {
            max_bounds,
            max_depth: max_depth.min(MAX_QUAD_DEPTH),
            max_leaf_entries,
        }
    }

    pub fn max_bounds(&self) -> &Envelope {
        &self.max_bounds
    }
}

impl Partitioner for QuadTreePartitioner {
    type Key = Vec<u8>;

    fn key_of(&self, node: &Node) -> Vec<u8> {
        match &node.extent {
            Some(extent) => quad_path(&self.max_bounds, extent, self.max_depth),
            None => Vec::new(),
        }
    }

    fn bucket_of(&self, key: &Vec<u8>, depth: usize) -> Option<u32> {
        key.get(depth).map(|q| u32::from(*q))
    }

    fn max_leaf_entries(&self) -> usize {
        self.max_leaf_entries
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }
}
