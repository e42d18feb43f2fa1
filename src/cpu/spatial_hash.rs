// sort-based uniform grid hash, key = hash % table size (= point count)
// entries with the same key are contiguous after a rebuild
use glam::{IVec3, Vec3};
use rayon::prelude::*;

use crate::error::{check_smoothing_radius, FluidError};

const HASH_K1: u32 = 15_823;
const HASH_K2: u32 = 9_737_333;
const HASH_K3: u32 = 440_817_757;

const fn build_neighbor_offsets() -> [IVec3; 27] {
    let mut out = [IVec3::ZERO; 27];
    let mut i = 0;
    while i < 27 {
        out[i] = IVec3::new(
            (i / 9) as i32 - 1,
            ((i / 3) % 3) as i32 - 1,
            (i % 3) as i32 - 1,
        );
        i += 1;
    }
    out
}

/// The 3x3x3 block of cell offsets around (and including) a cell.
pub const NEIGHBOR_OFFSETS: [IVec3; 27] = build_neighbor_offsets();

/// Integer cell containing `point`.
#[inline]
pub fn cell_coord(point: Vec3, cell_size: f32) -> IVec3 {
    (point / cell_size).floor().as_ivec3()
}

/// Deterministic mix of a cell's coordinates. Collisions are allowed.
#[inline]
pub fn cell_hash(cell: IVec3) -> u32 {
    let c = cell.as_uvec3();
    c.x.wrapping_mul(HASH_K1)
        .wrapping_add(c.y.wrapping_mul(HASH_K2))
        .wrapping_add(c.z.wrapping_mul(HASH_K3))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpatialHashEntry {
    pub original_index: u32,
    pub cell_hash: u32,
    pub cell_key: u32,
}

impl SpatialHashEntry {
    // sorts after every real key; only lives in the padded tail of the sort buffer
    const PADDING: Self = Self {
        original_index: u32::MAX,
        cell_hash: u32::MAX,
        cell_key: u32::MAX,
    };
}

/// Sort `items` by `key` with a bitonic network.
///
/// Each `(k, j)` stage is one parallel pass over disjoint compare-exchange
/// pairs and finishes before the next starts. The length must be a power of
/// two; callers pad with entries that sort last.
pub(crate) fn bitonic_sort_by_key<T, K, F>(items: &mut [T], key: F)
where
    T: Send,
    K: Ord,
    F: Fn(&T) -> K + Sync,
{
    let n = items.len();
    debug_assert!(n <= 1 || n.is_power_of_two(), "bitonic sort needs a power-of-two length");
    if n <= 1 {
        return;
    }

    let mut k = 2;
    while k <= n {
        let mut j = k / 2;
        while j > 0 {
            items
                .par_chunks_mut(2 * j)
                .enumerate()
                .for_each(|(chunk, block)| {
                    let base = chunk * 2 * j;
                    let (lo, hi) = block.split_at_mut(j);
                    for t in 0..j {
                        let ascending = (base + t) & k == 0;
                        let swap = if ascending {
                            key(&lo[t]) > key(&hi[t])
                        } else {
                            key(&lo[t]) < key(&hi[t])
                        };
                        if swap {
                            std::mem::swap(&mut lo[t], &mut hi[t]);
                        }
                    }
                });
            j /= 2;
        }
        k *= 2;
    }
}

/// Spatial hash over a fixed-size point set.
#[derive(Clone, Debug)]
pub struct SpatialHashGrid {
    cell_size: f32,
    table_size: u32,
    /// Sorted by `cell_key` after every rebuild.
    entries: Vec<SpatialHashEntry>,
    /// `key -> first sorted index`, or `table_size` when the key is unused.
    offsets: Vec<u32>,
    /// Power-of-two scratch space for the sort.
    sort_buffer: Vec<SpatialHashEntry>,
}

impl SpatialHashGrid {
    pub fn new(num_points: usize, cell_size: f32) -> Result<Self, FluidError> {
        if num_points == 0 {
            return Err(FluidError::NoParticles);
        }
        check_smoothing_radius(cell_size)?;
        let table_size =
            u32::try_from(num_points).map_err(|_| FluidError::TooManyPoints(num_points))?;
        if table_size == u32::MAX {
            return Err(FluidError::TooManyPoints(num_points));
        }

        let empty = SpatialHashEntry {
            original_index: 0,
            cell_hash: 0,
            cell_key: 0,
        };
        Ok(Self {
            cell_size,
            table_size,
            entries: vec![empty; num_points],
            offsets: vec![table_size; num_points],
            sort_buffer: vec![SpatialHashEntry::PADDING; num_points.next_power_of_two()],
        })
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn set_cell_size(&mut self, cell_size: f32) -> Result<(), FluidError> {
        check_smoothing_radius(cell_size)?;
        self.cell_size = cell_size;
        Ok(())
    }

    #[inline]
    pub fn table_size(&self) -> u32 {
        self.table_size
    }

    /// Offset-table value meaning "no entry has this key".
    #[inline]
    pub fn empty_slot(&self) -> u32 {
        self.table_size
    }

    #[inline]
    pub fn key_for_hash(&self, hash: u32) -> u32 {
        hash % self.table_size
    }

    pub fn entries(&self) -> &[SpatialHashEntry] {
        &self.entries
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Re-derive every entry from `points`, sort, and refill the offset table.
    pub fn rebuild(&mut self, points: &[Vec3]) -> Result<(), FluidError> {
        let n = self.table_size as usize;
        if points.len() != n {
            return Err(FluidError::LengthMismatch {
                what: "spatial hash points",
                expected: n,
                actual: points.len(),
            });
        }

        let cell_size = self.cell_size;
        let table_size = self.table_size;
        self.sort_buffer
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, slot)| {
                *slot = match points.get(i) {
                    Some(&p) => {
                        let hash = cell_hash(cell_coord(p, cell_size));
                        SpatialHashEntry {
                            original_index: i as u32,
                            cell_hash: hash,
                            cell_key: hash % table_size,
                        }
                    }
                    None => SpatialHashEntry::PADDING,
                };
            });

        bitonic_sort_by_key(&mut self.sort_buffer, |e| e.cell_key);
        self.entries.copy_from_slice(&self.sort_buffer[..n]);

        let entries = &self.entries;
        self.offsets
            .par_iter_mut()
            .enumerate()
            .for_each(|(key, offset)| {
                let key = key as u32;
                let first = entries.partition_point(|e| e.cell_key < key);
                *offset = match entries.get(first) {
                    Some(e) if e.cell_key == key => first as u32,
                    _ => table_size,
                };
            });
        Ok(())
    }

    fn for_each_with_hash(&self, hash: u32, visit: &mut impl FnMut(usize)) {
        let key = self.key_for_hash(hash);
        let start = self.offsets[key as usize];
        if start == self.empty_slot() {
            return;
        }
        for entry in &self.entries[start as usize..] {
            if entry.cell_key != key {
                break;
            }
            if entry.cell_hash == hash {
                visit(entry.original_index as usize);
            }
        }
    }

    /// Visit the original index of every point whose cell is `cell`.
    pub fn for_each_in_cell(&self, cell: IVec3, mut visit: impl FnMut(usize)) {
        self.for_each_with_hash(cell_hash(cell), &mut visit);
    }

    /// Visit every point in the 27 cells around the cell holding `point`.
    ///
    /// A neighbor cell whose hash repeats one already queried is skipped, so
    /// no index is visited twice.
    pub fn for_each_neighbor(&self, point: Vec3, mut visit: impl FnMut(usize)) {
        let origin = cell_coord(point, self.cell_size);
        let mut queried = [0u32; 27];
        let mut unique = 0;
        for offset in NEIGHBOR_OFFSETS {
            // cell_coord saturates far-away points, so the offset has to wrap
            let hash = cell_hash(origin.wrapping_add(offset));
            if queried[..unique].contains(&hash) {
                continue;
            }
            queried[unique] = hash;
            unique += 1;
            self.for_each_with_hash(hash, &mut visit);
        }
    }

    /// Collected form of [`Self::for_each_neighbor`].
    pub fn neighbors(&self, point: Vec3) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_neighbor(point, |i| out.push(i));
        out
    }
}
