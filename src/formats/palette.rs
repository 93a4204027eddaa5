//! Palette-compressed chunk format.
//!
//! Only the first node of a scene is stored. The grid is cut into cubic
//! chunks of [`CHUNK_EDGE`] voxels per side, visited z-major, then y, then x.
//! Chunks on the far edges of the grid are clipped to it rather than padded.
//! All integers are little-endian.
//!
//! ```text
//! size_x: u64, size_y: u64, size_z: u64
//! for each chunk:
//!     mode: u8                     0 = palette, 1 = fallback
//!     palette:
//!         palette_count: u16
//!         palette_count x (color: 3 x f32, id: u32)
//!         ceil(cells * INDEX_BITS / 8) bytes of indices, packed LSB-first
//!     fallback:
//!         cells x (color: 3 x f32, id: u32)
//! ```
//!
//! Palette entries are stored in the order they are first met while scanning
//! the chunk, so encoding is fully deterministic. A chunk holding more than
//! [`PALETTE_CAPACITY`] distinct voxels falls back to storing every voxel.

use crate::scene::grid_volume;
use crate::wire::{self, BitReader, BitWriter, ByteReader};
use crate::*;
use fxhash::FxHashMap;

/// Edge length of a chunk, in voxels.
pub const CHUNK_EDGE: u64 = 8;

/// Width of one palette index in the index stream.
pub const INDEX_BITS: u32 = 8;

/// Largest number of distinct voxels a chunk can hold in palette mode.
pub const PALETTE_CAPACITY: usize = 1 << INDEX_BITS;

const MODE_PALETTE: u8 = 0;
const MODE_FALLBACK: u8 = 1;

/// Handler of the `gvox_u32_palette` format. Holds scratch buffers that are
/// reused across chunks and calls.
#[derive(Default)]
pub struct GvoxPalette {
    lookup: FxHashMap<[u32; 4], u32>,
    palette: Vec<Voxel>,
    indices: Vec<u32>,
}

impl NamedFormat for GvoxPalette {
    fn name() -> &'static str {
        "gvox_u32_palette"
    }
}

impl FormatDescriptor for GvoxPalette {
    type Handler = Self;
}

impl FormatHandler for GvoxPalette {
    fn create() -> Result<Self, GvoxError> {
        Ok(Self::default())
    }

    fn create_payload(&mut self, scene: &Scene) -> Result<Payload, GvoxError> {
        let node = scene
            .nodes
            .first()
            .ok_or_else(|| GvoxError::invalid_format("cannot encode a scene without nodes"))?;
        if scene.nodes.len() > 1 {
            log::debug!(
                "{} only stores the first node, ignoring {} more",
                Self::name(),
                scene.nodes.len() - 1
            );
        }
        Ok(self.encode_node(node).into())
    }

    fn parse_payload(&mut self, payload: &Payload) -> Result<Scene, GvoxError> {
        self.decode(payload.as_bytes())
    }
}

/// Axis-aligned block of cells, `min` inclusive and `max` exclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Chunk {
    min: [u64; 3],
    max: [u64; 3],
}

impl Chunk {
    fn cell_count(&self) -> usize {
        (0..3).map(|axis| (self.max[axis] - self.min[axis]) as usize).product()
    }

    /// Dense-array indices of the chunk's cells in scan order.
    fn cells(self, size_x: u64, size_y: u64) -> impl Iterator<Item = usize> {
        let Chunk { min, max } = self;
        (min[2]..max[2]).flat_map(move |z| {
            (min[1]..max[1]).flat_map(move |y| {
                (min[0]..max[0]).map(move |x| (x + y * size_x + z * size_x * size_y) as usize)
            })
        })
    }
}

/// Chunks covering a grid of `size`, in stream order.
fn chunks(size: [u64; 3]) -> impl Iterator<Item = Chunk> {
    let counts = if size.contains(&0) {
        [0; 3]
    } else {
        size.map(|s| s.div_ceil(CHUNK_EDGE))
    };
    (0..counts[2]).flat_map(move |cz| {
        (0..counts[1]).flat_map(move |cy| {
            (0..counts[0]).map(move |cx| {
                let min = [cx * CHUNK_EDGE, cy * CHUNK_EDGE, cz * CHUNK_EDGE];
                let mut max = [0; 3];
                for axis in 0..3 {
                    max[axis] = min[axis].saturating_add(CHUNK_EDGE).min(size[axis]);
                }
                Chunk { min, max }
            })
        })
    })
}

impl GvoxPalette {
    fn encode_node(&mut self, node: &SceneNode) -> Vec<u8> {
        let size = [node.size_x(), node.size_y(), node.size_z()];
        let mut out = Vec::with_capacity(24 + node.voxel_count());
        for axis_size in size {
            wire::put_u64(&mut out, axis_size);
        }
        for chunk in chunks(size) {
            self.encode_chunk(node, chunk, &mut out);
        }
        out
    }

    /// Fills `palette` and `indices` for the given cells. Returns `false` as
    /// soon as the palette would exceed its capacity.
    fn build_palette(&mut self, voxels: &[Voxel], cells: impl Iterator<Item = usize>) -> bool {
        self.lookup.clear();
        self.palette.clear();
        self.indices.clear();
        for i in cells {
            let voxel = voxels[i];
            let next = self.palette.len() as u32;
            let index = *self.lookup.entry(voxel.key()).or_insert(next);
            if index == next {
                if self.palette.len() == PALETTE_CAPACITY {
                    return false;
                }
                self.palette.push(voxel);
            }
            self.indices.push(index);
        }
        true
    }

    fn encode_chunk(&mut self, node: &SceneNode, chunk: Chunk, out: &mut Vec<u8>) {
        let voxels = node.voxels();
        let (size_x, size_y) = (node.size_x(), node.size_y());
        if self.build_palette(voxels, chunk.cells(size_x, size_y)) {
            wire::put_u8(out, MODE_PALETTE);
            wire::put_u16(out, self.palette.len() as u16);
            for voxel in &self.palette {
                wire::put_voxel(out, voxel);
            }
            let mut bits = BitWriter::new(out);
            for &index in &self.indices {
                bits.write(index, INDEX_BITS);
            }
        } else {
            wire::put_u8(out, MODE_FALLBACK);
            for i in chunk.cells(size_x, size_y) {
                wire::put_voxel(out, &voxels[i]);
            }
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<Scene, GvoxError> {
        let mut reader = ByteReader::new(bytes);
        let size = [reader.u64()?, reader.u64()?, reader.u64()?];
        // Every cell costs at least one index, which bounds the volume a
        // well-formed payload of this length can declare.
        let volume = grid_volume(size[0], size[1], size[2])
            .filter(|&volume| {
                volume
                    .checked_mul(INDEX_BITS as usize)
                    .is_some_and(|bits| bits.div_ceil(8) <= reader.remaining())
            })
            .ok_or_else(|| {
                GvoxError::invalid_format(format!(
                    "grid of {}x{}x{} does not fit in a payload of {} bytes",
                    size[0],
                    size[1],
                    size[2],
                    bytes.len()
                ))
            })?;

        let mut voxels = vec![Voxel::default(); volume];
        for chunk in chunks(size) {
            self.decode_chunk(&mut reader, chunk, size, &mut voxels)?;
        }
        if !reader.is_at_end() {
            return Err(GvoxError::invalid_format(format!(
                "{} trailing bytes after the last chunk",
                reader.remaining()
            )));
        }
        SceneNode::from_voxels(size[0], size[1], size[2], voxels)
            .map(Scene::from_node)
            .ok_or_else(|| GvoxError::invalid_format("decoded voxel count mismatch"))
    }

    fn decode_chunk(
        &mut self,
        reader: &mut ByteReader<'_>,
        chunk: Chunk,
        size: [u64; 3],
        voxels: &mut [Voxel],
    ) -> Result<(), GvoxError> {
        let cells = chunk.cells(size[0], size[1]);
        match reader.u8()? {
            MODE_PALETTE => {
                let count = reader.u16()? as usize;
                if count == 0 || count > PALETTE_CAPACITY {
                    return Err(GvoxError::invalid_format(format!(
                        "chunk at {:?} declares a palette of {count} entries",
                        chunk.min
                    )));
                }
                self.palette.clear();
                for _ in 0..count {
                    self.palette.push(reader.voxel()?);
                }
                let index_bytes = reader.take(wire::packed_len(chunk.cell_count(), INDEX_BITS))?;
                let mut bits = BitReader::new(index_bytes);
                for i in cells {
                    let index = bits.read(INDEX_BITS)? as usize;
                    voxels[i] = *self.palette.get(index).ok_or_else(|| {
                        GvoxError::invalid_format(format!(
                            "palette index {index} out of range for a palette of {count} in chunk at {:?}",
                            chunk.min
                        ))
                    })?;
                }
            }
            MODE_FALLBACK => {
                for i in cells {
                    voxels[i] = reader.voxel()?;
                }
            }
            mode => {
                return Err(GvoxError::invalid_format(format!(
                    "unknown chunk mode {mode} in chunk at {:?}",
                    chunk.min
                )))
            }
        }
        Ok(())
    }
}
