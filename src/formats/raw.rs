use crate::scene::grid_volume;
use crate::wire::{self, ByteReader, VOXEL_SIZE};
use crate::*;

/// Uncompressed dump of every node.
///
/// Layout: `node_count: u64`, then for each node `size_x, size_y, size_z: u64`
/// followed by its voxels as `3 x f32` colour and `u32` id, little-endian.
pub struct GvoxRaw;

impl NamedFormat for GvoxRaw {
    fn name() -> &'static str {
        "gvox_raw"
    }
}

impl FormatDescriptor for GvoxRaw {
    type Handler = Self;
}

impl FormatHandler for GvoxRaw {
    fn create() -> Result<Self, GvoxError> {
        Ok(Self)
    }

    fn create_payload(&mut self, scene: &Scene) -> Result<Payload, GvoxError> {
        Ok(encode(scene).into())
    }

    fn parse_payload(&mut self, payload: &Payload) -> Result<Scene, GvoxError> {
        decode(payload.as_bytes())
    }
}

const NODE_HEADER_SIZE: usize = 24;

pub(super) fn encode(scene: &Scene) -> Vec<u8> {
    encode_nodes(scene, VOXEL_SIZE, wire::put_voxel)
}

pub(super) fn decode(bytes: &[u8]) -> Result<Scene, GvoxError> {
    decode_nodes(bytes, VOXEL_SIZE, |reader| reader.voxel())
}

/// Writes the node table shared by the dense formats, `voxel_size` bytes per voxel.
pub(super) fn encode_nodes(
    scene: &Scene,
    voxel_size: usize,
    mut put: impl FnMut(&mut Vec<u8>, &Voxel),
) -> Vec<u8> {
    let voxel_total: usize = scene.nodes.iter().map(SceneNode::voxel_count).sum();
    let mut out =
        Vec::with_capacity(8 + scene.nodes.len() * NODE_HEADER_SIZE + voxel_total * voxel_size);
    wire::put_u64(&mut out, scene.nodes.len() as u64);
    for node in &scene.nodes {
        wire::put_u64(&mut out, node.size_x());
        wire::put_u64(&mut out, node.size_y());
        wire::put_u64(&mut out, node.size_z());
        for voxel in node.voxels() {
            put(&mut out, voxel);
        }
    }
    out
}

pub(super) fn decode_nodes(
    bytes: &[u8],
    voxel_size: usize,
    mut read: impl FnMut(&mut ByteReader) -> Result<Voxel, GvoxError>,
) -> Result<Scene, GvoxError> {
    let mut reader = ByteReader::new(bytes);
    let node_count = reader.u64()?;
    if node_count > (reader.remaining() / NODE_HEADER_SIZE) as u64 {
        return Err(GvoxError::invalid_format(format!(
            "payload declares {node_count} nodes but holds only {} bytes",
            bytes.len()
        )));
    }
    let mut scene = Scene::new();
    for _ in 0..node_count {
        let (size_x, size_y, size_z) = (reader.u64()?, reader.u64()?, reader.u64()?);
        let volume = grid_volume(size_x, size_y, size_z)
            .filter(|v| v.checked_mul(voxel_size).is_some_and(|n| n <= reader.remaining()))
            .ok_or_else(|| {
                GvoxError::invalid_format(format!(
                    "node of size {size_x}x{size_y}x{size_z} does not fit in the payload"
                ))
            })?;
        let mut voxels = Vec::with_capacity(volume);
        for _ in 0..volume {
            voxels.push(read(&mut reader)?);
        }
        let node = SceneNode::from_voxels(size_x, size_y, size_z, voxels)
            .ok_or_else(|| GvoxError::invalid_format("node voxel count mismatch"))?;
        scene.push_node(node);
    }
    if !reader.is_at_end() {
        return Err(GvoxError::invalid_format(format!(
            "{} trailing bytes after the last node",
            reader.remaining()
        )));
    }
    Ok(scene)
}
