use super::raw;
use crate::wire;
use crate::*;

/// Each voxel packed into one `u32`: 8 bits each of red, green and blue in the
/// low bytes and the low 8 bits of the id in the high byte. Lossy; the node
/// table is the same as [`GvoxRaw`](super::GvoxRaw).
pub struct GvoxU32;

impl NamedFormat for GvoxU32 {
    fn name() -> &'static str {
        "gvox_u32"
    }
}

impl FormatDescriptor for GvoxU32 {
    type Handler = Self;
}

impl FormatHandler for GvoxU32 {
    fn create() -> Result<Self, GvoxError> {
        Ok(Self)
    }

    fn create_payload(&mut self, scene: &Scene) -> Result<Payload, GvoxError> {
        let bytes = raw::encode_nodes(scene, 4, |out, voxel| wire::put_u32(out, pack(voxel)));
        Ok(bytes.into())
    }

    fn parse_payload(&mut self, payload: &Payload) -> Result<Scene, GvoxError> {
        raw::decode_nodes(payload.as_bytes(), 4, |reader| reader.u32().map(unpack))
    }
}

fn quantize(channel: f32) -> u32 {
    (channel.clamp(0.0, 1.0) * 255.0) as u32
}

pub(crate) fn pack(voxel: &Voxel) -> u32 {
    let [r, g, b] = voxel.color.map(quantize);
    r | (g << 0x08) | (b << 0x10) | ((voxel.id & 0xff) << 0x18)
}

pub(crate) fn unpack(word: u32) -> Voxel {
    let channel = |shift: u32| ((word >> shift) & 0xff) as f32 / 255.0;
    Voxel {
        color: [channel(0x00), channel(0x08), channel(0x10)],
        id: word >> 0x18,
    }
}
