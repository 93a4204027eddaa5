/// A single voxel: an RGB colour and an opaque material id.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Voxel {
    pub color: [f32; 3],
    pub id: u32,
}

impl Voxel {
    pub const fn new(color: [f32; 3], id: u32) -> Self {
        Self { color, id }
    }

    /// Bitwise identity of the voxel, used wherever voxels have to be hashed.
    /// Two voxels share a key only if every colour channel has the same bits.
    pub(crate) fn key(&self) -> [u32; 4] {
        [
            self.color[0].to_bits(),
            self.color[1].to_bits(),
            self.color[2].to_bits(),
            self.id,
        ]
    }
}

/// One dense voxel grid. Voxels are stored with x varying fastest, then y, then z.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneNode {
    size_x: u64,
    size_y: u64,
    size_z: u64,
    voxels: Vec<Voxel>,
}

/// Volume of a grid, or `None` if it does not fit in memory addressing.
pub(crate) fn grid_volume(size_x: u64, size_y: u64, size_z: u64) -> Option<usize> {
    let volume = size_x.checked_mul(size_y)?.checked_mul(size_z)?;
    usize::try_from(volume).ok()
}

impl SceneNode {
    /// Creates a grid filled with `Voxel::default()`.
    ///
    /// # Panics
    ///
    /// Panics if the volume overflows `usize`.
    pub fn new(size_x: u64, size_y: u64, size_z: u64) -> Self {
        let volume = grid_volume(size_x, size_y, size_z).expect("grid volume overflows usize");
        Self {
            size_x,
            size_y,
            size_z,
            voxels: vec![Voxel::default(); volume],
        }
    }

    /// Wraps an existing voxel array. Returns `None` if its length does not
    /// match the dimensions.
    pub fn from_voxels(size_x: u64, size_y: u64, size_z: u64, voxels: Vec<Voxel>) -> Option<Self> {
        if grid_volume(size_x, size_y, size_z)? != voxels.len() {
            return None;
        }
        Some(Self {
            size_x,
            size_y,
            size_z,
            voxels,
        })
    }

    pub fn size_x(&self) -> u64 {
        self.size_x
    }

    pub fn size_y(&self) -> u64 {
        self.size_y
    }

    pub fn size_z(&self) -> u64 {
        self.size_z
    }

    pub fn index(&self, x: u64, y: u64, z: u64) -> usize {
        (x + y * self.size_x + z * self.size_x * self.size_y) as usize
    }

    pub fn get(&self, x: u64, y: u64, z: u64) -> Option<&Voxel> {
        if x >= self.size_x || y >= self.size_y || z >= self.size_z {
            return None;
        }
        self.voxels.get(self.index(x, y, z))
    }

    /// Overwrites one voxel. Out-of-range coordinates are ignored and reported
    /// through the return value.
    pub fn set(&mut self, x: u64, y: u64, z: u64, voxel: Voxel) -> bool {
        if x >= self.size_x || y >= self.size_y || z >= self.size_z {
            return false;
        }
        let i = self.index(x, y, z);
        self.voxels[i] = voxel;
        true
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn voxels_mut(&mut self) -> &mut [Voxel] {
        &mut self.voxels
    }

    pub fn into_voxels(self) -> Vec<Voxel> {
        self.voxels
    }

    pub fn voxel_count(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }
}

/// An ordered list of voxel grids.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    pub nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_node(node: SceneNode) -> Self {
        Self { nodes: vec![node] }
    }

    pub fn push_node(&mut self, node: SceneNode) {
        self.nodes.push(node);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// An owned byte buffer produced by, or handed to, a format.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    data: Vec<u8>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
