use std::fmt;

/// Chunks along each axis of a region.
pub const REGION_CHUNKS: i32 = 32;
/// Chunk slots in one region file (32x32).
pub const SLOT_COUNT: usize = (REGION_CHUNKS * REGION_CHUNKS) as usize;

/// Chunk column position (each chunk is 16x16 blocks horizontally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The region file this chunk is stored in.
    pub const fn region(&self) -> RegionPos {
        RegionPos::of_chunk(*self)
    }

    /// Header slot of this chunk inside its region.
    pub const fn slot(&self) -> SlotIndex {
        SlotIndex::new((self.x & 0x1F) as u8, (self.z & 0x1F) as u8)
    }
}

/// Region file position. Region `(x, z)` holds chunks
/// `x*32..x*32+32` by `z*32..z*32+32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Arithmetic shift keeps negative chunks in the right region.
    pub const fn of_chunk(chunk: ChunkPos) -> Self {
        Self {
            x: chunk.x >> 5,
            z: chunk.z >> 5,
        }
    }

    /// The chunk in slot `(0, 0)`.
    pub const fn lowest_chunk(&self) -> ChunkPos {
        ChunkPos::new(self.x << 5, self.z << 5)
    }

    /// Absolute chunk position of a slot in this region.
    pub const fn chunk_at(&self, slot: SlotIndex) -> ChunkPos {
        let lowest = self.lowest_chunk();
        ChunkPos::new(lowest.x + slot.local_x() as i32, lowest.z + slot.local_z() as i32)
    }

    /// `r.X.Z.mca`
    pub fn file_name(&self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }

    /// Parse region coordinates from a file name of the form `r.X.Z.mca`.
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".mca")?;
        let parts: Vec<&str> = stem.split('.').collect();
        if parts.len() != 3 || parts[0] != "r" {
            return None;
        }
        let x = parts[1].parse().ok()?;
        let z = parts[2].parse().ok()?;
        Some(Self { x, z })
    }
}

impl fmt::Display for RegionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}.{}", self.x, self.z)
    }
}

/// A chunk slot within a region, packed as 10 bits: the low 5 are local X,
/// the high 5 are local Z. The header stores one pointer and one timestamp
/// per slot in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(u16);

impl SlotIndex {
    /// Combine local coordinates. Inputs are masked to 0..32.
    pub const fn new(local_x: u8, local_z: u8) -> Self {
        Self(((local_x & 0x1F) as u16) | (((local_z & 0x1F) as u16) << 5))
    }

    /// `None` for indices outside `0..1024`.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < SLOT_COUNT {
            Some(Self(index as u16))
        } else {
            None
        }
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    pub const fn local_x(&self) -> u8 {
        (self.0 & 0x1F) as u8
    }

    pub const fn local_z(&self) -> u8 {
        (self.0 >> 5) as u8
    }

    /// Byte offset of this slot's chunk pointer in the header.
    pub const fn pointer_offset(&self) -> usize {
        4 * self.index()
    }

    /// Byte offset of this slot's last-modified timestamp in the header.
    pub const fn timestamp_offset(&self) -> usize {
        4 * SLOT_COUNT + 4 * self.index()
    }

    /// All 1024 slots in header order.
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (0..SLOT_COUNT as u16).map(SlotIndex)
    }
}
