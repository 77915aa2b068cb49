//! On-disk layout definitions.
//!
//! A graph file is a fixed 64-byte header, a layer-info array, fixed-stride
//! per-node records for the base layer, adjacency blocks for the upper
//! layers, and an optional product-quantization section whose offset is
//! recorded in the header. All integers and floats are little-endian.
//!
//! Fixed-width node records give O(1) seek to any node:
//!
//! ```text
//! header           64 bytes, CRC-protected
//! layer_info       (size u32, degree u32) x layer_count
//! node record i    vector f32 x dimension
//!                  neighbor_count u32
//!                  neighbor u32 x max_degree, padded with 0xFFFFFFFF
//! upper layer L    (ordinal u32, count u32, neighbor u32 x degree) x size_L
//! pq section       codebook_count u32, cluster_count u32,
//!                  subspace_size u32 x codebook_count,
//!                  centroids f32 x sum(size x cluster_count),
//!                  global_mean f32 x dimension   (if flagged)
//!                  codes u8 x codebook_count x size
//! ```

use crate::error::{DiskVecError, Result};
use bytemuck::{Pod, Zeroable};
use core::mem::{align_of, size_of};

/// Magic number: "DVEC".
pub const MAGIC: u32 = u32::from_le_bytes(*b"DVEC");

/// Current format version; readers reject anything else.
pub const VERSION: u32 = 1;

/// Total header size in bytes.
pub const HEADER_LEN: usize = 64;

/// Sentinel padding an unused neighbor slot.
pub const NO_NEIGHBOR: u32 = u32::MAX;

/// Header flag bits.
pub mod flags {
    /// A product-quantization section follows the graph data.
    pub const HAS_PQ: u32 = 1;
    /// The PQ section stores a global mean vector.
    pub const HAS_GLOBAL_MEAN: u32 = 1 << 1;
}

/// Fixed file header.
///
/// `header_crc` covers the full 64 bytes with the CRC field itself zeroed.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct FileHeader {
    /// Magic sentinel, always [`MAGIC`].
    pub magic: u32, // 0
    /// Format version.
    pub version: u32, // 4
    /// Number of nodes.
    pub size: u32, // 8
    /// Vector dimension.
    pub dimension: u32, // 12
    /// Entry node ordinal; [`NO_NEIGHBOR`] when the graph is empty.
    pub entry_node: u32, // 16
    /// Base-layer max degree (M).
    pub max_degree: u32, // 20
    /// Number of layers, at least 1.
    pub layer_count: u32, // 24
    /// Similarity wire code.
    pub similarity: u32, // 28
    /// Flag bits, see [`flags`].
    pub flags: u32, // 32
    /// Reserved, zero.
    pub reserved0: u32, // 36
    /// Reserved, zero.
    pub reserved1: u32, // 40
    /// Reserved, zero.
    pub reserved2: u32, // 44
    /// Byte offset of the PQ section; 0 when absent.
    pub pq_offset: u64, // 48
    /// CRC32 of the header bytes.
    pub header_crc: u32, // 56
    /// Reserved, zero.
    pub reserved3: u32, // 60
}

const _: () = assert!(size_of::<FileHeader>() == HEADER_LEN);
const _: () = assert!(align_of::<FileHeader>() == 8);

impl FileHeader {
    /// The raw header bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; HEADER_LEN] {
        bytemuck::cast_ref(self)
    }

    /// Parses a header from raw bytes without validating it.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        bytemuck::pod_read_unaligned(bytes)
    }

    /// CRC32 over the header with the CRC field zeroed.
    #[must_use]
    pub fn compute_crc(&self) -> u32 {
        let mut copy = *self;
        copy.header_crc = 0;
        crc32fast::hash(copy.as_bytes())
    }

    /// Stamps `header_crc`.
    pub fn update_checksum(&mut self) {
        self.header_crc = self.compute_crc();
    }

    /// Validates magic, version, checksum, and basic field sanity.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Corrupt`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(DiskVecError::Corrupt(format!(
                "bad magic 0x{:08x}",
                self.magic
            )));
        }
        if self.version != VERSION {
            return Err(DiskVecError::Corrupt(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.header_crc != self.compute_crc() {
            return Err(DiskVecError::Corrupt("header checksum mismatch".into()));
        }
        if self.layer_count == 0 {
            return Err(DiskVecError::Corrupt("layer count must be at least 1".into()));
        }
        if self.dimension == 0 {
            return Err(DiskVecError::Corrupt("dimension must be positive".into()));
        }
        if self.size == 0 {
            if self.entry_node != NO_NEIGHBOR {
                return Err(DiskVecError::Corrupt(
                    "empty graph must have no entry node".into(),
                ));
            }
        } else if self.entry_node >= self.size {
            return Err(DiskVecError::Corrupt(format!(
                "entry node {} out of bounds for size {}",
                self.entry_node, self.size
            )));
        }
        Ok(())
    }
}

/// Per-layer directory entry.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct LayerInfo {
    /// Number of nodes that are members of the layer.
    pub size: u32,
    /// Max degree of the layer.
    pub degree: u32,
}

const _: () = assert!(size_of::<LayerInfo>() == 8);

/// Byte length of one base-layer node record.
#[must_use]
pub fn node_record_len(dimension: usize, max_degree: usize) -> usize {
    4 * dimension + 4 + 4 * max_degree
}

/// Byte length of one upper-layer adjacency entry.
#[must_use]
pub fn upper_entry_len(degree: usize) -> usize {
    8 + 4 * degree
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> FileHeader {
        let mut h = FileHeader {
            magic: MAGIC,
            version: VERSION,
            size: 10,
            dimension: 4,
            entry_node: 3,
            max_degree: 8,
            layer_count: 1,
            similarity: 1,
            flags: 0,
            reserved0: 0,
            reserved1: 0,
            reserved2: 0,
            pq_offset: 0,
            header_crc: 0,
            reserved3: 0,
        };
        h.update_checksum();
        h
    }

    #[test]
    fn test_header_roundtrip() {
        let h = sample_header();
        let parsed = FileHeader::from_bytes(h.as_bytes());
        parsed.validate().unwrap();
        assert_eq!(parsed.size, 10);
        assert_eq!(parsed.entry_node, 3);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut h = sample_header();
        h.magic = 0xDEAD_BEEF;
        h.update_checksum();
        assert!(matches!(h.validate(), Err(DiskVecError::Corrupt(_))));
    }

    #[test]
    fn test_header_rejects_unknown_version() {
        let mut h = sample_header();
        h.version = VERSION + 1;
        h.update_checksum();
        assert!(h.validate().is_err());
    }

    #[test]
    fn test_header_rejects_checksum_mismatch() {
        let mut h = sample_header();
        h.size = 999; // not re-stamped
        assert!(h.validate().is_err());
    }

    #[test]
    fn test_header_rejects_out_of_bounds_entry() {
        let mut h = sample_header();
        h.entry_node = 10;
        h.update_checksum();
        assert!(h.validate().is_err());
    }

    #[test]
    fn test_record_len() {
        assert_eq!(node_record_len(4, 8), 16 + 4 + 32);
        assert_eq!(upper_entry_len(8), 8 + 32);
    }
}
