//! Memory-mapped graph view.
//!
//! [`OnDiskGraph`] validates the whole file once at open (header checksum,
//! section bounds, every neighbor reference) and then serves vectors and
//! neighbor lists straight out of the map. Fixed-width node records give
//! O(1) seek; vector slices are handed out without copying when alignment
//! and endianness permit. Upper layers are tiny and parsed eagerly.

use super::format::{
    flags, node_record_len, upper_entry_len, FileHeader, HEADER_LEN, NO_NEIGHBOR,
};
use crate::error::{DiskVecError, Result};
use crate::graph::GraphIndex;
use crate::metric::Similarity;
use crate::pq::ProductQuantizer;
use crate::vector::VectorValues;
use memmap2::Mmap;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

struct DiskPq {
    quantizer: ProductQuantizer,
    codes_offset: usize,
}

/// Read-only graph backed by a memory-mapped file.
pub struct OnDiskGraph {
    mmap: Mmap,
    size: usize,
    dimension: usize,
    max_degree: usize,
    entry: Option<u32>,
    similarity: Similarity,
    layer_count: usize,
    nodes_offset: usize,
    record_len: usize,
    /// `upper[l]` holds layer `l + 1` adjacency.
    upper: Vec<HashMap<u32, Vec<u32>>>,
    pq: Option<DiskPq>,
}

impl OnDiskGraph {
    /// Opens and fully validates a graph file.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Io`] if the file cannot be opened or
    /// mapped, and [`DiskVecError::Corrupt`] for any structural violation:
    /// bad magic or version, checksum mismatch, truncated sections, or a
    /// neighbor reference outside `[0, size)`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // The file is never mutated through this mapping, and writers
        // replace the file atomically rather than writing in place.
        let mmap = unsafe { Mmap::map(&file)? };
        let bytes: &[u8] = &mmap;
        if bytes.len() < HEADER_LEN {
            return Err(DiskVecError::Corrupt("file shorter than header".into()));
        }
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&bytes[..HEADER_LEN]);
        let header = FileHeader::from_bytes(&raw);
        header.validate()?;

        let similarity = Similarity::from_code(header.similarity).ok_or_else(|| {
            DiskVecError::Corrupt(format!("unknown similarity code {}", header.similarity))
        })?;

        let size = header.size as usize;
        let dimension = header.dimension as usize;
        let max_degree = header.max_degree as usize;
        let layer_count = header.layer_count as usize;

        // Layer directory.
        let layers_end = HEADER_LEN + 8 * layer_count;
        if bytes.len() < layers_end {
            return Err(DiskVecError::Corrupt("truncated layer directory".into()));
        }
        let mut layer_sizes = Vec::with_capacity(layer_count);
        for l in 0..layer_count {
            let at = HEADER_LEN + 8 * l;
            let l_size = read_u32(bytes, at) as usize;
            let l_degree = read_u32(bytes, at + 4) as usize;
            if l_degree != max_degree {
                return Err(DiskVecError::Corrupt(format!(
                    "layer {l} degree {l_degree} does not match max degree {max_degree}"
                )));
            }
            layer_sizes.push(l_size);
        }
        if layer_sizes.first().copied().unwrap_or(0) != size {
            return Err(DiskVecError::Corrupt(
                "base layer size does not match node count".into(),
            ));
        }

        let record_len = node_record_len(dimension, max_degree);
        let nodes_offset = layers_end;
        let nodes_end = size
            .checked_mul(record_len)
            .and_then(|n| n.checked_add(nodes_offset))
            .ok_or_else(|| DiskVecError::Corrupt("node section length overflows".into()))?;
        if bytes.len() < nodes_end {
            return Err(DiskVecError::Corrupt("truncated node records".into()));
        }

        // Base-layer neighbor validation.
        for node in 0..size {
            let rec = nodes_offset + node * record_len + 4 * dimension;
            let count = read_u32(bytes, rec) as usize;
            if count > max_degree {
                return Err(DiskVecError::Corrupt(format!(
                    "node {node} neighbor count {count} exceeds max degree"
                )));
            }
            for slot in 0..max_degree {
                let n = read_u32(bytes, rec + 4 + 4 * slot);
                let in_count = slot < count;
                if in_count && n as usize >= size {
                    return Err(DiskVecError::Corrupt(format!(
                        "node {node} references ordinal {n} beyond size {size}"
                    )));
                }
                if !in_count && n != NO_NEIGHBOR {
                    return Err(DiskVecError::Corrupt(format!(
                        "node {node} has an unpadded spare neighbor slot"
                    )));
                }
            }
        }

        // Upper layers, parsed eagerly.
        let entry_len = upper_entry_len(max_degree);
        let mut upper = Vec::with_capacity(layer_count.saturating_sub(1));
        let mut at = nodes_end;
        for (l, &l_size) in layer_sizes.iter().enumerate().skip(1) {
            let block_end = l_size
                .checked_mul(entry_len)
                .and_then(|n| n.checked_add(at))
                .ok_or_else(|| {
                    DiskVecError::Corrupt(format!("layer {l} block length overflows"))
                })?;
            if bytes.len() < block_end {
                return Err(DiskVecError::Corrupt(format!("truncated layer {l} block")));
            }
            let mut map = HashMap::with_capacity(l_size);
            for e in 0..l_size {
                let rec = at + e * entry_len;
                let ordinal = read_u32(bytes, rec);
                if ordinal as usize >= size {
                    return Err(DiskVecError::Corrupt(format!(
                        "layer {l} member {ordinal} beyond size {size}"
                    )));
                }
                let count = read_u32(bytes, rec + 4) as usize;
                if count > max_degree {
                    return Err(DiskVecError::Corrupt(format!(
                        "layer {l} member {ordinal} neighbor count {count} exceeds max degree"
                    )));
                }
                let mut neighbors = Vec::with_capacity(count);
                for slot in 0..count {
                    let n = read_u32(bytes, rec + 8 + 4 * slot);
                    if n as usize >= size {
                        return Err(DiskVecError::Corrupt(format!(
                            "layer {l} member {ordinal} references ordinal {n} beyond size {size}"
                        )));
                    }
                    neighbors.push(n);
                }
                map.insert(ordinal, neighbors);
            }
            upper.push(map);
            at = block_end;
        }

        // Optional PQ section.
        let pq = if header.flags & flags::HAS_PQ != 0 {
            if header.pq_offset as usize != at {
                return Err(DiskVecError::Corrupt(
                    "pq offset does not follow the graph data".into(),
                ));
            }
            Some(Self::parse_pq_section(bytes, at, size, dimension, &header)?)
        } else {
            if header.pq_offset != 0 {
                return Err(DiskVecError::Corrupt(
                    "pq offset set without the pq flag".into(),
                ));
            }
            None
        };

        let entry = if header.entry_node == NO_NEIGHBOR {
            None
        } else {
            Some(header.entry_node)
        };

        Ok(Self {
            mmap,
            size,
            dimension,
            max_degree,
            entry,
            similarity,
            layer_count,
            nodes_offset,
            record_len,
            upper,
            pq,
        })
    }

    fn parse_pq_section(
        bytes: &[u8],
        start: usize,
        size: usize,
        dimension: usize,
        header: &FileHeader,
    ) -> Result<DiskPq> {
        let need = |end: usize| -> Result<()> {
            if bytes.len() < end {
                Err(DiskVecError::Corrupt("truncated pq section".into()))
            } else {
                Ok(())
            }
        };
        let mut at = start;
        need(at + 8)?;
        let codebook_count = read_u32(bytes, at) as usize;
        let cluster_count = read_u32(bytes, at + 4) as usize;
        at += 8;
        if codebook_count == 0 || codebook_count > dimension {
            return Err(DiskVecError::Corrupt(format!(
                "pq codebook count {codebook_count} invalid for dimension {dimension}"
            )));
        }
        need(at + 4 * codebook_count)?;
        let mut sizes = Vec::with_capacity(codebook_count);
        for s in 0..codebook_count {
            sizes.push(read_u32(bytes, at + 4 * s) as usize);
        }
        at += 4 * codebook_count;
        if sizes.iter().sum::<usize>() != dimension {
            return Err(DiskVecError::Corrupt(
                "pq subspace sizes do not sum to the dimension".into(),
            ));
        }

        let mut codebooks = Vec::with_capacity(codebook_count);
        for &s in &sizes {
            let floats = s * cluster_count;
            need(at + 4 * floats)?;
            let mut cb = Vec::with_capacity(floats);
            for i in 0..floats {
                cb.push(read_f32(bytes, at + 4 * i));
            }
            codebooks.push(cb);
            at += 4 * floats;
        }

        let global_mean = if header.flags & flags::HAS_GLOBAL_MEAN != 0 {
            need(at + 4 * dimension)?;
            let mut mean = Vec::with_capacity(dimension);
            for i in 0..dimension {
                mean.push(read_f32(bytes, at + 4 * i));
            }
            at += 4 * dimension;
            Some(mean)
        } else {
            None
        };

        let codes_offset = at;
        need(codes_offset + codebook_count * size)?;
        let quantizer = ProductQuantizer::from_parts(sizes, cluster_count, codebooks, global_mean)?;
        Ok(DiskPq {
            quantizer,
            codes_offset,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.size
    }

    /// Similarity function the graph was built with.
    #[must_use]
    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    /// The stored PQ codec, if the file carries one.
    #[must_use]
    pub fn pq(&self) -> Option<&ProductQuantizer> {
        self.pq.as_ref().map(|p| &p.quantizer)
    }

    /// The packed PQ code region (`subspace_count` bytes per ordinal), if
    /// the file carries one.
    #[must_use]
    pub fn pq_codes(&self) -> Option<&[u8]> {
        self.pq.as_ref().map(|p| {
            let len = p.quantizer.subspace_count() * self.size;
            &self.mmap[p.codes_offset..p.codes_offset + len]
        })
    }

    fn vector_bytes(&self, node: u32) -> &[u8] {
        let at = self.nodes_offset + node as usize * self.record_len;
        &self.mmap[at..at + 4 * self.dimension]
    }

    fn neighbor_record(&self, node: u32) -> (usize, usize) {
        let rec = self.nodes_offset + node as usize * self.record_len + 4 * self.dimension;
        let count = read_u32(&self.mmap, rec) as usize;
        (rec + 4, count)
    }
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[inline]
fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl GraphIndex for OnDiskGraph {
    fn size(&self) -> usize {
        self.size
    }

    fn entry_node(&self) -> Option<u32> {
        self.entry
    }

    fn max_degree(&self) -> usize {
        self.max_degree
    }

    fn layer_count(&self) -> usize {
        self.layer_count
    }

    fn for_each_neighbor(&self, layer: usize, node: u32, visit: &mut dyn FnMut(u32)) {
        if layer == 0 {
            if (node as usize) < self.size {
                let (at, count) = self.neighbor_record(node);
                for slot in 0..count {
                    visit(read_u32(&self.mmap, at + 4 * slot));
                }
            }
        } else if let Some(neighbors) = self
            .upper
            .get(layer - 1)
            .and_then(|map| map.get(&node))
        {
            for &n in neighbors {
                visit(n);
            }
        }
    }

    fn prefers_sparse_visited(&self) -> bool {
        true
    }
}

impl VectorValues for OnDiskGraph {
    fn size(&self) -> usize {
        self.size
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vector(&self, ordinal: u32) -> Cow<'_, [f32]> {
        let bytes = self.vector_bytes(ordinal);
        #[cfg(target_endian = "little")]
        if let Ok(slice) = bytemuck::try_cast_slice::<u8, f32>(bytes) {
            return Cow::Borrowed(slice);
        }
        let mut out = Vec::with_capacity(self.dimension);
        for chunk in bytes.chunks_exact(4) {
            out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Cow::Owned(out)
    }
}
