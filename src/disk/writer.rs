//! Graph serialization.
//!
//! The writer renumbers live ordinals into `[0, live_count)` (sequential by
//! old order), rewrites every neighbor reference and the entry node through
//! the map, and streams the file to a temporary sibling path that is
//! renamed over the target on success. A failed write leaves no partial
//! target file behind.

#![allow(clippy::cast_possible_truncation)]

use super::format::{
    flags, node_record_len, upper_entry_len, FileHeader, LayerInfo, HEADER_LEN, MAGIC, NO_NEIGHBOR,
    VERSION,
};
use crate::error::Result;
use crate::graph::{GraphIndex, OnHeapGraph};
use crate::pq::ProductQuantizer;
use crate::vector::{DenseVectorValues, VectorValues};
use log::{debug, warn};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Serializes `graph` (and optionally a PQ codec plus codes for every live
/// vector) to `path`.
///
/// # Errors
///
/// Returns [`crate::error::DiskVecError::Io`] on filesystem failures and
/// propagates encoding errors; the target path is never left half-written.
pub fn write_graph(graph: &OnHeapGraph, pq: Option<&ProductQuantizer>, path: &Path) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let result = write_to_temp(graph, pq, &tmp).and_then(|()| {
        fs::rename(&tmp, path)?;
        Ok(())
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_to_temp(graph: &OnHeapGraph, pq: Option<&ProductQuantizer>, tmp: &Path) -> Result<()> {
    let size = graph.size();
    let dimension = graph.dimension();
    let max_degree = graph.max_degree();

    // Renumbering: live ordinals compact sequentially by old order.
    let mut remap: Vec<u32> = vec![NO_NEIGHBOR; size];
    let mut next = 0u32;
    for old in 0..size as u32 {
        if graph.has_vector(old) && !graph.is_deleted(old) {
            remap[old as usize] = next;
            next += 1;
        }
    }
    let live = next as usize;
    if live < size {
        debug!("writer dropping {} dead nodes", size - live);
    }

    let entry_node = match graph.entry_node() {
        Some(e) if remap[e as usize] != NO_NEIGHBOR => remap[e as usize],
        Some(_) => {
            // A save before cleanup can carry a deleted entry; fall back
            // to the lowest live ordinal.
            warn!("entry node is deleted; promoting the first live node");
            if live == 0 {
                NO_NEIGHBOR
            } else {
                0
            }
        }
        None => NO_NEIGHBOR,
    };

    // Upper-layer membership, in new-ordinal order.
    let layer_count = graph.layer_count();
    let mut upper_members: Vec<Vec<u32>> = Vec::with_capacity(layer_count.saturating_sub(1));
    for layer in 1..layer_count {
        let mut members: Vec<u32> = graph
            .layer(layer)
            .members()
            .into_iter()
            .filter(|&old| remap[old as usize] != NO_NEIGHBOR)
            .collect();
        members.sort_by_key(|&old| remap[old as usize]);
        upper_members.push(members);
    }

    let record_len = node_record_len(dimension, max_degree);
    let graph_end = HEADER_LEN
        + 8 * layer_count
        + live * record_len
        + upper_members
            .iter()
            .map(|m| m.len() * upper_entry_len(max_degree))
            .sum::<usize>();

    // Codes for the PQ section cover the live vectors in new order.
    let mut pq_offset = 0u64;
    let mut pq_codes = None;
    if let Some(codec) = pq {
        let mut dense = DenseVectorValues::with_capacity(dimension, live);
        for old in 0..size as u32 {
            if remap[old as usize] != NO_NEIGHBOR {
                dense.push(&graph.vectors().vector(old))?;
            }
        }
        pq_codes = Some(codec.encode_all(&dense)?);
        pq_offset = graph_end as u64;
    }

    let mut header = FileHeader {
        magic: MAGIC,
        version: VERSION,
        size: live as u32,
        dimension: dimension as u32,
        entry_node,
        max_degree: max_degree as u32,
        layer_count: layer_count as u32,
        similarity: graph.similarity().code(),
        flags: match pq {
            Some(codec) if codec.global_mean().is_some() => flags::HAS_PQ | flags::HAS_GLOBAL_MEAN,
            Some(_) => flags::HAS_PQ,
            None => 0,
        },
        reserved0: 0,
        reserved1: 0,
        reserved2: 0,
        pq_offset,
        header_crc: 0,
        reserved3: 0,
    };
    header.update_checksum();

    let file = File::create(tmp)?;
    let mut w = BufWriter::new(file);
    w.write_all(header.as_bytes())?;

    // Layer directory.
    for layer in 0..layer_count {
        let info = LayerInfo {
            size: if layer == 0 {
                live as u32
            } else {
                upper_members[layer - 1].len() as u32
            },
            degree: max_degree as u32,
        };
        w.write_all(&info.size.to_le_bytes())?;
        w.write_all(&info.degree.to_le_bytes())?;
    }

    // Base-layer records, new-ordinal order.
    for old in 0..size as u32 {
        if remap[old as usize] == NO_NEIGHBOR {
            continue;
        }
        let v = graph.vectors().vector(old);
        for &x in v.iter() {
            w.write_all(&x.to_le_bytes())?;
        }
        write_neighbor_slots(&mut w, graph, 0, old, &remap, max_degree)?;
    }

    // Upper-layer adjacency blocks.
    for (layer_idx, members) in upper_members.iter().enumerate() {
        for &old in members {
            w.write_all(&remap[old as usize].to_le_bytes())?;
            write_neighbor_slots(&mut w, graph, layer_idx + 1, old, &remap, max_degree)?;
        }
    }

    // PQ section.
    if let (Some(codec), Some(codes)) = (pq, pq_codes) {
        w.write_all(&(codec.subspace_count() as u32).to_le_bytes())?;
        w.write_all(&(codec.cluster_count() as u32).to_le_bytes())?;
        for &s in codec.sizes() {
            w.write_all(&(s as u32).to_le_bytes())?;
        }
        for s in 0..codec.subspace_count() {
            for &x in codec.codebook(s) {
                w.write_all(&x.to_le_bytes())?;
            }
        }
        if let Some(mean) = codec.global_mean() {
            for &x in mean {
                w.write_all(&x.to_le_bytes())?;
            }
        }
        w.write_all(&codes)?;
    }

    w.flush()?;
    w.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}

/// Writes `neighbor_count` then `max_degree` neighbor slots, remapped and
/// padded with [`NO_NEIGHBOR`].
fn write_neighbor_slots<W: Write>(
    w: &mut W,
    graph: &OnHeapGraph,
    layer: usize,
    old: u32,
    remap: &[u32],
    max_degree: usize,
) -> Result<()> {
    let snapshot = graph.neighbors(layer, old);
    let mut slots: Vec<u32> = Vec::with_capacity(max_degree);
    for (n, _) in snapshot.iter() {
        let t = remap[n as usize];
        // Dangling references to dead nodes are dropped here even when the
        // caller skipped cleanup.
        if t != NO_NEIGHBOR && slots.len() < max_degree {
            slots.push(t);
        }
    }
    w.write_all(&(slots.len() as u32).to_le_bytes())?;
    for &t in &slots {
        w.write_all(&t.to_le_bytes())?;
    }
    for _ in slots.len()..max_degree {
        w.write_all(&NO_NEIGHBOR.to_le_bytes())?;
    }
    Ok(())
}
