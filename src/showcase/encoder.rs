use crate::core::event_log::LogEntry;
use crate::core::types::{Cycle, Edge, EdgeKind, EntityId};
use anyhow::{Context, Result};
use base64::alphabet::URL_SAFE;
use base64::engine::{Engine as _, general_purpose};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Compact, interned form of an event log
///
/// Every entity id is stored once in `names`; entries refer to ids by index.
#[derive(Debug, Serialize, Deserialize)]
struct CompactLog {
    names: Vec<EntityId>,
    entries: Vec<CompactEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompactEntry {
    /// Timestamp
    t: String,
    /// Cycle as name indices
    c: Vec<u32>,
    /// Edges as (source, target, kind) with kind 0 = holds, 1 = waits-for
    e: Vec<(u32, u32, u8)>,
}

#[derive(Default)]
struct Interner {
    names: Vec<EntityId>,
    index: FxHashMap<EntityId, u32>,
}

impl Interner {
    fn intern(&mut self, id: &EntityId) -> u32 {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.names.len() as u32;
        self.names.push(id.clone());
        self.index.insert(id.clone(), idx);
        idx
    }
}

fn engine() -> general_purpose::GeneralPurpose {
    general_purpose::GeneralPurpose::new(&URL_SAFE, general_purpose::PAD)
}

/// Converts log entries to a compact, compressed, encoded string suitable for
/// URL parameters
///
/// # Arguments
/// * `entries` - Event log entries in append order
///
/// # Returns
/// A Result that contains the encoded string or an error
pub fn encode_log(entries: &[LogEntry]) -> Result<String> {
    let mut interner = Interner::default();
    let compact_entries: Vec<CompactEntry> = entries
        .iter()
        .map(|entry| CompactEntry {
            t: entry.timestamp.clone(),
            c: entry.cycle.nodes().iter().map(|id| interner.intern(id)).collect(),
            e: entry
                .edges
                .iter()
                .map(|edge| {
                    let kind = match edge.kind {
                        EdgeKind::Holds => 0,
                        EdgeKind::WaitsFor => 1,
                    };
                    (interner.intern(&edge.source), interner.intern(&edge.target), kind)
                })
                .collect(),
        })
        .collect();

    let compact = CompactLog {
        names: interner.names,
        entries: compact_entries,
    };

    // 1. Convert to MessagePack
    let msgpack = rmp_serde::to_vec(&compact).context("Failed to convert data to MessagePack")?;

    // 2. Apply Gzip compression
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&msgpack)
        .context("Failed to compress data")?;
    let compressed = encoder.finish().context("Failed to finish compression")?;

    // 3. Apply Base64URL encoding
    Ok(engine().encode(compressed))
}

/// Reverse of [`encode_log`]
pub fn decode_log(encoded: &str) -> Result<Vec<LogEntry>> {
    let compressed = engine()
        .decode(encoded)
        .context("Failed to decode Base64URL data")?;

    let mut msgpack = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut msgpack)
        .context("Failed to decompress data")?;

    let compact: CompactLog =
        rmp_serde::from_slice(&msgpack).context("Failed to parse MessagePack data")?;

    let name = |idx: u32| -> Result<EntityId> {
        compact
            .names
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Name index {idx} out of range"))
    };

    compact
        .entries
        .iter()
        .map(|entry| {
            let cycle = entry.c.iter().map(|&i| name(i)).collect::<Result<Vec<_>>>()?;
            let edges = entry
                .e
                .iter()
                .map(|&(s, t, k)| {
                    let kind = match k {
                        0 => EdgeKind::Holds,
                        1 => EdgeKind::WaitsFor,
                        other => anyhow::bail!("Unknown edge kind {other}"),
                    };
                    Ok(Edge {
                        source: name(s)?,
                        target: name(t)?,
                        kind,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(LogEntry {
                timestamp: entry.t.clone(),
                cycle: Cycle::new(cycle),
                edges,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<LogEntry> {
        vec![
            LogEntry::new(
                Cycle::new(vec!["P1".into(), "P2".into()]),
                vec![
                    Edge::holds("P1", "R1"),
                    Edge::holds("P2", "R2"),
                    Edge::waits_for("P1", "R2"),
                    Edge::waits_for("P2", "R1"),
                ],
            ),
            LogEntry::new(
                Cycle::new(vec!["P3".into()]),
                vec![Edge::waits_for("P3", "P3")],
            ),
        ]
    }

    #[test]
    fn test_encoded_log_decodes_to_the_same_entries() {
        let entries = sample();
        let encoded = encode_log(&entries).unwrap();

        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '=')
        );
        assert_eq!(decode_log(&encoded).unwrap(), entries);
    }

    #[test]
    fn test_empty_log() {
        let encoded = encode_log(&[]).unwrap();
        assert!(decode_log(&encoded).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode_log("not-a-log").is_err());
    }
}
