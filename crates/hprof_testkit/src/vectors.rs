//! Byte-exact dump vectors.
//!
//! Each vector names a small heap and the exact bytes a dump of it must
//! produce with a zero header timestamp and default configuration.

use crate::synthetic::SyntheticHeap;
use serde::{Deserialize, Serialize};

/// One expected dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpVector {
    /// Unique identifier, also used by [`vector_heap`].
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Expected dump bytes (hex-encoded, whitespace ignored).
    pub expected_hex: String,
}

impl DumpVector {
    /// Expected bytes.
    pub fn expected(&self) -> Vec<u8> {
        hex_decode(&self.expected_hex)
    }
}

const HEADER_HEX: &str = "4a4156412050524f46494c4520312e302e3300 00000004 00000000 00000000";
const STACK_TRACE_HEX: &str = "05 00000000 0000000c 00000000 00000000 00000000";
const HEAP_DUMP_END_HEX: &str = "2c 00000000 00000000";

/// All dump vectors.
pub fn dump_vectors() -> Vec<DumpVector> {
    vec![
        DumpVector {
            id: "empty_heap".into(),
            description: "No classes, roots or objects".into(),
            expected_hex: format!("{HEADER_HEX} {STACK_TRACE_HEX} {HEAP_DUMP_END_HEX}"),
        },
        DumpVector {
            id: "one_empty_class".into(),
            description: "One class without fields and no instances".into(),
            expected_hex: format!(
                "{HEADER_HEX} \
                 01 00000000 00000005 00400000 41 \
                 02 00000000 00000010 00000001 00001000 00000000 00400000 \
                 {STACK_TRACE_HEX} \
                 1c 00000000 0000002b \
                 20 00001000 00000000 00000000 00000000 \
                 00000000 00000000 00000000 00000000 \
                 00000000 0000 0000 0000 \
                 {HEAP_DUMP_END_HEX}"
            ),
        },
    ]
}

/// Heap that a vector describes.
pub fn vector_heap(id: &str) -> Option<SyntheticHeap> {
    match id {
        "empty_heap" => Some(SyntheticHeap::new()),
        "one_empty_class" => {
            let mut heap = SyntheticHeap::new();
            heap.add_class("A", None, &[]);
            Some(heap)
        }
        _ => None,
    }
}

/// Serializes all vectors as pretty JSON for other consumers.
pub fn vectors_json() -> String {
    serde_json::to_string_pretty(&dump_vectors()).expect("Failed to serialize vectors")
}

/// Encodes bytes as hexadecimal string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decodes hexadecimal string to bytes, ignoring whitespace.
///
/// # Panics
///
/// Panics on invalid hex.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    let hex: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("Invalid hex"))
        .collect()
}

/// Asserts that `actual` equals the vector's bytes, printing both in hex.
///
/// # Panics
///
/// Panics on mismatch.
pub fn assert_matches_vector(vector: &DumpVector, actual: &[u8]) {
    let expected = vector.expected();
    if actual != expected {
        panic!(
            "Dump vector '{}' failed:\n\
             Expected ({} bytes): {}\n\
             Actual ({} bytes): {}",
            vector.id,
            expected.len(),
            hex_encode(&expected),
            actual.len(),
            hex_encode(actual)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_vector_has_a_heap() {
        for vector in dump_vectors() {
            assert!(vector_heap(&vector.id).is_some(), "{}", vector.id);
        }
    }

    #[test]
    fn empty_vector_length() {
        let vectors = dump_vectors();
        assert_eq!(vectors[0].expected().len(), 31 + 21 + 9);
    }

    #[test]
    fn vectors_serialize() {
        let json = vectors_json();
        let parsed: Vec<DumpVector> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, dump_vectors());
    }
}
