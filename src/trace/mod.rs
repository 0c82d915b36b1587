//! Mobility-trace ingestion.
//!
//! Parses proximity "linkdump" logs into a [`ContactGraph`]. One line per
//! node pair:
//!
//! ```text
//! <x> <y> <t1>*<t2> <t1>*<t2> ...
//! ```
//!
//! where `x` and `y` are raw endpoint ids and each `t1*t2` is one
//! proximity window. Raw endpoint ids are remapped to dense [`NodeId`]s
//! in order of first appearance. Fractional timestamps are truncated to
//! whole seconds, matching the source datasets.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::graph::{ContactGraph, Interval, NodeId};

/// Parse a linkdump trace from any reader.
pub fn parse_linkdump<R: Read>(reader: R) -> Result<ContactGraph> {
    let mut graph = ContactGraph::new();
    let mut remap: HashMap<u64, NodeId> = HashMap::new();

    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let lineno = lineno + 1;
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let x = parse_endpoint(fields.next(), lineno)?;
        let y = parse_endpoint(fields.next(), lineno)?;

        let a = intern(&mut graph, &mut remap, x);
        let b = intern(&mut graph, &mut remap, y);

        for field in fields {
            let interval = parse_interval(field, lineno)?;
            graph.add_contact(a, b, interval)?;
        }
        debug!(line = lineno, node_a = %a, node_b = %b, "parsed contact line");
    }

    info!(
        nodes = graph.node_count(),
        contacts = graph.contact_count(),
        "trace loaded"
    );
    Ok(graph)
}

/// Parse a linkdump trace file.
pub fn load_linkdump(path: impl AsRef<Path>) -> Result<ContactGraph> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SimError::Trace {
        line: 0,
        reason: format!("cannot open {}: {e}", path.display()),
    })?;
    parse_linkdump(file)
}

fn intern(graph: &mut ContactGraph, remap: &mut HashMap<u64, NodeId>, raw: u64) -> NodeId {
    if let Some(&node) = remap.get(&raw) {
        return node;
    }
    let node = NodeId::new(remap.len() as u32);
    remap.insert(raw, node);
    graph.add_node(node);
    node
}

fn parse_endpoint(field: Option<&str>, line: usize) -> Result<u64> {
    let field = field.ok_or(SimError::Trace {
        line,
        reason: "missing endpoint id".to_string(),
    })?;
    field.parse().map_err(|_| SimError::Trace {
        line,
        reason: format!("invalid endpoint id: {field:?}"),
    })
}

fn parse_interval(field: &str, line: usize) -> Result<Interval> {
    let (t1, t2) = field.split_once('*').ok_or_else(|| SimError::Trace {
        line,
        reason: format!("invalid interval (expected t1*t2): {field:?}"),
    })?;
    let start = parse_timestamp(t1, line)?;
    let end = parse_timestamp(t2, line)?;
    Interval::new(start, end).map_err(|_| SimError::Trace {
        line,
        reason: format!("empty interval: {field:?}"),
    })
}

fn parse_timestamp(field: &str, line: usize) -> Result<u64> {
    // Timestamps in the raw dumps are occasionally fractional.
    let value: f64 = field.parse().map_err(|_| SimError::Trace {
        line,
        reason: format!("invalid timestamp: {field:?}"),
    })?;
    if value < 0.0 {
        return Err(SimError::Trace {
            line,
            reason: format!("negative timestamp: {field:?}"),
        });
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_intervals() {
        let dump = "100 200 5*10 20*30\n200 300 1*2\n";
        let graph = parse_linkdump(dump.as_bytes()).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.contact_count(), 3);
        // 100 -> node 0, 200 -> node 1, 300 -> node 2
        assert_eq!(
            graph.recipients_in_range(NodeId::new(0), 7),
            vec![NodeId::new(1)]
        );
        assert_eq!(
            graph.recipients_in_range(NodeId::new(1), 25),
            vec![NodeId::new(0)]
        );
    }

    #[test]
    fn remaps_ids_in_order_of_first_appearance() {
        let dump = "900 7 1*2\n7 900 3*4\n";
        let graph = parse_linkdump(dump.as_bytes()).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert!(graph.contains(NodeId::new(0)));
        assert!(graph.contains(NodeId::new(1)));
    }

    #[test]
    fn truncates_fractional_timestamps() {
        let dump = "1 2 5.9*10.2\n";
        let graph = parse_linkdump(dump.as_bytes()).unwrap();

        assert_eq!(graph.recipients_in_range(NodeId::new(0), 6), vec![NodeId::new(1)]);
        assert!(graph.recipients_in_range(NodeId::new(0), 10).is_empty());
    }

    #[test]
    fn skips_blank_lines() {
        let dump = "\n1 2 0*5\n\n";
        let graph = parse_linkdump(dump.as_bytes()).unwrap();
        assert_eq!(graph.contact_count(), 1);
    }

    #[test]
    fn reports_line_number_on_malformed_input() {
        let dump = "1 2 0*5\n3 4 oops\n";
        let err = parse_linkdump(dump.as_bytes()).unwrap_err();
        match err {
            SimError::Trace { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_inverted_interval() {
        let dump = "1 2 10*5\n";
        assert!(parse_linkdump(dump.as_bytes()).is_err());
    }
}
