// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Version-history reports and engine counters.

use std::collections::BTreeMap;
use std::fmt;

use crate::key::Key;
use crate::time::Timestamp;
use crate::tree::Tree;
use crate::txn::TxnStats;
use crate::value::Value;

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub txn: TxnStats,
    /// Checkpoints completed since open.
    pub checkpoints: u64,
    /// Last published checkpoint marker.
    pub marker: Timestamp,
    pub trees: usize,
    pub active_transactions: usize,
}

/// One version in an [`MvvReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub key: String,
    pub value: Value,
}

/// Every committed version under a key prefix, grouped by commit timestamp.
///
/// Reading down the groups replays the history of the subtree one commit
/// at a time, which is usually enough to spot the transaction that broke a
/// total.
#[derive(Debug, Clone, Default)]
pub struct MvvReport {
    tree: String,
    prefix: String,
    by_commit: BTreeMap<Timestamp, Vec<ReportLine>>,
}

impl MvvReport {
    /// Collects the report for keys of `tree` starting with `prefix`.
    pub fn collect(tree: &Tree, prefix: &Key) -> Self {
        let mut by_commit: BTreeMap<Timestamp, Vec<ReportLine>> = BTreeMap::new();
        for (key, versions) in tree.versions_under(prefix.encoded()) {
            let key = Key::from_encoded(&key)
                .map(|k| k.to_string())
                .unwrap_or_else(|_| format!("{key:02x?}"));
            for version in versions {
                by_commit.entry(version.commit_ts).or_default().push(ReportLine {
                    key: key.clone(),
                    value: version.value,
                });
            }
        }
        Self {
            tree: tree.name().to_string(),
            prefix: prefix.to_string(),
            by_commit,
        }
    }

    /// Total number of versions.
    pub fn len(&self) -> usize {
        self.by_commit.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_commit.is_empty()
    }

    /// Commit timestamps in ascending order.
    pub fn commits(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.by_commit.keys().copied()
    }

    /// Versions written by the commit at `ts`.
    pub fn versions_at(&self, ts: Timestamp) -> &[ReportLine] {
        self.by_commit.get(&ts).map_or(&[][..], Vec::as_slice)
    }
}

impl fmt::Display for MvvReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "versions of {}{} by commit timestamp ({} commits, {} versions)",
            self.tree,
            self.prefix,
            self.by_commit.len(),
            self.len()
        )?;
        for (ts, lines) in &self.by_commit {
            writeln!(f, "{ts:>20}")?;
            for line in lines {
                writeln!(f, "{:>20}  {} = {}", "", line.key, describe(&line.value))?;
            }
        }
        Ok(())
    }
}

/// Long strings are summarized by length.
fn describe(value: &Value) -> String {
    match value {
        Value::Str(s) if s.len() > 32 => format!("<string len={}>", s.len()),
        Value::Bytes(b) if b.len() > 32 => format!("<bytes len={}>", b.len()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{TreeId, DEFAULT_FANOUT};

    fn key(parts: &[i64]) -> Key {
        let mut key = Key::new();
        key.append("stress8txn");
        for &p in parts {
            key.append(p);
        }
        key
    }

    #[test]
    fn test_groups_by_commit() {
        let tree = Tree::new(TreeId(1), "accounts", DEFAULT_FANOUT, 64);
        tree.install_committed(key(&[1]).encoded(), Timestamp::new(5), Value::Int(10));
        tree.install_committed(key(&[2]).encoded(), Timestamp::new(5), Value::Int(-10));
        tree.install_committed(key(&[1]).encoded(), Timestamp::new(9), Value::Int(3));
        tree.install_committed(b"elsewhere", Timestamp::new(7), Value::Int(0));

        let report = MvvReport::collect(&tree, &key(&[]));
        assert_eq!(report.len(), 3);
        let commits: Vec<u64> = report.commits().map(|t| t.get()).collect();
        assert_eq!(commits, vec![5, 9]);
        assert_eq!(report.versions_at(Timestamp::new(5)).len(), 2);
        assert_eq!(
            report.versions_at(Timestamp::new(9)),
            &[ReportLine {
                key: "{\"stress8txn\",1}".into(),
                value: Value::Int(3),
            }]
        );
        assert!(report.versions_at(Timestamp::new(7)).is_empty());

        let text = report.to_string();
        assert!(text.contains("2 commits, 3 versions"));
        assert!(text.contains("{\"stress8txn\",2} = -10"));
    }

    #[test]
    fn test_long_strings_summarized() {
        assert_eq!(describe(&Value::from("x".repeat(100))), "<string len=100>");
        assert_eq!(describe(&Value::Int(4)), "4");
    }
}
