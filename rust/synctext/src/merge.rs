//! The merge engine: last-writer-wins reconciliation of line-span edits.
//!
//! Given the merge-baseline document and the unmerged local and received
//! operations, the engine coalesces chained same-author edits, kills
//! conflict losers by timestamp (author id as tiebreak), and applies the
//! survivors per line with running column offsets. The engine is total:
//! stale or misaligned operations are dropped, never raised.

use std::collections::BTreeMap;

use crate::document::Line;
use crate::wire::Op;

/// Do two operations contend for the same span?
///
/// Distinct lines never overlap. Two pure inserts at the same column do
/// (there is no way to order them spatially). Otherwise the half-open
/// column intervals `[cs, cs + len(old))` must intersect.
pub fn overlaps(a: &Op, b: &Op) -> bool {
    if a.line != b.line {
        return false;
    }
    if a.old.is_empty() && b.old.is_empty() && a.cs == b.cs {
        return true;
    }
    let a_end = a.cs + a.old.len() as i32;
    let b_end = b.cs + b.old.len() as i32;
    !(a_end <= b.cs || b_end <= a.cs)
}

/// LWW order: larger timestamp wins; equal timestamps fall back to the
/// lexicographically smaller author id, which is stable across peers.
pub fn newer_wins(a: &Op, b: &Op) -> bool {
    if a.ts != b.ts {
        return a.ts > b.ts;
    }
    a.uid < b.uid
}

/// Apply one operation to a line (simple, offset-free variant).
///
/// Empty lines take the new text wholesale; an out-of-range span leaves the
/// line untouched. The offset-tracking application inside [`merge_into`] is
/// authoritative; this applier exists for single-op uses and tests.
pub fn apply_to_line(cur: &[u8], op: &Op) -> Vec<u8> {
    if cur.is_empty() {
        return op.new.clone();
    }
    let start = op.cs.max(0);
    let end = op.ce.min(cur.len() as i32 - 1);
    if start > end {
        return cur.to_vec();
    }
    let mut out = cur[..start as usize].to_vec();
    out.extend_from_slice(&op.new);
    if end + 1 < cur.len() as i32 {
        out.extend_from_slice(&cur[(end + 1) as usize..]);
    }
    out
}

/// Merge all unmerged operations into `lines`.
///
/// Both buffers are drained unconditionally. Returns true if any operation
/// survived conflict resolution (the caller then writes the document back,
/// even when every survivor turned out stale; a rewrite of identical
/// content is harmless and keeps the bookkeeping uniform).
pub fn merge_into(
    lines: &mut Vec<Line>,
    local_unmerged: &mut Vec<Op>,
    recv_unmerged: &mut Vec<Op>,
) -> bool {
    if local_unmerged.is_empty() && recv_unmerged.is_empty() {
        return false;
    }

    let mut all: Vec<Op> = Vec::with_capacity(local_unmerged.len() + recv_unmerged.len());
    all.append(local_unmerged);
    all.append(recv_unmerged);

    let absorbed = coalesce_chains(&mut all);
    let alive = resolve_conflicts(&all, &absorbed);

    let mut by_line: BTreeMap<u32, Vec<Op>> = BTreeMap::new();
    let mut winners = 0usize;
    for (i, op) in all.into_iter().enumerate() {
        if alive[i] {
            winners += 1;
            by_line.entry(op.line).or_default().push(op);
        }
    }

    for (line_no, mut ops) in by_line {
        while lines.len() <= line_no as usize {
            lines.push(Vec::new());
        }
        apply_line_ops(&mut lines[line_no as usize], &mut ops);
    }

    winners > 0
}

/// Fold chains of same-author edits at the same position.
///
/// A rapid `10 → 11 → 12` sequence arrives as two operations whose spans
/// overlap each other; without folding, LWW would keep only the last one,
/// whose `old_text` no longer matches the baseline. Whenever a later
/// operation's `old_text` equals an earlier one's `new_text` (same line,
/// author, and start column), the earlier absorbs it: it takes the later
/// `new_text` and timestamp, and the later is marked absorbed. Absorption
/// chains transitively through the pair scan.
fn coalesce_chains(all: &mut [Op]) -> Vec<bool> {
    let mut absorbed = vec![false; all.len()];
    for i in 0..all.len() {
        for j in (i + 1)..all.len() {
            if absorbed[i] || absorbed[j] {
                continue;
            }
            let (head, tail) = all.split_at_mut(j);
            let (a, b) = (&mut head[i], &tail[0]);
            if a.line == b.line && a.uid == b.uid && a.cs == b.cs && a.new == b.old {
                a.new = b.new.clone();
                a.ts = b.ts;
                absorbed[j] = true;
            }
        }
    }
    absorbed
}

/// Kill conflict losers, leaving at most one survivor per contended span.
fn resolve_conflicts(all: &[Op], absorbed: &[bool]) -> Vec<bool> {
    let mut alive: Vec<bool> = absorbed.iter().map(|&a| !a).collect();
    for i in 0..all.len() {
        if !alive[i] {
            continue;
        }
        for j in (i + 1)..all.len() {
            if !alive[j] {
                continue;
            }
            if overlaps(&all[i], &all[j]) {
                if newer_wins(&all[i], &all[j]) {
                    alive[j] = false;
                } else {
                    alive[i] = false;
                    break;
                }
            }
        }
    }
    alive
}

/// Apply one line's surviving operations with running offset tracking.
///
/// Ordering is `(col_start ascending, timestamp descending)`; earlier spans
/// shift later ones through `offset`.
fn apply_line_ops(cur: &mut Line, ops: &mut [Op]) {
    ops.sort_by(|a, b| a.cs.cmp(&b.cs).then(b.ts.cmp(&a.ts)));

    let mut offset: i32 = 0;
    for op in ops.iter() {
        let len = cur.len() as i32;
        let adj_cs = (op.cs + offset).max(0);
        let adj_ce = (op.ce + offset).min(len - 1);

        // Stale: the span this op claims to replace is no longer there.
        if !op.old.is_empty() && !span_eq(cur, adj_cs, adj_ce, &op.old) {
            tracing::debug!(
                line = op.line,
                uid = %op.uid,
                "dropping stale operation (old text mismatch)"
            );
            continue;
        }

        *cur = splice(cur, adj_cs, adj_ce, &op.new);
        offset += op.new.len() as i32 - (adj_ce - adj_cs + 1);
    }
}

/// Replace the inclusive span `[adj_cs, adj_ce]` of `cur` with `new`.
///
/// The prefix cut clamps to the line length (appends land at the end) and
/// the tail is kept whenever `adj_ce + 1` is still inside the line, so a
/// pure insert (`adj_ce = adj_cs - 1`) retains everything from the
/// insertion point onward.
fn splice(cur: &[u8], adj_cs: i32, adj_ce: i32, new: &[u8]) -> Vec<u8> {
    let len = cur.len() as i32;
    let cut = adj_cs.clamp(0, len) as usize;
    let mut out = Vec::with_capacity(cut + new.len() + cur.len());
    out.extend_from_slice(&cur[..cut]);
    out.extend_from_slice(new);
    let tail = (adj_ce + 1).max(0);
    if tail < len {
        out.extend_from_slice(&cur[tail as usize..]);
    }
    out
}

/// Does the inclusive span `[cs, ce]` of `cur` equal `expected`?
fn span_eq(cur: &[u8], cs: i32, ce: i32, expected: &[u8]) -> bool {
    if cs < 0 || ce < cs {
        return false;
    }
    let (cs, ce) = (cs as usize, ce as usize);
    if ce >= cur.len() {
        return false;
    }
    &cur[cs..=ce] == expected
}

// ── tests ─────────────────────────────────────────────────────────────────────
