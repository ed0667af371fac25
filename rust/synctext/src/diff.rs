//! Change synthesis: turn a file save into line/column-precise operations.
//!
//! Each changed line produces exactly one operation covering the minimal
//! differing span (longest common prefix, then longest common suffix of the
//! remainder). Lines appended at the end become whole-line inserts; lines
//! removed from the end become whole-line deletes.

use crate::wire::{Op, OpKind};

/// A synthesized edit, not yet stamped with author or timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEdit {
    /// 0-based line number.
    pub line: u32,
    /// First differing byte column (inclusive).
    pub col_start: i32,
    /// Last replaced byte column (inclusive); `col_start - 1` for pure inserts.
    pub col_end: i32,
    pub kind: OpKind,
    pub old_text: Vec<u8>,
    pub new_text: Vec<u8>,
}

impl LineEdit {
    /// Stamp with author and timestamp, producing the merge form.
    pub fn into_op(self, uid: &str, ts: u64) -> Op {
        Op {
            ts,
            uid: uid.to_string(),
            line: self.line,
            cs: self.col_start,
            ce: self.col_end,
            kind: self.kind,
            old: self.old_text,
            new: self.new_text,
        }
    }
}

/// Diff two normalized line sets, emitting one edit per changed line.
pub fn diff_lines(prev: &[Vec<u8>], new: &[Vec<u8>]) -> Vec<LineEdit> {
    let mut edits = Vec::new();

    let common = prev.len().min(new.len());
    for i in 0..common {
        if let Some(edit) = diff_line(i as u32, &prev[i], &new[i]) {
            edits.push(edit);
        }
    }

    // Lines appended at the end; trailing empties were normalized away,
    // but guard anyway.
    for (i, line) in new.iter().enumerate().skip(prev.len()) {
        if line.is_empty() {
            continue;
        }
        edits.push(LineEdit {
            line: i as u32,
            col_start: 0,
            col_end: -1,
            kind: OpKind::Insert,
            old_text: Vec::new(),
            new_text: line.clone(),
        });
    }

    // Lines removed from the end.
    for (i, line) in prev.iter().enumerate().skip(new.len()) {
        if line.is_empty() {
            continue;
        }
        edits.push(LineEdit {
            line: i as u32,
            col_start: 0,
            col_end: line.len() as i32 - 1,
            kind: OpKind::Delete,
            old_text: line.clone(),
            new_text: Vec::new(),
        });
    }

    edits
}

/// Minimal differing span of one line, or None if the lines agree.
fn diff_line(line: u32, old: &[u8], new: &[u8]) -> Option<LineEdit> {
    if old == new {
        return None;
    }

    let mut cs = 0;
    let max_prefix = old.len().min(new.len());
    while cs < max_prefix && old[cs] == new[cs] {
        cs += 1;
    }

    let mut tail = 0;
    while tail < old.len() - cs
        && tail < new.len() - cs
        && old[old.len() - 1 - tail] == new[new.len() - 1 - tail]
    {
        tail += 1;
    }

    let old_seg = &old[cs..old.len() - tail];
    let new_seg = &new[cs..new.len() - tail];
    if old_seg == new_seg {
        return None;
    }

    let kind = if old_seg.is_empty() {
        OpKind::Insert
    } else if new_seg.is_empty() {
        OpKind::Delete
    } else {
        OpKind::Replace
    };

    let col_start = cs as i32;
    let col_end = if old_seg.is_empty() {
        col_start - 1
    } else {
        col_start + old_seg.len() as i32 - 1
    };

    Some(LineEdit {
        line,
        col_start,
        col_end,
        kind,
        old_text: old_seg.to_vec(),
        new_text: new_seg.to_vec(),
    })
}

// ── tests ─────────────────────────────────────────────────────────────────────
