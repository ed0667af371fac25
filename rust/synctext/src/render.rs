//! Terminal display sink.
//!
//! The editor loop renders through the [`DisplaySink`] trait so the loop
//! itself never touches the terminal; tests substitute a recording sink.

use crate::diff::LineEdit;
use crate::document::Line;
use crate::registry::PeerInfo;

/// A snapshot handed to the sink on every repaint.
pub struct DocView<'a> {
    pub doc_name: &'a str,
    pub lines: &'a [Line],
    /// Active peers, already filtered by queue liveness.
    pub peers: &'a [PeerInfo],
    pub last_change: Option<&'a LineEdit>,
    pub last_sender: Option<&'a str>,
}

pub trait DisplaySink {
    fn render(&mut self, view: &DocView<'_>);
}

/// ANSI terminal renderer: clear screen, numbered lines, peer roster.
#[derive(Default)]
pub struct TermDisplay;

impl TermDisplay {
    pub fn new() -> Self {
        Self
    }
}

impl DisplaySink for TermDisplay {
    fn render(&mut self, view: &DocView<'_>) {
        print!("\x1b[2J\x1b[H");
        println!("Document: {}", view.doc_name);
        println!("Last updated: {}", wall_clock_hms());
        println!("----------------------------------------");
        for (i, line) in view.lines.iter().enumerate() {
            let marker = match view.last_change {
                Some(c) if c.line as usize == i => " [MODIFIED]",
                _ => "",
            };
            println!("Line {}: {}{}", i, String::from_utf8_lossy(line), marker);
        }
        println!("----------------------------------------");
        if view.peers.is_empty() {
            println!("Active users: (none)");
        } else {
            let names: Vec<&str> = view.peers.iter().map(|p| p.user_id.as_str()).collect();
            println!("Active users: {}", names.join(", "));
        }
        if let Some(c) = view.last_change {
            println!(
                "Change detected: Line {}, col {}-{}, \"{}\" \u{2192} \"{}\" ({})",
                c.line,
                c.col_start,
                c.col_end,
                String::from_utf8_lossy(&c.old_text),
                String::from_utf8_lossy(&c.new_text),
                c.kind.name(),
            );
        }
        if let Some(sender) = view.last_sender {
            println!("Received update from {sender}");
        }
        println!("Monitoring for changes...");
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }
}

/// Recording sink for tests.
#[derive(Default)]
pub struct NullDisplay {
    pub renders: usize,
}

impl DisplaySink for NullDisplay {
    fn render(&mut self, _view: &DocView<'_>) {
        self.renders += 1;
    }
}

/// Local wall-clock time as HH:MM:SS.
fn wall_clock_hms() -> String {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    unsafe { libc::localtime_r(&ts.tv_sec, &mut tm) };
    format!("{:02}:{:02}:{:02}", tm.tm_hour, tm.tm_min, tm.tm_sec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_is_well_formed() {
        let s = wall_clock_hms();
        assert_eq!(s.len(), 8);
        assert_eq!(s.as_bytes()[2], b':');
        assert_eq!(s.as_bytes()[5], b':');
    }

    #[test]
    fn null_display_counts_renders() {
        let mut sink = NullDisplay::default();
        let view = DocView {
            doc_name: "doc",
            lines: &[],
            peers: &[],
            last_change: None,
            last_sender: None,
        };
        sink.render(&view);
        sink.render(&view);
        assert_eq!(sink.renders, 2);
    }
}
