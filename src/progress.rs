//! Index progress reporting.
//!
//! Reports observable progress during `assis index` so users see which
//! source is being scanned and how many chunks are left. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::models::Category;

/// A single progress event for one source category.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexProgressEvent {
    /// Walking the source roots. Total unknown.
    Selecting { category: Category },
    /// Files read and chunked on the worker pool.
    Loaded {
        category: Category,
        files: u64,
        chunks: u64,
    },
    /// `n` of `total` chunks embedded and stored (or attempted).
    Indexing {
        category: Category,
        n: u64,
        total: u64,
    },
}

/// Reports index progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index config  indexing  1,234 / 5,000 chunks".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Selecting { category } => {
                format!("index {}  selecting files...\n", category)
            }
            IndexProgressEvent::Loaded {
                category,
                files,
                chunks,
            } => format!(
                "index {}  loaded {} files, {} chunks\n",
                category,
                format_number(*files),
                format_number(*chunks)
            ),
            IndexProgressEvent::Indexing { category, n, total } => format!(
                "index {}  indexing  {} / {} chunks\n",
                category,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &IndexProgressEvent) -> serde_json::Value {
        match event {
            IndexProgressEvent::Selecting { category } => serde_json::json!({
                "event": "progress",
                "source": category.as_str(),
                "phase": "selecting"
            }),
            IndexProgressEvent::Loaded {
                category,
                files,
                chunks,
            } => serde_json::json!({
                "event": "progress",
                "source": category.as_str(),
                "phase": "loaded",
                "files": files,
                "chunks": chunks
            }),
            IndexProgressEvent::Indexing { category, n, total } => serde_json::json!({
                "event": "progress",
                "source": category.as_str(),
                "phase": "indexing",
                "n": n,
                "total": total
            }),
        }
    }
}

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn json_event_shape() {
        let json = JsonProgress::to_json(&IndexProgressEvent::Indexing {
            category: Category::Manpage,
            n: 256,
            total: 1000,
        });
        assert_eq!(json["source"], "manpage");
        assert_eq!(json["phase"], "indexing");
        assert_eq!(json["total"], 1000);
    }
}
