//! Diagnostic sink that appends JSONL records to a file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;

use guardlibc_membrane::diag::{Diagnostic, DiagnosticSink};

/// Appends every record as one JSON line. Lines are flushed as written so a
/// crashing case still leaves a complete log.
pub struct JsonlFileSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlFileSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl DiagnosticSink for JsonlFileSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        let Ok(line) = diagnostic.to_jsonl() else {
            return;
        };
        let mut writer = self.writer.lock();
        // A sink has nowhere to report its own I/O errors.
        let _ = writeln!(writer, "{line}").and_then(|()| writer.flush());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardlibc_membrane::{CallSite, Severity};

    #[test]
    fn appends_one_line_per_record() {
        let path = std::env::temp_dir().join(format!("guardlibc-sink-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let sink = JsonlFileSink::open(&path).unwrap();
        for op in ["read", "write"] {
            sink.emit(&Diagnostic::new(Severity::Warn, op, CallSite::caller(), "partial transfer"));
        }
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Diagnostic = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.op, "read");
        std::fs::remove_file(&path).unwrap();
    }
}
