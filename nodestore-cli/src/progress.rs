//! Console progress lines for ingestion runs.

use std::io::Write;

use log::warn;
use nodestore_core::{IngestReport, ProgressObserver};

/// Writes one line per committed batch and a closing summary line.
pub struct ConsoleProgress<W: Write> {
    out: W,
}

impl<W: Write> ConsoleProgress<W> {
    /// Report progress to `out`.
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: std::fmt::Arguments<'_>) {
        if let Err(err) = self.out.write_fmt(line).and_then(|()| self.out.flush()) {
            warn!("Failed to write progress line: {err}");
        }
    }
}

impl<W: Write> ProgressObserver for ConsoleProgress<W> {
    fn batch_committed(&mut self, accepted: u64) {
        self.emit(format_args!("Processed {accepted} nodes...\n"));
    }

    fn finished(&mut self, report: &IngestReport) {
        self.emit(format_args!(
            "Finished processing {} nodes in {:?}\n",
            report.summary.nodes, report.elapsed
        ));
    }
}
