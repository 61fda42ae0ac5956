use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::app::ports::Reporter;

/// Writes task output line by line, e.g. to stdout.
pub struct WriterReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl WriterReporter {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Reporter for WriterReporter {
    fn line(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "failed to write task output");
        }
    }
}
