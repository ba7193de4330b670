//! # ConsoleBackend - line-per-event printer
//!
//! Renders every event as one tab-separated line. Useful when debugging a
//! single load generator interactively.
//!
//! ## Example output
//! ```text
//! type	name	time	length	success	exception
//! POST	/login	120	512	true	-
//! GET	/health	-	-	false	connection refused
//! ```
//!
//! Columns absent for an event are rendered as `-`.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::backends::{Backend, Identity};
use crate::error::BackendError;
use crate::events::Event;

const HEADER: &str = "type\tname\ttime\tlength\tsuccess\texception";

/// Event printer backend.
///
/// Never fails: write errors are logged at debug level and acknowledged.
pub struct ConsoleBackend {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleBackend {
    /// Prints to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Prints to any line-oriented writer; the header line is written immediately.
    #[must_use]
    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        let me = Self {
            out: Mutex::new(Box::new(out)),
        };
        me.write_line(HEADER);
        me
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::debug!(error = %e, "console backend write failed");
        }
    }
}

impl Default for ConsoleBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats one event as a tab-separated line (without the trailing newline).
fn render(ev: &Event) -> String {
    let time = ev
        .response_time()
        .map_or_else(|| "-".to_string(), |t| t.to_string());
    let length = ev
        .response_length()
        .map_or_else(|| "-".to_string(), |l| l.to_string());
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        ev.request_type(),
        ev.name(),
        time,
        length,
        ev.is_success(),
        ev.exception().unwrap_or("-"),
    )
}

#[async_trait]
impl Backend for ConsoleBackend {
    fn identity(&self) -> Identity {
        Identity::from("console")
    }

    async fn handle_success(&self, ev: &Event) -> Result<(), BackendError> {
        self.write_line(&render(ev));
        Ok(())
    }

    async fn handle_failure(&self, ev: &Event) -> Result<(), BackendError> {
        self.write_line(&render(ev));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn renders_success_and_failure_distinctly() {
        let out = Captured::default();
        let console = ConsoleBackend::with_writer(out.clone());

        let ok = Event::success("POST", "/login", 120.0, 512);
        let err = Event::failure("GET", "/health", None, "connection refused");
        console.handle_success(&ok).await.unwrap();
        console.handle_failure(&err).await.unwrap();

        assert_eq!(
            out.lines(),
            vec![
                HEADER.to_string(),
                "POST\t/login\t120\t512\ttrue\t-".to_string(),
                "GET\t/health\t-\t-\tfalse\tconnection refused".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn write_errors_are_acknowledged() {
        let console = ConsoleBackend::with_writer(Broken);
        let ev = Event::success("GET", "/", 1.0, 1);
        assert!(console.handle_success(&ev).await.is_ok());
    }
}
