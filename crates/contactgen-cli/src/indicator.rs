use std::io::Write;

use contactgen_service::{ActivityIndicator, SessionId};

/// Prints a start/end banner on stderr around each session.
#[derive(Debug, Default)]
pub struct TerminalIndicator;

impl ActivityIndicator for TerminalIndicator {
    fn show(&self, session: SessionId, requested: u64) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "generating {requested} contacts (session {session})...");
    }

    fn hide(&self) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "generation idle");
    }
}
