//! Transcript-driven protocol tests.
//!
//! A scenario is a list of `C:` lines (sent by the client) and `S:` lines
//! (expected from the server). Every `C:` line is executed on the session,
//! and the response lines are compared with the `S:` lines that follow it.
//!
//! ```text
//! C: 1 LOGIN testsession
//! S: 1 OK User logged in
//! C: 2 LIST 0 INF () ()
//! S: * 1 0 (NAME "col1" …)
//! S: 2 OK List completed
//! ```

use pimstore_server::Session;
use std::fmt;

/// Lines every scenario starts with.
pub fn default_scenario() -> Vec<String> {
    vec![
        "C: 1 LOGIN testsession".to_string(),
        "S: 1 OK User logged in".to_string(),
    ]
}

/// Default scenario followed by selecting `resource`.
pub fn resource_scenario(resource: &str) -> Vec<String> {
    let mut lines = default_scenario();
    lines.push(format!("C: 2 RESSELECT {resource}"));
    lines.push(format!("S: 2 OK {resource} selected"));
    lines
}

/// The server answered a command differently than scripted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioMismatch {
    /// The command whose response differed.
    pub command: String,
    /// Scripted response lines.
    pub expected: Vec<String>,
    /// Actual response lines.
    pub actual: Vec<String>,
}

impl fmt::Display for ScenarioMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "response to `{}` differs", self.command)?;
        writeln!(f, "expected:")?;
        for line in &self.expected {
            writeln!(f, "  {line}")?;
        }
        writeln!(f, "actual:")?;
        for line in &self.actual {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScenarioMismatch {}

/// Runs `lines` against `session`.
///
/// Lines that start with neither `C:` nor `S:` are ignored. `S:` lines
/// before the first `C:` line are an error.
pub fn run_scenario<S: AsRef<str>>(
    session: &mut Session,
    lines: &[S],
) -> Result<(), ScenarioMismatch> {
    let mut pending: Option<(String, Vec<String>)> = None;
    for line in lines {
        let line = line.as_ref();
        if let Some(command) = line.strip_prefix("C: ") {
            if let Some((previous, expected)) = pending.take() {
                check(session, &previous, expected)?;
            }
            pending = Some((command.to_string(), Vec::new()));
        } else if let Some(reply) = line.strip_prefix("S: ") {
            match pending.as_mut() {
                Some((_, expected)) => expected.push(reply.to_string()),
                None => {
                    return Err(ScenarioMismatch {
                        command: String::new(),
                        expected: vec![reply.to_string()],
                        actual: Vec::new(),
                    })
                }
            }
        }
    }
    if let Some((previous, expected)) = pending {
        check(session, &previous, expected)?;
    }
    Ok(())
}

fn check(session: &mut Session, command: &str, expected: Vec<String>) -> Result<(), ScenarioMismatch> {
    let actual: Vec<String> = session
        .handle_line(command)
        .iter()
        .map(ToString::to_string)
        .collect();
    if actual == expected {
        Ok(())
    } else {
        Err(ScenarioMismatch {
            command: command.to_string(),
            expected,
            actual,
        })
    }
}

/// Runs a scenario and panics with a readable diff on mismatch.
pub fn assert_scenario<S: AsRef<str>>(session: &mut Session, lines: &[S]) {
    if let Err(mismatch) = run_scenario(session, lines) {
        panic!("{mismatch}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestServer;

    #[test]
    fn default_scenario_logs_in() {
        let server = TestServer::new();
        let mut session = server.session();
        assert_scenario(&mut session, &default_scenario());
        assert_eq!(session.id(), "testsession");
    }

    #[test]
    fn mismatch_reports_both_sides() {
        let server = TestServer::new();
        let mut session = server.session();
        let err = run_scenario(&mut session, &["C: 1 FROB", "S: 1 OK fine"]).unwrap_err();
        assert_eq!(err.command, "1 FROB");
        assert_eq!(err.actual, vec!["1 BAD Unknown command FROB"]);
        assert!(err.to_string().contains("expected:"));
    }

    #[test]
    fn reply_without_command_is_an_error() {
        let server = TestServer::new();
        let mut session = server.session();
        assert!(run_scenario(&mut session, &["S: 1 OK"]).is_err());
    }
}
