//! Response lines.

use std::fmt;

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The command succeeded.
    Ok,
    /// The command failed.
    No,
    /// The command line was not understood.
    Bad,
}

impl Status {
    /// Wire form of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bad => "BAD",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single response line.
///
/// Untagged lines (`* …`) carry intermediate results; every command ends
/// with exactly one tagged line carrying a [`Status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    tag: Option<String>,
    status: Option<Status>,
    text: String,
}

impl Response {
    /// Creates an untagged data line.
    pub fn untagged(text: impl Into<String>) -> Self {
        Self {
            tag: None,
            status: None,
            text: text.into(),
        }
    }

    /// Creates a tagged completion line.
    pub fn tagged(tag: impl Into<String>, status: Status, text: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            status: Some(status),
            text: text.into(),
        }
    }

    /// Creates a tagged `OK` line.
    pub fn ok(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self::tagged(tag, Status::Ok, text)
    }

    /// Creates a tagged `NO` line.
    pub fn no(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self::tagged(tag, Status::No, text)
    }

    /// Creates a tagged `BAD` line.
    pub fn bad(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self::tagged(tag, Status::Bad, text)
    }

    /// Returns the tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Returns the completion status, if any.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Returns the response text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns true if this line completes a command.
    pub fn is_final(&self) -> bool {
        self.tag.is_some()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.tag, self.status) {
            (Some(tag), Some(status)) => write!(f, "{tag} {status} {}", self.text),
            (Some(tag), None) => write!(f, "{tag} {}", self.text),
            (None, _) => write!(f, "* {}", self.text),
        }
    }
}

/// Quotes a string for the wire, escaping `"` and `\`.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Renders `(a b c)` from already formatted elements.
pub fn list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let inner: Vec<String> = items.into_iter().map(|s| s.as_ref().to_string()).collect();
    format!("({})", inner.join(" "))
}
