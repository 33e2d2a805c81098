//! In-place signature blocks for `#`-comment script formats.
//!
//! A signed script ends with
//!
//! ```text
//! # SIG # Begin signature block
//! # <base64 envelope, wrapped>
//! # SIG # End signature block
//! ```
//!
//! Everything before the begin marker is the signed body.

use std::path::Path;

pub const BEGIN_MARKER: &str = "# SIG # Begin signature block";
pub const END_MARKER: &str = "# SIG # End signature block";
pub const EMBEDDABLE_EXTENSIONS: &[&str] = &["ps1", "psm1", "psd1", "sh", "bash", "py", "rb", "pl"];

const LINE_WIDTH: usize = 64;

pub fn supports_embedded(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            EMBEDDABLE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Block<'a> {
    Absent,
    Present { body: &'a [u8], payload: String },
    Broken { body: &'a [u8], reason: &'static str },
}

impl<'a> Block<'a> {
    /// Bytes that precede the block, or everything when unsigned.
    pub(crate) fn body(&self, content: &'a [u8]) -> &'a [u8] {
        match self {
            Block::Absent => content,
            Block::Present { body, .. } | Block::Broken { body, .. } => *body,
        }
    }
}

pub(crate) fn extract(content: &[u8]) -> Block<'_> {
    let Some(start) = find_marker_line(content, BEGIN_MARKER.as_bytes()) else {
        return Block::Absent;
    };
    let body = &content[..start];
    let Ok(trailer) = std::str::from_utf8(&content[start..]) else {
        return Block::Broken {
            body,
            reason: "signature block is not valid UTF-8",
        };
    };

    let mut lines = trailer.lines().skip(1);
    let mut payload = String::new();
    let mut closed = false;
    for line in lines.by_ref() {
        let line = line.trim_end_matches('\r');
        if line == END_MARKER {
            closed = true;
            break;
        }
        match line.strip_prefix("# ") {
            Some(chunk) => payload.push_str(chunk.trim()),
            None => {
                return Block::Broken {
                    body,
                    reason: "unexpected line inside signature block",
                }
            }
        }
    }
    if !closed {
        return Block::Broken {
            body,
            reason: "signature block is not terminated",
        };
    }
    if lines.any(|l| !l.trim().is_empty()) {
        return Block::Broken {
            body,
            reason: "content follows the signature block",
        };
    }
    if payload.is_empty() {
        return Block::Broken {
            body,
            reason: "signature block is empty",
        };
    }
    Block::Present { body, payload }
}

/// Body as it will be signed: guaranteed to end with a newline unless empty.
pub(crate) fn normalize_body(body: &[u8]) -> Vec<u8> {
    let mut out = body.to_vec();
    if !out.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    out
}

pub(crate) fn attach(body: &[u8], payload: &str) -> Vec<u8> {
    let mut out = body.to_vec();
    out.extend_from_slice(BEGIN_MARKER.as_bytes());
    out.push(b'\n');
    for chunk in payload.as_bytes().chunks(LINE_WIDTH) {
        out.extend_from_slice(b"# ");
        out.extend_from_slice(chunk);
        out.push(b'\n');
    }
    out.extend_from_slice(END_MARKER.as_bytes());
    out.push(b'\n');
    out
}

/// Offset of the last line that is exactly `marker`.
fn find_marker_line(content: &[u8], marker: &[u8]) -> Option<usize> {
    let mut found = None;
    let mut offset = 0;
    for line in content.split_inclusive(|b| *b == b'\n') {
        let trimmed = line
            .strip_suffix(b"\n")
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .unwrap_or(line);
        if trimmed == marker {
            found = Some(offset);
        }
        offset += line.len();
    }
    found
}
