//! Parsers for `git status --porcelain` and `git log --name-status` output.
//!
//! Both sources share one line shape: a two-column status code followed by a
//! path. Anything that does not fit is dropped; parsing never fails.

use snitch_core::{ChangeRecord, ChangeStatus};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Marker that starts a commit header in the log format below.
pub const COMMIT_MARKER: &str = "hash:";

/// Separator between header fields.
pub const FIELD_SEP: &str = "~~";

/// `--pretty` format consumed by [`parse_log`]: short hash, strict ISO-8601
/// committer date, committer name.
pub const LOG_FORMAT: &str = "--pretty=format:hash:%h~~%cI~~%cn";

/// One status line: raw code plus repo-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub code: String,
    pub path: String,
}

/// One unpushed commit and the files it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBlock {
    pub hash: String,
    /// Commit time, unix seconds.
    pub when: Option<i64>,
    pub author: String,
    pub entries: Vec<RawEntry>,
}

/// First two characters are the code, the rest is the path.
pub fn parse_status_line(line: &str) -> Option<RawEntry> {
    let code = line.get(..2)?.trim();
    let path = line.get(2..)?.trim();
    if path.is_empty() {
        return None;
    }
    Some(RawEntry {
        code: code.to_string(),
        path: unquote_path(path),
    })
}

/// Undo git's C-style path quoting (`"caf\303\251.txt"` is `café.txt`).
/// Unquoted input is returned as is; backslashes outside quotes are literal.
pub fn unquote_path(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return raw.to_string();
    };
    let mut bytes = Vec::with_capacity(inner.len());
    let mut rest = inner.as_bytes();
    while let Some((&b, tail)) = rest.split_first() {
        rest = tail;
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        let Some((&esc, tail)) = rest.split_first() else {
            bytes.push(b'\\');
            break;
        };
        rest = tail;
        match esc {
            b'a' => bytes.push(0x07),
            b'b' => bytes.push(0x08),
            b't' => bytes.push(b'\t'),
            b'n' => bytes.push(b'\n'),
            b'v' => bytes.push(0x0b),
            b'f' => bytes.push(0x0c),
            b'r' => bytes.push(b'\r'),
            b'0'..=b'7' => {
                let mut value = u32::from(esc - b'0');
                let mut taken = 0;
                while taken < 2 {
                    match rest.first() {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            rest = &rest[1..];
                            taken += 1;
                        }
                        _ => break,
                    }
                }
                bytes.push((value & 0xff) as u8);
            }
            other => bytes.push(other),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn parse_porcelain(output: &str) -> Vec<RawEntry> {
    output.lines().filter_map(parse_status_line).collect()
}

/// Split log output into commit blocks. File lines seen before any header,
/// and blocks whose header lacks a hash, are dropped.
pub fn parse_log(output: &str) -> Vec<CommitBlock> {
    let mut blocks: Vec<CommitBlock> = Vec::new();
    let mut current: Option<CommitBlock> = None;

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix(COMMIT_MARKER) {
            if let Some(done) = current.take() {
                blocks.push(done);
            }
            current = parse_header(header);
            continue;
        }
        if let (Some(block), Some(entry)) = (current.as_mut(), parse_status_line(line)) {
            block.entries.push(entry);
        }
    }
    if let Some(done) = current {
        blocks.push(done);
    }
    blocks
}

fn parse_header(header: &str) -> Option<CommitBlock> {
    let mut fields = header.split(FIELD_SEP).map(str::trim);
    let hash = fields.next().filter(|h| !h.is_empty())?;
    let when = fields.next().and_then(parse_commit_time);
    let author = fields.next().unwrap_or_default();
    Some(CommitBlock {
        hash: hash.to_string(),
        when,
        author: author.to_string(),
        entries: Vec::new(),
    })
}

fn parse_commit_time(raw: &str) -> Option<i64> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .map(|t| t.unix_timestamp())
}

/// Working-tree entries with a recognised code become records.
pub fn working_tree_records(entries: &[RawEntry]) -> Vec<ChangeRecord> {
    entries
        .iter()
        .filter_map(|e| {
            let status = ChangeStatus::from_code(&e.code)?;
            Some(ChangeRecord::working(&e.path, status))
        })
        .collect()
}

/// Commit entries with a recognised code become records. With `author`
/// set, commits by anyone else are skipped.
pub fn commit_records(blocks: &[CommitBlock], author: Option<&str>) -> Vec<ChangeRecord> {
    blocks
        .iter()
        .filter(|b| author.map_or(true, |a| b.author == a))
        .flat_map(|b| {
            b.entries.iter().filter_map(move |e| {
                let status = ChangeStatus::from_code(&e.code)?;
                Some(ChangeRecord::committed(&e.path, status, &b.hash, b.when))
            })
        })
        .collect()
}
