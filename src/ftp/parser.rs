//! Directory-listing line parser (spec §4.4).
//!
//! Supports three dialects — MLSD facts (RFC 3659), Unix `ls -l`, and
//! Windows/IIS — carrying the last-successful dialect across lines so a
//! long listing doesn't re-try every dialect on every line, while still
//! tolerating a server that switches dialects mid-listing.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// What a parsed line represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Ignore,
    File,
    Directory,
    Symlink,
}

/// Broken-down local time, mirroring `struct tm` fields the original
/// backend resolves a listing timestamp into (spec §4.4). `year` is
/// `None` when the listing omitted it (common for recent Unix
/// entries); callers default to the current year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokenDownTime {
    pub year: Option<i32>,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

/// One parsed listing line.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub kind: EntryKind,
    pub name: String,
    pub name_length: usize,
    pub link_target: Option<String>,
    /// Size, kept as the server's own string form — the caller decides
    /// how to interpret non-numeric sentinels like Windows' `<DIR>`.
    pub size: String,
    pub mtime: Option<BrokenDownTime>,
    pub facts: HashMap<String, String>,
}

impl ParsedEntry {
    fn ignore(raw: &str) -> Self {
        ParsedEntry {
            kind: EntryKind::Ignore,
            name: raw.to_string(),
            name_length: raw.len(),
            link_target: None,
            size: String::new(),
            mtime: None,
            facts: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Mlsd,
    Unix,
    Windows,
}

fn unix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^([dlcbps-][rwxsStT-]{9})\s+
            (\d+)\s+
            (\S+)\s+
            (\S+)\s+
            (\d+)\s+
            (\w{3}\s+\d{1,2}\s+[\d:]+)\s+
            (.+)$
            ",
        )
        .unwrap()
    })
}

fn windows_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^(\d{2}-\d{2}-\d{2})\s+
            (\d{1,2}:\d{2}(?:AM|PM)?)\s+
            (<DIR>|\d+)\s+
            (.+)$
            ",
        )
        .unwrap()
    })
}

/// Stateful per-listing parser: create one at the start of a listing,
/// feed it each line in order, discard it at the end.
#[derive(Debug, Default)]
pub struct ListingParser {
    dialect: Option<Dialect>,
}

impl ListingParser {
    pub fn new() -> Self {
        Self { dialect: None }
    }

    /// Parse one line, remembering which dialect matched so subsequent
    /// calls try it first.
    pub fn feed_line(&mut self, line: &str) -> ParsedEntry {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.starts_with("total ") {
            return ParsedEntry::ignore(line);
        }

        let order: [Dialect; 3] = match self.dialect {
            Some(Dialect::Mlsd) => [Dialect::Mlsd, Dialect::Unix, Dialect::Windows],
            Some(Dialect::Unix) => [Dialect::Unix, Dialect::Mlsd, Dialect::Windows],
            Some(Dialect::Windows) => [Dialect::Windows, Dialect::Mlsd, Dialect::Unix],
            None => [Dialect::Mlsd, Dialect::Unix, Dialect::Windows],
        };

        for dialect in order {
            let parsed = match dialect {
                Dialect::Mlsd => parse_mlsd(line),
                Dialect::Unix => parse_unix(line),
                Dialect::Windows => parse_windows(line),
            };
            if let Some(entry) = parsed {
                self.dialect = Some(dialect);
                return entry;
            }
        }

        // Unrecognised dialect: treat the raw line as an opaque, unknown
        // entry rather than silently discarding it.
        ParsedEntry {
            kind: EntryKind::File,
            name: line.to_string(),
            name_length: line.len(),
            link_target: None,
            size: "0".to_string(),
            mtime: None,
            facts: HashMap::new(),
        }
    }
}

/// Parse a complete listing body in one call (convenience wrapper over
/// [`ListingParser`] for callers that already have the whole buffer).
pub fn parse_listing(raw: &str) -> Vec<ParsedEntry> {
    let mut parser = ListingParser::new();
    raw.lines().map(|l| parser.feed_line(l)).collect()
}

fn parse_mlsd(line: &str) -> Option<ParsedEntry> {
    if !(line.contains(';') && line.contains('=')) {
        return None;
    }
    let (facts_str, name) = if let Some(pos) = line.find("; ") {
        (&line[..pos + 1], line[pos + 2..].to_string())
    } else if let Some(pos) = line.rfind(' ') {
        (&line[..pos], line[pos + 1..].to_string())
    } else {
        return None;
    };
    if name.is_empty() {
        return None;
    }

    let mut facts: HashMap<String, String> = HashMap::new();
    for segment in facts_str.split(';') {
        let segment = segment.trim();
        if let Some((k, v)) = segment.split_once('=') {
            facts.insert(k.to_lowercase(), v.to_string());
        }
    }

    let kind = match facts.get("type").map(|s| s.to_lowercase()).as_deref() {
        Some("cdir") | Some("pdir") => EntryKind::Ignore,
        Some("dir") => EntryKind::Directory,
        Some("file") => EntryKind::File,
        v if v.map(|v| v.contains("symlink") || v.contains("slink")).unwrap_or(false) => {
            EntryKind::Symlink
        }
        _ => EntryKind::File,
    };

    let size = facts.get("size").cloned().unwrap_or_default();
    let mtime = facts.get("modify").and_then(|v| parse_mlsd_time(v));

    Some(ParsedEntry {
        kind,
        name_length: name.len(),
        name,
        link_target: None,
        size,
        mtime,
        facts,
    })
}

fn parse_mlsd_time(s: &str) -> Option<BrokenDownTime> {
    let base = if s.len() >= 14 { &s[..14] } else { return None };
    let year: i32 = base[0..4].parse().ok()?;
    let month: u32 = base[4..6].parse().ok()?;
    let day: u32 = base[6..8].parse().ok()?;
    let hour: u32 = base[8..10].parse().ok()?;
    let minute: u32 = base[10..12].parse().ok()?;
    let second: u32 = base[12..14].parse().ok()?;
    Some(BrokenDownTime {
        year: Some(year),
        month,
        day,
        hour,
        minute,
        second,
    })
}

fn parse_unix(line: &str) -> Option<ParsedEntry> {
    let caps = unix_re().captures(line)?;
    let perms = caps.get(1)?.as_str();
    let size = caps.get(5)?.as_str().to_string();
    let date_str = caps.get(6)?.as_str();
    let name_raw = caps.get(7)?.as_str();

    let kind = match perms.as_bytes().first() {
        Some(b'd') => EntryKind::Directory,
        Some(b'l') => EntryKind::Symlink,
        Some(b'-') => EntryKind::File,
        _ => EntryKind::File,
    };

    let (name, link_target) = if kind == EntryKind::Symlink {
        match name_raw.find(" -> ") {
            Some(pos) => (
                name_raw[..pos].to_string(),
                Some(name_raw[pos + 4..].to_string()),
            ),
            None => (name_raw.to_string(), None),
        }
    } else {
        (name_raw.to_string(), None)
    };

    let mtime = parse_unix_date(date_str);

    Some(ParsedEntry {
        kind,
        name_length: name.len(),
        name,
        link_target,
        size,
        mtime,
        facts: HashMap::new(),
    })
}

/// Parse "Jan  1 12:00" or "Jan  1  2025" into a broken-down time. The
/// year-omitted form leaves `year` as `None` (RFC 959 gives no
/// standard date format; gvfs resolves the missing year against "now"
/// at the call site).
fn parse_unix_date(s: &str) -> Option<BrokenDownTime> {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let parts: Vec<&str> = s.split_whitespace().collect();
    if parts.len() != 3 {
        return None;
    }
    let month = MONTHS.iter().position(|m| *m == parts[0])? as u32 + 1;
    let day: u32 = parts[1].parse().ok()?;

    if let Some((h, m)) = parts[2].split_once(':') {
        let hour: u32 = h.parse().ok()?;
        let minute: u32 = m.parse().ok()?;
        Some(BrokenDownTime {
            year: None,
            month,
            day,
            hour,
            minute,
            second: 0,
        })
    } else {
        let year: i32 = parts[2].parse().ok()?;
        Some(BrokenDownTime {
            year: Some(year),
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
        })
    }
}

fn parse_windows(line: &str) -> Option<ParsedEntry> {
    let caps = windows_re().captures(line)?;
    let date_str = caps.get(1)?.as_str();
    let time_str = caps.get(2)?.as_str();
    let size_or_dir = caps.get(3)?.as_str();
    let name = caps.get(4)?.as_str().to_string();

    let (kind, size) = if size_or_dir == "<DIR>" {
        (EntryKind::Directory, "0".to_string())
    } else {
        (EntryKind::File, size_or_dir.to_string())
    };

    let mtime = parse_windows_date(date_str, time_str);

    Some(ParsedEntry {
        kind,
        name_length: name.len(),
        name,
        link_target: None,
        size,
        mtime,
        facts: HashMap::new(),
    })
}

fn parse_windows_date(date: &str, time: &str) -> Option<BrokenDownTime> {
    let (mm, dd, yy) = {
        let mut it = date.split('-');
        (it.next()?, it.next()?, it.next()?)
    };
    let month: u32 = mm.parse().ok()?;
    let day: u32 = dd.parse().ok()?;
    let year: i32 = 2000 + yy.parse::<i32>().ok()?;

    let (time_digits, pm) = if let Some(stripped) = time.strip_suffix("AM") {
        (stripped, Some(false))
    } else if let Some(stripped) = time.strip_suffix("PM") {
        (stripped, Some(true))
    } else {
        (time, None)
    };
    let (h, m) = time_digits.split_once(':')?;
    let mut hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    match pm {
        Some(true) if hour != 12 => hour += 12,
        Some(false) if hour == 12 => hour = 0,
        _ => {}
    }

    Some(BrokenDownTime {
        year: Some(year),
        month,
        day,
        hour,
        minute,
        second: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_file_line() {
        let mut p = ListingParser::new();
        let e = p.feed_line("-rw-r--r--   1 user group  1234 Jan  1 12:00 readme.txt");
        assert_eq!(e.kind, EntryKind::File);
        assert_eq!(e.name, "readme.txt");
        assert_eq!(e.size, "1234");
    }

    #[test]
    fn unix_dir_line() {
        let mut p = ListingParser::new();
        let e = p.feed_line("drwxr-xr-x   2 root root  4096 Mar  1 09:30 subdir");
        assert_eq!(e.kind, EntryKind::Directory);
    }

    #[test]
    fn unix_symlink_line() {
        let mut p = ListingParser::new();
        let e = p.feed_line("lrwxrwxrwx   1 root root    22 Jan  5 08:00 link -> /var/target");
        assert_eq!(e.kind, EntryKind::Symlink);
        assert_eq!(e.link_target.as_deref(), Some("/var/target"));
    }

    #[test]
    fn mlsd_line_with_cdir_is_ignored() {
        let mut p = ListingParser::new();
        let e = p.feed_line("type=cdir;; .");
        assert_eq!(e.kind, EntryKind::Ignore);
    }

    #[test]
    fn mlsd_file_line() {
        let mut p = ListingParser::new();
        let e = p.feed_line("type=file;size=1024;modify=20260101120000; example.bin");
        assert_eq!(e.kind, EntryKind::File);
        assert_eq!(e.name, "example.bin");
        assert_eq!(e.size, "1024");
        assert_eq!(e.mtime.unwrap().year, Some(2026));
    }

    #[test]
    fn windows_dir_line() {
        let mut p = ListingParser::new();
        let e = p.feed_line("01-01-26  12:00AM      <DIR> My Documents");
        assert_eq!(e.kind, EntryKind::Directory);
        assert_eq!(e.name, "My Documents");
    }

    #[test]
    fn blank_and_total_lines_are_ignored() {
        let mut p = ListingParser::new();
        assert_eq!(p.feed_line("").kind, EntryKind::Ignore);
        assert_eq!(p.feed_line("total 24").kind, EntryKind::Ignore);
    }

    #[test]
    fn dialect_sticks_then_recovers_on_switch() {
        let mut p = ListingParser::new();
        let a = p.feed_line("-rw-r--r--   1 user group  1234 Jan  1 12:00 a.txt");
        assert_eq!(a.kind, EntryKind::File);
        // Mid-listing dialect switch to Windows style still parses correctly.
        let b = p.feed_line("01-01-26  12:00AM       1234 b.txt");
        assert_eq!(b.kind, EntryKind::File);
        assert_eq!(b.name, "b.txt");
    }
}
