//! metadata-nautilus — convert legacy per-directory Nautilus XML
//! metadata dumps into a tree image.
//!
//! Reduced from the original `metadata-nautilus.c`: the original parses
//! full XML via libxml2, derives each dump's owning directory from its
//! percent-encoded `file:///...xml` filename, and distinguishes
//! `<file>`-level attributes from nested per-child-node attributes
//! (combined into `nodename-attrname` keys). No XML crate appears in
//! this pack's dependency set for this purpose, so this tool is a
//! minimal hand-rolled `<file name=".."><attribute name=".."
//! value=".."/></file>` scanner (grounded on the regex-based wire
//! parsing already used in `crate::ftp::data_channel`): a dump's
//! directory is simply its own filesystem parent, and only direct
//! `<file>`/`<attribute>` elements are honored.

use clap::Parser;
use ftpvfs::metadata::builder::MetaBuilder;
use ftpvfs::metadata::journal::JournalOp;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

lazy_static! {
    static ref FILE_OPEN_RE: Regex = Regex::new(r#"<file\s+name="([^"]*)"\s*>"#).unwrap();
    static ref ATTR_RE: Regex =
        Regex::new(r#"<attribute\s+name="([^"]*)"\s+value="([^"]*)"\s*/>"#).unwrap();
}

#[derive(Parser)]
#[command(
    name = "metadata-nautilus",
    about = "Convert legacy Nautilus per-directory XML metadata dumps into a tree image",
    long_about = "<nautilus metadata files..> - convert nautilus metadata"
)]
struct Cli {
    /// Output tree image path; prints a summary to stdout if omitted
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// Input XML dump files
    files: Vec<String>,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn unescape_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Parse one dump's contents into `builder`, rooted at `dir`.
fn parse_nautilus_dump(builder: &mut MetaBuilder, contents: &str, dir: &str, mtime: u64) {
    // Split on "<file " openers, each block running until the next
    // opener (or end of string); fine for these flat, non-nested dumps.
    let starts: Vec<usize> = FILE_OPEN_RE.find_iter(contents).map(|m| m.start()).collect();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(contents.len());
        let block = &contents[start..end];
        let Some(name_cap) = FILE_OPEN_RE.captures(block) else { continue };
        let name = unescape_entities(&name_cap[1]);

        let path = if name == "." {
            dir.to_string()
        } else if dir == "/" {
            format!("/{name}")
        } else {
            format!("{}/{}", dir.trim_end_matches('/'), name)
        };

        for attr in ATTR_RE.captures_iter(block) {
            let key = unescape_entities(&attr[1]);
            let value = unescape_entities(&attr[2]);
            if key == "name" || key == "timestamp" {
                continue;
            }
            builder.apply_one(
                &JournalOp::SetKey {
                    path: path.clone(),
                    key,
                    value,
                },
                mtime,
            );
        }
    }
}

/// Derive the dump's owning directory from its own filesystem location
/// (see module doc: the original decodes this from the dump's
/// percent-encoded filename instead).
fn owning_dir(file: &str) -> String {
    PathBuf::from(file)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/".to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.files.is_empty() {
        eprintln!("No files specified");
        return ExitCode::FAILURE;
    }

    let mut builder = MetaBuilder::new(now_secs());
    for file in &cli.files {
        let contents = match std::fs::read_to_string(file) {
            Ok(c) => c,
            Err(_) => {
                println!("failed to load {file}");
                continue;
            }
        };
        let dir = owning_dir(file);
        parse_nautilus_dump(&mut builder, &contents, &dir, now_secs());
    }

    match &cli.out {
        Some(out) => {
            let bytes = builder.serialize(rand::random());
            if let Err(e) = std::fs::write(out, &bytes) {
                eprintln!("failed to write {}: {e}", out.display());
                return ExitCode::FAILURE;
            }
        }
        None => print_tree(&builder.root, "/", 0),
    }
    ExitCode::SUCCESS
}

fn print_tree(file: &ftpvfs::metadata::builder::MetaFile, path: &str, indent: usize) {
    println!("{:indent$}{path}", "", indent = indent);
    for (key, data) in &file.data {
        if data.is_list {
            println!("{:indent$}  {key}=[{}]", "", data.values.join(","), indent = indent);
        } else {
            println!("{:indent$}  {key}={}", "", data.value, indent = indent);
        }
    }
    for (name, child) in &file.children {
        let child_path = if path == "/" {
            format!("/{name}")
        } else {
            format!("{}/{}", path.trim_end_matches('/'), name)
        };
        print_tree(child, &child_path, indent + 2);
    }
}
