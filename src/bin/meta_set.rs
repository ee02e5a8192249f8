//! meta-set — write metadata keys into a tree image.
//!
//! Reduced from the original `meta-set.c`: the `--dbus` flag that
//! routed the write through a metadata daemon over DBus is dropped —
//! the daemon/IPC transport is out of scope per spec.md §1 Non-goals —
//! so every invocation writes straight to the tree's journal.

use clap::Parser;
use ftpvfs::metadata::MetaTree;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "meta-set",
    about = "Write a metadata key for a path into a tree image",
    long_about = "<path> <key> [value..] - set metadata"
)]
struct Cli {
    /// Tree image path, given by name
    #[arg(long = "tree")]
    tree: String,

    /// Remove the key instead of setting it
    #[arg(short, long)]
    unset: bool,

    /// Store the values as a string list instead of a single string
    #[arg(short, long)]
    list: bool,

    /// Path inside the tree to modify
    path: String,

    /// Key to set, unset, or list
    key: String,

    /// Value(s); exactly one unless --list is given
    values: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    if !cli.list && !cli.unset && cli.values.len() != 1 {
        return Err("no value specified".to_string());
    }

    let tree = MetaTree::open(&cli.tree, true)
        .map_err(|e| format!("can't open metadata tree {}: {e}", cli.tree))?;

    if cli.unset {
        tree.unset(&cli.path, &cli.key)
            .map_err(|e| format!("unable to unset key: {e}"))?;
    } else if cli.list {
        tree.set_stringv(&cli.path, &cli.key, &cli.values)
            .map_err(|e| format!("unable to set key: {e}"))?;
    } else {
        tree.set_string(&cli.path, &cli.key, &cli.values[0])
            .map_err(|e| format!("unable to set key: {e}"))?;
    }
    Ok(())
}
