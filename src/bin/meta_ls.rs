//! meta-ls — list the direct children of a path inside a tree image.

use clap::Parser;
use ftpvfs::metadata::MetaTree;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "meta-ls",
    about = "List direct children of a path in a tree image",
    long_about = "<tree file> <dir in tree>.. - list entries"
)]
struct Cli {
    /// Print each entry's children/data flags and last-changed time
    #[arg(short = 'l', long = "verbose")]
    verbose: bool,

    /// Path to the tree image file
    tree_file: String,

    /// One or more directories inside the tree to list
    dirs: Vec<String>,
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
    if cli.dirs.is_empty() {
        return Err("no dir specified".to_string());
    }

    let tree = MetaTree::open(&cli.tree_file, true)
        .map_err(|e| format!("can't open metadata tree {}: {e}", cli.tree_file))?;

    let multiple = cli.dirs.len() > 1;
    for dir in &cli.dirs {
        if multiple {
            println!("{dir}:");
        }
        let entries = tree.enumerate_dir(dir).map_err(|e| e.to_string())?;
        for entry in entries {
            if cli.verbose {
                println!(
                    "{:<16} {}{}  {}",
                    entry.name,
                    if entry.has_children { "c" } else { " " },
                    if entry.has_data { "d" } else { " " },
                    entry.last_changed
                );
            } else {
                println!("{}", entry.name);
            }
        }
    }
    Ok(())
}
