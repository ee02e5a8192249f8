//! meta-get-tree — diagnostic: resolve each argument to its tree image.
//!
//! Reduced from the original `meta-get-tree.c`: that tool resolved an
//! arbitrary file's owning tree through a per-device lookup cache (a
//! mounted-filesystem registry spec.md never describes). Here each
//! argument names a tree image file directly, mirroring `meta-ls`'s
//! first argument.

use clap::Parser;
use ftpvfs::metadata::MetaTree;
use std::io::Write;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "meta-get-tree",
    about = "Resolve tree image files and report their status",
    long_about = "<tree file>.. - report whether each tree image opens cleanly"
)]
struct Cli {
    /// Print extra detail per tree
    #[arg(short = 'l', long = "verbose")]
    verbose: bool,

    /// Wait for Enter between each report
    #[arg(short = 'p', long = "pause")]
    pause: bool,

    /// One or more tree image file paths
    files: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    for file in &cli.files {
        match MetaTree::open(file, false) {
            Ok(tree) => {
                if cli.verbose {
                    println!(
                        "tree: {} (exists: true), on_nfs: {}",
                        tree.path().display(),
                        tree.is_on_nfs()
                    );
                } else {
                    println!("tree: {} (exists: true)", tree.path().display());
                }
            }
            Err(e) => println!("tree lookup failed: {e}"),
        }

        if cli.pause {
            print!("Pausing, press enter\n");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
        }
    }
    ExitCode::SUCCESS
}
