//! meta-get — read metadata keys from a tree image.
//!
//! Reduced from the original `meta-get.c`: that tool could also resolve
//! a tree implicitly from a real file's path via a per-device lookup
//! cache (a whole separate mounted-filesystem registry that spec.md
//! never describes). Here the tree is always named explicitly with
//! `--tree`/`--file`.

use clap::Parser;
use ftpvfs::metadata::{MetaTree, MetaValue};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "meta-get",
    about = "Read metadata keys for a path out of a tree image",
    long_about = "<path> [keys..] - read metadata. With no keys given, \
                  every set key under <path> is printed (and, with \
                  --recursive, every key under every descendant too)."
)]
struct Cli {
    /// Tree image path, given directly
    #[arg(long = "file")]
    file: Option<PathBuf>,

    /// Tree image path, given by name (an alias for --file in this
    /// reduced tool: the per-device tree registry is out of scope)
    #[arg(long = "tree")]
    tree: Option<String>,

    /// Recurse into descendants of <path>, printing their keys too
    #[arg(short, long)]
    recursive: bool,

    /// Emit each requested key as a JSON object instead of key=value text
    #[arg(long)]
    json: bool,

    /// Path inside the tree to read
    path: String,

    /// Specific keys to print; all set keys if omitted
    keys: Vec<String>,
}

fn print_value(indent: usize, key: &str, value: &MetaValue, json: bool) {
    if json {
        match serde_json::to_string(value) {
            Ok(body) => println!(r#"{{"key":{:?},"value":{}}}"#, key, body),
            Err(e) => eprintln!("failed to encode {key} as json: {e}"),
        }
        return;
    }
    match value {
        MetaValue::String(s) => println!("{:indent$}{}={}", "", key, s, indent = indent),
        MetaValue::StringList(values) => {
            println!("{:indent$}{}=[{}]", "", key, values.join(","), indent = indent)
        }
    }
}

fn enum_keys(
    tree: &MetaTree,
    path: &str,
    recurse: bool,
    indent: usize,
    json: bool,
) -> Result<(), String> {
    println!("{:indent$}{}", "", path, indent = indent);
    for key in tree.enumerate_keys(path).map_err(|e| e.to_string())? {
        if let Some(v) = lookup(tree, path, &key)? {
            print_value(indent + 1, &key, &v, json);
        }
    }
    if recurse {
        for child in tree.enumerate_dir(path).map_err(|e| e.to_string())? {
            let child_path = if path == "/" {
                format!("/{}", child.name)
            } else {
                format!("{}/{}", path.trim_end_matches('/'), child.name)
            };
            enum_keys(tree, &child_path, recurse, indent + 3, json)?;
        }
    }
    Ok(())
}

fn lookup(tree: &MetaTree, path: &str, key: &str) -> Result<Option<MetaValue>, String> {
    if let Some(s) = tree.lookup_string(path, key).map_err(|e| e.to_string())? {
        return Ok(Some(MetaValue::String(s)));
    }
    if let Some(v) = tree.lookup_stringv(path, key).map_err(|e| e.to_string())? {
        return Ok(Some(MetaValue::StringList(v)));
    }
    Ok(None)
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
    let tree_path = cli
        .file
        .or_else(|| cli.tree.map(PathBuf::from))
        .ok_or_else(|| "specify --tree <name> or --file <path>".to_string())?;

    let tree = MetaTree::open(&tree_path, false)
        .map_err(|e| format!("can't open metadata tree {}: {e}", tree_path.display()))?;

    if cli.keys.is_empty() {
        enum_keys(&tree, &cli.path, cli.recursive, 0, cli.json)?;
    } else {
        for key in &cli.keys {
            match lookup(&tree, &cli.path, key)? {
                Some(v) => print_value(0, key, &v, cli.json),
                None => println!("{key} Not set"),
            }
        }
    }
    Ok(())
}
