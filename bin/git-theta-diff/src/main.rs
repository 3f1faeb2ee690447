//! The git diff driver: tensor-level summary of manifest changes.
//!
//! git invokes this with `path old_file old_hex old_mode new_file new_hex
//! new_mode`; both files hold manifests. Output is presentation only, so
//! the process always exits zero.

use std::path::Path;

use argh::FromArgs;
use colored::{Color, Colorize};
use theta_metadata::Metadata;
use tracing::warn;

/// Show added, removed, and modified parameter groups between two manifest
/// versions.
#[derive(FromArgs, Debug)]
struct Args {
    /// path of the file being diffed
    #[argh(positional)]
    path: String,

    /// file holding the old manifest
    #[argh(positional)]
    old_file: String,

    /// blob hash of the old version
    #[argh(positional)]
    old_hex: String,

    /// file mode of the old version
    #[argh(positional)]
    old_mode: String,

    /// file holding the new manifest
    #[argh(positional)]
    new_file: String,

    /// blob hash of the new version
    #[argh(positional)]
    new_hex: String,

    /// file mode of the new version
    #[argh(positional)]
    new_mode: String,
}

fn main() {
    let args: Args = argh::from_env();

    let appender = tracing_appender::rolling::never(std::env::temp_dir(), "git-theta.log");
    let (writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .init();

    if let Err(err) = run(&args) {
        // Presentation only: report and still exit zero.
        warn!(path = %args.path, "diff failed: {err}");
        eprintln!("git-theta-diff: {err}");
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!(
        old = %args.old_hex,
        old_mode = %args.old_mode,
        new = %args.new_hex,
        new_mode = %args.new_mode,
        "diff driver invoked"
    );
    let old = load_manifest(&args.old_file)?;
    let new = load_manifest(&args.new_file)?;
    let diff = Metadata::diff(&new, &old);

    print_section("ADDED PARAMETER GROUPS", &diff.added, Color::Green);
    print_section("REMOVED PARAMETER GROUPS", &diff.removed, Color::Red);
    print_section("MODIFIED PARAMETER GROUPS", &diff.modified, Color::Yellow);
    Ok(())
}

/// Read a manifest file; an absent or empty file (a created or deleted
/// side) is an empty manifest.
fn load_manifest(path: &str) -> Result<Metadata, theta_metadata::MetadataError> {
    let path = Path::new(path);
    if !path.exists() {
        return Ok(Metadata::new());
    }
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Ok(Metadata::new());
    }
    Metadata::from_bytes(&bytes)
}

fn print_section(header: &str, entries: &Metadata, color: Color) {
    if entries.is_empty() {
        return;
    }
    println!("{}", header.color(color).bold());
    println!("{}", "-".repeat(header.len()).color(color).bold());
    for name in entries.names() {
        println!("{}", name.to_string().color(color));
    }
    println!();
}
