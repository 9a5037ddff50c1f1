//! Generates man pages from the CLI definitions with clap_mangen.
//!
//! Dev builds skip this unless VOXBRIDGE_GEN_MANPAGES is set.

use clap::CommandFactory;
use clap_mangen::Man;
use std::env;
use std::fs::{self, File};
use std::io::Error;
use std::path::{Path, PathBuf};

include!("src/cli.rs");

fn main() -> Result<(), Error> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=VOXBRIDGE_GEN_MANPAGES");

    let wanted = env::var("VOXBRIDGE_GEN_MANPAGES").is_ok()
        || env::var("PROFILE").as_deref() == Ok("release");
    if !wanted {
        return Ok(());
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| "target".to_string()));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    render_tree(&man_dir, "voxbridge", &Cli::command())?;

    println!(
        "cargo:warning=Man pages written to {}",
        man_dir.display()
    );
    Ok(())
}

/// Write the man page for one command, then recurse into its subcommands
/// so nested pages like voxbridge-record-start.1 come out too.
fn render_tree(man_dir: &Path, stem: &str, cmd: &clap::Command) -> Result<(), Error> {
    let mut file = File::create(man_dir.join(format!("{}.1", stem)))?;
    Man::new(cmd.clone()).render(&mut file)?;

    for sub in cmd.get_subcommands() {
        if sub.get_name() == "help" {
            continue;
        }
        render_tree(man_dir, &format!("{}-{}", stem, sub.get_name()), sub)?;
    }
    Ok(())
}
