//! Renders scenecue(1) and one page per subcommand with clap_mangen.
//!
//! Pages land in `$OUT_DIR/man`, where `cargo xtask install` picks them up.

use clap::{Command, CommandFactory};
use clap_mangen::Man;
use std::env;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

include!("src/cli.rs");

const GEN_ENV: &str = "SCENECUE_GEN_MANPAGES";

fn render(cmd: Command, dir: &Path, page: &str) -> io::Result<()> {
    let mut file = File::create(dir.join(format!("{}.1", page)))?;
    Man::new(cmd).render(&mut file)
}

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed={}", GEN_ENV);

    let release = env::var("PROFILE").is_ok_and(|p| p == "release");
    if !release && env::var_os(GEN_ENV).is_none() {
        return Ok(());
    }

    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        return Ok(());
    };
    let man_dir = out_dir.join("man");
    std::fs::create_dir_all(&man_dir)?;

    let cli = Cli::command();
    let bin = cli.get_name().to_string();

    let pages = cli
        .get_subcommands()
        .filter(|sub| !sub.is_hide_set() && sub.get_name() != "help")
        .map(|sub| (format!("{}-{}", bin, sub.get_name()), sub.clone()))
        .collect::<Vec<_>>();

    render(cli, &man_dir, &bin)?;
    for (page, sub) in pages {
        render(sub, &man_dir, &page)?;
    }

    Ok(())
}
