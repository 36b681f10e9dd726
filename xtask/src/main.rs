//! `cargo xtask <install|uninstall|dist>` for scenecue
//!
//! install and uninstall shell out to sudo; dist only builds.

use anyhow::{bail, Context};
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::time::SystemTime;

const BIN: &str = "scenecue";
const BIN_DIR: &str = "/usr/local/bin";
const MAN_DIR: &str = "/usr/local/share/man/man1";

const USAGE: &str = "\
Usage: cargo xtask <TASK>

Tasks:
  install    Build a release binary and install it with its man pages
             into /usr/local (sudo)
  uninstall  Remove the installed binary and man pages (sudo)
  dist       Build a release binary and print where it is
";

enum Task {
    Install,
    Uninstall,
    Dist,
}

impl Task {
    fn parse(arg: &str) -> Option<Self> {
        match arg {
            "install" => Some(Task::Install),
            "uninstall" => Some(Task::Uninstall),
            "dist" => Some(Task::Dist),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    let arg = env::args().nth(1);
    let task = match arg.as_deref() {
        None | Some("help" | "--help" | "-h") => {
            eprint!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Some(arg) => match Task::parse(arg) {
            Some(task) => task,
            None => {
                eprint!("unknown task `{}`\n\n{}", arg, USAGE);
                return ExitCode::FAILURE;
            }
        },
    };

    let root = workspace_root();
    let result = match task {
        Task::Install => install(&root),
        Task::Uninstall => uninstall(),
        Task::Dist => build_release(&root).map(|bin| println!("{}", bin.display())),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("xtask: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// The xtask crate sits one level below the workspace root
fn workspace_root() -> PathBuf {
    let manifest = env::var_os("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("xtask"));
    manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn build_release(root: &Path) -> anyhow::Result<PathBuf> {
    let status = Command::new(env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()))
        .args(["build", "--release", "--bin", BIN])
        .env("SCENECUE_GEN_MANPAGES", "1")
        .current_dir(root)
        .status()
        .context("running cargo")?;
    if !status.success() {
        bail!("release build failed");
    }

    let bin = root.join("target/release").join(BIN);
    if !bin.is_file() {
        bail!("{} missing after build", bin.display());
    }
    Ok(bin)
}

/// Pages from the most recent build script run
fn man_pages(root: &Path) -> Vec<PathBuf> {
    let main_page = format!("{}.1", BIN);
    let newest = std::fs::read_dir(root.join("target/release/build"))
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|entry| entry.path().join("out/man"))
        .filter_map(|dir| {
            let modified = dir.join(&main_page).metadata().ok()?.modified().ok()?;
            Some((modified, dir))
        })
        .max_by_key(|(modified, _): &(SystemTime, PathBuf)| *modified);

    let Some((_, dir)) = newest else {
        return Vec::new();
    };
    std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "1"))
        .collect()
}

fn sudo(args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new("sudo")
        .args(args)
        .status()
        .context("running sudo")?;
    if !status.success() {
        bail!("sudo {} exited with {}", args.join(" "), status);
    }
    Ok(())
}

fn install(root: &Path) -> anyhow::Result<()> {
    let bin = build_release(root)?;
    let dest = format!("{}/{}", BIN_DIR, BIN);
    sudo(&["install", "-Dm755", &bin.to_string_lossy(), &dest])?;
    println!("installed {}", dest);

    let pages = man_pages(root);
    for page in &pages {
        let Some(name) = page.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        sudo(&["install", "-Dm644", &page.to_string_lossy(), &format!("{}/{}", MAN_DIR, name)])?;
    }
    match pages.len() {
        0 => println!("no man pages found, skipped"),
        n => println!("installed {} man pages into {}", n, MAN_DIR),
    }
    Ok(())
}

fn uninstall() -> anyhow::Result<()> {
    sudo(&["rm", "-f", &format!("{}/{}", BIN_DIR, BIN)])?;
    sudo(&[
        "sh",
        "-c",
        &format!("rm -f {dir}/{bin}.1 {dir}/{bin}-*.1", dir = MAN_DIR, bin = BIN),
    ])?;
    println!("removed {} from {}", BIN, BIN_DIR);
    Ok(())
}
