use std::io::{stdin, IsTerminal};
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use miette::Result;

use braid::{term, Image, RunState, Terminal};

/// Braid is a small and faithful virtual machine for LC3 binary program images.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// One or more program images, loaded in order; later images overwrite
    /// earlier ones at overlapping addresses
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    let mut vm = RunState::new(Terminal);
    for path in &args.images {
        file_message(Green, "Loading", path);
        let image = Image::open(path)?;
        vm.load(&image);
    }

    message(Green, "Running", "loaded image");

    // Raw mode holds for the whole run; only the IN trap echoes
    let interactive = stdin().is_terminal();
    if interactive {
        term::enable_raw_mode();
    }
    let result = vm.run();
    if interactive {
        term::disable_raw_mode();
    }
    result?;

    message(Green, "Completed", "machine halted");
    Ok(())
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &PathBuf) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}
