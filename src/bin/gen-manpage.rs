//! Man page generator for spitty
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::PathBuf;

#[path = "../backends.rs"]
#[allow(dead_code)]
mod backends;
#[path = "../cli.rs"]
mod cli;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Default to ./man directory
    let output_dir = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("man")
    };

    fs::create_dir_all(&output_dir)?;

    let buffer = render()?;

    let output_path = output_dir.join("spitty.1");
    fs::write(&output_path, buffer)?;

    println!("Man page generated at: {}", output_path.display());
    println!("\nTo view the man page:");
    println!("  man -l {}", output_path.display());

    Ok(())
}

/// Render the man page, with the compiled-in backends as its EXTRA section
fn render() -> std::io::Result<Vec<u8>> {
    let cmd = cli::Cli::command().after_long_help(backends::backend_help());
    let man = clap_mangen::Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    Ok(buffer)
}
