#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::Command;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let matches = Command::new("kiln")
        .version(VERSION)
        .about("Kiln - streaming text-generation server")
        .subcommand(commands::serve::command())
        .get_matches();

    match matches.subcommand() {
        Some(("serve", sub_matches)) => {
            if let Err(e) = commands::serve::run(sub_matches).await {
                eprintln!("✗ {}", e);
                std::process::exit(1);
            }
        }
        _ => {
            println!("Kiln v{}", VERSION);
            println!("Use --help for available commands");
        }
    }
}
