#![forbid(unsafe_code)]

use std::env;
use std::io::{self, IsTerminal, Read};

use swhid_storage::{ContentOriginMappingStore, SharedMappingStore};
use swhid_tools::inspect_cli::execute_parse_command;
use swhid_tools::mapping_cli::{execute_mapping_command, MAPPING_USAGE};

const USAGE: &str = "usage: swhid <parse|mapping> [args]";

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().ok_or_else(|| USAGE.to_string())?.as_str();
    let output = match command {
        "parse" => execute_parse_command(&args[1..])?,
        "mapping" => {
            let subcommand = args
                .get(1)
                .ok_or_else(|| MAPPING_USAGE.to_string())?
                .as_str();
            let listing = if matches!(subcommand, "import-directory" | "attribute-directory") {
                Some(read_listing()?)
            } else {
                None
            };
            let store = open_store()?;
            execute_mapping_command(&store, subcommand, &args[2..], listing.as_deref())?
        }
        _ => return Err(USAGE.to_string()),
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn open_store() -> Result<SharedMappingStore, String> {
    let path = env::var("SWHID_MAPPING_STORE_PATH")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "SWHID_MAPPING_STORE_PATH must name the mapping journal".to_string())?;
    ContentOriginMappingStore::open_with_journal(path)
        .map(SharedMappingStore::new)
        .map_err(|e| format!("failed to open mapping store: {e}"))
}

fn read_listing() -> Result<String, String> {
    if io::stdin().is_terminal() {
        return Err("pipe a JSON directory listing on stdin".to_string());
    }
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| e.to_string())?;
    Ok(input)
}
