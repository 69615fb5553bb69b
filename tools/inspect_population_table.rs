// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Population Table Inspector

Prints the entries, row pointers and extra info of a packed population table
blob, as written into the population table region of a core.

Usage:
  cargo run --bin inspect_population_table -- <table.bin> [--key 0x01000203] [--debug-neuromap-connectivity]

With `--key`, also resolves the rows a spike with that key would process.
*/

use std::env;
use std::fs;

use anyhow::{bail, Context, Result};
use neuromap::connectivity::population_table::PopulationTableImage;
use neuromap::observability::{debug_flags_help, init_logging_default, parse_debug_flags};
use tracing::info;

fn parse_key(text: &str) -> Result<u32> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("Invalid key: {}", text))
}

fn print_table(table: &PopulationTableImage) {
    println!(
        "{} entries, {} address list records",
        table.entries().len(),
        table.n_address_records()
    );
    for (index, entry) in table.entries().iter().enumerate() {
        println!(
            "[{:4}] {} start={} count={}",
            index,
            entry.key_and_mask(),
            entry.start(),
            entry.count()
        );
        if let Some(info) = table.extra_info(entry) {
            println!(
                "       extra: core_mask=0x{:03x} shift={} n_neurons={} bitmap_words={}",
                info.core_mask(),
                info.mask_shift(),
                info.n_neurons(),
                info.n_bitmap_words()
            );
        }
        for (position, pointer) in table.row_pointers(entry).iter().enumerate() {
            match pointer.address() {
                Some(address) => println!(
                    "       #{} address=0x{:08x} row_length={}{}",
                    position,
                    address,
                    pointer.row_length(),
                    if pointer.is_single() { " single" } else { "" }
                ),
                None => println!("       #{} invalid", position),
            }
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let debug_flags = parse_debug_flags();
    let _guard = init_logging_default(&debug_flags)?;

    let positional: Vec<&String> = args
        .iter()
        .skip(1)
        .filter(|arg| !arg.starts_with("--debug-"))
        .collect();
    let (path, key) = match positional.as_slice() {
        [path] => (path.as_str(), None),
        [path, flag, key] if flag.as_str() == "--key" => (path.as_str(), Some(parse_key(key)?)),
        _ => bail!(
            "Usage: {} <table.bin> [--key <key>]\n\n{}",
            args.first().map_or("inspect_population_table", String::as_str),
            debug_flags_help()
        ),
    };

    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path))?;
    info!(target: "neuromap", "Read {} bytes from {}", bytes.len(), path);
    let table = PopulationTableImage::parse(&bytes)
        .with_context(|| format!("{} is not a population table", path))?;
    print_table(&table);

    if let Some(key) = key {
        let rows = table.resolve_rows(key);
        println!();
        println!("key 0x{:08x}: {} rows", key, rows.len());
        for row in rows {
            println!(
                "  #{} address=0x{:08x} row_length={}{}",
                row.position,
                row.address,
                row.row_length,
                if row.is_single { " single" } else { "" }
            );
        }
    }
    Ok(())
}
