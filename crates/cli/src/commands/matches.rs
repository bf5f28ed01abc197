use anyhow::{anyhow, bail, Result};
use correlate_core::model::{Entity, EntityType, Side};

use crate::commands::{fmt_addr, open_project, print_json};
use crate::parse_address;

/// Matched entities of the last run, optionally narrowed to one type.
pub fn list_matches_command(root: &str, entity_type: Option<&str>, json: bool) -> Result<()> {
    let ctx = open_project(root)?;
    let store = ctx.saved_store()?;
    let filter = entity_type
        .map(|value| EntityType::parse(value).ok_or_else(|| anyhow!("Unknown entity type: {value}")))
        .transpose()?;

    let matches: Vec<&Entity> = match filter {
        Some(entity_type) => store.get_matches_by_type(entity_type),
        None => store.get_matches(),
    };

    if json {
        return print_json(&matches);
    }

    if matches.is_empty() {
        println!("No matched entities.");
        return Ok(());
    }
    println!("{:<12} {:<12} {:<10} name", "orig", "recomp", "type");
    for entity in &matches {
        let ctype = entity.entity_type().map(|t| t.to_string()).unwrap_or_else(|| "UNK".into());
        println!(
            "{:<12} {:<12} {:<10} {}",
            fmt_addr(entity.orig_addr()),
            fmt_addr(entity.recomp_addr()),
            ctype,
            entity.best_name().unwrap_or("")
        );
    }
    println!("{} matched entities", matches.len());
    Ok(())
}

/// Look up one entity by address. With `floor`, the nearest entity at or
/// below the address is returned.
pub fn show_entity_command(
    root: &str,
    orig: Option<&str>,
    recomp: Option<&str>,
    floor: bool,
    json: bool,
) -> Result<()> {
    let (side, raw) = match (orig, recomp) {
        (Some(addr), None) => (Side::Orig, addr),
        (None, Some(addr)) => (Side::Recomp, addr),
        _ => bail!("Exactly one of --orig or --recomp is required"),
    };
    let addr = parse_address(raw)?;

    let ctx = open_project(root)?;
    let store = ctx.saved_store()?;
    let entity = store
        .get(side, addr, !floor)
        .ok_or_else(|| anyhow!("No {} entity at {addr:#x}", side.as_str()))?;

    if json {
        return print_json(entity);
    }

    println!("orig:   {}", fmt_addr(entity.orig_addr()));
    println!("recomp: {}", fmt_addr(entity.recomp_addr()));
    if let Some(name) = entity.match_name() {
        println!("name:   {name}");
    }
    if let Some(found) = entity.addr(side).filter(|found| *found != addr) {
        if let Some(name) = entity.offset_name(addr - found) {
            println!("at:     {name}");
        }
    }
    if let Some(symbol) = &entity.attrs.symbol {
        println!("symbol: {symbol}");
    }
    if let Some(size) = entity.attrs.size {
        println!("size:   {size:#x}");
    }
    Ok(())
}
