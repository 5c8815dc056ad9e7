//! # treesync CLI
//!
//! Command-line utilities for diffing, patching and reconciling JSON documents.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::env;
use std::fs;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use treesync_core::patch::patched;
use treesync_core::{diff, reverse, ChangeSet, Document, Operation, SyncContext};

mod config;

use config::CliConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let config = CliConfig::from_env()?;
    let ctx = config.context();
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        cid = ctx.replica_id(),
        command = %args[1],
        "Starting treesync"
    );

    match args[1].as_str() {
        "diff" => {
            let [old, new] = operands(&args, "diff <old.json> <new.json>")?;
            let ops = diff(ctx.config(), &read_json::<Value>(old)?, &read_json::<Value>(new)?)
                .context("Failed to diff")?;
            print_json(&ops)?;
        }
        "patch" => {
            let [value, ops] = operands(&args, "patch <value.json> <ops.json>")?;
            let ops: Vec<Operation> = read_json(ops)?;
            let value = patched(ctx.config(), &read_json(value)?, &ops).context("Failed to patch")?;
            print_json(&value)?;
        }
        "reverse" => {
            let [ops] = operands(&args, "reverse <ops.json>")?;
            let ops: Vec<Operation> = read_json(ops)?;
            print_json(&reverse(ctx.config(), &ops))?;
        }
        "init" => {
            let [value] = operands(&args, "init <value.json>")?;
            let doc = Document::from_value(ctx, read_json(value)?)
                .context("Failed to create document")?;
            print_json(&doc.to_persisted())?;
        }
        "produce" => {
            let [doc, value] = operands(&args, "produce <doc.saved.json> <new.json>")?;
            let doc = load_document(&ctx, doc)?;
            let change = doc
                .produce(&read_json(value)?)
                .context("Failed to produce change")?;
            print_json(&change)?;
        }
        "apply" => {
            let [doc, change] = operands(&args, "apply <doc.saved.json> <change.json>")?;
            let doc = load_document(&ctx, doc)?;
            let change: ChangeSet = read_json(change)?;
            let doc = doc.apply_change(&change);
            if let Some(warning) = doc.warning() {
                eprintln!("warning: {warning}");
            }
            print_json(&doc.to_persisted())?;
        }
        "merge" => {
            let [a, b] = operands(&args, "merge <a.saved.json> <b.saved.json>")?;
            let merged = load_document(&ctx, a)?.merge(&load_document(&ctx, b)?);
            if let Some(warning) = merged.warning() {
                eprintln!("warning: {warning}");
            }
            print_json(&merged.to_persisted())?;
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

/// The `N` file operands of a command, or a usage error.
fn operands<'a, const N: usize>(args: &'a [String], usage: &str) -> Result<[&'a str; N]> {
    let given: Vec<&str> = args.iter().skip(2).map(String::as_str).collect();
    match given.try_into() {
        Ok(files) => Ok(files),
        Err(_) => bail!("Usage: treesync {usage}"),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {path}"))
}

fn load_document(ctx: &Arc<SyncContext>, path: &str) -> Result<Document> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    Document::load(Arc::clone(ctx), &text).with_context(|| format!("Invalid document in {path}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_help() {
    println!(
        r#"treesync CLI

USAGE:
    treesync <COMMAND> [FILES]

COMMANDS:
    diff <old.json> <new.json>               Print the edit script from old to new
    patch <value.json> <ops.json>            Apply an edit script and print the result
    reverse <ops.json>                       Print the script that undoes an edit script
    init <value.json>                        Print a new saved document holding the value
    produce <doc.saved.json> <new.json>      Print the change record turning a document into new
    apply <doc.saved.json> <change.json>     Apply a change record and print the saved document
    merge <a.saved.json> <b.saved.json>      Merge two saved documents
    help                                     Show this help message

ENVIRONMENT:
    TREESYNC_STRICT             Fail on maps without identity (default true)
    TREESYNC_ID_FIELDS          JSON array of identity accessor paths
    TREESYNC_HISTORY_CAPACITY   Retained history entries (default 1000)
    TREESYNC_CID                Document id used for produced changes
    RUST_LOG                    Log filter (default warn)

EXAMPLES:
    treesync diff before.json after.json > ops.json
    treesync patch before.json ops.json
"#
    );
}
