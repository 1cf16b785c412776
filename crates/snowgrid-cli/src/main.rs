#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use clap::Parser;
use config::{CliArgs, NodeConfig};
use snowgrid::{FieldOptions, IdValue, Registry};
use std::io::{BufWriter, Write};
use telemetry::init_telemetry;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = NodeConfig::try_from(args)?;

    init_telemetry();

    let mut out = BufWriter::new(std::io::stdout().lock());

    if !config.decode.is_empty() {
        let layout = config.settings.layout()?;
        for id in &config.decode {
            writeln!(out, "{id}\t{}", layout.decode(*id))?;
        }
        out.flush()?;
        return Ok(());
    }

    let mut builder = Registry::builder()
        .settings(config.settings)
        .client_kind(config.client)
        .static_assignments(config.assignments.clone());
    if let Some(ip) = config.host_ip {
        builder = builder.host_ip(ip);
    }
    let registry = builder.build()?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        worker = %registry.current_worker()?,
        count = config.count,
        kind = ?config.kind,
        "minting ids"
    );

    // A suffix is modelled as a value correlated from a sibling field.
    let (generator, correlated) = match config.suffix {
        Some(suffix) => (
            registry.generator_for("id", &FieldOptions::default().with_suffix_from("suffix"))?,
            Some(IdValue::Integer(suffix)),
        ),
        None => (registry.default_generator()?, None),
    };

    for _ in 0..config.count {
        let value = generator.next_value(config.kind, correlated.as_ref())?;
        writeln!(out, "{value}")?;
    }
    out.flush()?;

    registry.shutdown();
    Ok(())
}
