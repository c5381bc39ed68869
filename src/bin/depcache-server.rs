//! Minimal entry point: resolve configuration, construct the Coordinator,
//! run a startup sweep. Transport framing (sockets, routing, auth) is out of
//! scope for this crate and lives in the caller.

use anyhow::{Context, Result};
use depcache::{coordinator::Coordinator, janitor, preflight, Config};

fn usage() -> &'static str {
    "Usage:\n  depcache-server [--config <cache.toml>] [--sweep]\n    --sweep runs one janitor pass over bundles/ and exits"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config_path: Option<std::path::PathBuf> = None;
    let mut sweep_only = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let value = args.get(i + 1).context(usage())?;
                config_path = Some(std::path::PathBuf::from(value));
                i += 2;
            }
            "--sweep" => {
                sweep_only = true;
                i += 1;
            }
            "-h" | "--help" => {
                println!("{}", usage());
                return Ok(());
            }
            other => anyhow::bail!("unrecognized argument: {other}\n\n{}", usage()),
        }
    }

    let config_path = config_path.unwrap_or_else(|| std::path::PathBuf::from("cache.toml"));
    let config = Config::load(Some(&config_path)).context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if sweep_only {
        let removed = janitor::sweep(&config.cache_root, config.bundle_max_age);
        println!("swept {removed} expired bundle(s)");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building async runtime")?;

    preflight::warn_missing_tools();

    runtime.block_on(async move {
        let coordinator = Coordinator::new(config).context("constructing coordinator")?;
        tracing::info!(
            cache_root = %coordinator.config().cache_root.display(),
            "depcache coordinator ready; no transport is wired up by this binary"
        );
        // A real deployment wires an HTTP server here that marshals
        // CacheRequest/CacheResponse through `coordinator.handle(..)`.
        let _ = &coordinator;
        Ok(())
    })
}
