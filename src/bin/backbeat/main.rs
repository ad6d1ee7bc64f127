//! backbeat - drum-driven MIDI accompanist
//!
//! Run with: cargo run
//!
//! Without MIDI ports a simulated drummer plays into the engine and every
//! note is written to the log. With the `midir` feature, set BACKBEAT_OUT
//! and/or BACKBEAT_IN to a substring of the port names to use real devices.
//!
//!   BACKBEAT_BPM    tempo (default 120)
//!   BACKBEAT_BARS   how many bars to play (default 8)
//!   BACKBEAT_SEED   fixed seed for repeatable runs
//!   RUST_LOG        log filter (default backbeat=info)

mod app;
mod drummer;

use std::str::FromStr;

use app::Backbeat;
use color_eyre::eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("backbeat=info")),
        )
        .init();

    let mut app = Backbeat::new();
    if let Some(bpm) = env_var::<f64>("BACKBEAT_BPM")? {
        app = app.bpm(bpm);
    }
    if let Some(bars) = env_var::<u64>("BACKBEAT_BARS")? {
        app = app.bars(bars);
    }
    if let Some(seed) = env_var::<u64>("BACKBEAT_SEED")? {
        app = app.seed(seed);
    }
    if let Ok(pattern) = std::env::var("BACKBEAT_OUT") {
        app = app.output(pattern);
    }
    if let Ok(pattern) = std::env::var("BACKBEAT_IN") {
        app = app.input(pattern);
    }

    app.run()
}

fn env_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .wrap_err_with(|| format!("invalid {name}: {value:?}")),
        Err(_) => Ok(None),
    }
}
