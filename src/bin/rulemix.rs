use anyhow::{Context, Result};
use rulemix::{
    config::Config,
    engine::{Compiler, Family, NodeDef, Predicate, Transform, value::ValueExt},
    messages::{MessageCollector, MessageLog},
    mixer::MixerFactory,
    monitor::TracingMonitor,
};
use serde_json::{Value, json};
use std::{env, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let version = rulemix::config::version();

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    let config = Config::new()?;

    let env_filter = tracing_subscriber::EnvFilter::new(
        env::var("RUST_LOG").unwrap_or_else(|_| "rulemix=info".into()),
    );

    // Configure output format based on environment
    let fmt_layer = if env::var("JSON_LOGS").is_ok() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!(version = %config.version, "Starting rulemix");

    let seed: Value = match env::args().nth(1) {
        Some(raw) => serde_json::from_str(&raw).with_context(|| format!("Invalid seed: {raw}"))?,
        None => json!(42.0),
    };

    // Negate numbers until they are larger than 10. The first mixer slot is a
    // placeholder that the demo fills in with a doubling mixer for a second run.
    let negate = Transform::sync_fn(|value| Ok(json!(-value.require_f64()?)));
    let double = Transform::sync_fn(|value| Ok(json!(value.require_f64()? * 2.0)));
    let terminal = Predicate::sync_fn(|value| Ok(value.require_f64()? > 10.0));
    let is_small = Predicate::sync_fn(|value| {
        let number = value.require_f64()?;
        Ok(number.abs() < 1.0 && number != 0.0)
    });

    let monitor = Arc::new(TracingMonitor::new());
    let factory = MixerFactory::new(
        NodeDef::pipeline(
            NodeDef::composite_mixer(vec![
                NodeDef::placeholder(Family::Mixer),
                NodeDef::processor_mixer(None, Some(NodeDef::rewrite(NodeDef::transform(negate)))),
            ]),
            Some(NodeDef::predicate(terminal)),
            config.mixing.clone(),
        ),
        Compiler::from_config(&config, monitor),
    )?
    .with_retries(config.reconfigure_retries);

    let messages = Arc::new(MessageLog::new());
    let collector: Arc<dyn MessageCollector> = messages.clone();

    let result = factory
        .mix(seed.clone(), Some(collector.clone()), CancellationToken::new())
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    factory.try_set_placeholder(
        "root/mixer/children/0",
        NodeDef::processor_mixer(
            Some(NodeDef::predicate(is_small)),
            Some(NodeDef::rewrite(NodeDef::transform(double))),
        ),
    )?;

    let result = factory
        .mix(seed, Some(collector), CancellationToken::new())
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    for message in messages.messages() {
        tracing::info!(level = %message.level, text = %message.text, "Mixing message");
    }

    Ok(())
}
