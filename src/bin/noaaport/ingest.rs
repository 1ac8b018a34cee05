use anyhow::{Context, Result};
use noaaport::config::Config;
use noaaport::pipeline::Pipeline;
use noaaport::source::MulticastSource;
use noaaport::writer::FileWriter;
use tracing::info;

pub fn ingest(config: &Config) -> Result<()> {
    let writer = FileWriter::new(&config.output.directory)
        .with_context(|| format!("failed to create output {:?}", config.output.directory))?
        .with_decompression(config.output.decompress);

    let source = MulticastSource::open(config.multicast_options())
        .with_context(|| format!("failed to join {}", config.multicast.group))?;
    info!("writing products to {:?}", config.output.directory);

    // Exit once the source times out and everything queued has been written.
    let mut options = config.pipeline_options().context("invalid pipeline config")?;
    options.exit_when_drained = true;

    let summary = Pipeline::new(options)
        .start(source, writer)
        .context("starting pipeline")?
        .join()?;

    info!(
        products = summary.consumer.handled,
        missed = summary.engine.missed_datagrams,
        "ingest finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
