//! Threaded ingest pipeline.
//!
//! A [Pipeline] runs three units, each on its own named thread, connected by FIFO
//! hand-off [queue]s:
//!
//! ```text
//!  source ──datagrams──▶ reassembly ──products──▶ consumer
//! ```
//!
//! The source thread reads from a [PacketSource], the reassembly thread feeds a
//! [ReassemblyEngine], and the consumer thread passes completed products to a
//! [ProductHandler]. Queue order is preserved end to end. Each unit has its own
//! [StopToken] so units can be stopped independently.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, span, warn, Level};
use typed_builder::TypedBuilder;

use crate::error::{Error, Result};
use crate::product::ProductContainer;
use crate::reassembly::{EngineStats, ReassemblyEngine};
use crate::source::{Datagram, PacketSource, Recv};
use crate::writer::ProductHandler;

mod queue;

pub use queue::*;

/// Cooperative stop flag shared between a unit and whoever controls it.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. The unit exits at its next check.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct PipelineOptions {
    /// How long the reassembly and consumer units sleep when their input queue is
    /// empty.
    #[builder(default = Duration::from_millis(50))]
    pub backoff: Duration,
    /// Datagram queue between the source and reassembly units.
    #[builder(default)]
    pub inbound: Capacity,
    /// Product queue between the reassembly and consumer units.
    #[builder(default)]
    pub outbound: Capacity,
    /// Let the reassembly and consumer units exit once their input is finished and
    /// empty. Otherwise they keep polling until stopped, as a live feed requires.
    #[builder(default)]
    pub exit_when_drained: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Datagrams received from the source
    pub received: u64,
    /// Datagrams dropped because the inbound queue was full
    pub queue_dropped: u64,
    /// Source errors. The source unit stops at the first one.
    pub errors: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub handled: u64,
    /// Products the handler returned an error for
    pub failed: u64,
}

/// Final counts from every unit of a finished pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub source: SourceStats,
    pub engine: EngineStats,
    pub consumer: ConsumerStats,
    /// Products dropped because the outbound queue was full
    pub outbound_dropped: u64,
}

/// Builds and starts the ingest threads.
///
/// # Example
/// ```
/// use noaaport::pipeline::{Pipeline, PipelineOptions};
/// use noaaport::source::IterSource;
/// use noaaport::{ProductContainer, Result};
///
/// let options = PipelineOptions::builder().exit_when_drained(true).build();
/// let running = Pipeline::new(options)
///     .start(IterSource::new(vec![vec![0u8; 100]]), |product: ProductContainer| -> Result<()> {
///         println!("{product}");
///         Ok(())
///     })
///     .unwrap();
/// let summary = running.join().unwrap();
/// assert_eq!(summary.source.received, 1);
/// assert_eq!(summary.engine.dropped, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    options: PipelineOptions,
}

impl Pipeline {
    #[must_use]
    pub fn new(options: PipelineOptions) -> Self {
        Pipeline { options }
    }

    /// Start the consumer, reassembly, and source threads, in that order, so every
    /// unit is ready before data starts to flow.
    ///
    /// # Errors
    /// [Error::Io] if a thread cannot be spawned. Any unit already started is
    /// stopped and joined first.
    pub fn start<S, H>(self, source: S, handler: H) -> Result<RunningPipeline>
    where
        S: PacketSource,
        H: ProductHandler,
    {
        let (datagram_tx, datagram_rx) = queue::<Datagram>(self.options.inbound);
        let (product_tx, product_rx) = queue::<ProductContainer>(self.options.outbound);

        let source_token = StopToken::new();
        let engine_token = StopToken::new();
        let consumer_token = StopToken::new();

        let consumer = spawn_consumer(
            product_rx,
            handler,
            consumer_token.clone(),
            self.options.clone(),
        )?;

        let engine = match spawn_engine(
            datagram_rx,
            product_tx,
            engine_token.clone(),
            self.options.clone(),
        ) {
            Ok(handle) => handle,
            Err(err) => {
                consumer_token.stop();
                let _ = consumer.join();
                return Err(err);
            }
        };

        let source = match spawn_source(source, datagram_tx, source_token.clone()) {
            Ok(handle) => handle,
            Err(err) => {
                engine_token.stop();
                consumer_token.stop();
                let _ = engine.join();
                let _ = consumer.join();
                return Err(err);
            }
        };

        Ok(RunningPipeline {
            source,
            engine,
            consumer,
            source_token,
            engine_token,
            consumer_token,
        })
    }
}

/// Handle to a started [Pipeline].
#[derive(Debug)]
pub struct RunningPipeline {
    source: JoinHandle<SourceStats>,
    engine: JoinHandle<(EngineStats, u64)>,
    consumer: JoinHandle<ConsumerStats>,
    source_token: StopToken,
    engine_token: StopToken,
    consumer_token: StopToken,
}

impl RunningPipeline {
    /// Stop all units. Queued items not yet taken are discarded.
    pub fn stop(&self) {
        self.source_token.stop();
        self.engine_token.stop();
        self.consumer_token.stop();
    }

    /// Stop only the source. With `exit_when_drained` set, the remaining units finish
    /// whatever is queued and then exit.
    pub fn stop_source(&self) {
        self.source_token.stop();
    }

    #[must_use]
    pub fn source_token(&self) -> StopToken {
        self.source_token.clone()
    }

    #[must_use]
    pub fn engine_token(&self) -> StopToken {
        self.engine_token.clone()
    }

    #[must_use]
    pub fn consumer_token(&self) -> StopToken {
        self.consumer_token.clone()
    }

    /// Wait for every unit to exit.
    ///
    /// # Errors
    /// [Error::ThreadPanic] if any unit panicked.
    pub fn join(self) -> Result<PipelineSummary> {
        let source = self
            .source
            .join()
            .map_err(|_| Error::ThreadPanic("source".into()))?;
        let (engine, outbound_dropped) = self
            .engine
            .join()
            .map_err(|_| Error::ThreadPanic("reassembly".into()))?;
        let consumer = self
            .consumer
            .join()
            .map_err(|_| Error::ThreadPanic("consumer".into()))?;

        let summary = PipelineSummary {
            source,
            engine,
            consumer,
            outbound_dropped,
        };
        debug!(?summary, "pipeline finished");
        Ok(summary)
    }
}

fn spawn_source<S: PacketSource>(
    mut source: S,
    mut tx: Producer<Datagram>,
    token: StopToken,
) -> Result<JoinHandle<SourceStats>> {
    let handle = thread::Builder::new()
        .name("source".into())
        .spawn(move || {
            let span = span!(Level::DEBUG, "source");
            let _guard = span.enter();
            let mut stats = SourceStats::default();

            while !token.is_stopped() {
                match source.recv() {
                    Ok(Recv::Datagram(dat)) => {
                        stats.received += 1;
                        match tx.push(dat) {
                            Push::Queued => {}
                            Push::Dropped => debug!("inbound queue full, dropped datagram"),
                            Push::Disconnected => {
                                debug!("reassembly gone");
                                break;
                            }
                        }
                    }
                    Ok(Recv::Pending) => continue,
                    Ok(Recv::Closed) => {
                        info!("source closed");
                        break;
                    }
                    Err(err) => {
                        stats.errors += 1;
                        warn!("source failed: {err}");
                        break;
                    }
                }
            }
            stats.queue_dropped = tx.dropped();
            debug!(?stats, "source exiting");
            stats
        })?;
    Ok(handle)
}

fn spawn_engine(
    rx: Consumer<Datagram>,
    mut tx: Producer<ProductContainer>,
    token: StopToken,
    options: PipelineOptions,
) -> Result<JoinHandle<(EngineStats, u64)>> {
    let handle = thread::Builder::new()
        .name("reassembly".into())
        .spawn(move || {
            let span = span!(Level::DEBUG, "reassembly");
            let _guard = span.enter();
            let mut engine = ReassemblyEngine::new();

            while !token.is_stopped() {
                match rx.poll() {
                    Polled::Item(dat) => {
                        let Some(product) = engine.process(&dat).product else {
                            continue;
                        };
                        match tx.push(product) {
                            Push::Queued => {}
                            Push::Dropped => warn!("outbound queue full, dropped product"),
                            Push::Disconnected => {
                                debug!("consumer gone");
                                break;
                            }
                        }
                    }
                    Polled::Drained if options.exit_when_drained => break,
                    Polled::Empty | Polled::Drained => thread::sleep(options.backoff),
                }
            }
            debug!(stats = ?engine.stats(), "reassembly exiting");
            (engine.stats().clone(), tx.dropped())
        })?;
    Ok(handle)
}

fn spawn_consumer<H: ProductHandler>(
    rx: Consumer<ProductContainer>,
    mut handler: H,
    token: StopToken,
    options: PipelineOptions,
) -> Result<JoinHandle<ConsumerStats>> {
    let handle = thread::Builder::new()
        .name("consumer".into())
        .spawn(move || {
            let span = span!(Level::DEBUG, "consumer");
            let _guard = span.enter();
            let mut stats = ConsumerStats::default();

            while !token.is_stopped() {
                match rx.poll() {
                    Polled::Item(product) => {
                        let sequence = product.sequence();
                        match handler.handle(product) {
                            Ok(()) => stats.handled += 1,
                            Err(err) => {
                                stats.failed += 1;
                                warn!(sequence, "failed to handle product: {err}");
                            }
                        }
                    }
                    Polled::Drained if options.exit_when_drained => break,
                    Polled::Empty | Polled::Drained => thread::sleep(options.backoff),
                }
            }
            debug!(?stats, "consumer exiting");
            stats
        })?;
    Ok(handle)
}
