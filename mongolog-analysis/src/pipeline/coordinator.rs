//! Pipeline coordinator — drives filter, extractor, and accumulators over
//! input sources with a bounded worker pool.
//!
//! One reader loop chunks admitted lines onto a bounded channel; scoped
//! worker threads extract and fan out. The reader waits for the pool to
//! quiesce at each source's EOF, so per-source completion is observable.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};

use mongolog_core::config::AnalysisConfig;
use mongolog_core::errors::{ConfigError, RunError};
use mongolog_core::{ConnectionEvent, PipelineCounters};

use crate::accumulators::error_code::ErrorCodeAccumulator;
use crate::accumulators::index_usage::IndexUsageAccumulator;
use crate::accumulators::operation::OperationAccumulator;
use crate::accumulators::plan_cache::PlanCacheAccumulator;
use crate::accumulators::query_hash::QueryHashAccumulator;
use crate::accumulators::transaction::TransactionAccumulator;
use crate::accumulators::Accumulator;
use crate::connections::ConnectionJoin;
use crate::extract::RecordExtractor;
use crate::filter::{Admission, LineFilter};
use crate::report::RunSummary;

use super::source::{LogSource, SourceOutcome, SourceState};

/// Cheap marker that makes the auth pre-pass skip almost every line without
/// parsing it.
const AUTH_MARKER: &str = "Successfully authenticated";

/// Bound on the ordered connection-event queue. Event lines are sparse
/// relative to record lines, so this stays small.
const EVENT_QUEUE_DEPTH: usize = 4_096;

/// Drain-and-stop signal shared between the coordinator and its caller.
/// On cancel, no new chunks are enqueued; in-flight chunks complete and the
/// accumulators freeze with whatever they have.
#[derive(Clone, Default)]
pub struct PipelineCancellation {
    flag: Arc<AtomicBool>,
}

impl PipelineCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Every active record sink for a run, fanned into by each worker.
pub struct AccumulatorSet {
    pub operations: Arc<OperationAccumulator>,
    pub plan_cache: Arc<PlanCacheAccumulator>,
    pub query_hash: Arc<QueryHashAccumulator>,
    pub transactions: Arc<TransactionAccumulator>,
    pub errors: Arc<ErrorCodeAccumulator>,
    pub index_usage: Arc<IndexUsageAccumulator>,
    sinks: Vec<Arc<dyn Accumulator>>,
}

impl AccumulatorSet {
    pub fn new(counters: &Arc<PipelineCounters>, config: &AnalysisConfig) -> Self {
        let rank = config.pipeline.effective_percentile_rank();
        let top_n = config.pipeline.effective_slow_planning_top_n();

        let operations = Arc::new(OperationAccumulator::new(Arc::clone(counters), rank));
        let plan_cache = Arc::new(PlanCacheAccumulator::new(Arc::clone(counters), rank));
        let query_hash = Arc::new(QueryHashAccumulator::new(Arc::clone(counters), rank, top_n));
        let transactions = Arc::new(TransactionAccumulator::new(Arc::clone(counters), rank));
        let errors = Arc::new(ErrorCodeAccumulator::new());
        let index_usage = Arc::new(IndexUsageAccumulator::new(Arc::clone(counters), rank));

        let sinks: Vec<Arc<dyn Accumulator>> = vec![
            Arc::clone(&operations) as Arc<dyn Accumulator>,
            Arc::clone(&plan_cache) as Arc<dyn Accumulator>,
            Arc::clone(&query_hash) as Arc<dyn Accumulator>,
            Arc::clone(&transactions) as Arc<dyn Accumulator>,
            Arc::clone(&errors) as Arc<dyn Accumulator>,
            Arc::clone(&index_usage) as Arc<dyn Accumulator>,
        ];

        Self {
            operations,
            plan_cache,
            query_hash,
            transactions,
            errors,
            index_usage,
            sinks,
        }
    }

    pub fn sinks(&self) -> &[Arc<dyn Accumulator>] {
        &self.sinks
    }
}

/// The coordinator.
pub struct PipelineCoordinator {
    config: AnalysisConfig,
    filter: LineFilter,
    extractor: RecordExtractor,
    counters: Arc<PipelineCounters>,
    cancellation: PipelineCancellation,
}

impl PipelineCoordinator {
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        let filter = LineFilter::new(&config.filter)?;
        Ok(Self {
            config,
            filter,
            extractor: RecordExtractor::new(),
            counters: Arc::new(PipelineCounters::new()),
            cancellation: PipelineCancellation::new(),
        })
    }

    pub fn counters(&self) -> &Arc<PipelineCounters> {
        &self.counters
    }

    pub fn cancellation(&self) -> &PipelineCancellation {
        &self.cancellation
    }

    /// Run the pipeline over the given sources and build the summary.
    ///
    /// Individual source failures degrade to per-source outcomes; the run
    /// itself fails only when every source failed to open.
    pub fn run(&self, paths: &[PathBuf]) -> Result<RunSummary, RunError> {
        let join_enabled = self.config.pipeline.effective_connection_join();
        let join = join_enabled.then(|| {
            Arc::new(ConnectionJoin::new(
                Arc::clone(&self.counters),
                self.config.pipeline.effective_connection_soft_cap(),
                self.config.pipeline.effective_lifetime_sample_rate(),
                self.config.pipeline.rng_seed,
            ))
        });

        if let Some(join) = &join {
            if self.config.pipeline.effective_auth_prepass() {
                self.auth_prepass(paths, join);
            }
        }

        let accumulators = AccumulatorSet::new(&self.counters, &self.config);
        let outcomes = self.ingest(paths, &accumulators, join.as_deref());

        let failed_open = outcomes
            .iter()
            .filter(|o| o.state == SourceState::Opened && o.error.is_some())
            .count();
        if !paths.is_empty() && failed_open == paths.len() {
            return Err(RunError::AllSourcesFailed { failed: failed_open });
        }

        let still_open = join.as_deref().map_or(0, ConnectionJoin::finish);
        Ok(RunSummary::build(
            outcomes,
            self.counters.snapshot(),
            &accumulators,
            join.as_deref(),
            still_open,
        ))
    }

    /// First pass of the two-pass connection join: feed only authentication
    /// events so usernames are linked before client metadata is keyed.
    fn auth_prepass(&self, paths: &[PathBuf], join: &Arc<ConnectionJoin>) {
        // Scratch counters: the pre-pass must not double-count the run.
        let scratch = PipelineCounters::new();
        let mut buf = String::new();
        for path in paths {
            let Ok(mut source) = LogSource::open(path) else {
                continue;
            };
            loop {
                match source.next_line(&mut buf) {
                    Ok(Some(())) => {
                        if !buf.contains(AUTH_MARKER) {
                            continue;
                        }
                        let extraction = self.extractor.extract(&buf, &scratch);
                        if let Some(event @ ConnectionEvent::Auth { .. }) = extraction.event {
                            join.handle_event(&event);
                        }
                    }
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
        }
    }

    /// The main pass: read, filter, chunk, dispatch, fan out.
    ///
    /// Record-bearing chunks go to the worker pool, where cross-record order
    /// does not matter. Connection-event lines go to one dedicated consumer
    /// instead, because the join's lifecycle semantics (start before end)
    /// need the stream order preserved.
    fn ingest(
        &self,
        paths: &[PathBuf],
        accumulators: &AccumulatorSet,
        join: Option<&ConnectionJoin>,
    ) -> Vec<SourceOutcome> {
        let chunk_size = self.config.pipeline.effective_chunk_size();
        let workers = self.config.pipeline.effective_workers();
        let queue_depth = self.config.pipeline.effective_queue_depth();

        let (tx, rx) = bounded::<Vec<String>>(queue_depth);
        let (event_tx, event_rx) = bounded::<String>(EVENT_QUEUE_DEPTH);
        let in_flight = AtomicUsize::new(0);
        let events_in_flight = AtomicUsize::new(0);
        let mut outcomes = Vec::with_capacity(paths.len());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let rx: Receiver<Vec<String>> = rx.clone();
                let in_flight = &in_flight;
                scope.spawn(move || {
                    while let Ok(chunk) = rx.recv() {
                        for line in &chunk {
                            self.process_line(line, accumulators);
                        }
                        in_flight.fetch_sub(1, Ordering::AcqRel);
                    }
                });
            }
            drop(rx);

            if let Some(join) = join {
                let events_in_flight = &events_in_flight;
                scope.spawn(move || {
                    // Double-counting guard: admitted event lines are also
                    // extracted by a worker against the real counters.
                    let scratch = PipelineCounters::new();
                    while let Ok(line) = event_rx.recv() {
                        let extraction = self.extractor.extract(&line, &scratch);
                        if let Some(event) = &extraction.event {
                            join.handle_event(event);
                        }
                        events_in_flight.fetch_sub(1, Ordering::AcqRel);
                    }
                });
            } else {
                drop(event_rx);
            }

            for path in paths {
                outcomes.push(self.read_source(
                    path,
                    chunk_size,
                    &tx,
                    &event_tx,
                    &in_flight,
                    &events_in_flight,
                    join.is_some(),
                ));
                if self.cancellation.is_cancelled() {
                    break;
                }
            }
            drop(tx);
            drop(event_tx);
        });

        outcomes
    }

    #[allow(clippy::too_many_arguments)]
    fn read_source(
        &self,
        path: &Path,
        chunk_size: usize,
        tx: &crossbeam_channel::Sender<Vec<String>>,
        event_tx: &crossbeam_channel::Sender<String>,
        in_flight: &AtomicUsize,
        events_in_flight: &AtomicUsize,
        join_active: bool,
    ) -> SourceOutcome {
        let mut source = match LogSource::open(path) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to open source");
                return SourceOutcome {
                    path: path.to_path_buf(),
                    state: SourceState::Opened,
                    lines_read: 0,
                    error: Some(e.to_string()),
                };
            }
        };

        let mut state = SourceState::Opened;
        let mut error = None;
        let mut chunk: Vec<String> = Vec::with_capacity(chunk_size);
        let mut buf = String::new();

        loop {
            if self.cancellation.is_cancelled() {
                // Drain-and-stop: the partial chunk is abandoned unsent.
                chunk.clear();
                break;
            }
            match source.next_line(&mut buf) {
                Ok(Some(())) => {
                    if state == SourceState::Opened {
                        state = SourceState::Reading;
                    }
                    self.counters.lines_read.fetch_add(1, Ordering::Relaxed);

                    let is_event = join_active && self.filter.is_connection_event(buf.as_bytes());
                    let admitted = self.filter.classify(buf.as_bytes()) == Admission::Admit;

                    if is_event {
                        events_in_flight.fetch_add(1, Ordering::AcqRel);
                        if event_tx.send(buf.clone()).is_err() {
                            events_in_flight.fetch_sub(1, Ordering::AcqRel);
                        }
                    }
                    if admitted {
                        chunk.push(std::mem::take(&mut buf));
                        if chunk.len() >= chunk_size {
                            self.dispatch(&mut chunk, chunk_size, tx, in_flight);
                        }
                    } else if !is_event {
                        self.counters.lines_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "read error, closing source");
                    error = Some(e.to_string());
                    break;
                }
            }
        }

        // EOF (or failure): flush the tail chunk and wait for the pool to
        // quiesce before declaring the source closed.
        state = SourceState::Draining;
        tracing::debug!(path = %path.display(), state = ?state, "source at EOF");
        if !chunk.is_empty() {
            self.dispatch(&mut chunk, 0, tx, in_flight);
        }
        while in_flight.load(Ordering::Acquire) > 0 || events_in_flight.load(Ordering::Acquire) > 0
        {
            std::thread::yield_now();
        }
        state = SourceState::Closed;

        SourceOutcome {
            path: path.to_path_buf(),
            state,
            lines_read: source.lines_read(),
            error,
        }
    }

    fn dispatch(
        &self,
        chunk: &mut Vec<String>,
        refill_capacity: usize,
        tx: &crossbeam_channel::Sender<Vec<String>>,
        in_flight: &AtomicUsize,
    ) {
        let full = std::mem::replace(chunk, Vec::with_capacity(refill_capacity));
        in_flight.fetch_add(1, Ordering::AcqRel);
        if tx.send(full).is_err() {
            // Workers are gone; nothing will decrement for this chunk.
            in_flight.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn process_line(&self, line: &str, accumulators: &AccumulatorSet) {
        let extraction = self.extractor.extract(line, &self.counters);
        if let Some(record) = &extraction.record {
            for sink in accumulators.sinks() {
                sink.record(record);
            }
        }
    }
}
