use crate::config::RunConfig;
use crate::models::{ExtractionMode, InstrumentState};

/// Resolve the final extraction mode for one instrument. First match wins:
/// per-instrument override, global override, state-driven default,
/// run-context fallback, safety default. Total over every input; never
/// fails for a well-formed run config.
pub fn resolve(
    symbol: &str,
    state: Option<InstrumentState>,
    run_config: &RunConfig,
) -> ExtractionMode {
    if let Some(mode) = run_config.override_for(symbol) {
        return mode;
    }

    if let Some(mode) = run_config.extraction_mode {
        return mode;
    }

    match state {
        Some(InstrumentState::Empty) => ExtractionMode::FullBackfill,
        Some(InstrumentState::Sparse) | Some(InstrumentState::Stale) => ExtractionMode::Historical,
        Some(InstrumentState::Current) => ExtractionMode::Incremental,
        // State unknown: lean on the run context, then the cheap default.
        None if run_config.is_backfill_context => ExtractionMode::Historical,
        None => ExtractionMode::Incremental,
    }
}
