//! Evaluation driver.

use crate::error::EngineResult;
use crate::plan::Plan;
use std::time::{Duration, Instant};

/// Outcome of a successful evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationSummary {
    /// Tuples consumed by the sink
    pub tuples: usize,
    pub elapsed: Duration,
}

/// Open the sink, drain the plan into it, and close it.
///
/// A failed open has already closed whatever it opened, so nothing is closed
/// here in that case. Once the sink is open it is always closed; an error
/// while processing wins over an error while closing.
pub fn evaluate(plan: &mut Plan) -> EngineResult<EvaluationSummary> {
    let started = Instant::now();
    let sink = plan.sink_mut();
    log::info!("evaluating plan rooted at '{}'", sink.id());

    sink.open()?;
    let processed = sink.process_tuples();
    let closed = sink.close();

    let tuples = match (processed, closed) {
        (Ok(tuples), Ok(())) => tuples,
        (Ok(_), Err(e)) => return Err(e),
        (Err(e), closed) => {
            if let Err(cleanup) = closed {
                log::warn!("closing plan after a failed evaluation also failed: {}", cleanup);
            }
            return Err(e);
        }
    };

    let summary = EvaluationSummary {
        tuples,
        elapsed: started.elapsed(),
    };
    log::info!(
        "plan '{}' produced {} tuples in {:?}",
        sink.id(),
        summary.tuples,
        summary.elapsed
    );
    Ok(summary)
}
