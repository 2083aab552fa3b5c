use crate::common::{RequestSpec, Result};
use crate::service::aggregator::Tally;
use crate::service::dispatcher::Dispatcher;
use tracing::Instrument;

/// Serves the one implicit request of a non-daemon run, a single normal
/// record, and waits for its outcome.
///
/// # Errors
///
/// Only fails if the implicit request cannot be routed. A failed record shows
/// up in the returned [`Tally`].
pub async fn run_batch(dispatcher: &Dispatcher) -> Result<Tally> {
    let spec = RequestSpec::batch();
    let route = dispatcher.router().route(&spec.error_type)?;
    let span = tracing::info_span!("request", id = "batch", kind = %route.kind, count = spec.count);

    let tally = dispatcher.execute(spec.count, route).instrument(span).await;
    if tally.is_success() {
        tracing::info!(published = tally.succeeded, "Batch run complete");
    } else {
        tracing::error!(
            failed = tally.failed,
            missing = tally.missing,
            "Batch run failed"
        );
    }
    Ok(tally)
}
