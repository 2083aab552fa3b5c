use crate::common::{Error, Result};
use crate::service::aggregator::{OutcomeSender, TaskOutcome};
use crate::service::broker::Publisher;
use crate::service::telemetry::{increment_records_published, increment_task_failures};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use udr::{Codec, Generate};

/// Body of one generation task.
///
/// Every path ends in exactly one outcome on `sink`; failures are reported,
/// never retried. The permit is released before the outcome is sent so a full
/// outcome buffer cannot hold up other requests' tasks.
pub(crate) async fn run_task(
    task: usize,
    permit: OwnedSemaphorePermit,
    generator: Arc<dyn Generate>,
    codec: Arc<dyn Codec>,
    publisher: Arc<dyn Publisher>,
    sink: OutcomeSender,
) {
    let result = produce(&*generator, &*codec, &*publisher).await;
    drop(permit);

    match &result {
        Ok(()) => increment_records_published(),
        Err(e) => {
            increment_task_failures();
            tracing::warn!(task, "Task failed: {e}");
        }
    }

    if sink.send(TaskOutcome { task, result }).await.is_err() {
        tracing::debug!(task, "Aggregator gone, outcome dropped");
    }
}

async fn produce(
    generator: &dyn Generate,
    codec: &dyn Codec,
    publisher: &dyn Publisher,
) -> Result<()> {
    let udr = generator.generate().map_err(Error::Generation)?;
    let payload = codec.encode(&udr).map_err(Error::Serialization)?;
    publisher.publish(&payload).await?;
    tracing::trace!(record_id = %udr.record_id, queue = publisher.queue(), "Published");
    Ok(())
}
