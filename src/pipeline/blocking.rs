//! Sequential strategy: fetch, buffer and flush in one loop.

use tracing::debug;

use super::state::{PipelineState, StateMachine};
use super::writer::BatchWriter;
use super::{FetchTally, RunContext};
use crate::buffer::IngestBuffer;
use crate::sink::ReplaySink;

pub(crate) async fn run(
    ctx: &RunContext<'_>,
    machine: &mut StateMachine,
    sink: &mut dyn ReplaySink,
    writer: &mut BatchWriter<'_>,
) -> FetchTally {
    let mut tally = FetchTally::default();
    let mut buffer = IngestBuffer::new();

    for cursor in ctx.plan.cursors_from(ctx.first_step) {
        if ctx.stop.is_stop_requested() {
            tally.stop_before(ctx, cursor);
            break;
        }

        tally.fetch_step(ctx, cursor, &mut buffer).await;

        if buffer.should_flush(ctx.threshold) {
            machine.advance(PipelineState::Flushing);
            debug!(buffered = buffer.len(), "threshold exceeded");
            writer.submit(sink, buffer.drain()).await;
            machine.advance(PipelineState::Fetching);
        }
    }

    if tally.stopped_at.is_some() {
        machine.advance(PipelineState::Cancelled);
    } else {
        machine.advance(PipelineState::Flushing);
    }
    writer.submit(sink, buffer.drain()).await;
    writer.drain(sink).await;

    tally
}
