//! Producer/consumer strategy on one event loop.
//!
//! The producer fetches and batches; the consumer persists. They meet at a
//! bounded channel of `queue_capacity` batches, so the producer waits when
//! the store falls behind. Both futures run on the calling task via
//! `tokio::join!`: interleaving happens only at `.await` points.

use tokio::sync::mpsc;
use tracing::debug;

use super::state::{PipelineState, StateMachine};
use super::writer::BatchWriter;
use super::{FetchTally, RunContext};
use crate::buffer::IngestBuffer;
use crate::replay::ReplayRecord;
use crate::sink::ReplaySink;

enum Message {
    Batch(Vec<ReplayRecord>),
    Done,
}

pub(crate) async fn run(
    ctx: &RunContext<'_>,
    machine: &mut StateMachine,
    sink: &mut dyn ReplaySink,
    writer: &mut BatchWriter<'_>,
) -> FetchTally {
    let (tx, rx) = mpsc::channel(ctx.queue_capacity);

    let (tally, ()) = tokio::join!(produce(ctx, tx), consume(rx, sink, writer));

    if tally.stopped_at.is_some() {
        machine.advance(PipelineState::Cancelled);
    }
    tally
}

async fn produce(ctx: &RunContext<'_>, tx: mpsc::Sender<Message>) -> FetchTally {
    let mut tally = FetchTally::default();
    let mut buffer = IngestBuffer::new();

    for cursor in ctx.plan.cursors_from(ctx.first_step) {
        if ctx.stop.is_stop_requested() {
            tally.stop_before(ctx, cursor);
            break;
        }

        tally.fetch_step(ctx, cursor, &mut buffer).await;

        if buffer.should_flush(ctx.threshold) {
            debug!(buffered = buffer.len(), "queueing batch");
            if tx.send(Message::Batch(buffer.drain())).await.is_err() {
                ctx.reporter.error("Writer stopped unexpectedly; ending fetch loop");
                return tally;
            }
        }
    }

    if !buffer.is_empty() && tx.send(Message::Batch(buffer.drain())).await.is_err() {
        ctx.reporter.error("Writer stopped before the final batch was queued");
    }
    let _ = tx.send(Message::Done).await;
    tally
}

async fn consume(
    mut rx: mpsc::Receiver<Message>,
    sink: &mut dyn ReplaySink,
    writer: &mut BatchWriter<'_>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Batch(records) => writer.submit(sink, records).await,
            Message::Done => break,
        }
    }
    writer.drain(sink).await;
}
