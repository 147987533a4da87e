use chrono::DateTime;
use chrono::Utc;

use crate::export::BufferedExport;
use crate::export::SensorDataExport;
use crate::Field;

/// Splits a long export into bounded chunks.
///
/// Wraps a buffered encoder; whenever a new timestamp opens and the buffer
/// has reached the threshold, the current node and document are closed, the
/// finished chunk is handed to the callback, and the document and the node
/// context are reopened before the timestamp proceeds. Every chunk is an
/// independently well-formed document.
pub struct PartitionedExport<E, F>
where
    E: BufferedExport,
    F: FnMut(String),
{
    inner: E,
    threshold: usize,
    on_chunk: F,
    node: Option<NodeContext>,
    timestamps_in_chunk: usize,
}

#[derive(Clone)]
struct NodeContext {
    node_id: String,
    cache_type: Option<String>,
    source_id: Option<String>,
}

impl<E, F> PartitionedExport<E, F>
where
    E: BufferedExport,
    F: FnMut(String),
{
    pub fn new(
        inner: E,
        threshold: usize,
        on_chunk: F,
    ) -> Self {
        PartitionedExport {
            inner,
            threshold,
            on_chunk,
            node: None,
            timestamps_in_chunk: 0,
        }
    }

    /// Returns whatever the final chunk accumulated. Call after `end`; the
    /// result may be empty when the last partition boundary coincided with
    /// the end of the data.
    pub fn finish(mut self) -> String {
        self.inner.take_buffer()
    }
}

impl<E, F> SensorDataExport for PartitionedExport<E, F>
where
    E: BufferedExport,
    F: FnMut(String),
{
    fn start(&mut self) {
        self.timestamps_in_chunk = 0;
        self.inner.start();
    }

    fn end(&mut self) {
        self.inner.end();
    }

    fn start_node(
        &mut self,
        node_id: &str,
        cache_type: Option<&str>,
        source_id: Option<&str>,
    ) {
        self.node = Some(NodeContext {
            node_id: node_id.to_string(),
            cache_type: cache_type.map(str::to_owned),
            source_id: source_id.map(str::to_owned),
        });
        self.inner.start_node(node_id, cache_type, source_id);
    }

    fn end_node(&mut self) {
        self.node = None;
        self.inner.end_node();
    }

    fn start_timestamp(
        &mut self,
        timepoint: DateTime<Utc>,
    ) {
        // Only split once the chunk holds at least one complete timestamp,
        // so no chunk goes out empty.
        if self.timestamps_in_chunk > 0 && self.inner.buffered_len() >= self.threshold {
            if let Some(node) = self.node.clone() {
                self.inner.end_node();
                self.inner.end();
                (self.on_chunk)(self.inner.take_buffer());
                self.timestamps_in_chunk = 0;
                self.inner.start();
                self.inner.start_node(
                    &node.node_id,
                    node.cache_type.as_deref(),
                    node.source_id.as_deref(),
                );
            }
        }
        self.inner.start_timestamp(timepoint);
        self.timestamps_in_chunk += 1;
    }

    fn end_timestamp(&mut self) {
        self.inner.end_timestamp();
    }

    fn field(
        &mut self,
        field: &Field,
    ) {
        self.inner.field(field);
    }
}
