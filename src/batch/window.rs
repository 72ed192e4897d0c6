//! Merge pass over one retired window buffer

use crate::event::{CapturedEvent, FlowRecord};

/// Drain `buffer` and merge its events into one record per flow.
///
/// Events are taken from the back (most recently inserted first). The first
/// event seen for a flow opens its record and fixes the record's sequence
/// number and timestamp; later events only add options not yet present.
/// Records are returned in the order they were opened. `buffer` is left empty
/// with its allocation intact.
pub fn merge_window(buffer: &mut Vec<CapturedEvent>) -> Vec<FlowRecord> {
    let mut flows: Vec<FlowRecord> = Vec::new();

    while let Some(event) = buffer.pop() {
        match flows.iter_mut().find(|flow| flow.key.matches(&event)) {
            Some(flow) => flow.absorb(&event),
            None => flows.push(FlowRecord::from_event(event)),
        }
    }

    flows
}
