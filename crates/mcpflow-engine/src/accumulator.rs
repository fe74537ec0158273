//! Assembles tool calls from streamed fragments.
//!
//! Fragments are keyed by the output item they belong to, so calls whose
//! argument deltas interleave still come out whole.

use mcpflow_core::ToolCallRequest;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct PartialToolCall {
    item_id: String,
    call_id: String,
    name: String,
    arguments: String,
}

/// Per-round tool call builder.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    /// Open calls, in the order they were started
    open: Vec<PartialToolCall>,
    /// Finished calls, in the order they completed
    completed: Vec<ToolCallRequest>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a call for `item_id`. A repeated start refreshes the identifiers
    /// and keeps any arguments already received.
    pub fn start(&mut self, item_id: &str, call_id: &str, name: &str) {
        let call = self.entry(item_id);
        call.call_id = call_id.to_string();
        call.name = name.to_string();
    }

    /// Append an argument fragment. Without an item id the fragment goes to
    /// the most recently opened call.
    pub fn append(&mut self, item_id: Option<&str>, delta: &str) {
        let call = match item_id {
            Some(id) => self.entry(id),
            None => match self.open.last_mut() {
                Some(call) => call,
                None => {
                    debug!("Dropping argument fragment with no open tool call");
                    return;
                }
            },
        };
        call.arguments.push_str(delta);
    }

    /// Finish the call for `item_id`. Values given here override what was
    /// accumulated.
    pub fn finish(
        &mut self,
        item_id: &str,
        call_id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let mut call = match self.open.iter().position(|c| c.item_id == item_id) {
            Some(index) => self.open.remove(index),
            None => PartialToolCall {
                item_id: item_id.to_string(),
                ..Default::default()
            },
        };

        if let Some(call_id) = call_id {
            call.call_id = call_id.to_string();
        }
        if let Some(name) = name {
            call.name = name.to_string();
        }
        if let Some(arguments) = arguments {
            call.arguments = arguments.to_string();
        }

        if call.name.is_empty() {
            warn!(item_id, "Tool call finished without a name, skipping");
            return;
        }
        if call.call_id.is_empty() {
            call.call_id = call.item_id.clone();
        }

        self.completed.push(ToolCallRequest::new(
            call.call_id,
            call.name,
            call.arguments,
        ));
    }

    /// Calls started but never finished.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn has_completed(&self) -> bool {
        !self.completed.is_empty()
    }

    /// Consume the builder, returning the finished calls.
    pub fn into_completed(self) -> Vec<ToolCallRequest> {
        if !self.open.is_empty() {
            debug!(open = self.open.len(), "Discarding unfinished tool calls");
        }
        self.completed
    }

    fn entry(&mut self, item_id: &str) -> &mut PartialToolCall {
        let index = match self.open.iter().position(|c| c.item_id == item_id) {
            Some(index) => index,
            None => {
                self.open.push(PartialToolCall {
                    item_id: item_id.to_string(),
                    ..Default::default()
                });
                self.open.len() - 1
            }
        };
        &mut self.open[index]
    }
}
