// SPDX-License-Identifier: Apache-2.0

//! JSON document pushed onto the queue for each event.

use serde::Serialize;

use crate::event::Event;

#[derive(Debug, Serialize)]
struct QueuedEvent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    state: &'static str,
    entity: &'a str,
    check: &'a str,
    summary: &'a str,
    time: i64,
    // The event processor reading the queue expects both keys to be present
    details: &'a str,
    perfdata: &'a str,
}

impl<'a> From<&'a Event> for QueuedEvent<'a> {
    fn from(event: &'a Event) -> Self {
        Self {
            kind: event.kind.as_str(),
            state: event.state.as_str(),
            entity: &event.entity,
            check: &event.check,
            summary: &event.summary,
            time: event.time,
            details: event.details.as_deref().unwrap_or_default(),
            perfdata: event.perfdata.as_deref().unwrap_or_default(),
        }
    }
}

pub fn encode_event(event: &Event) -> serde_json::Result<String> {
    serde_json::to_string(&QueuedEvent::from(event))
}
