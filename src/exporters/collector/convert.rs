// SPDX-License-Identifier: Apache-2.0

use crate::event::Event;
use crate::exporters::collector::proto;

/// Tag carried by every event this agent submits
pub const PERFDATA_TAG: &str = "perfdata";

pub const PERFDATA_ATTRIBUTE: &str = "perfdata";
pub const CHECK_DURATION_ATTRIBUTE: &str = "check-duration";
pub const CHECK_LATENCY_ATTRIBUTE: &str = "check-latency";

pub fn convert_event(event: &Event, extra_tags: &[String]) -> proto::Event {
    let mut tags = Vec::with_capacity(extra_tags.len() + 1);
    tags.push(PERFDATA_TAG.to_string());
    tags.extend(extra_tags.iter().cloned());

    let mut attributes = Vec::new();
    if let Some(perfdata) = &event.perfdata {
        attributes.push(proto::Attribute::new(PERFDATA_ATTRIBUTE, perfdata.as_str()));
    }
    if let Some(duration) = event.execution_time {
        attributes.push(proto::Attribute::new(
            CHECK_DURATION_ATTRIBUTE,
            duration.to_string(),
        ));
    }
    if let Some(latency) = event.latency {
        attributes.push(proto::Attribute::new(
            CHECK_LATENCY_ATTRIBUTE,
            latency.to_string(),
        ));
    }

    proto::Event {
        time: Some(event.time),
        state: Some(event.state.as_str().to_string()),
        service: Some(event.check.clone()),
        host: Some(event.entity.clone()),
        description: Some(event.full_description()),
        tags,
        ttl: event.ttl.map(|ttl| ttl as f32),
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CheckKind, CheckState};

    fn event() -> Event {
        Event {
            kind: CheckKind::Service,
            state: CheckState::Critical,
            entity: "host1".to_string(),
            check: "PING".to_string(),
            summary: "Packet loss 100%".to_string(),
            details: None,
            time: 1700000000,
            perfdata: Some("loss=100%".to_string()),
            execution_time: None,
            latency: None,
            ttl: Some(180.0),
        }
    }

    #[test]
    fn test_convert_event() {
        let converted = convert_event(&event(), &["nagios".to_string()]);

        assert_eq!(converted.time, Some(1700000000));
        assert_eq!(converted.state.as_deref(), Some("critical"));
        assert_eq!(converted.host.as_deref(), Some("host1"));
        assert_eq!(converted.service.as_deref(), Some("PING"));
        assert_eq!(converted.description.as_deref(), Some("Packet loss 100%"));
        assert_eq!(converted.tags, vec!["perfdata", "nagios"]);
        assert_eq!(converted.ttl, Some(180.0));
        assert_eq!(
            converted.attributes,
            vec![proto::Attribute::new("perfdata", "loss=100%")]
        );
    }

    #[test]
    fn test_details_and_timings() {
        let mut event = event();
        event.details = Some("more".to_string());
        event.perfdata = None;
        event.ttl = None;
        event.execution_time = Some(0.5);
        event.latency = Some(0.25);

        let converted = convert_event(&event, &[]);

        assert_eq!(
            converted.description.as_deref(),
            Some("Packet loss 100%\n\nmore")
        );
        assert_eq!(converted.tags, vec!["perfdata"]);
        assert_eq!(converted.ttl, None);
        assert_eq!(
            converted.attributes,
            vec![
                proto::Attribute::new("check-duration", "0.5"),
                proto::Attribute::new("check-latency", "0.25"),
            ]
        );
    }
}
