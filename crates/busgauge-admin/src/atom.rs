//! Atom feed parsing for management API responses.
//!
//! List calls return a `<feed>` of `<entry>` elements; detail calls return a
//! single `<entry>`. Each entry carries the entity name in `<title>` and a
//! description (`QueueDescription`, `TopicDescription`, …) under
//! `<content>`. Leaf elements are matched by local name so the
//! `d2p1:`-style namespace prefixes the service emits do not matter.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{AdminError, AdminResult};
use crate::types::{QueueDetail, SubscriptionDetail, TopicDetail};

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// One `<entry>`: its title plus every leaf value found under `<content>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomEntry {
    pub title: String,
    pub fields: HashMap<String, String>,
}

impl AtomEntry {
    fn u64(&self, field: &str) -> u64 {
        self.fields
            .get(field)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let parsed = DateTime::parse_from_rfc3339(self.fields.get(field)?.trim()).ok()?;
        // The service reports "never" as 0001-01-01.
        (parsed.year() > 1).then(|| parsed.with_timezone(&Utc))
    }

    pub fn into_queue(self) -> QueueDetail {
        QueueDetail {
            created_at: self.timestamp("CreatedAt"),
            updated_at: self.timestamp("UpdatedAt"),
            accessed_at: self.timestamp("AccessedAt"),
            total_messages: self.u64("MessageCount"),
            active_messages: self.u64("ActiveMessageCount"),
            dead_letter_messages: self.u64("DeadLetterMessageCount"),
            scheduled_messages: self.u64("ScheduledMessageCount"),
            transfer_messages: self.u64("TransferMessageCount"),
            transfer_dead_letter_messages: self.u64("TransferDeadLetterMessageCount"),
            size_bytes: self.u64("SizeInBytes"),
            max_size_bytes: self.u64("MaxSizeInMegabytes").saturating_mul(BYTES_PER_MEGABYTE),
            name: self.title,
        }
    }

    pub fn into_topic(self) -> TopicDetail {
        TopicDetail {
            size_bytes: self.u64("SizeInBytes"),
            max_size_bytes: self.u64("MaxSizeInMegabytes").saturating_mul(BYTES_PER_MEGABYTE),
            subscription_count: self.u64("SubscriptionCount"),
            name: self.title,
        }
    }

    pub fn into_subscription(self, topic_name: &str) -> SubscriptionDetail {
        SubscriptionDetail {
            topic_name: topic_name.to_string(),
            active_messages: self.u64("ActiveMessageCount"),
            dead_letter_messages: self.u64("DeadLetterMessageCount"),
            scheduled_messages: self.u64("ScheduledMessageCount"),
            transfer_messages: self.u64("TransferMessageCount"),
            transfer_dead_letter_messages: self.u64("TransferDeadLetterMessageCount"),
            name: self.title,
        }
    }
}

/// Parse every `<entry>` in a feed or single-entry document.
pub fn parse_entries(xml: &str) -> AdminResult<Vec<AtomEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<AtomEntry> = None;
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "entry" {
                    current = Some(AtomEntry::default());
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("entry") {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                let text = t
                    .unescape()
                    .map_err(|e| AdminError::Parse(e.to_string()))?
                    .into_owned();
                let Some(leaf) = path.last() else {
                    continue;
                };
                let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
                if leaf == "title" && parent == Some("entry") {
                    entry.title = text;
                } else if path.iter().any(|p| p == "content") {
                    entry.fields.insert(leaf.clone(), text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AdminError::Parse(format!(
                    "xml error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    Ok(entries)
}

/// Parse a detail response; an empty document means the entity is gone.
pub fn parse_single(xml: &str, entity: &str) -> AdminResult<AtomEntry> {
    parse_entries(xml)?
        .into_iter()
        .next()
        .ok_or_else(|| AdminError::NotFound(entity.to_string()))
}
