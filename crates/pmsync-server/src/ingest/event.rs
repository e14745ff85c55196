//! VES file-ready event decoding
//!
//! Only the envelope skeleton is strictly typed. Each `arrayOfNamedHashMap`
//! entry is decoded on its own so one bad entry never invalidates the rest of
//! the notification.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("{0}")]
    Malformed(String),
}

/// One archive announced by the event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub location: String,
    pub compression: Option<String>,
    pub file_format_type: Option<String>,
}

/// Decoded form of one broker message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocationEvent {
    pub source_name: String,
    pub event_id: Option<String>,
    pub locations: Vec<FileLocation>,
}

#[derive(Deserialize)]
struct Envelope {
    event: Option<VesEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VesEvent {
    common_event_header: Option<CommonEventHeader>,
    notification_fields: Option<NotificationFields>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommonEventHeader {
    source_name: Option<String>,
    event_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationFields {
    #[serde(default)]
    array_of_named_hash_map: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamedHashMap {
    hash_map: Option<FileHashMap>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileHashMap {
    location: Option<String>,
    compression: Option<String>,
    file_format_type: Option<String>,
}

/// Decode a raw broker payload into a [`FileLocationEvent`]
pub fn parse(raw: &[u8]) -> Result<FileLocationEvent, EventError> {
    let envelope: Envelope = serde_json::from_slice(raw)
        .map_err(|e| EventError::Malformed(format!("invalid JSON envelope: {e}")))?;

    let event = envelope
        .event
        .ok_or_else(|| EventError::Malformed("missing 'event'".to_string()))?;
    let header = event
        .common_event_header
        .ok_or_else(|| EventError::Malformed("missing 'event.commonEventHeader'".to_string()))?;
    let source_name = header
        .source_name
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            EventError::Malformed("missing 'event.commonEventHeader.sourceName'".to_string())
        })?;
    let fields = event
        .notification_fields
        .ok_or_else(|| EventError::Malformed("missing 'event.notificationFields'".to_string()))?;

    let locations = fields
        .array_of_named_hash_map
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| decode_entry(index, entry))
        .collect();

    Ok(FileLocationEvent {
        source_name,
        event_id: header.event_id,
        locations,
    })
}

fn decode_entry(index: usize, entry: Value) -> Option<FileLocation> {
    let named: NamedHashMap = match serde_json::from_value(entry) {
        Ok(named) => named,
        Err(e) => {
            debug!(index, error = %e, "Skipping undecodable hash map entry");
            return None;
        },
    };

    let hash_map = named.hash_map?;
    match hash_map.location {
        Some(location) if !location.trim().is_empty() => Some(FileLocation {
            location,
            compression: hash_map.compression,
            file_format_type: hash_map.file_format_type,
        }),
        _ => {
            debug!(index, "Skipping hash map entry without a location");
            None
        },
    }
}
