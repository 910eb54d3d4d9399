//! Inbound frame decoding.
//!
//! ```text
//! {"type":"message","message":{roomId,message,actorId,timestamp?}} -> ChatMessage
//! {"type":"room","room":{roomId,...}}                              -> Room
//! {"type":"event","event":{target:"room",type:"call",roomid}}      -> SystemEvent("call")
//! {"type":"event","event":{type:X,...}}                            -> SystemEvent(X)
//! {"type":"ping"}                                                  -> Ping
//! {"type":X,...}                                                   -> SystemEvent(X)
//! ```

use serde_json::{Map, Value};
use talkpush_core::{unix_now, Event, EventBuilder, EventKind, ParseError, CALL_EVENT};

/// Decodes one raw frame, stamping receipt time where the frame has none.
pub fn dispatch(raw: &str) -> Result<Event, ParseError> {
    dispatch_at(raw, unix_now())
}

/// Decodes one raw frame; `now` is used when the frame carries no timestamp.
pub fn dispatch_at(raw: &str, now: i64) -> Result<Event, ParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let frame = value.as_object().ok_or(ParseError::NotAnObject)?;
    let frame_type = frame
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingType)?;

    let builder = match frame_type {
        "message" => message_event(frame, now)?,
        "room" => room_event(frame, now),
        "event" => server_event(frame, now),
        "ping" => Event::builder(EventKind::Ping, now),
        other => Event::builder(EventKind::system(other), now).payload(value.clone()),
    };

    Ok(builder.raw(raw).build())
}

fn message_event(frame: &Map<String, Value>, now: i64) -> Result<EventBuilder, ParseError> {
    let missing = |field| ParseError::MissingField {
        frame: "message",
        field,
    };

    let body = frame
        .get("message")
        .and_then(Value::as_object)
        .ok_or_else(|| missing("message"))?;
    let room_id = non_empty(body, "roomId").ok_or_else(|| missing("roomId"))?;
    let actor_id = non_empty(body, "actorId").ok_or_else(|| missing("actorId"))?;
    non_empty(body, "message").ok_or_else(|| missing("message"))?;

    let timestamp = body
        .get("timestamp")
        .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f as i64)))
        .unwrap_or(now);

    let mut builder = Event::builder(EventKind::ChatMessage, timestamp)
        .channel(room_id)
        .sender_id(actor_id)
        .payload(Value::Object(body.clone()));
    if let Some(name) = non_empty(body, "actorDisplayName") {
        builder = builder.sender_name(name);
    }
    Ok(builder)
}

fn room_event(frame: &Map<String, Value>, now: i64) -> EventBuilder {
    let body = frame.get("room").and_then(Value::as_object);
    let room_id = body
        .and_then(|b| non_empty(b, "roomId"))
        .or_else(|| non_empty(frame, "roomId"));

    let mut builder = Event::builder(EventKind::Room, now)
        .payload(body.cloned().map(Value::Object).unwrap_or(Value::Null));
    if let Some(room_id) = room_id {
        builder = builder.channel(room_id);
    }
    builder
}

fn server_event(frame: &Map<String, Value>, now: i64) -> EventBuilder {
    let Some(body) = frame.get("event").and_then(Value::as_object) else {
        return Event::builder(EventKind::system("event"), now);
    };

    let target = body.get("target").and_then(Value::as_str).unwrap_or_default();
    let event_type = non_empty(body, "type").unwrap_or("event");
    let name = if target == "room" && event_type == CALL_EVENT {
        CALL_EVENT
    } else {
        event_type
    };

    let mut builder =
        Event::builder(EventKind::system(name), now).payload(Value::Object(body.clone()));
    if let Some(room_id) = non_empty(body, "roomid").or_else(|| non_empty(body, "roomId")) {
        builder = builder.channel(room_id);
    }
    builder
}

fn non_empty<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
