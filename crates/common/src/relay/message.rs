use std::sync::Arc;

use serde_json::{json, Value};

use super::event::RelayEvent;
use super::filter::Filter;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unable to parse message")]
    Parse,
    #[error("Unable to read message")]
    NotAnArray,
    #[error("Unable to handle message")]
    UnknownVerb(String),
    #[error("missing subscription id")]
    MissingSubscriptionId,
    #[error("invalid filter: {reason}")]
    InvalidFilter { id: String, reason: String },
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

/// Messages a client sends to the relay
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Req { id: String, filters: Vec<Filter> },
    Close { id: String },
    Event(Box<RelayEvent>),
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::Parse)?;
        let Value::Array(mut parts) = value else {
            return Err(ProtocolError::NotAnArray);
        };
        if parts.is_empty() {
            return Err(ProtocolError::NotAnArray);
        }
        let verb = match parts.remove(0) {
            Value::String(verb) => verb,
            other => return Err(ProtocolError::UnknownVerb(other.to_string())),
        };

        match verb.as_str() {
            "REQ" => {
                let id = subscription_id(&mut parts)?;
                let filters = parts
                    .iter()
                    .map(Filter::from_value)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ProtocolError::InvalidFilter {
                        id: id.clone(),
                        reason: e.0,
                    })?;
                Ok(ClientMessage::Req { id, filters })
            }
            "CLOSE" => Ok(ClientMessage::Close {
                id: subscription_id(&mut parts)?,
            }),
            "EVENT" => {
                let event = parts
                    .into_iter()
                    .next()
                    .ok_or_else(|| ProtocolError::InvalidEvent("missing event".into()))?;
                let event: RelayEvent = serde_json::from_value(event)
                    .map_err(|e| ProtocolError::InvalidEvent(e.to_string()))?;
                Ok(ClientMessage::Event(Box::new(event)))
            }
            _ => Err(ProtocolError::UnknownVerb(verb)),
        }
    }

    pub fn to_json(&self) -> String {
        let value = match self {
            ClientMessage::Req { id, filters } => {
                let mut parts = vec![json!("REQ"), json!(id)];
                parts.extend(filters.iter().map(Filter::to_value));
                Value::Array(parts)
            }
            ClientMessage::Close { id } => json!(["CLOSE", id]),
            ClientMessage::Event(event) => json!(["EVENT", event]),
        };
        value.to_string()
    }
}

fn subscription_id(parts: &mut Vec<Value>) -> Result<String, ProtocolError> {
    if parts.is_empty() {
        return Err(ProtocolError::MissingSubscriptionId);
    }
    match parts.remove(0) {
        Value::String(id) if !id.is_empty() => Ok(id),
        _ => Err(ProtocolError::MissingSubscriptionId),
    }
}

/// Messages the relay sends to a client
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: Arc<RelayEvent>,
    },
    Eose(String),
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Notice(String),
    Closed {
        subscription_id: String,
        message: String,
    },
}

impl RelayMessage {
    pub fn to_json(&self) -> String {
        let value = match self {
            RelayMessage::Event {
                subscription_id,
                event,
            } => json!(["EVENT", subscription_id, event.as_ref()]),
            RelayMessage::Eose(id) => json!(["EOSE", id]),
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id, accepted, message]),
            RelayMessage::Notice(text) => json!(["NOTICE", text]),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => json!(["CLOSED", subscription_id, message]),
        };
        value.to_string()
    }

    /// Parse a relay message; used by clients and tests
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::Parse)?;
        let Value::Array(parts) = value else {
            return Err(ProtocolError::NotAnArray);
        };
        let str_at = |i: usize| -> Result<String, ProtocolError> {
            parts
                .get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(ProtocolError::NotAnArray)
        };
        match str_at(0)?.as_str() {
            "EVENT" => {
                let event = parts
                    .get(2)
                    .cloned()
                    .ok_or_else(|| ProtocolError::InvalidEvent("missing event".into()))?;
                let event: RelayEvent = serde_json::from_value(event)
                    .map_err(|e| ProtocolError::InvalidEvent(e.to_string()))?;
                Ok(RelayMessage::Event {
                    subscription_id: str_at(1)?,
                    event: Arc::new(event),
                })
            }
            "EOSE" => Ok(RelayMessage::Eose(str_at(1)?)),
            "OK" => Ok(RelayMessage::Ok {
                event_id: str_at(1)?,
                accepted: parts
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or(ProtocolError::NotAnArray)?,
                message: str_at(3).unwrap_or_default(),
            }),
            "NOTICE" => Ok(RelayMessage::Notice(str_at(1)?)),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: str_at(1)?,
                message: str_at(2).unwrap_or_default(),
            }),
            other => Err(ProtocolError::UnknownVerb(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_req() {
        let msg = ClientMessage::from_json(r##"["REQ","sub",{"kinds":[1]},{"#t":["x"]}]"##).unwrap();
        let ClientMessage::Req { id, filters } = msg else {
            panic!("expected REQ");
        };
        assert_eq!(id, "sub");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].kinds, Some(vec![1]));
        assert_eq!(filters[1].tags["t"], vec!["x".to_string()]);
    }

    #[test]
    fn test_parse_close() {
        assert_eq!(
            ClientMessage::from_json(r#"["CLOSE","sub"]"#).unwrap(),
            ClientMessage::Close { id: "sub".into() }
        );
    }

    #[test]
    fn test_protocol_errors() {
        assert_eq!(
            ClientMessage::from_json("not json").unwrap_err(),
            ProtocolError::Parse
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"REQ":1}"#).unwrap_err(),
            ProtocolError::NotAnArray
        );
        assert_eq!(
            ClientMessage::from_json(r#"["AUTH","x"]"#).unwrap_err(),
            ProtocolError::UnknownVerb("AUTH".into())
        );
        assert_eq!(
            ClientMessage::from_json(r#"["REQ"]"#).unwrap_err(),
            ProtocolError::MissingSubscriptionId
        );
        assert!(matches!(
            ClientMessage::from_json(r#"["REQ","s",{"kinds":"x"}]"#).unwrap_err(),
            ProtocolError::InvalidFilter { id, .. } if id == "s"
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"["EVENT",{"id":1}]"#).unwrap_err(),
            ProtocolError::InvalidEvent(_)
        ));
    }

    #[test]
    fn test_relay_message_shapes() {
        assert_eq!(RelayMessage::Eose("s".into()).to_json(), r#"["EOSE","s"]"#);
        assert_eq!(
            RelayMessage::Ok {
                event_id: "e".into(),
                accepted: false,
                message: "restricted: nope".into()
            }
            .to_json(),
            r#"["OK","e",false,"restricted: nope"]"#
        );
        assert_eq!(
            RelayMessage::Closed {
                subscription_id: "s".into(),
                message: "error: bad".into()
            }
            .to_json(),
            r#"["CLOSED","s","error: bad"]"#
        );
        let notice = RelayMessage::Notice("hi".into());
        assert_eq!(RelayMessage::from_json(&notice.to_json()).unwrap(), notice);
    }
}
