//! Text framing of Engine.IO v4 / Socket.IO v4 over a websocket.
//!
//! A frame is an Engine.IO type digit, followed for `4` (message) by a Socket.IO type digit,
//! an optional `/namespace,`, an optional ack id, and a JSON body.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ClientError, Result};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Noop,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, payload: Option<Value> },
    Ack,
    ConnectError(Option<Value>),
}

struct Header<'a> {
    engine: char,
    socket: Option<char>,
    body: &'a str,
}

fn header(input: &str) -> nom::IResult<&str, Header<'_>> {
    use nom::{
        bytes::complete::{tag, take_until},
        character::complete::{digit0, one_of},
        combinator::{opt, rest},
        sequence::{delimited, tuple},
    };

    let (input, engine) = one_of("0123456")(input)?;
    if engine != '4' {
        return Ok(("", Header { engine, socket: None, body: input }));
    }
    let (_, (socket, _namespace, _ack, body)) = tuple((
        one_of("0123456"),
        opt(delimited(tag("/"), take_until(","), tag(","))),
        digit0,
        rest,
    ))(input)?;
    Ok(("", Header { engine, socket: Some(socket), body }))
}

fn json_body(body: &str) -> Result<Option<Value>> {
    if body.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::from_str(body)?))
    }
}

impl Packet {
    pub fn decode(frame: &str) -> Result<Self> {
        use nom::Finish;
        let (_, header) = header(frame)
            .finish()
            .map_err(|err| ClientError::Protocol(format!("bad frame {frame:?}: {err:?}")))?;
        Ok(match (header.engine, header.socket) {
            ('0', _) => Self::Open(serde_json::from_str(header.body)?),
            ('1', _) => Self::Close,
            ('2', _) => Self::Ping,
            ('3', _) => Self::Pong,
            ('4', Some(socket)) => Self::Message(SocketPacket::decode(socket, header.body)?),
            _ => Self::Noop,
        })
    }

    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            Self::Open(_) => return Err(ClientError::Protocol("clients never send open".into())),
            Self::Close => "1".to_owned(),
            Self::Ping => "2".to_owned(),
            Self::Pong => "3".to_owned(),
            Self::Noop => "6".to_owned(),
            Self::Message(packet) => format!("4{}", packet.encode()?),
        })
    }

    pub fn event(name: &str, payload: Value) -> Self {
        Self::Message(SocketPacket::Event {
            name: name.to_owned(),
            payload: Some(payload),
        })
    }
}

impl SocketPacket {
    fn decode(kind: char, body: &str) -> Result<Self> {
        Ok(match kind {
            '0' => Self::Connect(json_body(body)?),
            '1' => Self::Disconnect,
            '2' => {
                let mut items = match json_body(body)? {
                    Some(Value::Array(items)) => items.into_iter(),
                    _ => return Err(ClientError::Protocol(format!("event is not an array: {body}"))),
                };
                let name = match items.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(ClientError::Protocol(format!("event without name: {body}"))),
                };
                Self::Event {
                    name,
                    payload: items.next(),
                }
            }
            '3' => Self::Ack,
            '4' => Self::ConnectError(json_body(body)?),
            other => return Err(ClientError::Protocol(format!("unsupported packet type {other}"))),
        })
    }

    fn encode(&self) -> Result<String> {
        Ok(match self {
            Self::Connect(None) => "0".to_owned(),
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Disconnect => "1".to_owned(),
            Self::Event { name, payload } => {
                let mut items = vec![Value::String(name.clone())];
                items.extend(payload.clone());
                format!("2{}", serde_json::to_string(&items)?)
            }
            Self::Ack | Self::ConnectError(_) => {
                return Err(ClientError::Protocol("unsupported outbound packet".into()))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_open_handshake() {
        let packet =
            Packet::decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#)
                .unwrap();
        assert_eq!(
            packet,
            Packet::Open(Handshake {
                sid: "abc".into(),
                ping_interval: 25000,
                ping_timeout: 20000,
            })
        );
    }

    #[test]
    fn decodes_ping_and_connect() {
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping);
        assert_eq!(
            Packet::decode(r#"40{"sid":"x"}"#).unwrap(),
            Packet::Message(SocketPacket::Connect(Some(json!({"sid": "x"}))))
        );
        assert_eq!(Packet::decode("41").unwrap(), Packet::Message(SocketPacket::Disconnect));
    }

    #[test]
    fn decodes_events_with_and_without_payload() {
        assert_eq!(
            Packet::decode(r#"42["message received",{"_id":"m1"}]"#).unwrap(),
            Packet::Message(SocketPacket::Event {
                name: "message received".into(),
                payload: Some(json!({"_id": "m1"})),
            })
        );
        assert_eq!(
            Packet::decode(r#"42["refetch chats"]"#).unwrap(),
            Packet::Message(SocketPacket::Event {
                name: "refetch chats".into(),
                payload: None,
            })
        );
    }

    #[test]
    fn skips_namespace_and_ack_id() {
        assert_eq!(
            Packet::decode(r#"42/chat,17["connected"]"#).unwrap(),
            Packet::Message(SocketPacket::Event {
                name: "connected".into(),
                payload: None,
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(Packet::decode("").is_err());
        assert!(Packet::decode("x").is_err());
        assert!(Packet::decode("42{}").is_err());
        assert!(Packet::decode("42[1]").is_err());
    }

    #[test]
    fn encodes_client_frames() {
        assert_eq!(Packet::Pong.encode().unwrap(), "3");
        assert_eq!(
            Packet::Message(SocketPacket::Connect(None)).encode().unwrap(),
            "40"
        );
        assert_eq!(
            Packet::event("join chat", json!("c1")).encode().unwrap(),
            r#"42["join chat","c1"]"#
        );
    }
}
