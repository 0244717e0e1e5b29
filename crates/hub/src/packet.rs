//! Engine.IO v4 / Socket.IO v5 text packet codec (websocket transport, default namespace).
//!
//! Frame layout: one Engine.IO type digit, and for messages (`4`) one Socket.IO type digit,
//! an optional `/namespace,` prefix, an optional ack id, then a JSON payload.

use kumasync_core::ClientError;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// `0{...}` handshake with session parameters.
    Open(Json),
    Close,
    Ping,
    Pong,
    /// `40` / `40{...}` namespace connected.
    Connect(Json),
    Disconnect,
    /// `42[name, args...]`, with an ack id when the sender expects a reply.
    Event { ack: Option<u64>, name: String, args: Vec<Json> },
    /// `43<id>[args...]` reply to an emitted event.
    Ack { id: u64, args: Vec<Json> },
    ConnectError(Json),
    /// Upgrade/noop and other frames this client does not act on.
    Other(String),
}

fn protocol(msg: impl Into<String>) -> ClientError {
    ClientError::Protocol(msg.into())
}

fn parse_json(s: &str) -> Result<Json, ClientError> {
    if s.is_empty() {
        return Ok(Json::Null);
    }
    serde_json::from_str(s).map_err(|e| protocol(format!("bad packet payload: {e}")))
}

fn parse_array(s: &str) -> Result<Vec<Json>, ClientError> {
    match parse_json(s)? {
        Json::Array(items) => Ok(items),
        Json::Null => Ok(Vec::new()),
        other => Err(protocol(format!("expected array payload, got {other}"))),
    }
}

impl Packet {
    pub fn decode(frame: &str) -> Result<Packet, ClientError> {
        let mut chars = frame.chars();
        let engine = chars.next().ok_or_else(|| protocol("empty frame"))?;
        let rest = chars.as_str();
        match engine {
            '0' => Ok(Packet::Open(parse_json(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => Self::decode_message(rest),
            _ => Ok(Packet::Other(frame.to_string())),
        }
    }

    fn decode_message(body: &str) -> Result<Packet, ClientError> {
        let mut chars = body.chars();
        let kind = chars.next().ok_or_else(|| protocol("empty message packet"))?;
        let mut rest = chars.as_str();
        if rest.starts_with('/') {
            rest = match rest.find(',') {
                Some(i) => &rest[i + 1..],
                None => "",
            };
        }
        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        let ack = if digits > 0 {
            Some(rest[..digits].parse::<u64>().map_err(|e| protocol(format!("bad ack id: {e}")))?)
        } else {
            None
        };
        let payload = &rest[digits..];
        match kind {
            '0' => Ok(Packet::Connect(parse_json(payload)?)),
            '1' => Ok(Packet::Disconnect),
            '2' => {
                let mut args = parse_array(payload)?;
                if args.is_empty() {
                    return Err(protocol("event without name"));
                }
                let name = match args.remove(0) {
                    Json::String(s) => s,
                    other => return Err(protocol(format!("event name must be a string, got {other}"))),
                };
                Ok(Packet::Event { ack, name, args })
            }
            '3' => {
                let id = ack.ok_or_else(|| protocol("ack without id"))?;
                Ok(Packet::Ack { id, args: parse_array(payload)? })
            }
            '4' => Ok(Packet::ConnectError(parse_json(payload)?)),
            _ => Ok(Packet::Other(format!("4{body}"))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(v) => format!("0{v}"),
            Packet::Close => "1".into(),
            Packet::Ping => "2".into(),
            Packet::Pong => "3".into(),
            Packet::Connect(Json::Null) => "40".into(),
            Packet::Connect(v) => format!("40{v}"),
            Packet::Disconnect => "41".into(),
            Packet::Event { ack, name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Json::String(name.clone()));
                items.extend(args.iter().cloned());
                let ack = ack.map(|id| id.to_string()).unwrap_or_default();
                format!("42{ack}{}", Json::Array(items))
            }
            Packet::Ack { id, args } => format!("43{id}{}", Json::Array(args.clone())),
            Packet::ConnectError(v) => format!("44{v}"),
            Packet::Other(raw) => raw.clone(),
        }
    }
}
