//! Lightning wire messages used by a Commando session
//!
//! BOLT 1 `init`, `error`, `warning`, `ping` and `pong`, plus the Commando
//! request and reply chunk messages. All integers are big-endian.

use crate::error::TransportError;
use serde::Serialize;
use serde_json::Value;

pub const MSG_WARNING: u16 = 1;
pub const MSG_INIT: u16 = 16;
pub const MSG_ERROR: u16 = 17;
pub const MSG_PING: u16 = 18;
pub const MSG_PONG: u16 = 19;
pub const MSG_COMMANDO_REQUEST: u16 = 0x4c4f;
pub const MSG_COMMANDO_REPLY_CONTINUES: u16 = 0x594b;
pub const MSG_COMMANDO_REPLY_TERM: u16 = 0x594d;

/// Pings asking for this many bytes or more must not be answered
const PONG_IGNORE_THRESHOLD: u16 = 65532;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Init { features: Vec<u8> },
    Error { channel_id: [u8; 32], data: Vec<u8> },
    Warning { channel_id: [u8; 32], data: Vec<u8> },
    Ping { num_pong_bytes: u16 },
    Pong,
    CommandoRequest { id: u64, json: Vec<u8> },
    CommandoReply { id: u64, chunk: Vec<u8>, terminal: bool },
    /// Any other type; odd types are ignored, even types are a protocol error
    Unknown { msg_type: u16 },
}

/// JSON body of a Commando request
#[derive(Debug, Clone, Serialize)]
pub struct CommandoRequestBody<'a> {
    pub method: &'a str,
    pub params: &'a Value,
    pub rune: &'a str,
    pub id: String,
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], TransportError> {
        if self.buf.len() < n {
            return Err(TransportError::Protocol("truncated message".into()));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u16(&mut self) -> Result<u16, TransportError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64, TransportError> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(bytes))
    }

    fn channel_id(&mut self) -> Result<[u8; 32], TransportError> {
        let mut id = [0u8; 32];
        id.copy_from_slice(self.take(32)?);
        Ok(id)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }
}

impl WireMessage {
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        let mut r = Reader { buf: bytes };
        let msg_type = r.u16()?;

        let message = match msg_type {
            MSG_INIT => {
                let global_len = r.u16()? as usize;
                r.take(global_len)?;
                let features_len = r.u16()? as usize;
                WireMessage::Init {
                    features: r.take(features_len)?.to_vec(),
                }
            }
            MSG_ERROR | MSG_WARNING => {
                let channel_id = r.channel_id()?;
                let len = r.u16()? as usize;
                let data = r.take(len)?.to_vec();
                if msg_type == MSG_ERROR {
                    WireMessage::Error { channel_id, data }
                } else {
                    WireMessage::Warning { channel_id, data }
                }
            }
            MSG_PING => WireMessage::Ping {
                num_pong_bytes: r.u16()?,
            },
            MSG_PONG => WireMessage::Pong,
            MSG_COMMANDO_REQUEST => WireMessage::CommandoRequest {
                id: r.u64()?,
                json: r.rest().to_vec(),
            },
            MSG_COMMANDO_REPLY_CONTINUES | MSG_COMMANDO_REPLY_TERM => WireMessage::CommandoReply {
                id: r.u64()?,
                chunk: r.rest().to_vec(),
                terminal: msg_type == MSG_COMMANDO_REPLY_TERM,
            },
            other => WireMessage::Unknown { msg_type: other },
        };
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            WireMessage::Init { features } => {
                out.extend_from_slice(&MSG_INIT.to_be_bytes());
                out.extend_from_slice(&0u16.to_be_bytes());
                out.extend_from_slice(&(features.len() as u16).to_be_bytes());
                out.extend_from_slice(features);
            }
            WireMessage::Error { channel_id, data } | WireMessage::Warning { channel_id, data } => {
                let msg_type = if matches!(self, WireMessage::Error { .. }) {
                    MSG_ERROR
                } else {
                    MSG_WARNING
                };
                out.extend_from_slice(&msg_type.to_be_bytes());
                out.extend_from_slice(channel_id);
                out.extend_from_slice(&(data.len() as u16).to_be_bytes());
                out.extend_from_slice(data);
            }
            WireMessage::Ping { num_pong_bytes } => {
                out.extend_from_slice(&MSG_PING.to_be_bytes());
                out.extend_from_slice(&num_pong_bytes.to_be_bytes());
                out.extend_from_slice(&0u16.to_be_bytes());
            }
            WireMessage::Pong => {
                out.extend_from_slice(&MSG_PONG.to_be_bytes());
                out.extend_from_slice(&0u16.to_be_bytes());
            }
            WireMessage::CommandoRequest { id, json } => {
                out.extend_from_slice(&MSG_COMMANDO_REQUEST.to_be_bytes());
                out.extend_from_slice(&id.to_be_bytes());
                out.extend_from_slice(json);
            }
            WireMessage::CommandoReply { id, chunk, terminal } => {
                let msg_type = if *terminal {
                    MSG_COMMANDO_REPLY_TERM
                } else {
                    MSG_COMMANDO_REPLY_CONTINUES
                };
                out.extend_from_slice(&msg_type.to_be_bytes());
                out.extend_from_slice(&id.to_be_bytes());
                out.extend_from_slice(chunk);
            }
            WireMessage::Unknown { msg_type } => {
                out.extend_from_slice(&msg_type.to_be_bytes());
            }
        }
        out
    }
}

/// The `pong` owed for a `ping`, if any
pub fn pong_for(num_pong_bytes: u16) -> Option<Vec<u8>> {
    if num_pong_bytes >= PONG_IGNORE_THRESHOLD {
        return None;
    }
    let mut out = Vec::with_capacity(4 + num_pong_bytes as usize);
    out.extend_from_slice(&MSG_PONG.to_be_bytes());
    out.extend_from_slice(&num_pong_bytes.to_be_bytes());
    out.resize(4 + num_pong_bytes as usize, 0);
    Some(out)
}

/// Encode a Commando request message
pub fn encode_request(id: u64, method: &str, params: &Value, rune: &str) -> Result<Vec<u8>, TransportError> {
    let body = CommandoRequestBody {
        method,
        params,
        rune,
        id: id.to_string(),
    };
    let json = serde_json::to_vec(&body)
        .map_err(|e| TransportError::Protocol(format!("request encoding: {}", e)))?;
    Ok(WireMessage::CommandoRequest { id, json }.encode())
}

/// Unwrap a JSON-RPC reply into its `result`, or a remote error
pub fn parse_reply(reply: &[u8]) -> Result<Value, TransportError> {
    let value: Value = serde_json::from_slice(reply)
        .map_err(|e| TransportError::Protocol(format!("reply is not JSON: {}", e)))?;

    if let Some(error) = value.get("error") {
        let code = error.get("code").map(|c| c.to_string()).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(TransportError::Remote { code, message });
    }

    value
        .get("result")
        .cloned()
        .ok_or_else(|| TransportError::Protocol("reply has neither result nor error".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_init_is_empty_features() {
        let init = WireMessage::Init { features: vec![] }.encode();
        assert_eq!(init, vec![0x00, 0x10, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(WireMessage::decode(&init).unwrap(), WireMessage::Init { features: vec![] });
    }

    #[test]
    fn test_request_layout() {
        let msg = encode_request(7, "getinfo", &json!({}), "rune-token").unwrap();
        assert_eq!(&msg[..2], &[0x4c, 0x4f]);
        assert_eq!(&msg[2..10], &7u64.to_be_bytes());

        let body: Value = serde_json::from_slice(&msg[10..]).unwrap();
        assert_eq!(body["method"], "getinfo");
        assert_eq!(body["rune"], "rune-token");
        assert_eq!(body["params"], json!({}));
        assert_eq!(body["id"], "7");
    }

    #[test]
    fn test_reply_chunks() {
        let cont = WireMessage::CommandoReply {
            id: 3,
            chunk: b"{\"res".to_vec(),
            terminal: false,
        }
        .encode();
        assert_eq!(&cont[..2], &[0x59, 0x4b]);
        match WireMessage::decode(&cont).unwrap() {
            WireMessage::CommandoReply { id, terminal, .. } => {
                assert_eq!(id, 3);
                assert!(!terminal);
            }
            other => panic!("unexpected {:?}", other),
        }

        let term = WireMessage::CommandoReply {
            id: 3,
            chunk: vec![],
            terminal: true,
        }
        .encode();
        assert_eq!(&term[..2], &[0x59, 0x4d]);
    }

    #[test]
    fn test_pong_sizes() {
        let pong = pong_for(4).unwrap();
        assert_eq!(pong, vec![0x00, 0x13, 0x00, 0x04, 0, 0, 0, 0]);
        assert!(pong_for(65532).is_none());
        let ping = WireMessage::Ping { num_pong_bytes: 4 }.encode();
        assert_eq!(WireMessage::decode(&ping).unwrap(), WireMessage::Ping { num_pong_bytes: 4 });
    }

    #[test]
    fn test_parse_reply_result_and_error() {
        assert_eq!(
            parse_reply(br#"{"jsonrpc":"2.0","id":"1","result":{"alias":"node"}}"#).unwrap(),
            json!({"alias": "node"})
        );
        match parse_reply(br#"{"error":{"code":19537,"message":"Not authorized"}}"#) {
            Err(TransportError::Remote { code, message }) => {
                assert_eq!(code, "19537");
                assert_eq!(message, "Not authorized");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse_reply(b"not json"), Err(TransportError::Protocol(_))));
    }

    #[test]
    fn test_truncated_message() {
        assert!(WireMessage::decode(&[0x00]).is_err());
        assert!(WireMessage::decode(&[0x59, 0x4d, 0x00]).is_err());
    }
}
