//! ## fleetsim-protocols::mqtt
//! MQTT 3.1.1 client-side codec: encodes CONNECT, PUBLISH (QoS 1), PINGREQ
//! and DISCONNECT, and decodes the broker replies a publisher waits for.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const PROTOCOL_NAME: &str = "MQTT";
pub const PROTOCOL_LEVEL: u8 = 4;
/// Largest value the four-byte remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH_QOS1: u8 = 0x32;
const PUBACK: u8 = 0x40;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

const FLAG_USERNAME: u8 = 0x80;
const FLAG_CLEAN_SESSION: u8 = 0x02;

/// Errors that can occur while encoding or parsing an MQTT packet.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum MqttParseError {
    #[error("Insufficient data to parse MQTT packet")]
    InsufficientData,
    #[error("Invalid MQTT header")]
    InvalidHeader,
    #[error("Malformed remaining length field")]
    RemainingLengthMalformed,
    #[error("Incomplete MQTT packet")]
    PacketIncomplete,
    #[error("String field longer than 65535 bytes")]
    StringTooLong,
    #[error("Packet exceeds the maximum MQTT size")]
    PacketTooLarge,
    #[error("Unexpected packet from broker: {0}")]
    Unexpected(String),
}

/// CONNACK return codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted,
    UnacceptableProtocol,
    IdentifierRejected,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
    Reserved(u8),
}

impl ConnectReturnCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocol,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadCredentials,
            5 => Self::NotAuthorized,
            other => Self::Reserved(other),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Accepted => "connection accepted",
            Self::UnacceptableProtocol => "unacceptable protocol version",
            Self::IdentifierRejected => "client identifier rejected",
            Self::ServerUnavailable => "server unavailable",
            Self::BadCredentials => "bad user name or password",
            Self::NotAuthorized => "not authorized",
            Self::Reserved(_) => "reserved return code",
        }
    }
}

/// Broker-to-client packets a publisher cares about.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    ConnAck {
        session_present: bool,
        code: ConnectReturnCode,
    },
    PubAck {
        packet_id: u16,
    },
    PingResp,
    /// Anything else, kept as its first byte so callers can log it.
    Other {
        header: u8,
    },
}

/// Stateless MQTT codec.
#[derive(Default, Debug, Copy, Clone)]
pub struct MqttParser;

impl MqttParser {
    pub fn new() -> Self {
        Self
    }

    /// Decodes MQTT's variable-length "remaining length" field.
    ///
    /// Returns a tuple of (decoded_value, number_of_bytes_used).
    pub fn decode_remaining_length(input: &[u8]) -> Result<(u32, usize), MqttParseError> {
        let mut multiplier: u32 = 1;
        let mut value: u32 = 0;
        for (i, byte) in input.iter().enumerate() {
            if i == 4 {
                return Err(MqttParseError::RemainingLengthMalformed);
            }
            value += u32::from(byte & 0x7F) * multiplier;
            if (byte & 0x80) == 0 {
                return Ok((value, i + 1));
            }
            multiplier *= 128;
        }
        if input.len() >= 4 {
            Err(MqttParseError::RemainingLengthMalformed)
        } else {
            Err(MqttParseError::InsufficientData)
        }
    }

    pub fn encode_remaining_length(
        mut len: usize,
        out: &mut BytesMut,
    ) -> Result<(), MqttParseError> {
        if len > MAX_REMAINING_LENGTH {
            return Err(MqttParseError::PacketTooLarge);
        }
        loop {
            let mut byte = (len % 128) as u8;
            len /= 128;
            if len > 0 {
                byte |= 0x80;
            }
            out.put_u8(byte);
            if len == 0 {
                return Ok(());
            }
        }
    }

    fn put_str(out: &mut BytesMut, value: &str) -> Result<(), MqttParseError> {
        let len = u16::try_from(value.len()).map_err(|_| MqttParseError::StringTooLong)?;
        out.put_u16(len);
        out.put_slice(value.as_bytes());
        Ok(())
    }

    fn frame(header: u8, body: &[u8]) -> Result<Bytes, MqttParseError> {
        let mut out = BytesMut::with_capacity(body.len() + 5);
        out.put_u8(header);
        Self::encode_remaining_length(body.len(), &mut out)?;
        out.put_slice(body);
        Ok(out.freeze())
    }

    /// CONNECT with a clean session. The access token, when present, is
    /// sent as the user name with no password.
    pub fn connect(
        &self,
        client_id: &str,
        username: Option<&str>,
        keep_alive_secs: u16,
    ) -> Result<Bytes, MqttParseError> {
        let mut body = BytesMut::new();
        Self::put_str(&mut body, PROTOCOL_NAME)?;
        body.put_u8(PROTOCOL_LEVEL);
        let mut flags = FLAG_CLEAN_SESSION;
        if username.is_some() {
            flags |= FLAG_USERNAME;
        }
        body.put_u8(flags);
        body.put_u16(keep_alive_secs);
        Self::put_str(&mut body, client_id)?;
        if let Some(user) = username {
            Self::put_str(&mut body, user)?;
        }
        Self::frame(CONNECT, &body)
    }

    /// PUBLISH at QoS 1, not retained, not a duplicate.
    pub fn publish_qos1(
        &self,
        topic: &str,
        packet_id: u16,
        payload: &[u8],
    ) -> Result<Bytes, MqttParseError> {
        let mut body = BytesMut::with_capacity(topic.len() + payload.len() + 4);
        Self::put_str(&mut body, topic)?;
        body.put_u16(packet_id);
        body.put_slice(payload);
        Self::frame(PUBLISH_QOS1, &body)
    }

    pub fn pingreq(&self) -> Bytes {
        Bytes::from_static(&[PINGREQ, 0x00])
    }

    pub fn disconnect(&self) -> Bytes {
        Bytes::from_static(&[DISCONNECT, 0x00])
    }

    /// Parses one broker packet from the front of `data`.
    ///
    /// Returns the packet and the number of bytes it occupied.
    /// `InsufficientData` and `PacketIncomplete` mean more bytes are needed.
    pub fn parse(&self, data: &[u8]) -> Result<(Packet, usize), MqttParseError> {
        if data.len() < 2 {
            return Err(MqttParseError::InsufficientData);
        }
        let header = data[0];

        let (remaining_length, length_field_size) = Self::decode_remaining_length(&data[1..])?;
        let fixed_header_length = 1 + length_field_size;
        let total = fixed_header_length + remaining_length as usize;

        if data.len() < total {
            return Err(MqttParseError::PacketIncomplete);
        }
        let mut body = &data[fixed_header_length..total];

        let packet = match header {
            CONNACK => {
                if body.len() != 2 {
                    return Err(MqttParseError::InvalidHeader);
                }
                let flags = body.get_u8();
                let code = body.get_u8();
                Packet::ConnAck {
                    session_present: flags & 0x01 == 0x01,
                    code: ConnectReturnCode::from_u8(code),
                }
            }
            PUBACK => {
                if body.len() != 2 {
                    return Err(MqttParseError::InvalidHeader);
                }
                Packet::PubAck {
                    packet_id: body.get_u16(),
                }
            }
            PINGRESP => {
                if !body.is_empty() {
                    return Err(MqttParseError::InvalidHeader);
                }
                Packet::PingResp
            }
            other if other >> 4 == 0 || other >> 4 == 15 => {
                return Err(MqttParseError::Unexpected(hex::encode(
                    &data[..total.min(16)],
                )));
            }
            other => Packet::Other { header: other },
        };
        Ok((packet, total))
    }
}
