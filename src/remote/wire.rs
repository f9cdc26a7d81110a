use bytes::{BufMut, Bytes, BytesMut};

use crate::error::WireError;
use crate::remote::value::Value;

pub const PROTOCOL_VERSION: u16 = 1;

/// Upper bound for a single frame body; a VGA RGB frame is well under 1 MiB.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

const TAG_HELLO: u8 = 0x01;
const TAG_WELCOME: u8 = 0x02;
const TAG_CALL: u8 = 0x10;
const TAG_LOOKUP: u8 = 0x11;
const TAG_RETURN: u8 = 0x20;
const TAG_FAULT: u8 = 0x21;

const VALUE_NULL: u8 = 0;
const VALUE_BOOL: u8 = 1;
const VALUE_INT: u8 = 2;
const VALUE_FLOAT: u8 = 3;
const VALUE_STR: u8 = 4;
const VALUE_BYTES: u8 = 5;
const VALUE_LIST: u8 = 6;

/// Deepest list nesting a decoded value may have.
pub const MAX_VALUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    UnsupportedMethod,
    Failure,
    NoSuchService,
}

impl FaultKind {
    fn code(self) -> u8 {
        match self {
            FaultKind::UnsupportedMethod => 0,
            FaultKind::Failure => 1,
            FaultKind::NoSuchService => 2,
        }
    }
}

impl TryFrom<u8> for FaultKind {
    type Error = WireError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FaultKind::UnsupportedMethod),
            1 => Ok(FaultKind::Failure),
            2 => Ok(FaultKind::NoSuchService),
            other => Err(WireError::InvalidFaultKind(other)),
        }
    }
}

/// One frame body: `[tag][payload]`. The `u32` length prefix is handled by the framed stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello {
        version: u16,
    },
    Welcome {
        version: u16,
    },
    Call {
        id: u32,
        service: String,
        method: String,
        args: Vec<Value>,
    },
    Lookup {
        id: u32,
        service: String,
    },
    Return {
        id: u32,
        value: Value,
    },
    Fault {
        id: u32,
        kind: FaultKind,
        message: String,
    },
}

impl Message {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Message::Hello { version } => {
                buf.put_u8(TAG_HELLO);
                buf.put_u16_le(*version);
            }
            Message::Welcome { version } => {
                buf.put_u8(TAG_WELCOME);
                buf.put_u16_le(*version);
            }
            Message::Call {
                id,
                service,
                method,
                args,
            } => {
                buf.put_u8(TAG_CALL);
                buf.put_u32_le(*id);
                put_str(&mut buf, service);
                put_str(&mut buf, method);
                buf.put_u32_le(args.len() as u32);
                for arg in args {
                    put_value(&mut buf, arg);
                }
            }
            Message::Lookup { id, service } => {
                buf.put_u8(TAG_LOOKUP);
                buf.put_u32_le(*id);
                put_str(&mut buf, service);
            }
            Message::Return { id, value } => {
                buf.put_u8(TAG_RETURN);
                buf.put_u32_le(*id);
                put_value(&mut buf, value);
            }
            Message::Fault { id, kind, message } => {
                buf.put_u8(TAG_FAULT);
                buf.put_u32_le(*id);
                buf.put_u8(kind.code());
                put_str(&mut buf, message);
            }
        }
        buf.freeze()
    }
}

impl TryFrom<&[u8]> for Message {
    type Error = WireError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        if slice.is_empty() {
            return Err(WireError::InvalidFrameLength(0));
        }
        let tag = slice[0];
        let mut cursor = Cursor::new(&slice[1..]);
        let message = match tag {
            TAG_HELLO => Message::Hello {
                version: cursor.u16()?,
            },
            TAG_WELCOME => Message::Welcome {
                version: cursor.u16()?,
            },
            TAG_CALL => {
                let id = cursor.u32()?;
                let service = cursor.string()?;
                let method = cursor.string()?;
                let count = cursor.u32()? as usize;
                let mut args = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    args.push(cursor.value(0)?);
                }
                Message::Call {
                    id,
                    service,
                    method,
                    args,
                }
            }
            TAG_LOOKUP => Message::Lookup {
                id: cursor.u32()?,
                service: cursor.string()?,
            },
            TAG_RETURN => Message::Return {
                id: cursor.u32()?,
                value: cursor.value(0)?,
            },
            TAG_FAULT => Message::Fault {
                id: cursor.u32()?,
                kind: FaultKind::try_from(cursor.u8()?)?,
                message: cursor.string()?,
            },
            _ => return Err(WireError::InvalidFrameTag(tag)),
        };
        if cursor.remaining() != 0 {
            return Err(WireError::InvalidFrameLength(slice.len()));
        }
        Ok(message)
    }
}

fn put_str(buf: &mut BytesMut, value: &str) {
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn put_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::Null => buf.put_u8(VALUE_NULL),
        Value::Bool(v) => {
            buf.put_u8(VALUE_BOOL);
            buf.put_u8(u8::from(*v));
        }
        Value::Int(v) => {
            buf.put_u8(VALUE_INT);
            buf.put_i64_le(*v);
        }
        Value::Float(v) => {
            buf.put_u8(VALUE_FLOAT);
            buf.put_f64_le(*v);
        }
        Value::Str(v) => {
            buf.put_u8(VALUE_STR);
            put_str(buf, v);
        }
        Value::Bytes(v) => {
            buf.put_u8(VALUE_BYTES);
            buf.put_u32_le(v.len() as u32);
            buf.put_slice(v);
        }
        Value::List(items) => {
            buf.put_u8(VALUE_LIST);
            buf.put_u32_le(items.len() as u32);
            for item in items {
                put_value(buf, item);
            }
        }
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::Truncated {
                needed: len - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String, WireError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    fn value(&mut self, depth: usize) -> Result<Value, WireError> {
        if depth > MAX_VALUE_DEPTH {
            return Err(WireError::NestingTooDeep(MAX_VALUE_DEPTH));
        }
        let tag = self.u8()?;
        let value = match tag {
            VALUE_NULL => Value::Null,
            VALUE_BOOL => Value::Bool(self.u8()? != 0),
            VALUE_INT => Value::Int(i64::from_le_bytes(self.array()?)),
            VALUE_FLOAT => Value::Float(f64::from_le_bytes(self.array()?)),
            VALUE_STR => Value::Str(self.string()?),
            VALUE_BYTES => {
                let len = self.u32()? as usize;
                Value::Bytes(Bytes::copy_from_slice(self.take(len)?))
            }
            VALUE_LIST => {
                let count = self.u32()? as usize;
                let mut items = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    items.push(self.value(depth + 1)?);
                }
                Value::List(items)
            }
            other => return Err(WireError::InvalidValueTag(other)),
        };
        Ok(value)
    }
}
