//! Broker-level message envelope: durability flag, typed properties, body.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use crate::error::{ProtocolError, ProtocolResult};

/// A typed message property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Int(i32),
    Long(i64),
    String(String),
}

impl PropertyValue {
    fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Int(_) => "an int",
            PropertyValue::Long(_) => "a long",
            PropertyValue::String(_) => "a string",
        }
    }
}

/// Message payload.
///
/// `Stream` bodies are handed to the broker as-is; the reader is only
/// consumed when the message is delivered or explicitly materialized.
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl Body {
    /// Wrap a reader without reading from it.
    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        Body::Stream(Box::new(reader))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Bytes(bytes) => bytes.is_empty(),
            Body::Stream(_) => false,
        }
    }

    /// Read the whole body into memory, draining a stream if necessary.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Body::Empty => Ok(Vec::new()),
            Body::Bytes(bytes) => Ok(bytes),
            Body::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    /// Borrow the buffered bytes. Stream bodies have none until materialized.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Empty => Some(&[][..]),
            Body::Bytes(bytes) => Some(bytes.as_slice()),
            Body::Stream(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Body::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// Streams compare unequal to everything, including themselves.
impl PartialEq for Body {
    fn eq(&self, other: &Self) -> bool {
        match (self.as_bytes(), other.as_bytes()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// A message as handed to or received from the broker.
#[derive(Debug)]
pub struct Message {
    durable: bool,
    properties: BTreeMap<String, PropertyValue>,
    body: Body,
}

impl Message {
    /// Create an empty message. Durable messages survive a broker restart.
    pub fn new(durable: bool) -> Self {
        Self {
            durable,
            properties: BTreeMap::new(),
            body: Body::Empty,
        }
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn put_int(&mut self, name: &str, value: i32) {
        self.properties
            .insert(name.to_string(), PropertyValue::Int(value));
    }

    pub fn put_long(&mut self, name: &str, value: i64) {
        self.properties
            .insert(name.to_string(), PropertyValue::Long(value));
    }

    pub fn put_string(&mut self, name: &str, value: impl Into<String>) {
        self.properties
            .insert(name.to_string(), PropertyValue::String(value.into()));
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Required int property.
    pub fn int_property(&self, name: &str) -> ProtocolResult<i32> {
        match self.require(name)? {
            PropertyValue::Int(v) => Ok(*v),
            other => Err(wrong_type(name, "an int", other)),
        }
    }

    /// Required long property.
    pub fn long_property(&self, name: &str) -> ProtocolResult<i64> {
        match self.require(name)? {
            PropertyValue::Long(v) => Ok(*v),
            other => Err(wrong_type(name, "a long", other)),
        }
    }

    /// Required string property.
    pub fn string_property(&self, name: &str) -> ProtocolResult<&str> {
        match self.require(name)? {
            PropertyValue::String(v) => Ok(v),
            other => Err(wrong_type(name, "a string", other)),
        }
    }

    /// Optional string property; present-but-mistyped is still an error.
    pub fn optional_string_property(&self, name: &str) -> ProtocolResult<Option<&str>> {
        match self.properties.get(name) {
            None => Ok(None),
            Some(PropertyValue::String(v)) => Ok(Some(v)),
            Some(other) => Err(wrong_type(name, "a string", other)),
        }
    }

    fn require(&self, name: &str) -> ProtocolResult<&PropertyValue> {
        self.properties
            .get(name)
            .ok_or_else(|| ProtocolError::MissingProperty(name.to_string()))
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Take the body out, leaving the message empty.
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(&mut self.body, Body::Empty)
    }

    /// Buffered body bytes; a stream body that was never materialized is malformed here.
    pub fn body_bytes(&self) -> ProtocolResult<&[u8]> {
        self.body.as_bytes().ok_or_else(|| {
            ProtocolError::MalformedBody("stream body has not been materialized".to_string())
        })
    }

    /// Read a stream body into memory, as the broker does on delivery.
    pub fn materialize(&mut self) -> std::io::Result<()> {
        if let Body::Stream(_) = self.body {
            let bytes = self.take_body().into_bytes()?;
            self.body = Body::Bytes(bytes);
        }
        Ok(())
    }
}

fn wrong_type(name: &str, expected: &'static str, found: &PropertyValue) -> ProtocolError {
    tracing::trace!("Property '{}' is {}, expected {}", name, found.type_name(), expected);
    ProtocolError::WrongPropertyType {
        property: name.to_string(),
        expected,
    }
}

/// Sequential writer for primitive body values (big-endian).
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: Vec<u8>,
}

impl BodyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_int(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn write_long(&mut self, value: i64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        let len = value.len() as u32;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(value);
        self
    }

    pub fn into_body(self) -> Body {
        Body::Bytes(self.buf)
    }
}

/// Sequential reader mirroring [`BodyWriter`].
#[derive(Debug)]
pub struct BodyReader<'a> {
    buf: &'a [u8],
}

impl<'a> BodyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        if self.buf.len() < n {
            return Err(ProtocolError::MalformedBody(format!(
                "expected {} more bytes, found {}",
                n,
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_int(&mut self) -> ProtocolResult<i32> {
        let bytes = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(i32::from_be_bytes(raw))
    }

    pub fn read_long(&mut self) -> ProtocolResult<i64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(raw))
    }

    pub fn read_string(&mut self) -> ProtocolResult<String> {
        let len = self.read_int()? as u32 as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ProtocolError::MalformedBody(format!("string is not UTF-8: {e}")))
    }

    /// Fail if any bytes are left over.
    pub fn finish(self) -> ProtocolResult<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::MalformedBody(format!(
                "{} trailing bytes",
                self.buf.len()
            )))
        }
    }
}
