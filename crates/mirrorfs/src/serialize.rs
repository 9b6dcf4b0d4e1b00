//! Serialize/deserialize protocol messages into/from binary.
//!
//! Every value is written as a one-byte shape tag followed by its payload,
//! so a decoded message reproduces the encoded one exactly. The byte order
//! is little-endian throughout.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_traits::FromPrimitive;
use std::io::{Cursor, Read};
use std::mem;
use std::ops::{Shl, Shr};

use crate::error::Error;
use crate::message::*;
use crate::utils::Result;

macro_rules! decode {
    ($decoder:expr) => {
        Decodable::decode(&mut $decoder)?
    };
}

fn read_exact<R: std::io::Read + ?Sized>(r: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0; size];
    r.read_exact(&mut buf[..])?;
    Ok(buf)
}

/// A serializing specific result to overload operators on `Result`
///
/// # Overloaded operators
/// <<, >>, ?
pub struct SResult<T>(crate::utils::Result<T>);

/// A wrapper class of WriteBytesExt to provide operator overloads
/// for serializing
///
/// Operator '<<' serializes the right hand side argument into
/// the left hand side encoder
#[derive(Clone, Debug)]
pub struct Encoder<W> {
    writer: W,
    bytes: usize,
}

impl<W: WriteBytesExt> Encoder<W> {
    pub fn new(writer: W) -> Encoder<W> {
        Encoder { writer, bytes: 0 }
    }

    /// Return total bytes written
    pub fn bytes_written(&self) -> usize {
        self.bytes
    }

    /// Encode data, equivalent to: encoder << data
    pub fn encode<T: Encodable>(&mut self, data: &T) -> Result<usize> {
        let bytes = data.encode(&mut self.writer)?;
        self.bytes += bytes;
        Ok(bytes)
    }

    /// Get inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for Encoder<W> {
    type Output = SResult<Encoder<W>>;
    fn shl(mut self, rhs: &'a T) -> Self::Output {
        match self.encode(rhs) {
            Ok(_) => SResult(Ok(self)),
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for SResult<Encoder<W>> {
    type Output = Self;
    fn shl(self, rhs: &'a T) -> Self::Output {
        match self.0 {
            Ok(mut encoder) => match encoder.encode(rhs) {
                Ok(_) => SResult(Ok(encoder)),
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

/// A wrapper class of ReadBytesExt to provide operator overloads
/// for deserializing
#[derive(Clone, Debug)]
pub struct Decoder<R> {
    reader: R,
}

impl<R: ReadBytesExt> Decoder<R> {
    pub fn new(reader: R) -> Decoder<R> {
        Decoder { reader }
    }
    pub fn decode<T: Decodable>(&mut self) -> Result<T> {
        Decodable::decode(&mut self.reader)
    }
    /// Get inner reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<'a, T: Decodable, R: ReadBytesExt> Shr<&'a mut T> for Decoder<R> {
    type Output = SResult<Decoder<R>>;
    fn shr(mut self, rhs: &'a mut T) -> Self::Output {
        match self.decode() {
            Ok(r) => {
                *rhs = r;
                SResult(Ok(self))
            }
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Decodable, R: ReadBytesExt> Shr<&'a mut T> for SResult<Decoder<R>> {
    type Output = Self;
    fn shr(self, rhs: &'a mut T) -> Self::Output {
        match self.0 {
            Ok(mut decoder) => match decoder.decode() {
                Ok(r) => {
                    *rhs = r;
                    SResult(Ok(decoder))
                }
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

/// Trait representing a type which can be serialized into binary
pub trait Encodable {
    /// Encode self to w and returns the number of bytes encoded
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize>;
}

impl Encodable for bool {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u8(*self as u8)?;
        Ok(mem::size_of::<u8>())
    }
}

impl Encodable for u8 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u8(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl Encodable for u16 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u16::<LittleEndian>(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl Encodable for u32 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u32::<LittleEndian>(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl Encodable for u64 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u64::<LittleEndian>(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl Encodable for i32 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_i32::<LittleEndian>(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl Encodable for i64 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_i64::<LittleEndian>(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl Encodable for String {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        if self.len() > u16::MAX as usize {
            return Err(Error::UnsupportedType(format!(
                "string of {} bytes exceeds the wire limit",
                self.len()
            )));
        }
        let mut bytes = (self.len() as u16).encode(w)?;
        w.write_all(self.as_bytes())?;
        bytes += self.len();
        Ok(bytes)
    }
}

impl Encodable for Data {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        if self.0.len() > u32::MAX as usize {
            return Err(Error::UnsupportedType(format!(
                "byte block of {} bytes exceeds the wire limit",
                self.0.len()
            )));
        }
        let size = self.0.len();
        let bytes = (size as u32).encode(w)? + size;
        w.write_all(&self.0)?;
        Ok(bytes)
    }
}

impl Encodable for Timestamp {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.sec << &self.nsec {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for Option<Timestamp> {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match *self {
            Some(ref time) => match Encoder::new(w) << &1u8 << time {
                SResult(Ok(enc)) => Ok(enc.bytes_written()),
                SResult(Err(e)) => Err(e),
            },
            None => 0u8.encode(w),
        }
    }
}

impl Encodable for FileAttributes {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.bits().encode(w)
    }
}

impl Encodable for Status {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        (*self as u32).encode(w)
    }
}

impl Encodable for Metadata {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.name
            << &self.attr
            << &self.created
            << &self.accessed
            << &self.modified
            << &self.len
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        if self.len() > u16::MAX as usize {
            return Err(Error::UnsupportedType(format!(
                "sequence of {} elements exceeds the wire limit",
                self.len()
            )));
        }
        match self
            .iter()
            .fold(Encoder::new(w) << &(self.len() as u16), |acc, s| acc << s)
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for Value {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let buf = Encoder::new(w) << &self.tag();

        let buf = match *self {
            Value::Bool(ref v) => buf << v,
            Value::I32(ref v) => buf << v,
            Value::I64(ref v) => buf << v,
            Value::U32(ref v) => buf << v,
            Value::U64(ref v) => buf << v,
            Value::Str(ref v) => buf << v,
            Value::Bytes(ref v) => buf << v,
            Value::Time(ref v) => buf << v,
            Value::Attr(ref v) => buf << v,
            Value::Status(ref v) => buf << v,
            Value::Meta(ref v) => buf << v,
            Value::MetaList(ref v) => buf << v,
        };

        match buf {
            SResult(Ok(b)) => Ok(b.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for Message {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        if self.values.len() > u16::MAX as usize {
            return Err(Error::UnsupportedType(format!(
                "message of {} values exceeds the wire limit",
                self.values.len()
            )));
        }
        match self
            .values
            .iter()
            .fold(
                Encoder::new(w) << &(self.header as u8) << &(self.values.len() as u16),
                |acc, v| acc << v,
            ) {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

/// Trait representing a type which can be deserialized from binary
pub trait Decodable: Sized {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self>;
}

impl Decodable for bool {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        match r.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(Error::Codec(format!("invalid bool byte 0x{b:02x}"))),
        }
    }
}

impl Decodable for u8 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(r.read_u8()?)
    }
}

impl Decodable for u16 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(r.read_u16::<LittleEndian>()?)
    }
}

impl Decodable for u32 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(r.read_u32::<LittleEndian>()?)
    }
}

impl Decodable for u64 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(r.read_u64::<LittleEndian>()?)
    }
}

impl Decodable for i32 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(r.read_i32::<LittleEndian>()?)
    }
}

impl Decodable for i64 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(r.read_i64::<LittleEndian>()?)
    }
}

impl Decodable for String {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u16 = Decodable::decode(r)?;
        String::from_utf8(read_exact(r, len as usize)?)
            .map_err(|_| Error::Codec("invalid UTF-8 sequence".to_owned()))
    }
}

impl Decodable for Data {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u32 = Decodable::decode(r)?;
        if len > MAX_FRAME {
            return Err(Error::Codec(format!(
                "declared byte block length {len} exceeds the {MAX_FRAME} byte limit"
            )));
        }
        // Grow with the bytes actually present instead of trusting the
        // declared length for the allocation.
        let mut buf = Vec::new();
        r.take(u64::from(len)).read_to_end(&mut buf)?;
        if buf.len() != len as usize {
            return Err(Error::Codec("byte block truncated".to_owned()));
        }
        Ok(Data(buf))
    }
}

impl Decodable for Timestamp {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(Timestamp {
            sec: Decodable::decode(r)?,
            nsec: Decodable::decode(r)?,
        })
    }
}

impl Decodable for Option<Timestamp> {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        match r.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(Decodable::decode(r)?)),
            b => Err(Error::Codec(format!("invalid presence byte 0x{b:02x}"))),
        }
    }
}

impl Decodable for FileAttributes {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let bits: u32 = Decodable::decode(r)?;
        Ok(FileAttributes::from_bits_truncate(bits))
    }
}

impl Decodable for Status {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let code: u32 = Decodable::decode(r)?;
        Status::from_u32(code).ok_or_else(|| Error::Codec(format!("unknown status 0x{code:08x}")))
    }
}

impl Decodable for Metadata {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(Metadata {
            name: Decodable::decode(r)?,
            attr: Decodable::decode(r)?,
            created: Decodable::decode(r)?,
            accessed: Decodable::decode(r)?,
            modified: Decodable::decode(r)?,
            len: Decodable::decode(r)?,
        })
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u16 = Decodable::decode(r)?;
        let mut buf = Vec::new();
        for _ in 0..len {
            buf.push(Decodable::decode(r)?);
        }
        Ok(buf)
    }
}

impl Decodable for Value {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let mut buf = r;

        let tag: u8 = decode!(buf);
        let value = match tag {
            0x01 => Value::Bool(decode!(buf)),
            0x02 => Value::I32(decode!(buf)),
            0x03 => Value::I64(decode!(buf)),
            0x04 => Value::U32(decode!(buf)),
            0x05 => Value::U64(decode!(buf)),
            0x06 => Value::Str(decode!(buf)),
            0x07 => Value::Bytes(decode!(buf)),
            0x08 => Value::Time(decode!(buf)),
            0x09 => Value::Attr(decode!(buf)),
            0x0A => Value::Status(decode!(buf)),
            0x0B => Value::Meta(decode!(buf)),
            0x0C => Value::MetaList(decode!(buf)),
            _ => return Err(Error::Codec(format!("unknown value tag 0x{tag:02x}"))),
        };

        Ok(value)
    }
}

impl Decodable for Message {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let mut buf = r;

        let raw: u8 = decode!(buf);
        let header = Header::from_u8(raw)
            .ok_or_else(|| Error::Codec(format!("unknown header tag 0x{raw:02x}")))?;

        let count: u16 = decode!(buf);
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(decode!(buf));
        }

        Ok(Message { header, values })
    }
}

/// Serialize a message into a standalone byte payload.
pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    msg.encode(&mut buf)?;
    Ok(buf)
}

/// Deserialize a message from a byte payload, requiring full consumption.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let mut cursor = Cursor::new(bytes);
    let msg = Message::decode(&mut cursor).map_err(|e| match e {
        // The payload is complete in memory, so hitting its end is a
        // malformed message rather than a transport failure.
        Error::Io(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            Error::Codec("message truncated".to_owned())
        }
        other => other,
    })?;
    if cursor.position() != bytes.len() as u64 {
        return Err(Error::Codec(format!(
            "{} trailing bytes after message",
            bytes.len() as u64 - cursor.position()
        )));
    }
    Ok(msg)
}
