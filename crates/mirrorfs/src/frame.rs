//! Length-prefixed framing over a reliable byte stream.
//!
//! A frame is a 4-byte little-endian length followed by exactly that many
//! payload bytes. The length always describes the post-transform payload
//! (compressed or encrypted); this layer knows nothing about message kinds.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::Error;
use crate::message::MAX_FRAME;
use crate::utils::Result;

/// Write one frame and flush it.
pub fn send_frame<W: Write>(w: &mut W, payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(Error::ProtocolViolation("refusing to send an empty frame".to_owned()));
    }
    if payload.len() > MAX_FRAME as usize {
        return Err(Error::ProtocolViolation(format!(
            "frame of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME
        )));
    }

    w.write_u32::<LittleEndian>(payload.len() as u32)
        .map_err(connection_err)?;
    w.write_all(payload).map_err(connection_err)?;
    w.flush().map_err(connection_err)?;
    Ok(())
}

/// Block until one whole frame has been read.
///
/// Partial reads are accumulated; the peer closing mid-frame is a
/// connection error, a declared length of zero a protocol violation.
pub fn recv_frame<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>().map_err(connection_err)?;

    if len == 0 {
        return Err(Error::ProtocolViolation("zero-length frame".to_owned()));
    }
    if len > MAX_FRAME {
        return Err(Error::ProtocolViolation(format!(
            "declared frame length {len} exceeds the {MAX_FRAME} byte limit"
        )));
    }

    let mut payload = vec![0; len as usize];
    r.read_exact(&mut payload[..]).map_err(connection_err)?;
    Ok(payload)
}

fn connection_err(e: io::Error) -> Error {
    Error::Connection(e.to_string())
}
