//! Per-connection security state and the payload transform pipeline.
//!
//! A session starts out unsecured: payloads are gzip-compressed but
//! readable by anyone on the path. One handshake (ephemeral x25519 key
//! agreement, HKDF-SHA256 key derivation) upgrades it permanently to
//! AES-256-GCM. Encrypted payloads carry a fresh random 12-byte nonce up
//! front and are not compressed (ciphertext does not compress).

use aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use hkdf::Hkdf;
use log::debug;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::io::{Read, Write};
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};

use crate::error::Error;
use crate::frame::{recv_frame, send_frame};
use crate::message::{Header, Message, MAX_FRAME};
use crate::serialize;
use crate::utils::Result;

const NONCE_LEN: usize = 12;
const KEY_INFO: &[u8] = b"mirrorfs session key";

enum Transform {
    /// Pre-handshake: compressed, unauthenticated.
    Compress,
    /// Post-handshake: AES-256-GCM under the agreed key.
    Encrypt(Box<Aes256Gcm>),
}

/// One connection's transport and cryptographic state.
///
/// Owned exclusively by a single client-to-server link. The secured state
/// is terminal: there is no downgrade and no rekey short of reconnecting.
pub struct Session<S> {
    stream: S,
    transform: Transform,
}

impl<S: Read + Write> Session<S> {
    /// Wrap a connected stream in a fresh, unsecured session.
    pub fn new(stream: S) -> Session<S> {
        Session {
            stream,
            transform: Transform::Compress,
        }
    }

    pub fn is_secured(&self) -> bool {
        matches!(self.transform, Transform::Encrypt(_))
    }

    /// Encode, transform and frame one message.
    ///
    /// The frame limit applies to the plaintext as well as the wire
    /// payload; the transform must not be a way around it.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        let bytes = serialize::encode(msg)?;
        if bytes.len() > MAX_FRAME as usize {
            return Err(Error::ProtocolViolation(format!(
                "message of {} bytes exceeds the {} byte limit",
                bytes.len(),
                MAX_FRAME
            )));
        }
        let payload = match self.transform {
            Transform::Compress => compress(&bytes)?,
            Transform::Encrypt(ref cipher) => seal(cipher, &bytes)?,
        };
        send_frame(&mut self.stream, &payload)
    }

    /// Block for one frame and reverse the transform pipeline.
    pub fn recv(&mut self) -> Result<Message> {
        let payload = recv_frame(&mut self.stream)?;
        let bytes = match self.transform {
            Transform::Compress => decompress(&payload)?,
            Transform::Encrypt(ref cipher) => open(cipher, &payload)?,
        };
        serialize::decode(&bytes)
    }

    /// Client half of the key agreement: receive the server's public key,
    /// answer with ours, derive the session key.
    pub fn secure_client(&mut self) -> Result<()> {
        self.check_unsecured()?;

        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);

        let server_public = self.recv_handshake_key()?;
        self.send(&Message::handshake(public.as_bytes().to_vec()))?;

        self.install_key(secret.diffie_hellman(&server_public))?;
        debug!("handshake complete, channel secured");
        Ok(())
    }

    /// Server half: offer our public key first, then take the client's.
    pub fn secure_server(&mut self) -> Result<()> {
        self.check_unsecured()?;

        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);

        self.send(&Message::handshake(public.as_bytes().to_vec()))?;
        let client_public = self.recv_handshake_key()?;

        self.install_key(secret.diffie_hellman(&client_public))?;
        debug!("handshake complete, channel secured");
        Ok(())
    }

    /// Tear the session apart, yielding the stream back.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn check_unsecured(&self) -> Result<()> {
        if self.is_secured() {
            return Err(Error::Handshake("session is already secured".to_owned()));
        }
        Ok(())
    }

    fn recv_handshake_key(&mut self) -> Result<PublicKey> {
        let msg = self.recv()?;
        if msg.header != Header::Handshake {
            return Err(Error::Handshake(format!(
                "expected a handshake, got {:?}",
                msg.header
            )));
        }

        let bytes = msg
            .values
            .into_iter()
            .next()
            .ok_or_else(|| Error::Handshake("handshake carried no key".to_owned()))?
            .into_bytes()
            .map_err(|_| Error::Handshake("handshake key is not a byte block".to_owned()))?;

        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Handshake("public key must be 32 bytes".to_owned()))?;
        Ok(PublicKey::from(key))
    }

    fn install_key(&mut self, shared: SharedSecret) -> Result<()> {
        let key = derive_key(&shared)?;
        self.transform = Transform::Encrypt(Box::new(Aes256Gcm::new(&key.into())));
        Ok(())
    }
}

/// Both sides expand the raw shared secret the same way, so the symmetric
/// key never crosses the wire.
fn derive_key(shared: &SharedSecret) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(KEY_INFO, &mut key)
        .map_err(|_| Error::Handshake("key derivation failed".to_owned()))?;
    Ok(key)
}

fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes)?;
    Ok(enc.finish()?)
}

fn decompress(payload: &[u8]) -> Result<Vec<u8>> {
    // Inflate at most one byte past the frame limit. The wire frame is
    // already bounded, but compression ratios are unbounded, so the
    // output needs its own cap or a small frame can balloon arbitrarily.
    let mut bytes = Vec::new();
    GzDecoder::new(payload)
        .take(MAX_FRAME as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| Error::Codec(format!("decompression failed: {e}")))?;
    if bytes.len() > MAX_FRAME as usize {
        return Err(Error::ProtocolViolation(format!(
            "decompressed payload exceeds the {MAX_FRAME} byte limit"
        )));
    }
    Ok(bytes)
}

fn seal(cipher: &Aes256Gcm, bytes: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), bytes)
        .map_err(|_| Error::Codec("encryption failed".to_owned()))?;

    let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(payload)
}

fn open(cipher: &Aes256Gcm, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() <= NONCE_LEN {
        return Err(Error::Codec("encrypted payload too short".to_owned()));
    }
    let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Codec("decryption failed".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Data, Value};
    use std::io;
    use std::sync::mpsc::{Receiver, Sender, channel};

    /// Blocking in-memory duplex built from two byte channels.
    struct Pipe {
        tx: Sender<Vec<u8>>,
        rx: Receiver<Vec<u8>>,
        leftover: Vec<u8>,
    }

    fn duplex() -> (Pipe, Pipe) {
        let (atx, arx) = channel();
        let (btx, brx) = channel();
        (
            Pipe {
                tx: atx,
                rx: brx,
                leftover: Vec::new(),
            },
            Pipe {
                tx: btx,
                rx: arx,
                leftover: Vec::new(),
            },
        )
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.leftover.is_empty() {
                match self.rx.recv() {
                    Ok(chunk) => self.leftover = chunk,
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.leftover.len());
            buf[..n].copy_from_slice(&self.leftover[..n]);
            self.leftover.drain(..n);
            Ok(n)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx
                .send(buf.to_vec())
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))?;
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn msg() -> Message {
        Message::ret(Value::Bytes(Data(b"the quick brown fox".to_vec())))
    }

    #[test]
    fn unsecured_roundtrip() {
        let (a, b) = duplex();
        let mut client = Session::new(a);
        let mut server = Session::new(b);

        client.send(&msg()).unwrap();
        assert_eq!(server.recv().unwrap(), msg());
    }

    #[test]
    fn overinflating_frame_rejected() {
        let (a, mut b) = duplex();
        let mut session = Session::new(a);

        // A tiny compressed frame that inflates past the limit must be
        // refused without materializing the full plaintext.
        let bomb = compress(&vec![0u8; MAX_FRAME as usize + 1]).unwrap();
        assert!(bomb.len() < MAX_FRAME as usize);
        send_frame(&mut b, &bomb).unwrap();

        assert!(matches!(
            session.recv(),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn oversized_message_refused_on_send() {
        let (a, _b) = duplex();
        let mut session = Session::new(a);

        let msg = Message::ret(Value::Bytes(Data(vec![0u8; MAX_FRAME as usize + 1])));
        assert!(matches!(
            session.send(&msg),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn handshake_agrees_and_encrypts_both_ways() {
        let (a, b) = duplex();
        let mut client = Session::new(a);
        let mut server = Session::new(b);

        let server_thread = std::thread::spawn(move || {
            server.secure_server().unwrap();
            server
        });
        client.secure_client().unwrap();
        let mut server = server_thread.join().unwrap();

        assert!(client.is_secured());
        assert!(server.is_secured());

        client.send(&msg()).unwrap();
        assert_eq!(server.recv().unwrap(), msg());

        server.send(&Message::ret(Value::I64(7))).unwrap();
        assert_eq!(client.recv().unwrap(), Message::ret(Value::I64(7)));
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let (a, b) = duplex();
        let mut client = Session::new(a);
        let mut server = Session::new(b);

        let server_thread = std::thread::spawn(move || {
            server.secure_server().unwrap();
            server
        });
        client.secure_client().unwrap();
        let mut server = server_thread.join().unwrap();

        // Pull the sealed payload apart, flip a ciphertext bit, reframe.
        let mut wire = Vec::new();
        {
            let bytes = serialize::encode(&msg()).unwrap();
            let Transform::Encrypt(ref cipher) = client.transform else {
                unreachable!()
            };
            let mut payload = seal(cipher, &bytes).unwrap();
            let last = payload.len() - 1;
            payload[last] ^= 0x01;
            send_frame(&mut wire, &payload).unwrap();
        }
        client.into_inner().tx.send(wire[..].to_vec()).unwrap();

        assert!(matches!(server.recv(), Err(Error::Codec(_))));
    }

    #[test]
    fn non_handshake_opening_is_fatal() {
        let (a, b) = duplex();
        let mut client = Session::new(a);
        let mut other = Session::new(b);

        other.send(&Message::error()).unwrap();
        assert!(matches!(client.secure_client(), Err(Error::Handshake(_))));
    }

    #[test]
    fn second_handshake_rejected() {
        let (a, b) = duplex();
        let mut client = Session::new(a);
        let mut server = Session::new(b);

        let server_thread = std::thread::spawn(move || {
            server.secure_server().unwrap();
            server
        });
        client.secure_client().unwrap();
        server_thread.join().unwrap();

        assert!(matches!(client.secure_client(), Err(Error::Handshake(_))));
    }
}
