//! BOLT 8 Transport Encryption
//!
//! `Noise_XK_secp256k1_ChaChaPoly_SHA256` handshake and message framing.
//!
//! - ECDH: SHA256 of the compressed shared point
//! - HKDF-SHA256 with the chaining key as salt, 64 bytes split in two
//! - ChaCha20-Poly1305 with a 96-bit nonce of 4 zero bytes and a LE u64
//! - Each direction rotates its key after 1000 messages
//!
//! References:
//! - https://github.com/lightning/bolts/blob/master/08-transport.md

use crate::error::TransportError;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use secp256kfun::prelude::*;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const PROTOCOL_NAME: &[u8] = b"Noise_XK_secp256k1_ChaChaPoly_SHA256";
const PROLOGUE: &[u8] = b"lightning";
const HANDSHAKE_VERSION: u8 = 0;

pub const ACT_ONE_SIZE: usize = 50;
pub const ACT_TWO_SIZE: usize = 50;
pub const ACT_THREE_SIZE: usize = 66;

const TAG_SIZE: usize = 16;
const LENGTH_HEADER_SIZE: usize = 2 + TAG_SIZE;
const KEY_ROTATION_INTERVAL: u64 = 1000;
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

// ============================================================================
// Primitives
// ============================================================================

/// secp256k1 key pair used as a static or ephemeral Noise key
pub struct NoiseKey {
    secret: Scalar<Secret, NonZero>,
    public: Point,
}

impl NoiseKey {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Some(key) = Self::from_bytes(bytes) {
                return key;
            }
        }
    }

    pub fn from_bytes(secret: [u8; 32]) -> Option<Self> {
        let secret: Scalar<Secret, NonZero> = Scalar::from_bytes(secret)?;
        let public = g!(secret * G).normalize();
        Some(Self { secret, public })
    }

    /// Compressed public key
    pub fn public_bytes(&self) -> [u8; 33] {
        self.public.to_bytes()
    }
}

fn parse_point(bytes: &[u8]) -> Result<Point, TransportError> {
    let bytes: [u8; 33] = bytes
        .try_into()
        .map_err(|_| TransportError::Handshake("public key must be 33 bytes".into()))?;
    Point::from_bytes(bytes).ok_or_else(|| TransportError::Handshake("invalid public key".into()))
}

fn ecdh(secret: &Scalar<Secret, NonZero>, point: &Point) -> [u8; 32] {
    let (secret, point) = (secret.clone(), *point);
    let shared = g!(secret * point).normalize();
    Sha256::digest(shared.to_bytes()).into()
}

fn sha256_concat(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

fn hkdf_split(salt: &[u8; 32], ikm: &[u8]) -> Result<([u8; 32], [u8; 32]), TransportError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 64];
    hk.expand(&[], &mut okm)
        .map_err(|e| TransportError::Handshake(format!("hkdf: {}", e)))?;

    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    Ok((first, second))
}

fn nonce(n: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&n.to_le_bytes());
    nonce
}

fn encrypt_with_ad(key: &[u8; 32], n: u64, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(&nonce(n)), Payload { msg: plaintext, aad: ad })
        .map_err(|_| TransportError::Protocol("encryption failed".into()))
}

fn decrypt_with_ad(key: &[u8; 32], n: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, TransportError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(&nonce(n)), Payload { msg: ciphertext, aad: ad })
        .map_err(|_| TransportError::Decrypt("authentication tag mismatch".into()))
}

// ============================================================================
// Handshake
// ============================================================================

/// Chaining key and handshake digest
struct SymmetricState {
    ck: [u8; 32],
    h: [u8; 32],
}

impl SymmetricState {
    fn new(responder_static: &[u8; 33]) -> Self {
        let h: [u8; 32] = Sha256::digest(PROTOCOL_NAME).into();
        let ck = h;
        let h = sha256_concat(&h, PROLOGUE);
        let h = sha256_concat(&h, responder_static);
        Self { ck, h }
    }

    fn mix_hash(&mut self, data: &[u8]) {
        self.h = sha256_concat(&self.h, data);
    }

    /// Fold a shared secret into the chaining key, returning the temp key
    fn mix_key(&mut self, shared: &[u8; 32]) -> Result<[u8; 32], TransportError> {
        let (ck, temp_k) = hkdf_split(&self.ck, shared)?;
        self.ck = ck;
        Ok(temp_k)
    }

    fn split(&self) -> Result<([u8; 32], [u8; 32]), TransportError> {
        hkdf_split(&self.ck, &[])
    }
}

fn check_version(act: &[u8]) -> Result<(), TransportError> {
    match act.first() {
        Some(&HANDSHAKE_VERSION) => Ok(()),
        other => Err(TransportError::Handshake(format!(
            "unsupported handshake version {:?}",
            other
        ))),
    }
}

/// Initiator side: we know the responder's static key
pub struct InitiatorHandshake {
    state: SymmetricState,
    local: NoiseKey,
    ephemeral: NoiseKey,
    remote: Point,
}

impl InitiatorHandshake {
    pub fn new(local: NoiseKey, remote_static: &[u8; 33]) -> Result<Self, TransportError> {
        Self::with_ephemeral(local, NoiseKey::generate(), remote_static)
    }

    pub fn with_ephemeral(
        local: NoiseKey,
        ephemeral: NoiseKey,
        remote_static: &[u8; 33],
    ) -> Result<Self, TransportError> {
        Ok(Self {
            state: SymmetricState::new(remote_static),
            local,
            ephemeral,
            remote: parse_point(remote_static)?,
        })
    }

    pub fn act_one(&mut self) -> Result<[u8; ACT_ONE_SIZE], TransportError> {
        let e_pub = self.ephemeral.public_bytes();
        self.state.mix_hash(&e_pub);
        let es = ecdh(&self.ephemeral.secret, &self.remote);
        let temp_k1 = self.state.mix_key(&es)?;
        let c = encrypt_with_ad(&temp_k1, 0, &self.state.h, &[])?;
        self.state.mix_hash(&c);

        let mut act = [0u8; ACT_ONE_SIZE];
        act[0] = HANDSHAKE_VERSION;
        act[1..34].copy_from_slice(&e_pub);
        act[34..].copy_from_slice(&c);
        Ok(act)
    }

    /// Process act two and produce act three plus the session ciphers
    pub fn act_three(
        mut self,
        act_two: &[u8; ACT_TWO_SIZE],
    ) -> Result<([u8; ACT_THREE_SIZE], CipherState, CipherState), TransportError> {
        check_version(act_two)?;
        let re = parse_point(&act_two[1..34])?;
        let c = &act_two[34..];

        self.state.mix_hash(&act_two[1..34]);
        let ee = ecdh(&self.ephemeral.secret, &re);
        let temp_k2 = self.state.mix_key(&ee)?;
        decrypt_with_ad(&temp_k2, 0, &self.state.h, c)?;
        self.state.mix_hash(c);

        let c = encrypt_with_ad(&temp_k2, 1, &self.state.h, &self.local.public_bytes())?;
        self.state.mix_hash(&c);
        let se = ecdh(&self.local.secret, &re);
        let temp_k3 = self.state.mix_key(&se)?;
        let t = encrypt_with_ad(&temp_k3, 0, &self.state.h, &[])?;

        let (sk, rk) = self.state.split()?;

        let mut act = [0u8; ACT_THREE_SIZE];
        act[0] = HANDSHAKE_VERSION;
        act[1..50].copy_from_slice(&c);
        act[50..].copy_from_slice(&t);
        Ok((
            act,
            CipherState::new(sk, self.state.ck),
            CipherState::new(rk, self.state.ck),
        ))
    }
}

/// Responder side, used by tests standing in for a node
pub struct ResponderHandshake {
    state: SymmetricState,
    local: NoiseKey,
    ephemeral: NoiseKey,
    remote_ephemeral: Option<Point>,
    temp_k2: [u8; 32],
}

impl ResponderHandshake {
    pub fn new(local: NoiseKey) -> Self {
        Self::with_ephemeral(local, NoiseKey::generate())
    }

    pub fn with_ephemeral(local: NoiseKey, ephemeral: NoiseKey) -> Self {
        Self {
            state: SymmetricState::new(&local.public_bytes()),
            local,
            ephemeral,
            remote_ephemeral: None,
            temp_k2: [0u8; 32],
        }
    }

    /// Process act one and produce act two
    pub fn act_two(&mut self, act_one: &[u8; ACT_ONE_SIZE]) -> Result<[u8; ACT_TWO_SIZE], TransportError> {
        check_version(act_one)?;
        let re = parse_point(&act_one[1..34])?;
        let c = &act_one[34..];

        self.state.mix_hash(&act_one[1..34]);
        let es = ecdh(&self.local.secret, &re);
        let temp_k1 = self.state.mix_key(&es)?;
        decrypt_with_ad(&temp_k1, 0, &self.state.h, c)?;
        self.state.mix_hash(c);

        let e_pub = self.ephemeral.public_bytes();
        self.state.mix_hash(&e_pub);
        let ee = ecdh(&self.ephemeral.secret, &re);
        self.temp_k2 = self.state.mix_key(&ee)?;
        let c = encrypt_with_ad(&self.temp_k2, 0, &self.state.h, &[])?;
        self.state.mix_hash(&c);
        self.remote_ephemeral = Some(re);

        let mut act = [0u8; ACT_TWO_SIZE];
        act[0] = HANDSHAKE_VERSION;
        act[1..34].copy_from_slice(&e_pub);
        act[34..].copy_from_slice(&c);
        Ok(act)
    }

    /// Process act three; returns send and receive ciphers and the
    /// initiator's static key
    pub fn finish(
        mut self,
        act_three: &[u8; ACT_THREE_SIZE],
    ) -> Result<(CipherState, CipherState, [u8; 33]), TransportError> {
        check_version(act_three)?;
        if self.remote_ephemeral.is_none() {
            return Err(TransportError::Handshake("act three before act one".into()));
        }
        let c = &act_three[1..50];
        let t = &act_three[50..];

        let rs_bytes = decrypt_with_ad(&self.temp_k2, 1, &self.state.h, c)?;
        let rs = parse_point(&rs_bytes)?;
        self.state.mix_hash(c);
        let se = ecdh(&self.ephemeral.secret, &rs);
        let temp_k3 = self.state.mix_key(&se)?;
        decrypt_with_ad(&temp_k3, 0, &self.state.h, t)?;

        let (rk, sk) = self.state.split()?;
        Ok((
            CipherState::new(sk, self.state.ck),
            CipherState::new(rk, self.state.ck),
            rs.to_bytes(),
        ))
    }
}

// ============================================================================
// Transport Messages
// ============================================================================

/// One direction of an established session
pub struct CipherState {
    key: [u8; 32],
    nonce: u64,
    chaining_key: [u8; 32],
}

impl CipherState {
    fn new(key: [u8; 32], chaining_key: [u8; 32]) -> Self {
        Self {
            key,
            nonce: 0,
            chaining_key,
        }
    }

    fn advance(&mut self) -> Result<(), TransportError> {
        self.nonce += 1;
        if self.nonce == KEY_ROTATION_INTERVAL {
            let (ck, k) = hkdf_split(&self.chaining_key, &self.key)?;
            self.chaining_key = ck;
            self.key = k;
            self.nonce = 0;
        }
        Ok(())
    }

    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
        let sealed = encrypt_with_ad(&self.key, self.nonce, &[], plaintext)?;
        self.advance()?;
        Ok(sealed)
    }

    fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, TransportError> {
        let opened = decrypt_with_ad(&self.key, self.nonce, &[], ciphertext)?;
        self.advance()?;
        Ok(opened)
    }

    /// Encrypt a message: sealed length prefix followed by the sealed body
    pub fn encrypt_message(&mut self, message: &[u8]) -> Result<Vec<u8>, TransportError> {
        if message.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::Protocol(format!(
                "message of {} bytes exceeds {}",
                message.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        let length = (message.len() as u16).to_be_bytes();
        let mut out = self.seal(&length)?;
        out.extend(self.seal(message)?);
        Ok(out)
    }

    /// Decrypt a length header, returning the body size including its tag
    pub fn decrypt_length(&mut self, header: &[u8; LENGTH_HEADER_SIZE]) -> Result<usize, TransportError> {
        let length = self.open(header)?;
        let length: [u8; 2] = length
            .as_slice()
            .try_into()
            .map_err(|_| TransportError::Decrypt("bad length header".into()))?;
        Ok(u16::from_be_bytes(length) as usize + TAG_SIZE)
    }

    pub fn decrypt_body(&mut self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.open(body)
    }
}

pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    cipher: &mut CipherState,
    message: &[u8],
) -> Result<(), TransportError> {
    let frame = cipher.encrypt_message(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    cipher: &mut CipherState,
) -> Result<Vec<u8>, TransportError> {
    let mut header = [0u8; LENGTH_HEADER_SIZE];
    read_exact(reader, &mut header).await?;
    let body_len = cipher.decrypt_length(&header)?;

    let mut body = vec![0u8; body_len];
    read_exact(reader, &mut body).await?;
    cipher.decrypt_body(&body)
}

async fn read_exact<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
        Err(e) => Err(e.into()),
    }
}

/// Run the initiator handshake over a stream
pub async fn handshake_initiator<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    local: NoiseKey,
    remote_static: &[u8; 33],
) -> Result<(CipherState, CipherState), TransportError> {
    let mut handshake = InitiatorHandshake::new(local, remote_static)?;
    stream.write_all(&handshake.act_one()?).await?;

    let mut act_two = [0u8; ACT_TWO_SIZE];
    read_exact(stream, &mut act_two).await?;

    let (act_three, send, recv) = handshake.act_three(&act_two)?;
    stream.write_all(&act_three).await?;
    stream.flush().await?;
    Ok((send, recv))
}

/// Run the responder handshake over a stream
pub async fn handshake_responder<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    local: NoiseKey,
) -> Result<(CipherState, CipherState, [u8; 33]), TransportError> {
    let mut handshake = ResponderHandshake::new(local);

    let mut act_one = [0u8; ACT_ONE_SIZE];
    read_exact(stream, &mut act_one).await?;
    stream.write_all(&handshake.act_two(&act_one)?).await?;
    stream.flush().await?;

    let mut act_three = [0u8; ACT_THREE_SIZE];
    read_exact(stream, &mut act_three).await?;
    handshake.finish(&act_three)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> NoiseKey {
        NoiseKey::from_bytes([byte; 32]).unwrap()
    }

    fn responder_static() -> [u8; 33] {
        hex::decode("028d7500dd4c12685d1f568b4c2b5048e8534b873319f3a8daa612b469132ec7f7")
            .unwrap()
            .try_into()
            .unwrap()
    }

    #[test]
    fn test_static_public_keys() {
        assert_eq!(
            hex::encode(key(0x11).public_bytes()),
            "034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa"
        );
        assert_eq!(key(0x21).public_bytes(), responder_static());
    }

    #[test]
    fn test_act_one_vector() {
        let mut initiator =
            InitiatorHandshake::with_ephemeral(key(0x11), key(0x12), &responder_static()).unwrap();
        assert_eq!(
            hex::encode(initiator.act_one().unwrap()),
            "00036360e856310ce5d294e8be33fc807077dc56ac80d95d9cd4ddbd21325eff73f70df6086551151f58b8afe6c195782c6a"
        );
    }

    #[test]
    fn test_handshake_agrees_and_rotates() {
        let mut initiator =
            InitiatorHandshake::with_ephemeral(key(0x11), key(0x12), &responder_static()).unwrap();
        let mut responder = ResponderHandshake::with_ephemeral(key(0x21), key(0x22));

        let act_one = initiator.act_one().unwrap();
        let act_two = responder.act_two(&act_one).unwrap();
        let (act_three, mut i_send, mut i_recv) = initiator.act_three(&act_two).unwrap();
        let (mut r_send, mut r_recv, initiator_static) = responder.finish(&act_three).unwrap();
        assert_eq!(initiator_static, key(0x11).public_bytes());

        // Past the rotation point in both directions
        for i in 0..1_005u32 {
            let msg = format!("hello {}", i);
            let frame = i_send.encrypt_message(msg.as_bytes()).unwrap();
            let header: [u8; LENGTH_HEADER_SIZE] = frame[..LENGTH_HEADER_SIZE].try_into().unwrap();
            let len = r_recv.decrypt_length(&header).unwrap();
            assert_eq!(len, msg.len() + TAG_SIZE);
            let body = r_recv.decrypt_body(&frame[LENGTH_HEADER_SIZE..]).unwrap();
            assert_eq!(body, msg.as_bytes());

            let reply = r_send.encrypt_message(b"ack").unwrap();
            let header: [u8; LENGTH_HEADER_SIZE] = reply[..LENGTH_HEADER_SIZE].try_into().unwrap();
            i_recv.decrypt_length(&header).unwrap();
            assert_eq!(i_recv.decrypt_body(&reply[LENGTH_HEADER_SIZE..]).unwrap(), b"ack");
        }
    }

    #[test]
    fn test_wrong_responder_key_fails() {
        let mut initiator =
            InitiatorHandshake::with_ephemeral(key(0x11), key(0x12), &responder_static()).unwrap();
        let mut impostor = ResponderHandshake::with_ephemeral(key(0x31), key(0x22));
        let act_one = initiator.act_one().unwrap();
        assert!(matches!(impostor.act_two(&act_one), Err(TransportError::Decrypt(_))));
    }

    #[test]
    fn test_tampered_frame_rejected() {
        let mut initiator =
            InitiatorHandshake::with_ephemeral(key(0x11), key(0x12), &responder_static()).unwrap();
        let mut responder = ResponderHandshake::with_ephemeral(key(0x21), key(0x22));
        let act_two = responder.act_two(&initiator.act_one().unwrap()).unwrap();
        let (act_three, mut send, _) = initiator.act_three(&act_two).unwrap();
        let (_, mut recv, _) = responder.finish(&act_three).unwrap();

        let mut frame = send.encrypt_message(b"payload").unwrap();
        frame[0] ^= 0x01;
        let header: [u8; LENGTH_HEADER_SIZE] = frame[..LENGTH_HEADER_SIZE].try_into().unwrap();
        assert!(matches!(recv.decrypt_length(&header), Err(TransportError::Decrypt(_))));
    }

    #[tokio::test]
    async fn test_handshake_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let node_key = key(0x21);
        let node_pub = node_key.public_bytes();

        let server_task = tokio::spawn(async move {
            let (mut send, mut recv, _) = handshake_responder(&mut server, node_key).await.unwrap();
            let msg = read_message(&mut server, &mut recv).await.unwrap();
            write_message(&mut server, &mut send, &msg).await.unwrap();
        });

        let (mut send, mut recv) = handshake_initiator(&mut client, NoiseKey::generate(), &node_pub)
            .await
            .unwrap();
        write_message(&mut client, &mut send, b"ping").await.unwrap();
        assert_eq!(read_message(&mut client, &mut recv).await.unwrap(), b"ping");
        server_task.await.unwrap();
    }
}
