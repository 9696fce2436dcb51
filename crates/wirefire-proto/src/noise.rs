//! noise protocol handshake for the `/ts2021` channel.
//!
//! wirefire terminates the client-server handshake using the
//! noise_ik_25519_chachapoly_blake2s pattern:
//! - IK: the initiator already knows the responder's static public key
//! - 25519: curve25519 key exchange
//! - ChaChaPoly: chacha20-poly1305 encryption
//! - BLAKE2s: hash function

use snow::{Builder, HandshakeState, TransportState};

/// noise protocol pattern used by the tailscale control protocol.
const NOISE_PATTERN: &str = "Noise_IK_25519_ChaChaPoly_BLAKE2s";

/// chacha20-poly1305 cipher with big-endian nonce encoding.
///
/// tailscale's noise implementation uses big-endian nonces, while the noise
/// spec (and upstream snow) use little-endian. nonce=0 is identical in both
/// encodings, so the first message works either way — every subsequent
/// message fails with LE nonces.
#[derive(Default)]
struct BigEndianChaChaPoly {
    key: [u8; 32],
}

impl snow::types::Cipher for BigEndianChaChaPoly {
    fn name(&self) -> &'static str {
        "ChaChaPoly"
    }

    fn set(&mut self, key: &[u8]) {
        self.key.copy_from_slice(key);
    }

    fn encrypt(&self, nonce: u64, authtext: &[u8], plaintext: &[u8], out: &mut [u8]) -> usize {
        use chacha20poly1305::{ChaCha20Poly1305, KeyInit, aead::AeadInPlace};

        let mut nonce_bytes = [0u8; 12];
        nonce_bytes[4..].copy_from_slice(&nonce.to_be_bytes());

        out[..plaintext.len()].copy_from_slice(plaintext);

        let tag = ChaCha20Poly1305::new(&self.key.into())
            .encrypt_in_place_detached(&nonce_bytes.into(), authtext, &mut out[..plaintext.len()])
            .unwrap();

        out[plaintext.len()..plaintext.len() + 16].copy_from_slice(&tag);
        plaintext.len() + 16
    }

    fn decrypt(
        &self,
        nonce: u64,
        authtext: &[u8],
        ciphertext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, snow::Error> {
        use chacha20poly1305::{ChaCha20Poly1305, KeyInit, aead::AeadInPlace};

        let mut nonce_bytes = [0u8; 12];
        nonce_bytes[4..].copy_from_slice(&nonce.to_be_bytes());

        let message_len = ciphertext.len() - 16;
        out[..message_len].copy_from_slice(&ciphertext[..message_len]);

        ChaCha20Poly1305::new(&self.key.into())
            .decrypt_in_place_detached(
                &nonce_bytes.into(),
                authtext,
                &mut out[..message_len],
                ciphertext[message_len..].into(),
            )
            .map_err(|_| snow::Error::Decrypt)?;

        Ok(message_len)
    }
}

/// crypto resolver that swaps in the big-endian-nonce cipher.
///
/// delegates everything else to snow's `DefaultResolver`.
struct WireResolver;

impl snow::resolvers::CryptoResolver for WireResolver {
    fn resolve_rng(&self) -> Option<Box<dyn snow::types::Random>> {
        snow::resolvers::DefaultResolver.resolve_rng()
    }

    fn resolve_dh(&self, choice: &snow::params::DHChoice) -> Option<Box<dyn snow::types::Dh>> {
        snow::resolvers::DefaultResolver.resolve_dh(choice)
    }

    fn resolve_hash(
        &self,
        choice: &snow::params::HashChoice,
    ) -> Option<Box<dyn snow::types::Hash>> {
        snow::resolvers::DefaultResolver.resolve_hash(choice)
    }

    fn resolve_cipher(
        &self,
        choice: &snow::params::CipherChoice,
    ) -> Option<Box<dyn snow::types::Cipher>> {
        match choice {
            snow::params::CipherChoice::ChaChaPoly => Some(Box::new(BigEndianChaChaPoly::default())),
            other => snow::resolvers::DefaultResolver.resolve_cipher(other),
        }
    }
}

/// a snow builder configured with the wire-compatible resolver.
pub fn builder() -> crate::Result<snow::Builder<'static>> {
    let params = NOISE_PATTERN.parse()?;
    Ok(Builder::with_resolver(params, Box::new(WireResolver)))
}

/// server-side handshake state for one `/ts2021` connection.
#[derive(Debug)]
pub struct NoiseHandshake {
    state: HandshakeState,
}

impl NoiseHandshake {
    /// create a responder with the given static private key and prologue.
    ///
    /// the prologue binds the handshake to the protocol context; the client
    /// sends `"Tailscale Control Protocol v<version>"`.
    pub fn responder(private_key: &[u8], prologue: &[u8]) -> crate::Result<Self> {
        let state = builder()?
            .local_private_key(private_key)
            .prologue(prologue)
            .build_responder()?;
        Ok(Self { state })
    }

    /// process an incoming handshake message, returning its payload.
    pub fn read_message(&mut self, message: &[u8]) -> crate::Result<Vec<u8>> {
        let mut buf = vec![0u8; 65535];
        let len = self.state.read_message(message, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// generate the outgoing handshake message carrying `payload`.
    pub fn write_message(&mut self, payload: &[u8]) -> crate::Result<Vec<u8>> {
        let mut buf = vec![0u8; 65535];
        let len = self.state.write_message(payload, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// whether both handshake messages have been processed.
    pub fn is_complete(&self) -> bool {
        self.state.is_handshake_finished()
    }

    /// the client's static public key (its machine key), once known.
    pub fn remote_static(&self) -> Option<Vec<u8>> {
        self.state.get_remote_static().map(|s| s.to_vec())
    }

    /// convert into transport mode for encrypted traffic.
    pub fn into_transport(self) -> crate::Result<NoiseTransport> {
        let state = self.state.into_transport_mode()?;
        Ok(NoiseTransport { state })
    }
}

/// post-handshake transport for encrypted communication.
#[derive(Debug)]
pub struct NoiseTransport {
    state: TransportState,
}

impl NoiseTransport {
    /// encrypt a message, returning ciphertext plus the 16-byte tag.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> crate::Result<Vec<u8>> {
        let mut buf = vec![0u8; plaintext.len() + 16];
        let len = self.state.write_message(plaintext, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// decrypt a message.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> crate::Result<Vec<u8>> {
        let mut buf = vec![0u8; ciphertext.len()];
        let len = self.state.read_message(ciphertext, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROLOGUE: &[u8] = b"Tailscale Control Protocol v68";

    fn generate_keypair() -> (Vec<u8>, Vec<u8>) {
        let keypair = builder().unwrap().generate_keypair().unwrap();
        (keypair.private, keypair.public)
    }

    fn build_initiator(client_priv: &[u8], server_pub: &[u8]) -> snow::HandshakeState {
        builder()
            .unwrap()
            .local_private_key(client_priv)
            .remote_public_key(server_pub)
            .prologue(PROLOGUE)
            .build_initiator()
            .unwrap()
    }

    fn handshake() -> (snow::TransportState, NoiseTransport, Vec<u8>) {
        let (server_priv, server_pub) = generate_keypair();
        let (client_priv, client_pub) = generate_keypair();

        let mut server = NoiseHandshake::responder(&server_priv, PROLOGUE).unwrap();
        let mut client = build_initiator(&client_priv, &server_pub);

        let mut buf = vec![0u8; 65535];
        let len = client.write_message(&[], &mut buf).unwrap();
        server.read_message(&buf[..len]).unwrap();

        let msg2 = server.write_message(&[]).unwrap();
        let mut buf = vec![0u8; 65535];
        client.read_message(&msg2, &mut buf).unwrap();

        assert!(server.is_complete());
        assert_eq!(server.remote_static().unwrap(), client_pub);

        (
            client.into_transport_mode().unwrap(),
            server.into_transport().unwrap(),
            client_pub,
        )
    }

    #[test]
    fn handshake_exposes_client_key() {
        let (_, _, client_pub) = handshake();
        assert_eq!(client_pub.len(), 32);
    }

    #[test]
    fn transport_roundtrip_both_directions() {
        let (mut client, mut server, _) = handshake();

        let mut buf = vec![0u8; 64];
        let len = client.write_message(b"hello from client", &mut buf).unwrap();
        assert_eq!(server.decrypt(&buf[..len]).unwrap(), b"hello from client");

        let ct = server.encrypt(b"hello from server").unwrap();
        let mut buf = vec![0u8; ct.len()];
        let len = client.read_message(&ct, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello from server");
    }

    #[test]
    fn multiple_client_messages_decrypt_in_order() {
        // exercises nonces > 0, where big-endian vs little-endian encoding
        // diverges
        let (mut client, mut server, _) = handshake();

        for i in 0..5u8 {
            let msg = [i; 32];
            let mut buf = vec![0u8; 64];
            let len = client.write_message(&msg, &mut buf).unwrap();
            assert_eq!(server.decrypt(&buf[..len]).unwrap(), msg);
        }
    }

    #[test]
    fn invalid_message_rejected() {
        let (server_priv, _) = generate_keypair();
        let mut server = NoiseHandshake::responder(&server_priv, PROLOGUE).unwrap();
        assert!(server.read_message(b"invalid").is_err());
    }

    #[test]
    fn transport_before_complete_fails() {
        let (server_priv, _) = generate_keypair();
        let server = NoiseHandshake::responder(&server_priv, PROLOGUE).unwrap();
        assert!(!server.is_complete());
        assert!(server.into_transport().is_err());
    }

    #[test]
    fn mismatched_prologue_fails() {
        let (server_priv, server_pub) = generate_keypair();
        let (client_priv, _) = generate_keypair();

        let mut server =
            NoiseHandshake::responder(&server_priv, b"Tailscale Control Protocol v99").unwrap();
        let mut client = build_initiator(&client_priv, &server_pub);

        let mut buf = vec![0u8; 65535];
        let len = client.write_message(&[], &mut buf).unwrap();
        assert!(server.read_message(&buf[..len]).is_err());
    }

    #[test]
    fn big_endian_nonces_differ_from_le_at_nonce_one() {
        use snow::types::Cipher;

        let mut cipher = BigEndianChaChaPoly::default();
        let key = [0x42u8; 32];
        cipher.set(&key);

        let plaintext = b"hello wirefire!";
        let mut ct_be = vec![0u8; plaintext.len() + 16];
        cipher.encrypt(1, &[], plaintext, &mut ct_be);

        use chacha20poly1305::{ChaCha20Poly1305, KeyInit, aead::AeadInPlace};
        let mut nonce_le = [0u8; 12];
        nonce_le[4..].copy_from_slice(&1u64.to_le_bytes());
        let mut ct_le = plaintext.to_vec();
        let tag = ChaCha20Poly1305::new(&key.into())
            .encrypt_in_place_detached(&nonce_le.into(), &[], &mut ct_le)
            .unwrap();
        ct_le.extend_from_slice(&tag);

        assert_ne!(ct_be[..], ct_le[..]);
    }
}
