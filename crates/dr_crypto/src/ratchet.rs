//! The Double Ratchet state machine: DH ratchet, two symmetric KDF chains,
//! and the skipped-message-key cache that makes the whole thing tolerate
//! loss and reordering.
//!
//! State separation:
//!   `rk`  — root key, re-derived on every DH ratchet step
//!   `cks` — sending chain key, advanced once per `encrypt`
//!   `ckr` — receiving chain key, advanced once per in-chain `decrypt`
//!   `mk`  — message key, derived from a chain key, used once, then gone
//!
//! Forward secrecy falls out of never retaining a used message key;
//! post-compromise security falls out of mixing a fresh DH output into the
//! root key on every ratchet step.

use tracing::{debug, trace};
use x25519_dalek::PublicKey;

use crate::aead;
use crate::dh::{DhKeyPair, SoftwareDhKeyPair};
use crate::error::RatchetError;
use crate::kdf::{kdf_ck, kdf_rk};
use crate::message::{Header, Message};
use crate::store::{InMemorySkippedKeyStore, SkippedKeyStore};

/// Default cap on message keys skipped in a single chain step. Bounds
/// memory and the cost a malicious sender can inflict via a huge counter
/// jump; 1000 matches the reference implementation this core is modeled on.
pub const DEFAULT_MAX_SKIP: u32 = 1000;

fn fingerprint(pk: &PublicKey) -> String {
    hex::encode(&pk.as_bytes()[..4])
}

/// Complete Double Ratchet session state for one direction of one session.
/// Generic over the DH keypair capability and the skipped-key store so
/// either can be swapped (hardware-token keys, a persistent store) without
/// touching the state machine.
pub struct RatchetState<D: DhKeyPair = SoftwareDhKeyPair, S: SkippedKeyStore = InMemorySkippedKeyStore> {
    /// Our current DH ratchet keypair (sending side).
    dhs: D,
    /// Peer's current DH ratchet public key. Absent until Bob receives
    /// Alice's first message.
    dhr: Option<PublicKey>,

    rk: [u8; 32],
    cks: Option<[u8; 32]>,
    ckr: Option<[u8; 32]>,

    ns: u32,
    nr: u32,
    pn: u32,

    mk_skipped: S,
    max_skip: u32,
}

impl<D: DhKeyPair, S: SkippedKeyStore + Default> RatchetState<D, S> {
    /// Initialize as the sender-first role ("Alice"). `sk` is the 32-byte
    /// shared secret from the handshake layer; `peer_initial_pub` is the
    /// peer's initial DH public key. Alice can send immediately; she has
    /// no receiving chain until the peer's first message arrives.
    pub fn init_alice(sk: &[u8; 32], peer_initial_pub: &PublicKey) -> Result<Self, RatchetError> {
        let dhs = D::generate()?;
        let dh_output = dhs.diffie_hellman(peer_initial_pub);
        let (rk, cks) = kdf_rk(sk, &dh_output)?;

        debug!(peer = %fingerprint(peer_initial_pub), "ratchet session initialized (initiator)");

        Ok(Self {
            dhs,
            dhr: Some(*peer_initial_pub),
            rk,
            cks: Some(cks),
            ckr: None,
            ns: 0,
            nr: 0,
            pn: 0,
            mk_skipped: S::default(),
            max_skip: DEFAULT_MAX_SKIP,
        })
    }

    /// Initialize as the receiver-first role ("Bob"). `sk` is the shared
    /// secret; `key_pair` becomes our first DH ratchet keypair. Bob has no
    /// sending chain until he has received and decrypted Alice's first
    /// message (which performs his first DH ratchet step).
    pub fn init_bob(sk: &[u8; 32], key_pair: D) -> Result<Self, RatchetError> {
        debug!("ratchet session initialized (responder)");
        Ok(Self {
            dhs: key_pair,
            dhr: None,
            rk: *sk,
            cks: None,
            ckr: None,
            ns: 0,
            nr: 0,
            pn: 0,
            mk_skipped: S::default(),
            max_skip: DEFAULT_MAX_SKIP,
        })
    }
}

impl<D: DhKeyPair, S: SkippedKeyStore> RatchetState<D, S> {
    /// Override the skip bound (default [`DEFAULT_MAX_SKIP`]).
    pub fn with_max_skip(mut self, max_skip: u32) -> Self {
        self.max_skip = max_skip;
        self
    }

    /// Our current DH ratchet public key, as carried on the next outgoing
    /// header.
    pub fn our_ratchet_public_key(&self) -> PublicKey {
        self.dhs.public_key()
    }

    pub fn send_counter(&self) -> u32 {
        self.ns
    }

    pub fn recv_counter(&self) -> u32 {
        self.nr
    }

    // ── Encrypt path ──────────────────────────────────────────────────

    /// Advance the sending chain by one step and AEAD-encrypt `plaintext`.
    /// Never blocks; never fails except on a primitive error. Mutates only
    /// `cks` and `ns`.
    pub fn encrypt(&mut self, plaintext: &[u8], ad: &[u8]) -> Result<Message, RatchetError> {
        let cks = self.cks.ok_or_else(|| {
            RatchetError::Crypto(
                "sending chain not yet established — must receive before first send in the responder role".into(),
            )
        })?;

        let header = Header::new(self.dhs.public_key(), self.ns, self.pn);

        let (new_cks, mk) = kdf_ck(&cks)?;
        self.cks = Some(new_cks);
        self.ns += 1;

        let full_ad = [ad, &header.encode()].concat();
        let ciphertext = aead::encrypt(&mk, plaintext, &full_ad)?;

        Ok(Message::new(header, ciphertext))
    }

    // ── Decrypt path ──────────────────────────────────────────────────

    /// Decrypt a received message, handling skipped-key lookup, DH ratchet
    /// steps, and same-chain catch-up skipping as needed.
    pub fn decrypt(&mut self, msg: &Message, ad: &[u8]) -> Result<Vec<u8>, RatchetError> {
        let header = &msg.header;
        let full_ad = [ad, &header.encode()].concat();

        // 1. Skipped-key fast path. A MAC failure here must not touch the
        // cache entry — it means the sender never produced this
        // ciphertext under that key, not that our cached key is stale.
        if let Some(mk) = self.mk_skipped.get(&header.dh, header.n)? {
            let plaintext = aead::decrypt(&mk, &msg.ciphertext, &full_ad)?;
            self.mk_skipped.delete(&header.dh, header.n)?;
            trace!(n = header.n, "decrypted from skipped-key cache");
            return Ok(plaintext);
        }

        // 2. Ratchet-step check.
        let need_ratchet = match self.dhr {
            Some(current) => current.as_bytes() != header.dh.as_bytes(),
            None => true,
        };

        if need_ratchet {
            if self.dhr.is_some() {
                self.skip_message_keys(header.pn)?;
            }
            self.dh_ratchet(header)?;
        }

        // 3. Same-chain skip up to this message's index.
        self.skip_message_keys(header.n)?;

        // 4. Advance the receiving chain one more step for this message.
        let ckr = self.ckr.ok_or_else(|| {
            RatchetError::Message("no receiving chain established for this header".into())
        })?;
        let (new_ckr, mk) = kdf_ck(&ckr)?;
        self.ckr = Some(new_ckr);
        self.nr += 1;

        aead::decrypt(&mk, &msg.ciphertext, &full_ad)
    }

    /// Single DH ratchet step: drains into a fresh root key via two DH
    /// operations (one against our old keypair, one against a freshly
    /// generated one), replacing both chain keys. After this returns, the
    /// old sending private key has been overwritten and is unrecoverable.
    fn dh_ratchet(&mut self, header: &Header) -> Result<(), RatchetError> {
        self.pn = self.ns;
        self.ns = 0;
        self.nr = 0;
        self.dhr = Some(header.dh);

        let recv_output = self.dhs.diffie_hellman(&header.dh);
        let (rk, ckr) = kdf_rk(&self.rk, &recv_output)?;
        self.rk = rk;
        self.ckr = Some(ckr);

        self.dhs = D::generate()?;
        let send_output = self.dhs.diffie_hellman(&header.dh);
        let (rk2, cks) = kdf_rk(&self.rk, &send_output)?;
        self.rk = rk2;
        self.cks = Some(cks);

        debug!(peer = %fingerprint(&header.dh), pn = self.pn, "DH ratchet step performed");
        Ok(())
    }

    /// Cache message keys for the receiving chain from `nr` up to (but not
    /// including) `until`. Validates bounds *before* any KDF step, so a
    /// rejected skip never mutates state.
    fn skip_message_keys(&mut self, until: u32) -> Result<(), RatchetError> {
        if until < self.nr {
            return Err(RatchetError::Message(
                "out-of-order below current receive counter".into(),
            ));
        }

        let skip_count = u64::from(until) - u64::from(self.nr);
        if skip_count > u64::from(self.max_skip) {
            return Err(RatchetError::Message(format!(
                "too many skipped messages ({skip_count} > {})",
                self.max_skip
            )));
        }

        if skip_count == 0 {
            return Ok(());
        }

        let dhr = self
            .dhr
            .expect("skip_message_keys called before any receiving chain exists");

        trace!(from = self.nr, to = until, "skipping message keys in receiving chain");

        while self.nr < until {
            let ckr = self.ckr.ok_or_else(|| {
                RatchetError::Crypto("receiving chain key missing during skip".into())
            })?;
            let (new_ckr, mk) = kdf_ck(&ckr)?;
            self.ckr = Some(new_ckr);
            self.mk_skipped.save(&dhr, self.nr, mk)?;
            self.nr += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dh::SoftwareDhKeyPair;

    type Alice = RatchetState<SoftwareDhKeyPair, InMemorySkippedKeyStore>;
    type Bob = RatchetState<SoftwareDhKeyPair, InMemorySkippedKeyStore>;

    fn shared_key() -> [u8; 32] {
        let mut sk = [0u8; 32];
        for (i, b) in sk.iter_mut().enumerate() {
            *b = i as u8;
        }
        sk
    }

    fn init_pair() -> (Alice, Bob) {
        let bob_kp = SoftwareDhKeyPair::generate().unwrap();
        let bob_pub = bob_kp.public_key();
        let sk = shared_key();

        let alice = RatchetState::init_alice(&sk, &bob_pub).unwrap();
        let bob = RatchetState::init_bob(&sk, bob_kp).unwrap();
        (alice, bob)
    }

    // S1: in-order ping-pong.
    #[test]
    fn in_order_ping_pong() {
        let (mut alice, mut bob) = init_pair();

        let m1 = alice.encrypt(b"hello", b"").unwrap();
        assert_eq!(bob.decrypt(&m1, b"").unwrap(), b"hello");

        let m2 = bob.encrypt(b"hi", b"").unwrap();
        assert_eq!(alice.decrypt(&m2, b"").unwrap(), b"hi");

        let m3 = alice.encrypt(b"again", b"").unwrap();
        assert_eq!(bob.decrypt(&m3, b"").unwrap(), b"again");
    }

    // S2: skip then deliver.
    #[test]
    fn skip_then_deliver() {
        let (mut alice, mut bob) = init_pair();

        let m1 = alice.encrypt(b"one", b"").unwrap();
        let m2 = alice.encrypt(b"two", b"").unwrap();
        let m3 = alice.encrypt(b"three", b"").unwrap();

        assert_eq!(bob.decrypt(&m1, b"").unwrap(), b"one");
        assert_eq!(bob.decrypt(&m3, b"").unwrap(), b"three");
        // m2's key must now be cached.
        assert!(bob.mk_skipped.get(&m2.header.dh, m2.header.n).unwrap().is_some());
        assert_eq!(bob.decrypt(&m2, b"").unwrap(), b"two");
        // And evicted after use.
        assert!(bob.mk_skipped.is_empty());
    }

    // S3: cross-chain skip + DH ratchet on both sides.
    #[test]
    fn cross_chain_skip_and_ratchet() {
        let (mut alice, mut bob) = init_pair();

        let m1 = alice.encrypt(b"one", b"").unwrap();
        let m2 = alice.encrypt(b"two", b"").unwrap();
        let m3 = alice.encrypt(b"three", b"").unwrap();
        bob.decrypt(&m1, b"").unwrap();
        bob.decrypt(&m3, b"").unwrap();
        bob.decrypt(&m2, b"").unwrap();

        let r1 = bob.encrypt(b"reply", b"").unwrap();
        alice.decrypt(&r1, b"").unwrap(); // triggers Alice's receive-side DH ratchet

        let m4 = alice.encrypt(b"four", b"").unwrap();
        assert_eq!(m4.header.pn, 3);
        assert_eq!(m4.header.n, 0);
        assert_eq!(bob.decrypt(&m4, b"").unwrap(), b"four");
    }

    // S4: MaxSkip breach.
    #[test]
    fn max_skip_breach_leaves_counter_unchanged() {
        let bob_kp = SoftwareDhKeyPair::generate().unwrap();
        let bob_pub = bob_kp.public_key();
        let sk = shared_key();

        let mut alice: Alice = RatchetState::init_alice(&sk, &bob_pub).unwrap().with_max_skip(2);
        let mut bob: Bob = RatchetState::init_bob(&sk, bob_kp).unwrap().with_max_skip(2);

        let _m1 = alice.encrypt(b"1", b"").unwrap();
        let _m2 = alice.encrypt(b"2", b"").unwrap();
        let _m3 = alice.encrypt(b"3", b"").unwrap();
        let _m4 = alice.encrypt(b"4", b"").unwrap();
        let m5 = alice.encrypt(b"5", b"").unwrap();

        let before = bob.recv_counter();
        let err = bob.decrypt(&m5, b"").unwrap_err();
        assert!(matches!(err, RatchetError::Message(_)));
        assert_eq!(bob.recv_counter(), before);
    }

    // S5: tamper, then a follow-up message still works.
    #[test]
    fn tamper_then_recovers() {
        let (mut alice, mut bob) = init_pair();

        let mut m1 = alice.encrypt(b"hello", b"").unwrap();
        *m1.ciphertext.last_mut().unwrap() ^= 0x01;
        let err = bob.decrypt(&m1, b"").unwrap_err();
        assert!(matches!(err, RatchetError::Auth));

        let m2 = alice.encrypt(b"still here", b"").unwrap();
        assert_eq!(bob.decrypt(&m2, b"").unwrap(), b"still here");
    }

    // S6: out-of-order below current, same DH key, never succeeds.
    #[test]
    fn out_of_order_below_current_rejected() {
        let (mut alice, mut bob) = init_pair();

        let mut msgs = Vec::new();
        for i in 0..6 {
            msgs.push(alice.encrypt(format!("m{i}").as_bytes(), b"").unwrap());
        }
        for m in &msgs {
            bob.decrypt(m, b"").unwrap();
        }
        assert_eq!(bob.recv_counter(), 6);

        let err = bob.decrypt(&msgs[3], b"").unwrap_err();
        assert!(matches!(err, RatchetError::Message(_)));
    }

    #[test]
    fn header_authentication_flips_bit_fails() {
        let (mut alice, mut bob) = init_pair();
        let m1 = alice.encrypt(b"hello", b"associated").unwrap();
        let err = bob.decrypt(&m1, b"different-ad").unwrap_err();
        assert!(matches!(err, RatchetError::Auth));
    }

    #[test]
    fn counters_increase_monotonically_within_a_chain() {
        let (mut alice, _bob) = init_pair();
        let m1 = alice.encrypt(b"a", b"").unwrap();
        let m2 = alice.encrypt(b"b", b"").unwrap();
        let m3 = alice.encrypt(b"c", b"").unwrap();
        assert_eq!((m1.header.n, m2.header.n, m3.header.n), (0, 1, 2));
    }

    #[test]
    fn bob_cannot_send_before_first_receive() {
        let bob_kp = SoftwareDhKeyPair::generate().unwrap();
        let sk = shared_key();
        let mut bob: Bob = RatchetState::init_bob(&sk, bob_kp).unwrap();
        assert!(bob.encrypt(b"too early", b"").is_err());
    }
}
