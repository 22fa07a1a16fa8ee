use crate::types::{EventRecord, Notification};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_jcs::to_string as jcs_to_string;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

#[derive(Clone, Debug)]
pub struct ExecMeta {
    pub tx_id: String,
    pub execution_time: DateTime<Utc>,
}

impl ExecMeta {
    pub fn now() -> Self {
        Self { tx_id: Uuid::new_v4().to_string(), execution_time: Utc::now() }
    }

    pub fn timestamp(&self) -> String {
        self.execution_time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}

#[derive(Clone, Default)]
pub struct KeyMaterial {
    pub signing: Option<SigningKey>,
    pub verifying: Option<VerifyingKey>,
}

impl KeyMaterial {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_signing_key(sk: SigningKey) -> Self {
        let verifying = Some(sk.verifying_key());
        Self { signing: Some(sk), verifying }
    }

    pub fn from_env() -> Self {
        let priv_b64 = std::env::var("ZKPAY_ED25519_PRIVATE_KEY_B64").ok();
        let pub_b64 = std::env::var("ZKPAY_ED25519_PUBLIC_KEY_B64").ok();

        let signing: Option<SigningKey> = priv_b64
            .and_then(|s| B64.decode(s).ok())
            .and_then(|b| {
                let arr: [u8; 32] = b.as_slice().try_into().ok()?;
                Some(SigningKey::from_bytes(&arr))
            });

        let verifying: Option<VerifyingKey> = pub_b64
            .and_then(|s| B64.decode(s).ok())
            .and_then(|b| {
                let arr: [u8; 32] = b.as_slice().try_into().ok()?;
                VerifyingKey::from_bytes(&arr).ok()
            })
            .or_else(|| signing.as_ref().map(|sk| sk.verifying_key()));

        Self { signing, verifying }
    }

    pub fn sign_b64(&self, msg: &[u8]) -> Option<String> {
        self.signing.as_ref().map(|sk| {
            let sig: Signature = sk.sign(msg);
            B64.encode(sig.to_bytes())
        })
    }

    pub fn verify_sig_b64(&self, msg: &[u8], sig_b64: &str) -> bool {
        let vk = match &self.verifying { Some(v) => v, None => return false };
        let sig_bytes = match B64.decode(sig_b64) { Ok(b) => b, Err(_) => return false };
        let arr: [u8; 64] = match sig_bytes.as_slice().try_into() { Ok(a) => a, Err(_) => return false };
        let sig = Signature::from_bytes(&arr);
        vk.verify(msg, &sig).is_ok()
    }
}

// --------------------------
// JCS (RFC8785) + SHA-256
// --------------------------
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn jcs_hash<T: Serialize>(data: &T) -> String {
    let s = jcs_to_string(data).expect("JCS serialization failed");
    sha256_hex(s.as_bytes())
}

/// Hash over the record with `record_hash` blanked and the signature stripped.
pub fn record_hash(record: &EventRecord) -> String {
    let mut tmp = record.clone();
    tmp.record_hash = "".into();
    tmp.record_signature = None;
    jcs_hash(&tmp)
}

/// Builds the next journal record, linked to `previous` and signed when a key is present.
pub fn seal(
    seq: u64,
    previous: Option<&EventRecord>,
    notification: Notification,
    meta: &ExecMeta,
    keys: &KeyMaterial,
) -> EventRecord {
    let mut record = EventRecord {
        seq,
        tx_id: meta.tx_id.clone(),
        timestamp: meta.timestamp(),
        notification,
        previous_record_hash: previous.map(|r| r.record_hash.clone()),
        record_hash: "".into(),
        record_signature: None,
    };
    record.record_hash = record_hash(&record);
    record.record_signature = keys.sign_b64(record.record_hash.as_bytes());
    record
}

/// Walks the journal checking sequence numbers, hash links and signatures.
///
/// With a signing key every record must carry a valid signature. With only a
/// verifying key, signatures that are present must verify.
pub fn verify_chain(records: &[EventRecord], keys: &KeyMaterial) -> Result<(), String> {
    let mut prev: Option<&EventRecord> = None;
    for (i, r) in records.iter().enumerate() {
        if r.seq != i as u64 {
            return Err(format!("seq_gap: index {} carries seq {}", i, r.seq));
        }
        let expected_prev = prev.map(|p| p.record_hash.clone());
        if r.previous_record_hash != expected_prev {
            return Err(format!("broken_link: seq {}", r.seq));
        }
        if record_hash(r) != r.record_hash {
            return Err(format!("hash_mismatch: seq {}", r.seq));
        }
        match r.record_signature.as_deref() {
            None if keys.signing.is_some() => {
                return Err(format!("missing_signature: seq {}", r.seq));
            }
            Some(sig) if keys.verifying.is_some() => {
                if !keys.verify_sig_b64(r.record_hash.as_bytes(), sig) {
                    return Err(format!("bad_signature: seq {}", r.seq));
                }
            }
            _ => {}
        }
        prev = Some(r);
    }
    Ok(())
}
