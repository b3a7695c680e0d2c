//! Web Push delivery: RFC 8291 payload encryption and RFC 8292 VAPID
//! authentication over a plain HTTPS POST.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit};
use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::header::HeaderMap;
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::RwLock;
use url::Url;

use super::presentation::{truncate_string, PushPayload};
use crate::config::PushConfig;
use crate::db::models::PushSubscription;
use crate::error::{AppError, AppResult};

const SALT_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;
const DEFAULT_RS: u32 = 4096;
const MAX_PAYLOAD_BYTES: usize = 3500;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);
const VAPID_JWT_EXP_SECS: i64 = 12 * 60 * 60;
const VAPID_JWT_SKEW_SECS: i64 = 60;

const IKM_INFO_PREFIX: &str = "WebPush: info\0";
const KEY_INFO: &str = "Content-Encoding: aes128gcm\0";
const NONCE_INFO: &str = "Content-Encoding: nonce\0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The endpoint no longer exists or its keys are unusable.
    Gone(String),
    /// Worth retrying on a later send.
    Transient(String),
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn deliver(&self, subscription: &PushSubscription, payload: &PushPayload)
        -> DeliveryOutcome;
}

// ============================================================================
// VAPID Keys
// ============================================================================

#[derive(Clone)]
pub struct VapidKeys {
    public_key_b64: String,
    private_key_raw: [u8; 32],
    subject: String,
}

impl fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key_b64)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    /// `None` when push is not configured.
    pub fn from_config(config: &PushConfig) -> AppResult<Option<Self>> {
        let (public, private) = match (&config.vapid_public_key, &config.vapid_private_key) {
            (Some(public), Some(private)) => (public, private),
            _ => return Ok(None),
        };
        Self::new(public, private, &config.vapid_subject).map(Some)
    }

    pub fn new(public_key_b64: &str, private_key_b64: &str, subject: &str) -> AppResult<Self> {
        let public_raw = decode_b64url(public_key_b64)
            .map_err(|e| AppError::Config(format!("Invalid VAPID_PUBLIC_KEY: {}", e)))?;
        if public_raw.len() != PUBLIC_KEY_LEN {
            return Err(AppError::Config(format!(
                "VAPID_PUBLIC_KEY must decode to {} bytes",
                PUBLIC_KEY_LEN
            )));
        }

        let private_raw: [u8; 32] = decode_b64url(private_key_b64)
            .map_err(|e| AppError::Config(format!("Invalid VAPID_PRIVATE_KEY: {}", e)))?
            .try_into()
            .map_err(|_| AppError::Config("VAPID_PRIVATE_KEY must decode to 32 bytes".into()))?;

        Ok(Self {
            public_key_b64: public_key_b64.trim().to_string(),
            private_key_raw: private_raw,
            subject: subject.to_string(),
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key_b64
    }
}

// ============================================================================
// Web Push Gateway
// ============================================================================

#[derive(Debug, Clone)]
struct CachedVapidJwt {
    jwt: String,
    exp_unix: i64,
}

pub struct WebPushGateway {
    client: reqwest::Client,
    keys: VapidKeys,
    ttl_seconds: u32,
    jwt_cache: RwLock<HashMap<String, CachedVapidJwt>>,
}

struct PreparedPush {
    body: Vec<u8>,
    salt_b64: String,
    crypto_key: String,
    authorization: String,
}

impl WebPushGateway {
    pub fn new(keys: VapidKeys, ttl_seconds: u32) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            keys,
            ttl_seconds,
            jwt_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn public_key(&self) -> &str {
        self.keys.public_key()
    }

    async fn vapid_jwt(&self, aud: &str) -> Result<String, String> {
        let now = Utc::now().timestamp();
        if let Some(entry) = self.jwt_cache.read().await.get(aud) {
            if entry.exp_unix - VAPID_JWT_SKEW_SECS > now {
                return Ok(entry.jwt.clone());
            }
        }

        let (jwt, exp_unix) = build_vapid_jwt_with_exp(
            aud,
            &self.keys.subject,
            &self.keys.private_key_raw,
            VAPID_JWT_EXP_SECS,
        )?;
        self.jwt_cache.write().await.insert(
            aud.to_string(),
            CachedVapidJwt {
                jwt: jwt.clone(),
                exp_unix,
            },
        );
        Ok(jwt)
    }

    async fn prepare(
        &self,
        sub: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<PreparedPush, DeliveryOutcome> {
        let client_pub: [u8; PUBLIC_KEY_LEN] = decode_b64url(&sub.p256dh)
            .ok()
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| DeliveryOutcome::Gone("invalid p256dh key".to_string()))?;
        let client_auth: [u8; AUTH_SECRET_LEN] = decode_b64url(&sub.auth)
            .ok()
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| DeliveryOutcome::Gone("invalid auth secret".to_string()))?;

        let aud = push_service_audience(&sub.endpoint).map_err(DeliveryOutcome::Gone)?;
        let jwt = self
            .vapid_jwt(&aud)
            .await
            .map_err(DeliveryOutcome::Transient)?;

        let plaintext = payload
            .to_bytes_capped(MAX_PAYLOAD_BYTES)
            .map_err(|e| DeliveryOutcome::Transient(format!("payload serialization: {}", e)))?;

        let encrypted = encrypt_aes128gcm(&plaintext, &client_pub, &client_auth);
        let (body, salt_b64, dh_b64) = match encrypted {
            Ok(parts) => parts,
            Err(e) if e == INVALID_REMOTE_KEY => return Err(DeliveryOutcome::Gone(e)),
            Err(e) => return Err(DeliveryOutcome::Transient(e)),
        };

        Ok(PreparedPush {
            body,
            salt_b64,
            crypto_key: format!("dh={}; p256ecdsa={}", dh_b64, self.keys.public_key_b64),
            authorization: format!("vapid t={}, k={}", jwt, self.keys.public_key_b64),
        })
    }

    async fn post(
        &self,
        endpoint: &str,
        prepared: &PreparedPush,
        urgency: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(endpoint)
            .header("TTL", self.ttl_seconds.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Encryption", format!("salt={}", prepared.salt_b64))
            .header("Crypto-Key", prepared.crypto_key.as_str())
            .header("Authorization", prepared.authorization.as_str())
            .header("Urgency", urgency)
            .body(prepared.body.clone())
            .send()
            .await
    }
}

#[async_trait]
impl PushGateway for WebPushGateway {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> DeliveryOutcome {
        let prepared = match self.prepare(subscription, payload).await {
            Ok(prepared) => prepared,
            Err(outcome) => return outcome,
        };
        let urgency = payload.urgency.as_str();

        let mut response = match self.post(&subscription.endpoint, &prepared, urgency).await {
            Ok(response) => response,
            Err(e) => return DeliveryOutcome::Transient(format!("request failed: {}", e)),
        };

        if response.status().as_u16() == 429 {
            if let Some(delay) = retry_after_delay(response.headers()) {
                if delay <= MAX_RETRY_AFTER {
                    tokio::time::sleep(delay).await;
                    response = match self.post(&subscription.endpoint, &prepared, urgency).await {
                        Ok(response) => response,
                        Err(e) => {
                            return DeliveryOutcome::Transient(format!("request failed: {}", e))
                        }
                    };
                }
            }
        }

        let status = response.status();
        if status.is_success() {
            return DeliveryOutcome::Delivered;
        }
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return DeliveryOutcome::Gone(format!("status {}", status));
        }

        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        DeliveryOutcome::Transient(format!(
            "status {} body {}",
            status,
            truncate_string(&body_text, 500)
        ))
    }
}

// ============================================================================
// Protocol helpers
// ============================================================================

const INVALID_REMOTE_KEY: &str = "invalid remote public key";

fn push_service_audience(endpoint: &str) -> Result<String, String> {
    let url = Url::parse(endpoint).map_err(|e| format!("invalid push endpoint URL: {}", e))?;
    let host = url
        .host()
        .ok_or_else(|| "push endpoint missing host".to_string())?;

    let host = match host {
        url::Host::Domain(d) => d.to_string(),
        url::Host::Ipv4(ip) => ip.to_string(),
        url::Host::Ipv6(ip) => format!("[{}]", ip),
    };

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Only the delta-seconds form of `Retry-After` is honoured.
fn retry_after_delay(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("Retry-After")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

fn decode_b64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(input.trim().as_bytes())
}

fn encode_b64url(input: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}

fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, String> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| "HKDF expand failed".to_string())?;
    Ok(okm)
}

fn generate_iv_for_record(nonce: &[u8; 12], counter: u64) -> [u8; 12] {
    let mut iv = *nonce;
    let mut mask = [0u8; 8];
    mask.copy_from_slice(&nonce[4..]);
    let seq = u64::from_be_bytes(mask) ^ counter;
    iv[4..].copy_from_slice(&seq.to_be_bytes());
    iv
}

/// Single-record aes128gcm body: `salt | rs | idlen | keyid | ciphertext`.
/// Returns the body with the base64url salt and sender public key.
fn encrypt_aes128gcm(
    plaintext: &[u8],
    remote_public_key_raw: &[u8; PUBLIC_KEY_LEN],
    auth_secret: &[u8; AUTH_SECRET_LEN],
) -> Result<(Vec<u8>, String, String), String> {
    if plaintext.is_empty() {
        return Err("push payload cannot be empty".to_string());
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let remote_pub = p256::PublicKey::from_sec1_bytes(remote_public_key_raw)
        .map_err(|_| INVALID_REMOTE_KEY.to_string())?;

    let local_secret = EphemeralSecret::random(&mut OsRng);
    let local_pub_point = p256::PublicKey::from(&local_secret).to_encoded_point(false);
    let local_pub_raw: [u8; PUBLIC_KEY_LEN] = local_pub_point
        .as_bytes()
        .try_into()
        .map_err(|_| "invalid local public key length".to_string())?;

    let shared_secret = local_secret.diffie_hellman(&remote_pub);

    let mut ikm_info = Vec::with_capacity(IKM_INFO_PREFIX.len() + PUBLIC_KEY_LEN * 2);
    ikm_info.extend_from_slice(IKM_INFO_PREFIX.as_bytes());
    ikm_info.extend_from_slice(remote_public_key_raw);
    ikm_info.extend_from_slice(&local_pub_raw);

    let ikm = hkdf_sha256(
        auth_secret,
        shared_secret.raw_secret_bytes().as_slice(),
        &ikm_info,
        32,
    )?;
    let cek = hkdf_sha256(&salt, &ikm, KEY_INFO.as_bytes(), 16)?;
    let nonce: [u8; 12] = hkdf_sha256(&salt, &ikm, NONCE_INFO.as_bytes(), 12)?
        .try_into()
        .map_err(|_| "invalid nonce length".to_string())?;

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|_| "invalid CEK length".to_string())?;
    let iv = generate_iv_for_record(&nonce, 0);

    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    // last-record delimiter
    padded.push(2);

    let ciphertext = cipher
        .encrypt((&iv).into(), padded.as_slice())
        .map_err(|_| "AES-GCM encryption failed".to_string())?;

    let mut body = Vec::with_capacity(SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&DEFAULT_RS.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(&local_pub_raw);
    body.extend_from_slice(&ciphertext);

    Ok((body, encode_b64url(&salt), encode_b64url(&local_pub_raw)))
}

fn build_vapid_jwt_with_exp(
    aud: &str,
    subject: &str,
    private_key_raw: &[u8; 32],
    exp_secs: i64,
) -> Result<(String, i64), String> {
    #[derive(Serialize)]
    struct Claims<'a> {
        aud: &'a str,
        exp: i64,
        sub: &'a str,
    }

    let header = serde_json::json!({ "typ": "JWT", "alg": "ES256" });
    let exp_unix = (Utc::now() + chrono::Duration::seconds(exp_secs)).timestamp();
    let claims = Claims {
        aud,
        exp: exp_unix,
        sub: subject,
    };

    let header_json =
        serde_json::to_vec(&header).map_err(|e| format!("JWT header serialization: {}", e))?;
    let claims_json =
        serde_json::to_vec(&claims).map_err(|e| format!("JWT claims serialization: {}", e))?;
    let signing_input = format!(
        "{}.{}",
        encode_b64url(&header_json),
        encode_b64url(&claims_json)
    );

    let signing_key = SigningKey::from_bytes(private_key_raw.into())
        .map_err(|_| "invalid VAPID private key".to_string())?;
    let sig: p256::ecdsa::Signature = signing_key.sign(signing_input.as_bytes());

    Ok((
        format!("{}.{}", signing_input, encode_b64url(&sig.to_bytes())),
        exp_unix,
    ))
}
