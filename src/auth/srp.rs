//! Secure Remote Password login
//!
//! Client side of the Cognito `USER_SRP_AUTH` flow: the SRP-6a public value
//! sent as `SRP_A` with `InitiateAuth`, and the claim answering the
//! `PASSWORD_VERIFIER` challenge. Uses the 3072-bit group of RFC 5054 with
//! SHA-256 and Cognito's HKDF key derivation.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use num_traits::Zero;
use rand::RngCore;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::AuthError;

/// Safe prime of the 3072-bit group
const N_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA0510",
    "15728E5A8AAAC42DAD33170D04507A33A85521ABDF1CBA64",
    "ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7",
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6B",
    "F12FFA06D98A0864D87602733EC86A64521F2B18177B200C",
    "BBE117577A615D6C770988C0BAD946E208E24FA074E5AB31",
    "43DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
);

const G_HEX: &str = "2";

/// HKDF info: the label followed by the block counter
const DERIVED_KEY_INFO: &[u8] = b"Caldera Derived Key\x01";

const DERIVED_KEY_LEN: usize = 16;

const PRIVATE_VALUE_BYTES: usize = 128;

type HmacSha256 = Hmac<Sha256>;

/// Parameters of a `PASSWORD_VERIFIER` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordVerifier {
    /// Internal user id the claim is made for
    pub user_id: String,
    /// Hex salt of the password verifier
    pub salt: String,
    /// Hex server public value
    pub srp_b: String,
    /// Opaque base64 block echoed back to the server
    pub secret_block: String,
}

impl PasswordVerifier {
    /// Reads the challenge from `ChallengeParameters`
    pub fn from_parameters(parameters: &Value) -> Result<Self, AuthError> {
        let field = |name: &str| {
            parameters
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| unavailable(format!("challenge is missing {}", name)))
        };

        Ok(Self {
            user_id: field("USER_ID_FOR_SRP")?,
            salt: field("SALT")?,
            srp_b: field("SRP_B")?,
            secret_block: field("SECRET_BLOCK")?,
        })
    }
}

/// Client half of one SRP exchange
pub struct SrpClient {
    pool_name: String,
    n: BigUint,
    g: BigUint,
    k: BigUint,
    small_a: BigUint,
    large_a: BigUint,
}

impl std::fmt::Debug for SrpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpClient")
            .field("pool_name", &self.pool_name)
            .finish_non_exhaustive()
    }
}

impl SrpClient {
    /// Starts an exchange with a random private value
    pub fn new(user_pool_id: &str) -> Result<Self, AuthError> {
        let mut bytes = [0u8; PRIVATE_VALUE_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self::with_private_value(user_pool_id, BigUint::from_bytes_be(&bytes))
    }

    /// Starts an exchange with a known private value
    pub fn with_private_value(user_pool_id: &str, private_value: BigUint) -> Result<Self, AuthError> {
        let n = parse_hex(N_HEX)?;
        let g = parse_hex(G_HEX)?;
        let k = parse_hex(&hex_hash(&format!("00{}0{}", N_HEX, G_HEX))?)?;

        let small_a = private_value % &n;
        let large_a = g.modpow(&small_a, &n);
        if large_a.is_zero() {
            return Err(unavailable("SRP public value is zero"));
        }

        // "eu-west-1_abc" -> "abc"
        let pool_name = user_pool_id
            .split_once('_')
            .map_or(user_pool_id, |(_, name)| name)
            .to_string();

        Ok(Self {
            pool_name,
            n,
            g,
            k,
            small_a,
            large_a,
        })
    }

    /// Public value sent as `SRP_A`, lower-case hex
    pub fn srp_a(&self) -> String {
        self.large_a.to_str_radix(16)
    }

    /// Builds the `ChallengeResponses` answering a `PASSWORD_VERIFIER` challenge
    pub fn password_claim(
        &self,
        challenge: &PasswordVerifier,
        password: &str,
        at: DateTime<Utc>,
    ) -> Result<Value, AuthError> {
        let key = self.authentication_key(challenge, password)?;
        let timestamp = claim_timestamp(at);
        let secret_block = STANDARD
            .decode(&challenge.secret_block)
            .map_err(|e| unavailable(format!("invalid secret block: {}", e)))?;

        let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC can take key of any size");
        mac.update(self.pool_name.as_bytes());
        mac.update(challenge.user_id.as_bytes());
        mac.update(&secret_block);
        mac.update(timestamp.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(json!({
            "TIMESTAMP": timestamp,
            "USERNAME": challenge.user_id,
            "PASSWORD_CLAIM_SECRET_BLOCK": challenge.secret_block,
            "PASSWORD_CLAIM_SIGNATURE": signature,
        }))
    }

    /// Derives the key shared with the server
    fn authentication_key(&self, challenge: &PasswordVerifier, password: &str) -> Result<Vec<u8>, AuthError> {
        let large_b = parse_hex(&challenge.srp_b)?;
        if (&large_b % &self.n).is_zero() {
            return Err(unavailable("server sent an invalid SRP_B"));
        }

        let u = parse_hex(&hex_hash(&format!("{}{}", pad_hex(&self.large_a), pad_hex(&large_b)))?)?;
        if u.is_zero() {
            return Err(unavailable("SRP scrambling parameter is zero"));
        }

        let identity = hex::encode(Sha256::digest(
            format!("{}{}:{}", self.pool_name, challenge.user_id, password).as_bytes(),
        ));
        let x = parse_hex(&hex_hash(&format!("{}{}", pad_hex_str(&challenge.salt), identity))?)?;

        // (B - k * g^x) mod N, kept non-negative
        let k_g_x = (&self.k * self.g.modpow(&x, &self.n)) % &self.n;
        let base = ((large_b % &self.n) + &self.n - k_g_x) % &self.n;
        let s = base.modpow(&(&self.small_a + &u * &x), &self.n);

        Ok(derive_key(&decode_hex(&pad_hex(&s))?, &decode_hex(&pad_hex(&u))?))
    }
}

/// Claim timestamp, e.g. `Sat Mar 1 08:05:09 UTC 2025` (day not zero-padded)
pub fn claim_timestamp(at: DateTime<Utc>) -> String {
    at.format("%a %b %-d %H:%M:%S UTC %Y").to_string()
}

fn derive_key(ikm: &[u8], salt: &[u8]) -> Vec<u8> {
    let mut extract = HmacSha256::new_from_slice(salt).expect("HMAC can take key of any size");
    extract.update(ikm);
    let prk = extract.finalize().into_bytes();

    let mut expand = HmacSha256::new_from_slice(&prk).expect("HMAC can take key of any size");
    expand.update(DERIVED_KEY_INFO);
    expand.finalize().into_bytes()[..DERIVED_KEY_LEN].to_vec()
}

/// Hex SHA-256 of the bytes encoded by `hex`
fn hex_hash(hex: &str) -> Result<String, AuthError> {
    Ok(hex::encode(Sha256::digest(decode_hex(hex)?)))
}

fn pad_hex(value: &BigUint) -> String {
    pad_hex_str(&value.to_str_radix(16))
}

/// Pads to whole bytes and keeps the value positive when read as two's complement
fn pad_hex_str(hex: &str) -> String {
    if hex.len() % 2 == 1 {
        format!("0{}", hex)
    } else if hex.starts_with(|c: char| "89abcdefABCDEF".contains(c)) {
        format!("00{}", hex)
    } else {
        hex.to_string()
    }
}

fn parse_hex(hex: &str) -> Result<BigUint, AuthError> {
    BigUint::parse_bytes(hex.as_bytes(), 16).ok_or_else(|| unavailable(format!("invalid hex value '{}'", hex)))
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, AuthError> {
    hex::decode(hex).map_err(|e| unavailable(format!("invalid hex value: {}", e)))
}

fn unavailable(reason: impl Into<String>) -> AuthError {
    AuthError::AuthenticationUnavailable(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const POOL_ID: &str = "eu-west-1_dViSsKM5Y";

    const PRIVATE_A: &str = concat!(
        "2b2578cda8a35e3f49ea9eceffc761f78b4e82f5cf896426a72f1d09dca8ba30",
        "c030df275d0fbb84b1fa7545cc8318c0a127faf6d1c1f043b8ee2894e953eb46",
    );

    const PRIVATE_B: &str = "69b65180a7cf1bc9285d76f1a32ba0ca067915522695a8230f14004cf110a3ed";

    fn client() -> SrpClient {
        SrpClient::with_private_value(POOL_ID, parse_hex(PRIVATE_A).unwrap()).unwrap()
    }

    fn challenge(client: &SrpClient) -> PasswordVerifier {
        let b = parse_hex(PRIVATE_B).unwrap();
        PasswordVerifier {
            user_id: "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0".to_string(),
            salt: "1a2b3c4d5e6f7a8b".to_string(),
            srp_b: client.g.modpow(&b, &client.n).to_str_radix(16),
            secret_block: "b3BhcXVlLXNlY3JldC1ibG9jaw==".to_string(),
        }
    }

    #[test]
    fn test_group_multiplier() {
        assert_eq!(
            client().k.to_str_radix(16),
            "538282c4354742d7cbbde2359fcf67f9f5b3a6b08791e5011b43b8a5b66d9ee6"
        );
    }

    #[test]
    fn test_srp_a_is_g_to_the_private_value() {
        let client = SrpClient::with_private_value(POOL_ID, BigUint::from(16u32)).unwrap();

        assert_eq!(client.srp_a(), "10000");
        assert_eq!(client.pool_name, "dViSsKM5Y");
    }

    #[test]
    fn test_srp_a_of_fixed_private_value() {
        let srp_a = client().srp_a();

        assert_eq!(srp_a.len(), 768);
        assert!(srp_a.starts_with("d94c85d9af0d1b30"));
        assert_eq!(
            hex::encode(Sha256::digest(srp_a.as_bytes())),
            "f751ed9e08cacc547afe98e54cd3d7ba880067cc28d6da96b574fa3dd35176a8"
        );
    }

    #[test]
    fn test_authentication_key_vector() {
        let client = client();
        let challenge = challenge(&client);

        let key = client.authentication_key(&challenge, "secret").unwrap();

        assert_eq!(hex::encode(key), "9f9aea274e8aff72fe9a1030deff22af");
    }

    #[test]
    fn test_password_claim_vector() {
        let client = client();
        let challenge = challenge(&client);
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 5, 9).unwrap();

        let claim = client.password_claim(&challenge, "secret", at).unwrap();

        assert_eq!(claim["TIMESTAMP"], "Sat Mar 1 08:05:09 UTC 2025");
        assert_eq!(claim["USERNAME"], "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0");
        assert_eq!(claim["PASSWORD_CLAIM_SECRET_BLOCK"], "b3BhcXVlLXNlY3JldC1ibG9jaw==");
        assert_eq!(
            claim["PASSWORD_CLAIM_SIGNATURE"],
            "TUNQHYtImVd0/GetC4HTEkHPtHmQ3ow9R9Y6bPZDO4M="
        );
    }

    #[test]
    fn test_wrong_password_changes_signature() {
        let client = client();
        let challenge = challenge(&client);
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 5, 9).unwrap();

        let right = client.password_claim(&challenge, "secret", at).unwrap();
        let wrong = client.password_claim(&challenge, "Secret", at).unwrap();

        assert_ne!(right["PASSWORD_CLAIM_SIGNATURE"], wrong["PASSWORD_CLAIM_SIGNATURE"]);
    }

    #[test]
    fn test_rejects_server_value_divisible_by_n() {
        let client = client();
        let mut challenge = challenge(&client);
        challenge.srp_b = N_HEX.to_string();

        assert!(matches!(
            client.authentication_key(&challenge, "secret"),
            Err(AuthError::AuthenticationUnavailable(_))
        ));
    }

    #[test]
    fn test_claim_timestamp_day_is_not_padded() {
        let single = Utc.with_ymd_and_hms(2025, 3, 1, 8, 5, 9).unwrap();
        let double = Utc.with_ymd_and_hms(2025, 3, 14, 23, 0, 0).unwrap();

        assert_eq!(claim_timestamp(single), "Sat Mar 1 08:05:09 UTC 2025");
        assert_eq!(claim_timestamp(double), "Fri Mar 14 23:00:00 UTC 2025");
    }

    #[test]
    fn test_pad_hex() {
        assert_eq!(pad_hex_str("abc"), "0abc");
        assert_eq!(pad_hex_str("7f"), "7f");
        assert_eq!(pad_hex_str("80"), "0080");
        assert_eq!(pad_hex_str("F0"), "00F0");
    }

    #[test]
    fn test_challenge_parameters() {
        let parameters = json!({
            "USER_ID_FOR_SRP": "user-1",
            "SALT": "abcd",
            "SRP_B": "1234",
            "SECRET_BLOCK": "c2VjcmV0",
            "USERNAME": "user-1"
        });

        let challenge = PasswordVerifier::from_parameters(&parameters).unwrap();
        assert_eq!(challenge.user_id, "user-1");
        assert_eq!(challenge.srp_b, "1234");

        let incomplete = json!({ "USER_ID_FOR_SRP": "user-1" });
        assert!(PasswordVerifier::from_parameters(&incomplete).is_err());
    }
}
