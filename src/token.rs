use std::{fmt, sync::Arc};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SECRET_LENGTH: usize = 32;

/// How long an issued token stays valid, in minutes.
pub const TOKEN_LIFETIME_MINUTES: i64 = 5;

/// The key tokens are signed with.
///
/// It lives only as long as the process: it is generated at startup, never
/// persisted or rotated, so a restart invalidates every outstanding token.
pub struct Secret([u8; SECRET_LENGTH]);

impl Secret {
	pub fn generate() -> Self {
		let mut bytes = [0; SECRET_LENGTH];
		rand::rngs::OsRng.fill_bytes(&mut bytes);

		Self(bytes)
	}

	#[cfg(test)]
	pub fn from_bytes(bytes: [u8; SECRET_LENGTH]) -> Self {
		Self(bytes)
	}
}

impl fmt::Debug for Secret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Secret(..)")
	}
}

/// Why a token does not authorize a request.
///
/// These are only logged, clients see a single generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Unauthorized {
	#[error("token has expired")]
	Expired,
	#[error("token is malformed or its signature does not match")]
	Tampered,
	#[error("token is bound to a different path")]
	PathMismatch,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
	path: String,
	/// Milliseconds since the Unix epoch.
	iat: i64,
	/// Milliseconds since the Unix epoch.
	exp: i64,
}

/// A signed capability for reading exactly one resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityToken {
	pub subject_path: String,
	pub issued_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
	encoded: String,
}

impl CapabilityToken {
	/// The opaque string handed to clients.
	pub fn as_str(&self) -> &str {
		&self.encoded
	}
}

impl fmt::Display for CapabilityToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.encoded)
	}
}

/// Issues and verifies capability tokens.
///
/// A token is `payload.signature`, both base64url without padding, where the
/// payload is the JSON claims (`path`, `iat`, `exp`) and the signature is the
/// HMAC-SHA256 of the encoded payload. Verification needs nothing but the
/// secret, so no token can be revoked before it expires.
#[derive(Debug, Clone)]
pub struct TokenService {
	secret: Arc<Secret>,
	lifetime: Duration,
}

impl TokenService {
	pub fn new(secret: Secret) -> Self {
		Self {
			secret: Arc::new(secret),
			lifetime: Duration::minutes(TOKEN_LIFETIME_MINUTES),
		}
	}

	/// Issues a token for `path`. The caller must have checked that the path exists.
	pub fn issue(&self, path: &str) -> CapabilityToken {
		self.issue_at(path, Utc::now())
	}

	pub fn issue_at(&self, path: &str, now: DateTime<Utc>) -> CapabilityToken {
		let expires_at = now + self.lifetime;
		let claims = Claims {
			path: path.to_owned(),
			iat: now.timestamp_millis(),
			exp: expires_at.timestamp_millis(),
		};

		// serializing a struct of strings and integers cannot fail
		let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
		let signature = URL_SAFE_NO_PAD.encode(self.mac(payload.as_bytes()).finalize().into_bytes());

		CapabilityToken {
			subject_path: claims.path,
			issued_at: now,
			expires_at,
			encoded: format!("{payload}.{signature}"),
		}
	}

	/// Checks that `token` is authentic, unexpired and bound to exactly `expected_path`.
	pub fn verify(&self, token: &str, expected_path: &str) -> Result<(), Unauthorized> {
		self.verify_at(token, expected_path, Utc::now())
	}

	pub fn verify_at(
		&self,
		token: &str,
		expected_path: &str,
		now: DateTime<Utc>,
	) -> Result<(), Unauthorized> {
		let (payload, signature) = token.split_once('.').ok_or(Unauthorized::Tampered)?;
		let signature = URL_SAFE_NO_PAD
			.decode(signature)
			.map_err(|_| Unauthorized::Tampered)?;

		self.mac(payload.as_bytes())
			.verify_slice(&signature)
			.map_err(|_| Unauthorized::Tampered)?;

		let claims = URL_SAFE_NO_PAD
			.decode(payload)
			.ok()
			.and_then(|bytes| serde_json::from_slice::<Claims>(&bytes).ok())
			.ok_or(Unauthorized::Tampered)?;

		if now.timestamp_millis() > claims.exp {
			return Err(Unauthorized::Expired);
		}

		if claims.path != expected_path {
			return Err(Unauthorized::PathMismatch);
		}

		Ok(())
	}

	fn mac(&self, payload: &[u8]) -> HmacSha256 {
		// HMAC accepts keys of any length
		let mut mac = HmacSha256::new_from_slice(&self.secret.0)
			.unwrap_or_else(|_| unreachable!("HMAC keys have no length limit"));
		mac.update(payload);
		mac
	}
}

#[cfg(test)]
mod test {
	use super::*;

	const PATH: &str = "images/photo.jpg";

	fn service() -> TokenService {
		TokenService::new(Secret::from_bytes([7; SECRET_LENGTH]))
	}

	#[test]
	fn test_fresh_token_is_authorized() {
		let service = service();
		let token = service.issue(PATH);

		assert_eq!(token.subject_path, PATH);
		assert_eq!(token.expires_at - token.issued_at, Duration::minutes(5));
		assert_eq!(service.verify(token.as_str(), PATH), Ok(()));
	}

	#[test]
	fn test_token_expires_after_five_minutes() {
		let service = service();
		let issued = Utc::now();
		let token = service.issue_at(PATH, issued);

		assert_eq!(
			service.verify_at(token.as_str(), PATH, issued + Duration::minutes(5)),
			Ok(())
		);
		assert_eq!(
			service.verify_at(
				token.as_str(),
				PATH,
				issued + Duration::minutes(5) + Duration::milliseconds(1)
			),
			Err(Unauthorized::Expired)
		);
	}

	#[test]
	fn test_token_is_bound_to_one_path() {
		let service = service();
		let token = service.issue(PATH);

		for other in ["images/photo.jpeg", "images/photo.jp", "images/", "./images/photo.jpg"] {
			assert_eq!(
				service.verify(token.as_str(), other),
				Err(Unauthorized::PathMismatch)
			);
		}
	}

	#[test]
	fn test_any_modified_byte_is_tampering() {
		let service = service();
		let token = service.issue(PATH).to_string();

		for index in 0..token.len() {
			let mut bytes = token.clone().into_bytes();
			bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };

			let tampered = String::from_utf8(bytes).unwrap();

			assert_eq!(
				service.verify(&tampered, PATH),
				Err(Unauthorized::Tampered),
				"byte {index} of {token}"
			);
		}
	}

	#[test]
	fn test_garbage_is_tampering() {
		let service = service();

		for token in ["", ".", "abc", "abc.def", "not.a.token"] {
			assert_eq!(service.verify(token, PATH), Err(Unauthorized::Tampered));
		}
	}

	#[test]
	fn test_other_secret_is_tampering() {
		let token = service().issue(PATH);
		let other = TokenService::new(Secret::generate());

		assert_eq!(
			other.verify(token.as_str(), PATH),
			Err(Unauthorized::Tampered)
		);
	}

	#[test]
	fn test_secret_is_not_printed() {
		assert_eq!(format!("{:?}", Secret::generate()), "Secret(..)");
	}
}
