//! Best-effort device identity.
//!
//! The primary identifier is computed in the browser by FingerprintJS and
//! carried in a session cookie; the voting page embeds the script that sets
//! it. When no cookie arrives (scripts disabled, or the very first request
//! of a session) the server falls back to hashing what it can observe about
//! the client directly.
//!
//! Known limitation: both fallbacks mix in a random component, so two
//! sessions from the same device can produce different identifiers. The
//! one-vote-per-device invariant then only holds as far as the store's
//! unique index can see. A vote is still never blocked by fingerprinting
//! failure alone.

use rocket::{
    request::{self, FromRequest},
    Request,
};

use crate::util::short_random;

pub const FINGERPRINT_COOKIE: &str = "device_fp";

/// Set once a vote has been recorded for this session; its value is the
/// public id of the team the session believes it voted for.
pub const VOTED_COOKIE: &str = "voted_team";

/// The resolved identity for the requesting device.
#[derive(Clone)]
pub struct DeviceFingerprint(pub String);

/// Raw material for the fallback fingerprint. Fields the server cannot
/// observe stay empty; the browser-side version of this algorithm fills
/// them all.
#[derive(Debug, Default)]
pub struct FingerprintParts<'a> {
    pub user_agent: &'a str,
    pub language: &'a str,
    pub screen: &'a str,
    pub timezone_offset: &'a str,
    pub canvas_signature: &'a str,
    pub random: &'a str,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for DeviceFingerprint {
    type Error = std::convert::Infallible;

    async fn from_request(
        request: &'r Request<'_>,
    ) -> request::Outcome<Self, Self::Error> {
        let fp = request.local_cache(|| {
            if let Some(cookie) = request.cookies().get(FINGERPRINT_COOKIE) {
                if plausible_fingerprint(cookie.value()) {
                    return DeviceFingerprint(cookie.value().to_string());
                }
            }

            let random = short_random(8);
            DeviceFingerprint(fallback_fingerprint(&FingerprintParts {
                user_agent: request
                    .headers()
                    .get_one("User-Agent")
                    .unwrap_or(""),
                language: request
                    .headers()
                    .get_one("Accept-Language")
                    .unwrap_or(""),
                random: &random,
                ..FingerprintParts::default()
            }))
        });

        request::Outcome::Success(fp.clone())
    }
}

/// Mirrors the browser fallback: join the parts, roll them into a 32-bit
/// hash and render it in base 36.
pub fn fallback_fingerprint(parts: &FingerprintParts) -> String {
    let composite = [
        parts.user_agent,
        parts.language,
        parts.screen,
        parts.timezone_offset,
        parts.canvas_signature,
        parts.random,
    ]
    .join("|");

    let mut hash: i32 = 0;
    for c in composite.chars() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(c as i32);
    }

    to_base36(u64::from(hash.unsigned_abs()))
}

fn plausible_fingerprint(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 64
        && value.chars().all(|c| c.is_ascii_alphanumeric())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();

    String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod test_fallback_fingerprint {
    use super::*;

    fn parts(random: &'static str) -> FingerprintParts<'static> {
        FingerprintParts {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)",
            language: "en-GB,en;q=0.9",
            screen: "1920x1080",
            timezone_offset: "-60",
            canvas_signature: "AAAASUVORK5CYII=",
            random,
        }
    }

    #[test]
    fn test_identical_parts_hash_identically() {
        assert_eq!(
            fallback_fingerprint(&parts("r4nd0m")),
            fallback_fingerprint(&parts("r4nd0m"))
        );
    }

    #[test]
    fn test_random_component_defeats_stability() {
        // Two sessions on the same device differ only in the random part
        // and still end up with different identities. This is the documented
        // weakness of the fallback path.
        assert_ne!(
            fallback_fingerprint(&parts("session1")),
            fallback_fingerprint(&parts("session2"))
        );
    }

    #[test]
    fn test_output_is_base36() {
        let fp = fallback_fingerprint(&parts("r4nd0m"));
        assert!(!fp.is_empty());
        assert!(fp
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_degrades_to_low_entropy_rather_than_failing() {
        // Even with nothing observable about the client, an identity is
        // still produced.
        let fp = fallback_fingerprint(&FingerprintParts::default());
        assert!(!fp.is_empty());
    }
}
