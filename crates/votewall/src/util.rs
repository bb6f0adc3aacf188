use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use rocket::{
    request::{self, FromRequest},
    Request,
};
use uuid::Uuid;

/// Generate a new public identifier.
pub fn gen_uuid() -> Uuid {
    Uuid::now_v7()
}

pub fn short_random(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

pub fn is_valid_email(string: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?m)^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .unwrap()
    });
    RE.is_match(string)
}

pub fn is_valid_phone(string: &str) -> bool {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{5,19}$").unwrap());
    RE.is_match(string)
}

/// Contact details are free-form but must at least look like an email
/// address or a phone number.
pub fn is_valid_contact(string: &str) -> bool {
    is_valid_email(string) || is_valid_phone(string)
}

/// The requesting browser's User-Agent header, recorded alongside votes.
pub struct UserAgent(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserAgent {
    type Error = std::convert::Infallible;

    async fn from_request(
        request: &'r Request<'_>,
    ) -> request::Outcome<Self, Self::Error> {
        request::Outcome::Success(UserAgent(
            request
                .headers()
                .get_one("User-Agent")
                .unwrap_or("")
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod test_contact_validation {
    use crate::util::is_valid_contact;

    #[test]
    fn test_accepts_simple_email() {
        assert!(is_valid_contact("captain@example.com"))
    }

    #[test]
    fn test_accepts_phone_number() {
        assert!(is_valid_contact("+44 7700 900123"))
    }

    #[test]
    fn test_rejects_free_text() {
        assert!(!is_valid_contact("ask at the front desk"))
    }
}
