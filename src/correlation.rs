//! Correlation-id generation.
//!
//! A correlation id is a short, unguessable capability token embedded in an
//! outbound notice so that a counterparty reply can be matched back to its
//! transaction without exposing the movement number. Format: two 6-character
//! alphanumeric groups joined by a hyphen, e.g. `a3XkQ9-Zp07Lm`.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

/// Length of each token group.
const GROUP_LEN: usize = 6;

/// Generate a fresh correlation id from the OS CSPRNG.
pub fn generate() -> String {
    let group = || -> String {
        OsRng
            .sample_iter(&Alphanumeric)
            .take(GROUP_LEN)
            .map(char::from)
            .collect()
    };
    format!("{}-{}", group(), group())
}

/// Regex pattern matching a correlation id embedded in free text.
///
/// Used by the webhook handler to pull the token out of an inbound reply.
pub const TOKEN_PATTERN: &str = r"\b[A-Za-z0-9]{6}-[A-Za-z0-9]{6}\b";

/// Extract the first correlation id found in `text`, if any.
pub fn extract(text: &str) -> Option<String> {
    // Compiled on demand; webhook traffic is low-volume.
    let re = regex::Regex::new(TOKEN_PATTERN).ok()?;
    re.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_matches_format() {
        let token = generate();
        assert_eq!(token.len(), 13);
        let (left, right) = token.split_once('-').expect("missing separator");
        assert_eq!(left.len(), 6);
        assert_eq!(right.len(), 6);
        assert!(left.chars().chain(right.chars()).all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn tokens_are_unique() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }

    #[test]
    fn extract_finds_embedded_token() {
        let token = generate();
        let text = format!("Hola, respondo sobre el caso {token}. Gracias.");
        assert_eq!(extract(&text).as_deref(), Some(token.as_str()));
    }

    #[test]
    fn extract_ignores_near_misses() {
        assert_eq!(extract("abc-def is too short"), None);
        assert_eq!(extract("no token here"), None);
        // Seven characters in a group must not match.
        assert_eq!(extract("abcdefg-abcdefg"), None);
    }
}
