//! Secret masking for logs and error messages
//!
//! Masking is one-way: nothing here can recover the original value.

/// Placeholder used for secrets too short to partially reveal
pub const SHORT_SECRET_PLACEHOLDER: &str = "********";

const VISIBLE_CHARS: usize = 4;

/// Mask a secret as `first4****last4`
///
/// Secrets shorter than 8 characters are replaced by a fixed-length
/// placeholder so their length is not leaked either.
#[must_use]
pub fn sanitize(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < VISIBLE_CHARS * 2 {
        return SHORT_SECRET_PLACEHOLDER.to_string();
    }

    let head: String = chars[..VISIBLE_CHARS].iter().collect();
    let tail: String = chars[chars.len() - VISIBLE_CHARS..].iter().collect();
    format!("{head}****{tail}")
}

/// Replace every occurrence of `secret` in `text` with its masked form
#[must_use]
pub fn scrub(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, &sanitize(secret))
}
