//! Request signing for the RTM REST API.

use md5::{Digest, Md5};

/// Compute the `api_sig` for a set of request parameters.
///
/// The digest input is the shared secret followed by every parameter written
/// as `key` + `value`, ordered by key, without separators. The result is the
/// lowercase hex MD5 digest (32 characters).
pub fn api_sig<'a, I>(shared_secret: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = params.into_iter().collect();
    pairs.sort_unstable_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));

    let mut hasher = Md5::new();
    hasher.update(shared_secret.as_bytes());
    for (key, value) in pairs {
        hasher.update(key.as_bytes());
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
