//! Argument quoting, key redaction, credential validation and date formatting
//!
//! Everything that touches the agent command line as text lives here so that
//! the debug line logged before a launch and the output logged after a
//! failed launch go through the same redaction routine.

use chrono::{DateTime, TimeZone};
use uuid::{Uuid, Variant};

/// Flag that precedes the credential on the agent command line
pub const KEY_FLAG: &str = "--key";

/// Mask applied to redacted credentials, followed by their last four characters
const KEY_MASK: &str = "XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXX";

/// Wrap a token in double quotes, escaping embedded quotes, when it contains a space.
///
/// Tokens without a space are returned unchanged.
pub fn quote(token: &str) -> String {
    if token.contains(' ') {
        format!("\"{}\"", token.replace('"', "\\\""))
    } else {
        token.to_string()
    }
}

/// Mask a credential, keeping only its final four characters.
///
/// Credentials of four characters or fewer are returned as-is.
pub fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        return key.to_string();
    }
    let tail: String = key.chars().skip(len - 4).collect();
    format!("{}{}", KEY_MASK, tail)
}

/// Mask every token that directly follows `--key` in a space separated string.
///
/// Used on anything the agent might echo back, so stdout, stderr and
/// launch errors are all scanned the same way.
pub fn redact_key(text: &str) -> String {
    let mut parts: Vec<String> = text.split(' ').map(str::to_string).collect();
    for index in 1..parts.len() {
        if parts[index - 1] == KEY_FLAG {
            parts[index] = mask_key(&parts[index]);
        }
    }
    parts.join(" ")
}

/// Render the full command line for the debug log, binary first, key masked.
pub fn format_command_line(binary: &str, args: &[String]) -> String {
    let mut out = Vec::with_capacity(args.len() + 1);
    out.push(quote(binary));

    let mut previous = binary;
    for arg in args {
        if previous == KEY_FLAG {
            out.push(mask_key(arg));
        } else {
            out.push(arg.clone());
        }
        previous = arg;
    }
    out.join(" ")
}

/// Check that a credential has the canonical version-4 UUID shape.
///
/// Only the 36 character hyphenated form is accepted, in either case.
pub fn valid_api_key(key: &str) -> bool {
    if key.len() != 36 {
        return false;
    }
    match Uuid::try_parse(key) {
        Ok(uuid) => uuid.get_version_num() == 4 && uuid.get_variant() == Variant::RFC4122,
        Err(_) => false,
    }
}

/// Format a timestamp like `Jan 5, 2024 3:07 PM`
pub fn format_local_date<Tz>(date: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    date.format("%b %-d, %Y %-I:%M %p").to_string()
}
