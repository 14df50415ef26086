//! Email address type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// The input string is empty.
    #[error("email cannot be empty")]
    Empty,
    /// The address is too long.
    #[error("email must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// A closing `>` without an opening `<`.
    #[error("email has an unbalanced angle bracket")]
    UnbalancedAngleBracket,
    /// The text before `<...>` is not a valid display name.
    #[error("email display name is invalid")]
    InvalidDisplayName,
    /// The address does not contain an @ symbol.
    #[error("email must contain an @ symbol")]
    MissingAtSymbol,
    /// The local part (before @) is empty.
    #[error("email local part cannot be empty")]
    EmptyLocalPart,
    /// The local part is neither a dot-atom nor a quoted string.
    #[error("email local part is invalid")]
    InvalidLocalPart,
    /// The domain part (after @) is empty.
    #[error("email domain cannot be empty")]
    EmptyDomain,
    /// A domain label is empty, too long, or not letters, digits and inner
    /// hyphens.
    #[error("email domain is invalid")]
    InvalidDomain,
}

/// An email address as carried in `delivery.email`.
///
/// Accepts a single RFC 5322 mailbox: a bare `local@domain`, `<local@domain>`,
/// or `Display Name <local@domain>`. Only the address is kept.
///
/// ## Constraints
///
/// - Address length: 1-254 characters (RFC 5321 limit)
/// - Local part: a dot-atom of RFC 5322 `atext`, or a quoted string
/// - Domain: dot-separated labels of 1-63 letters, digits and hyphens, not
///   starting or ending with a hyphen
/// - Display name: words of `atext` and `.`, or quoted strings
///
/// ## Examples
///
/// ```
/// use orderflow_core::Email;
///
/// assert!(Email::parse("test@gmail.com").is_ok());
/// assert!(Email::parse("ops@localhost").is_ok());
/// assert_eq!(
///     Email::parse("Test Testov <test@gmail.com>").unwrap().as_str(),
///     "test@gmail.com"
/// );
///
/// assert!(Email::parse("").is_err());
/// assert!(Email::parse("no-at-symbol").is_err());
/// assert!(Email::parse("a@b@c.com").is_err());
/// assert!(Email::parse("user@example..com").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Maximum length of one domain label (RFC 1035).
    const MAX_LABEL_LENGTH: usize = 63;

    /// Parse an `Email` from a mailbox string.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns the first [`EmailError`] constraint the input violates.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmailError::Empty);
        }

        let addr = addr_spec_of(s)?;
        if addr.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        let (local, domain) = addr.rsplit_once('@').ok_or(EmailError::MissingAtSymbol)?;
        check_local_part(local)?;
        check_domain(domain)?;

        Ok(Self(addr.to_owned()))
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the domain part of the email (after the @).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

/// Strip an optional `Display Name <...>` wrapper.
fn addr_spec_of(mailbox: &str) -> Result<&str, EmailError> {
    let Some(inner) = mailbox.strip_suffix('>') else {
        return Ok(mailbox);
    };

    let (name, addr) = inner
        .rsplit_once('<')
        .ok_or(EmailError::UnbalancedAngleBracket)?;
    if !is_phrase(name) {
        return Err(EmailError::InvalidDisplayName);
    }
    Ok(addr)
}

/// RFC 5322 `atext`.
const fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_'
                | '`' | '{' | '|' | '}' | '~'
        )
}

/// Byte length of a quoted string's body and closing quote, given the text
/// after the opening quote. `None` if it is unterminated or holds a control
/// character.
fn quoted_len(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if c.is_control() && c != '\t' {
            return None;
        }
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some(i + 1);
        }
    }
    None
}

/// Display name: whitespace-separated words, each an atom (dots and
/// non-ASCII letters allowed) or a quoted string. May be empty.
fn is_phrase(s: &str) -> bool {
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            let Some(len) = quoted_len(quoted) else {
                return false;
            };
            rest = quoted.get(len..).unwrap_or_default();
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '"')
                .unwrap_or(rest.len());
            let (word, tail) = rest.split_at(end);
            let valid = word
                .chars()
                .all(|c| is_atext(c) || c == '.' || (!c.is_ascii() && !c.is_control()));
            if !valid {
                return false;
            }
            rest = tail;
        }
        rest = rest.trim_start();
    }
    true
}

fn check_local_part(local: &str) -> Result<(), EmailError> {
    if local.is_empty() {
        return Err(EmailError::EmptyLocalPart);
    }

    let valid = match local.strip_prefix('"') {
        Some(quoted) => quoted_len(quoted) == Some(quoted.len()),
        None => local
            .split('.')
            .all(|atom| !atom.is_empty() && atom.chars().all(is_atext)),
    };

    if valid {
        Ok(())
    } else {
        Err(EmailError::InvalidLocalPart)
    }
}

fn check_domain(domain: &str) -> Result<(), EmailError> {
    if domain.is_empty() {
        return Err(EmailError::EmptyDomain);
    }

    let valid = domain.split('.').all(|label| {
        (1..=Email::MAX_LABEL_LENGTH).contains(&label.len())
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    if valid {
        Ok(())
    } else {
        Err(EmailError::InvalidDomain)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
