//! Human-readable, unique identifiers for graph entities.
//!
//! Every block and every local node of a control-flow graph is named by a
//! [`LocalId`]: a base [`Name`] plus a disambiguator. Names are chosen by
//! the pass author (`"entry"`, `"loop"`, `"add"`), and a [`NameAllocator`]
//! hands out the smallest free disambiguator for each base name so that
//! repeated remove/insert cycles reuse the same identifiers deterministically.
//!
//! # Printing
//!
//! A name that is a simple identifier prints verbatim, anything else is
//! quoted. A disambiguator of zero is omitted, any other is appended after a
//! dot:
//!
//! ```
//! use cfir_names::{LocalId, Name};
//!
//! assert_eq!(LocalId::new(Name::new("loop"), 0).to_string(), "loop");
//! assert_eq!(LocalId::new(Name::new("loop"), 2).to_string(), "loop.2");
//! assert_eq!(LocalId::new(Name::new("a b"), 1).to_string(), "\"a b\".1");
//! ```

mod alloc;
mod quote;

pub use alloc::{FreeList, NameAllocator};
pub use quote::{is_simple, quote, unquote};

use std::{borrow::Borrow, fmt, str::FromStr, sync::Arc};

/// Errors produced while reading identifiers back from their printed form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unterminated quoted name `{0}`")]
    Unterminated(String),
    #[error("invalid escape `\\{0}` in quoted name")]
    InvalidEscape(char),
    #[error("invalid disambiguator in `{0}`")]
    InvalidDisambiguator(String),
    #[error("empty identifier")]
    Empty,
}

// ---------------------------------------------------------------------------
// Name
// ---------------------------------------------------------------------------

/// An unescaped base name, cheap to clone.
///
/// Equality and ordering are defined on the raw (unescaped) string; quoting
/// is purely a presentation concern handled by `Display`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(Arc<str>);

impl Name {
    #[inline]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the name prints without quotes.
    #[inline]
    pub fn is_simple(&self) -> bool {
        is_simple(&self.0)
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Name {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", &*self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote(&self.0))
    }
}

// ---------------------------------------------------------------------------
// LocalId
// ---------------------------------------------------------------------------

/// A `(name, disambiguator)` pair, unique within one allocator.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId {
    name: Name,
    disambiguator: u32,
}

impl LocalId {
    #[inline]
    pub fn new(name: Name, disambiguator: u32) -> Self {
        Self {
            name,
            disambiguator,
        }
    }

    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn disambiguator(&self) -> u32 {
        self.disambiguator
    }
}

impl From<&str> for LocalId {
    fn from(name: &str) -> Self {
        Self::new(Name::new(name), 0)
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.disambiguator {
            0 => write!(f, "{}", self.name),
            d => write!(f, "{}.{}", self.name, d),
        }
    }
}

impl FromStr for LocalId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::Empty);
        }
        let (name, rest) = if s.starts_with('"') {
            let end = quote::closing_quote(s).ok_or_else(|| Error::Unterminated(s.into()))?;
            (unquote(&s[..=end])?, &s[end + 1..])
        } else {
            match s.find('.') {
                Some(dot) => (s[..dot].to_string(), &s[dot..]),
                None => (s.to_string(), ""),
            }
        };
        let disambiguator = match rest.strip_prefix('.') {
            None if rest.is_empty() => 0,
            Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                digits
                    .parse()
                    .map_err(|_| Error::InvalidDisambiguator(s.into()))?
            }
            _ => return Err(Error::InvalidDisambiguator(s.into())),
        };
        Ok(Self::new(Name::from(name), disambiguator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_omits_zero_disambiguator() {
        assert_eq!(LocalId::from("entry").to_string(), "entry");
        assert_eq!(LocalId::new(Name::new("entry"), 3).to_string(), "entry.3");
    }

    #[test]
    fn display_quotes_complex_names() {
        let id = LocalId::new(Name::new("my var"), 0);
        assert_eq!(id.to_string(), "\"my var\"");
        let id = LocalId::new(Name::new("x.1"), 2);
        assert_eq!(id.to_string(), "\"x.1\".2");
    }

    #[test]
    fn parse_plain_and_quoted() {
        let id: LocalId = "loop.4".parse().unwrap();
        assert_eq!(id.name().as_str(), "loop");
        assert_eq!(id.disambiguator(), 4);

        let id: LocalId = "\"x.1\".2".parse().unwrap();
        assert_eq!(id.name().as_str(), "x.1");
        assert_eq!(id.disambiguator(), 2);

        let id: LocalId = "\"a\\\"b\"".parse().unwrap();
        assert_eq!(id.name().as_str(), "a\"b");
        assert_eq!(id.disambiguator(), 0);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("".parse::<LocalId>(), Err(Error::Empty));
        assert!(matches!(
            "x.".parse::<LocalId>(),
            Err(Error::InvalidDisambiguator(_))
        ));
        assert!(matches!(
            "x.1a".parse::<LocalId>(),
            Err(Error::InvalidDisambiguator(_))
        ));
        assert!(matches!(
            "\"open".parse::<LocalId>(),
            Err(Error::Unterminated(_))
        ));
    }

    #[test]
    fn equality_ignores_presentation() {
        let quoted: LocalId = "\"plain\"".parse().unwrap();
        assert_eq!(quoted, LocalId::from("plain"));
        assert_eq!(quoted.to_string(), "plain");
    }
}
