use std::ops::Deref;
use std::ops::Range;

use serde::Deserialize;

/// A configuration value together with the byte span it was parsed from.
///
/// Spans are relative to the content of the file being loaded, which the
/// loader keeps as a [`crate::SourceInfo`] so diagnostics can point at the
/// offending line.
#[derive(Debug, Clone)]
pub struct Located<T> {
    value: T,
    span: Range<usize>,
}

impl<T> Located<T> {
    pub fn new(value: T, span: Range<usize>) -> Self {
        Self { value, span }
    }

    /// Get a reference to the inner value
    pub fn get_ref(&self) -> &T {
        &self.value
    }

    /// Consume the Located and return the inner value
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Byte span in the source file
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Map the inner value while keeping the span
    pub fn map<U, F>(self, f: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: f(self.value),
            span: self.span,
        }
    }
}

impl<T> Deref for Located<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// Reads through `toml::Spanned<T>`, which only the TOML deserializer can
/// populate. Deserializing from any other format fails.
impl<'de, T> Deserialize<'de> for Located<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let spanned = toml::Spanned::<T>::deserialize(deserializer)?;
        let span = spanned.span().clone();

        Ok(Located {
            value: spanned.into_inner(),
            span,
        })
    }
}

impl<T: PartialEq> PartialEq for Located<T> {
    fn eq(&self, other: &Self) -> bool {
        // Location is not part of equality
        self.value == other.value
    }
}

impl<T: Eq> Eq for Located<T> {}
