use core::fmt;
use core::hash::Hash;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// An opaque attribute token: an attribute name or an attribute value.
///
/// The engine never interprets tokens, it only compares them for
/// equality. Two implementations cover the two upload encodings:
/// [`String`] for the plain textual form and [`Coded`] for uploads
/// whose names and values were pre-encoded to small integers by an
/// external step.
pub trait Token:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Parse a single field of an upload record.
    fn parse(field: &str) -> Result<Self, UploadError>;
}

impl Token for String {
    fn parse(field: &str) -> Result<Self, UploadError> {
        Ok(field.to_string())
    }
}

/// An integer-encoded attribute token.
///
/// Equality is value equality on the code. The code is assigned by
/// whoever produced the upload; it carries no meaning here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coded(pub u32);

impl Token for Coded {
    fn parse(field: &str) -> Result<Self, UploadError> {
        field
            .parse::<u32>()
            .map(Coded)
            .map_err(|_| UploadError::malformed(format!("invalid coded token '{field}'")))
    }
}

impl fmt::Display for Coded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single name/value pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute<T> {
    pub name: T,
    pub value: T,
}

impl<T> Attribute<T> {
    pub fn new(name: T, value: T) -> Self {
        Self { name, value }
    }
}

/// An unordered collection of attributes.
///
/// Names need not be unique: a principal may hold several values for
/// the same attribute name. No operation on the list depends on the
/// order the attributes were supplied in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeList<T>(Vec<Attribute<T>>);

impl<T: Token> AttributeList<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse a comma-separated run of `name=value` pairs.
    ///
    /// An empty input is an empty list; a pair without `=` rejects the
    /// whole input.
    pub fn parse(text: &str) -> Result<Self, UploadError> {
        if text.is_empty() {
            return Ok(Self::new());
        }
        let mut attrs = Vec::new();
        for pair in text.split(',') {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| UploadError::malformed(format!("attribute '{pair}' has no '='")))?;
            attrs.push(Attribute::new(T::parse(name)?, T::parse(value)?));
        }
        Ok(Self(attrs))
    }

    pub fn push(&mut self, attr: Attribute<T>) {
        self.0.push(attr)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute<T>> {
        self.0.iter()
    }

    /// True iff some element has the same name and the same value.
    pub fn contains(&self, attr: &Attribute<T>) -> bool {
        self.0.iter().any(|a| a == attr)
    }

    /// All values this list holds for `name`, in the order they were
    /// supplied.
    pub fn values_of<'a>(&'a self, name: &'a T) -> impl Iterator<Item = &'a T> {
        self.0
            .iter()
            .filter(move |a| &a.name == name)
            .map(|a| &a.value)
    }

    /// True iff every element of `required` is contained in `self`.
    ///
    /// This is satisfaction by coverage, not set equality: `self` may
    /// hold extra attributes, and each required element counts exactly
    /// once no matter how many duplicates `self` holds. The test is an
    /// exact match-count comparison against the size of `required`.
    pub fn covers(&self, required: &AttributeList<T>) -> bool {
        let found = required.0.iter().filter(|r| self.contains(r)).count();
        found == required.0.len()
    }
}

impl<T: Token> FromIterator<Attribute<T>> for AttributeList<T> {
    fn from_iter<I: IntoIterator<Item = Attribute<T>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Token> fmt::Display for AttributeList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut n = self.0.len();
        for a in &self.0 {
            if n > 1 {
                write!(f, "{}={},", a.name, a.value)?
            } else {
                write!(f, "{}={}", a.name, a.value)?
            }
            n -= 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Attribute, AttributeList, Coded, Token};
    use quickcheck::{Gen, QuickCheck};

    fn list(pairs: &[(&str, &str)]) -> AttributeList<String> {
        pairs
            .iter()
            .map(|(n, v)| Attribute::new(n.to_string(), v.to_string()))
            .collect()
    }

    fn from_codes(pairs: &[(u8, u8)]) -> AttributeList<String> {
        pairs
            .iter()
            .map(|(n, v)| Attribute::new(format!("n{n}"), format!("v{v}")))
            .collect()
    }

    #[test]
    fn parse_pairs() {
        let attrs = AttributeList::<String>::parse("role=admin,dept=eng").unwrap();
        assert_eq!(attrs.len(), 2);
        assert!(attrs.contains(&Attribute::new("role".to_string(), "admin".to_string())));
        assert!(attrs.contains(&Attribute::new("dept".to_string(), "eng".to_string())));
    }

    #[test]
    fn parse_empty_is_empty_list() {
        let attrs = AttributeList::<String>::parse("").unwrap();
        assert!(attrs.is_empty());
    }

    #[test]
    fn parse_rejects_pair_without_separator() {
        assert!(AttributeList::<String>::parse("role=admin,dept").is_err());
    }

    #[test]
    fn parse_coded_tokens() {
        let attrs = AttributeList::<Coded>::parse("3=7,2=9").unwrap();
        assert!(attrs.contains(&Attribute::new(Coded(3), Coded(7))));
        assert!(AttributeList::<Coded>::parse("3=x").is_err());
    }

    #[test]
    fn covers_subset() {
        let held = list(&[("a", "1"), ("b", "2")]);
        assert!(held.covers(&list(&[("a", "1")])));
        assert!(!held.covers(&list(&[("a", "1"), ("c", "3")])));
    }

    #[test]
    fn covers_same_name_different_value() {
        let held = list(&[("a", "1")]);
        assert!(!held.covers(&list(&[("a", "2")])));
    }

    #[test]
    fn covers_counts_each_required_element() {
        // A duplicated requirement matches the same held attribute twice.
        let held = list(&[("a", "1")]);
        assert!(held.covers(&list(&[("a", "1"), ("a", "1")])));
    }

    #[test]
    fn values_of_keeps_supply_order() {
        let held = list(&[("dept", "eng"), ("dept", "ops"), ("role", "admin")]);
        let name = "dept".to_string();
        let vals: Vec<&String> = held.values_of(&name).collect();
        assert_eq!(vals, ["eng", "ops"]);
    }

    #[test]
    fn covers_is_order_independent() {
        fn property(pairs: Vec<(u8, u8)>, rotate: usize) -> bool {
            let required = from_codes(&pairs);
            let mut rotated = pairs.clone();
            if !rotated.is_empty() {
                let len = rotated.len();
                rotated.rotate_left(rotate % len);
            }
            from_codes(&rotated).covers(&required)
        }
        QuickCheck::new()
            .gen(Gen::new(16))
            .tests(500)
            .min_tests_passed(500)
            .quickcheck(property as fn(_, _) -> bool)
    }

    #[test]
    fn superset_always_covers() {
        fn property(pairs: Vec<(u8, u8)>, extra: Vec<(u8, u8)>) -> bool {
            let mut all = pairs.clone();
            all.extend(extra);
            from_codes(&all).covers(&from_codes(&pairs))
        }
        QuickCheck::new()
            .gen(Gen::new(16))
            .tests(500)
            .min_tests_passed(500)
            .quickcheck(property as fn(_, _) -> bool)
    }

    #[test]
    fn token_roundtrip_display() {
        let t = <String as Token>::parse("weekday").unwrap();
        assert_eq!(t, "weekday");
        assert_eq!(Coded(17).to_string(), "17");
    }
}
