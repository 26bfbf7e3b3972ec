//! Parsing of the environment attribute upload.
//!
//! The environment is a single attribute list shared by every
//! resolution until it is replaced wholesale by the next upload. The
//! upload carries one `name=value` pair per line:
//!
//! ```text
//! day=weekday
//! location=office
//! time=afterhours
//! ```

use crate::attr::{Attribute, AttributeList, Token};
use crate::error::UploadError;

/// Parse an environment upload into an attribute list.
///
/// A line shorter than two bytes ends the scan; duplicated names are
/// kept (the environment is a multiset, like any attribute list).
pub fn parse_environment<T: Token>(text: &str) -> Result<AttributeList<T>, UploadError> {
    let mut attrs = AttributeList::new();
    for line in text.split('\n') {
        if line.len() < 2 {
            break;
        }
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| UploadError::malformed(format!("environment line '{line}' has no '='")))?;
        attrs.push(Attribute::new(T::parse(name)?, T::parse(value)?));
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::parse_environment;
    use crate::attr::Attribute;

    #[test]
    fn parse_lines() {
        let env = parse_environment::<String>("day=weekday\ntime=business\n").unwrap();
        assert_eq!(env.len(), 2);
        assert!(env.contains(&Attribute::new("time".into(), "business".into())));
    }

    #[test]
    fn short_line_ends_scan() {
        let env = parse_environment::<String>("day=weekday\n\ntime=business\n").unwrap();
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn rejects_line_without_separator() {
        assert!(parse_environment::<String>("day weekday\n").is_err());
    }
}
