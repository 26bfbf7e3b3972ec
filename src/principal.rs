use std::collections::HashMap;

use tracing::debug;

use crate::attr::{AttributeList, Token};
use crate::error::UploadError;

/// The accessing identity. The embedding hook supplies the numeric
/// user id of the process performing the access.
pub type PrincipalId = u32;

/// Principal id to attribute-list mapping, rebuilt wholesale from each
/// upload. Lines look like:
///
/// ```text
/// 1001:role=admin,dept=eng
/// 1002:dept=sales
/// ```
///
/// The last line wins when a uid repeats within one upload.
#[derive(Debug, Default)]
pub struct PrincipalStore<T> {
    entries: HashMap<PrincipalId, AttributeList<T>>,
}

impl<T: Token> PrincipalStore<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Parse a full principal upload. A line shorter than two bytes
    /// ends the scan.
    pub fn parse(text: &str) -> Result<Self, UploadError> {
        let mut entries = HashMap::new();
        for line in text.split('\n') {
            if line.len() < 2 {
                break;
            }
            let (uid, rest) = line
                .split_once(':')
                .ok_or_else(|| UploadError::malformed(format!("principal line '{line}' has no ':'")))?;
            let uid: PrincipalId = uid
                .parse()
                .map_err(|_| UploadError::malformed(format!("invalid principal id '{uid}'")))?;
            entries.insert(uid, AttributeList::parse(rest)?);
        }
        debug!(principals = entries.len(), "principal store parsed");
        Ok(Self { entries })
    }

    /// Attributes held by a principal. Absence is not an error: a
    /// principal with no record has no attributes and every controlled
    /// request it makes is denied.
    pub fn get(&self, id: PrincipalId) -> Option<&AttributeList<T>> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::PrincipalStore;
    use crate::attr::Attribute;

    #[test]
    fn parse_and_lookup() {
        let store =
            PrincipalStore::<String>::parse("1001:role=admin,dept=eng\n1002:dept=sales\n").unwrap();
        assert_eq!(store.len(), 2);
        let attrs = store.get(1001).unwrap();
        assert!(attrs.contains(&Attribute::new("role".into(), "admin".into())));
        assert!(store.get(1003).is_none());
    }

    #[test]
    fn last_line_wins_on_duplicate_uid() {
        let store = PrincipalStore::<String>::parse("7:a=1\n7:b=2\n").unwrap();
        let attrs = store.get(7).unwrap();
        assert_eq!(attrs.len(), 1);
        assert!(attrs.contains(&Attribute::new("b".into(), "2".into())));
    }

    #[test]
    fn short_line_ends_scan() {
        let store = PrincipalStore::<String>::parse("7:a=1\nx\n8:b=2\n").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rejects_bad_uid() {
        assert!(PrincipalStore::<String>::parse("alice:a=1\n").is_err());
    }
}
