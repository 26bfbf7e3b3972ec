use core::str::FromStr;

use serde::Serialize;
use tracing::{debug, warn};

use crate::attr::{AttributeList, Token};
use crate::error::UploadError;
use crate::operation::Operation;

/// Identifier of a rule in the flat policy table.
pub type RuleId = u32;

/// What a reload accepted. Duplicate ids are not fatal (the last
/// occurrence wins) but they are reported so the control surface can
/// surface them.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LoadReport {
    /// Records the upload produced.
    pub entries: usize,
    /// Ids that appeared more than once, in the order the repeats were
    /// seen.
    pub duplicates: Vec<u32>,
}

/// One rule of the flat policy representation.
#[derive(Clone, Debug)]
pub struct Rule<T> {
    pub id: RuleId,
    pub user: AttributeList<T>,
    pub env: AttributeList<T>,
    pub op: Operation,
}

impl<T: Token> Rule<T> {
    /// Whether this rule authorizes `requested` for a principal holding
    /// `user_attrs` under the environment `env_attrs`: the operation
    /// must subsume the request and both attribute lists must cover the
    /// rule's requirements.
    pub fn satisfies(
        &self,
        user_attrs: &AttributeList<T>,
        env_attrs: &AttributeList<T>,
        requested: Operation,
    ) -> bool {
        self.op.grants(requested)
            && user_attrs.covers(&self.user)
            && env_attrs.covers(&self.env)
    }
}

/// The flat policy: an array of rules indexed by rule id.
///
/// The upload declares the rule count up front and each line carries
/// `id:user_attrs|env_attrs|OP`:
///
/// ```text
/// 2
/// 0:role=admin|time=business|MODIFY
/// 1:dept=eng|day=weekday|READ
/// ```
#[derive(Debug, Default)]
pub struct PolicyTable<T> {
    rules: Vec<Option<Rule<T>>>,
}

impl<T: Token> PolicyTable<T> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Parse a full policy upload. An id at or above the declared count
    /// rejects the upload; a repeated id overwrites the earlier rule
    /// and is reported.
    pub fn parse(text: &str) -> Result<(Self, LoadReport), UploadError> {
        let mut lines = text.split('\n');
        let count_line = lines
            .next()
            .ok_or_else(|| UploadError::malformed("empty policy upload"))?;
        let count: u32 = count_line
            .trim()
            .parse()
            .map_err(|_| UploadError::malformed(format!("invalid rule count '{count_line}'")))?;

        let mut rules: Vec<Option<Rule<T>>> = (0..count).map(|_| None).collect();
        let mut report = LoadReport::default();
        for line in lines {
            if line.len() < 2 {
                break;
            }
            let rule = Self::parse_line(line, count)?;
            let slot = &mut rules[rule.id as usize];
            if slot.is_some() {
                warn!(id = rule.id, "duplicate rule id, keeping the last occurrence");
                report.duplicates.push(rule.id);
            }
            *slot = Some(rule);
        }
        report.entries = rules.iter().filter(|r| r.is_some()).count();
        debug!(declared = count, loaded = report.entries, "policy parsed");
        Ok((Self { rules }, report))
    }

    fn parse_line(line: &str, count: u32) -> Result<Rule<T>, UploadError> {
        let (id, rest) = line
            .split_once(':')
            .ok_or_else(|| UploadError::malformed(format!("policy line '{line}' has no ':'")))?;
        let id: RuleId = id
            .parse()
            .map_err(|_| UploadError::malformed(format!("invalid rule id '{id}'")))?;
        if id >= count {
            return Err(UploadError::RuleIdOutOfRange { id, count });
        }
        let mut sections = rest.splitn(3, '|');
        let (user, env, op) = match (sections.next(), sections.next(), sections.next()) {
            (Some(u), Some(e), Some(o)) => (u, e, o),
            _ => {
                return Err(UploadError::malformed(format!(
                    "policy line for rule {id} must have user|env|op sections"
                )))
            }
        };
        let op = Operation::from_str(op)
            .map_err(|_| UploadError::malformed(format!("unknown operation '{op}'")))?;
        Ok(Rule {
            id,
            user: AttributeList::parse(user)?,
            env: AttributeList::parse(env)?,
            op,
        })
    }

    /// Rule by id. `None` both for ids outside the table and for slots
    /// the upload never filled; an unfilled slot satisfies nothing.
    pub fn get(&self, id: RuleId) -> Option<&Rule<T>> {
        self.rules.get(id as usize).and_then(|slot| slot.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::PolicyTable;
    use crate::attr::AttributeList;
    use crate::error::UploadError;
    use crate::operation::Operation;

    fn attrs(text: &str) -> AttributeList<String> {
        AttributeList::parse(text).unwrap()
    }

    #[test]
    fn parse_and_lookup() {
        let (table, report) = PolicyTable::<String>::parse(
            "2\n0:role=admin|time=business|MODIFY\n1:dept=eng|day=weekday|READ\n",
        )
        .unwrap();
        assert_eq!(report.entries, 2);
        assert!(report.duplicates.is_empty());
        assert_eq!(table.get(0).unwrap().op, Operation::Modify);
        assert_eq!(table.get(1).unwrap().op, Operation::Read);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn id_out_of_declared_range_rejects_upload() {
        let err = PolicyTable::<String>::parse("1\n3:a=1|b=2|READ\n").unwrap_err();
        assert!(matches!(
            err,
            UploadError::RuleIdOutOfRange { id: 3, count: 1 }
        ));
    }

    #[test]
    fn duplicate_id_is_last_write_wins_and_reported() {
        let (table, report) =
            PolicyTable::<String>::parse("1\n0:a=1||READ\n0:b=2||MODIFY\n").unwrap();
        assert_eq!(report.duplicates, [0]);
        assert_eq!(report.entries, 1);
        let rule = table.get(0).unwrap();
        assert_eq!(rule.op, Operation::Modify);
        assert!(rule.user.covers(&attrs("b=2")));
    }

    #[test]
    fn unfilled_slot_is_absent() {
        let (table, report) = PolicyTable::<String>::parse("3\n1:a=1||READ\n").unwrap();
        assert_eq!(report.entries, 1);
        assert!(table.get(0).is_none());
        assert!(table.get(2).is_none());
    }

    #[test]
    fn rule_satisfaction_combines_op_and_coverage() {
        let (table, _) =
            PolicyTable::<String>::parse("1\n0:role=admin|time=business|MODIFY\n").unwrap();
        let rule = table.get(0).unwrap();
        let user = attrs("role=admin,dept=eng");
        let env = attrs("time=business");
        assert!(rule.satisfies(&user, &env, Operation::Modify));
        // MODIFY subsumes READ
        assert!(rule.satisfies(&user, &env, Operation::Read));
        assert!(!rule.satisfies(&attrs("dept=eng"), &env, Operation::Read));
        assert!(!rule.satisfies(&user, &attrs("time=afterhours"), Operation::Read));
    }

    #[test]
    fn rejects_missing_sections() {
        assert!(PolicyTable::<String>::parse("1\n0:a=1|READ\n").is_err());
        assert!(PolicyTable::<String>::parse("1\n0:a=1|b=2|DELETE\n").is_err());
    }
}
