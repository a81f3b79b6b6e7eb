//! pre-receive hook input: one `<old-id> <new-id> <refname>` line per
//! proposed ref update.

use std::io::BufRead;
use std::str::FromStr;

use crate::object::{ObjectId, ObjectIdError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceUpdate {
    pub from: ObjectId,
    pub to: ObjectId,
    pub refname: String,
}

impl ReferenceUpdate {
    pub fn new(from: ObjectId, to: ObjectId, refname: impl Into<String>) -> Self {
        Self {
            from,
            to,
            refname: refname.into(),
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.to.is_zero()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LineError {
    #[error("wrong number of columns: expected 3, got {0}")]
    FieldCount(usize),

    #[error("wrong object id format: {0}")]
    ObjectId(#[from] ObjectIdError),
}

impl FromStr for ReferenceUpdate {
    type Err = LineError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_ascii_whitespace().collect();
        let [from, to, refname] = fields[..] else {
            return Err(LineError::FieldCount(fields.len()));
        };
        Ok(Self {
            from: from.parse()?,
            to: to.parse()?,
            refname: refname.to_string(),
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HookInputError {
    #[error("could not parse ref update on line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: LineError,
    },

    #[error("failed to read hook input: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the complete batch. Any malformed line fails the whole batch, and
/// nothing is returned until the input is exhausted.
pub fn read_updates<R: BufRead>(reader: R) -> Result<Vec<ReferenceUpdate>, HookInputError> {
    let mut updates = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let update = line
            .parse()
            .map_err(|source| HookInputError::Line { line: i + 1, source })?;
        updates.push(update);
    }
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = "4730c034e21a9738e5e741e157dd0d1bef69cd42";
    const NEW: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ZERO: &str = "0000000000000000000000000000000000000000";

    #[test]
    fn test_parse_line() {
        let update: ReferenceUpdate = format!("{OLD} {NEW} refs/heads/main").parse().unwrap();
        assert_eq!(update.from.to_hex(), OLD);
        assert_eq!(update.to.to_hex(), NEW);
        assert_eq!(update.refname, "refs/heads/main");
        assert!(!update.is_deletion());
    }

    #[test]
    fn test_creation_and_deletion() {
        let created: ReferenceUpdate = format!("{ZERO} {NEW} refs/tags/v1").parse().unwrap();
        assert!(created.from.is_zero());
        assert!(!created.is_deletion());

        let deleted: ReferenceUpdate = format!("{OLD} {ZERO} refs/tags/v1").parse().unwrap();
        assert!(deleted.is_deletion());
    }

    #[test]
    fn test_wrong_field_count() {
        assert_eq!(
            format!("{OLD} {NEW}").parse::<ReferenceUpdate>(),
            Err(LineError::FieldCount(2))
        );
        assert_eq!(
            format!("{OLD} {NEW} refs/heads/a extra").parse::<ReferenceUpdate>(),
            Err(LineError::FieldCount(4))
        );
    }

    #[test]
    fn test_bad_object_id() {
        assert!(matches!(
            format!("abc {NEW} refs/heads/main").parse::<ReferenceUpdate>(),
            Err(LineError::ObjectId(_))
        ));
        assert!(matches!(
            format!("{OLD} {} refs/heads/main", "g".repeat(40)).parse::<ReferenceUpdate>(),
            Err(LineError::ObjectId(_))
        ));
    }

    #[test]
    fn test_read_batch_in_order() {
        let input = format!(
            "{ZERO} {NEW} refs/heads/a\n\n{OLD} {NEW} refs/heads/b\n{OLD} {ZERO} refs/heads/c\n"
        );
        let updates = read_updates(input.as_bytes()).unwrap();
        let names: Vec<_> = updates.iter().map(|u| u.refname.as_str()).collect();
        assert_eq!(names, ["refs/heads/a", "refs/heads/b", "refs/heads/c"]);
    }

    #[test]
    fn test_malformed_line_aborts_batch() {
        let input = format!("{ZERO} {NEW} refs/heads/a\nnot a valid line at all\n");
        match read_updates(input.as_bytes()) {
            Err(HookInputError::Line { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected line error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_input_is_empty_batch() {
        assert!(read_updates(&b""[..]).unwrap().is_empty());
    }
}
