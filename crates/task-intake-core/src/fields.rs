//! Common data fields across the files of one ingestion batch.
//!
//! The first file that yields tasks seeds the set; every later file
//! intersects it. An empty intersection means the files describe different
//! data and the batch is rejected, unless one side holds nothing but the
//! undefined placeholder field (raw files that could not be mapped onto a
//! named field), in which case the concrete side wins.

use std::collections::BTreeSet;

use crate::error::ValidationFailure;

/// Running intersection of data field names.
#[derive(Debug, Clone)]
pub struct CommonFields {
    fields: BTreeSet<String>,
    undefined_field: String,
}

impl CommonFields {
    pub fn new(undefined_field: impl Into<String>) -> Self {
        Self {
            fields: BTreeSet::new(),
            undefined_field: undefined_field.into(),
        }
    }

    /// Folds the field set of `file_name` into the running set.
    pub fn absorb(
        &mut self,
        file_name: &str,
        new_fields: BTreeSet<String>,
    ) -> Result<(), ValidationFailure> {
        if self.fields.is_empty() {
            self.fields = new_fields;
            return Ok(());
        }
        let common: BTreeSet<String> = self.fields.intersection(&new_fields).cloned().collect();
        if !common.is_empty() {
            self.fields = common;
            return Ok(());
        }
        match (self.is_placeholder(&new_fields), self.is_placeholder(&self.fields)) {
            (true, _) => {}
            (false, true) => self.fields = new_fields,
            (false, false) => {
                return Err(ValidationFailure::new(inconsistency_message(
                    file_name,
                    &new_fields,
                    &self.fields,
                )))
            }
        }
        Ok(())
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeSet<String> {
        self.fields
    }

    fn is_placeholder(&self, set: &BTreeSet<String>) -> bool {
        set.len() == 1 && set.contains(&self.undefined_field)
    }
}

/// Reduces `(file name, field set)` pairs in order.
pub fn reduce<I, S>(undefined_field: &str, files: I) -> Result<BTreeSet<String>, ValidationFailure>
where
    I: IntoIterator<Item = (S, BTreeSet<String>)>,
    S: AsRef<str>,
{
    files
        .into_iter()
        .try_fold(CommonFields::new(undefined_field), |mut acc, (name, fields)| {
            acc.absorb(name.as_ref(), fields)?;
            Ok::<_, ValidationFailure>(acc)
        })
        .map(CommonFields::into_fields)
}

fn inconsistency_message(
    file_name: &str,
    new_fields: &BTreeSet<String>,
    old_fields: &BTreeSet<String>,
) -> String {
    let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(",");
    format!(
        "You're trying to import inconsistent data:\n\
         data key(s) \"{}\" from \"{}\" share nothing with data key(s) found in other files:\n\"{}\"",
        join(new_fields),
        file_name,
        join(old_fields)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNDEFINED: &str = "$undefined$";

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_file_seeds_then_intersects() {
        let result = reduce(
            UNDEFINED,
            [
                ("a.csv", set(&["text", "label", "id"])),
                ("b.csv", set(&["text", "id"])),
                ("c.csv", set(&["text", "extra"])),
            ],
        )
        .unwrap();
        assert_eq!(result, set(&["text"]));
    }

    #[test]
    fn disjoint_sets_conflict() {
        let err = reduce(
            UNDEFINED,
            [("a.csv", set(&["text"])), ("b.csv", set(&["image"]))],
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("b.csv"));
        assert!(msg.contains("\"image\""));
        assert!(msg.contains("\"text\""));
    }

    #[test]
    fn placeholder_yields_to_concrete_fields() {
        let later = reduce(
            UNDEFINED,
            [("a.csv", set(&["text"])), ("raw.bin", set(&[UNDEFINED]))],
        )
        .unwrap();
        assert_eq!(later, set(&["text"]));

        let earlier = reduce(
            UNDEFINED,
            [("raw.bin", set(&[UNDEFINED])), ("a.csv", set(&["text"]))],
        )
        .unwrap();
        assert_eq!(earlier, set(&["text"]));
    }

    #[test]
    fn empty_input_gives_empty_set() {
        let none: Vec<(&str, BTreeSet<String>)> = Vec::new();
        assert!(reduce(UNDEFINED, none).unwrap().is_empty());
    }
}
