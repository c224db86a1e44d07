use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::Group;
use crate::attributes::compare_values;
use crate::error::ConfigurationError;
use crate::events::EventData;
use crate::record::Record;

/// How a group orders its members.
///
/// Sorting is stable: members with equal keys keep their relative order.
#[derive(Clone)]
pub enum Comparator {
    /// Order by an attribute's value.
    Attribute(String),
    /// Order by a derived key.
    Key(Rc<dyn Fn(&Record) -> Option<Value>>),
    /// Order by comparing two members directly.
    Pairwise(Rc<dyn Fn(&Record, &Record) -> Ordering>),
}

impl Comparator {
    pub fn attribute(name: impl Into<String>) -> Self {
        Comparator::Attribute(name.into())
    }

    pub fn key(key: impl Fn(&Record) -> Option<Value> + 'static) -> Self {
        Comparator::Key(Rc::new(key))
    }

    pub fn pairwise(compare: impl Fn(&Record, &Record) -> Ordering + 'static) -> Self {
        Comparator::Pairwise(Rc::new(compare))
    }

    /// The attribute an `Attribute` comparator sorts by.
    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            Comparator::Attribute(name) => Some(name),
            _ => None,
        }
    }

    fn order(&self, mut members: Vec<Record>) -> Vec<Record> {
        match self {
            Comparator::Attribute(name) => sort_by_key(members, |record| record.get(name)),
            Comparator::Key(key) => sort_by_key(members, |record| key(record)),
            Comparator::Pairwise(compare) => {
                members.sort_by(|a, b| compare(a, b));
                members
            }
        }
    }
}

/// Compute each key once, then stable-sort on it.
fn sort_by_key(members: Vec<Record>, key: impl Fn(&Record) -> Option<Value>) -> Vec<Record> {
    let mut keyed: Vec<(Option<Value>, Record)> = members
        .into_iter()
        .map(|record| (key(&record), record))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_values(a.as_ref(), b.as_ref()));
    keyed.into_iter().map(|(_, record)| record).collect()
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            Comparator::Key(_) => f.write_str("Key(..)"),
            Comparator::Pairwise(_) => f.write_str("Pairwise(..)"),
        }
    }
}

impl Group {
    /// Re-order members with the comparator and fire `sort`.
    pub fn sort(&self) -> Result<(), ConfigurationError> {
        self.sort_with(false)
    }

    pub fn sort_with(&self, silent: bool) -> Result<(), ConfigurationError> {
        if self.comparator().is_none() {
            return Err(ConfigurationError::MissingComparator);
        }
        self.apply_sort();
        if !silent {
            self.fire("sort", EventData::Sort { group: self.clone() });
        }
        Ok(())
    }

    /// Sort without events. The comparator runs with no group borrow held.
    pub(super) fn apply_sort(&self) {
        let Some(comparator) = self.comparator() else {
            return;
        };
        let sorted = comparator.order(self.members());
        self.inner.state.borrow_mut().members = sorted;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::events::Events;
    use crate::group::{GroupOptions, ReconcileOptions};
    use crate::schema::{GroupOf, Plain};
    use serde_json::json;

    fn sorted_by(comparator: Comparator) -> Group {
        Group::with_options(
            Rc::new(GroupOf::new(Plain)),
            GroupOptions::default().with_comparator(comparator),
        )
    }

    fn names(group: &Group) -> Vec<Value> {
        group.map(|r| r.get("name").unwrap_or(Value::Null))
    }

    #[test]
    fn sorted_insertion_fires_one_sort() {
        let group = sorted_by(Comparator::attribute("name"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        group.on("all", move |event| sink.borrow_mut().push(event.name.clone()));

        group.add(json!([{"name": "D"}, {"name": "B"}, {"name": "C"}]));
        assert_eq!(names(&group), vec![json!("B"), json!("C"), json!("D")]);
        assert_eq!(*seen.borrow(), vec!["add", "add", "add", "sort"]);
    }

    #[test]
    fn merge_resorts_when_key_changes() {
        let group = sorted_by(Comparator::attribute("rank"));
        group.add(json!([{"id": 1, "rank": 1}, {"id": 2, "rank": 2}]));

        group.add_with(json!({"id": 1, "rank": 3}), ReconcileOptions::add().merge(true));
        assert_eq!(group.map(|r| r.id()), vec![Some(json!(2)), Some(json!(1))]);
    }

    #[test]
    fn explicit_position_skips_sorting() {
        let group = sorted_by(Comparator::attribute("name"));
        group.add(json!([{"name": "A"}, {"name": "C"}]));
        group.add_with(json!({"name": "Z"}), ReconcileOptions::add().at(0));
        assert_eq!(names(&group), vec![json!("Z"), json!("A"), json!("C")]);
    }

    #[test]
    fn key_and_pairwise_comparators() {
        let by_len = sorted_by(Comparator::key(|r| {
            r.get("name")
                .and_then(|n| n.as_str().map(|s| json!(s.len())))
        }));
        by_len.add(json!([{"name": "ccc"}, {"name": "a"}, {"name": "bb"}]));
        assert_eq!(names(&by_len), vec![json!("a"), json!("bb"), json!("ccc")]);

        let reverse = sorted_by(Comparator::pairwise(|a, b| {
            compare_values(b.get("name").as_ref(), a.get("name").as_ref())
        }));
        reverse.add(json!([{"name": "a"}, {"name": "c"}, {"name": "b"}]));
        assert_eq!(names(&reverse), vec![json!("c"), json!("b"), json!("a")]);
    }

    #[test]
    fn sort_is_stable() {
        let group = sorted_by(Comparator::attribute("k"));
        group.add(json!([
            {"k": 1, "name": "first"},
            {"k": 0, "name": "zero"},
            {"k": 1, "name": "second"}
        ]));
        assert_eq!(
            names(&group),
            vec![json!("zero"), json!("first"), json!("second")]
        );
    }

    #[test]
    fn sort_without_comparator_is_an_error() {
        let group = Group::new(GroupOf::new(Plain));
        assert_eq!(group.sort(), Err(ConfigurationError::MissingComparator));
    }
}
