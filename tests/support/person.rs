use recordset::{Attributes, Comparator, GroupOf, Schema, ValidationError};
use serde_json::Value;

#[derive(Schema)]
#[schema(
    url_root = "/persons",
    defaults = r#"{"active": true}"#,
    validate = Person::check
)]
pub struct Person;

impl Person {
    fn check(&self, attrs: &Attributes) -> Option<ValidationError> {
        match attrs.get("name") {
            None => None,
            Some(Value::String(name)) if name.trim().is_empty() => {
                Some(ValidationError::for_field("name", "must not be blank"))
            }
            Some(Value::String(_)) => None,
            Some(_) => Some(ValidationError::for_field("name", "must be a string")),
        }
    }
}

pub fn persons() -> GroupOf {
    GroupOf::new(Person).with_url("/persons")
}

pub fn persons_by_name() -> GroupOf {
    persons().with_comparator(Comparator::attribute("name"))
}
