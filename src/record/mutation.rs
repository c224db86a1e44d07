use serde_json::Value;
use tracing::trace;

use super::Record;
use crate::attributes::{values_equal, Attributes, IntoAttributes};
use crate::error::{Target, ValidationError};
use crate::events::EventData;

/// Options for [`Record::set_with`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Apply without firing `change:<attr>` / `change`.
    pub silent: bool,
    /// Remove the given keys instead of assigning them.
    pub unset: bool,
}

impl SetOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn unset() -> Self {
        Self {
            unset: true,
            ..Self::default()
        }
    }
}

/// Where a record is in its mutation cycle.
///
/// `Idle` between batches. The outermost `set` moves to `Mutating` while it
/// applies attributes and fires `change:<attr>`; nested `set` calls made from
/// handlers join the batch. `Draining` fires `change` until no handler has
/// queued further changes, then the record returns to `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Mutating,
    Draining,
}

/// Returns the record to `Idle` when the outermost `set` ends, even if a
/// handler panicked mid-batch.
struct BatchGuard<'a> {
    record: &'a Record,
}

impl<'a> BatchGuard<'a> {
    fn new(record: &'a Record) -> Self {
        BatchGuard { record }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.record.inner.state.try_borrow_mut() {
            state.phase = Phase::Idle;
            state.pending = None;
        }
    }
}

impl Record {
    /// Assign attributes and fire change events. See [`set_with`](Record::set_with).
    pub fn set(&self, attrs: impl IntoAttributes) -> Result<(), ValidationError> {
        self.set_with(attrs, SetOptions::default())
    }

    /// Validate, apply and announce an attribute update.
    ///
    /// On validation failure nothing is applied, `validation_error` is set,
    /// `"invalid"` fires and the error is returned. Otherwise one
    /// `change:<attr>` fires per key whose value actually changed, in input
    /// order, followed by a single `"change"` for the whole batch (including
    /// anything nested `set` calls from handlers changed).
    pub fn set_with(
        &self,
        attrs: impl IntoAttributes,
        options: SetOptions,
    ) -> Result<(), ValidationError> {
        let attrs = attrs.into_attributes();
        if attrs.is_empty() {
            return Ok(());
        }
        self.validate_with(&attrs, options.unset)?;

        let outermost = {
            let mut state = self.inner.state.borrow_mut();
            let outermost = state.phase == Phase::Idle;
            if outermost {
                state.phase = Phase::Mutating;
                state.previous = state.attributes.clone();
                state.changed.clear();
            }
            outermost
        };
        let _guard = outermost.then(|| BatchGuard::new(self));

        let changes = self.apply(attrs, options.unset);

        if !options.silent {
            if !changes.is_empty() {
                self.inner.state.borrow_mut().pending = Some(options.clone());
            }
            for key in changes {
                let value = self.get(&key);
                self.fire(
                    &format!("change:{key}"),
                    EventData::Change {
                        record: self.clone(),
                        value,
                    },
                );
            }
        }

        if !outermost {
            return Ok(());
        }

        if !options.silent {
            self.inner.state.borrow_mut().phase = Phase::Draining;
            loop {
                let pending = self.inner.state.borrow_mut().pending.take();
                if pending.is_none() {
                    break;
                }
                trace!(cid = %self.inner.cid, "change");
                self.fire(
                    "change",
                    EventData::Changed {
                        record: self.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Write `attrs` into state; returns the keys whose current value changed.
    fn apply(&self, attrs: Attributes, unset: bool) -> Vec<String> {
        let mut state = self.inner.state.borrow_mut();
        let id_attribute = self.inner.schema.id_attribute();

        if let Some(id) = attrs.get(id_attribute) {
            state.id = if unset || id.is_null() {
                None
            } else {
                Some(id.clone())
            };
        }

        let mut changes = Vec::new();
        for (key, value) in attrs {
            let next = (!unset).then_some(&value);
            if !values_equal(state.attributes.get(&key), next) {
                changes.push(key.clone());
            }
            if values_equal(state.previous.get(&key), next) {
                state.changed.shift_remove(&key);
            } else {
                let marker = if unset { Value::Null } else { value.clone() };
                state.changed.insert(key.clone(), marker);
            }
            if unset {
                state.attributes.shift_remove(&key);
            } else {
                state.attributes.insert(key, value);
            }
        }
        changes
    }

    /// Run the schema's validation over the attributes `attrs` would produce.
    fn validate_with(&self, attrs: &Attributes, unset: bool) -> Result<(), ValidationError> {
        let prospective = {
            let state = self.inner.state.borrow();
            let mut prospective = state.attributes.clone();
            for (key, value) in attrs {
                if unset {
                    prospective.shift_remove(key);
                } else {
                    prospective.insert(key.clone(), value.clone());
                }
            }
            prospective
        };

        match self.inner.schema.validate(&prospective) {
            None => {
                self.inner.state.borrow_mut().validation_error = None;
                Ok(())
            }
            Some(error) => {
                self.inner.state.borrow_mut().validation_error = Some(error.clone());
                self.fire(
                    "invalid",
                    EventData::Invalid {
                        target: Target::Record(self.clone()),
                        error: error.clone(),
                    },
                );
                Err(error)
            }
        }
    }

    /// Whether the current attributes pass validation. Fires `"invalid"` if not.
    pub fn is_valid(&self) -> bool {
        self.validate_current().is_ok()
    }

    pub(crate) fn validate_current(&self) -> Result<(), ValidationError> {
        self.validate_with(&Attributes::new(), false)
    }

    /// Remove one attribute.
    pub fn unset(&self, attr: &str) -> Result<(), ValidationError> {
        self.unset_with(attr, SetOptions::default())
    }

    pub fn unset_with(&self, attr: &str, options: SetOptions) -> Result<(), ValidationError> {
        let options = SetOptions {
            unset: true,
            ..options
        };
        self.set_with((attr, Value::Null), options)
    }

    /// Remove every attribute.
    pub fn clear(&self) -> Result<(), ValidationError> {
        self.clear_with(SetOptions::default())
    }

    pub fn clear_with(&self, options: SetOptions) -> Result<(), ValidationError> {
        let attrs: Attributes = self
            .inner
            .state
            .borrow()
            .attributes
            .keys()
            .map(|key| (key.clone(), Value::Null))
            .collect();
        let options = SetOptions {
            unset: true,
            ..options
        };
        self.set_with(attrs, options)
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.borrow().phase
    }

    /// Whether the last batch changed anything, or the named attribute.
    pub fn has_changed(&self, attr: Option<&str>) -> bool {
        let state = self.inner.state.borrow();
        match attr {
            None => !state.changed.is_empty(),
            Some(attr) => state.changed.contains_key(attr),
        }
    }

    /// Keys changed by the last batch, with their new values.
    pub fn changed(&self) -> Attributes {
        self.inner.state.borrow().changed.clone()
    }

    /// Without `diff`: the last batch's changes, or `None` if there were none.
    /// With `diff`: the entries of `diff` that differ from the record.
    ///
    /// While a batch is in flight `diff` is compared against the attributes
    /// as they were before the batch.
    pub fn changed_attributes(&self, diff: Option<&Attributes>) -> Option<Attributes> {
        let state = self.inner.state.borrow();
        let Some(diff) = diff else {
            return (!state.changed.is_empty()).then(|| state.changed.clone());
        };

        let base = if state.phase == Phase::Idle {
            &state.attributes
        } else {
            &state.previous
        };
        let changed: Attributes = diff
            .iter()
            .filter(|(key, value)| !values_equal(base.get(key.as_str()), Some(*value)))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        (!changed.is_empty()).then_some(changed)
    }

    /// Value of `attr` before the last batch.
    pub fn previous(&self, attr: &str) -> Option<Value> {
        self.inner.state.borrow().previous.get(attr).cloned()
    }

    pub fn previous_attributes(&self) -> Attributes {
        self.inner.state.borrow().previous.clone()
    }
}
