//! Mutation guard.
//!
//! Every write and delete passes through here. Signal cells keep their
//! identity and receive the new value; collections and computeds are never
//! swapped out from under their readers. Strict trees additionally refuse
//! keys that were not part of the initial shape.

use tracing::{trace, warn};

use crate::error::{ReifyError, Result};
use crate::reactive::batch;
use crate::value::{Derive, Json, Shallow, Value};

use super::{parse_index, Children, Node, Slot, MAX_LENGTH};

/// State of an object key before a write.
enum Entry {
    Absent,
    Deleted,
    Present(Slot),
}

impl Node {
    /// Write `value` at `key`.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if self.options().escaped(key).is_some() {
            warn!(key, "write to escape-hatch property");
            return Err(ReifyError::EscapeHatchAssignment {
                key: key.to_string(),
            });
        }

        if self.is_array() {
            if key == "length" {
                return self.set_length(array_length(&value)?);
            }
            let Some(index) = parse_index(key) else {
                warn!(key, "write to non-index key of an array");
                return Err(ReifyError::unknown_property(
                    key,
                    "write",
                    self.options().permissive,
                ));
            };
            return self.write_index(index, value);
        }

        let entry = match &*self.inner.children.read() {
            Children::Object(map) => match map.get(key) {
                None => Entry::Absent,
                Some(None) => Entry::Deleted,
                Some(Some(slot)) => Entry::Present(slot.clone()),
            },
            Children::Array(_) => Entry::Absent,
        };

        match entry {
            Entry::Present(slot) => self.overwrite(key, slot, value),
            Entry::Deleted => self.insert_key(key, value),
            Entry::Absent if self.options().permissive => self.insert_key(key, value),
            Entry::Absent => {
                warn!(key, "write to undeclared property on a strict tree");
                Err(ReifyError::unknown_property(key, "write", false))
            }
        }
    }

    /// Delete `key`. Returns whether a value was removed.
    ///
    /// Strict trees keep the key declared so it can be written again; array
    /// elements leave a hole and the length is unchanged.
    pub fn delete(&self, key: &str) -> Result<bool> {
        if self.options().escaped(key).is_some() {
            warn!(key, "delete of escape-hatch property");
            return Err(ReifyError::EscapeHatchAssignment {
                key: key.to_string(),
            });
        }
        let permissive = self.options().permissive;

        let (removed, undeclared) = {
            let mut children = self.inner.children.write();
            match &mut *children {
                Children::Array(items) => {
                    let removed = parse_index(key)
                        .and_then(|i| items.get_mut(i))
                        .and_then(Option::take);
                    (removed, false)
                }
                Children::Object(map) if permissive => (map.shift_remove(key).flatten(), false),
                Children::Object(map) => match map.get_mut(key) {
                    Some(entry) => (entry.take(), false),
                    None => (None, true),
                },
            }
        };

        if undeclared {
            warn!(key, "delete of undeclared property on a strict tree");
            return Err(ReifyError::unknown_property(key, "delete", false));
        }
        match removed {
            Some(slot) => {
                trace!(node = self.inner.id.raw(), key, "deleted");
                batch(|| {
                    slot.retire();
                    self.bump_shape();
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn overwrite(&self, key: &str, slot: Slot, value: Value) -> Result<()> {
        match (slot, value) {
            (Slot::Signal(cell), value) => match value.as_plain() {
                Some(json) => {
                    if cell.set(json) {
                        trace!(node = self.inner.id.raw(), key, "wrote");
                    }
                    Ok(())
                }
                None => self.refuse(key, "signal cell"),
            },
            (Slot::Shallow(cell), Value::Shallow(raw)) => {
                cell.set(raw);
                Ok(())
            }
            (Slot::Shallow(cell), value) => {
                cell.set(Shallow::new(value));
                Ok(())
            }
            (Slot::Computed(_), Value::Computed(decl)) => {
                self.redeclare(key, decl);
                Ok(())
            }
            (slot, _) => self.refuse(key, slot.kind_name()),
        }
    }

    fn refuse(&self, key: &str, found: &'static str) -> Result<()> {
        warn!(key, found, "replacement refused");
        Err(ReifyError::ReplacementDisallowed {
            key: key.to_string(),
            found,
        })
    }

    /// Swap a computed's declaration. Readers of the old memo are told it
    /// changed and pick up the new one on their next read.
    fn redeclare(&self, key: &str, decl: Derive) {
        let previous = {
            let mut children = self.inner.children.write();
            match children.slot_mut(key) {
                Some(Slot::Computed(slot)) => {
                    slot.decl = decl;
                    slot.instance.take()
                }
                _ => None,
            }
        };
        trace!(node = self.inner.id.raw(), key, "computed redeclared");
        if let Some(instance) = previous {
            instance.memo.mark_dirty();
        }
    }

    fn insert_key(&self, key: &str, value: Value) -> Result<()> {
        let slot = self.build_child(value);
        if let Children::Object(map) = &mut *self.inner.children.write() {
            map.insert(key.to_string(), Some(slot));
        }
        trace!(node = self.inner.id.raw(), key, "added");
        self.bump_shape();
        Ok(())
    }

    fn write_index(&self, index: usize, value: Value) -> Result<()> {
        let current = match &*self.inner.children.read() {
            Children::Array(items) => items.get(index).cloned().flatten(),
            Children::Object(_) => None,
        };
        if let Some(slot) = current {
            return self.overwrite(&index.to_string(), slot, value);
        }

        let slot = self.build_child(value);
        self.with_items("write", |items| -> Result<()> {
            if index >= items.len() {
                let len = index
                    .checked_add(1)
                    .ok_or_else(|| invalid_length(index))?;
                extend_with_holes(items, len)?;
            }
            items[index] = Some(slot);
            Ok(())
        })??;
        trace!(node = self.inner.id.raw(), index, "element added");
        self.bump_shape();
        Ok(())
    }

    /// Truncate or extend the array. New positions are holes.
    pub fn set_length(&self, len: usize) -> Result<()> {
        let removed = self.with_items("set length", |items| {
            if len < items.len() {
                Ok(items.split_off(len))
            } else {
                extend_with_holes(items, len).map(|()| Vec::new())
            }
        })??;
        batch(|| {
            retire_all(removed);
            self.bump_shape();
        });
        Ok(())
    }

    /// Append a value; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        let slot = self.build_child(value.into());
        let len = self.with_items("push", |items| {
            items.push(Some(slot));
            items.len()
        })?;
        self.bump_shape();
        Ok(len)
    }

    /// Prepend a value; returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<usize> {
        self.insert(0, value)?;
        Ok(self.inner.children.read().len())
    }

    /// Insert a value before `index`, clamped to the length.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let slot = self.build_child(value.into());
        self.with_items("insert", |items| {
            let index = index.min(items.len());
            items.insert(index, Some(slot));
        })?;
        self.bump_shape();
        Ok(())
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Option<Json>> {
        let removed = self.with_items("pop", |items| items.pop())?;
        self.take_removed(removed)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Result<Option<Json>> {
        self.remove(0)
    }

    /// Remove the element at `index`, shifting later ones down.
    pub fn remove(&self, index: usize) -> Result<Option<Json>> {
        let removed = self.with_items("remove", |items| {
            (index < items.len()).then(|| items.remove(index))
        })?;
        self.take_removed(removed)
    }

    /// Reverse the array in place. Element cells move with their values.
    pub fn reverse(&self) -> Result<()> {
        self.with_items("reverse", |items| items.reverse())?;
        self.bump_shape();
        Ok(())
    }

    /// Hand back the value of a removed element; holes and computeds read as
    /// `null`.
    fn take_removed(&self, removed: Option<Option<Slot>>) -> Result<Option<Json>> {
        let Some(removed) = removed else {
            return Ok(None);
        };
        let json = removed.as_ref().and_then(Slot::snapshot).unwrap_or(Json::Null);
        batch(|| {
            if let Some(slot) = removed {
                slot.retire();
            }
            self.bump_shape();
        });
        Ok(Some(json))
    }

    fn with_items<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Vec<Option<Slot>>) -> R,
    ) -> Result<R> {
        let result = match &mut *self.inner.children.write() {
            Children::Array(items) => Some(f(items)),
            Children::Object(_) => None,
        };
        result.ok_or_else(|| {
            warn!(op, "array operation on an object node");
            ReifyError::NotAnArray { op }
        })
    }
}

fn retire_all(slots: Vec<Option<Slot>>) {
    for slot in slots.into_iter().flatten() {
        slot.retire();
    }
}

/// Grow `items` to `len` with holes, refusing lengths arrays cannot have or
/// that cannot be allocated.
fn extend_with_holes(items: &mut Vec<Option<Slot>>, len: usize) -> Result<()> {
    if len > MAX_LENGTH {
        return Err(invalid_length(len));
    }
    items
        .try_reserve(len.saturating_sub(items.len()))
        .map_err(|_| invalid_length(len))?;
    items.resize_with(len, || None);
    Ok(())
}

fn invalid_length(len: usize) -> ReifyError {
    warn!(len, "array length out of range");
    ReifyError::InvalidLength {
        value: len.to_string(),
    }
}

fn array_length(value: &Value) -> Result<usize> {
    let invalid = || ReifyError::InvalidLength {
        value: value.to_json().to_string(),
    };
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}
