//! Escape-hatch reads.
//!
//! `get("$count")` returns the machinery behind `count` instead of its value:
//! the signal cell for leaves, a [`Computed`] handle for computeds. Nested
//! collections come back as nodes, and shallow slots as their raw handle.
//! None of these reads are tracked.

use crate::options::Mode;

use super::{Computed, Field, Node, Slot};

impl Node {
    pub(crate) fn resolve_escape(&self, key: &str) -> Option<Field> {
        let slot = self.inner.children.read().slot(key).cloned()?;
        Some(match slot {
            Slot::Signal(cell) => Field::Signal(cell),
            Slot::Node(node) => Field::Node(node),
            Slot::Shallow(cell) => Field::Shallow(cell.peek()),
            Slot::Computed(slot) => Field::Computed(match self.mode() {
                Mode::Ssr => Computed::fresh(self.clone(), key, slot.decl),
                Mode::Spa => match self.materialize(key) {
                    Some(memo) => Computed::cached(memo),
                    None => Computed::fresh(self.clone(), key, slot.decl),
                },
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::options::{Mode, Options};
    use crate::tree::{build_root, Field};
    use crate::value::Value;
    use crate::ReifyError;
    use serde_json::json;

    fn counter(options: Options) -> crate::tree::Node {
        build_root(
            Value::object([
                ("count", Value::from(1)),
                (
                    "double",
                    Value::computed(|this| Ok(json!(this.json("count")?.as_i64().unwrap_or(0) * 2))),
                ),
                ("items", Value::from(json!([1, 2]))),
            ]),
            options,
        )
        .unwrap()
    }

    #[test]
    fn escaped_leaf_is_the_live_signal() {
        let root = counter(Options::default());
        let cell = root.get("$count").unwrap().unwrap();
        let cell = cell.as_signal().unwrap();

        cell.set(json!(5));
        assert_eq!(root.json("count").unwrap(), json!(5));
        assert_eq!(root.json("double").unwrap(), json!(10));
    }

    #[test]
    fn escaped_computed_is_the_cached_memo_in_spa() {
        let root = counter(Options::default());
        let Some(Field::Computed(double)) = root.get("$double").unwrap() else {
            panic!("expected a computed handle");
        };

        assert!(double.is_cached());
        assert_eq!(double.get().unwrap(), json!(2));
        assert_eq!(root.json("double").unwrap(), json!(2));
        assert_eq!(double.compute_count(), Some(1));

        let again = root.get("$double").unwrap().unwrap();
        assert!(again.as_computed().unwrap().memo().unwrap().same(double.memo().unwrap()));
    }

    #[test]
    fn escaped_computed_is_fresh_in_ssr() {
        let root = counter(Options::default().with_mode(Mode::Ssr));
        let double = root.get("$double").unwrap().unwrap();
        let double = double.as_computed().unwrap();

        assert!(!double.is_cached());
        assert_eq!(double.get().unwrap(), json!(2));
        assert_eq!(double.compute_count(), None);
    }

    #[test]
    fn escape_keys_are_read_only_and_answer_has() {
        let root = counter(Options::default());

        assert!(root.has("$count"));
        assert!(!root.has("$missing"));
        assert!(root.get("$missing").unwrap().is_none());
        assert!(matches!(root.get("$items").unwrap(), Some(Field::Node(_))));
        assert_eq!(
            root.set("$count", 3),
            Err(ReifyError::EscapeHatchAssignment { key: "$count".into() })
        );
        assert_eq!(
            root.delete("$count"),
            Err(ReifyError::EscapeHatchAssignment { key: "$count".into() })
        );
    }

    #[test]
    fn array_length_has_no_escape_counterpart() {
        let root = counter(Options::default());
        let items = root.child("items").unwrap();
        assert!(items.get("$length").unwrap().is_none());
        assert!(items.get("$0").unwrap().unwrap().as_signal().is_some());
    }

    #[test]
    fn custom_and_disabled_prefixes() {
        let root = counter(Options::default().with_escape_hatch("raw:"));
        assert!(root.get("raw:count").unwrap().unwrap().as_signal().is_some());
        assert!(root.get("$count").unwrap().is_none());

        let plain = build_root(
            Value::from(json!({"$count": 1})),
            Options::default().with_escape_hatch(""),
        )
        .unwrap();
        assert_eq!(plain.json("$count").unwrap(), json!(1));
    }

    #[test]
    fn bare_prefix_is_an_ordinary_key() {
        let root = build_root(Value::from(json!({"$": 7})), Options::default()).unwrap();
        assert_eq!(root.json("$").unwrap(), json!(7));
        root.set("$", 8).unwrap();
        assert_eq!(root.json("$").unwrap(), json!(8));
    }
}
