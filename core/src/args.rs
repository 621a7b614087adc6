//! Argument resolution for multi-shape handle methods.
//!
//! # Design
//! Handle methods such as `Database::view` accept several call shapes through
//! one entry point: `("d", "v")`, `("d", "v", query)`, and so on. Each method
//! declares an ordered table of [`Slot`]s; [`resolve`] walks the supplied
//! arguments left to right and binds every text argument to the leftmost
//! unfilled identifier slot and every mapping to the leftmost unfilled
//! mapping slot. Slots nobody fills stay `None`.
//!
//! Because binding is positional within each shape, two adjacent optional
//! slots of the same shape always fill left first. Callers that want only the
//! right-hand one must supply the left-hand one too.
//!
//! The continuation is never part of `CallArgs`; it is the last, separately
//! typed parameter of every handle method.

use serde_json::{Map, Value};

use crate::error::ArgumentError;

/// One call argument, tagged by runtime shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Fills identifier-like slots: document ids, design/view/show names.
    Text(String),
    /// Fills query-parameter or request-body slots.
    Map(Map<String, Value>),
    /// Any other JSON value; no slot accepts it.
    Other(Value),
}

impl Arg {
    pub fn shape(&self) -> &'static str {
        match self {
            Arg::Text(_) => "text",
            Arg::Map(_) => "mapping",
            Arg::Other(_) => "value",
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Text(value.clone())
    }
}

impl From<Map<String, Value>> for Arg {
    fn from(value: Map<String, Value>) -> Self {
        Arg::Map(value)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Arg::Text(text),
            Value::Object(map) => Arg::Map(map),
            other => Arg::Other(other),
        }
    }
}

/// The ordered argument list of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs(Vec<Arg>);

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, arg: impl Into<Arg>) -> Self {
        self.0.push(arg.into());
        self
    }

    /// Insert an argument ahead of all others.
    pub fn prepend(mut self, arg: impl Into<Arg>) -> Self {
        self.0.insert(0, arg.into());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<()> for CallArgs {
    fn from(_: ()) -> Self {
        CallArgs::new()
    }
}

impl From<Vec<Arg>> for CallArgs {
    fn from(args: Vec<Arg>) -> Self {
        CallArgs(args)
    }
}

macro_rules! single_arg {
    ($($ty:ty),*) => {
        $(impl From<$ty> for CallArgs {
            fn from(value: $ty) -> Self {
                CallArgs(vec![Arg::from(value)])
            }
        })*
    };
}

single_arg!(&str, String, &String, Map<String, Value>, Value, Arg);

macro_rules! tuple_args {
    ($($name:ident $index:tt),+) => {
        impl<$($name: Into<Arg>),+> From<($($name,)+)> for CallArgs {
            fn from(values: ($($name,)+)) -> Self {
                CallArgs(vec![$(values.$index.into()),+])
            }
        }
    };
}

tuple_args!(A 0);
tuple_args!(A 0, B 1);
tuple_args!(A 0, B 1, C 2);
tuple_args!(A 0, B 1, C 2, D 3);
tuple_args!(A 0, B 1, C 2, D 3, E 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Ident,
    Mapping,
}

/// One declared parameter of a handle method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub name: &'static str,
    pub kind: SlotKind,
    pub required: bool,
}

impl Slot {
    pub const fn ident(name: &'static str) -> Self {
        Self { name, kind: SlotKind::Ident, required: true }
    }

    pub const fn optional_ident(name: &'static str) -> Self {
        Self { name, kind: SlotKind::Ident, required: false }
    }

    pub const fn mapping(name: &'static str) -> Self {
        Self { name, kind: SlotKind::Mapping, required: true }
    }

    pub const fn optional_mapping(name: &'static str) -> Self {
        Self { name, kind: SlotKind::Mapping, required: false }
    }

    fn accepts(&self, arg: &Arg) -> bool {
        matches!(
            (self.kind, arg),
            (SlotKind::Ident, Arg::Text(_)) | (SlotKind::Mapping, Arg::Map(_))
        )
    }
}

/// Arguments bound to the slots of one method.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    slots: &'static [Slot],
    values: Vec<Option<Arg>>,
}

impl Bound {
    fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.position(name).and_then(|i| self.values[i].as_ref()) {
            Some(Arg::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn mapping(&self, name: &str) -> Option<&Map<String, Value>> {
        match self.position(name).and_then(|i| self.values[i].as_ref()) {
            Some(Arg::Map(map)) => Some(map),
            _ => None,
        }
    }

    pub fn take_mapping(&mut self, name: &str) -> Option<Map<String, Value>> {
        let index = self.position(name)?;
        match self.values[index].take() {
            Some(Arg::Map(map)) => Some(map),
            other => {
                self.values[index] = other;
                None
            }
        }
    }

    pub fn is_filled(&self, name: &str) -> bool {
        self.position(name).is_some_and(|i| self.values[i].is_some())
    }
}

/// Resolve call arguments inside a handle method, or hand the error to the
/// continuation and return.
macro_rules! bind {
    ($slots:expr, $args:expr, $callback:expr) => {
        match $crate::args::resolve($slots, $args) {
            Ok(bound) => bound,
            Err(err) => return $crate::dispatch::reject($callback, err.into()),
        }
    };
}

/// Bind `args` to `slots`.
pub fn resolve(slots: &'static [Slot], args: impl Into<CallArgs>) -> Result<Bound, ArgumentError> {
    let CallArgs(args) = args.into();
    let mut values: Vec<Option<Arg>> = vec![None; slots.len()];

    for (position, arg) in args.into_iter().enumerate() {
        let free = slots
            .iter()
            .zip(values.iter())
            .position(|(slot, value)| value.is_none() && slot.accepts(&arg));
        match free {
            Some(index) => values[index] = Some(arg),
            None => {
                return Err(ArgumentError::Unexpected {
                    position,
                    shape: arg.shape(),
                })
            }
        }
    }

    if let Some(missing) = slots
        .iter()
        .zip(values.iter())
        .find(|(slot, value)| slot.required && value.is_none())
    {
        return Err(ArgumentError::Missing { slot: missing.0.name });
    }

    tracing::trace!(
        slots = ?slots.iter().map(|s| s.name).collect::<Vec<_>>(),
        filled = values.iter().filter(|v| v.is_some()).count(),
        "resolved call arguments"
    );
    Ok(Bound { slots, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const THREE_OPTIONAL: &[Slot] = &[
        Slot::optional_ident("id"),
        Slot::optional_mapping("query"),
        Slot::optional_ident("other"),
    ];

    const VIEW: &[Slot] = &[
        Slot::ident("design"),
        Slot::ident("view"),
        Slot::optional_mapping("query"),
    ];

    fn query() -> Map<String, Value> {
        json!({"key": "x"}).as_object().cloned().unwrap()
    }

    #[test]
    fn mapping_alone_binds_to_query_slot() {
        let bound = resolve(THREE_OPTIONAL, (query(),)).unwrap();
        assert_eq!(bound.mapping("query"), Some(&query()));
        assert_eq!(bound.text("id"), None);
        assert_eq!(bound.text("other"), None);
    }

    #[test]
    fn no_arguments_leave_every_optional_slot_empty() {
        let bound = resolve(THREE_OPTIONAL, ()).unwrap();
        assert!(!bound.is_filled("id"));
        assert!(!bound.is_filled("query"));
        assert!(!bound.is_filled("other"));
    }

    #[test]
    fn text_fills_identifier_slots_left_to_right() {
        let bound = resolve(THREE_OPTIONAL, ("first", "second")).unwrap();
        assert_eq!(bound.text("id"), Some("first"));
        assert_eq!(bound.text("other"), Some("second"));
        assert_eq!(bound.mapping("query"), None);
    }

    #[test]
    fn mapping_may_precede_text() {
        let bound = resolve(THREE_OPTIONAL, (query(), "doc")).unwrap();
        assert_eq!(bound.text("id"), Some("doc"));
        assert_eq!(bound.mapping("query"), Some(&query()));
    }

    #[test]
    fn required_slots_must_be_filled() {
        let err = resolve(VIEW, ("design",)).unwrap_err();
        assert_eq!(err, ArgumentError::Missing { slot: "view" });
    }

    #[test]
    fn surplus_arguments_are_rejected() {
        let err = resolve(VIEW, ("d", "v", "extra")).unwrap_err();
        assert_eq!(err, ArgumentError::Unexpected { position: 2, shape: "text" });

        let err = resolve(VIEW, ("d", "v", query(), query())).unwrap_err();
        assert_eq!(err, ArgumentError::Unexpected { position: 3, shape: "mapping" });
    }

    #[test]
    fn non_text_non_mapping_values_fit_nowhere() {
        let err = resolve(THREE_OPTIONAL, (json!(42),)).unwrap_err();
        assert_eq!(err, ArgumentError::Unexpected { position: 0, shape: "value" });
    }

    #[test]
    fn json_values_are_classified_by_shape() {
        let bound = resolve(VIEW, (json!("d"), json!("v"), json!({"limit": 1}))).unwrap();
        assert_eq!(bound.text("design"), Some("d"));
        assert_eq!(bound.mapping("query").unwrap()["limit"], 1);
    }

    #[test]
    fn prepend_puts_argument_first() {
        let args = CallArgs::from(("v", query())).prepend("d");
        let bound = resolve(VIEW, args).unwrap();
        assert_eq!(bound.text("design"), Some("d"));
        assert_eq!(bound.text("view"), Some("v"));
    }

    #[test]
    fn take_mapping_moves_value_out() {
        let mut bound = resolve(VIEW, ("d", "v", query())).unwrap();
        assert_eq!(bound.take_mapping("query"), Some(query()));
        assert!(!bound.is_filled("query"));
        assert_eq!(bound.take_mapping("design"), None);
        assert_eq!(bound.text("design"), Some("d"));
    }
}
