//! Shell variables: tagged values plus attribute flags.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Display, Write};

use crate::error::{Error, ErrorKind};
use crate::escape;
use crate::session::Session;

/// A function computing the value of a dynamic variable on each read.
pub type DynamicValueGetter = fn(&Session) -> VariableValue;

/// A shell variable: a value and its attributes.
#[derive(Clone, Debug)]
pub struct Variable {
    value: VariableValue,
    /// Exported to the environment of spawned commands.
    exported: bool,
    /// May not be modified or unset.
    readonly: bool,
    /// Assignments re-parse as arithmetic.
    integer: bool,
    /// Assigned values are lowercased.
    lowercase: bool,
    /// Assigned values are uppercased.
    uppercase: bool,
    /// The value names another variable, resolved on access.
    nameref: bool,
    /// Hidden from `declare -p` style enumeration.
    hidden: bool,
}

impl Default for Variable {
    fn default() -> Self {
        Self {
            value: VariableValue::Scalar(String::new()),
            exported: false,
            readonly: false,
            integer: false,
            lowercase: false,
            uppercase: false,
            nameref: false,
            hidden: false,
        }
    }
}

impl Variable {
    /// Returns a new variable holding the given value.
    pub fn new<V: Into<VariableValue>>(value: V) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Returns the variable's raw value (without dynamic resolution).
    pub const fn value(&self) -> &VariableValue {
        &self.value
    }

    /// Resolves the variable's value; dynamic values are computed.
    pub fn resolve_value(&self, session: &Session) -> VariableValue {
        match &self.value {
            VariableValue::Dynamic(getter) => getter(session),
            other => other.clone(),
        }
    }

    /// Returns whether the variable is exported.
    pub const fn is_exported(&self) -> bool {
        self.exported
    }

    /// Marks the variable as exported.
    pub const fn export(&mut self) -> &mut Self {
        self.exported = true;
        self
    }

    /// Clears the variable's export attribute.
    pub const fn unexport(&mut self) -> &mut Self {
        self.exported = false;
        self
    }

    /// Returns whether the variable is readonly.
    pub const fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Marks the variable as readonly.
    pub const fn set_readonly(&mut self) -> &mut Self {
        self.readonly = true;
        self
    }

    /// Returns whether the variable holds an integer.
    pub const fn is_integer(&self) -> bool {
        self.integer
    }

    /// Marks (or unmarks) the integer attribute.
    pub const fn set_integer(&mut self, value: bool) -> &mut Self {
        self.integer = value;
        self
    }

    /// Returns whether lowercase conversion applies on assignment.
    pub const fn is_lowercase(&self) -> bool {
        self.lowercase
    }

    /// Marks (or unmarks) the lowercase attribute; clears uppercase.
    pub const fn set_lowercase(&mut self, value: bool) -> &mut Self {
        self.lowercase = value;
        if value {
            self.uppercase = false;
        }
        self
    }

    /// Returns whether uppercase conversion applies on assignment.
    pub const fn is_uppercase(&self) -> bool {
        self.uppercase
    }

    /// Marks (or unmarks) the uppercase attribute; clears lowercase.
    pub const fn set_uppercase(&mut self, value: bool) -> &mut Self {
        self.uppercase = value;
        if value {
            self.lowercase = false;
        }
        self
    }

    /// Returns whether the variable is a nameref.
    pub const fn is_nameref(&self) -> bool {
        self.nameref
    }

    /// Marks (or unmarks) the nameref attribute.
    pub const fn set_nameref(&mut self, value: bool) -> &mut Self {
        self.nameref = value;
        self
    }

    /// Returns whether the variable is hidden from enumeration.
    pub const fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Hides the variable from enumeration.
    pub const fn hide(&mut self) -> &mut Self {
        self.hidden = true;
        self
    }

    /// Converts the variable into an indexed array, preserving an existing
    /// scalar value at index 0.
    pub fn convert_to_indexed_array(&mut self) -> Result<(), Error> {
        match &self.value {
            VariableValue::Indexed(_) => Ok(()),
            VariableValue::Associative(_) => {
                Err(ErrorKind::ArrayConversion("associative array".into()).into())
            }
            _ => {
                let mut values = BTreeMap::new();
                if let Some(s) = self.value.try_as_str() {
                    values.insert(0, s.to_string());
                }
                self.value = VariableValue::Indexed(values);
                Ok(())
            }
        }
    }

    /// Converts the variable into an associative array.
    pub fn convert_to_associative_array(&mut self) -> Result<(), Error> {
        match &self.value {
            VariableValue::Associative(_) => Ok(()),
            VariableValue::Indexed(_) => {
                Err(ErrorKind::ArrayConversion("indexed array".into()).into())
            }
            _ => {
                let mut values = BTreeMap::new();
                if let Some(s) = self.value.try_as_str() {
                    values.insert(String::from("0"), s.to_string());
                }
                self.value = VariableValue::Associative(values);
                Ok(())
            }
        }
    }

    /// Assigns a value, optionally appending to the existing one. Readonly
    /// enforcement is handled a level up, where the variable's name is known.
    pub fn assign(&mut self, value: ValueLiteral, append: bool) -> Result<(), Error> {
        let value = self.convert_literal_for_assignment(value);

        if append {
            match (&self.value, &value) {
                (VariableValue::Unset(_), ValueLiteral::Array(_)) => {
                    self.value = VariableValue::Indexed(BTreeMap::new());
                }
                (VariableValue::Unset(UnsetKind::IndexedArray), _) => {
                    self.value = VariableValue::Indexed(BTreeMap::new());
                }
                (VariableValue::Unset(UnsetKind::AssociativeArray), _) => {
                    self.value = VariableValue::Associative(BTreeMap::new());
                }
                (VariableValue::Unset(_), ValueLiteral::Scalar(_)) => {
                    self.value = VariableValue::Scalar(String::new());
                }
                (VariableValue::Scalar(_), ValueLiteral::Array(_)) => {
                    self.convert_to_indexed_array()?;
                }
                _ => (),
            }

            let integer = self.integer;

            match &mut self.value {
                VariableValue::Scalar(base) => match value {
                    ValueLiteral::Scalar(suffix) => {
                        if integer {
                            let sum = base.parse::<i64>().unwrap_or(0)
                                + suffix.parse::<i64>().unwrap_or(0);
                            *base = sum.to_string();
                        } else {
                            base.push_str(suffix.as_str());
                        }
                        Ok(())
                    }
                    ValueLiteral::Array(_) => Ok(()),
                },
                VariableValue::Indexed(existing) => match value {
                    ValueLiteral::Scalar(s) => self.assign_at_index("0".into(), s, true),
                    ValueLiteral::Array(elements) => {
                        VariableValue::extend_indexed_from_literals(existing, elements);
                        Ok(())
                    }
                },
                VariableValue::Associative(existing) => match value {
                    ValueLiteral::Scalar(s) => self.assign_at_index("0".into(), s, true),
                    ValueLiteral::Array(elements) => {
                        VariableValue::extend_associative_from_literals(existing, elements)
                    }
                },
                VariableValue::Unset(_) => unreachable!("converted above"),
                VariableValue::Dynamic(_) => Ok(()),
            }
        } else {
            match (&self.value, value) {
                // A scalar assignment to an array updates element 0.
                (
                    VariableValue::Indexed(_)
                    | VariableValue::Associative(_)
                    | VariableValue::Unset(
                        UnsetKind::IndexedArray | UnsetKind::AssociativeArray,
                    ),
                    ValueLiteral::Scalar(s),
                ) => self.assign_at_index("0".into(), s, false),

                (
                    VariableValue::Indexed(_)
                    | VariableValue::Scalar(_)
                    | VariableValue::Unset(UnsetKind::Untyped | UnsetKind::IndexedArray)
                    | VariableValue::Dynamic(_),
                    ValueLiteral::Array(elements),
                ) => {
                    self.value = VariableValue::indexed_from_literals(elements);
                    Ok(())
                }

                (
                    VariableValue::Associative(_)
                    | VariableValue::Unset(UnsetKind::AssociativeArray),
                    ValueLiteral::Array(elements),
                ) => {
                    self.value = VariableValue::associative_from_literals(elements)?;
                    Ok(())
                }

                (VariableValue::Dynamic(_), ValueLiteral::Scalar(_)) => Ok(()),

                (
                    VariableValue::Scalar(_) | VariableValue::Unset(_),
                    ValueLiteral::Scalar(s),
                ) => {
                    self.value = VariableValue::Scalar(s);
                    Ok(())
                }
            }
        }
    }

    /// Assigns a value at an index within the variable, converting scalars to
    /// indexed arrays as needed.
    pub fn assign_at_index(
        &mut self,
        index: String,
        value: String,
        append: bool,
    ) -> Result<(), Error> {
        match &self.value {
            VariableValue::Unset(UnsetKind::AssociativeArray) => {
                self.value = VariableValue::Associative(BTreeMap::new());
            }
            VariableValue::Unset(_) => {
                self.value = VariableValue::Indexed(BTreeMap::new());
            }
            VariableValue::Scalar(_) => {
                self.convert_to_indexed_array()?;
            }
            _ => (),
        }

        let integer = self.integer;
        let value = self.convert_str_for_assignment(value);

        let combine = |existing: &str, new_value: String| {
            if integer {
                (existing.parse::<i64>().unwrap_or(0) + new_value.parse::<i64>().unwrap_or(0))
                    .to_string()
            } else {
                let mut combined = existing.to_owned();
                combined.push_str(new_value.as_str());
                combined
            }
        };

        match &mut self.value {
            VariableValue::Indexed(values) => {
                let key: u64 = index.parse().unwrap_or(0);
                if append {
                    let existing = values.get(&key).map_or("", |v| v.as_str());
                    let combined = combine(existing, value);
                    values.insert(key, combined);
                } else {
                    values.insert(key, value);
                }
                Ok(())
            }
            VariableValue::Associative(values) => {
                if append {
                    let existing = values.get(index.as_str()).map_or("", |v| v.as_str());
                    let combined = combine(existing, value);
                    values.insert(index, combined);
                } else {
                    values.insert(index, value);
                }
                Ok(())
            }
            _ => Err(ErrorKind::NotAnArray(index).into()),
        }
    }

    /// Unsets the value at the given index; returns whether anything was
    /// removed.
    pub fn unset_index(&mut self, index: &str) -> Result<bool, Error> {
        match &mut self.value {
            VariableValue::Unset(kind) => match kind {
                UnsetKind::Untyped => Err(ErrorKind::NotAnArray(index.to_owned()).into()),
                UnsetKind::IndexedArray | UnsetKind::AssociativeArray => Ok(false),
            },
            VariableValue::Scalar(_) | VariableValue::Dynamic(_) => {
                Err(ErrorKind::NotAnArray(index.to_owned()).into())
            }
            VariableValue::Associative(values) => Ok(values.remove(index).is_some()),
            VariableValue::Indexed(values) => {
                let key = index.parse::<u64>().unwrap_or(0);
                Ok(values.remove(&key).is_some())
            }
        }
    }

    /// Returns the attribute flag string (as shown by `declare -p` and
    /// `${var@a}`).
    pub fn attribute_flags(&self) -> String {
        let mut flags = String::new();

        if matches!(
            self.value,
            VariableValue::Indexed(_) | VariableValue::Unset(UnsetKind::IndexedArray)
        ) {
            flags.push('a');
        }
        if matches!(
            self.value,
            VariableValue::Associative(_) | VariableValue::Unset(UnsetKind::AssociativeArray)
        ) {
            flags.push('A');
        }
        if self.integer {
            flags.push('i');
        }
        if self.lowercase {
            flags.push('l');
        }
        if self.nameref {
            flags.push('n');
        }
        if self.readonly {
            flags.push('r');
        }
        if self.uppercase {
            flags.push('u');
        }
        if self.exported {
            flags.push('x');
        }

        flags
    }

    fn convert_literal_for_assignment(&self, value: ValueLiteral) -> ValueLiteral {
        match value {
            ValueLiteral::Scalar(s) => ValueLiteral::Scalar(self.convert_str_for_assignment(s)),
            ValueLiteral::Array(elements) => ValueLiteral::Array(ArrayLiteral(
                elements
                    .0
                    .into_iter()
                    .map(|(k, v)| (k, self.convert_str_for_assignment(v)))
                    .collect(),
            )),
        }
    }

    fn convert_str_for_assignment(&self, s: String) -> String {
        if self.integer {
            s.parse::<i64>().unwrap_or(0).to_string()
        } else if self.lowercase {
            s.to_lowercase()
        } else if self.uppercase {
            s.to_uppercase()
        } else {
            s
        }
    }
}

/// A shell value.
#[derive(Clone, Debug)]
pub enum VariableValue {
    /// Declared but not yet assigned.
    Unset(UnsetKind),
    /// A scalar string.
    Scalar(String),
    /// A sparse indexed array.
    Indexed(BTreeMap<u64, String>),
    /// An associative array.
    Associative(BTreeMap<String, String>),
    /// A value computed on every read (e.g. `RANDOM`).
    Dynamic(DynamicValueGetter),
}

/// The declared type of an unset value.
#[derive(Clone, Copy, Debug)]
pub enum UnsetKind {
    /// No type declared.
    Untyped,
    /// Declared with `-a`.
    IndexedArray,
    /// Declared with `-A`.
    AssociativeArray,
}

/// A literal used to assign a value.
#[derive(Clone, Debug)]
pub enum ValueLiteral {
    /// A scalar string.
    Scalar(String),
    /// An array literal.
    Array(ArrayLiteral),
}

impl Display for ValueLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(s) => {
                write!(f, "{}", escape::quote_if_needed(s, escape::QuoteMode::SingleQuote))
            }
            Self::Array(elements) => {
                write!(f, "(")?;
                for (i, (key, value)) in elements.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    if let Some(key) = key {
                        write!(f, "[{key}]=")?;
                    }
                    write!(
                        f,
                        "{}",
                        escape::quote_if_needed(value, escape::QuoteMode::SingleQuote)
                    )?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<&str> for ValueLiteral {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_owned())
    }
}

impl From<String> for ValueLiteral {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<String>> for ValueLiteral {
    fn from(values: Vec<String>) -> Self {
        Self::Array(ArrayLiteral(
            values.into_iter().map(|v| (None, v)).collect(),
        ))
    }
}

/// An array literal: a sequence of optionally-keyed elements.
#[derive(Clone, Debug, Default)]
pub struct ArrayLiteral(pub Vec<(Option<String>, String)>);

impl VariableValue {
    /// Returns whether the value is (typed as) an array.
    pub const fn is_array(&self) -> bool {
        matches!(
            self,
            Self::Indexed(_)
                | Self::Associative(_)
                | Self::Unset(UnsetKind::IndexedArray | UnsetKind::AssociativeArray)
        )
    }

    /// Returns whether the value is set.
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset(_))
    }

    /// Builds an indexed array from a sequence of strings.
    pub fn indexed_from_strings<S>(values: S) -> Self
    where
        S: IntoIterator<Item = String>,
    {
        let mut map = BTreeMap::new();
        for (i, value) in values.into_iter().enumerate() {
            map.insert(i as u64, value);
        }
        Self::Indexed(map)
    }

    /// Builds an indexed array from an array literal.
    pub fn indexed_from_literals(literal: ArrayLiteral) -> Self {
        let mut values = BTreeMap::new();
        Self::extend_indexed_from_literals(&mut values, literal);
        Self::Indexed(values)
    }

    fn extend_indexed_from_literals(
        existing: &mut BTreeMap<u64, String>,
        literal: ArrayLiteral,
    ) {
        let mut next_key = existing
            .last_key_value()
            .map_or(0, |(largest, _)| largest + 1);

        for (key, value) in literal.0 {
            if let Some(key) = key {
                next_key = key.parse().unwrap_or(0);
            }
            existing.insert(next_key, value);
            next_key += 1;
        }
    }

    /// Builds an associative array from an array literal.
    pub fn associative_from_literals(literal: ArrayLiteral) -> Result<Self, Error> {
        let mut values = BTreeMap::new();
        Self::extend_associative_from_literals(&mut values, literal)?;
        Ok(Self::Associative(values))
    }

    fn extend_associative_from_literals(
        existing: &mut BTreeMap<String, String>,
        literal: ArrayLiteral,
    ) -> Result<(), Error> {
        // Unkeyed elements pair up: value then key alternate.
        let mut pending_key = None;
        for (key, value) in literal.0 {
            if let Some(pending) = pending_key.take() {
                if key.is_some() {
                    return Err(ErrorKind::BadSubstitution(pending).into());
                }
                existing.insert(pending, value);
            } else if let Some(key) = key {
                existing.insert(key, value);
            } else {
                pending_key = Some(value);
            }
        }

        if let Some(pending) = pending_key {
            existing.insert(pending, String::new());
        }

        Ok(())
    }

    /// Tries to get the value at the given index.
    pub fn get_at(&self, index: &str) -> Result<Option<Cow<'_, str>>, Error> {
        match self {
            Self::Unset(_) | Self::Dynamic(_) => Ok(None),
            Self::Scalar(s) => {
                if index.parse::<u64>().unwrap_or(0) == 0 {
                    Ok(Some(Cow::Borrowed(s)))
                } else {
                    Ok(None)
                }
            }
            Self::Associative(values) => {
                Ok(values.get(index).map(|s| Cow::Borrowed(s.as_str())))
            }
            Self::Indexed(values) => {
                let mut index_value = index.parse::<i64>().unwrap_or(0);

                if index_value < 0 {
                    index_value += values.len() as i64;
                    if index_value < 0 {
                        return Err(ErrorKind::ArrayIndexOutOfRange(index_value).into());
                    }
                }

                #[allow(clippy::cast_sign_loss)]
                let index_value = index_value as u64;

                Ok(values.get(&index_value).map(|s| Cow::Borrowed(s.as_str())))
            }
        }
    }

    /// Returns the keys of the value's elements.
    pub fn element_keys(&self) -> Vec<String> {
        match self {
            Self::Unset(_) | Self::Dynamic(_) => vec![],
            Self::Scalar(_) => vec!["0".to_owned()],
            Self::Associative(values) => values.keys().cloned().collect(),
            Self::Indexed(values) => values.keys().map(|k| k.to_string()).collect(),
        }
    }

    /// Returns the values of the value's elements.
    pub fn element_values(&self) -> Vec<String> {
        match self {
            Self::Unset(_) | Self::Dynamic(_) => vec![],
            Self::Scalar(s) => vec![s.clone()],
            Self::Associative(values) => values.values().cloned().collect(),
            Self::Indexed(values) => values.values().cloned().collect(),
        }
    }

    /// Converts the value to a string, yielding the empty string when unset.
    pub fn as_str(&self) -> Cow<'_, str> {
        self.try_as_str().unwrap_or(Cow::Borrowed(""))
    }

    /// Tries to convert the value to a string; `None` when unset. Arrays
    /// yield their element at index 0.
    pub fn try_as_str(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Unset(_) | Self::Dynamic(_) => None,
            Self::Scalar(s) => Some(Cow::Borrowed(s.as_str())),
            Self::Associative(values) => values.get("0").map(|s| Cow::Borrowed(s.as_str())),
            Self::Indexed(values) => values.get(&0).map(|s| Cow::Borrowed(s.as_str())),
        }
    }

    /// Formats the value the way `declare -p` renders it.
    pub fn format_for_declare(&self) -> Result<String, Error> {
        match self {
            Self::Unset(_) | Self::Dynamic(_) => Ok(String::new()),
            Self::Scalar(s) => Ok(escape::force_quote(s, escape::QuoteMode::DoubleQuote)),
            Self::Associative(values) => {
                let mut result = String::from("(");
                for (key, value) in values {
                    let key = escape::quote_if_needed(key, escape::QuoteMode::DoubleQuote);
                    let value = escape::force_quote(value, escape::QuoteMode::DoubleQuote);
                    write!(result, "[{key}]={value} ")?;
                }
                result.push(')');
                Ok(result)
            }
            Self::Indexed(values) => {
                let mut result = String::from("(");
                for (i, (key, value)) in values.iter().enumerate() {
                    if i > 0 {
                        result.push(' ');
                    }
                    let value = escape::force_quote(value, escape::QuoteMode::DoubleQuote);
                    write!(result, "[{key}]={value}")?;
                }
                result.push(')');
                Ok(result)
            }
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_owned())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<String>> for VariableValue {
    fn from(values: Vec<String>) -> Self {
        Self::indexed_from_strings(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_assignment_and_append() {
        let mut var = Variable::new("ab");
        var.assign(ValueLiteral::Scalar("cd".into()), true).unwrap();
        assert_eq!(var.value().as_str(), "abcd");

        var.assign(ValueLiteral::Scalar("xy".into()), false)
            .unwrap();
        assert_eq!(var.value().as_str(), "xy");
    }

    #[test]
    fn integer_attribute_adds_on_append() {
        let mut var = Variable::new("10");
        var.set_integer(true);
        var.assign(ValueLiteral::Scalar("5".into()), true).unwrap();
        assert_eq!(var.value().as_str(), "15");
    }

    #[test]
    fn case_transform_attributes() {
        let mut var = Variable::new("");
        var.set_uppercase(true);
        var.assign(ValueLiteral::Scalar("hello".into()), false)
            .unwrap();
        assert_eq!(var.value().as_str(), "HELLO");

        var.set_lowercase(true);
        var.assign(ValueLiteral::Scalar("WORLD".into()), false)
            .unwrap();
        assert_eq!(var.value().as_str(), "world");
    }

    #[test]
    fn indexed_array_with_sparse_indices() {
        let mut var = Variable::new(VariableValue::indexed_from_literals(ArrayLiteral(vec![
            (None, "a".into()),
            (Some("5".into()), "b".into()),
            (None, "c".into()),
        ])));

        assert_eq!(var.value().element_keys(), ["0", "5", "6"]);

        var.assign_at_index("10".into(), "d".into(), false).unwrap();
        assert_eq!(var.value().get_at("10").unwrap().unwrap(), "d");
        assert_eq!(var.value().get_at("-1").unwrap().unwrap(), "d");
    }

    #[test]
    fn scalar_promotes_to_array_on_indexed_assignment() {
        let mut var = Variable::new("first");
        var.assign_at_index("1".into(), "second".into(), false)
            .unwrap();
        assert_eq!(var.value().element_values(), ["first", "second"]);
    }

    #[test]
    fn associative_literal_pairs() {
        let value = VariableValue::associative_from_literals(ArrayLiteral(vec![
            (Some("k1".into()), "v1".into()),
            (Some("k2".into()), "v2".into()),
        ]))
        .unwrap();

        assert_eq!(value.get_at("k2").unwrap().unwrap(), "v2");
    }

    #[test]
    fn unset_index_removes_element() {
        let mut var = Variable::new(VariableValue::indexed_from_strings(vec![
            "a".into(),
            "b".into(),
        ]));
        assert!(var.unset_index("0").unwrap());
        assert!(!var.unset_index("0").unwrap());
        assert_eq!(var.value().element_values(), ["b"]);
    }

    #[test]
    fn attribute_flags_render() {
        let mut var = Variable::new("x");
        var.export().set_readonly();
        assert_eq!(var.attribute_flags(), "rx");
    }
}
