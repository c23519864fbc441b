//! Type conversion between host values and interpreter objects.
//!
//! Conversion is table driven: a [`Converter`] maps each [`TypeTag`] to a
//! [`ConversionRule`] holding an encoder (host to interpreter) and a decoder
//! (interpreter to host). Collections convert element by element and
//! recursively; a single failing element fails the whole value. A container
//! that holds itself, or one nested past [`MAX_DECODE_DEPTH`], fails to decode.
//!
//! Decoding only runs when the bridge is in auto-convert mode. Objects whose
//! type has no rule come back as [`Value::Object`] proxies.

use std::collections::HashMap;
use std::fmt;

use pyo3::prelude::*;
use pyo3::types::{
    PyBool, PyDict, PyFloat, PyFrozenSet, PyInt, PyList, PySet, PyString, PyTuple,
};
use pyo3::IntoPyObjectExt;

use crate::error::{BridgeResult, ConversionError, ForeignError};
use crate::proxy::ProxyObject;
use crate::session::SessionRef;

// ==================== Host Values ====================

/// A host-side value as seen by bridge callers.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Unordered. Equality ignores order and repeats; [`Value::set`] dedups.
    Set(Vec<Value>),
    /// Insertion ordered key/value pairs.
    Dict(Vec<(Value, Value)>),
    /// An interpreter object that was not (or could not be) decoded.
    Object(ProxyObject),
}

impl Value {
    /// A set of `items`, keeping the first of any equal elements.
    pub fn set<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        let mut members: Vec<Value> = Vec::new();
        for item in items {
            let item = item.into();
            if !members.contains(&item) {
                members.push(item);
            }
        }
        Value::Set(members)
    }

    /// Rule key for this value. Proxies pass through without a rule.
    pub fn tag(&self) -> Option<TypeTag> {
        match self {
            Value::None => Some(TypeTag::None),
            Value::Bool(_) => Some(TypeTag::Bool),
            Value::Int(_) => Some(TypeTag::Int),
            Value::Float(_) => Some(TypeTag::Float),
            Value::Str(_) => Some(TypeTag::Str),
            Value::List(_) => Some(TypeTag::List),
            Value::Tuple(_) => Some(TypeTag::Tuple),
            Value::Set(_) => Some(TypeTag::Set),
            Value::Dict(_) => Some(TypeTag::Dict),
            Value::Object(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.tag().map_or("object", TypeTag::name)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list, tuple or set.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ProxyObject> {
        match self {
            Value::Object(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ProxyObject> {
        match self {
            Value::Object(proxy) => Some(proxy),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => same_members(a, b),
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

fn same_members(a: &[Value], b: &[Value]) -> bool {
    a.iter().all(|item| b.contains(item)) && b.iter().all(|item| a.contains(item))
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::None
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<ProxyObject> for Value {
    fn from(proxy: ProxyObject) -> Self {
        Value::Object(proxy)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

// ==================== Type Tags ====================

/// Exact interpreter type a conversion rule is keyed on.
///
/// Subclasses never match: a `bool` is not an `int` here, and a user
/// subclass of `list` stays a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    None,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Set,
    FrozenSet,
    Dict,
}

impl TypeTag {
    pub const ALL: [TypeTag; 10] = [
        TypeTag::None,
        TypeTag::Bool,
        TypeTag::Int,
        TypeTag::Float,
        TypeTag::Str,
        TypeTag::List,
        TypeTag::Tuple,
        TypeTag::Set,
        TypeTag::FrozenSet,
        TypeTag::Dict,
    ];

    /// Classify an object by its exact type.
    pub fn of(obj: &Bound<'_, PyAny>) -> Option<Self> {
        let tag = if obj.is_none() {
            TypeTag::None
        } else if obj.is_exact_instance_of::<PyBool>() {
            TypeTag::Bool
        } else if obj.is_exact_instance_of::<PyInt>() {
            TypeTag::Int
        } else if obj.is_exact_instance_of::<PyFloat>() {
            TypeTag::Float
        } else if obj.is_exact_instance_of::<PyString>() {
            TypeTag::Str
        } else if obj.is_exact_instance_of::<PyList>() {
            TypeTag::List
        } else if obj.is_exact_instance_of::<PyTuple>() {
            TypeTag::Tuple
        } else if obj.is_exact_instance_of::<PySet>() {
            TypeTag::Set
        } else if obj.is_exact_instance_of::<PyFrozenSet>() {
            TypeTag::FrozenSet
        } else if obj.is_exact_instance_of::<PyDict>() {
            TypeTag::Dict
        } else {
            return None;
        };
        Some(tag)
    }

    /// Interpreter-side type name.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::None => "NoneType",
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::List => "list",
            TypeTag::Tuple => "tuple",
            TypeTag::Set => "set",
            TypeTag::FrozenSet => "frozenset",
            TypeTag::Dict => "dict",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ==================== Rules ====================

type EncodeFn = for<'py> fn(&Converter, Python<'py>, &Value) -> BridgeResult<Bound<'py, PyAny>>;
type DecodeFn =
    for<'py> fn(&mut Decoding<'_>, Python<'py>, Bound<'py, PyAny>) -> BridgeResult<Value>;

/// Containers nested deeper than this fail to decode.
pub const MAX_DECODE_DEPTH: usize = 128;

/// Encoder/decoder pair for one interpreter type.
#[derive(Clone, Copy)]
pub struct ConversionRule {
    tag: TypeTag,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl ConversionRule {
    pub fn tag(&self) -> TypeTag {
        self.tag
    }
}

impl fmt::Debug for ConversionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRule")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Rule table used for argument marshaling and auto-convert decoding.
#[derive(Debug, Clone)]
pub struct Converter {
    rules: HashMap<TypeTag, ConversionRule>,
}

impl Default for Converter {
    fn default() -> Self {
        let builtin = [
            rule(TypeTag::None, encode_none, decode_none),
            rule(TypeTag::Bool, encode_bool, decode_bool),
            rule(TypeTag::Int, encode_int, decode_int),
            rule(TypeTag::Float, encode_float, decode_float),
            rule(TypeTag::Str, encode_str, decode_str),
            rule(TypeTag::List, encode_list, decode_list),
            rule(TypeTag::Tuple, encode_tuple, decode_tuple),
            rule(TypeTag::Set, encode_set, decode_set),
            rule(TypeTag::FrozenSet, encode_set, decode_set),
            rule(TypeTag::Dict, encode_dict, decode_dict),
        ];
        Self {
            rules: builtin.into_iter().map(|r| (r.tag, r)).collect(),
        }
    }
}

fn rule(tag: TypeTag, encode: EncodeFn, decode: DecodeFn) -> ConversionRule {
    ConversionRule {
        tag,
        encode,
        decode,
    }
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the rule for `tag`; objects of that type decode to proxies
    /// and host values of that type can no longer be encoded.
    pub fn without(mut self, tag: TypeTag) -> Self {
        self.rules.remove(&tag);
        self
    }

    pub fn rule(&self, tag: TypeTag) -> Option<&ConversionRule> {
        self.rules.get(&tag)
    }

    /// Encode a host value into a new interpreter object.
    ///
    /// Proxies are passed through as their wrapped object.
    pub(crate) fn encode<'py>(
        &self,
        py: Python<'py>,
        value: &Value,
    ) -> BridgeResult<Bound<'py, PyAny>> {
        let Some(tag) = value.tag() else {
            return match value {
                Value::Object(proxy) => proxy.to_bound(py),
                _ => Err(ConversionError::encode(value.type_name(), "untagged value").into()),
            };
        };
        let rule = self
            .rules
            .get(&tag)
            .ok_or_else(|| ConversionError::encode(tag.name(), "no conversion rule registered"))?;
        (rule.encode)(self, py, value)
    }

    fn encode_all<'py>(
        &self,
        py: Python<'py>,
        items: &[Value],
    ) -> BridgeResult<Vec<Bound<'py, PyAny>>> {
        items.iter().map(|item| self.encode(py, item)).collect()
    }

    /// Positional arguments for a call.
    pub(crate) fn encode_args<'py>(
        &self,
        py: Python<'py>,
        args: &[Value],
    ) -> BridgeResult<Bound<'py, PyTuple>> {
        let items = self.encode_all(py, args)?;
        let args = PyTuple::new(py, items)
            .map_err(|e| encode_failure(py, TypeTag::Tuple, e))?;
        Ok(args)
    }

    /// Keyword arguments for a call; `None` when there are none.
    pub(crate) fn encode_kwargs<'py>(
        &self,
        py: Python<'py>,
        kwargs: &[(&str, Value)],
    ) -> BridgeResult<Option<Bound<'py, PyDict>>> {
        if kwargs.is_empty() {
            return Ok(None);
        }
        let dict = PyDict::new(py);
        for (name, value) in kwargs {
            let value = self.encode(py, value)?;
            dict.set_item(*name, value)
                .map_err(|e| encode_failure(py, TypeTag::Dict, e))?;
        }
        Ok(Some(dict))
    }

    /// Decode an owned object, wrapping it in a proxy when no rule applies.
    pub(crate) fn decode<'py>(
        &self,
        session: &SessionRef,
        py: Python<'py>,
        obj: Bound<'py, PyAny>,
    ) -> BridgeResult<Value> {
        Decoding::new(self, session).value(py, obj)
    }
}

/// One top-level decode.
///
/// Tracks the containers currently being walked so a container that holds
/// itself, directly or through others, fails instead of recursing forever.
pub(crate) struct Decoding<'a> {
    converter: &'a Converter,
    session: &'a SessionRef,
    active: Vec<usize>,
}

impl<'a> Decoding<'a> {
    fn new(converter: &'a Converter, session: &'a SessionRef) -> Self {
        Self {
            converter,
            session,
            active: Vec::new(),
        }
    }

    fn value<'py>(&mut self, py: Python<'py>, obj: Bound<'py, PyAny>) -> BridgeResult<Value> {
        let converter = self.converter;
        match TypeTag::of(&obj).and_then(|tag| converter.rules.get(&tag)) {
            Some(rule) => (rule.decode)(self, py, obj),
            None => Ok(Value::Object(self.session.wrap(obj)?)),
        }
    }

    /// Walk the container `obj`, decoding its contents with `walk`.
    fn nested<'py, R>(
        &mut self,
        tag: TypeTag,
        obj: &Bound<'py, PyAny>,
        walk: impl FnOnce(&mut Self) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let address = obj.as_ptr() as usize;
        if self.active.contains(&address) {
            return Err(ConversionError::decode(tag.name(), "recursive container").into());
        }
        if self.active.len() >= MAX_DECODE_DEPTH {
            return Err(ConversionError::decode(
                tag.name(),
                format!("nested deeper than {MAX_DECODE_DEPTH} levels"),
            )
            .into());
        }
        self.active.push(address);
        let result = walk(self);
        self.active.pop();
        result
    }

    fn elements<'py>(
        &mut self,
        py: Python<'py>,
        obj: &Bound<'py, PyAny>,
        tag: TypeTag,
    ) -> BridgeResult<Vec<Value>> {
        self.nested(tag, obj, |decoding| {
            let mut items = Vec::new();
            for item in obj.try_iter().map_err(|e| decode_failure(py, tag, e))? {
                let item = item.map_err(|e| decode_failure(py, tag, e))?;
                items.push(decoding.value(py, item)?);
            }
            Ok(items)
        })
    }
}

fn encode_failure(py: Python<'_>, tag: TypeTag, err: PyErr) -> ConversionError {
    ConversionError::encode(tag.name(), ForeignError::from_pyerr(py, err).to_string())
}

fn decode_failure(py: Python<'_>, tag: TypeTag, err: PyErr) -> ConversionError {
    ConversionError::decode(tag.name(), ForeignError::from_pyerr(py, err).to_string())
}

fn mismatch(tag: TypeTag, value: &Value) -> ConversionError {
    ConversionError::encode(
        tag.name(),
        format!("rule applied to a {} value", value.type_name()),
    )
}

// ==================== Encoders ====================

fn encode_none<'py>(_: &Converter, py: Python<'py>, _: &Value) -> BridgeResult<Bound<'py, PyAny>> {
    Ok(py.None().into_bound(py))
}

fn encode_bool<'py>(
    _: &Converter,
    py: Python<'py>,
    value: &Value,
) -> BridgeResult<Bound<'py, PyAny>> {
    let Value::Bool(b) = value else {
        return Err(mismatch(TypeTag::Bool, value).into());
    };
    Ok(PyBool::new(py, *b).to_owned().into_any())
}

fn encode_int<'py>(
    _: &Converter,
    py: Python<'py>,
    value: &Value,
) -> BridgeResult<Bound<'py, PyAny>> {
    let Value::Int(n) = value else {
        return Err(mismatch(TypeTag::Int, value).into());
    };
    n.into_bound_py_any(py)
        .map_err(|e| encode_failure(py, TypeTag::Int, e).into())
}

fn encode_float<'py>(
    _: &Converter,
    py: Python<'py>,
    value: &Value,
) -> BridgeResult<Bound<'py, PyAny>> {
    let Value::Float(f) = value else {
        return Err(mismatch(TypeTag::Float, value).into());
    };
    f.into_bound_py_any(py)
        .map_err(|e| encode_failure(py, TypeTag::Float, e).into())
}

fn encode_str<'py>(
    _: &Converter,
    py: Python<'py>,
    value: &Value,
) -> BridgeResult<Bound<'py, PyAny>> {
    let Value::Str(s) = value else {
        return Err(mismatch(TypeTag::Str, value).into());
    };
    Ok(PyString::new(py, s).into_any())
}

fn encode_list<'py>(
    conv: &Converter,
    py: Python<'py>,
    value: &Value,
) -> BridgeResult<Bound<'py, PyAny>> {
    let Value::List(items) = value else {
        return Err(mismatch(TypeTag::List, value).into());
    };
    let items = conv.encode_all(py, items)?;
    PyList::new(py, items)
        .map(Bound::into_any)
        .map_err(|e| encode_failure(py, TypeTag::List, e).into())
}

fn encode_tuple<'py>(
    conv: &Converter,
    py: Python<'py>,
    value: &Value,
) -> BridgeResult<Bound<'py, PyAny>> {
    let Value::Tuple(items) = value else {
        return Err(mismatch(TypeTag::Tuple, value).into());
    };
    let items = conv.encode_all(py, items)?;
    PyTuple::new(py, items)
        .map(Bound::into_any)
        .map_err(|e| encode_failure(py, TypeTag::Tuple, e).into())
}

fn encode_set<'py>(
    conv: &Converter,
    py: Python<'py>,
    value: &Value,
) -> BridgeResult<Bound<'py, PyAny>> {
    let Value::Set(items) = value else {
        return Err(mismatch(TypeTag::Set, value).into());
    };
    let items = conv.encode_all(py, items)?;
    PySet::new(py, items)
        .map(Bound::into_any)
        .map_err(|e| encode_failure(py, TypeTag::Set, e).into())
}

fn encode_dict<'py>(
    conv: &Converter,
    py: Python<'py>,
    value: &Value,
) -> BridgeResult<Bound<'py, PyAny>> {
    let Value::Dict(pairs) = value else {
        return Err(mismatch(TypeTag::Dict, value).into());
    };
    let dict = PyDict::new(py);
    for (key, item) in pairs {
        let key = conv.encode(py, key)?;
        let item = conv.encode(py, item)?;
        dict.set_item(key, item)
            .map_err(|e| encode_failure(py, TypeTag::Dict, e))?;
    }
    Ok(dict.into_any())
}

// ==================== Decoders ====================

fn decode_none(_: &mut Decoding<'_>, _: Python<'_>, _: Bound<'_, PyAny>) -> BridgeResult<Value> {
    Ok(Value::None)
}

fn decode_bool(_: &mut Decoding<'_>, py: Python<'_>, obj: Bound<'_, PyAny>) -> BridgeResult<Value> {
    obj.extract::<bool>()
        .map(Value::Bool)
        .map_err(|e| decode_failure(py, TypeTag::Bool, e.into()).into())
}

fn decode_int(_: &mut Decoding<'_>, py: Python<'_>, obj: Bound<'_, PyAny>) -> BridgeResult<Value> {
    obj.extract::<i64>()
        .map(Value::Int)
        .map_err(|e| decode_failure(py, TypeTag::Int, e.into()).into())
}

fn decode_float(
    _: &mut Decoding<'_>,
    py: Python<'_>,
    obj: Bound<'_, PyAny>,
) -> BridgeResult<Value> {
    obj.extract::<f64>()
        .map(Value::Float)
        .map_err(|e| decode_failure(py, TypeTag::Float, e.into()).into())
}

fn decode_str(_: &mut Decoding<'_>, py: Python<'_>, obj: Bound<'_, PyAny>) -> BridgeResult<Value> {
    obj.extract::<String>()
        .map(Value::Str)
        .map_err(|e| decode_failure(py, TypeTag::Str, e.into()).into())
}

fn decode_list<'py>(
    decoding: &mut Decoding<'_>,
    py: Python<'py>,
    obj: Bound<'py, PyAny>,
) -> BridgeResult<Value> {
    decoding.elements(py, &obj, TypeTag::List).map(Value::List)
}

fn decode_tuple<'py>(
    decoding: &mut Decoding<'_>,
    py: Python<'py>,
    obj: Bound<'py, PyAny>,
) -> BridgeResult<Value> {
    decoding
        .elements(py, &obj, TypeTag::Tuple)
        .map(Value::Tuple)
}

fn decode_set<'py>(
    decoding: &mut Decoding<'_>,
    py: Python<'py>,
    obj: Bound<'py, PyAny>,
) -> BridgeResult<Value> {
    decoding.elements(py, &obj, TypeTag::Set).map(Value::Set)
}

fn decode_dict<'py>(
    decoding: &mut Decoding<'_>,
    py: Python<'py>,
    obj: Bound<'py, PyAny>,
) -> BridgeResult<Value> {
    let dict = obj
        .cast_exact::<PyDict>()
        .map_err(|_| ConversionError::decode(TypeTag::Dict.name(), "object is not a dict"))?;
    decoding.nested(TypeTag::Dict, &obj, |decoding| {
        let mut pairs = Vec::with_capacity(dict.len());
        for (key, item) in dict.iter() {
            pairs.push((decoding.value(py, key)?, decoding.value(py, item)?));
        }
        Ok(Value::Dict(pairs))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from_host_types() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from("hi"), Value::Str("hi".into()));
        assert_eq!(Value::from(Some(1.5)), Value::Float(1.5));
        assert_eq!(Value::from(None::<bool>), Value::None);
        assert_eq!(
            Value::from(vec![1, 2]),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_value_tags() {
        assert_eq!(Value::Bool(true).tag(), Some(TypeTag::Bool));
        assert_eq!(Value::Set(vec![]).tag(), Some(TypeTag::Set));
        assert_eq!(Value::Dict(vec![]).type_name(), "dict");
        assert_eq!(Value::Tuple(vec![Value::None]).as_slice().map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_set_equality_ignores_order_and_repeats() {
        let fruit = Value::set(["pear", "apple", "fig"]);
        assert_eq!(fruit, Value::Set(vec!["fig".into(), "pear".into(), "apple".into()]));
        assert_eq!(Value::Set(vec![Value::Int(1), Value::Int(1)]), Value::set([1]));
        assert_ne!(fruit, Value::set(["pear", "apple"]));
        // Order still matters for the ordered containers.
        assert_ne!(Value::from(vec![1, 2]), Value::from(vec![2, 1]));
        assert_ne!(Value::List(vec![]), Value::Tuple(vec![]));
    }

    #[test]
    fn test_set_constructor_dedups() {
        let set = Value::set(vec![3, 1, 3, 2, 1]);
        assert_eq!(set.as_slice().map(<[_]>::len), Some(3));
    }

    #[test]
    fn test_type_tag_uses_exact_types() {
        crate::runtime::ensure_initialized(false);
        Python::attach(|py| {
            let cases = [
                (py.None().into_bound(py), Some(TypeTag::None)),
                (PyBool::new(py, true).to_owned().into_any(), Some(TypeTag::Bool)),
                (7i64.into_bound_py_any(py).unwrap(), Some(TypeTag::Int)),
                (2.5f64.into_bound_py_any(py).unwrap(), Some(TypeTag::Float)),
                (PyString::new(py, "x").into_any(), Some(TypeTag::Str)),
                (PyList::empty(py).into_any(), Some(TypeTag::List)),
                (PyDict::new(py).into_any(), Some(TypeTag::Dict)),
                (
                    PyFrozenSet::empty(py).unwrap().into_any(),
                    Some(TypeTag::FrozenSet),
                ),
                (py.get_type::<PyList>().into_any(), None),
            ];
            for (obj, expected) in cases {
                assert_eq!(TypeTag::of(&obj), expected);
            }
        });
    }

    #[test]
    fn test_without_removes_rule() {
        let conv = Converter::new().without(TypeTag::Dict);
        assert!(conv.rule(TypeTag::Dict).is_none());
        assert_eq!(conv.rule(TypeTag::List).map(ConversionRule::tag), Some(TypeTag::List));
    }

    #[test]
    fn test_encode_args_builds_tuple() {
        crate::runtime::ensure_initialized(false);
        Python::attach(|py| {
            let args = Converter::new()
                .encode_args(py, &[Value::Int(1), Value::from("two")])
                .unwrap();
            assert_eq!(args.len(), 2);
            let second: String = args.get_item(1).unwrap().extract().unwrap();
            assert_eq!(second, "two");
        });
    }

    #[test]
    fn test_encode_without_rule_fails() {
        crate::runtime::ensure_initialized(false);
        let conv = Converter::new().without(TypeTag::Int);
        Python::attach(|py| {
            let err = conv
                .encode(py, &Value::List(vec![Value::Int(1)]))
                .unwrap_err();
            assert!(err.to_string().contains("cannot encode int"));
        });
    }
}
