use crate::runtime::JsObjectData;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub enum JsValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(JsString),
    Symbol(JsSymbol),
    BigInt(JsBigInt),
    Object(JsObject),
}

// §6.1.4 The String Type: a sequence of UTF-16 code units
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsString {
    pub code_units: Vec<u16>,
}

impl JsString {
    pub fn from_str(s: &str) -> Self {
        Self {
            code_units: s.encode_utf16().collect(),
        }
    }

    pub fn from_code_units(code_units: Vec<u16>) -> Self {
        Self { code_units }
    }

    pub fn is_empty(&self) -> bool {
        self.code_units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.code_units.len()
    }

    pub fn as_code_units(&self) -> &[u16] {
        &self.code_units
    }

    pub fn to_rust_string(&self) -> String {
        String::from_utf16_lossy(&self.code_units)
    }

    // §6.1.4.1 StringIndexOf(string, searchValue, fromIndex)
    pub fn index_of(&self, search: &JsString, from: usize) -> Option<usize> {
        index_of_units(&self.code_units, &search.code_units, from)
    }

    pub fn slice_utf16(&self, start: usize, end: usize) -> JsString {
        let s = start.min(self.code_units.len());
        let e = end.min(self.code_units.len());
        if s >= e {
            return JsString { code_units: vec![] };
        }
        JsString {
            code_units: self.code_units[s..e].to_vec(),
        }
    }
}

pub(crate) fn index_of_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    let s_len = haystack.len();
    let search_len = needle.len();
    if search_len == 0 {
        return if from <= s_len { Some(from) } else { None };
    }
    if from + search_len > s_len {
        return None;
    }
    (from..=(s_len - search_len)).find(|&i| haystack[i..i + search_len] == needle[..])
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rust_string())
    }
}

/// Symbols compare by identity; the description is informational only.
#[derive(Clone, Debug)]
pub struct JsSymbol {
    pub id: u64,
    pub description: Option<JsString>,
}

impl PartialEq for JsSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JsSymbol {}

impl Hash for JsSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// Well-known symbols (§6.1.5.1), limited to the ones this core consults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WellKnownSymbol {
    Iterator,
    ToPrimitive,
    Unscopables,
    Dispose,
    AsyncDispose,
}

impl WellKnownSymbol {
    pub const ALL: [WellKnownSymbol; 5] = [
        WellKnownSymbol::Iterator,
        WellKnownSymbol::ToPrimitive,
        WellKnownSymbol::Unscopables,
        WellKnownSymbol::Dispose,
        WellKnownSymbol::AsyncDispose,
    ];

    pub fn description(self) -> &'static str {
        match self {
            WellKnownSymbol::Iterator => "Symbol.iterator",
            WellKnownSymbol::ToPrimitive => "Symbol.toPrimitive",
            WellKnownSymbol::Unscopables => "Symbol.unscopables",
            WellKnownSymbol::Dispose => "Symbol.dispose",
            WellKnownSymbol::AsyncDispose => "Symbol.asyncDispose",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JsBigInt {
    pub value: num_bigint::BigInt,
}

/// A shared handle to a heap object. Equality is identity.
#[derive(Clone)]
pub struct JsObject(Rc<RefCell<JsObjectData>>);

impl JsObject {
    pub fn new(data: JsObjectData) -> Self {
        Self(Rc::new(RefCell::new(data)))
    }

    pub fn borrow(&self) -> Ref<'_, JsObjectData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, JsObjectData> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &JsObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for JsObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => write!(f, "JsObject({})", data.class_name),
            Err(_) => write!(f, "JsObject(<borrowed>)"),
        }
    }
}

impl JsValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsValue::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, JsValue::String(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsValue::Object(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            JsValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn string(s: &str) -> Self {
        JsValue::String(JsString::from_str(s))
    }
}

impl From<JsObject> for JsValue {
    fn from(object: JsObject) -> Self {
        JsValue::Object(object)
    }
}

// §6.1.6.1 Number type operations
pub mod number_ops {
    pub fn same_value(x: f64, y: f64) -> bool {
        if x.is_nan() && y.is_nan() {
            return true;
        }
        if x == 0.0 && y == 0.0 {
            return x.is_sign_positive() == y.is_sign_positive();
        }
        x == y
    }

    pub fn to_string(x: f64) -> String {
        if x.is_nan() {
            return "NaN".to_string();
        }
        if x == 0.0 {
            return "0".to_string();
        }
        if x.is_infinite() {
            return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
        }
        // shortest round-trip digits, formatted as Number::toString
        let mut buf = ryu_js::Buffer::new();
        buf.format(x).to_string()
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(b) => write!(f, "{b}"),
            JsValue::Number(n) => write!(f, "{}", number_ops::to_string(*n)),
            JsValue::String(s) => write!(f, "{s}"),
            JsValue::Symbol(s) => {
                if let Some(desc) = &s.description {
                    write!(f, "Symbol({desc})")
                } else {
                    write!(f, "Symbol()")
                }
            }
            JsValue::BigInt(b) => write!(f, "{}n", b.value),
            JsValue::Object(o) => match o.0.try_borrow() {
                Ok(data) if data.callable.is_some() => write!(f, "[function]"),
                _ => write!(f, "[object Object]"),
            },
        }
    }
}
