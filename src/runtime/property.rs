use super::helpers::same_value;
use crate::types::{JsObject, JsString, JsSymbol, JsValue};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(JsString),
    Symbol(JsSymbol),
    /// Canonical array index, `0..=2^32-2`.
    Index(u32),
}

impl PropertyKey {
    pub fn from_js_string(s: JsString) -> Self {
        match canonical_index(&s) {
            Some(index) => PropertyKey::Index(index),
            None => PropertyKey::String(s),
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, PropertyKey::Symbol(_))
    }

    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn to_js_string(&self) -> JsString {
        match self {
            PropertyKey::String(s) => s.clone(),
            PropertyKey::Index(i) => JsString::from_str(&i.to_string()),
            PropertyKey::Symbol(sym) => match &sym.description {
                Some(desc) => JsString::from_str(&format!("[{desc}]")),
                None => JsString::default(),
            },
        }
    }

    pub fn to_value(&self) -> JsValue {
        match self {
            PropertyKey::Symbol(sym) => JsValue::Symbol(sym.clone()),
            other => JsValue::String(other.to_js_string()),
        }
    }
}

fn canonical_index(s: &JsString) -> Option<u32> {
    let units = s.as_code_units();
    if units.is_empty() || units.len() > 10 {
        return None;
    }
    if units.len() > 1 && units[0] == u16::from(b'0') {
        return None;
    }
    let mut n: u64 = 0;
    for &unit in units {
        if !(u16::from(b'0')..=u16::from(b'9')).contains(&unit) {
            return None;
        }
        n = n * 10 + u64::from(unit - u16::from(b'0'));
    }
    // 2^32 - 1 is not an array index
    if n >= u64::from(u32::MAX) {
        return None;
    }
    Some(n as u32)
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::from_js_string(JsString::from_str(s))
    }
}

impl From<JsString> for PropertyKey {
    fn from(s: JsString) -> Self {
        PropertyKey::from_js_string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(index: u32) -> Self {
        if index == u32::MAX {
            PropertyKey::String(JsString::from_str(&index.to_string()))
        } else {
            PropertyKey::Index(index)
        }
    }
}

impl From<JsSymbol> for PropertyKey {
    fn from(sym: JsSymbol) -> Self {
        PropertyKey::Symbol(sym)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_js_string())
    }
}

/// A property descriptor whose fields are independently present or absent.
/// Descriptors stored on objects are always fully populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub get: Option<JsValue>,
    pub set: Option<JsValue>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    pub fn data(value: JsValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            get: None,
            set: None,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn data_default(value: JsValue) -> Self {
        Self::data(value, true, true, true)
    }

    pub fn accessor(
        get: Option<JsValue>,
        set: Option<JsValue>,
        enumerable: bool,
        configurable: bool,
    ) -> Self {
        Self {
            value: None,
            writable: None,
            get: Some(get.unwrap_or(JsValue::Undefined)),
            set: Some(set.unwrap_or(JsValue::Undefined)),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_generic_descriptor(&self) -> bool {
        !self.is_data_descriptor() && !self.is_accessor_descriptor()
    }

    /// True when no field is present at all.
    pub fn is_empty(&self) -> bool {
        self.is_generic_descriptor() && self.enumerable.is_none() && self.configurable.is_none()
    }

    pub fn is_fully_populated(&self) -> bool {
        let kind_complete = (self.value.is_some() && self.writable.is_some())
            || (self.get.is_some() && self.set.is_some());
        kind_complete && self.enumerable.is_some() && self.configurable.is_some()
    }

    pub(crate) fn is_configurable(&self) -> bool {
        self.configurable == Some(true)
    }

    pub(crate) fn is_enumerable(&self) -> bool {
        self.enumerable == Some(true)
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.writable == Some(true)
    }
}

// §10.1.6.2 IsCompatiblePropertyDescriptor(Extensible, Desc, Current)
pub fn is_compatible_property_descriptor(
    extensible: bool,
    desc: &PropertyDescriptor,
    current: Option<&PropertyDescriptor>,
) -> bool {
    validate_and_apply_property_descriptor(None, &PropertyKey::from(""), extensible, desc, current)
}

fn same_optional(candidate: &Option<JsValue>, current: &Option<JsValue>) -> bool {
    match (candidate, current) {
        (Some(a), Some(b)) => same_value(a, b),
        (Some(a), None) => a.is_undefined(),
        _ => true,
    }
}

// §10.1.6.3 ValidateAndApplyPropertyDescriptor(O, P, extensible, Desc, current)
pub fn validate_and_apply_property_descriptor(
    object: Option<&JsObject>,
    key: &PropertyKey,
    extensible: bool,
    desc: &PropertyDescriptor,
    current: Option<&PropertyDescriptor>,
) -> bool {
    let Some(current) = current else {
        if !extensible {
            return false;
        }
        if let Some(object) = object {
            let stored = if desc.is_accessor_descriptor() {
                PropertyDescriptor {
                    value: None,
                    writable: None,
                    get: Some(desc.get.clone().unwrap_or(JsValue::Undefined)),
                    set: Some(desc.set.clone().unwrap_or(JsValue::Undefined)),
                    enumerable: Some(desc.enumerable.unwrap_or(false)),
                    configurable: Some(desc.configurable.unwrap_or(false)),
                }
            } else {
                PropertyDescriptor {
                    value: Some(desc.value.clone().unwrap_or(JsValue::Undefined)),
                    writable: Some(desc.writable.unwrap_or(false)),
                    get: None,
                    set: None,
                    enumerable: Some(desc.enumerable.unwrap_or(false)),
                    configurable: Some(desc.configurable.unwrap_or(false)),
                }
            };
            object.borrow_mut().insert_property(key.clone(), stored);
        }
        return true;
    };

    debug_assert!(current.is_fully_populated());

    if desc.is_empty() {
        return true;
    }

    if !current.is_configurable() {
        if desc.configurable == Some(true) {
            return false;
        }
        if desc.enumerable.is_some() && desc.enumerable != current.enumerable {
            return false;
        }
        if !desc.is_generic_descriptor()
            && desc.is_accessor_descriptor() != current.is_accessor_descriptor()
        {
            return false;
        }
        if current.is_accessor_descriptor() {
            if !same_optional(&desc.get, &current.get) || !same_optional(&desc.set, &current.set) {
                return false;
            }
        } else if !current.is_writable() {
            if desc.writable == Some(true) {
                return false;
            }
            if !same_optional(&desc.value, &current.value) {
                return false;
            }
        }
    }

    if let Some(object) = object {
        let enumerable = desc.enumerable.or(current.enumerable);
        let configurable = desc.configurable.or(current.configurable);
        let updated = if current.is_data_descriptor() && desc.is_accessor_descriptor() {
            PropertyDescriptor {
                value: None,
                writable: None,
                get: Some(desc.get.clone().unwrap_or(JsValue::Undefined)),
                set: Some(desc.set.clone().unwrap_or(JsValue::Undefined)),
                enumerable,
                configurable,
            }
        } else if current.is_accessor_descriptor() && desc.is_data_descriptor() {
            PropertyDescriptor {
                value: Some(desc.value.clone().unwrap_or(JsValue::Undefined)),
                writable: Some(desc.writable.unwrap_or(false)),
                get: None,
                set: None,
                enumerable,
                configurable,
            }
        } else {
            PropertyDescriptor {
                value: desc.value.clone().or_else(|| current.value.clone()),
                writable: desc.writable.or(current.writable),
                get: desc.get.clone().or_else(|| current.get.clone()),
                set: desc.set.clone().or_else(|| current.set.clone()),
                enumerable,
                configurable,
            }
        };
        object.borrow_mut().insert_property(key.clone(), updated);
    }

    true
}
