use super::{Agent, ErrorType, JsObjectData, JsResult, PropertyKey};
use crate::types::{JsObject, JsString, JsValue, WellKnownSymbol, number_ops};

pub(crate) fn same_value(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::same_value(*a, *b),
        _ => strict_equality(left, right),
    }
}

pub(crate) fn strict_equality(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Undefined, JsValue::Undefined) => true,
        (JsValue::Null, JsValue::Null) => true,
        (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
        (JsValue::Number(a), JsValue::Number(b)) => a == b,
        (JsValue::String(a), JsValue::String(b)) => a == b,
        (JsValue::Symbol(a), JsValue::Symbol(b)) => a == b,
        (JsValue::BigInt(a), JsValue::BigInt(b)) => a == b,
        (JsValue::Object(a), JsValue::Object(b)) => a.ptr_eq(b),
        _ => false,
    }
}

// §7.1.2 ToBoolean
pub(crate) fn to_boolean(val: &JsValue) -> bool {
    match val {
        JsValue::Undefined | JsValue::Null => false,
        JsValue::Boolean(b) => *b,
        JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
        JsValue::String(s) => !s.is_empty(),
        JsValue::BigInt(b) => b.value != num_bigint::BigInt::from(0),
        JsValue::Symbol(_) | JsValue::Object(_) => true,
    }
}

// §7.1.4.1.1 StringToNumber(str)
fn string_to_number(s: &JsString) -> f64 {
    let text = s.to_rust_string();
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}');
    if trimmed.is_empty() {
        return 0.0;
    }
    let prefixed = |radix| {
        let digits = &trimmed[2..];
        if digits.is_empty() {
            return f64::NAN;
        }
        digits
            .chars()
            .try_fold(0.0, |acc: f64, c| c.to_digit(radix).map(|d| acc * radix as f64 + d as f64))
            .unwrap_or(f64::NAN)
    };
    match trimmed.get(..2) {
        Some("0x" | "0X") => return prefixed(16),
        Some("0o" | "0O") => return prefixed(8),
        Some("0b" | "0B") => return prefixed(2),
        _ => {}
    }
    let unsigned = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    if unsigned == "Infinity" {
        return if trimmed.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    // StrUnsignedDecimalLiteral: digits, one '.', and an exponent part only.
    if !unsigned
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    String,
    Number,
}

impl Agent {
    // §7.1.1 ToPrimitive(input, preferredType)
    pub fn to_primitive(&mut self, input: &JsValue, preferred: PreferredType) -> JsResult<JsValue> {
        let JsValue::Object(object) = input else {
            return Ok(input.clone());
        };
        let key = self.well_known_key(WellKnownSymbol::ToPrimitive);
        if let Some(exotic) = self.get_method(input, &key)? {
            let hint = match preferred {
                PreferredType::String => "string",
                PreferredType::Number => "number",
            };
            let result = self.call(&exotic, input, &[JsValue::string(hint)])?;
            if result.is_object() {
                return self.throw_type_error(ErrorType::CannotConvertToString, "object");
            }
            return Ok(result);
        }
        // §7.1.1.1 OrdinaryToPrimitive
        let order = match preferred {
            PreferredType::String => ["toString", "valueOf"],
            PreferredType::Number => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get(object, &PropertyKey::from(name), input)?;
            if self.is_callable(&method) {
                let result = self.call(&method, input, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        self.throw_type_error(ErrorType::CannotConvertToString, "object")
    }

    // §7.1.17 ToString
    pub fn to_string(&mut self, value: &JsValue) -> JsResult<JsString> {
        match value {
            JsValue::String(s) => Ok(s.clone()),
            JsValue::Symbol(_) => self.throw_type_error(ErrorType::CannotConvertToString, "symbol"),
            JsValue::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::String)?;
                self.to_string(&primitive)
            }
            other => Ok(JsString::from_str(&other.to_string())),
        }
    }

    // §7.1.4 ToNumber
    pub fn to_number(&mut self, value: &JsValue) -> JsResult<f64> {
        match value {
            JsValue::Undefined => Ok(f64::NAN),
            JsValue::Null => Ok(0.0),
            JsValue::Boolean(b) => Ok(*b as u8 as f64),
            JsValue::Number(n) => Ok(*n),
            JsValue::String(s) => Ok(string_to_number(s)),
            JsValue::Symbol(_) | JsValue::BigInt(_) => {
                self.throw_type_error(ErrorType::CannotConvertToString, "number")
            }
            JsValue::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::Number)?;
                self.to_number(&primitive)
            }
        }
    }

    // §7.1.20 ToLength
    pub fn to_length(&mut self, value: &JsValue) -> JsResult<u64> {
        let n = self.to_number(value)?;
        if n.is_nan() || n <= 0.0 {
            return Ok(0);
        }
        Ok(n.trunc().min(9007199254740991.0) as u64)
    }

    // §7.1.18 ToObject
    pub fn to_object(&mut self, value: &JsValue) -> JsResult<JsObject> {
        let class_name = match value {
            JsValue::Object(o) => return Ok(o.clone()),
            JsValue::Undefined | JsValue::Null => {
                return self.throw_type_error(ErrorType::CannotConvertToObject, &value.to_string());
            }
            JsValue::Boolean(_) => "Boolean",
            JsValue::Number(_) => "Number",
            JsValue::String(_) => "String",
            JsValue::Symbol(_) => "Symbol",
            JsValue::BigInt(_) => "BigInt",
        };
        let prototype = self.current_realm().intrinsics.object_prototype.clone();
        let mut data = JsObjectData::with_prototype(Some(prototype));
        data.class_name = class_name.to_string();
        data.primitive_value = Some(value.clone());
        if let JsValue::String(s) = value {
            for (index, unit) in s.as_code_units().iter().enumerate() {
                data.insert_property(
                    PropertyKey::from(index as u32),
                    super::PropertyDescriptor::data(
                        JsValue::String(JsString::from_code_units(vec![*unit])),
                        false,
                        true,
                        false,
                    ),
                );
            }
            data.insert_property(
                PropertyKey::from("length"),
                super::PropertyDescriptor::data(JsValue::Number(s.len() as f64), false, false, false),
            );
        }
        Ok(JsObject::new(data))
    }

    // §7.2.1 RequireObjectCoercible
    pub fn require_object_coercible(&mut self, value: &JsValue) -> JsResult<()> {
        if value.is_nullish() {
            return self.throw_type_error(ErrorType::CannotConvertToObject, &value.to_string());
        }
        Ok(())
    }

    // §7.4.14 CreateIteratorResultObject(value, done)
    pub fn create_iter_result_object(&mut self, value: JsValue, done: bool) -> JsObject {
        let object = self.object_create();
        self.create_data_property(&object, &PropertyKey::from("value"), value);
        self.create_data_property(&object, &PropertyKey::from("done"), JsValue::Boolean(done));
        object
    }
}
