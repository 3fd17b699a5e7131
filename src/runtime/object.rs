use super::environment::EnvRef;
use super::function::FunctionKind;
use super::property::validate_and_apply_property_descriptor;
use super::{Agent, ErrorType, JsResult, PropertyDescriptor, PropertyKey};
use crate::types::{JsObject, JsString, JsValue};
use rustc_hash::FxHashMap;

pub struct JsObjectData {
    pub properties: FxHashMap<PropertyKey, PropertyDescriptor>,
    pub property_order: Vec<PropertyKey>,
    pub prototype: Option<JsObject>,
    pub extensible: bool,
    pub class_name: String,
    pub callable: Option<FunctionKind>,
    pub primitive_value: Option<JsValue>,
    /// Mapped arguments objects alias indices to parameter bindings.
    pub parameter_map: Option<FxHashMap<u32, (EnvRef, String)>>,
}

impl Default for JsObjectData {
    fn default() -> Self {
        Self::new()
    }
}

impl JsObjectData {
    pub fn new() -> Self {
        Self {
            properties: FxHashMap::default(),
            property_order: Vec::new(),
            prototype: None,
            extensible: true,
            class_name: "Object".to_string(),
            callable: None,
            primitive_value: None,
            parameter_map: None,
        }
    }

    pub fn with_prototype(prototype: Option<JsObject>) -> Self {
        Self {
            prototype,
            ..Self::new()
        }
    }

    pub fn get_own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.properties.get(key).cloned()
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.properties.contains_key(key)
    }

    pub fn insert_property(&mut self, key: PropertyKey, desc: PropertyDescriptor) {
        if !self.properties.contains_key(&key) {
            self.property_order.push(key.clone());
        }
        self.properties.insert(key, desc);
    }

    pub fn insert_value(&mut self, key: PropertyKey, value: JsValue) {
        self.insert_property(key, PropertyDescriptor::data_default(value));
    }

    pub fn insert_builtin(&mut self, key: PropertyKey, value: JsValue) {
        self.insert_property(key, PropertyDescriptor::data(value, true, false, true));
    }

    pub fn remove_property(&mut self, key: &PropertyKey) -> bool {
        if self.properties.remove(key).is_some() {
            self.property_order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    // §10.1.11.1 OrdinaryOwnPropertyKeys
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        let mut indices: Vec<u32> = self
            .property_order
            .iter()
            .filter_map(PropertyKey::as_index)
            .collect();
        indices.sort_unstable();
        let mut keys: Vec<PropertyKey> = indices.into_iter().map(PropertyKey::Index).collect();
        keys.extend(
            self.property_order
                .iter()
                .filter(|k| matches!(k, PropertyKey::String(_)))
                .cloned(),
        );
        keys.extend(self.property_order.iter().filter(|k| k.is_symbol()).cloned());
        keys
    }

    fn mapped_binding(&self, key: &PropertyKey) -> Option<(EnvRef, String)> {
        let index = key.as_index()?;
        self.parameter_map.as_ref()?.get(&index).cloned()
    }

    fn unmap(&mut self, key: &PropertyKey) {
        if let (Some(map), Some(index)) = (self.parameter_map.as_mut(), key.as_index()) {
            map.remove(&index);
        }
    }
}

fn write_mapped(binding: &(EnvRef, String), value: &JsValue) {
    let (env, name) = binding;
    env.borrow_mut().set_declarative_value(name, value.clone());
}

impl Agent {
    pub fn ordinary_object_create(&self, prototype: Option<JsObject>) -> JsObject {
        JsObject::new(JsObjectData::with_prototype(prototype))
    }

    pub fn object_create(&self) -> JsObject {
        let prototype = self.current_realm().intrinsics.object_prototype.clone();
        self.ordinary_object_create(Some(prototype))
    }

    // §10.1.5 [[GetOwnProperty]], including §10.4.4.1 for mapped arguments
    pub fn get_own_property(&self, object: &JsObject, key: &PropertyKey) -> Option<PropertyDescriptor> {
        let data = object.borrow();
        let mut desc = data.get_own_property(key)?;
        if let Some((env, name)) = data.mapped_binding(key)
            && let Some(value) = env.borrow().declarative_value(&name)
        {
            desc.value = Some(value);
        }
        Some(desc)
    }

    pub fn is_extensible(&self, object: &JsObject) -> bool {
        object.borrow().extensible
    }

    // §10.1.6 [[DefineOwnProperty]], including §10.4.4.2 for mapped arguments
    pub fn define_own_property(
        &mut self,
        object: &JsObject,
        key: &PropertyKey,
        desc: PropertyDescriptor,
    ) -> bool {
        let current = self.get_own_property(object, key);
        let extensible = self.is_extensible(object);
        let mapped = object.borrow().mapped_binding(key);
        let Some(binding) = mapped else {
            return validate_and_apply_property_descriptor(
                Some(object),
                key,
                extensible,
                &desc,
                current.as_ref(),
            );
        };

        let mut new_desc = desc.clone();
        if desc.is_data_descriptor() && desc.value.is_none() && desc.writable == Some(false) {
            new_desc.value = binding.0.borrow().declarative_value(&binding.1);
        }
        if !validate_and_apply_property_descriptor(
            Some(object),
            key,
            extensible,
            &new_desc,
            current.as_ref(),
        ) {
            return false;
        }
        if desc.is_accessor_descriptor() {
            object.borrow_mut().unmap(key);
        } else {
            if let Some(value) = &desc.value {
                write_mapped(&binding, value);
            }
            if desc.writable == Some(false) {
                object.borrow_mut().unmap(key);
            }
        }
        true
    }

    // §7.3.8 DefinePropertyOrThrow
    pub fn define_property_or_throw(
        &mut self,
        object: &JsObject,
        key: &PropertyKey,
        desc: PropertyDescriptor,
    ) -> JsResult<()> {
        if !self.define_own_property(object, key, desc) {
            return self.throw_type_error(ErrorType::DescriptorNotApplied, &key.to_string());
        }
        Ok(())
    }

    // §7.3.5 CreateDataProperty
    pub fn create_data_property(&mut self, object: &JsObject, key: &PropertyKey, value: JsValue) -> bool {
        self.define_own_property(object, key, PropertyDescriptor::data_default(value))
    }

    pub fn create_non_enumerable_data_property_or_throw(
        &mut self,
        object: &JsObject,
        key: &PropertyKey,
        value: JsValue,
    ) -> JsResult<()> {
        self.define_property_or_throw(object, key, PropertyDescriptor::data(value, true, false, true))
    }

    // §10.1.7 [[HasProperty]]
    pub fn has_property(&self, object: &JsObject, key: &PropertyKey) -> bool {
        let mut current = object.clone();
        loop {
            if current.borrow().has_own_property(key) {
                return true;
            }
            let prototype = current.borrow().prototype.clone();
            match prototype {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    // §10.1.8 [[Get]]
    pub fn get(&mut self, object: &JsObject, key: &PropertyKey, receiver: &JsValue) -> JsResult<JsValue> {
        let mut current = object.clone();
        loop {
            if let Some(desc) = self.get_own_property(&current, key) {
                if desc.is_data_descriptor() {
                    return Ok(desc.value.unwrap_or(JsValue::Undefined));
                }
                return match desc.get {
                    Some(getter) if !getter.is_undefined() => self.call(&getter, receiver, &[]),
                    _ => Ok(JsValue::Undefined),
                };
            }
            let prototype = current.borrow().prototype.clone();
            match prototype {
                Some(p) => current = p,
                None => return Ok(JsValue::Undefined),
            }
        }
    }

    pub fn get_property(&mut self, object: &JsObject, key: &str) -> JsResult<JsValue> {
        self.get(object, &PropertyKey::from(key), &JsValue::Object(object.clone()))
    }

    // §10.1.9 [[Set]], including §10.4.4.4 for mapped arguments
    pub fn set(
        &mut self,
        object: &JsObject,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> JsResult<bool> {
        if receiver.as_object().is_some_and(|r| r.ptr_eq(object)) {
            let mapped = object.borrow().mapped_binding(key);
            if let Some(binding) = mapped {
                write_mapped(&binding, &value);
            }
        }

        let mut current = object.clone();
        let own_desc = loop {
            if let Some(desc) = self.get_own_property(&current, key) {
                break desc;
            }
            let prototype = current.borrow().prototype.clone();
            match prototype {
                Some(p) => current = p,
                None => break PropertyDescriptor::data_default(JsValue::Undefined),
            }
        };

        if own_desc.is_data_descriptor() {
            if !own_desc.is_writable() {
                return Ok(false);
            }
            let Some(receiver) = receiver.as_object() else {
                return Ok(false);
            };
            return Ok(match self.get_own_property(receiver, key) {
                Some(existing) => {
                    if existing.is_accessor_descriptor() || !existing.is_writable() {
                        false
                    } else {
                        let value_desc = PropertyDescriptor {
                            value: Some(value),
                            ..Default::default()
                        };
                        self.define_own_property(receiver, key, value_desc)
                    }
                }
                None => self.create_data_property(receiver, key, value),
            });
        }

        match own_desc.set {
            Some(setter) if !setter.is_undefined() => {
                self.call(&setter, receiver, &[value])?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // §10.1.10 [[Delete]], including §10.4.4.5 for mapped arguments
    pub fn delete(&mut self, object: &JsObject, key: &PropertyKey) -> bool {
        let mut data = object.borrow_mut();
        match data.get_own_property(key) {
            None => true,
            Some(desc) if desc.is_configurable() => {
                data.remove_property(key);
                data.unmap(key);
                true
            }
            Some(_) => false,
        }
    }

    pub fn own_property_keys(&self, object: &JsObject) -> Vec<PropertyKey> {
        object.borrow().own_property_keys()
    }

    /// Enumerable own string-keyed properties with their values, in key order.
    pub fn enumerable_own_string_entries(&mut self, object: &JsObject) -> JsResult<Vec<(JsString, JsValue)>> {
        let mut entries = Vec::new();
        for key in self.own_property_keys(object) {
            if key.is_symbol() {
                continue;
            }
            let Some(desc) = self.get_own_property(object, &key) else {
                continue;
            };
            if desc.is_enumerable() {
                let value = self.get(object, &key, &JsValue::Object(object.clone()))?;
                entries.push((key.to_js_string(), value));
            }
        }
        Ok(entries)
    }

    // §7.3.11 GetMethod
    pub fn get_method(&mut self, value: &JsValue, key: &PropertyKey) -> JsResult<Option<JsValue>> {
        let object = self.to_object(value)?;
        let func = self.get(&object, key, value)?;
        if func.is_nullish() {
            return Ok(None);
        }
        if !self.is_callable(&func) {
            return self.throw_type_error(ErrorType::NotAFunction, &key.to_string());
        }
        Ok(Some(func))
    }

    // §7.3.18 CreateArrayFromList
    pub fn create_array_from_list(&mut self, values: &[JsValue]) -> JsObject {
        let prototype = self.current_realm().intrinsics.array_prototype.clone();
        let mut data = JsObjectData::with_prototype(Some(prototype));
        data.class_name = "Array".to_string();
        for (index, value) in values.iter().enumerate() {
            data.insert_value(PropertyKey::from(index as u32), value.clone());
        }
        data.insert_property(
            PropertyKey::from("length"),
            PropertyDescriptor::data(JsValue::Number(values.len() as f64), true, false, false),
        );
        JsObject::new(data)
    }
}
