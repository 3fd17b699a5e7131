use super::environment::{EnvRef, new_global_environment};
use super::eval::{CallerMode, EvalMode};
use super::function::{NativeFn, make_native_function};
use super::{ErrorType, JsObjectData, PropertyDescriptor, PropertyKey};
use crate::types::{JsObject, JsValue};
use std::cell::Cell;
use std::rc::Rc;

/// The intrinsic objects the core consults directly.
#[derive(Clone)]
pub struct Intrinsics {
    pub object_prototype: JsObject,
    pub function_prototype: JsObject,
    pub array_prototype: JsObject,
    pub error_prototype: JsObject,
    pub type_error_prototype: JsObject,
    pub syntax_error_prototype: JsObject,
    pub reference_error_prototype: JsObject,
    pub range_error_prototype: JsObject,
    pub suppressed_error_prototype: JsObject,
    /// %ThrowTypeError%
    pub throw_type_error: JsObject,
    /// %Array.prototype.values%
    pub array_prototype_values: JsObject,
    /// %eval%
    pub eval: JsObject,
}

pub struct Realm {
    pub global_object: JsObject,
    pub global_env: EnvRef,
    pub intrinsics: Intrinsics,
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm").finish_non_exhaustive()
    }
}

fn error_prototype(name: &str, parent: &JsObject) -> JsObject {
    let mut data = JsObjectData::with_prototype(Some(parent.clone()));
    data.class_name = "Error".to_string();
    data.insert_builtin(PropertyKey::from("name"), JsValue::string(name));
    data.insert_builtin(PropertyKey::from("message"), JsValue::string(""));
    JsObject::new(data)
}

fn array_values_iterator(array: JsObject, function_prototype: &JsObject, object_prototype: &JsObject) -> JsObject {
    let index = Cell::new(0u32);
    let next: NativeFn = Rc::new(move |agent, _, _| {
        let length = agent.get_property(&array, "length")?;
        let length = agent.to_length(&length)?;
        let current = index.get();
        if u64::from(current) >= length {
            return Ok(JsValue::Object(agent.create_iter_result_object(JsValue::Undefined, true)));
        }
        let value = agent.get(&array, &PropertyKey::Index(current), &JsValue::Object(array.clone()))?;
        index.set(current + 1);
        Ok(JsValue::Object(agent.create_iter_result_object(value, false)))
    });
    let next = make_native_function("next", 0, Some(function_prototype.clone()), next);
    let mut data = JsObjectData::with_prototype(Some(object_prototype.clone()));
    data.class_name = "Array Iterator".to_string();
    data.insert_builtin(PropertyKey::from("next"), JsValue::Object(next));
    JsObject::new(data)
}

impl Realm {
    // §9.3.1 CreateRealm, followed by §9.3.3 SetDefaultGlobalBindings
    pub fn create() -> Rc<Realm> {
        let object_prototype = JsObject::new(JsObjectData::new());
        let function_prototype = make_native_function(
            "",
            0,
            Some(object_prototype.clone()),
            Rc::new(|_, _, _| Ok(JsValue::Undefined)),
        );
        let mut array_data = JsObjectData::with_prototype(Some(object_prototype.clone()));
        array_data.class_name = "Array".to_string();
        array_data.insert_property(
            PropertyKey::from("length"),
            PropertyDescriptor::data(JsValue::Number(0.0), true, false, false),
        );
        let array_prototype = JsObject::new(array_data);

        let error_proto = error_prototype("Error", &object_prototype);
        let type_error_prototype = error_prototype("TypeError", &error_proto);
        let syntax_error_prototype = error_prototype("SyntaxError", &error_proto);
        let reference_error_prototype = error_prototype("ReferenceError", &error_proto);
        let range_error_prototype = error_prototype("RangeError", &error_proto);
        let suppressed_error_prototype = error_prototype("SuppressedError", &error_proto);

        // §10.2.4.1 %ThrowTypeError%
        let throw_type_error = make_native_function(
            "",
            0,
            Some(function_prototype.clone()),
            Rc::new(|agent, _, _| agent.throw_type_error(ErrorType::CalleeAccess, "")),
        );
        {
            let mut data = throw_type_error.borrow_mut();
            for key in ["length", "name"] {
                if let Some(mut desc) = data.get_own_property(&PropertyKey::from(key)) {
                    desc.configurable = Some(false);
                    data.insert_property(PropertyKey::from(key), desc);
                }
            }
            data.extensible = false;
        }

        // §23.1.3.40 Array.prototype.values
        let function_proto = function_prototype.clone();
        let object_proto = object_prototype.clone();
        let array_prototype_values = make_native_function(
            "values",
            0,
            Some(function_prototype.clone()),
            Rc::new(move |agent, this, _| {
                let array = agent.to_object(this)?;
                Ok(JsValue::Object(array_values_iterator(array, &function_proto, &object_proto)))
            }),
        );
        array_prototype
            .borrow_mut()
            .insert_builtin(PropertyKey::from("values"), JsValue::Object(array_prototype_values.clone()));

        // §19.2.1 eval(x)
        let eval = make_native_function(
            "eval",
            1,
            Some(function_prototype.clone()),
            Rc::new(|agent, _, args| {
                let x = args.first().cloned().unwrap_or(JsValue::Undefined);
                agent.perform_eval(&x, CallerMode::NonStrict, EvalMode::Indirect)
            }),
        );

        let global_object = JsObject::new(JsObjectData::with_prototype(Some(object_prototype.clone())));
        {
            let mut global = global_object.borrow_mut();
            for (name, value) in [
                ("undefined", JsValue::Undefined),
                ("NaN", JsValue::Number(f64::NAN)),
                ("Infinity", JsValue::Number(f64::INFINITY)),
            ] {
                global.insert_property(
                    PropertyKey::from(name),
                    PropertyDescriptor::data(value, false, false, false),
                );
            }
            global.insert_builtin(PropertyKey::from("globalThis"), JsValue::Object(global_object.clone()));
            global.insert_builtin(PropertyKey::from("eval"), JsValue::Object(eval.clone()));
        }
        let global_env = new_global_environment(global_object.clone(), global_object.clone());

        Rc::new(Realm {
            global_object,
            global_env,
            intrinsics: Intrinsics {
                object_prototype,
                function_prototype,
                array_prototype,
                error_prototype: error_proto,
                type_error_prototype,
                syntax_error_prototype,
                reference_error_prototype,
                range_error_prototype,
                suppressed_error_prototype,
                throw_type_error,
                array_prototype_values,
                eval,
            },
        })
    }
}
