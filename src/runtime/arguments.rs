use super::environment::EnvRef;
use super::{Agent, JsObjectData, PropertyDescriptor, PropertyKey};
use crate::types::{JsObject, JsValue, WellKnownSymbol};
use rustc_hash::{FxHashMap, FxHashSet};

impl Agent {
    fn arguments_object_base(&self, arguments: &[JsValue]) -> JsObjectData {
        let realm = self.current_realm();
        let mut data = JsObjectData::with_prototype(Some(realm.intrinsics.object_prototype.clone()));
        data.class_name = "Arguments".to_string();
        for (index, value) in arguments.iter().enumerate() {
            data.insert_value(PropertyKey::Index(index as u32), value.clone());
        }
        data.insert_builtin(PropertyKey::from("length"), JsValue::Number(arguments.len() as f64));
        data.insert_builtin(
            self.well_known_key(WellKnownSymbol::Iterator),
            JsValue::Object(realm.intrinsics.array_prototype_values.clone()),
        );
        data
    }

    // §10.4.4.6 CreateUnmappedArgumentsObject(argumentsList)
    pub fn create_unmapped_arguments_object(&mut self, arguments: &[JsValue]) -> JsObject {
        let mut data = self.arguments_object_base(arguments);
        let thrower = JsValue::Object(self.current_realm().intrinsics.throw_type_error.clone());
        data.insert_property(
            PropertyKey::from("callee"),
            PropertyDescriptor::accessor(Some(thrower.clone()), Some(thrower), false, false),
        );
        JsObject::new(data)
    }

    // §10.4.4.7 CreateMappedArgumentsObject(func, formals, argumentsList, env)
    pub fn create_mapped_arguments_object(
        &mut self,
        function: &JsObject,
        formals: &[String],
        arguments: &[JsValue],
        env: &EnvRef,
    ) -> JsObject {
        let mut data = self.arguments_object_base(arguments);
        let mut mapped_names = FxHashSet::default();
        let mut parameter_map = FxHashMap::default();
        for (index, name) in formals.iter().enumerate().rev() {
            if !mapped_names.insert(name.as_str()) {
                continue;
            }
            if index < arguments.len() {
                parameter_map.insert(index as u32, (env.clone(), name.clone()));
            }
        }
        data.parameter_map = Some(parameter_map);
        data.insert_builtin(PropertyKey::from("callee"), JsValue::Object(function.clone()));
        JsObject::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::environment::new_declarative_environment;
    use crate::test_support::{function_decl, is_error_of_kind, test_agent};

    fn parameter_env(agent: &mut Agent, bindings: &[(&str, JsValue)]) -> EnvRef {
        let env = new_declarative_environment(None);
        for (name, value) in bindings {
            agent.create_mutable_binding(&env, name, false).unwrap();
            agent.initialize_binding(&env, name, value.clone()).unwrap();
        }
        env
    }

    #[test]
    fn unmapped_copies_arguments_and_poisons_callee() {
        let (mut agent, _, _) = test_agent();
        let object = agent.create_unmapped_arguments_object(&[JsValue::Number(1.0), JsValue::Number(2.0)]);
        assert_eq!(agent.get_property(&object, "length").unwrap(), JsValue::Number(2.0));
        assert_eq!(agent.get_property(&object, "1").unwrap(), JsValue::Number(2.0));
        let callee = agent.get_own_property(&object, &PropertyKey::from("callee")).unwrap();
        assert!(callee.is_accessor_descriptor());
        assert_eq!(callee.configurable, Some(false));
        let err = agent.get_property(&object, "callee").unwrap_err();
        assert!(is_error_of_kind(&mut agent, &err, "TypeError"));
        let iterator_key = agent.well_known_key(WellKnownSymbol::Iterator);
        let iterator = agent.get_own_property(&object, &iterator_key).unwrap();
        assert_eq!(iterator.enumerable, Some(false));
    }

    #[test]
    fn mapped_indices_track_bindings_both_ways() {
        let (mut agent, _, _) = test_agent();
        let global_env = agent.current_realm().global_env.clone();
        let f = agent.instantiate_function_object(&function_decl("f", &["a", "b"], vec![]), global_env, None);
        let env = parameter_env(&mut agent, &[("a", JsValue::Number(1.0)), ("b", JsValue::Number(2.0))]);
        let object = agent.create_mapped_arguments_object(
            &f,
            &["a".to_string(), "b".to_string()],
            &[JsValue::Number(1.0), JsValue::Number(2.0)],
            &env,
        );
        env.borrow_mut().set_declarative_value("a", JsValue::Number(10.0));
        assert_eq!(agent.get_property(&object, "0").unwrap(), JsValue::Number(10.0));

        let receiver = JsValue::Object(object.clone());
        agent
            .set(&object, &PropertyKey::Index(1), JsValue::Number(20.0), &receiver)
            .unwrap();
        assert_eq!(env.borrow().declarative_value("b"), Some(JsValue::Number(20.0)));
        assert_eq!(agent.get_property(&object, "callee").unwrap(), JsValue::Object(f));
    }

    #[test]
    fn duplicate_parameters_map_only_the_last_occurrence() {
        let (mut agent, _, _) = test_agent();
        let global_env = agent.current_realm().global_env.clone();
        let f = agent.instantiate_function_object(&function_decl("f", &["a", "a"], vec![]), global_env, None);
        let env = parameter_env(&mut agent, &[("a", JsValue::Number(20.0))]);
        let object = agent.create_mapped_arguments_object(
            &f,
            &["a".to_string(), "a".to_string()],
            &[JsValue::Number(10.0), JsValue::Number(20.0)],
            &env,
        );
        env.borrow_mut().set_declarative_value("a", JsValue::Number(30.0));
        assert_eq!(agent.get_property(&object, "0").unwrap(), JsValue::Number(10.0));
        assert_eq!(agent.get_property(&object, "1").unwrap(), JsValue::Number(30.0));
    }

    #[test]
    fn indices_past_the_argument_count_are_not_mapped() {
        let (mut agent, _, _) = test_agent();
        let global_env = agent.current_realm().global_env.clone();
        let f = agent.instantiate_function_object(&function_decl("f", &["a", "b"], vec![]), global_env, None);
        let env = parameter_env(&mut agent, &[("a", JsValue::Number(1.0)), ("b", JsValue::Undefined)]);
        let object = agent.create_mapped_arguments_object(
            &f,
            &["a".to_string(), "b".to_string()],
            &[JsValue::Number(1.0)],
            &env,
        );
        assert_eq!(object.borrow().parameter_map.as_ref().map(|m| m.len()), Some(1));
        assert_eq!(agent.get_property(&object, "1").unwrap(), JsValue::Undefined);
    }

    #[test]
    fn deleting_or_freezing_an_index_unmaps_it() {
        let (mut agent, _, _) = test_agent();
        let global_env = agent.current_realm().global_env.clone();
        let f = agent.instantiate_function_object(&function_decl("f", &["a", "b"], vec![]), global_env, None);
        let env = parameter_env(&mut agent, &[("a", JsValue::Number(1.0)), ("b", JsValue::Number(2.0))]);
        let object = agent.create_mapped_arguments_object(
            &f,
            &["a".to_string(), "b".to_string()],
            &[JsValue::Number(1.0), JsValue::Number(2.0)],
            &env,
        );
        assert!(agent.delete(&object, &PropertyKey::Index(0)));
        let frozen = PropertyDescriptor {
            value: Some(JsValue::Number(5.0)),
            writable: Some(false),
            ..Default::default()
        };
        assert!(agent.define_own_property(&object, &PropertyKey::Index(1), frozen));
        assert_eq!(env.borrow().declarative_value("b"), Some(JsValue::Number(5.0)));
        env.borrow_mut().set_declarative_value("b", JsValue::Number(6.0));
        assert_eq!(agent.get_property(&object, "1").unwrap(), JsValue::Number(5.0));
        assert!(object.borrow().parameter_map.as_ref().unwrap().is_empty());
    }
}
