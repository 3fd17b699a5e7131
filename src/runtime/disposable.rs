use super::environment::EnvRef;
use super::function::NativeFn;
use super::{Agent, EngineError, ErrorKind, ErrorType, JsResult, PropertyKey};
use crate::types::{JsValue, WellKnownSymbol};
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeHint {
    Sync,
    Async,
}

// DisposableResource Records
#[derive(Debug, Clone)]
pub struct DisposableResource {
    pub value: JsValue,
    pub hint: DisposeHint,
    /// `None` only for a nullish `await using` placeholder.
    pub dispose_method: Option<JsValue>,
}

// DisposeCapability Records
#[derive(Debug, Default, Clone)]
pub struct DisposeCapability {
    pub disposable_resource_stack: Vec<DisposableResource>,
}

impl DisposeCapability {
    pub fn is_empty(&self) -> bool {
        self.disposable_resource_stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.disposable_resource_stack.len()
    }
}

// NewDisposeCapability()
pub fn new_dispose_capability() -> DisposeCapability {
    DisposeCapability::default()
}

impl Agent {
    // AddDisposableResource(disposeCapability, V, hint [, method])
    pub fn add_disposable_resource(
        &mut self,
        capability: &mut DisposeCapability,
        value: JsValue,
        hint: DisposeHint,
        method: Option<JsValue>,
    ) -> JsResult<()> {
        let resource = match method {
            None => {
                if value.is_nullish() && hint == DisposeHint::Sync {
                    return Ok(());
                }
                self.create_disposable_resource(value, hint, None)?
            }
            Some(method) => {
                debug_assert!(value.is_undefined());
                self.create_disposable_resource(JsValue::Undefined, hint, Some(method))?
            }
        };
        capability.disposable_resource_stack.push(resource);
        Ok(())
    }

    /// Adds a resource to the capability owned by `env`.
    pub fn add_disposable_resource_to_environment(
        &mut self,
        env: &EnvRef,
        value: JsValue,
        hint: DisposeHint,
        method: Option<JsValue>,
    ) -> JsResult<()> {
        let mut scratch = new_dispose_capability();
        self.add_disposable_resource(&mut scratch, value, hint, method)?;
        env.borrow_mut()
            .dispose_capability_mut()
            .disposable_resource_stack
            .append(&mut scratch.disposable_resource_stack);
        Ok(())
    }

    // CreateDisposableResource(V, hint [, method])
    pub fn create_disposable_resource(
        &mut self,
        value: JsValue,
        hint: DisposeHint,
        method: Option<JsValue>,
    ) -> JsResult<DisposableResource> {
        let (value, method) = match method {
            Some(method) => {
                if !self.is_callable(&method) {
                    return self.throw_type_error(ErrorType::NotAFunction, &method.to_string());
                }
                (value, Some(method))
            }
            None if value.is_nullish() => (JsValue::Undefined, None),
            None => {
                if !value.is_object() {
                    return self.throw_type_error(ErrorType::NotAnObject, &value.to_string());
                }
                let Some(method) = self.get_dispose_method(&value, hint)? else {
                    return self.throw_type_error(ErrorType::NoDisposeMethod, &value.to_string());
                };
                (value, Some(method))
            }
        };
        Ok(DisposableResource {
            value,
            hint,
            dispose_method: method,
        })
    }

    // GetDisposeMethod(V, hint)
    pub fn get_dispose_method(&mut self, value: &JsValue, hint: DisposeHint) -> JsResult<Option<JsValue>> {
        let dispose_key = self.well_known_key(WellKnownSymbol::Dispose);
        if hint == DisposeHint::Sync {
            return self.get_method(value, &dispose_key);
        }
        let async_key = self.well_known_key(WellKnownSymbol::AsyncDispose);
        if let Some(method) = self.get_method(value, &async_key)? {
            return Ok(Some(method));
        }
        let Some(method) = self.get_method(value, &dispose_key)? else {
            return Ok(None);
        };
        // The sync result is never awaited and a throw only rejects the returned promise.
        let closure: NativeFn = Rc::new(move |agent, this, _| {
            let backend = agent.backend.clone();
            let capability = backend.new_promise_capability(agent)?;
            match agent.call(&method, this, &[]) {
                Ok(_) => {
                    agent.call(&capability.resolve, &JsValue::Undefined, &[JsValue::Undefined])?;
                }
                Err(EngineError::Throw(error)) => {
                    agent.call(&capability.reject, &JsValue::Undefined, &[error])?;
                }
                Err(termination) => return Err(termination),
            }
            Ok(JsValue::Object(capability.promise))
        });
        Ok(Some(JsValue::Object(self.create_builtin_function("", 0, closure))))
    }

    // Dispose(V, hint, method)
    pub fn dispose(&mut self, value: &JsValue, hint: DisposeHint, method: Option<&JsValue>) -> JsResult<JsValue> {
        let result = match method {
            None => JsValue::Undefined,
            Some(method) => self.call(method, value, &[])?,
        };
        if hint == DisposeHint::Async {
            let backend = self.backend.clone();
            backend.await_value(self, result)?;
        }
        Ok(JsValue::Undefined)
    }

    fn await_undefined(&mut self) -> JsResult<()> {
        let backend = self.backend.clone();
        match backend.await_value(self, JsValue::Undefined) {
            Err(EngineError::Termination(reason)) => Err(EngineError::Termination(reason)),
            _ => Ok(()),
        }
    }

    // DisposeResources(disposeCapability, completion)
    pub fn dispose_resources(
        &mut self,
        capability: &mut DisposeCapability,
        completion: JsResult<JsValue>,
    ) -> JsResult<JsValue> {
        let resources = std::mem::take(&mut capability.disposable_resource_stack);
        if resources.is_empty() {
            return completion;
        }
        debug!(count = resources.len(), "disposing resources");
        let mut completion = completion;
        let mut needs_await = false;
        let mut has_awaited = false;
        for resource in resources.into_iter().rev() {
            if resource.hint == DisposeHint::Sync && needs_await && !has_awaited {
                self.await_undefined()?;
                needs_await = false;
            }
            let Some(method) = &resource.dispose_method else {
                debug_assert_eq!(resource.hint, DisposeHint::Async);
                needs_await = true;
                continue;
            };
            let result = match self.call(method, &resource.value, &[]) {
                Ok(value) if resource.hint == DisposeHint::Async => {
                    has_awaited = true;
                    let backend = self.backend.clone();
                    backend.await_value(self, value)
                }
                other => other,
            };
            match result {
                Ok(_) => {}
                Err(EngineError::Termination(reason)) => return Err(EngineError::Termination(reason)),
                Err(EngineError::Throw(error)) => {
                    completion = match completion {
                        Err(EngineError::Throw(suppressed)) => {
                            debug!("disposal error suppresses an earlier throw");
                            Err(EngineError::Throw(self.create_suppressed_error(error, suppressed)?))
                        }
                        _ => Err(EngineError::Throw(error)),
                    };
                }
            }
        }
        if needs_await && !has_awaited {
            self.await_undefined()?;
        }
        completion
    }

    /// Disposes the resources registered on `env`, leaving its stack empty.
    pub fn dispose_environment_resources(&mut self, env: &EnvRef, completion: JsResult<JsValue>) -> JsResult<JsValue> {
        let mut capability = std::mem::take(env.borrow_mut().dispose_capability_mut());
        self.dispose_resources(&mut capability, completion)
    }

    fn create_suppressed_error(&mut self, error: JsValue, suppressed: JsValue) -> JsResult<JsValue> {
        let object = self.create_error_object(ErrorKind::SuppressedError);
        self.create_non_enumerable_data_property_or_throw(&object, &PropertyKey::from("error"), error)?;
        self.create_non_enumerable_data_property_or_throw(&object, &PropertyKey::from("suppressed"), suppressed)?;
        Ok(JsValue::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{is_error_of_kind, test_agent};
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    fn resource(agent: &mut Agent, log: &Log, name: &str, symbol: WellKnownSymbol, throws: bool) -> JsValue {
        let object = agent.object_create();
        let log = log.clone();
        let label = name.to_string();
        let method = agent.create_builtin_function(
            "dispose",
            0,
            Rc::new(move |_, _, _| {
                log.borrow_mut().push(label.clone());
                if throws {
                    return Err(EngineError::Throw(JsValue::string(&label)));
                }
                Ok(JsValue::Undefined)
            }),
        );
        let key = agent.well_known_key(symbol);
        object.borrow_mut().insert_builtin(key, JsValue::Object(method));
        JsValue::Object(object)
    }

    #[test]
    fn empty_capability_returns_completion_unchanged() {
        let (mut agent, _, _) = test_agent();
        let mut capability = new_dispose_capability();
        let result = agent.dispose_resources(&mut capability, Ok(JsValue::Number(4.0)));
        assert_eq!(result.unwrap(), JsValue::Number(4.0));
        let result = agent.dispose_resources(&mut capability, Err(EngineError::Throw(JsValue::Null)));
        assert_eq!(result.unwrap_err().thrown_value(), Some(&JsValue::Null));
    }

    #[test]
    fn resources_dispose_in_reverse_order() {
        let (mut agent, _, _) = test_agent();
        let log: Log = Rc::default();
        let mut capability = new_dispose_capability();
        for name in ["a", "b", "c"] {
            let value = resource(&mut agent, &log, name, WellKnownSymbol::Dispose, false);
            agent
                .add_disposable_resource(&mut capability, value, DisposeHint::Sync, None)
                .unwrap();
        }
        agent.dispose_resources(&mut capability, Ok(JsValue::Undefined)).unwrap();
        assert_eq!(*log.borrow(), vec!["c", "b", "a"]);
        assert!(capability.is_empty());
    }

    #[test]
    fn nullish_sync_resources_are_skipped() {
        let (mut agent, _, _) = test_agent();
        let mut capability = new_dispose_capability();
        agent
            .add_disposable_resource(&mut capability, JsValue::Null, DisposeHint::Sync, None)
            .unwrap();
        assert!(capability.is_empty());
        agent
            .add_disposable_resource(&mut capability, JsValue::Undefined, DisposeHint::Async, None)
            .unwrap();
        assert_eq!(capability.len(), 1);
    }

    #[test]
    fn non_object_and_methodless_values_are_type_errors() {
        let (mut agent, _, _) = test_agent();
        let mut capability = new_dispose_capability();
        let err = agent
            .add_disposable_resource(&mut capability, JsValue::Number(1.0), DisposeHint::Sync, None)
            .unwrap_err();
        assert!(is_error_of_kind(&mut agent, &err, "TypeError"));
        let plain = JsValue::Object(agent.object_create());
        let err = agent
            .add_disposable_resource(&mut capability, plain, DisposeHint::Sync, None)
            .unwrap_err();
        assert!(is_error_of_kind(&mut agent, &err, "TypeError"));
        assert!(capability.is_empty());
    }

    #[test]
    fn second_failure_wraps_the_first_in_suppressed_error() {
        let (mut agent, _, _) = test_agent();
        let log: Log = Rc::default();
        let mut capability = new_dispose_capability();
        for name in ["first", "second"] {
            let value = resource(&mut agent, &log, name, WellKnownSymbol::Dispose, true);
            agent
                .add_disposable_resource(&mut capability, value, DisposeHint::Sync, None)
                .unwrap();
        }
        let err = agent
            .dispose_resources(&mut capability, Ok(JsValue::Undefined))
            .unwrap_err();
        assert!(is_error_of_kind(&mut agent, &err, "SuppressedError"));
        let error = err.thrown_value().unwrap().as_object().unwrap().clone();
        assert_eq!(agent.get_property(&error, "error").unwrap(), JsValue::string("first"));
        assert_eq!(agent.get_property(&error, "suppressed").unwrap(), JsValue::string("second"));
        let desc = agent.get_own_property(&error, &PropertyKey::from("error")).unwrap();
        assert_eq!(desc.enumerable, Some(false));
        assert!(capability.is_empty());
    }

    #[test]
    fn async_placeholder_forces_a_single_await() {
        let (mut agent, backend, _) = test_agent();
        let log: Log = Rc::default();
        let mut capability = new_dispose_capability();
        let sync = resource(&mut agent, &log, "sync", WellKnownSymbol::Dispose, false);
        agent
            .add_disposable_resource(&mut capability, sync, DisposeHint::Sync, None)
            .unwrap();
        agent
            .add_disposable_resource(&mut capability, JsValue::Null, DisposeHint::Async, None)
            .unwrap();
        agent.dispose_resources(&mut capability, Ok(JsValue::Undefined)).unwrap();
        assert_eq!(*log.borrow(), vec!["sync"]);
        assert_eq!(*backend.awaited.borrow(), vec![JsValue::Undefined]);
    }

    #[test]
    fn trailing_await_when_only_placeholders() {
        let (mut agent, backend, _) = test_agent();
        let mut capability = new_dispose_capability();
        for _ in 0..2 {
            agent
                .add_disposable_resource(&mut capability, JsValue::Undefined, DisposeHint::Async, None)
                .unwrap();
        }
        agent.dispose_resources(&mut capability, Ok(JsValue::Undefined)).unwrap();
        assert_eq!(backend.awaited.borrow().len(), 1);
    }

    fn rejected_promise(agent: &mut Agent, reason: &str) -> JsValue {
        let promise = agent.object_create();
        agent.create_data_property(&promise, &PropertyKey::from("rejected"), JsValue::string(reason));
        JsValue::Object(promise)
    }

    fn async_resource(agent: &mut Agent, method: NativeFn) -> JsValue {
        let object = agent.object_create();
        let method = agent.create_builtin_function("asyncDispose", 0, method);
        let key = agent.well_known_key(WellKnownSymbol::AsyncDispose);
        object.borrow_mut().insert_builtin(key, JsValue::Object(method));
        JsValue::Object(object)
    }

    #[test]
    fn awaited_rejections_chain_into_suppressed_errors() {
        let (mut agent, backend, _) = test_agent();
        let mut capability = new_dispose_capability();
        for reason in ["late", "early"] {
            let value = async_resource(&mut agent, Rc::new(move |agent, _, _| Ok(rejected_promise(agent, reason))));
            agent
                .add_disposable_resource(&mut capability, value, DisposeHint::Async, None)
                .unwrap();
        }
        let err = agent
            .dispose_resources(&mut capability, Err(EngineError::Throw(JsValue::string("body"))))
            .unwrap_err();
        assert_eq!(backend.awaited.borrow().len(), 2);

        let outer = err.thrown_value().unwrap().as_object().unwrap().clone();
        assert!(is_error_of_kind(&mut agent, &err, "SuppressedError"));
        assert_eq!(agent.get_property(&outer, "error").unwrap(), JsValue::string("late"));
        let inner = agent.get_property(&outer, "suppressed").unwrap();
        let inner_error = EngineError::Throw(inner.clone());
        assert!(is_error_of_kind(&mut agent, &inner_error, "SuppressedError"));
        let inner = inner.as_object().unwrap().clone();
        assert_eq!(agent.get_property(&inner, "error").unwrap(), JsValue::string("early"));
        assert_eq!(agent.get_property(&inner, "suppressed").unwrap(), JsValue::string("body"));
    }

    #[test]
    fn awaiting_an_async_resource_satisfies_the_placeholder() {
        let (mut agent, backend, _) = test_agent();
        let log: Log = Rc::default();
        let mut capability = new_dispose_capability();
        let sync = resource(&mut agent, &log, "sync", WellKnownSymbol::Dispose, false);
        agent
            .add_disposable_resource(&mut capability, sync, DisposeHint::Sync, None)
            .unwrap();
        let asynchronous = async_resource(&mut agent, Rc::new(|_, _, _| Ok(JsValue::Number(7.0))));
        agent
            .add_disposable_resource(&mut capability, asynchronous, DisposeHint::Async, None)
            .unwrap();
        agent
            .add_disposable_resource(&mut capability, JsValue::Null, DisposeHint::Async, None)
            .unwrap();
        agent.dispose_resources(&mut capability, Ok(JsValue::Undefined)).unwrap();
        assert_eq!(*log.borrow(), vec!["sync"]);
        assert_eq!(*backend.awaited.borrow(), vec![JsValue::Number(7.0)]);
    }

    #[test]
    fn async_hint_falls_back_to_wrapped_sync_dispose() {
        let (mut agent, backend, _) = test_agent();
        let log: Log = Rc::default();
        let value = resource(&mut agent, &log, "wrapped", WellKnownSymbol::Dispose, true);
        let method = agent.get_dispose_method(&value, DisposeHint::Async).unwrap().unwrap();
        let promise = agent.call(&method, &value, &[]).unwrap();
        assert_eq!(*log.borrow(), vec!["wrapped"]);
        let promise = promise.as_object().unwrap().clone();
        assert_eq!(
            agent.get_property(&promise, "rejected").unwrap(),
            JsValue::string("wrapped")
        );
        assert!(backend.awaited.borrow().is_empty());
    }

    #[test]
    fn single_dispose_awaits_only_async_results() {
        let (mut agent, backend, _) = test_agent();
        let method = JsValue::Object(agent.create_builtin_function(
            "dispose",
            0,
            Rc::new(|_, _, _| Ok(JsValue::Number(9.0))),
        ));
        let value = JsValue::Object(agent.object_create());
        assert_eq!(
            agent.dispose(&value, DisposeHint::Sync, Some(&method)).unwrap(),
            JsValue::Undefined
        );
        assert!(backend.awaited.borrow().is_empty());
        agent.dispose(&value, DisposeHint::Async, Some(&method)).unwrap();
        agent.dispose(&JsValue::Undefined, DisposeHint::Async, None).unwrap();
        assert_eq!(
            *backend.awaited.borrow(),
            vec![JsValue::Number(9.0), JsValue::Undefined]
        );
    }

    #[test]
    fn environment_capability_is_drained() {
        let (mut agent, _, _) = test_agent();
        let log: Log = Rc::default();
        let env = crate::runtime::environment::new_declarative_environment(None);
        let value = resource(&mut agent, &log, "scoped", WellKnownSymbol::Dispose, false);
        agent
            .add_disposable_resource_to_environment(&env, value, DisposeHint::Sync, None)
            .unwrap();
        agent
            .dispose_environment_resources(&env, Ok(JsValue::Undefined))
            .unwrap();
        assert_eq!(*log.borrow(), vec!["scoped"]);
        assert!(env.borrow_mut().dispose_capability_mut().is_empty());
    }
}
