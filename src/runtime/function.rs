use super::call::{ExecutionContext, ScriptOrModule};
use super::environment::{EnvRef, PrivateEnvRef, new_function_environment};
use super::host::Executable;
use super::realm::{Intrinsics, Realm};
use super::{Agent, ErrorType, JsObjectData, JsResult, PropertyDescriptor, PropertyKey};
use crate::ast::FunctionDecl;
use crate::types::{JsObject, JsValue};
use std::fmt;
use std::rc::Rc;

pub type NativeFn = Rc<dyn Fn(&mut Agent, &JsValue, &[JsValue]) -> JsResult<JsValue>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThisMode {
    Lexical,
    Strict,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorKind {
    Base,
    Derived,
}

#[derive(Clone)]
pub struct OrdinaryFunction {
    pub code: Rc<FunctionDecl>,
    pub environment: EnvRef,
    pub private_environment: Option<PrivateEnvRef>,
    pub realm: Rc<Realm>,
    pub script_or_module: Option<ScriptOrModule>,
    pub this_mode: ThisMode,
    pub strict: bool,
    /// `None` for functions that cannot be constructed.
    pub constructor_kind: Option<ConstructorKind>,
    pub is_class_constructor: bool,
    pub home_object: Option<JsObject>,
    /// Set on the synthetic functions that evaluate class field initializers.
    pub class_field_initializer_name: Option<PropertyKey>,
    pub executable: Option<Rc<Executable>>,
}

#[derive(Clone)]
pub struct BoundFunction {
    pub target: JsObject,
    pub bound_this: JsValue,
    pub bound_arguments: Vec<JsValue>,
}

/// A proxy around a callable target. Both slots are cleared on revocation.
#[derive(Clone)]
pub struct ProxyFunction {
    pub target: Option<JsObject>,
    pub handler: Option<JsObject>,
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub length: u32,
    pub behavior: NativeFn,
    pub is_constructor: bool,
    /// `None` for intrinsics, which run in the caller's realm.
    pub realm: Option<Rc<Realm>>,
}

#[derive(Clone)]
pub enum FunctionKind {
    Ordinary(Box<OrdinaryFunction>),
    Bound(BoundFunction),
    Proxy(ProxyFunction),
    Native(NativeFunction),
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Ordinary(o) => write!(f, "Ordinary({})", o.code.name),
            FunctionKind::Bound(_) => write!(f, "Bound"),
            FunctionKind::Proxy(_) => write!(f, "Proxy"),
            FunctionKind::Native(n) => write!(f, "Native({})", n.name),
        }
    }
}

/// Builds a native function object without consulting any agent state.
pub(crate) fn make_native_function(
    name: &str,
    length: u32,
    prototype: Option<JsObject>,
    behavior: NativeFn,
) -> JsObject {
    let mut data = JsObjectData::with_prototype(prototype);
    data.class_name = "Function".to_string();
    data.callable = Some(FunctionKind::Native(NativeFunction {
        name: name.to_string(),
        length,
        behavior,
        is_constructor: false,
        realm: None,
    }));
    data.insert_property(
        PropertyKey::from("length"),
        PropertyDescriptor::data(JsValue::Number(length as f64), false, false, true),
    );
    data.insert_property(
        PropertyKey::from("name"),
        PropertyDescriptor::data(JsValue::string(name), false, false, true),
    );
    JsObject::new(data)
}

impl Agent {
    // §7.2.3 IsCallable
    pub fn is_callable(&self, value: &JsValue) -> bool {
        value.as_object().is_some_and(|o| o.borrow().callable.is_some())
    }

    // §7.2.4 IsConstructor
    pub fn is_constructor(&self, value: &JsValue) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };
        let kind = object.borrow().callable.clone();
        match kind {
            None => false,
            Some(FunctionKind::Ordinary(f)) => f.constructor_kind.is_some(),
            Some(FunctionKind::Native(n)) => n.is_constructor,
            Some(FunctionKind::Bound(b)) => self.is_constructor(&JsValue::Object(b.target)),
            Some(FunctionKind::Proxy(p)) => p
                .target
                .is_some_and(|t| self.is_constructor(&JsValue::Object(t))),
        }
    }

    // §7.3.24 GetFunctionRealm(obj)
    pub fn get_function_realm(&mut self, object: &JsObject) -> JsResult<Rc<Realm>> {
        let kind = object.borrow().callable.clone();
        match kind {
            Some(FunctionKind::Ordinary(f)) => Ok(f.realm.clone()),
            Some(FunctionKind::Native(n)) => Ok(n.realm.unwrap_or_else(|| self.current_realm())),
            Some(FunctionKind::Bound(b)) => self.get_function_realm(&b.target),
            Some(FunctionKind::Proxy(p)) => match p.target {
                Some(target) => self.get_function_realm(&target),
                None => self.throw_type_error(ErrorType::ProxyRevoked, ""),
            },
            None => Ok(self.current_realm()),
        }
    }

    // §10.1.14 GetPrototypeFromConstructor(constructor, intrinsicDefaultProto)
    pub fn get_prototype_from_constructor(
        &mut self,
        constructor: &JsObject,
        intrinsic_default: fn(&Intrinsics) -> JsObject,
    ) -> JsResult<JsObject> {
        if let JsValue::Object(prototype) = self.get_property(constructor, "prototype")? {
            return Ok(prototype);
        }
        let realm = self.get_function_realm(constructor)?;
        Ok(intrinsic_default(&realm.intrinsics))
    }

    // §10.1.13 OrdinaryCreateFromConstructor
    pub fn ordinary_create_from_constructor(
        &mut self,
        constructor: &JsObject,
        intrinsic_default: fn(&Intrinsics) -> JsObject,
    ) -> JsResult<JsObject> {
        let prototype = self.get_prototype_from_constructor(constructor, intrinsic_default)?;
        Ok(self.ordinary_object_create(Some(prototype)))
    }

    pub fn create_builtin_function(&mut self, name: &str, length: u32, behavior: NativeFn) -> JsObject {
        let prototype = self.current_realm().intrinsics.function_prototype.clone();
        make_native_function(name, length, Some(prototype), behavior)
    }

    // §10.2.10 MakeConstructor(F)
    fn make_constructor(&mut self, function: &JsObject) {
        let prototype = self.object_create();
        prototype
            .borrow_mut()
            .insert_builtin(PropertyKey::from("constructor"), JsValue::Object(function.clone()));
        function.borrow_mut().insert_property(
            PropertyKey::from("prototype"),
            PropertyDescriptor::data(JsValue::Object(prototype), true, false, false),
        );
    }

    // §15.2.4 InstantiateOrdinaryFunctionObject, over §10.2.3 OrdinaryFunctionCreate
    pub fn instantiate_function_object(
        &mut self,
        code: &Rc<FunctionDecl>,
        environment: EnvRef,
        private_environment: Option<PrivateEnvRef>,
    ) -> JsObject {
        let this_mode = if code.is_arrow {
            ThisMode::Lexical
        } else if code.is_strict {
            ThisMode::Strict
        } else {
            ThisMode::Global
        };
        let constructible = !code.is_arrow && !code.is_async && !code.is_generator;
        let realm = self.current_realm();
        let function = OrdinaryFunction {
            code: code.clone(),
            environment,
            private_environment,
            realm: realm.clone(),
            script_or_module: self.get_active_script_or_module(),
            this_mode,
            strict: code.is_strict,
            constructor_kind: constructible.then_some(ConstructorKind::Base),
            is_class_constructor: false,
            home_object: None,
            class_field_initializer_name: None,
            executable: None,
        };
        let mut data = JsObjectData::with_prototype(Some(realm.intrinsics.function_prototype.clone()));
        data.class_name = "Function".to_string();
        data.callable = Some(FunctionKind::Ordinary(Box::new(function)));
        data.insert_property(
            PropertyKey::from("length"),
            PropertyDescriptor::data(
                JsValue::Number(code.expected_argument_count() as f64),
                false,
                false,
                true,
            ),
        );
        data.insert_property(
            PropertyKey::from("name"),
            PropertyDescriptor::data(JsValue::string(&code.name), false, false, true),
        );
        let object = JsObject::new(data);
        if constructible {
            self.make_constructor(&object);
        }
        object
    }

    // §10.4.1.3 BoundFunctionCreate(targetFunction, boundThis, boundArgs)
    pub fn bound_function_create(
        &mut self,
        target: &JsObject,
        bound_this: JsValue,
        bound_arguments: Vec<JsValue>,
    ) -> JsObject {
        let prototype = target.borrow().prototype.clone();
        let mut data = JsObjectData::with_prototype(prototype);
        data.class_name = "Function".to_string();
        data.callable = Some(FunctionKind::Bound(BoundFunction {
            target: target.clone(),
            bound_this,
            bound_arguments,
        }));
        JsObject::new(data)
    }

    // §10.5.14 ProxyCreate(target, handler), for callable targets
    pub fn proxy_create(&mut self, target: &JsValue, handler: &JsValue) -> JsResult<JsObject> {
        let Some(target_object) = target.as_object() else {
            return self.throw_type_error(ErrorType::NotAnObject, &target.to_string());
        };
        let Some(handler_object) = handler.as_object() else {
            return self.throw_type_error(ErrorType::NotAnObject, &handler.to_string());
        };
        if !self.is_callable(target) {
            return self.throw_type_error(ErrorType::NotAFunction, &target.to_string());
        }
        let mut data = JsObjectData::new();
        data.class_name = "Function".to_string();
        data.callable = Some(FunctionKind::Proxy(ProxyFunction {
            target: Some(target_object.clone()),
            handler: Some(handler_object.clone()),
        }));
        Ok(JsObject::new(data))
    }

    pub fn revoke_proxy(&mut self, proxy: &JsObject) {
        if let Some(FunctionKind::Proxy(p)) = &mut proxy.borrow_mut().callable {
            p.target = None;
            p.handler = None;
        }
    }

    /// Compiles an ordinary function's body on first use.
    pub(crate) fn ensure_compiled(&mut self, function: &JsObject) -> JsResult<Rc<Executable>> {
        let code = match &function.borrow().callable {
            Some(FunctionKind::Ordinary(f)) => {
                if let Some(executable) = &f.executable {
                    return Ok(executable.clone());
                }
                f.code.clone()
            }
            _ => unreachable!("only ordinary functions have executables"),
        };
        let backend = self.backend.clone();
        let executable = backend.compile_function(self, &code)?;
        if let Some(FunctionKind::Ordinary(f)) = &mut function.borrow_mut().callable {
            f.executable = Some(executable.clone());
        }
        Ok(executable)
    }

    pub(crate) fn internal_call(
        &mut self,
        function: &JsObject,
        this_argument: &JsValue,
        context: ExecutionContext,
    ) -> JsResult<JsValue> {
        let kind = function.borrow().callable.clone();
        match kind {
            Some(FunctionKind::Ordinary(f)) => self.ordinary_call(function, &f, this_argument, context),
            Some(FunctionKind::Bound(b)) => {
                let mut arguments = b.bound_arguments.clone();
                arguments.extend_from_slice(context.passed_arguments());
                self.call(&JsValue::Object(b.target), &b.bound_this, &arguments)
            }
            Some(FunctionKind::Proxy(p)) => {
                let (Some(target), Some(handler)) = (p.target, p.handler) else {
                    return self.throw_type_error(ErrorType::ProxyRevoked, "");
                };
                let handler = JsValue::Object(handler);
                let target = JsValue::Object(target);
                let Some(trap) = self.get_method(&handler, &PropertyKey::from("apply"))? else {
                    return self.call(&target, this_argument, context.passed_arguments());
                };
                let array = self.create_array_from_list(context.passed_arguments());
                self.call(&trap, &handler, &[target, this_argument.clone(), JsValue::Object(array)])
            }
            Some(FunctionKind::Native(n)) => {
                let mut context = context;
                if let Some(realm) = &n.realm {
                    context.realm = realm.clone();
                }
                let previous = self.new_target.take();
                let this_argument = this_argument.clone();
                let result = self.with_execution_context(context, |agent| {
                    let arguments = agent.running_execution_context().passed_arguments().to_vec();
                    (n.behavior)(agent, &this_argument, &arguments)
                });
                self.new_target = previous;
                result
            }
            None => unreachable!("call on a non-callable object"),
        }
    }

    pub(crate) fn internal_construct(
        &mut self,
        function: &JsObject,
        context: ExecutionContext,
        new_target: &JsValue,
    ) -> JsResult<JsObject> {
        let kind = function.borrow().callable.clone();
        match kind {
            Some(FunctionKind::Ordinary(f)) => self.ordinary_construct(function, &f, context, new_target),
            Some(FunctionKind::Bound(b)) => {
                let mut arguments = b.bound_arguments.clone();
                arguments.extend_from_slice(context.passed_arguments());
                let new_target = match new_target.as_object() {
                    Some(nt) if nt.ptr_eq(function) => JsValue::Object(b.target.clone()),
                    _ => new_target.clone(),
                };
                self.construct(&JsValue::Object(b.target), &arguments, Some(&new_target))
            }
            Some(FunctionKind::Proxy(p)) => {
                let (Some(target), Some(handler)) = (p.target, p.handler) else {
                    return self.throw_type_error(ErrorType::ProxyRevoked, "");
                };
                let handler = JsValue::Object(handler);
                let target = JsValue::Object(target);
                let Some(trap) = self.get_method(&handler, &PropertyKey::from("construct"))? else {
                    return self.construct(&target, context.passed_arguments(), Some(new_target));
                };
                let array = self.create_array_from_list(context.passed_arguments());
                let result = self.call(&trap, &handler, &[target, JsValue::Object(array), new_target.clone()])?;
                match result {
                    JsValue::Object(object) => Ok(object),
                    _ => self.throw_type_error(ErrorType::ProxyConstructBadReturnType, ""),
                }
            }
            Some(FunctionKind::Native(n)) => {
                let mut context = context;
                if let Some(realm) = &n.realm {
                    context.realm = realm.clone();
                }
                let previous = self.new_target.replace(new_target.clone());
                let result = self.with_execution_context(context, |agent| {
                    let arguments = agent.running_execution_context().passed_arguments().to_vec();
                    (n.behavior)(agent, &JsValue::Undefined, &arguments)
                });
                self.new_target = previous;
                match result? {
                    JsValue::Object(object) => Ok(object),
                    other => self.throw_type_error(ErrorType::NotAnObject, &other.to_string()),
                }
            }
            None => unreachable!("construct on a non-callable object"),
        }
    }

    // §10.2.1.1 PrepareForOrdinaryCall(F, newTarget)
    fn prepare_for_ordinary_call(
        &mut self,
        function: &JsObject,
        f: &OrdinaryFunction,
        context: &mut ExecutionContext,
        new_target: Option<JsValue>,
    ) -> JsResult<()> {
        context.function = Some(function.clone());
        context.realm = f.realm.clone();
        context.script_or_module = f.script_or_module.clone();
        let local_env = new_function_environment(function, new_target);
        context.lexical_environment = Some(local_env.clone());
        context.variable_environment = Some(local_env);
        context.private_environment = f.private_environment.clone();
        context.executable = Some(self.ensure_compiled(function)?);
        Ok(())
    }

    // §10.2.1.2 OrdinaryCallBindThis(F, calleeContext, thisArgument)
    fn ordinary_call_bind_this(&mut self, f: &OrdinaryFunction, this_argument: &JsValue) -> JsResult<()> {
        if f.this_mode == ThisMode::Lexical {
            return Ok(());
        }
        let this_value = if f.this_mode == ThisMode::Strict {
            this_argument.clone()
        } else if this_argument.is_nullish() {
            let global_env = f.realm.global_env.clone();
            self.get_this_binding(&global_env)?
        } else {
            JsValue::Object(self.to_object(this_argument)?)
        };
        let local_env = self.running_lexical_environment();
        self.bind_this_value(&local_env, this_value)
    }

    // §10.2.1.4 OrdinaryCallEvaluateBody(F, argumentsList)
    fn ordinary_call_evaluate_body(&mut self) -> JsResult<Option<JsValue>> {
        let Some(executable) = self.running_execution_context().executable.clone() else {
            unreachable!("ordinary call without a compiled body");
        };
        let backend = self.backend.clone();
        backend.run(self, &executable)
    }

    // §10.2.1 [[Call]](thisArgument, argumentsList)
    fn ordinary_call(
        &mut self,
        function: &JsObject,
        f: &OrdinaryFunction,
        this_argument: &JsValue,
        mut context: ExecutionContext,
    ) -> JsResult<JsValue> {
        if f.is_class_constructor {
            return self.throw_type_error(ErrorType::ClassConstructorWithoutNew, &f.code.name);
        }
        self.prepare_for_ordinary_call(function, f, &mut context, None)?;
        self.with_execution_context(context, |agent| {
            agent.ordinary_call_bind_this(f, this_argument)?;
            Ok(agent.ordinary_call_evaluate_body()?.unwrap_or(JsValue::Undefined))
        })
    }

    // §10.2.2 [[Construct]](argumentsList, newTarget)
    fn ordinary_construct(
        &mut self,
        function: &JsObject,
        f: &OrdinaryFunction,
        mut context: ExecutionContext,
        new_target: &JsValue,
    ) -> JsResult<JsObject> {
        let Some(constructor) = new_target.as_object() else {
            unreachable!("newTarget must be a constructor");
        };
        let this_argument = if f.constructor_kind == Some(ConstructorKind::Base) {
            Some(self.ordinary_create_from_constructor(constructor, |i| i.object_prototype.clone())?)
        } else {
            None
        };
        self.prepare_for_ordinary_call(function, f, &mut context, Some(new_target.clone()))?;
        self.with_execution_context(context, |agent| {
            let constructor_env = agent.running_lexical_environment();
            if let Some(this) = &this_argument {
                agent.bind_this_value(&constructor_env, JsValue::Object(this.clone()))?;
            }
            match agent.ordinary_call_evaluate_body()? {
                Some(JsValue::Object(object)) => return Ok(object),
                Some(value) if this_argument.is_none() && !value.is_undefined() => {
                    return agent.throw_type_error(ErrorType::DerivedConstructorReturningInvalidValue, "");
                }
                _ => {}
            }
            if let Some(this) = this_argument {
                return Ok(this);
            }
            match agent.get_this_binding(&constructor_env)? {
                JsValue::Object(object) => Ok(object),
                _ => unreachable!("derived constructor bound a non-object this"),
            }
        })
    }
}
