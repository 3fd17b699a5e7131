use super::disposable::DisposeCapability;
use super::function::{FunctionKind, ThisMode};
use super::helpers::to_boolean;
use super::{Agent, EngineError, ErrorType, JsResult, PropertyDescriptor, PropertyKey, TerminationReason};
use crate::types::{JsObject, JsValue, WellKnownSymbol};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::warn;

pub type EnvRef = Rc<RefCell<Environment>>;
pub type PrivateEnvRef = Rc<RefCell<PrivateEnvironment>>;

#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) value: JsValue,
    pub(crate) mutable: bool,
    pub(crate) initialized: bool,
    /// Immutable bindings created strict always throw on assignment.
    pub(crate) strict: bool,
    pub(crate) deletable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThisBindingStatus {
    Lexical,
    Initialized,
    Uninitialized,
}

#[derive(Debug)]
pub struct FunctionEnvironment {
    pub this_value: JsValue,
    pub this_binding_status: ThisBindingStatus,
    pub function_object: JsObject,
    pub new_target: JsValue,
}

#[derive(Debug)]
pub struct GlobalEnvironment {
    pub object_record: EnvRef,
    pub global_this_value: JsObject,
    pub declarative_record: EnvRef,
}

#[derive(Debug)]
pub enum EnvironmentKind {
    Declarative,
    Function(FunctionEnvironment),
    Object {
        binding_object: JsObject,
        is_with_environment: bool,
    },
    Global(GlobalEnvironment),
}

#[derive(Debug)]
pub struct Environment {
    pub(crate) outer: Option<EnvRef>,
    pub(crate) kind: EnvironmentKind,
    pub(crate) bindings: FxHashMap<String, Binding>,
    pub(crate) dispose_capability: DisposeCapability,
    affected_by_eval: bool,
}

impl Environment {
    fn new(kind: EnvironmentKind, outer: Option<EnvRef>) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            outer,
            kind,
            bindings: FxHashMap::default(),
            dispose_capability: DisposeCapability::default(),
            affected_by_eval: false,
        }))
    }

    pub fn outer(&self) -> Option<EnvRef> {
        self.outer.clone()
    }

    pub fn kind(&self) -> &EnvironmentKind {
        &self.kind
    }

    pub fn is_global(&self) -> bool {
        matches!(self.kind, EnvironmentKind::Global(_))
    }

    pub fn is_object_environment(&self) -> bool {
        matches!(self.kind, EnvironmentKind::Object { .. })
    }

    pub fn is_function_environment(&self) -> bool {
        matches!(self.kind, EnvironmentKind::Function(_))
    }

    pub fn function_environment(&self) -> Option<&FunctionEnvironment> {
        match &self.kind {
            EnvironmentKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Variable slots resolved ahead of time are unreliable once this is set.
    pub fn is_affected_by_eval(&self) -> bool {
        self.affected_by_eval
    }

    pub fn set_affected_by_eval(&mut self) {
        self.affected_by_eval = true;
    }

    pub fn has_declarative_binding(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Value of an initialized declarative binding.
    pub fn declarative_value(&self, name: &str) -> Option<JsValue> {
        self.bindings
            .get(name)
            .filter(|b| b.initialized)
            .map(|b| b.value.clone())
    }

    pub(crate) fn set_declarative_value(&mut self, name: &str, value: JsValue) {
        if let Some(binding) = self.bindings.get_mut(name) {
            binding.value = value;
            binding.initialized = true;
        }
    }

    fn declare(&mut self, name: &str, mutable: bool, strict: bool, deletable: bool) -> JsResult<()> {
        if self.bindings.contains_key(name) {
            warn!(name, "binding declared twice");
            return Err(EngineError::Termination(TerminationReason::DuplicateBinding));
        }
        self.bindings.insert(
            name.to_string(),
            Binding {
                value: JsValue::Undefined,
                mutable,
                initialized: false,
                strict,
                deletable,
            },
        );
        Ok(())
    }

    pub fn dispose_capability_mut(&mut self) -> &mut DisposeCapability {
        &mut self.dispose_capability
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateName {
    pub description: String,
    pub id: u64,
}

#[derive(Debug, Default)]
pub struct PrivateEnvironment {
    pub outer: Option<PrivateEnvRef>,
    pub names: Vec<PrivateName>,
}

impl PrivateEnvironment {
    pub fn add_private_name(&mut self, name: PrivateName) {
        self.names.push(name);
    }

    // §9.2.1.2 ResolvePrivateIdentifier
    pub fn resolve_private_identifier(&self, identifier: &str) -> Option<PrivateName> {
        if let Some(name) = self.names.iter().find(|n| n.description == identifier) {
            return Some(name.clone());
        }
        self.outer
            .as_ref()
            .and_then(|outer| outer.borrow().resolve_private_identifier(identifier))
    }

    /// Descriptions of every private name visible from this environment.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().map(|n| n.description.clone()).collect();
        if let Some(outer) = &self.outer {
            names.extend(outer.borrow().visible_names());
        }
        names
    }
}

// §9.1.2.2 NewDeclarativeEnvironment(E)
pub fn new_declarative_environment(outer: Option<EnvRef>) -> EnvRef {
    Environment::new(EnvironmentKind::Declarative, outer)
}

// §9.1.2.3 NewObjectEnvironment(O, W, E)
pub fn new_object_environment(
    binding_object: JsObject,
    is_with_environment: bool,
    outer: Option<EnvRef>,
) -> EnvRef {
    Environment::new(
        EnvironmentKind::Object {
            binding_object,
            is_with_environment,
        },
        outer,
    )
}

// §9.1.2.4 NewFunctionEnvironment(F, newTarget)
pub fn new_function_environment(function: &JsObject, new_target: Option<JsValue>) -> EnvRef {
    let data = function.borrow();
    let Some(FunctionKind::Ordinary(ordinary)) = &data.callable else {
        panic!("NewFunctionEnvironment on a non-ordinary function");
    };
    let this_binding_status = if ordinary.this_mode == ThisMode::Lexical {
        ThisBindingStatus::Lexical
    } else {
        ThisBindingStatus::Uninitialized
    };
    Environment::new(
        EnvironmentKind::Function(FunctionEnvironment {
            this_value: JsValue::Undefined,
            this_binding_status,
            function_object: function.clone(),
            new_target: new_target.unwrap_or(JsValue::Undefined),
        }),
        Some(ordinary.environment.clone()),
    )
}

// §9.2.1.1 NewPrivateEnvironment(outerPrivEnv)
pub fn new_private_environment(outer: Option<PrivateEnvRef>) -> PrivateEnvRef {
    Rc::new(RefCell::new(PrivateEnvironment {
        outer,
        names: Vec::new(),
    }))
}

// §9.1.2.5 NewGlobalEnvironment(G, thisValue)
pub fn new_global_environment(global_object: JsObject, this_value: JsObject) -> EnvRef {
    let object_record = new_object_environment(global_object, false, None);
    let declarative_record = new_declarative_environment(None);
    Environment::new(
        EnvironmentKind::Global(GlobalEnvironment {
            object_record,
            global_this_value: this_value,
            declarative_record,
        }),
        None,
    )
}

enum Record {
    Declarative,
    Object(JsObject, bool),
    Global(EnvRef, EnvRef),
}

fn record_of(env: &EnvRef) -> Record {
    match &env.borrow().kind {
        EnvironmentKind::Declarative | EnvironmentKind::Function(_) => Record::Declarative,
        EnvironmentKind::Object {
            binding_object,
            is_with_environment,
        } => Record::Object(binding_object.clone(), *is_with_environment),
        EnvironmentKind::Global(global) => Record::Global(
            global.object_record.clone(),
            global.declarative_record.clone(),
        ),
    }
}

fn global_object_of(env: &EnvRef) -> JsObject {
    let Record::Global(object_record, _) = record_of(env) else {
        panic!("expected a global environment");
    };
    let Record::Object(global, _) = record_of(&object_record) else {
        panic!("global object record without a binding object");
    };
    global
}

impl Agent {
    pub fn has_binding(&mut self, env: &EnvRef, name: &str) -> JsResult<bool> {
        match record_of(env) {
            Record::Declarative => Ok(env.borrow().has_declarative_binding(name)),
            Record::Object(object, is_with) => {
                let key = PropertyKey::from(name);
                if !self.has_property(&object, &key) {
                    return Ok(false);
                }
                if !is_with {
                    return Ok(true);
                }
                let this = JsValue::Object(object.clone());
                let unscopables_key = self.well_known_key(WellKnownSymbol::Unscopables);
                let unscopables = self.get(&object, &unscopables_key, &this)?;
                if let JsValue::Object(unscopables) = &unscopables {
                    let receiver = JsValue::Object(unscopables.clone());
                    let blocked = self.get(unscopables, &key, &receiver)?;
                    if to_boolean(&blocked) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Record::Global(object_record, declarative_record) => {
                if declarative_record.borrow().has_declarative_binding(name) {
                    return Ok(true);
                }
                self.has_binding(&object_record, name)
            }
        }
    }

    pub fn create_mutable_binding(&mut self, env: &EnvRef, name: &str, deletable: bool) -> JsResult<()> {
        match record_of(env) {
            Record::Declarative => {
                env.borrow_mut().declare(name, true, false, deletable)
            }
            Record::Object(object, _) => self.define_property_or_throw(
                &object,
                &PropertyKey::from(name),
                PropertyDescriptor::data(JsValue::Undefined, true, true, deletable),
            ),
            Record::Global(_, declarative_record) => {
                if declarative_record.borrow().has_declarative_binding(name) {
                    return self.throw_type_error(ErrorType::TopLevelVariableAlreadyDeclared, name);
                }
                declarative_record.borrow_mut().declare(name, true, false, deletable)
            }
        }
    }

    pub fn create_immutable_binding(&mut self, env: &EnvRef, name: &str, strict: bool) -> JsResult<()> {
        match record_of(env) {
            Record::Declarative => {
                env.borrow_mut().declare(name, false, strict, false)
            }
            Record::Object(..) => unreachable!("object environments have no immutable bindings"),
            Record::Global(_, declarative_record) => {
                if declarative_record.borrow().has_declarative_binding(name) {
                    return self.throw_type_error(ErrorType::TopLevelVariableAlreadyDeclared, name);
                }
                declarative_record.borrow_mut().declare(name, false, strict, false)
            }
        }
    }

    pub fn initialize_binding(&mut self, env: &EnvRef, name: &str, value: JsValue) -> JsResult<()> {
        match record_of(env) {
            Record::Declarative => {
                env.borrow_mut().set_declarative_value(name, value);
                Ok(())
            }
            Record::Object(..) => self.set_mutable_binding(env, name, value, false),
            Record::Global(object_record, declarative_record) => {
                if declarative_record.borrow().has_declarative_binding(name) {
                    declarative_record.borrow_mut().set_declarative_value(name, value);
                    Ok(())
                } else {
                    self.initialize_binding(&object_record, name, value)
                }
            }
        }
    }

    pub fn set_mutable_binding(
        &mut self,
        env: &EnvRef,
        name: &str,
        value: JsValue,
        strict: bool,
    ) -> JsResult<()> {
        match record_of(env) {
            Record::Declarative => {
                let state = env
                    .borrow()
                    .bindings
                    .get(name)
                    .map(|b| (b.initialized, b.mutable, b.strict));
                let Some((initialized, mutable, binding_strict)) = state else {
                    if strict {
                        return self.throw_reference_error(ErrorType::UnknownIdentifier, name);
                    }
                    self.create_mutable_binding(env, name, true)?;
                    return self.initialize_binding(env, name, value);
                };
                if !initialized {
                    return self.throw_reference_error(ErrorType::BindingNotInitialized, name);
                }
                if mutable {
                    env.borrow_mut().set_declarative_value(name, value);
                } else if strict || binding_strict {
                    return self.throw_type_error(ErrorType::ConstantAssignment, name);
                }
                Ok(())
            }
            Record::Object(object, _) => {
                let key = PropertyKey::from(name);
                if !self.has_property(&object, &key) && strict {
                    return self.throw_reference_error(ErrorType::UnknownIdentifier, name);
                }
                let receiver = JsValue::Object(object.clone());
                let succeeded = self.set(&object, &key, value, &receiver)?;
                if !succeeded && strict {
                    return self.throw_type_error(ErrorType::DescriptorNotApplied, name);
                }
                Ok(())
            }
            Record::Global(object_record, declarative_record) => {
                if declarative_record.borrow().has_declarative_binding(name) {
                    self.set_mutable_binding(&declarative_record, name, value, strict)
                } else {
                    self.set_mutable_binding(&object_record, name, value, strict)
                }
            }
        }
    }

    pub fn get_binding_value(&mut self, env: &EnvRef, name: &str, strict: bool) -> JsResult<JsValue> {
        match record_of(env) {
            Record::Declarative => {
                let state = env
                    .borrow()
                    .bindings
                    .get(name)
                    .map(|b| (b.initialized, b.value.clone()));
                match state {
                    Some((true, value)) => Ok(value),
                    Some((false, _)) => {
                        self.throw_reference_error(ErrorType::BindingNotInitialized, name)
                    }
                    None => self.throw_reference_error(ErrorType::UnknownIdentifier, name),
                }
            }
            Record::Object(object, _) => {
                let key = PropertyKey::from(name);
                if !self.has_property(&object, &key) {
                    if strict {
                        return self.throw_reference_error(ErrorType::UnknownIdentifier, name);
                    }
                    return Ok(JsValue::Undefined);
                }
                let receiver = JsValue::Object(object.clone());
                self.get(&object, &key, &receiver)
            }
            Record::Global(object_record, declarative_record) => {
                if declarative_record.borrow().has_declarative_binding(name) {
                    self.get_binding_value(&declarative_record, name, strict)
                } else {
                    self.get_binding_value(&object_record, name, strict)
                }
            }
        }
    }

    pub fn delete_binding(&mut self, env: &EnvRef, name: &str) -> JsResult<bool> {
        match record_of(env) {
            Record::Declarative => {
                let mut env = env.borrow_mut();
                if !env.bindings.get(name).is_none_or(|b| b.deletable) {
                    return Ok(false);
                }
                env.bindings.remove(name);
                Ok(true)
            }
            Record::Object(object, _) => Ok(self.delete(&object, &PropertyKey::from(name))),
            Record::Global(object_record, declarative_record) => {
                if declarative_record.borrow().has_declarative_binding(name) {
                    return self.delete_binding(&declarative_record, name);
                }
                let global = global_object_of(env);
                if global.borrow().has_own_property(&PropertyKey::from(name)) {
                    return self.delete_binding(&object_record, name);
                }
                Ok(true)
            }
        }
    }

    pub fn has_this_binding(&self, env: &EnvRef) -> bool {
        match &env.borrow().kind {
            EnvironmentKind::Function(f) => f.this_binding_status != ThisBindingStatus::Lexical,
            EnvironmentKind::Global(_) => true,
            _ => false,
        }
    }

    pub fn has_super_binding(&self, env: &EnvRef) -> bool {
        let env = env.borrow();
        let Some(f) = env.function_environment() else {
            return false;
        };
        if f.this_binding_status == ThisBindingStatus::Lexical {
            return false;
        }
        match &f.function_object.borrow().callable {
            Some(FunctionKind::Ordinary(ordinary)) => ordinary.home_object.is_some(),
            _ => false,
        }
    }

    pub fn with_base_object(&self, env: &EnvRef) -> Option<JsObject> {
        match &env.borrow().kind {
            EnvironmentKind::Object {
                binding_object,
                is_with_environment: true,
            } => Some(binding_object.clone()),
            _ => None,
        }
    }

    // §9.1.1.3.1 BindThisValue(V)
    pub fn bind_this_value(&mut self, env: &EnvRef, value: JsValue) -> JsResult<()> {
        let status = match &env.borrow().kind {
            EnvironmentKind::Function(f) => f.this_binding_status,
            _ => unreachable!("BindThisValue on a non-function environment"),
        };
        assert_ne!(status, ThisBindingStatus::Lexical);
        if status == ThisBindingStatus::Initialized {
            return self.throw_reference_error(ErrorType::ThisAlreadyInitialized, "");
        }
        if let EnvironmentKind::Function(f) = &mut env.borrow_mut().kind {
            f.this_value = value;
            f.this_binding_status = ThisBindingStatus::Initialized;
        }
        Ok(())
    }

    pub fn get_this_binding(&mut self, env: &EnvRef) -> JsResult<JsValue> {
        let result = match &env.borrow().kind {
            EnvironmentKind::Function(f) => match f.this_binding_status {
                ThisBindingStatus::Lexical => unreachable!("lexical this has no binding"),
                ThisBindingStatus::Uninitialized => None,
                ThisBindingStatus::Initialized => Some(f.this_value.clone()),
            },
            EnvironmentKind::Global(g) => Some(JsValue::Object(g.global_this_value.clone())),
            _ => unreachable!("environment has no this binding"),
        };
        match result {
            Some(value) => Ok(value),
            None => self.throw_reference_error(ErrorType::ThisNotInitialized, ""),
        }
    }

    // §9.1.1.4.12 HasLexicalDeclaration(N)
    pub fn has_lexical_declaration(&self, env: &EnvRef, name: &str) -> bool {
        match record_of(env) {
            Record::Global(_, declarative_record) => {
                declarative_record.borrow().has_declarative_binding(name)
            }
            _ => unreachable!("HasLexicalDeclaration on a non-global environment"),
        }
    }

    // §9.1.1.4.13 HasRestrictedGlobalProperty(N)
    pub fn has_restricted_global_property(&self, env: &EnvRef, name: &str) -> bool {
        let global = global_object_of(env);
        match self.get_own_property(&global, &PropertyKey::from(name)) {
            None => false,
            Some(existing) => !existing.is_configurable(),
        }
    }

    // §9.1.1.4.14 CanDeclareGlobalVar(N)
    pub fn can_declare_global_var(&mut self, env: &EnvRef, name: &str) -> JsResult<bool> {
        let global = global_object_of(env);
        if global.borrow().has_own_property(&PropertyKey::from(name)) {
            return Ok(true);
        }
        Ok(self.is_extensible(&global))
    }

    // §9.1.1.4.15 CanDeclareGlobalFunction(N)
    pub fn can_declare_global_function(&mut self, env: &EnvRef, name: &str) -> JsResult<bool> {
        let global = global_object_of(env);
        let Some(existing) = self.get_own_property(&global, &PropertyKey::from(name)) else {
            return Ok(self.is_extensible(&global));
        };
        if existing.is_configurable() {
            return Ok(true);
        }
        Ok(existing.is_data_descriptor() && existing.is_writable() && existing.is_enumerable())
    }

    // §9.1.1.4.16 CreateGlobalVarBinding(N, D)
    pub fn create_global_var_binding(&mut self, env: &EnvRef, name: &str, deletable: bool) -> JsResult<()> {
        let Record::Global(object_record, _) = record_of(env) else {
            unreachable!("CreateGlobalVarBinding on a non-global environment");
        };
        let global = global_object_of(env);
        let has_property = global.borrow().has_own_property(&PropertyKey::from(name));
        if !has_property && self.is_extensible(&global) {
            self.create_mutable_binding(&object_record, name, deletable)?;
            self.initialize_binding(&object_record, name, JsValue::Undefined)?;
        }
        Ok(())
    }

    // §9.1.1.4.17 CreateGlobalFunctionBinding(N, V, D)
    pub fn create_global_function_binding(
        &mut self,
        env: &EnvRef,
        name: &str,
        value: JsValue,
        deletable: bool,
    ) -> JsResult<()> {
        let global = global_object_of(env);
        let key = PropertyKey::from(name);
        let desc = match self.get_own_property(&global, &key) {
            None => PropertyDescriptor::data(value.clone(), true, true, deletable),
            Some(existing) if existing.is_configurable() => {
                PropertyDescriptor::data(value.clone(), true, true, deletable)
            }
            Some(_) => PropertyDescriptor {
                value: Some(value.clone()),
                ..Default::default()
            },
        };
        self.define_property_or_throw(&global, &key, desc)?;
        let receiver = JsValue::Object(global.clone());
        self.set(&global, &key, value, &receiver)?;
        Ok(())
    }

    // §9.4.3 GetThisEnvironment()
    pub fn get_this_environment(&self) -> EnvRef {
        let mut env = self.running_execution_context().lexical_environment.clone();
        while let Some(current) = env {
            if self.has_this_binding(&current) {
                return current;
            }
            env = current.borrow().outer();
        }
        panic!("environment chain has no this binding");
    }

    // §9.4.4 ResolveThisBinding()
    pub fn resolve_this_binding(&mut self) -> JsResult<JsValue> {
        let env = self.get_this_environment();
        self.get_this_binding(&env)
    }

    // §9.4.5 GetNewTarget()
    pub fn get_new_target(&self) -> JsValue {
        let env = self.get_this_environment();
        let env = env.borrow();
        env.function_environment()
            .map_or(JsValue::Undefined, |f| f.new_target.clone())
    }

    // §9.4.2 ResolveBinding(name, env); `None` is an unresolvable reference.
    pub fn resolve_binding(&mut self, name: &str, env: Option<EnvRef>) -> JsResult<Option<EnvRef>> {
        let mut env = env.or_else(|| self.running_execution_context().lexical_environment.clone());
        while let Some(current) = env {
            if self.has_binding(&current, name)? {
                return Ok(Some(current));
            }
            env = current.borrow().outer();
        }
        Ok(None)
    }
}
