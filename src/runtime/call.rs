use super::environment::{EnvRef, PrivateEnvRef};
use super::function::FunctionKind;
use super::host::Executable;
use super::realm::Realm;
use super::{Agent, EngineError, ErrorType, JsResult, TerminationReason};
use crate::types::{JsObject, JsValue};
use std::rc::Rc;
use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOrModule {
    Script(Rc<str>),
    Module(Rc<str>),
}

/// Per-invocation bookkeeping for one function, script or eval.
#[derive(Clone)]
pub struct ExecutionContext {
    pub realm: Rc<Realm>,
    pub function: Option<JsObject>,
    pub script_or_module: Option<ScriptOrModule>,
    pub lexical_environment: Option<EnvRef>,
    pub variable_environment: Option<EnvRef>,
    pub private_environment: Option<PrivateEnvRef>,
    pub executable: Option<Rc<Executable>>,
    /// Registers, constants and locals of the running executable.
    pub registers: Vec<JsValue>,
    /// Argument slots; at least as many as the callee declares.
    pub arguments: Vec<JsValue>,
    pub passed_argument_count: usize,
}

impl ExecutionContext {
    pub fn new(realm: Rc<Realm>) -> Self {
        Self {
            realm,
            function: None,
            script_or_module: None,
            lexical_environment: None,
            variable_environment: None,
            private_environment: None,
            executable: None,
            registers: Vec::new(),
            arguments: Vec::new(),
            passed_argument_count: 0,
        }
    }

    /// The arguments the caller actually supplied.
    pub fn passed_arguments(&self) -> &[JsValue] {
        &self.arguments[..self.passed_argument_count]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrameSize {
    pub registers_constants_and_locals: usize,
    pub argument_count: usize,
}

impl Agent {
    pub fn running_execution_context(&self) -> &ExecutionContext {
        match self.execution_context_stack.last() {
            Some(context) => context,
            None => panic!("no running execution context"),
        }
    }

    pub fn running_execution_context_mut(&mut self) -> &mut ExecutionContext {
        match self.execution_context_stack.last_mut() {
            Some(context) => context,
            None => panic!("no running execution context"),
        }
    }

    pub fn execution_context_depth(&self) -> usize {
        self.execution_context_stack.len()
    }

    pub(crate) fn running_lexical_environment(&self) -> EnvRef {
        match &self.running_execution_context().lexical_environment {
            Some(env) => env.clone(),
            None => panic!("running execution context has no lexical environment"),
        }
    }

    pub fn push_execution_context(&mut self, context: ExecutionContext) -> JsResult<()> {
        let depth = self.execution_context_stack.len();
        if depth >= self.options.max_execution_context_depth {
            warn!(depth, "execution context stack limit reached");
            return Err(EngineError::Termination(TerminationReason::StackOverflow));
        }
        self.execution_context_stack.push(context);
        trace!(depth = depth + 1, "push execution context");
        Ok(())
    }

    pub fn pop_execution_context(&mut self) -> ExecutionContext {
        let Some(context) = self.execution_context_stack.pop() else {
            panic!("pop on an empty execution context stack");
        };
        trace!(depth = self.execution_context_stack.len(), "pop execution context");
        context
    }

    /// Runs `f` with `context` on top of the stack, popping it on every exit path.
    pub fn with_execution_context<T>(
        &mut self,
        context: ExecutionContext,
        f: impl FnOnce(&mut Agent) -> JsResult<T>,
    ) -> JsResult<T> {
        self.push_execution_context(context)?;
        let result = f(self);
        self.pop_execution_context();
        result
    }

    /// A script-level context over the agent's realm and global environment.
    pub fn initial_execution_context(&self) -> ExecutionContext {
        let realm = self.realm.clone();
        let global_env = realm.global_env.clone();
        let mut context = ExecutionContext::new(realm);
        context.lexical_environment = Some(global_env.clone());
        context.variable_environment = Some(global_env);
        context
    }

    // §9.4.1 GetActiveScriptOrModule()
    pub fn get_active_script_or_module(&self) -> Option<ScriptOrModule> {
        self.execution_context_stack
            .iter()
            .rev()
            .find_map(|context| context.script_or_module.clone())
    }

    /// Frame requirements of `function` for a call passing `passed` arguments.
    pub fn get_stack_frame_size(&mut self, function: &JsObject, passed: usize) -> JsResult<StackFrameSize> {
        let formal_count = match &function.borrow().callable {
            Some(FunctionKind::Ordinary(f)) => Some(f.code.formal_parameter_count()),
            _ => None,
        };
        let Some(formal_count) = formal_count else {
            return Ok(StackFrameSize {
                registers_constants_and_locals: 0,
                argument_count: passed,
            });
        };
        let executable = self.ensure_compiled(function)?;
        Ok(StackFrameSize {
            registers_constants_and_locals: executable.frame_size(),
            argument_count: passed.max(formal_count),
        })
    }

    fn allocate_callee_context(&mut self, function: &JsObject, arguments: &[JsValue]) -> JsResult<ExecutionContext> {
        let size = self.get_stack_frame_size(function, arguments.len())?;
        let mut context = ExecutionContext::new(self.current_realm());
        context.function = Some(function.clone());
        context.registers = vec![JsValue::Undefined; size.registers_constants_and_locals];
        context.arguments = vec![JsValue::Undefined; size.argument_count];
        context.arguments[..arguments.len()].clone_from_slice(arguments);
        context.passed_argument_count = arguments.len();
        Ok(context)
    }

    // §7.3.14 Call(F, V, argumentsList)
    pub fn call(&mut self, function: &JsValue, this_value: &JsValue, arguments: &[JsValue]) -> JsResult<JsValue> {
        let Some(object) = function.as_object().filter(|_| self.is_callable(function)) else {
            return self.throw_type_error(ErrorType::NotAFunction, &function.to_string());
        };
        let object = object.clone();
        let context = self.allocate_callee_context(&object, arguments)?;
        self.internal_call(&object, this_value, context)
    }

    // §7.3.15 Construct(F, argumentsList, newTarget)
    pub fn construct(
        &mut self,
        function: &JsValue,
        arguments: &[JsValue],
        new_target: Option<&JsValue>,
    ) -> JsResult<JsObject> {
        let Some(object) = function.as_object().filter(|_| self.is_constructor(function)) else {
            return self.throw_type_error(ErrorType::NotAConstructor, &function.to_string());
        };
        let object = object.clone();
        let new_target = new_target.cloned().unwrap_or_else(|| function.clone());
        let context = self.allocate_callee_context(&object, arguments)?;
        self.internal_construct(&object, context, &new_target)
    }
}
