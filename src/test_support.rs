//! In-crate doubles for the parser, compiler and host collaborators.
//!
//! `TestBackend` "compiles" by keeping the AST and runs it with a small
//! tree walker that covers what the unit tests exercise.

use crate::ast::{BinaryOp, Expression, FunctionDecl, Literal, Pattern, Program, Statement, VarKind};
use crate::runtime::environment::{EnvRef, new_declarative_environment};
use crate::runtime::helpers::{strict_equality, to_boolean};
use crate::runtime::realm::Realm;
use crate::runtime::{
    Agent, AgentOptions, Backend, CallerMode, DisposeHint, EngineError, ErrorKind, ErrorType, EvalMode,
    Executable, HostHooks, ImportReferrer, JsResult, ModuleRequest, ParseError, ParseOptions,
    PromiseCapability, PropertyKey,
};
use crate::types::{JsObject, JsString, JsValue};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub(crate) fn test_agent() -> (Agent, Rc<TestBackend>, Rc<RecordingHost>) {
    test_agent_with_options(AgentOptions::default())
}

pub(crate) fn test_agent_with_options(options: AgentOptions) -> (Agent, Rc<TestBackend>, Rc<RecordingHost>) {
    let backend = Rc::new(TestBackend::default());
    let host = Rc::new(RecordingHost::default());
    let agent = Agent::new(options, backend.clone(), host.clone());
    (agent, backend, host)
}

pub(crate) fn function_decl(name: &str, params: &[&str], body: Vec<Statement>) -> Rc<FunctionDecl> {
    let params = params.iter().map(|p| Pattern::Identifier(p.to_string())).collect();
    Rc::new(FunctionDecl::new(name, params, body))
}

/// True when `error` is a thrown object whose prototype is named `name`.
pub(crate) fn is_error_of_kind(agent: &mut Agent, error: &EngineError, name: &str) -> bool {
    let Some(JsValue::Object(object)) = error.thrown_value() else {
        return false;
    };
    let Some(prototype) = object.borrow().prototype.clone() else {
        return false;
    };
    agent.get_property(&prototype, "name").ok() == Some(JsValue::string(name))
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObservedFrame {
    pub arguments: Vec<JsValue>,
    pub passed_argument_count: usize,
    pub registers: usize,
}

enum Compiled {
    Program { program: Rc<Program>, strict: bool },
    Function(Rc<FunctionDecl>),
}

#[derive(Default)]
pub(crate) struct TestBackend {
    programs: RefCell<FxHashMap<String, Result<Rc<Program>, Vec<ParseError>>>>,
    pub parse_requests: RefCell<Vec<(String, ParseOptions)>>,
    pub observed_frames: RefCell<Vec<ObservedFrame>>,
    pub awaited: RefCell<Vec<JsValue>>,
}

impl TestBackend {
    pub fn add_program(&self, source: &str, program: Program) {
        self.programs.borrow_mut().insert(source.to_string(), Ok(Rc::new(program)));
    }

    pub fn add_parse_errors(&self, source: &str, errors: Vec<ParseError>) {
        self.programs.borrow_mut().insert(source.to_string(), Err(errors));
    }
}

impl Backend for TestBackend {
    fn parse_program(&self, source: &JsString, options: &ParseOptions) -> Result<Rc<Program>, Vec<ParseError>> {
        let source = source.to_rust_string();
        self.parse_requests.borrow_mut().push((source.clone(), options.clone()));
        match self.programs.borrow().get(&source) {
            Some(parsed) => parsed.clone(),
            None => Err(vec![ParseError {
                message: format!("Unexpected token in {source:?}"),
                line: 1,
                column: 1,
            }]),
        }
    }

    fn compile_program(&self, _agent: &mut Agent, program: &Rc<Program>, strict: bool) -> JsResult<Rc<Executable>> {
        Ok(Rc::new(Executable {
            name: "eval".to_string(),
            number_of_registers: 2,
            constants: vec![JsValue::Undefined],
            local_variable_names: Vec::new(),
            code: Rc::new(Compiled::Program {
                program: program.clone(),
                strict,
            }),
        }))
    }

    fn compile_function(&self, _agent: &mut Agent, function: &Rc<FunctionDecl>) -> JsResult<Rc<Executable>> {
        Ok(Rc::new(Executable {
            name: function.name.clone(),
            number_of_registers: 4,
            constants: Vec::new(),
            local_variable_names: function.parameter_names(),
            code: Rc::new(Compiled::Function(function.clone())),
        }))
    }

    fn run(&self, agent: &mut Agent, executable: &Rc<Executable>) -> JsResult<Option<JsValue>> {
        let Some(compiled) = executable.code.downcast_ref::<Compiled>() else {
            panic!("executable was not produced by the test backend");
        };
        match compiled {
            Compiled::Program { program, strict } => {
                let walker = Walker { strict: *strict };
                match walker.statements(agent, &program.body)? {
                    Flow::Normal(value) => Ok(value),
                    Flow::Return(value) => Ok(Some(value)),
                }
            }
            Compiled::Function(function) => {
                let context = agent.running_execution_context();
                self.observed_frames.borrow_mut().push(ObservedFrame {
                    arguments: context.arguments.clone(),
                    passed_argument_count: context.passed_argument_count,
                    registers: context.registers.len(),
                });
                let walker = Walker { strict: function.is_strict };
                walker.function_prologue(agent, function)?;
                match walker.statements(agent, &function.body)? {
                    Flow::Normal(_) => Ok(None),
                    Flow::Return(value) => Ok(Some(value)),
                }
            }
        }
    }

    fn await_value(&self, agent: &mut Agent, value: JsValue) -> JsResult<JsValue> {
        self.awaited.borrow_mut().push(value.clone());
        // Promises from `new_promise_capability` settle synchronously.
        if let JsValue::Object(promise) = &value {
            let settled = |state: &str| {
                agent
                    .get_own_property(promise, &PropertyKey::from(state))
                    .and_then(|desc| desc.value)
            };
            if let Some(reason) = settled("rejected") {
                return Err(EngineError::Throw(reason));
            }
            if let Some(result) = settled("fulfilled") {
                return Ok(result);
            }
        }
        Ok(value)
    }

    fn new_promise_capability(&self, agent: &mut Agent) -> JsResult<PromiseCapability> {
        let promise = agent.object_create();
        let settle = |agent: &mut Agent, promise: &JsObject, state: &'static str| {
            let promise = promise.clone();
            agent.create_builtin_function(
                state,
                1,
                Rc::new(move |agent, _, args| {
                    let value = args.first().cloned().unwrap_or(JsValue::Undefined);
                    agent.create_data_property(&promise, &PropertyKey::from(state), value);
                    Ok(JsValue::Undefined)
                }),
            )
        };
        let resolve = settle(agent, &promise, "fulfilled");
        let reject = settle(agent, &promise, "rejected");
        Ok(PromiseCapability {
            promise,
            resolve: JsValue::Object(resolve),
            reject: JsValue::Object(reject),
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingHost {
    pub refuse_compilation: Cell<bool>,
    pub compile_requests: RefCell<Vec<(String, bool)>>,
    pub code_for_eval: RefCell<Vec<(JsObject, JsString)>>,
    pub loads: RefCell<Vec<(ImportReferrer, ModuleRequest)>>,
}

impl HostHooks for RecordingHost {
    fn ensure_can_compile_strings(
        &self,
        agent: &mut Agent,
        _realm: &Rc<Realm>,
        source: &JsString,
        direct: bool,
    ) -> JsResult<()> {
        self.compile_requests
            .borrow_mut()
            .push((source.to_rust_string(), direct));
        if self.refuse_compilation.get() {
            return Err(EngineError::Throw(
                agent.create_error(ErrorKind::Error, "code generation from strings disallowed"),
            ));
        }
        Ok(())
    }

    fn get_code_for_eval(&self, _agent: &mut Agent, object: &JsObject) -> JsResult<Option<JsString>> {
        Ok(self
            .code_for_eval
            .borrow()
            .iter()
            .find(|(candidate, _)| candidate.ptr_eq(object))
            .map(|(_, code)| code.clone()))
    }

    fn load_imported_module(
        &self,
        _agent: &mut Agent,
        referrer: ImportReferrer,
        request: ModuleRequest,
        _capability: PromiseCapability,
    ) -> JsResult<()> {
        self.loads.borrow_mut().push((referrer, request));
        Ok(())
    }
}

enum Flow {
    Normal(Option<JsValue>),
    Return(JsValue),
}

struct Walker {
    strict: bool,
}

impl Walker {
    fn lexical_environment(agent: &Agent) -> EnvRef {
        match &agent.running_execution_context().lexical_environment {
            Some(env) => env.clone(),
            None => panic!("no lexical environment"),
        }
    }

    fn variable_environment(agent: &Agent) -> EnvRef {
        match &agent.running_execution_context().variable_environment {
            Some(env) => env.clone(),
            None => panic!("no variable environment"),
        }
    }

    fn declare_lexical(agent: &mut Agent, env: &EnvRef, body: &[Statement]) -> JsResult<()> {
        for statement in body {
            match statement {
                Statement::Variable(declaration) if declaration.kind.is_lexical() => {
                    let mut names = Vec::new();
                    declaration.for_each_bound_name(&mut |name| names.push(name.to_string()));
                    for name in names {
                        if declaration.kind == VarKind::Let {
                            agent.create_mutable_binding(env, &name, false)?;
                        } else {
                            agent.create_immutable_binding(env, &name, true)?;
                        }
                    }
                }
                Statement::FunctionDeclaration(function) => {
                    let private_env = agent.running_execution_context().private_environment.clone();
                    let object = agent.instantiate_function_object(function, env.clone(), private_env);
                    agent.create_mutable_binding(env, &function.name, false)?;
                    agent.initialize_binding(env, &function.name, JsValue::Object(object))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Binds parameters, `arguments` and hoisted declarations in the callee's environment.
    fn function_prologue(&self, agent: &mut Agent, function: &Rc<FunctionDecl>) -> JsResult<()> {
        let env = Self::lexical_environment(agent);
        let context = agent.running_execution_context();
        let callee = context.function.clone();
        let arguments = context.arguments.clone();
        let passed = context.passed_argument_count;

        let names = function.parameter_names();
        for (index, name) in names.iter().enumerate() {
            let value = arguments.get(index).cloned().unwrap_or(JsValue::Undefined);
            if agent.has_binding(&env, name)? {
                agent.set_mutable_binding(&env, name, value, false)?;
            } else {
                agent.create_mutable_binding(&env, name, false)?;
                agent.initialize_binding(&env, name, value)?;
            }
        }

        if !function.is_arrow && !names.iter().any(|name| name == "arguments") {
            let passed_arguments = &arguments[..passed];
            let object = match &callee {
                Some(callee) if !self.strict && function.has_simple_parameter_list() => {
                    agent.create_mapped_arguments_object(callee, &names, passed_arguments, &env)
                }
                _ => agent.create_unmapped_arguments_object(passed_arguments),
            };
            if self.strict {
                agent.create_immutable_binding(&env, "arguments", false)?;
            } else {
                agent.create_mutable_binding(&env, "arguments", false)?;
            }
            agent.initialize_binding(&env, "arguments", JsValue::Object(object))?;
        }

        let program = Program::new(function.body.clone());
        let mut var_names = Vec::new();
        program.for_each_var_declared_name(&mut |name| var_names.push(name.to_string()));
        for name in var_names {
            if !agent.has_binding(&env, &name)? {
                agent.create_mutable_binding(&env, &name, false)?;
                agent.initialize_binding(&env, &name, JsValue::Undefined)?;
            }
        }
        let mut functions = Vec::new();
        program.for_each_var_function_declaration_in_reverse(&mut |f| functions.push(f.clone()));
        let mut seen = FxHashSet::default();
        for declaration in functions {
            if seen.insert(declaration.name.clone()) {
                let object = agent.instantiate_function_object(&declaration, env.clone(), None);
                agent.set_mutable_binding(&env, &declaration.name, JsValue::Object(object), false)?;
            }
        }
        let lexical: Vec<Statement> = function
            .body
            .iter()
            .filter(|s| matches!(s, Statement::Variable(d) if d.kind.is_lexical()))
            .cloned()
            .collect();
        Self::declare_lexical(agent, &env, &lexical)
    }

    fn statements(&self, agent: &mut Agent, body: &[Statement]) -> JsResult<Flow> {
        let mut completion = None;
        for statement in body {
            match self.statement(agent, statement)? {
                Flow::Normal(Some(value)) => completion = Some(value),
                Flow::Normal(None) => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal(completion))
    }

    fn block(&self, agent: &mut Agent, body: &[Statement]) -> JsResult<Flow> {
        let outer = Self::lexical_environment(agent);
        let block_env = new_declarative_environment(Some(outer.clone()));
        Self::declare_lexical(agent, &block_env, body)?;
        agent.running_execution_context_mut().lexical_environment = Some(block_env.clone());
        let result = self.statements(agent, body);
        let completion = result.as_ref().map(|_| JsValue::Undefined).map_err(Clone::clone);
        let disposed = agent.dispose_environment_resources(&block_env, completion);
        agent.running_execution_context_mut().lexical_environment = Some(outer);
        disposed?;
        result
    }

    fn statement(&self, agent: &mut Agent, statement: &Statement) -> JsResult<Flow> {
        match statement {
            Statement::Empty | Statement::Debugger => Ok(Flow::Normal(None)),
            Statement::Expression(expression) => Ok(Flow::Normal(Some(self.expression(agent, expression)?))),
            Statement::Block(body) => self.block(agent, body),
            Statement::Return(value) => {
                let value = match value {
                    Some(expression) => self.expression(agent, expression)?,
                    None => JsValue::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Statement::Throw(expression) => Err(EngineError::Throw(self.expression(agent, expression)?)),
            Statement::If(s) => {
                let test = self.expression(agent, &s.test)?;
                if to_boolean(&test) {
                    self.statement(agent, &s.consequent)
                } else if let Some(alternate) = &s.alternate {
                    self.statement(agent, alternate)
                } else {
                    Ok(Flow::Normal(None))
                }
            }
            Statement::Variable(declaration) => {
                for declarator in &declaration.declarations {
                    let Pattern::Identifier(name) = &declarator.pattern else {
                        unimplemented!("test backend binds identifiers only");
                    };
                    let value = match &declarator.init {
                        Some(init) => self.expression(agent, init)?,
                        None if declaration.kind == VarKind::Var => continue,
                        None => JsValue::Undefined,
                    };
                    match declaration.kind {
                        VarKind::Var => self.assign_identifier(agent, name, value)?,
                        VarKind::Let | VarKind::Const => {
                            let env = Self::lexical_environment(agent);
                            agent.initialize_binding(&env, name, value)?;
                        }
                        VarKind::Using | VarKind::AwaitUsing => {
                            let env = Self::lexical_environment(agent);
                            agent.initialize_binding(&env, name, value.clone())?;
                            let hint = if declaration.kind == VarKind::Using {
                                DisposeHint::Sync
                            } else {
                                DisposeHint::Async
                            };
                            agent.add_disposable_resource_to_environment(&env, value, hint, None)?;
                        }
                    }
                }
                Ok(Flow::Normal(None))
            }
            Statement::FunctionDeclaration(function) => {
                if function.should_do_additional_annex_b_steps() {
                    let lexical = Self::lexical_environment(agent);
                    let variable = Self::variable_environment(agent);
                    let value = agent.get_binding_value(&lexical, &function.name, false)?;
                    agent.set_mutable_binding(&variable, &function.name, value, false)?;
                }
                Ok(Flow::Normal(None))
            }
            Statement::ClassDeclaration(_) => Ok(Flow::Normal(None)),
            other => unimplemented!("test backend does not run {other:?}"),
        }
    }

    fn assign_identifier(&self, agent: &mut Agent, name: &str, value: JsValue) -> JsResult<()> {
        match agent.resolve_binding(name, None)? {
            Some(env) => agent.set_mutable_binding(&env, name, value, self.strict),
            None if self.strict => agent.throw_reference_error(ErrorType::UnknownIdentifier, name),
            None => {
                let global = agent.current_realm().global_object.clone();
                let receiver = JsValue::Object(global.clone());
                agent.set(&global, &PropertyKey::from(name), value, &receiver)?;
                Ok(())
            }
        }
    }

    fn arguments(&self, agent: &mut Agent, arguments: &[Expression]) -> JsResult<Vec<JsValue>> {
        arguments.iter().map(|a| self.expression(agent, a)).collect()
    }

    fn expression(&self, agent: &mut Agent, expression: &Expression) -> JsResult<JsValue> {
        match expression {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Undefined => JsValue::Undefined,
                Literal::Null => JsValue::Null,
                Literal::Boolean(b) => JsValue::Boolean(*b),
                Literal::Number(n) => JsValue::Number(*n),
                Literal::String(s) => JsValue::string(s),
            }),
            Expression::Identifier(name) => match agent.resolve_binding(name, None)? {
                Some(env) => agent.get_binding_value(&env, name, self.strict),
                None => agent.throw_reference_error(ErrorType::UnknownIdentifier, name),
            },
            Expression::This => agent.resolve_this_binding(),
            Expression::NewTarget => Ok(agent.get_new_target()),
            Expression::Function(function) | Expression::ArrowFunction(function) => {
                let env = Self::lexical_environment(agent);
                let private_env = agent.running_execution_context().private_environment.clone();
                Ok(JsValue::Object(agent.instantiate_function_object(function, env, private_env)))
            }
            Expression::Member(base, property) => {
                let base = self.expression(agent, base)?;
                let object = agent.to_object(&base)?;
                agent.get(&object, &PropertyKey::from(property.as_str()), &base)
            }
            Expression::Assign(target, value) => {
                let value = self.expression(agent, value)?;
                match &**target {
                    Expression::Identifier(name) => self.assign_identifier(agent, name, value.clone())?,
                    Expression::Member(base, property) => {
                        let base = self.expression(agent, base)?;
                        let object = agent.to_object(&base)?;
                        agent.set(&object, &PropertyKey::from(property.as_str()), value.clone(), &base)?;
                    }
                    other => unimplemented!("test backend cannot assign to {other:?}"),
                }
                Ok(value)
            }
            Expression::Call(callee, arguments) => {
                let (function, this_value) = match &**callee {
                    Expression::Member(base, property) => {
                        let base = self.expression(agent, base)?;
                        let object = agent.to_object(&base)?;
                        let function = agent.get(&object, &PropertyKey::from(property.as_str()), &base)?;
                        (function, base)
                    }
                    other => (self.expression(agent, other)?, JsValue::Undefined),
                };
                let arguments = self.arguments(agent, arguments)?;
                let intrinsic_eval = JsValue::Object(agent.current_realm().intrinsics.eval.clone());
                if matches!(&**callee, Expression::Identifier(name) if name == "eval") && function == intrinsic_eval {
                    let Some(source) = arguments.first() else {
                        return Ok(JsValue::Undefined);
                    };
                    let caller = if self.strict { CallerMode::Strict } else { CallerMode::NonStrict };
                    return agent.perform_eval(source, caller, EvalMode::Direct);
                }
                agent.call(&function, &this_value, &arguments)
            }
            Expression::New(callee, arguments) => {
                let constructor = self.expression(agent, callee)?;
                let arguments = self.arguments(agent, arguments)?;
                Ok(JsValue::Object(agent.construct(&constructor, &arguments, None)?))
            }
            Expression::Binary(op, left, right) => {
                let left = self.expression(agent, left)?;
                let right = self.expression(agent, right)?;
                match op {
                    BinaryOp::Add => Ok(JsValue::Number(agent.to_number(&left)? + agent.to_number(&right)?)),
                    BinaryOp::Sub => Ok(JsValue::Number(agent.to_number(&left)? - agent.to_number(&right)?)),
                    BinaryOp::StrictEq => Ok(JsValue::Boolean(strict_equality(&left, &right))),
                }
            }
            Expression::Sequence(expressions) => {
                let mut value = JsValue::Undefined;
                for expression in expressions {
                    value = self.expression(agent, expression)?;
                }
                Ok(value)
            }
            Expression::Import(specifier, options) => {
                let specifier = self.expression(agent, specifier)?;
                let options = match options {
                    Some(options) => self.expression(agent, options)?,
                    None => JsValue::Undefined,
                };
                agent.perform_import_call(&specifier, &options)
            }
            other => unimplemented!("test backend does not evaluate {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walker_runs_blocks_with_using_declarations() {
        let (mut agent, backend, _) = test_agent();
        let global_env = agent.current_realm().global_env.clone();
        let resource = agent.object_create();
        let dispose_key = agent.well_known_key(crate::types::WellKnownSymbol::Dispose);
        let disposed = Rc::new(Cell::new(false));
        let flag = disposed.clone();
        let method = agent.create_builtin_function(
            "dispose",
            0,
            Rc::new(move |_, _, _| {
                flag.set(true);
                Ok(JsValue::Undefined)
            }),
        );
        resource.borrow_mut().insert_builtin(dispose_key, JsValue::Object(method));
        agent
            .create_global_var_binding(&global_env, "resource", true)
            .unwrap();
        let receiver = JsValue::Object(agent.current_realm().global_object.clone());
        let global = agent.current_realm().global_object.clone();
        agent
            .set(&global, &PropertyKey::from("resource"), JsValue::Object(resource), &receiver)
            .unwrap();

        let body = vec![Statement::Block(vec![Statement::Variable(crate::ast::VariableDeclaration {
            kind: VarKind::Using,
            declarations: vec![crate::ast::VariableDeclarator {
                pattern: Pattern::Identifier("r".into()),
                init: Some(Expression::Identifier("resource".into())),
            }],
        })])];
        let f = agent.instantiate_function_object(&function_decl("f", &[], body), global_env, None);
        agent.call(&JsValue::Object(f), &JsValue::Undefined, &[]).unwrap();
        assert!(disposed.get());
        assert_eq!(backend.observed_frames.borrow().len(), 1);
    }
}
