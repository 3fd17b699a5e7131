use super::call::ExecutionContext;
use super::environment::{EnvRef, PrivateEnvRef, new_declarative_environment};
use super::function::{ConstructorKind, FunctionKind};
use super::host::ParseOptions;
use super::{Agent, ErrorKind, ErrorType, JsResult};
use crate::ast::{FunctionDecl, Program};
use crate::types::{JsString, JsValue};
use rustc_hash::FxHashSet;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerMode {
    Strict,
    NonStrict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Direct,
    Indirect,
}

/// Syntactic privileges a direct eval inherits from its enclosing function.
#[derive(Debug, Default, Clone, Copy)]
struct EvalPrivileges {
    in_function: bool,
    in_method: bool,
    in_derived_constructor: bool,
    in_class_field_initializer: bool,
}

impl Agent {
    fn eval_privileges(&self) -> EvalPrivileges {
        let this_env = self.get_this_environment();
        let function_object = match this_env.borrow().function_environment() {
            Some(function_env) => function_env.function_object.clone(),
            None => return EvalPrivileges::default(),
        };
        let mut privileges = EvalPrivileges {
            in_function: true,
            in_method: self.has_super_binding(&this_env),
            ..Default::default()
        };
        if let Some(FunctionKind::Ordinary(f)) = &function_object.borrow().callable {
            privileges.in_derived_constructor = f.constructor_kind == Some(ConstructorKind::Derived);
            privileges.in_class_field_initializer = f.class_field_initializer_name.is_some();
        }
        privileges
    }

    // §19.2.1.1 PerformEval(x, strictCaller, direct)
    pub fn perform_eval(&mut self, x: &JsValue, caller: CallerMode, mode: EvalMode) -> JsResult<JsValue> {
        debug_assert!(mode == EvalMode::Direct || caller == CallerMode::NonStrict);

        let source: JsString = match x {
            JsValue::String(s) => s.clone(),
            JsValue::Object(object) => {
                let host = self.host.clone();
                match host.get_code_for_eval(self, object)? {
                    Some(code) => code,
                    None => return Ok(x.clone()),
                }
            }
            _ => return Ok(x.clone()),
        };

        let eval_realm = self.current_realm();
        let host = self.host.clone();
        host.ensure_can_compile_strings(self, &eval_realm, &source, mode == EvalMode::Direct)?;

        let privileges = match mode {
            EvalMode::Direct => self.eval_privileges(),
            EvalMode::Indirect => EvalPrivileges::default(),
        };
        let running = self.execution_context_stack.last();
        let running_private_env = running.and_then(|context| context.private_environment.clone());
        let script_or_module = running.and_then(|context| context.script_or_module.clone());

        let private_names = match (&running_private_env, mode) {
            (Some(private_env), EvalMode::Direct) => private_env.borrow().visible_names(),
            _ => Vec::new(),
        };
        let options = ParseOptions {
            in_function: privileges.in_function,
            allow_super_property: privileges.in_method,
            allow_super_call: privileges.in_derived_constructor,
            in_class_field_initializer: privileges.in_class_field_initializer,
            strict: caller == CallerMode::Strict,
            private_names,
        };
        let backend = self.backend.clone();
        let program = match backend.parse_program(&source, &options) {
            Ok(program) => program,
            Err(errors) => {
                let message = errors
                    .first()
                    .map_or_else(|| "Invalid eval source".to_string(), ToString::to_string);
                return self.throw_syntax_error(&message);
            }
        };

        let strict_eval = caller == CallerMode::Strict || program.is_strict_mode();
        debug!(
            ?mode,
            strict = strict_eval,
            source_length = source.len(),
            "perform eval"
        );

        let (lexical_env, mut variable_env, private_env) = match mode {
            EvalMode::Direct => {
                let running_lexical = self.running_lexical_environment();
                let variable_env = match &self.running_execution_context().variable_environment {
                    Some(env) => env.clone(),
                    None => unreachable!("direct eval outside of a variable environment"),
                };
                (
                    new_declarative_environment(Some(running_lexical)),
                    variable_env,
                    running_private_env,
                )
            }
            EvalMode::Indirect => {
                let global_env = eval_realm.global_env.clone();
                (new_declarative_environment(Some(global_env.clone())), global_env, None)
            }
        };
        if strict_eval {
            variable_env = lexical_env.clone();
        }
        if mode == EvalMode::Direct && !strict_eval {
            mark_affected_by_eval(&variable_env);
        }

        if let Err(error) = self.eval_declaration_instantiation(
            &program,
            &variable_env,
            &lexical_env,
            private_env.as_ref(),
            strict_eval,
        ) {
            debug!(%error, "eval declaration instantiation failed");
            return Err(error);
        }

        let executable = backend.compile_program(self, &program, strict_eval)?;
        if self.options.dump_executables {
            debug!(?executable, "eval executable");
        }

        let mut eval_context = ExecutionContext::new(eval_realm);
        eval_context.script_or_module = script_or_module;
        eval_context.variable_environment = Some(variable_env);
        eval_context.lexical_environment = Some(lexical_env);
        eval_context.private_environment = private_env;
        eval_context.registers = vec![JsValue::Undefined; executable.frame_size()];
        eval_context.executable = Some(executable.clone());

        let result = self.with_execution_context(eval_context, |agent| backend.run(agent, &executable))?;
        Ok(result.unwrap_or(JsValue::Undefined))
    }

    /// Walks from `lexical_env` out to (not including) `variable_env`,
    /// skipping object environments.
    fn intervening_declarative_environments(lexical_env: &EnvRef, variable_env: &EnvRef) -> Vec<EnvRef> {
        let mut environments = Vec::new();
        let mut current = lexical_env.clone();
        while !Rc::ptr_eq(&current, variable_env) {
            if !current.borrow().is_object_environment() {
                environments.push(current.clone());
            }
            let outer = current.borrow().outer();
            let Some(outer) = outer else {
                unreachable!("variable environment is not on the lexical chain");
            };
            current = outer;
        }
        environments
    }

    // §19.2.1.3 EvalDeclarationInstantiation(body, varEnv, lexEnv, privateEnv, strict)
    pub fn eval_declaration_instantiation(
        &mut self,
        program: &Program,
        variable_env: &EnvRef,
        lexical_env: &EnvRef,
        private_env: Option<&PrivateEnvRef>,
        strict: bool,
    ) -> JsResult<()> {
        let var_env_is_global = variable_env.borrow().is_global();

        let mut var_names = Vec::new();
        program.for_each_var_declared_name(&mut |name| var_names.push(name.to_string()));

        if !strict {
            if var_env_is_global {
                for name in &var_names {
                    if self.has_lexical_declaration(variable_env, name) {
                        return self.throw_error(ErrorKind::SyntaxError, ErrorType::TopLevelVariableAlreadyDeclared, name);
                    }
                }
            }
            for env in Self::intervening_declarative_environments(lexical_env, variable_env) {
                for name in &var_names {
                    if self.has_binding(&env, name)? {
                        return self.throw_error(ErrorKind::SyntaxError, ErrorType::TopLevelVariableAlreadyDeclared, name);
                    }
                }
            }
        }

        // Last declaration of a name wins; collected last-first.
        let mut var_functions = Vec::new();
        program.for_each_var_function_declaration_in_reverse(&mut |function| var_functions.push(function.clone()));
        let mut functions_to_initialize: Vec<Rc<FunctionDecl>> = Vec::new();
        let mut declared_function_names = FxHashSet::default();
        for function in var_functions {
            if !declared_function_names.insert(function.name.clone()) {
                continue;
            }
            if var_env_is_global && !self.can_declare_global_function(variable_env, &function.name)? {
                return self.throw_type_error(ErrorType::CannotDeclareGlobalFunction, &function.name);
            }
            functions_to_initialize.push(function);
        }

        // §B.3.2.3 Changes to EvalDeclarationInstantiation
        if !strict {
            let mut hoistable = Vec::new();
            program.for_each_annex_b_hoistable_function(&mut |function| hoistable.push(function.clone()));
            let mut hoisted_functions = FxHashSet::default();
            let intervening = Self::intervening_declarative_environments(lexical_env, variable_env);
            for function in hoistable {
                let name = function.name.as_str();
                let mut binding_exists = false;
                for env in &intervening {
                    if self.has_binding(env, name)? {
                        binding_exists = true;
                        break;
                    }
                }
                if binding_exists {
                    continue;
                }
                if var_env_is_global
                    && (self.has_lexical_declaration(variable_env, name)
                        || !self.can_declare_global_var(variable_env, name)?)
                {
                    continue;
                }
                if !declared_function_names.contains(name) && !hoisted_functions.contains(name) {
                    if var_env_is_global {
                        self.create_global_var_binding(variable_env, name, true)?;
                    } else if !self.has_binding(variable_env, name)? {
                        self.create_mutable_binding(variable_env, name, true)?;
                        self.initialize_binding(variable_env, name, JsValue::Undefined)?;
                    }
                }
                hoisted_functions.insert(name.to_string());
                function.set_should_do_additional_annex_b_steps();
            }
        }

        let mut declared_var_names: Vec<String> = Vec::new();
        let mut seen_var_names = FxHashSet::default();
        let mut bound_names = Vec::new();
        program.for_each_var_scoped_variable_declaration(&mut |declaration| {
            declaration.for_each_bound_name(&mut |name| bound_names.push(name.to_string()));
        });
        for name in bound_names {
            if declared_function_names.contains(&name) {
                continue;
            }
            if var_env_is_global && !self.can_declare_global_var(variable_env, &name)? {
                return self.throw_type_error(ErrorType::CannotDeclareGlobalVariable, &name);
            }
            if seen_var_names.insert(name.clone()) {
                declared_var_names.push(name);
            }
        }

        let mut lexical_names = Vec::new();
        program.for_each_lexically_scoped_declaration(&mut |declaration| {
            let constant = declaration.is_constant_declaration();
            declaration.for_each_bound_name(&mut |name| lexical_names.push((name.to_string(), constant)));
        });
        for (name, constant) in lexical_names {
            if constant {
                self.create_immutable_binding(lexical_env, &name, true)?;
            } else {
                self.create_mutable_binding(lexical_env, &name, false)?;
            }
        }

        for function in functions_to_initialize.iter().rev() {
            let name = function.name.as_str();
            let object = self.instantiate_function_object(function, lexical_env.clone(), private_env.cloned());
            let value = JsValue::Object(object);
            if var_env_is_global {
                self.create_global_function_binding(variable_env, name, value, true)?;
            } else if self.has_binding(variable_env, name)? {
                self.set_mutable_binding(variable_env, name, value, false)?;
            } else {
                self.create_mutable_binding(variable_env, name, true)?;
                self.initialize_binding(variable_env, name, value)?;
            }
        }

        for name in &declared_var_names {
            if var_env_is_global {
                self.create_global_var_binding(variable_env, name, true)?;
            } else if !self.has_binding(variable_env, name)? {
                self.create_mutable_binding(variable_env, name, true)?;
                self.initialize_binding(variable_env, name, JsValue::Undefined)?;
            }
        }
        Ok(())
    }
}

fn mark_affected_by_eval(variable_env: &EnvRef) {
    let mut env = Some(variable_env.clone());
    while let Some(current) = env {
        current.borrow_mut().set_affected_by_eval();
        env = current.borrow().outer();
    }
}
