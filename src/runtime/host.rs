use super::import::{ImportReferrer, ModuleRequest};
use super::realm::Realm;
use super::{Agent, ErrorType, JsResult};
use crate::ast::{FunctionDecl, Program};
use crate::types::{JsObject, JsString, JsValue};
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Flags handed to the parser for an eval body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub in_function: bool,
    pub allow_super_property: bool,
    pub allow_super_call: bool,
    pub in_class_field_initializer: bool,
    pub strict: bool,
    /// Private names visible from the enclosing classes, innermost first.
    pub private_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.line, self.column)
    }
}

/// A compiled program or function body, opaque to the core apart from its frame layout.
pub struct Executable {
    pub name: String,
    pub number_of_registers: usize,
    pub constants: Vec<JsValue>,
    pub local_variable_names: Vec<String>,
    pub code: Rc<dyn Any>,
}

impl Executable {
    pub fn frame_size(&self) -> usize {
        self.number_of_registers + self.constants.len() + self.local_variable_names.len()
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executable")
            .field("name", &self.name)
            .field("registers", &self.number_of_registers)
            .field("constants", &self.constants.len())
            .field("locals", &self.local_variable_names)
            .finish()
    }
}

// §27.2.1.1 PromiseCapability Records
#[derive(Debug, Clone)]
pub struct PromiseCapability {
    pub promise: JsObject,
    pub resolve: JsValue,
    pub reject: JsValue,
}

/// Parser, compiler and interpreter collaborators.
pub trait Backend {
    fn parse_program(&self, source: &JsString, options: &ParseOptions) -> Result<Rc<Program>, Vec<ParseError>>;

    fn compile_program(&self, agent: &mut Agent, program: &Rc<Program>, strict: bool) -> JsResult<Rc<Executable>>;

    fn compile_function(&self, agent: &mut Agent, function: &Rc<FunctionDecl>) -> JsResult<Rc<Executable>>;

    /// Runs `executable` in the running execution context. `None` means no completion value.
    fn run(&self, agent: &mut Agent, executable: &Rc<Executable>) -> JsResult<Option<JsValue>>;

    /// Suspends the running async function until `value` settles.
    fn await_value(&self, agent: &mut Agent, value: JsValue) -> JsResult<JsValue>;

    // §27.2.1.5 NewPromiseCapability(%Promise%)
    fn new_promise_capability(&self, agent: &mut Agent) -> JsResult<PromiseCapability>;
}

/// Embedder policy hooks.
pub trait HostHooks {
    // §19.2.1.2 HostEnsureCanCompileStrings(calleeRealm, parameterStrings, bodyString, direct)
    fn ensure_can_compile_strings(
        &self,
        _agent: &mut Agent,
        _realm: &Rc<Realm>,
        _source: &JsString,
        _direct: bool,
    ) -> JsResult<()> {
        Ok(())
    }

    // HostGetCodeForEval(argument)
    fn get_code_for_eval(&self, _agent: &mut Agent, _object: &JsObject) -> JsResult<Option<JsString>> {
        Ok(None)
    }

    // §16.2.1.8 HostGetSupportedImportAttributes()
    fn supported_import_attributes(&self) -> Vec<JsString> {
        vec![JsString::from("type")]
    }

    // §16.2.1.10 HostLoadImportedModule(referrer, moduleRequest, hostDefined, payload)
    fn load_imported_module(
        &self,
        agent: &mut Agent,
        _referrer: ImportReferrer,
        request: ModuleRequest,
        capability: PromiseCapability,
    ) -> JsResult<()> {
        let error = agent.create_error(
            super::ErrorKind::TypeError,
            &ErrorType::ModuleNotFound.message(&request.specifier.to_rust_string()),
        );
        agent.call(&capability.reject, &JsValue::Undefined, &[error])?;
        Ok(())
    }
}

/// Hooks that allow every compilation and load no modules.
#[derive(Debug, Default)]
pub struct DefaultHost;

impl HostHooks for DefaultHost {}
