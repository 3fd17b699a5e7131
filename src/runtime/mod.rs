pub mod arguments;
pub mod call;
pub mod disposable;
pub mod environment;
pub mod error;
pub mod eval;
pub mod function;
pub mod helpers;
pub mod host;
pub mod import;
pub mod object;
pub mod options;
pub mod property;
pub mod realm;
pub mod substitution;

pub use call::{ExecutionContext, ScriptOrModule, StackFrameSize};
pub use disposable::{DisposableResource, DisposeCapability, DisposeHint};
pub use environment::{EnvRef, Environment, EnvironmentKind, PrivateEnvRef};
pub use error::{EngineError, ErrorKind, ErrorType, JsResult, TerminationReason};
pub use eval::{CallerMode, EvalMode};
pub use function::{FunctionKind, NativeFn};
pub use host::{Backend, DefaultHost, Executable, HostHooks, ParseError, ParseOptions, PromiseCapability};
pub use import::{ImportAttribute, ImportReferrer, ModuleRequest};
pub use object::JsObjectData;
pub use options::AgentOptions;
pub use property::{PropertyDescriptor, PropertyKey};
pub use realm::{Intrinsics, Realm};

use crate::types::{JsString, JsSymbol, JsValue, WellKnownSymbol};
use std::rc::Rc;

/// One thread of script execution: its realm, context stack and collaborators.
pub struct Agent {
    pub(crate) options: AgentOptions,
    symbols: Vec<JsSymbol>,
    next_symbol_id: u64,
    pub(crate) execution_context_stack: Vec<ExecutionContext>,
    pub(crate) realm: Rc<Realm>,
    pub(crate) backend: Rc<dyn Backend>,
    pub(crate) host: Rc<dyn HostHooks>,
    /// `new.target` of the running native function, if it was constructed.
    pub(crate) new_target: Option<JsValue>,
}

impl Agent {
    pub fn new(options: AgentOptions, backend: Rc<dyn Backend>, host: Rc<dyn HostHooks>) -> Self {
        let symbols = WellKnownSymbol::ALL
            .iter()
            .enumerate()
            .map(|(id, symbol)| JsSymbol {
                id: id as u64,
                description: Some(JsString::from(symbol.description())),
            })
            .collect::<Vec<_>>();
        Self {
            options,
            next_symbol_id: symbols.len() as u64,
            symbols,
            execution_context_stack: Vec::new(),
            realm: Realm::create(),
            backend,
            host,
            new_target: None,
        }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn host(&self) -> Rc<dyn HostHooks> {
        self.host.clone()
    }

    /// The running context's realm, or the agent's realm when idle.
    pub fn current_realm(&self) -> Rc<Realm> {
        match self.execution_context_stack.last() {
            Some(context) => context.realm.clone(),
            None => self.realm.clone(),
        }
    }

    pub fn well_known_symbol(&self, symbol: WellKnownSymbol) -> JsSymbol {
        let index = WellKnownSymbol::ALL
            .iter()
            .position(|s| *s == symbol)
            .unwrap_or_default();
        self.symbols[index].clone()
    }

    pub fn well_known_key(&self, symbol: WellKnownSymbol) -> PropertyKey {
        PropertyKey::Symbol(self.well_known_symbol(symbol))
    }

    pub fn new_symbol(&mut self, description: Option<&str>) -> JsSymbol {
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        JsSymbol {
            id,
            description: description.map(JsString::from),
        }
    }

    /// `new.target` seen by the running native function.
    pub fn new_target(&self) -> Option<JsValue> {
        self.new_target.clone()
    }
}
