//! Abstract-operation core of an ECMAScript engine: the call gateway,
//! environments, `eval`, declaration instantiation, arguments objects,
//! resource disposal and dynamic `import()`.
//!
//! Parsing, compilation and execution are supplied by a [`runtime::Backend`];
//! embedder policy by [`runtime::HostHooks`].

pub mod ast;
pub mod runtime;
pub mod types;

#[cfg(test)]
mod test_support;

pub use runtime::{Agent, AgentOptions, EngineError, JsResult};
pub use types::{JsObject, JsString, JsValue};
