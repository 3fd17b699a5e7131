use super::call::ScriptOrModule;
use super::host::PromiseCapability;
use super::realm::Realm;
use super::{Agent, EngineError, ErrorKind, ErrorType, JsResult, PropertyKey};
use crate::types::{JsString, JsValue};
use std::rc::Rc;
use tracing::debug;

// ImportAttribute Records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportAttribute {
    pub key: JsString,
    pub value: JsString,
}

// ModuleRequest Records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub specifier: JsString,
    /// Sorted by key, compared as UTF-16 code units.
    pub attributes: Vec<ImportAttribute>,
}

impl ModuleRequest {
    pub fn new(specifier: JsString, mut attributes: Vec<ImportAttribute>) -> Self {
        attributes.sort_by(|a, b| a.key.code_units.cmp(&b.key.code_units));
        Self { specifier, attributes }
    }
}

/// Who asked for a module: the active script or module, or failing that the current realm.
#[derive(Clone)]
pub enum ImportReferrer {
    ScriptOrModule(ScriptOrModule),
    Realm(Rc<Realm>),
}

impl std::fmt::Debug for ImportReferrer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportReferrer::ScriptOrModule(referrer) => f.debug_tuple("ScriptOrModule").field(referrer).finish(),
            ImportReferrer::Realm(_) => f.write_str("Realm"),
        }
    }
}

enum Rejection {
    Value(JsValue),
    TypeError(ErrorType, &'static str),
}

impl Agent {
    // AllImportAttributesSupported(attributes)
    pub fn all_import_attributes_supported(&self, attributes: &[ImportAttribute]) -> bool {
        let supported = self.host.supported_import_attributes();
        attributes.iter().all(|attribute| supported.contains(&attribute.key))
    }

    fn reject_import(&mut self, capability: &PromiseCapability, rejection: Rejection) -> JsResult<JsValue> {
        let reason = match rejection {
            Rejection::Value(value) => value,
            Rejection::TypeError(error_type, arg) => self.create_error(ErrorKind::TypeError, &error_type.message(arg)),
        };
        self.call(&capability.reject, &JsValue::Undefined, &[reason])?;
        Ok(JsValue::Object(capability.promise.clone()))
    }

    fn import_attributes(&mut self, options: &JsValue) -> JsResult<Result<Vec<ImportAttribute>, Rejection>> {
        let JsValue::Object(options_object) = options else {
            return Ok(Err(Rejection::TypeError(ErrorType::NotAnObject, "options")));
        };
        let attributes_object = self.get(options_object, &PropertyKey::from("with"), options)?;
        let mut attributes = Vec::new();
        match &attributes_object {
            JsValue::Undefined => {}
            JsValue::Object(attributes_object) => {
                for (key, value) in self.enumerable_own_string_entries(attributes_object)? {
                    let JsValue::String(value) = value else {
                        return Ok(Err(Rejection::TypeError(ErrorType::NotAString, "Import attribute value")));
                    };
                    attributes.push(ImportAttribute { key, value });
                }
            }
            _ => return Ok(Err(Rejection::TypeError(ErrorType::NotAnObject, "with"))),
        }
        if !self.all_import_attributes_supported(&attributes) {
            let supported = self.host.supported_import_attributes();
            let key = attributes
                .iter()
                .find(|attribute| !supported.contains(&attribute.key))
                .map(|attribute| attribute.key.to_rust_string())
                .unwrap_or_default();
            let error = self.create_error(ErrorKind::TypeError, &ErrorType::ImportAttributeUnsupported.message(&key));
            return Ok(Err(Rejection::Value(error)));
        }
        Ok(Ok(attributes))
    }

    // §13.3.10.2 EvaluateImportCall(specifierExpression [, optionsExpression])
    pub fn perform_import_call(&mut self, specifier: &JsValue, options: &JsValue) -> JsResult<JsValue> {
        let referrer = match self.get_active_script_or_module() {
            Some(script_or_module) => ImportReferrer::ScriptOrModule(script_or_module),
            None => ImportReferrer::Realm(self.current_realm()),
        };
        let backend = self.backend.clone();
        let capability = backend.new_promise_capability(self)?;

        let specifier = match self.to_string(specifier) {
            Ok(specifier) => specifier,
            Err(EngineError::Throw(value)) => return self.reject_import(&capability, Rejection::Value(value)),
            Err(termination) => return Err(termination),
        };

        let mut attributes = Vec::new();
        if !options.is_undefined() {
            match self.import_attributes(options) {
                Ok(Ok(parsed)) => attributes = parsed,
                Ok(Err(rejection)) => return self.reject_import(&capability, rejection),
                Err(EngineError::Throw(value)) => return self.reject_import(&capability, Rejection::Value(value)),
                Err(termination) => return Err(termination),
            }
        }

        let request = ModuleRequest::new(specifier, attributes);
        debug!(specifier = %request.specifier, attributes = request.attributes.len(), ?referrer, "dynamic import");
        let host = self.host.clone();
        host.load_imported_module(self, referrer, request, capability.clone())?;
        Ok(JsValue::Object(capability.promise))
    }
}
