use super::{Agent, JsObjectData, PropertyDescriptor, PropertyKey};
use crate::types::{JsObject, JsValue};
use std::fmt;

/// Errors surfaced by the abstract operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// A thrown script value; catchable by script code.
    #[error("uncaught exception: {0}")]
    Throw(JsValue),

    /// A non-catchable termination condition.
    #[error("execution terminated: {0}")]
    Termination(TerminationReason),
}

impl EngineError {
    pub fn thrown_value(&self) -> Option<&JsValue> {
        match self {
            EngineError::Throw(value) => Some(value),
            EngineError::Termination(_) => None,
        }
    }
}

pub type JsResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    StackOverflow,
    /// An environment was asked to create a binding it already has.
    DuplicateBinding,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::StackOverflow => write!(f, "call stack size limit exceeded"),
            TerminationReason::DuplicateBinding => write!(f, "binding declared twice in one environment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    SyntaxError,
    ReferenceError,
    RangeError,
    SuppressedError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SuppressedError => "SuppressedError",
        }
    }
}

/// Message templates. Each template takes at most one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    NotAFunction,
    NotAConstructor,
    NotAnObject,
    NotAString,
    TopLevelVariableAlreadyDeclared,
    CannotDeclareGlobalFunction,
    CannotDeclareGlobalVariable,
    NoDisposeMethod,
    ImportAttributeUnsupported,
    ClassConstructorWithoutNew,
    DerivedConstructorReturningInvalidValue,
    ProxyRevoked,
    ProxyConstructBadReturnType,
    CalleeAccess,
    ConstantAssignment,
    BindingNotInitialized,
    UnknownIdentifier,
    ThisAlreadyInitialized,
    ThisNotInitialized,
    DescriptorNotApplied,
    CannotConvertToString,
    CannotConvertToObject,
    ModuleNotFound,
}

impl ErrorType {
    pub fn message(self, arg: &str) -> String {
        match self {
            ErrorType::NotAFunction => format!("{arg} is not a function"),
            ErrorType::NotAConstructor => format!("{arg} is not a constructor"),
            ErrorType::NotAnObject => format!("{arg} is not an object"),
            ErrorType::NotAString => format!("{arg} is not a string"),
            ErrorType::TopLevelVariableAlreadyDeclared => {
                format!("Redeclaration of top level variable '{arg}'")
            }
            ErrorType::CannotDeclareGlobalFunction => {
                format!("Cannot declare global function of name '{arg}'")
            }
            ErrorType::CannotDeclareGlobalVariable => {
                format!("Cannot declare global variable of name '{arg}'")
            }
            ErrorType::NoDisposeMethod => format!("{arg} does not have dispose method"),
            ErrorType::ImportAttributeUnsupported => {
                format!("Import attribute '{arg}' is not supported")
            }
            ErrorType::ClassConstructorWithoutNew => {
                format!("Class constructor {arg} must be called with 'new'")
            }
            ErrorType::DerivedConstructorReturningInvalidValue => {
                "Derived constructor return invalid value".to_string()
            }
            ErrorType::ProxyRevoked => {
                "An operation was performed on a revoked Proxy object".to_string()
            }
            ErrorType::ProxyConstructBadReturnType => {
                "Proxy handler's construct trap violates invariant: must return an object"
                    .to_string()
            }
            ErrorType::CalleeAccess => {
                "'caller', 'callee', and 'arguments' properties may not be accessed on strict mode functions or the arguments objects for calls to them".to_string()
            }
            ErrorType::ConstantAssignment => "Invalid assignment to const variable".to_string(),
            ErrorType::BindingNotInitialized => format!("Binding {arg} is not initialized"),
            ErrorType::UnknownIdentifier => format!("'{arg}' is not defined"),
            ErrorType::ThisAlreadyInitialized => {
                "Super constructor may only be called once".to_string()
            }
            ErrorType::ThisNotInitialized => {
                "Must call super constructor in derived class before accessing 'this'".to_string()
            }
            ErrorType::DescriptorNotApplied => format!("Cannot define property {arg}"),
            ErrorType::CannotConvertToString => format!("Cannot convert {arg} to string"),
            ErrorType::CannotConvertToObject => format!("ToObject on {arg}"),
            ErrorType::ModuleNotFound => format!("Cannot find module '{arg}'"),
        }
    }
}

impl Agent {
    pub(crate) fn create_error_object(&mut self, kind: ErrorKind) -> JsObject {
        let realm = self.current_realm();
        let intrinsics = &realm.intrinsics;
        let prototype = match kind {
            ErrorKind::Error => intrinsics.error_prototype.clone(),
            ErrorKind::TypeError => intrinsics.type_error_prototype.clone(),
            ErrorKind::SyntaxError => intrinsics.syntax_error_prototype.clone(),
            ErrorKind::ReferenceError => intrinsics.reference_error_prototype.clone(),
            ErrorKind::RangeError => intrinsics.range_error_prototype.clone(),
            ErrorKind::SuppressedError => intrinsics.suppressed_error_prototype.clone(),
        };
        let mut data = JsObjectData::with_prototype(Some(prototype));
        data.class_name = "Error".to_string();
        JsObject::new(data)
    }

    pub fn create_error(&mut self, kind: ErrorKind, message: &str) -> JsValue {
        let object = self.create_error_object(kind);
        object.borrow_mut().insert_property(
            PropertyKey::from("message"),
            PropertyDescriptor::data(JsValue::string(message), true, false, true),
        );
        JsValue::Object(object)
    }

    pub fn throw_error<T>(&mut self, kind: ErrorKind, error_type: ErrorType, arg: &str) -> JsResult<T> {
        let error = self.create_error(kind, &error_type.message(arg));
        Err(EngineError::Throw(error))
    }

    pub fn throw_type_error<T>(&mut self, error_type: ErrorType, arg: &str) -> JsResult<T> {
        self.throw_error(ErrorKind::TypeError, error_type, arg)
    }

    pub fn throw_reference_error<T>(&mut self, error_type: ErrorType, arg: &str) -> JsResult<T> {
        self.throw_error(ErrorKind::ReferenceError, error_type, arg)
    }

    pub fn throw_syntax_error<T>(&mut self, message: &str) -> JsResult<T> {
        let error = self.create_error(ErrorKind::SyntaxError, message);
        Err(EngineError::Throw(error))
    }
}
