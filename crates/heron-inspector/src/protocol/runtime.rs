//! `Runtime` domain: remote values and their properties

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a registered script
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(pub String);

impl std::fmt::Display for ScriptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of an object owned by the executor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteObjectId(pub String);

/// Primitive values JSON cannot carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnserializableValue {
    Infinity,
    NaN,
    #[serde(rename = "-Infinity")]
    NegativeInfinity,
    #[serde(rename = "-0")]
    NegativeZero,
}

impl UnserializableValue {
    /// Classify a number JSON cannot represent faithfully
    pub fn of(n: f64) -> Option<Self> {
        if n.is_nan() {
            Some(Self::NaN)
        } else if n == f64::INFINITY {
            Some(Self::Infinity)
        } else if n == f64::NEG_INFINITY {
            Some(Self::NegativeInfinity)
        } else if n == 0.0 && n.is_sign_negative() {
            Some(Self::NegativeZero)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteObjectType {
    Object,
    Function,
    Undefined,
    String,
    Number,
    Boolean,
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteObjectSubtype {
    Array,
    Null,
    Regexp,
    Date,
    Map,
    Set,
    Weakmap,
    Weakset,
    Iterator,
    Generator,
    Error,
    Proxy,
    Promise,
    Typedarray,
}

/// Mirror of a value living in the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub kind: RemoteObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<RemoteObjectSubtype>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unserializable_value: Option<UnserializableValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<RemoteObjectId>,
}

impl RemoteObject {
    fn primitive(kind: RemoteObjectType) -> Self {
        Self {
            kind,
            subtype: None,
            class_name: None,
            value: None,
            unserializable_value: None,
            description: None,
            object_id: None,
        }
    }

    pub fn undefined() -> Self {
        Self::primitive(RemoteObjectType::Undefined)
    }

    pub fn null() -> Self {
        Self {
            subtype: Some(RemoteObjectSubtype::Null),
            value: Some(Value::Null),
            ..Self::primitive(RemoteObjectType::Object)
        }
    }

    pub fn boolean(b: bool) -> Self {
        Self {
            value: Some(Value::Bool(b)),
            ..Self::primitive(RemoteObjectType::Boolean)
        }
    }

    pub fn number(n: f64) -> Self {
        let mut object = Self {
            description: Some(format_number(n)),
            ..Self::primitive(RemoteObjectType::Number)
        };
        match UnserializableValue::of(n) {
            Some(special) => object.unserializable_value = Some(special),
            None => object.value = serde_json::Number::from_f64(n).map(Value::Number),
        }
        object
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self {
            value: Some(Value::String(s.into())),
            ..Self::primitive(RemoteObjectType::String)
        }
    }

    /// Reference to an object the host can expand with `Runtime.getProperties`
    pub fn object(
        id: RemoteObjectId,
        class_name: impl Into<String>,
        subtype: Option<RemoteObjectSubtype>,
    ) -> Self {
        let class_name = class_name.into();
        Self {
            subtype,
            description: Some(class_name.clone()),
            class_name: Some(class_name),
            object_id: Some(id),
            ..Self::primitive(RemoteObjectType::Object)
        }
    }
}

fn format_number(n: f64) -> String {
    match UnserializableValue::of(n) {
        Some(UnserializableValue::NaN) => "NaN".into(),
        Some(UnserializableValue::Infinity) => "Infinity".into(),
        Some(UnserializableValue::NegativeInfinity) => "-Infinity".into(),
        Some(UnserializableValue::NegativeZero) => "-0".into(),
        None if n.fract() == 0.0 && n.abs() < 1e21 => format!("{}", n as i64),
        None => n.to_string(),
    }
}

/// Own or inherited property of a remote object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
    #[serde(default)]
    pub writable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<RemoteObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<RemoteObject>,
    pub configurable: bool,
    pub enumerable: bool,
    #[serde(default)]
    pub is_own: bool,
}

impl PropertyDescriptor {
    /// Writable, enumerable, configurable own data property
    pub fn data(name: impl Into<String>, value: RemoteObject) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            writable: true,
            get: None,
            set: None,
            configurable: true,
            enumerable: true,
            is_own: true,
        }
    }
}

/// Argument passed to a remote call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallArgument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unserializable_value: Option<UnserializableValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<RemoteObjectId>,
}

/// Frame of a runtime stack trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub function_name: String,
    pub script_id: ScriptId,
    pub url: String,
    /// 0-based
    pub line_number: u32,
    /// 0-based
    pub column_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub call_frames: Vec<CallFrame>,
}

/// Details of an exception thrown while evaluating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub exception_id: u32,
    pub text: String,
    pub line_number: u32,
    pub column_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<ScriptId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<StackTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// Exception without a source location
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            exception_id: 0,
            text: text.into(),
            line_number: 0,
            column_number: 0,
            script_id: None,
            url: None,
            stack_trace: None,
            exception: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesParams {
    pub object_id: RemoteObjectId,
    #[serde(default)]
    pub own_properties: bool,
    #[serde(default)]
    pub accessor_properties_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesResult {
    pub result: Vec<PropertyDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}
