//! Debugger-facing value descriptions.
//!
//! [`RemoteObject`] follows the shape DevTools front-ends expect: a `type`,
//! an optional `subtype`, the class name of objects, a printable
//! description and, for primitives, the value itself.

use serde::{Deserialize, Serialize};

use jsbind_core::{ObjectKind, ObjectRef, Value, value::number_to_string};

use crate::context::ExecutionContext;

/// Serializable description of a script value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<serde_json::Value>,
}

impl RemoteObject {
    pub(crate) fn describe(ctx: &ExecutionContext, value: &Value) -> Self {
        let realm = ctx.realm();
        let kind = realm.type_of(value).to_string();
        match value {
            Value::Undefined => Self::primitive(kind, None, None),
            Value::Null => Self {
                subtype: Some("null".into()),
                ..Self::primitive(kind, None, Some(serde_json::Value::Null))
            },
            Value::Bool(b) => Self::primitive(kind, None, Some((*b).into())),
            Value::Int(n) => Self::primitive(kind, None, Some((*n).into())),
            Value::Number(n) => match serde_json::Number::from_f64(*n) {
                Some(json) => Self::primitive(kind, None, Some(json.into())),
                None => Self::primitive(kind, Some(number_to_string(*n)), None),
            },
            Value::BigInt(n) => Self::primitive(kind, Some(format!("{n}n")), None),
            Value::String(s) => Self::primitive(kind, None, Some(s.to_string().into())),
            Value::Symbol(s) => {
                Self::primitive(kind, Some(format!("Symbol({})", s.description())), None)
            }
            Value::Object(obj) => Self::object(ctx, *obj, kind),
        }
    }

    fn primitive(
        kind: String,
        description: Option<String>,
        value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind,
            subtype: None,
            class_name: None,
            description,
            value,
        }
    }

    fn object(ctx: &ExecutionContext, obj: ObjectRef, kind: String) -> Self {
        let realm = ctx.realm();
        let class_name = realm.class_name(obj).to_string();

        let tagged = ctx.handle(obj).and_then(|h| h.category);
        let (subtype, description) = match realm.object_kind(obj) {
            Some(ObjectKind::Array { length }) => (Some("array"), format!("Array({length})")),
            Some(ObjectKind::TypedArray { kind, length }) => {
                (Some("typedarray"), format!("{}({length})", kind.name()))
            }
            Some(ObjectKind::ArrayBuffer { byte_length }) => {
                (Some("arraybuffer"), format!("ArrayBuffer({byte_length})"))
            }
            Some(ObjectKind::Error(_)) => (Some("error"), class_name.clone()),
            Some(ObjectKind::Promise) => (Some("promise"), "Promise".to_string()),
            Some(ObjectKind::Date(_)) => (Some("date"), "Date".to_string()),
            Some(ObjectKind::RegExp { source, flags }) => {
                (Some("regexp"), format!("/{source}/{flags}"))
            }
            Some(ObjectKind::Map { size }) => (Some("map"), format!("Map({size})")),
            Some(ObjectKind::Set { size }) => (Some("set"), format!("Set({size})")),
            Some(ObjectKind::Function { name }) => (None, format!("function {name}()")),
            Some(ObjectKind::Ordinary { .. }) | None => (None, class_name.clone()),
        };

        let description = match realm.error_kind(&Value::Object(obj)) {
            Some(_) => realm
                .get_data(obj, "message")
                .and_then(|m| m.as_str().map(|m| format!("{class_name}: {m}")))
                .unwrap_or(description),
            None => description,
        };

        Self {
            kind,
            subtype: tagged
                .map(|c| c.as_str())
                .or(subtype)
                .map(str::to_string),
            class_name: Some(class_name),
            description: Some(description),
            value: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
