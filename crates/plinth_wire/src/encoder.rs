//! Document encoding
//!
//! Serializes a [`RenderedNode`] tree into the JSON document sent to clients.
//! Values JSON cannot carry are replaced by markers:
//!
//! | Value          | Encoded as                                 |
//! |----------------|--------------------------------------------|
//! | rendered node  | `{"__dh_elem": name, "props": {...}}`      |
//! | callable       | `{"__dh_cbid": "cb0"}`                     |
//! | opaque object  | `{"__dh_obid": 3}`                         |
//!
//! Callable ids are only meaningful together with the callable list produced
//! by the same [`NodeEncoder::encode`] call. Object indices come from the
//! connection's [`Exporter`] and stay stable across encodes.

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::{Map, Number, Value as Json};

use plinth_core::{Callable, CallableId, RenderedNode, Value};

use crate::error::{Result, WireError};
use crate::exporter::{Exporter, ReferenceDelta};

/// Marker key holding a rendered node's name
pub const ELEMENT_KEY: &str = "__dh_elem";
/// Key holding a rendered node's props
pub const PROPS_KEY: &str = "props";
/// Marker key holding a callable id
pub const CALLABLE_KEY: &str = "__dh_cbid";
/// Marker key holding an exported object index
pub const OBJECT_KEY: &str = "__dh_obid";
/// Prefix of callable ids unless configured otherwise
pub const DEFAULT_CALLABLE_ID_PREFIX: &str = "cb";

/// Output of one encode pass
#[derive(Clone, Debug)]
pub struct EncodedNode {
    /// Serialized document
    pub payload: Vec<u8>,
    /// Document before serialization
    pub document: Json,
    /// Callables in id order: `callables[n]` is `<prefix><n>`
    pub callables: Vec<Callable>,
    /// Exported-object changes made by this pass
    pub references: ReferenceDelta,
    callable_ids: Vec<String>,
}

impl EncodedNode {
    /// Callable encoded under `id`
    pub fn callable(&self, id: &str) -> Option<&Callable> {
        self.callable_ids
            .iter()
            .position(|candidate| candidate == id)
            .and_then(|index| self.callables.get(index))
    }

    /// Ids of the callables, position for position
    pub fn callable_ids(&self) -> &[String] {
        &self.callable_ids
    }
}

/// Encodes rendered trees into client documents
#[derive(Clone, Debug)]
pub struct NodeEncoder {
    callable_id_prefix: String,
}

impl Default for NodeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeEncoder {
    pub fn new() -> Self {
        Self {
            callable_id_prefix: DEFAULT_CALLABLE_ID_PREFIX.to_owned(),
        }
    }

    pub fn with_callable_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.callable_id_prefix = prefix.into();
        self
    }

    pub fn callable_id_prefix(&self) -> &str {
        &self.callable_id_prefix
    }

    /// Encode `node`, exporting its opaque objects through `exporter`
    ///
    /// Ends the exporter pass. On failure the pass is rolled back and nothing
    /// about it is reported.
    pub fn encode(&self, node: &RenderedNode, exporter: &mut Exporter) -> Result<EncodedNode> {
        let mut encoded = self.prepare(node, exporter)?;
        encoded.references = exporter.references();
        Ok(encoded)
    }

    /// Encode `node` but leave the exporter pass open
    ///
    /// `references` holds the delta the pass will report. The caller ends the
    /// pass with [`Exporter::references`] once the document was delivered, or
    /// with [`Exporter::rollback`] if it was not. On an encoding failure the
    /// pass is already rolled back.
    pub fn prepare(&self, node: &RenderedNode, exporter: &mut Exporter) -> Result<EncodedNode> {
        let mut pass = EncodePass::new(&self.callable_id_prefix, Some(&mut *exporter));
        let encoded = pass
            .node(node, &Path::Root)
            .and_then(|document| Ok((serde_json::to_vec(&document)?, document)));
        let EncodePass {
            callables,
            callable_ids,
            ..
        } = pass;

        match encoded {
            Ok((payload, document)) => Ok(EncodedNode {
                payload,
                document,
                callables,
                references: exporter.pending(),
                callable_ids,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "document encoding failed");
                exporter.rollback();
                Err(err)
            }
        }
    }

    /// Encode a value that may not carry callables or objects
    pub fn encode_plain(&self, value: &Value) -> Result<Json> {
        EncodePass::new(&self.callable_id_prefix, None).value(value, &Path::Root)
    }
}

/// Location of a value inside the document, for error messages
enum Path<'a> {
    Root,
    Key(&'a Path<'a>, &'a str),
    Index(&'a Path<'a>, usize),
}

impl fmt::Display for Path<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Root => f.write_str("$"),
            Path::Key(parent, key) => write!(f, "{parent}.{key}"),
            Path::Index(parent, index) => write!(f, "{parent}[{index}]"),
        }
    }
}

struct EncodePass<'a> {
    prefix: &'a str,
    exporter: Option<&'a mut Exporter>,
    callables: Vec<Callable>,
    callable_ids: Vec<String>,
    by_callable: FxHashMap<CallableId, usize>,
}

impl<'a> EncodePass<'a> {
    fn new(prefix: &'a str, exporter: Option<&'a mut Exporter>) -> Self {
        Self {
            prefix,
            exporter,
            callables: Vec::new(),
            callable_ids: Vec::new(),
            by_callable: FxHashMap::default(),
        }
    }

    fn node(&mut self, node: &RenderedNode, path: &Path<'_>) -> Result<Json> {
        let mut out = Map::new();
        out.insert(ELEMENT_KEY.to_owned(), Json::String(node.name().to_owned()));
        if let Some(props) = node.props() {
            let props_path = Path::Key(path, PROPS_KEY);
            let mut encoded = Map::new();
            for (key, value) in props {
                encoded.insert(key.clone(), self.value(value, &Path::Key(&props_path, key))?);
            }
            out.insert(PROPS_KEY.to_owned(), Json::Object(encoded));
        }
        Ok(Json::Object(out))
    }

    fn value(&mut self, value: &Value, path: &Path<'_>) -> Result<Json> {
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Float(f) => Json::Number(Number::from_f64(*f).ok_or_else(|| {
                WireError::EncodingFailure {
                    path: path.to_string(),
                    reason: format!("non-finite number {f}"),
                }
            })?),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.value(item, &Path::Index(path, index)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Map(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.value(item, &Path::Key(path, key))?);
                }
                Json::Object(out)
            }
            Value::Element(element) => {
                return Err(WireError::UnrenderedElement {
                    element: element.name().to_owned(),
                    path: path.to_string(),
                })
            }
            Value::Node(node) => self.node(node, path)?,
            Value::Callable(callable) => marker(CALLABLE_KEY, Json::String(self.callable_id(callable, path)?)),
            Value::Object(object) => {
                let Some(exporter) = self.exporter.as_deref_mut() else {
                    return Err(not_plain(path, "object"));
                };
                marker(OBJECT_KEY, Json::from(exporter.reference(object).index))
            }
        })
    }

    fn callable_id(&mut self, callable: &Callable, path: &Path<'_>) -> Result<String> {
        if self.exporter.is_none() {
            return Err(not_plain(path, "callable"));
        }
        if let Some(&index) = self.by_callable.get(&callable.id()) {
            return Ok(self.callable_ids[index].clone());
        }
        let index = self.callables.len();
        let id = format!("{}{}", self.prefix, index);
        self.by_callable.insert(callable.id(), index);
        self.callables.push(callable.clone());
        self.callable_ids.push(id.clone());
        Ok(id)
    }
}

fn marker(key: &str, value: Json) -> Json {
    let mut out = Map::with_capacity(1);
    out.insert(key.to_owned(), value);
    Json::Object(out)
}

fn not_plain(path: &Path<'_>, what: &str) -> WireError {
    WireError::EncodingFailure {
        path: path.to_string(),
        reason: format!("{what} values cannot be sent here"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::{ObjectRef, Props};
    use serde_json::json;

    fn node(name: &str, props: Vec<(&str, Value)>) -> RenderedNode {
        let props: Props = props.into_iter().map(|(k, v)| (k.to_owned(), v)).collect();
        RenderedNode::new(name, Some(props))
    }

    #[test]
    fn nodes_become_element_markers() {
        let tree = node(
            "Flex",
            vec![(
                "children",
                Value::List(vec![
                    RenderedNode::new("Divider", None).into(),
                    node("Text", vec![("children", "hi".into())]).into(),
                ]),
            )],
        );

        let encoded = NodeEncoder::new().encode(&tree, &mut Exporter::new()).unwrap();
        assert_eq!(
            encoded.document,
            json!({
                "__dh_elem": "Flex",
                "props": {"children": [
                    {"__dh_elem": "Divider"},
                    {"__dh_elem": "Text", "props": {"children": "hi"}}
                ]}
            })
        );
        assert_eq!(encoded.payload, serde_json::to_vec(&encoded.document).unwrap());
    }

    #[test]
    fn callables_are_numbered_by_first_appearance() {
        let save = Callable::action(|| {});
        let cancel = Callable::action(|| {});
        let tree = node(
            "Form",
            vec![
                ("on_submit", save.clone().into()),
                ("on_cancel", cancel.clone().into()),
                ("on_enter", save.clone().into()),
            ],
        );

        let encoded = NodeEncoder::new()
            .with_callable_id_prefix("fn-")
            .encode(&tree, &mut Exporter::new())
            .unwrap();
        let props = &encoded.document["props"];
        assert_eq!(props["on_submit"], json!({"__dh_cbid": "fn-0"}));
        assert_eq!(props["on_cancel"], json!({"__dh_cbid": "fn-1"}));
        assert_eq!(props["on_enter"], json!({"__dh_cbid": "fn-0"}));
        assert_eq!(encoded.callables, vec![save.clone(), cancel]);
        assert_eq!(encoded.callable("fn-0"), Some(&save));
        assert!(encoded.callable("fn-2").is_none());
    }

    #[test]
    fn objects_use_exporter_indices() {
        let table = ObjectRef::typed(42u32, "Table");
        let tree = node("Grid", vec![("table", table.clone().into())]);
        let mut exporter = Exporter::new();

        let encoded = NodeEncoder::new().encode(&tree, &mut exporter).unwrap();
        assert_eq!(encoded.document["props"]["table"], json!({"__dh_obid": 0}));
        assert_eq!(encoded.references.new_objects, vec![table]);
    }

    #[test]
    fn prepared_documents_commit_only_on_request() {
        let table = ObjectRef::typed(7u32, "Table");
        let tree = node("Grid", vec![("table", table.clone().into())]);
        let mut exporter = Exporter::new();
        let encoder = NodeEncoder::new();

        let undelivered = encoder.prepare(&tree, &mut exporter).unwrap();
        assert_eq!(undelivered.references.new_objects, vec![table.clone()]);
        exporter.rollback();

        let delivered = encoder.prepare(&tree, &mut exporter).unwrap();
        assert_eq!(delivered.document["props"]["table"], json!({"__dh_obid": 1}));
        assert_eq!(delivered.references.new_reference_ids, vec![1]);
        assert_eq!(exporter.references(), delivered.references);
    }

    #[test]
    fn non_finite_numbers_fail_and_roll_back() {
        let table = ObjectRef::typed(1u8, "Table");
        let tree = node(
            "Chart",
            vec![("table", table.clone().into()), ("max", f64::NAN.into())],
        );
        let mut exporter = Exporter::new();

        let err = NodeEncoder::new().encode(&tree, &mut exporter).unwrap_err();
        assert!(matches!(err, WireError::EncodingFailure { ref path, .. } if path == "$.props.max"));
        assert!(exporter.is_empty());
    }

    #[test]
    fn unrendered_elements_are_rejected() {
        let tree = node("Flex", vec![("children", plinth_core::BaseElement::new("Text").into())]);
        let err = NodeEncoder::new().encode(&tree, &mut Exporter::new()).unwrap_err();
        assert_eq!(err.kind(), "UnrenderedElement");
    }

    #[test]
    fn plain_encoding_refuses_references() {
        let encoder = NodeEncoder::new();
        let mut map = Props::new();
        map.insert("rows".into(), Value::from(vec![1, 2]));
        assert_eq!(encoder.encode_plain(&Value::Map(map)).unwrap(), json!({"rows": [1, 2]}));

        let err = encoder.encode_plain(&Callable::action(|| {}).into()).unwrap_err();
        assert_eq!(err.kind(), "EncodingFailure");
    }
}
