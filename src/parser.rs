//! Schema document parsing
//!
//! Pure functions over one parsed JSON schema document: locate the
//! `$ref`-pointed definition, classify an unversioned wrapper as a
//! collection or a versioned fan-out, and extract typed property
//! descriptors. The JSON shape checks are normalized into tagged variants
//! ([`DeclaredType`], [`ItemType`], [`DefinitionBlock`]) once, so the rest
//! of the pipeline matches on variants instead of re-probing raw maps.
//!
//! Failure policy: missing or malformed structure yields `None` or an
//! empty result, never an error. Callers treat absence as "nothing to do
//! here".

use serde_json::Value;

use crate::source::SchemaSource;

/// Properties that never become descriptors. This list is a compatibility
/// constant — the generated drivers rely on these fields being handled by
/// hand-written code, not by property synthesis.
pub const EXCLUDED_PROPERTIES: [&str; 15] = [
    "@odata.context",
    "@odata.type",
    "@odata.id",
    "Name",
    "Id",
    "Description",
    "Oem",
    "Links",
    "Actions",
    "PCIeDevices@odata.count",
    "PCIeFunctions@odata.count",
    "Redundancy@odata.count",
    "Status",
    "UUID",
    "RedfishVersion",
];

pub fn is_excluded(name: &str) -> bool {
    EXCLUDED_PROPERTIES.contains(&name)
}

/// Primitive JSON type tags the generator knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Integer,
    Number,
    Boolean,
    String,
}

impl PrimitiveKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "string" => Some(Self::String),
            _ => None,
        }
    }
}

/// Normalized form of a property's `type` declaration
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    Primitive(PrimitiveKind),
    /// Declared `"array"`; the element type lives in [`ItemType`]
    Array,
    /// An enum wrapper resolved from an in-document definition, carrying
    /// its base type when one is declared
    Enum(Option<PrimitiveKind>),
    /// A JSON list of type tags, e.g. `["integer", "null"]`
    Union(Vec<String>),
    /// Any other tag (`"object"`, ...) — never handled
    Other(String),
}

impl DeclaredType {
    /// Normalize the value of a `type` key
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(tag) => Some(match PrimitiveKind::from_tag(tag) {
                Some(p) => Self::Primitive(p),
                None if tag == "array" => Self::Array,
                None => Self::Other(tag.clone()),
            }),
            Value::Array(tags) => Some(Self::Union(
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// Normalized form of an `items` declaration (array element type)
#[derive(Debug, Clone, PartialEq)]
pub enum ItemType {
    Ref(String),
    Typed(DeclaredType),
    Unspecified,
}

impl ItemType {
    pub fn from_value(value: &Value) -> Self {
        if let Some(r) = value.get("$ref").and_then(Value::as_str) {
            return Self::Ref(r.to_string());
        }
        match value.get("type").and_then(DeclaredType::from_value) {
            Some(declared) => Self::Typed(declared),
            None => Self::Unspecified,
        }
    }
}

/// One declared property of a resource.
///
/// `name` may be dotted (`Parent.Child`) for members of an in-document
/// definitions block. A descriptor with no `declared_type` and no
/// `item_type` is a "vague" (open) property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    /// `#/definitions/X`, a same-service relative link, or an absolute link
    pub reference: Option<String>,
    /// Basename of an external reference
    pub filename: Option<String>,
    pub declared_type: Option<DeclaredType>,
    pub item_type: Option<ItemType>,
    pub enum_values: Vec<String>,
}

impl PropertyDescriptor {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// One `anyOf` branch of an unversioned schema pointing at a versioned file
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRef {
    pub filename: String,
    pub reference: String,
}

/// Classification result for an unversioned wrapper schema
#[derive(Debug, Clone, PartialEq)]
pub struct UnversionedSchema {
    pub root_name: String,
    /// Normalized path of the member type when the document is a collection
    pub is_collection_of: Option<String>,
    pub alternatives: Vec<VersionedRef>,
}

/// Result of resolving a `#/definitions/<Name>` pointer
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionBlock {
    /// The definitions entry declared `properties`
    Properties(Vec<PropertyDescriptor>),
    /// No `properties` key; callers probe the raw node for `enum` leaves
    Raw(Value),
}

/// Follow the document's top-level `$ref` through its own `definitions`
/// block, returning the final segment's name and sub-schema.
pub fn locate_definition(doc: &Value) -> Option<(String, &Value)> {
    let pointer = doc.get("$ref")?.as_str()?;
    doc.get("definitions")?;

    let mut node = doc;
    let mut name = "";
    for segment in pointer.trim_start_matches('#').split('/') {
        if segment.is_empty() {
            continue;
        }
        node = node.get(segment)?;
        name = segment;
    }

    Some((name.to_string(), node))
}

/// Strip the `#fragment` suffix from a reference, keeping the document path
pub fn normalize_ref(reference: &str) -> &str {
    reference.split('#').next().unwrap_or(reference)
}

fn split_fragment(reference: &str) -> (&str, &str) {
    match reference.split_once('#') {
        Some((uri, fragment)) => (uri, fragment),
        None => (reference, ""),
    }
}

fn basename(uri: &str) -> String {
    uri.rsplit('/').next().unwrap_or(uri).to_string()
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Direct lookup of a definitions entry, without descending into its
/// members. Only leaf entries (no `properties` key) are returned — the
/// callers probe them for `enum`/`type`, and a structured entry never
/// contributes either.
fn definition_leaf<'a>(doc: &'a Value, reference: &str) -> Option<&'a Value> {
    let target = reference.strip_prefix("#/definitions/")?;
    if is_excluded(target) {
        return None;
    }
    let node = doc.get("definitions")?.get(target)?;
    if node.get("properties").is_some() {
        return None;
    }
    Some(node)
}

/// Base type of an enum definition: a bare tag or the first primitive in a
/// type list
fn primitive_from_type_value(value: &Value) -> Option<PrimitiveKind> {
    match value {
        Value::String(tag) => PrimitiveKind::from_tag(tag),
        Value::Array(tags) => tags
            .iter()
            .filter_map(Value::as_str)
            .find_map(PrimitiveKind::from_tag),
        _ => None,
    }
}

/// Classify an unversioned wrapper schema.
///
/// Each `anyOf` branch carrying an external `$ref` (other than the `idRef`
/// sentinel) is a versioned alternative. A branch declaring a `Members`
/// array whose items `$ref` some type marks the document as a collection of
/// that type — this is the sole collection signal.
pub fn classify_unversioned(doc: &Value) -> Option<UnversionedSchema> {
    let (typename, schema) = locate_definition(doc)?;
    let branches = schema.get("anyOf")?.as_array()?;

    let mut root_name = typename;
    let mut is_collection_of = None;
    let mut alternatives = Vec::new();

    for branch in branches {
        if let Some(r) = branch.get("$ref").and_then(Value::as_str) {
            let (uri, fragment) = split_fragment(r);
            if fragment == "/definitions/idRef" {
                continue;
            }
            alternatives.push(VersionedRef {
                filename: basename(uri),
                reference: uri.to_string(),
            });
        } else if let Some(member_ref) = branch
            .pointer("/properties/Members/items/$ref")
            .and_then(Value::as_str)
        {
            let member_path = normalize_ref(member_ref).to_string();
            root_name = format!("{}_{}", root_name, basename(&member_path));
            is_collection_of = Some(member_path);
        }
    }

    Some(UnversionedSchema {
        root_name,
        is_collection_of,
        alternatives,
    })
}

/// Extract the ordered property descriptors of a versioned schema.
///
/// The second element is true iff the resolved `properties` map is empty
/// (an "empty/vague" resource). `None` means the document has no usable
/// definition at all.
pub fn extract_properties(doc: &Value) -> Option<(Vec<PropertyDescriptor>, bool)> {
    let (_, type_schema) = locate_definition(doc)?;
    let props = match type_schema.get("properties").and_then(Value::as_object) {
        Some(props) => props,
        None => return Some((Vec::new(), false)),
    };
    let is_empty = props.is_empty();

    let mut descriptors = Vec::new();
    for (name, info) in props {
        if is_excluded(name) {
            continue;
        }
        let mut descriptor = PropertyDescriptor::named(name);

        // An anyOf of in-document refs adopts the referenced definition's
        // type; an enum definition becomes an Enum over its base type.
        if let Some(branches) = info.get("anyOf").and_then(Value::as_array) {
            for branch in branches {
                let Some(r) = branch.get("$ref").and_then(Value::as_str) else {
                    continue;
                };
                if !r.starts_with('#') {
                    continue;
                }
                if let Some(node) = definition_leaf(doc, r) {
                    if let Some(values) = node.get("enum") {
                        descriptor.declared_type =
                            Some(DeclaredType::Enum(node.get("type").and_then(primitive_from_type_value)));
                        descriptor.enum_values = string_list(values);
                    } else if let Some(t) = node.get("type") {
                        descriptor.declared_type = DeclaredType::from_value(t);
                    }
                }
            }
        }

        if let Some(r) = info.get("$ref").and_then(Value::as_str) {
            if r.contains("://") {
                let (uri, fragment) = split_fragment(r);
                if fragment != "/definitions/idRef" {
                    descriptor.filename = Some(basename(uri));
                    descriptor.reference = Some(uri.to_string());
                }
            } else if r.starts_with("#/definitions/") {
                descriptor.reference = Some(r.to_string());
            }
        }

        // A direct type declaration wins over anything adopted from anyOf
        if let Some(t) = info.get("type") {
            descriptor.declared_type = DeclaredType::from_value(t);
        }
        if let Some(items) = info.get("items") {
            descriptor.item_type = Some(ItemType::from_value(items));
        }

        descriptors.push(descriptor);
    }

    Some((descriptors, is_empty))
}

/// Resolve a `#/definitions/<Name>` pointer inside `doc`.
///
/// Returns the nested property list when the entry declares `properties`,
/// or the raw node otherwise (callers detect `enum` leaves there). An
/// excluded target resolves to an empty property list. Property members
/// that link externally are fetched through `source` and their enum data
/// folded in.
pub fn resolve_definition_ref(
    doc: &Value,
    reference: &str,
    source: &dyn SchemaSource,
) -> Option<(DefinitionBlock, bool)> {
    let Some(target) = reference.strip_prefix("#/definitions/") else {
        return Some((DefinitionBlock::Properties(Vec::new()), false));
    };
    if is_excluded(target) {
        return Some((DefinitionBlock::Properties(Vec::new()), false));
    }

    let node = doc.get("definitions")?.get(target)?;
    let props = match node.get("properties").and_then(Value::as_object) {
        Some(props) => props,
        None => return Some((DefinitionBlock::Raw(node.clone()), false)),
    };
    let is_empty = props.is_empty();

    let mut descriptors = Vec::new();
    'members: for (name, info) in props {
        if is_excluded(name) {
            continue;
        }
        let mut descriptor = PropertyDescriptor::named(name);

        if let Some(t) = info.get("type") {
            descriptor.declared_type = DeclaredType::from_value(t);
            if let Some(items) = info.get("items") {
                descriptor.item_type = Some(ItemType::from_value(items));
            }
        }

        if let Some(branches) = info.get("anyOf").and_then(Value::as_array) {
            for branch in branches {
                let Some(r) = branch.get("$ref").and_then(Value::as_str) else {
                    continue;
                };
                let (_, fragment) = split_fragment(r);
                if fragment == "/definitions/idRef" {
                    continue;
                }
                descriptor.reference = Some(r.to_string());
                if r.starts_with('#') {
                    if let Some(n) = definition_leaf(doc, r) {
                        if let Some(values) = n.get("enum") {
                            descriptor.declared_type = Some(DeclaredType::Enum(
                                n.get("type").and_then(primitive_from_type_value),
                            ));
                            descriptor.enum_values = string_list(values);
                        }
                    }
                }
            }
        }

        if let Some(r) = info.get("$ref").and_then(Value::as_str) {
            descriptor.reference = Some(r.to_string());
        }

        // A member linking into another service's document: fetch it and
        // fold in any enum definition found at the referenced fragment. An
        // unloadable or unclassifiable target drops the member entirely.
        if let Some(ref_uri) = descriptor.reference.clone() {
            if ref_uri.starts_with("http://") || ref_uri.starts_with("https://") {
                let (uri, fragment) = split_fragment(&ref_uri);
                let Some(remote) = source.load(uri) else {
                    continue 'members;
                };
                if classify_unversioned(&remote).is_none() {
                    continue 'members;
                }
                let local_ref = format!("#{fragment}");
                if let Some(n) = definition_leaf(&remote, &local_ref) {
                    if let Some(values) = n.get("enum") {
                        descriptor.declared_type = Some(DeclaredType::Enum(
                            n.get("type").and_then(primitive_from_type_value),
                        ));
                        descriptor.enum_values = string_list(values);
                    }
                }
            }
        }

        descriptors.push(descriptor);
    }

    Some((DefinitionBlock::Properties(descriptors), is_empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::StubSource;
    use serde_json::json;

    fn stub() -> StubSource {
        StubSource::default()
    }

    fn versioned_doc() -> Value {
        json!({
            "$ref": "#/definitions/Manager",
            "definitions": {
                "Manager": {
                    "properties": {
                        "@odata.type": { "type": "string" },
                        "Status": { "type": "string" },
                        "MaxCount": { "type": "integer" },
                        "HostName": { "type": "string" },
                        "AutoDSTEnabled": { "type": "boolean" },
                        "State": { "anyOf": [ { "$ref": "#/definitions/PowerState" } ] },
                        "Attributes": { "$ref": "#/definitions/Attributes" }
                    }
                },
                "PowerState": {
                    "type": "string",
                    "enum": ["On", "Off"]
                },
                "Attributes": {
                    "properties": {}
                }
            }
        })
    }

    #[test]
    fn test_locate_definition() {
        let doc = versioned_doc();
        let (name, schema) = locate_definition(&doc).unwrap();
        assert_eq!(name, "Manager");
        assert!(schema.get("properties").is_some());
    }

    #[test]
    fn test_locate_definition_requires_ref_and_definitions() {
        assert!(locate_definition(&json!({})).is_none());
        assert!(locate_definition(&json!({ "$ref": "#/definitions/X" })).is_none());
        assert!(
            locate_definition(&json!({ "definitions": { "X": {} } })).is_none(),
            "no $ref means nothing to locate"
        );
    }

    #[test]
    fn test_normalize_ref() {
        assert_eq!(
            normalize_ref("http://redfish.dmtf.org/schemas/v1/Manager.json#/definitions/Manager"),
            "http://redfish.dmtf.org/schemas/v1/Manager.json"
        );
        assert_eq!(normalize_ref("Manager.json"), "Manager.json");
    }

    #[test]
    fn test_exclusion_completeness() {
        let (props, is_empty) = extract_properties(&versioned_doc()).unwrap();
        assert!(!is_empty);
        for excluded in EXCLUDED_PROPERTIES {
            assert!(
                props.iter().all(|p| p.name != excluded),
                "{excluded} must never produce a descriptor"
            );
        }
        let names: Vec<_> = props.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["MaxCount", "HostName", "AutoDSTEnabled", "State", "Attributes"]
        );
    }

    #[test]
    fn test_primitive_and_enum_types() {
        let (props, _) = extract_properties(&versioned_doc()).unwrap();
        let max_count = props.iter().find(|p| p.name == "MaxCount").unwrap();
        assert_eq!(
            max_count.declared_type,
            Some(DeclaredType::Primitive(PrimitiveKind::Integer))
        );

        let state = props.iter().find(|p| p.name == "State").unwrap();
        assert_eq!(
            state.declared_type,
            Some(DeclaredType::Enum(Some(PrimitiveKind::String)))
        );
        assert_eq!(state.enum_values, vec!["On", "Off"]);
    }

    #[test]
    fn test_vague_property_has_no_type() {
        let (props, _) = extract_properties(&versioned_doc()).unwrap();
        let attributes = props.iter().find(|p| p.name == "Attributes").unwrap();
        assert_eq!(attributes.declared_type, None);
        assert_eq!(attributes.item_type, None);
        assert_eq!(attributes.reference.as_deref(), Some("#/definitions/Attributes"));
    }

    #[test]
    fn test_external_ref_records_filename() {
        let doc = json!({
            "$ref": "#/definitions/ServiceRoot",
            "definitions": {
                "ServiceRoot": {
                    "properties": {
                        "Managers": {
                            "$ref": "http://redfish.dmtf.org/schemas/v1/ManagerCollection.json#/definitions/ManagerCollection"
                        }
                    }
                }
            }
        });
        let (props, _) = extract_properties(&doc).unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].filename.as_deref(), Some("ManagerCollection.json"));
        assert_eq!(
            props[0].reference.as_deref(),
            Some("http://redfish.dmtf.org/schemas/v1/ManagerCollection.json")
        );
        assert_eq!(props[0].declared_type, None);
    }

    #[test]
    fn test_collection_detection() {
        let doc = json!({
            "$ref": "#/definitions/ManagerCollection",
            "definitions": {
                "ManagerCollection": {
                    "anyOf": [
                        { "$ref": "http://redfish.dmtf.org/schemas/v1/odata.json#/definitions/idRef" },
                        {
                            "properties": {
                                "Members": {
                                    "type": "array",
                                    "items": {
                                        "$ref": "http://redfish.dmtf.org/schemas/v1/Manager.json#/definitions/Manager"
                                    }
                                }
                            }
                        }
                    ]
                }
            }
        });
        let result = classify_unversioned(&doc).unwrap();
        assert_eq!(
            result.is_collection_of.as_deref(),
            Some("http://redfish.dmtf.org/schemas/v1/Manager.json")
        );
        assert!(result.alternatives.is_empty(), "idRef is not an alternative");
    }

    #[test]
    fn test_versioned_fanout_alternatives() {
        let doc = json!({
            "$ref": "#/definitions/Manager",
            "definitions": {
                "Manager": {
                    "anyOf": [
                        { "$ref": "http://redfish.dmtf.org/schemas/v1/odata.json#/definitions/idRef" },
                        { "$ref": "http://redfish.dmtf.org/schemas/v1/Manager.v1_0_0.json#/definitions/Manager" },
                        { "$ref": "http://redfish.dmtf.org/schemas/v1/Manager.v1_1_0.json#/definitions/Manager" }
                    ]
                }
            }
        });
        let result = classify_unversioned(&doc).unwrap();
        assert!(result.is_collection_of.is_none());
        let filenames: Vec<_> = result
            .alternatives
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        assert_eq!(
            filenames,
            vec!["Manager.v1_0_0.json", "Manager.v1_1_0.json"]
        );
    }

    #[test]
    fn test_non_collection_without_anyof() {
        let doc = json!({
            "$ref": "#/definitions/Manager",
            "definitions": { "Manager": { "properties": {} } }
        });
        assert!(classify_unversioned(&doc).is_none());
    }

    #[test]
    fn test_resolve_definition_ref_nested_properties() {
        let doc = json!({
            "$ref": "#/definitions/Bios",
            "definitions": {
                "Bios": { "properties": {} },
                "BootOptions": {
                    "properties": {
                        "Timeout": { "type": "integer" },
                        "BootOrder": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    }
                }
            }
        });
        let (block, is_empty) =
            resolve_definition_ref(&doc, "#/definitions/BootOptions", &stub()).unwrap();
        assert!(!is_empty);
        let DefinitionBlock::Properties(members) = block else {
            panic!("expected property list");
        };
        assert_eq!(members.len(), 2);
        assert_eq!(
            members[1].item_type,
            Some(ItemType::Typed(DeclaredType::Primitive(PrimitiveKind::String)))
        );
    }

    #[test]
    fn test_resolve_definition_ref_enum_leaf_is_raw() {
        let doc = versioned_doc();
        let (block, _) =
            resolve_definition_ref(&doc, "#/definitions/PowerState", &stub()).unwrap();
        let DefinitionBlock::Raw(node) = block else {
            panic!("expected raw node for enum leaf");
        };
        assert!(node.get("enum").is_some());
    }

    #[test]
    fn test_resolve_definition_ref_excluded_target_is_empty() {
        let doc = versioned_doc();
        let (block, is_empty) =
            resolve_definition_ref(&doc, "#/definitions/Oem", &stub()).unwrap();
        assert_eq!(block, DefinitionBlock::Properties(Vec::new()));
        assert!(!is_empty);
    }

    #[test]
    fn test_resolve_definition_ref_missing_target_is_absent() {
        let doc = versioned_doc();
        assert!(resolve_definition_ref(&doc, "#/definitions/Nope", &stub()).is_none());
    }

    #[test]
    fn test_empty_properties_flag() {
        let doc = json!({
            "$ref": "#/definitions/AttributeRegistry",
            "definitions": {
                "AttributeRegistry": { "properties": {} }
            }
        });
        let (props, is_empty) = extract_properties(&doc).unwrap();
        assert!(props.is_empty());
        assert!(is_empty);
    }
}
