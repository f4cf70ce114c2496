//! Property code synthesis
//!
//! Turns each extracted property descriptor into two C fragments: a
//! *consume* fragment that reads the in-memory resource structure and
//! reports values toward the platform configuration layer, and a
//! *provision* fragment that reads desired values back out of the
//! configuration layer and writes them into the structure.
//!
//! All per-resource accumulation (required variable declarations, the etag
//! flag, nested collection discoveries) lives in a [`SynthesisContext`]
//! created fresh for every resource, so nothing leaks between resources.

use serde_json::Value;
use tracing::{debug, warn};

use crate::parser::{
    classify_unversioned, extract_properties, locate_definition, normalize_ref,
    resolve_definition_ref, DeclaredType, DefinitionBlock, ItemType, PrimitiveKind,
};
use crate::source::SchemaSource;

const TAB: &str = "  ";

/// The fixed vocabulary of code patterns a property can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    Numeric,
    Boolean,
    String,
    /// No declared type anywhere in the chain: an open key/value property
    Vague,
    /// No operational code can be generated; a comment placeholder is
    /// emitted instead
    Unsupported,
}

impl From<PrimitiveKind> for HandleType {
    fn from(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Integer | PrimitiveKind::Number => HandleType::Numeric,
            PrimitiveKind::Boolean => HandleType::Boolean,
            PrimitiveKind::String => HandleType::String,
        }
    }
}

/// Map a declared type (plus array element info) onto a handle type.
///
/// Pure function, total over every input combination. Enum types resolve
/// through their base type. Arrays of references, arrays without a usable
/// element type, and arrays of arrays are all `Unsupported`.
pub fn resolve_handle_type(
    declared: Option<&DeclaredType>,
    item: Option<&ItemType>,
) -> (HandleType, bool) {
    match declared {
        None => match item {
            None => (HandleType::Vague, false),
            Some(_) => (HandleType::Unsupported, false),
        },
        Some(DeclaredType::Primitive(kind)) => (HandleType::from(*kind), false),
        Some(DeclaredType::Enum(Some(kind))) => (HandleType::from(*kind), false),
        Some(DeclaredType::Enum(None)) => (HandleType::Unsupported, false),
        Some(DeclaredType::Array) => resolve_array_item(item),
        Some(DeclaredType::Union(tags)) => {
            if tags.iter().any(|t| t == "array") {
                resolve_array_item(item)
            } else if let Some(kind) = tags.iter().find_map(|t| PrimitiveKind::from_tag(t)) {
                (HandleType::from(kind), false)
            } else {
                (HandleType::Unsupported, false)
            }
        }
        Some(DeclaredType::Other(_)) => (HandleType::Unsupported, false),
    }
}

fn resolve_array_item(item: Option<&ItemType>) -> (HandleType, bool) {
    match item {
        None | Some(ItemType::Unspecified) => {
            debug!("\"type\" is not defined in \"items\" for array type");
            (HandleType::Unsupported, false)
        }
        Some(ItemType::Ref(_)) => {
            debug!("$ref in array \"items\" is not supported yet");
            (HandleType::Unsupported, false)
        }
        Some(ItemType::Typed(declared)) => match resolve_handle_type(Some(declared), None) {
            (HandleType::Numeric, _) => (HandleType::Numeric, true),
            (HandleType::Boolean, _) => (HandleType::Boolean, true),
            (HandleType::String, _) => (HandleType::String, true),
            _ => (HandleType::Unsupported, false),
        },
    }
}

/// Type name and version parsed from a versioned schema filename
/// (`Manager.v1_0_0.json`)
#[derive(Debug, Clone)]
pub struct ResourceIdentity {
    pub type_name: String,
    pub version: String,
}

impl ResourceIdentity {
    pub fn from_filename(fname: &str) -> Option<Self> {
        let mut parts = fname.split('.');
        let type_name = parts.next()?.to_string();
        let version = parts.next()?.to_string();
        if type_name.is_empty() || !version.starts_with('v') {
            return None;
        }
        Some(Self { type_name, version })
    }

    /// Version segments of `v<major>_<minor>_<errata>`
    pub fn version_parts(&self) -> Vec<&str> {
        self.version.trim_start_matches('v').split('_').collect()
    }
}

/// A collection reference discovered while synthesizing nested members.
/// Fed back into the resolver's collection registry after the feature
/// phase.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedCollectionRef {
    pub reference: String,
    /// `<parentType>/<propertyName>` discovery path
    pub dependency_path: String,
}

/// Synthesis output for one resource
#[derive(Debug, Clone, Default)]
pub struct CodeFragmentBundle {
    pub consume_code: String,
    pub provision_code: String,
    /// First-seen-order, deduplicated declaration lines hoisted into the
    /// generated consume function
    pub consume_declarations: Vec<String>,
    pub provision_declarations: Vec<String>,
    pub has_etag: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SynthesisOutput {
    pub bundle: CodeFragmentBundle,
    pub nested_collections: Vec<NestedCollectionRef>,
}

/// Per-resource accumulator, never shared across resources
#[derive(Debug, Default)]
struct SynthesisContext {
    consume_declarations: Vec<String>,
    provision_declarations: Vec<String>,
    has_etag: bool,
    /// Whether the current definitions-block member generated an
    /// initializer, and so needs open/close wrappers around its children
    has_open_member: bool,
    nested_collections: Vec<NestedCollectionRef>,
}

impl SynthesisContext {
    fn require_consume(&mut self, declaration: &str) {
        if !self.consume_declarations.iter().any(|d| d == declaration) {
            self.consume_declarations.push(declaration.to_string());
        }
    }

    fn require_provision(&mut self, declaration: &str) {
        if !self.provision_declarations.iter().any(|d| d == declaration) {
            self.provision_declarations.push(declaration.to_string());
        }
    }
}

/// Result of probing a property reference that points at another service
#[derive(Debug, Clone)]
struct ExternalRefProbe {
    uri: String,
    has_ref: bool,
    is_collection: bool,
}

/// Synthesizes the consume/provision fragments for one versioned resource
pub struct PropertyCodeSynthesizer<'a> {
    source: &'a dyn SchemaSource,
}

impl<'a> PropertyCodeSynthesizer<'a> {
    pub fn new(source: &'a dyn SchemaSource) -> Self {
        Self { source }
    }

    /// Synthesize code for the resource in `doc`, identified by its
    /// versioned filename. `None` when the document has no usable
    /// definition or the filename carries no version.
    pub fn synthesize(&self, fname: &str, doc: &Value) -> Option<SynthesisOutput> {
        let identity = match ResourceIdentity::from_filename(fname) {
            Some(identity) => identity,
            None => {
                warn!("{fname} is not a versioned schema filename, skipping");
                return None;
            }
        };
        let (descriptors, _) = extract_properties(doc)?;

        let mut ctx = SynthesisContext::default();
        let mut consume = String::new();
        let mut provision = String::new();

        for descriptor in &descriptors {
            // Typed properties generate directly
            if descriptor.declared_type.is_some() {
                let (c, p) = self.emit_property(
                    &identity,
                    &descriptor.name,
                    descriptor.declared_type.as_ref(),
                    descriptor.item_type.as_ref(),
                    &mut ctx,
                );
                consume.push_str(&c);
                provision.push_str(&p);
                continue;
            }

            // Presence of @odata.etag only flips a flag
            if descriptor.name == "@odata.etag" {
                ctx.has_etag = true;
                continue;
            }

            let Some(reference) = descriptor.reference.as_deref() else {
                continue;
            };

            let probe = if reference.starts_with("http://") || reference.starts_with("https://") {
                Some(self.probe_external(reference))
            } else {
                debug!("[ {fname} ] : {} ref {reference}", descriptor.name);
                None
            };

            let Some((block, is_empty)) = resolve_definition_ref(doc, reference, self.source)
            else {
                continue;
            };

            ctx.has_open_member = false;
            match block {
                // An empty definitions entry is an open (vague) member
                DefinitionBlock::Properties(_) if is_empty => {
                    consume.push_str(&self.initial_member(
                        &identity,
                        &descriptor.name,
                        Some(reference),
                        None,
                        &mut ctx,
                    ));
                    provision.push_str(&self.open_member(&identity, &descriptor.name, &ctx));
                    let (c, p) =
                        self.emit_property(&identity, &descriptor.name, None, None, &mut ctx);
                    consume.push_str(&c);
                    provision.push_str(&indent(&p, 1));
                    provision.push_str(&self.close_member(&ctx));
                }
                DefinitionBlock::Properties(members) => {
                    consume.push_str(&self.initial_member(
                        &identity,
                        &descriptor.name,
                        Some(reference),
                        probe.as_ref(),
                        &mut ctx,
                    ));
                    provision.push_str(&self.open_member(&identity, &descriptor.name, &ctx));
                    for member in &members {
                        if let Some(member_ref) = member.reference.as_deref() {
                            self.discover_nested_collection(
                                doc,
                                &descriptor.name,
                                member_ref,
                                &mut ctx,
                            );
                        }
                        let Some(declared) = member.declared_type.as_ref() else {
                            continue;
                        };
                        debug!(
                            "[ {fname} ] : {}.{}, type {declared:?}",
                            descriptor.name, member.name
                        );
                        let dotted = format!("{}.{}", descriptor.name, member.name);
                        let (c, p) = self.emit_property(
                            &identity,
                            &dotted,
                            Some(declared),
                            member.item_type.as_ref(),
                            &mut ctx,
                        );
                        consume.push_str(&c);
                        provision.push_str(&indent(&p, 1));
                    }
                    provision.push_str(&self.close_member(&ctx));
                }
                // A definitions entry without properties: only enum leaves
                // generate anything
                DefinitionBlock::Raw(node) => {
                    if node.get("enum").is_some() {
                        let declared = node.get("type").and_then(DeclaredType::from_value);
                        debug!("[ {fname} ] : {} type: enum", descriptor.name);
                        let (c, p) = self.emit_property(
                            &identity,
                            &descriptor.name,
                            declared.as_ref(),
                            descriptor.item_type.as_ref(),
                            &mut ctx,
                        );
                        consume.push_str(&c);
                        provision.push_str(&p);
                    }
                }
            }
        }

        Some(SynthesisOutput {
            bundle: CodeFragmentBundle {
                consume_code: consume,
                provision_code: provision,
                consume_declarations: ctx.consume_declarations,
                provision_declarations: ctx.provision_declarations,
                has_etag: ctx.has_etag,
            },
            nested_collections: ctx.nested_collections,
        })
    }

    fn probe_external(&self, reference: &str) -> ExternalRefProbe {
        let uri = normalize_ref(reference).to_string();
        match self.source.load(&uri) {
            Some(doc) => ExternalRefProbe {
                has_ref: doc.get("$ref").is_some(),
                is_collection: classify_unversioned(&doc)
                    .map(|r| r.is_collection_of.is_some())
                    .unwrap_or(false),
                uri,
            },
            None => ExternalRefProbe {
                uri,
                has_ref: false,
                is_collection: false,
            },
        }
    }

    /// A nested member referencing another document may be a collection the
    /// walk never reached; record it for the collection registry.
    fn discover_nested_collection(
        &self,
        doc: &Value,
        prop_name: &str,
        member_ref: &str,
        ctx: &mut SynthesisContext,
    ) {
        if member_ref.starts_with("#/definitions/") {
            return;
        }
        let Some((typename, _)) = locate_definition(doc) else {
            return;
        };
        let local_ref = normalize_ref(member_ref);
        let Some(target) = self.source.load(local_ref) else {
            return;
        };
        let Some(result) = classify_unversioned(&target) else {
            return;
        };
        if result.is_collection_of.is_none() {
            return;
        }
        debug!("{prop_name} is collection of {local_ref}");
        ctx.nested_collections.push(NestedCollectionRef {
            reference: local_ref.to_string(),
            dependency_path: format!("{typename}/{prop_name}"),
        });
    }

    fn emit_property(
        &self,
        identity: &ResourceIdentity,
        key: &str,
        declared: Option<&DeclaredType>,
        item: Option<&ItemType>,
        ctx: &mut SynthesisContext,
    ) -> (String, String) {
        let consume = self.emit_consume(identity, key, declared, item, ctx);
        let provision = self.emit_provision(identity, key, declared, item, ctx);
        (consume, provision)
    }

    fn emit_consume(
        &self,
        identity: &ResourceIdentity,
        key: &str,
        declared: Option<&DeclaredType>,
        item: Option<&ItemType>,
        ctx: &mut SynthesisContext,
    ) -> String {
        let t = &identity.type_name;
        let member = key.replace('.', "->");
        let redpath = key.replace('.', "/");
        let (handle, is_array) = resolve_handle_type(declared, item);

        let mut code = String::new();
        if handle == HandleType::Vague {
            code.push_str(&format!(
                "{TAB}//\n{TAB}// Handle {}->EmptyProperty\n{TAB}//\n",
                member.to_uppercase()
            ));
        } else {
            code.push_str(&format!(
                "{TAB}//\n{TAB}// Handle {}\n{TAB}//\n",
                member.to_uppercase()
            ));
        }

        if handle == HandleType::Unsupported {
            warn!("unsupported array type for {key}");
            code.push_str(&unsupported_placeholder());
            return code;
        }

        let (method, value, count) = match (handle, is_array) {
            (HandleType::Numeric, false) => (
                "ApplyFeatureSettingsNumericType",
                format!("(UINTN)*{t}Cs->{member}"),
                None,
            ),
            (HandleType::Numeric, true) => (
                "ApplyFeatureSettingsNumericArrayType",
                format!("{t}Cs->{member}"),
                None,
            ),
            (HandleType::Boolean, false) => (
                "ApplyFeatureSettingsBooleanType",
                format!("(BOOLEAN)*{t}Cs->{member}"),
                None,
            ),
            (HandleType::Boolean, true) => (
                "ApplyFeatureSettingsBooleanArrayType",
                format!("{t}Cs->{member}"),
                None,
            ),
            (HandleType::String, false) => (
                "ApplyFeatureSettingsStringType",
                format!("{t}Cs->{member}"),
                None,
            ),
            (HandleType::String, true) => (
                "ApplyFeatureSettingsStringArrayType",
                format!("{t}Cs->{member}"),
                None,
            ),
            (HandleType::Vague, _) => (
                "ApplyFeatureSettingsVagueType",
                "EmptyPropCs->KeyValuePtr".to_string(),
                Some("EmptyPropCs->NunmOfProperties"),
            ),
            (HandleType::Unsupported, _) => unreachable!("handled above"),
        };

        let mut guard = String::new();
        if handle == HandleType::Vague {
            ctx.require_consume("RedfishCS_Type_EmptyProp_CS_Data   *EmptyPropCs;");
            guard.push_str(&format!(
                "{T2}//\n{T2}// Validate empty property.\n{T2}//\n\
                 {T2}if ({t}Cs->{member}->Prop.BackLink == {t}Cs->{member}->Prop.ForwardLink) {{\n\
                 {T3}goto ON_RELEASE;\n\
                 {T2}}}\n\
                 {T2}EmptyPropCs = (RedfishCS_Type_EmptyProp_CS_Data *){t}Cs->{member}->Prop.ForwardLink;\n\
                 {T2}if (EmptyPropCs->Header.ResourceType == RedfishCS_Type_JSON) {{\n\
                 {T3}DEBUG ((DEBUG_ERROR, \"%a, Empty property with RedfishCS_Type_JSON type resource is not supported yet. (%s)\\n\", __FUNCTION__, Private->Uri));\n\
                 {T3}goto ON_RELEASE;\n\
                 {T2}}}\n",
                T2 = TAB.repeat(2),
                T3 = TAB.repeat(3),
            ));
        }
        guard.push_str(&format!(
            "{T2}//\n{T2}// Find corresponding configure language for collection resource.\n{T2}//\n",
            T2 = TAB.repeat(2),
        ));

        code.push_str(&format!("{TAB}if ({t}Cs->{member} != NULL) {{\n"));
        code.push_str(&guard);
        code.push_str(&format!(
            "{T2}ConfigureLang = GetConfigureLang ({t}Cs->odata_id, \"{redpath}\");\n\
             {T2}if (ConfigureLang != NULL) {{\n",
            T2 = TAB.repeat(2),
        ));
        match count {
            None => code.push_str(&format!(
                "{T3}Status = {method} (RESOURCE_SCHEMA, RESOURCE_SCHEMA_VERSION, ConfigureLang, {value});\n",
                T3 = TAB.repeat(3),
            )),
            Some(count) => code.push_str(&format!(
                "{T3}Status = {method} (RESOURCE_SCHEMA, RESOURCE_SCHEMA_VERSION, ConfigureLang, {value}, {count});\n",
                T3 = TAB.repeat(3),
            )),
        }
        code.push_str(&format!(
            "{T3}if (EFI_ERROR (Status)) {{\n\
             {T4}DEBUG ((DEBUG_ERROR, \"%a, apply setting for %s failed: %r\\n\", __FUNCTION__, ConfigureLang, Status));\n\
             {T3}}}\n\n\
             {T3}FreePool (ConfigureLang);\n\
             {T2}}} else {{\n\
             {T3}DEBUG ((DEBUG_ERROR, \"%a, can not get configure language for URI: %s\\n\", __FUNCTION__, Private->Uri));\n\
             {T2}}}\n\
             {TAB}}}\n\n",
            T2 = TAB.repeat(2),
            T3 = TAB.repeat(3),
            T4 = TAB.repeat(4),
        ));

        code
    }

    fn emit_provision(
        &self,
        identity: &ResourceIdentity,
        key: &str,
        declared: Option<&DeclaredType>,
        item: Option<&ItemType>,
        ctx: &mut SynthesisContext,
    ) -> String {
        let t = &identity.type_name;
        let member = key.replace('.', "->");
        let redpath = key.replace('.', "/");
        let (handle, is_array) = resolve_handle_type(declared, item);

        let mut code = format!(
            "{TAB}//\n{TAB}// Handle {}\n{TAB}//\n",
            member.to_uppercase()
        );

        if handle == HandleType::Unsupported {
            code.push_str(&unsupported_placeholder());
            return code;
        }

        let target = format!("{t}Cs->{member}");
        let (method, value, condition, convert) = match (handle, is_array) {
            (HandleType::Numeric, false) => {
                ctx.require_provision("INT64                         *NumericValue;");
                (
                    "GetPropertyNumericValue",
                    "NumericValue",
                    format!("if (ProvisionMode || *{target} != *NumericValue) {{\n"),
                    format!(
                        "{target} = NumericValue;\n{T4}PropertyChanged = TRUE;\n{T3}}}\n",
                        T3 = TAB.repeat(3),
                        T4 = TAB.repeat(4),
                    ),
                )
            }
            (HandleType::Numeric, true) => {
                ctx.require_provision("INT64                         *NumericArrayValue;");
                ctx.require_provision("UINTN                         ArraySize;");
                (
                    "GetPropertyNumericArrayValue",
                    "NumericArrayValue",
                    format!(
                        "if (ProvisionMode || !CompareRedfishNumericArrayValues ({target}, NumericArrayValue, ArraySize)) {{\n"
                    ),
                    format!(
                        "AddRedfishNumericArray (&{target}, NumericArrayValue, ArraySize);\n{T4}PropertyChanged = TRUE;\n{T3}}}\n",
                        T3 = TAB.repeat(3),
                        T4 = TAB.repeat(4),
                    ),
                )
            }
            (HandleType::Boolean, false) => {
                ctx.require_provision("BOOLEAN                       *BooleanValue;");
                ctx.require_provision("INT32                         *IntegerValue;");
                (
                    "GetPropertyBooleanValue",
                    "BooleanValue",
                    format!("if (ProvisionMode || *{target} != *BooleanValue) {{\n"),
                    format!(
                        "IntegerValue = AllocatePool (sizeof (*IntegerValue));\n\
                         {T4}if (IntegerValue != NULL) {{\n\
                         {T4}  *IntegerValue = (BooleanValue ? 0x01 : 0x00);\n\
                         {T4}  {target} = IntegerValue;\n\
                         {T4}  PropertyChanged = TRUE;\n\
                         {T3}  }}\n\
                         {T3}}}\n",
                        T3 = TAB.repeat(3),
                        T4 = TAB.repeat(4),
                    ),
                )
            }
            (HandleType::Boolean, true) => {
                ctx.require_provision("BOOLEAN                       *BooleanArrayValue;");
                ctx.require_provision("UINTN                         ArraySize;");
                (
                    "GetPropertyBooleanArrayValue",
                    "BooleanArrayValue",
                    format!(
                        "if (ProvisionMode || !CompareRedfishBooleanArrayValues ({target}, BooleanArrayValue, ArraySize)) {{\n"
                    ),
                    format!(
                        "AddRedfishBooleanArray (&{target}, BooleanArrayValue, ArraySize);\n{T4}PropertyChanged = TRUE;\n{T3}}}\n",
                        T3 = TAB.repeat(3),
                        T4 = TAB.repeat(4),
                    ),
                )
            }
            (HandleType::String, false) => {
                ctx.require_provision("CHAR8                         *AsciiStringValue;");
                (
                    "GetPropertyStringValue",
                    "AsciiStringValue",
                    format!("if (ProvisionMode || AsciiStrCmp ({target}, AsciiStringValue) != 0) {{\n"),
                    format!(
                        "{target} = AsciiStringValue;\n{T4}PropertyChanged = TRUE;\n{T3}}}\n",
                        T3 = TAB.repeat(3),
                        T4 = TAB.repeat(4),
                    ),
                )
            }
            (HandleType::String, true) => {
                ctx.require_provision("CHAR8                         **AsciiStringArrayValue;");
                ctx.require_provision("UINTN                         ArraySize;");
                (
                    "GetPropertyStringArrayValue",
                    "AsciiStringArrayValue",
                    format!(
                        "if (ProvisionMode || !CompareRedfishStringArrayValues ({target}, AsciiStringArrayValue, ArraySize)) {{\n"
                    ),
                    format!(
                        "AddRedfishCharArray (&{target}, AsciiStringArrayValue, ArraySize);\n{T4}PropertyChanged = TRUE;\n{T3}}}\n",
                        T3 = TAB.repeat(3),
                        T4 = TAB.repeat(4),
                    ),
                )
            }
            (HandleType::Vague, _) => {
                ctx.require_provision("RedfishCS_EmptyProp_KeyValue  *PropertyVagueValues;");
                ctx.require_provision("UINT32                        VagueValueNumber;");
                let empty_prop =
                    format!("((RedfishCS_Type_EmptyProp_CS_Data *){target}->Prop.ForwardLink)");
                (
                    "GetPropertyVagueValue",
                    "PropertyVagueValues",
                    format!(
                        "if (ProvisionMode || !CompareRedfishPropertyVagueValues (\n\
                         {T14} {empty_prop}->KeyValuePtr,\n\
                         {T14} {empty_prop}->NunmOfProperties,\n\
                         {T14} PropertyVagueValues,\n\
                         {T14} VagueValueNumber)) {{\n",
                        T14 = TAB.repeat(14),
                    ),
                    format!(
                        "//\n\
                         {T4}// Use the properties on system to replace the one on Redfish service.\n\
                         {T4}//\n\
                         {T4}FreeEmptyPropKeyValueList ({empty_prop}->KeyValuePtr);\n\
                         {T4}{empty_prop}->KeyValuePtr = PropertyVagueValues;\n\
                         {T4}{empty_prop}->NunmOfProperties = VagueValueNumber;\n\
                         {T4}PropertyChanged = TRUE;\n\
                         {T3}}}\n",
                        T3 = TAB.repeat(3),
                        T4 = TAB.repeat(4),
                    ),
                )
            }
            (HandleType::Unsupported, _) => unreachable!("handled above"),
        };

        let out_param = match (handle, is_array) {
            (HandleType::Vague, _) => ", &VagueValueNumber",
            (_, true) => ", &ArraySize",
            (_, false) => "",
        };

        code.push_str(&format!(
            "{TAB}if (PropertyChecker ({target}, ProvisionMode)) {{\n"
        ));
        code.push_str(&format!(
            "{T2}{value} = {method} (RESOURCE_SCHEMA, RESOURCE_SCHEMA_VERSION, L\"{redpath}\", ConfigureLang{out_param});\n",
            T2 = TAB.repeat(2),
        ));
        code.push_str(&format!(
            "{T2}if ({value} != NULL) {{\n{T3}{condition}{T4}{convert}{T2}}}\n{TAB}}}\n",
            T2 = TAB.repeat(2),
            T3 = TAB.repeat(3),
            T4 = TAB.repeat(4),
        ));

        code
    }

    /// Initializer for a nested definitions-block member. Three-way
    /// outcome: allocate locally, defer to a collection driver, or defer to
    /// a feature driver.
    fn initial_member(
        &self,
        identity: &ResourceIdentity,
        member_name: &str,
        reference: Option<&str>,
        probe: Option<&ExternalRefProbe>,
        ctx: &mut SynthesisContext,
    ) -> String {
        let t = &identity.type_name;
        let upper = member_name.to_uppercase();

        match probe {
            None => {
                // The CS struct is named after the definitions entry, which
                // may differ from the property name
                let mut cs_name = member_name.to_string();
                if let Some(stripped) =
                    reference.and_then(|r| r.strip_prefix("#/definitions/"))
                {
                    if stripped != member_name {
                        cs_name = stripped.to_string();
                    }
                }
                ctx.has_open_member = true;
                format!(
                    "{TAB}//\n{TAB}// Handle {upper}\n{TAB}//\n\
                     {TAB}if ({t}Cs->{member_name} == NULL) {{\n\
                     {T2}{t}Cs->{member_name} = AllocateZeroPool (sizeof (Redfish{t}_{version}_{cs_name}_CS));\n\
                     {T2}ASSERT ({t}Cs->{member_name} != NULL);\n\
                     {TAB}}}\n\n",
                    T2 = TAB.repeat(2),
                    version = identity.version.to_uppercase(),
                )
            }
            Some(probe) if !probe.has_ref => format!(
                "{TAB}//\n{TAB}// {upper} is not handled. Defined in {}\n{TAB}//\n\n",
                probe.uri
            ),
            Some(probe) => {
                ctx.has_open_member = false;
                if probe.is_collection {
                    format!(
                        "{TAB}//\n{TAB}// {upper} will be handled by collection driver.\n{TAB}//\n\n"
                    )
                } else {
                    format!(
                        "{TAB}//\n{TAB}// {upper} will be handled by feature driver.\n{TAB}//\n\n"
                    )
                }
            }
        }
    }

    fn open_member(
        &self,
        identity: &ResourceIdentity,
        member_name: &str,
        ctx: &SynthesisContext,
    ) -> String {
        if !ctx.has_open_member {
            return String::new();
        }
        let t = &identity.type_name;
        format!(
            "{TAB}//\n{TAB}// Handle {}\n{TAB}//\n{TAB}if ({t}Cs->{member_name} != NULL) {{\n",
            member_name.to_uppercase()
        )
    }

    fn close_member(&self, ctx: &SynthesisContext) -> String {
        if !ctx.has_open_member {
            return String::new();
        }
        format!("{TAB}}}\n\n")
    }
}

fn unsupported_placeholder() -> String {
    format!(
        "{TAB}//\n{TAB}// ****** Warning ******\n{TAB}// Unsupported array type\n{TAB}//\n\n"
    )
}

/// Re-indent every non-empty line of a fragment
fn indent(code: &str, levels: usize) -> String {
    if code.is_empty() {
        return String::new();
    }
    let prefix = TAB.repeat(levels);
    let mut out = String::new();
    for line in code.split('\n') {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&prefix);
            out.push_str(line);
            out.push('\n');
        }
    }
    // split('\n') yields a trailing empty element for newline-terminated
    // input; drop the extra newline it would add
    if code.ends_with('\n') {
        out.pop();
    }
    out
}
