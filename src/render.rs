//! Driver artifact rendering
//!
//! Splices synthesized code fragments into the boilerplate driver
//! templates by literal placeholder substitution, and writes one artifact
//! set per resource (common header + source, DXE source + INF) and per
//! collection. Placeholder tokens are unique delimiter-wrapped strings
//! that never occur in legitimate program text, so substitution order is
//! irrelevant.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::GeneratorConfig;
use crate::error::{GeneratorError, Result};
use crate::resolver::CollectionEntry;
use crate::synth::{CodeFragmentBundle, ResourceIdentity};

/// File header carried by every generated source file
const COPYRIGHT: &str = "/** @file\n\n\
  Redfish feature driver implementation - internal header file\n\
  (C) Copyright 2020-2021 Hewlett Packard Enterprise Development LP<BR>\n\
  SPDX-License-Identifier: BSD-2-Clause-Patent\n\n\
**/\n\n";

const SCHEMA_INFO_COMMENT: &str = "//\n// Schema information.\n//\n";

/// Replace every keyword token in every line
pub fn substitute(lines: &[String], keywords: &[(&str, String)]) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            let mut line = line.clone();
            for (token, value) in keywords {
                if line.contains(token) {
                    line = line.replace(token, value);
                }
            }
            line
        })
        .collect()
}

/// A boilerplate template loaded from the template directory
struct Template {
    name: String,
    lines: Vec<String>,
}

fn load_templates(dir: &Path) -> Vec<Template> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| {
            let content = fs::read_to_string(e.path()).ok()?;
            Some(Template {
                name: e.file_name().to_string_lossy().to_string(),
                lines: content.split('\n').map(str::to_string).collect(),
            })
        })
        .collect()
}

/// Renders generated driver artifacts under `output_path`
pub struct TemplateRenderer<'a> {
    config: &'a GeneratorConfig,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(config: &'a GeneratorConfig) -> Self {
        Self { config }
    }

    fn feature_root(&self) -> PathBuf {
        self.config.output_path.join("RedfishFeatureDrivers")
    }

    /// Render the artifact set for one versioned resource: the common
    /// header and source under `Common/`, the DXE driver source and INF
    /// under `Dxe/`.
    pub fn render_feature(
        &self,
        fname: &str,
        bundle: &CodeFragmentBundle,
        parent_prop_name: &str,
    ) -> Result<()> {
        let Some(identity) = ResourceIdentity::from_filename(fname) else {
            return Ok(());
        };
        let driver_dir = self
            .feature_root()
            .join(&identity.type_name)
            .join(&identity.version);

        let common_dir = driver_dir.join("Common");
        fs::create_dir_all(&common_dir)?;

        let header = self.common_header(&identity, parent_prop_name);
        fs::write(
            common_dir.join(format!("{}Common.h", identity.type_name)),
            header,
        )?;

        let common_template = self.find_feature_template("Common")?;
        let keywords = self.common_source_keywords(&identity, bundle);
        let rendered = substitute(&common_template.lines, &keywords);
        fs::write(
            common_dir.join(format!("{}Common.c", identity.type_name)),
            rendered.join("\n"),
        )?;

        let dxe_dir = driver_dir.join("Dxe");
        fs::create_dir_all(&dxe_dir)?;

        let keywords: Vec<(&str, String)> = vec![
            (
                "!**EDK2_FEATURE_DRIVER_BASENAME**!",
                format!("{}Dxe", identity.type_name),
            ),
            (
                "!**EDK2_FEATURE_DRIVER_FILEGUID**!",
                Uuid::new_v4().to_string(),
            ),
            (
                "!**EDK2_COMMON_DRIVER_NAME**!",
                format!("{}Common", identity.type_name),
            ),
            ("!**EDK2_RESOURCE_TYPE**!", identity.type_name.clone()),
        ];
        for template in self.feature_driver_templates() {
            let out_name = if template.name.contains("Inf") {
                format!("{}Dxe.inf", identity.type_name)
            } else {
                format!("{}Dxe.c", identity.type_name)
            };
            let rendered = substitute(&template.lines, &keywords);
            fs::write(dxe_dir.join(out_name), rendered.join("\n"))?;
        }

        info!("rendered feature driver {}/{}", identity.type_name, identity.version);
        Ok(())
    }

    /// Render the artifact set for one collection driver
    pub fn render_collection(&self, entry: &CollectionEntry) -> Result<()> {
        let typename = &entry.resource_type_name;
        if typename.is_empty() {
            return Ok(());
        }
        let collection_dir = self.feature_root().join(format!("{typename}Dxe"));
        fs::create_dir_all(&collection_dir)?;

        let resource_typename = typename.replace("Collection", "");
        let keywords: Vec<(&str, String)> = vec![
            ("!**EDK2_COLLECTION_TYPENAME_CAPITAL**!", typename.to_uppercase()),
            ("!**EDK2_COLLECTION_TYPENAME**!", typename.clone()),
            (
                "!**EDK2_RESOURCE_TYPENAME_CAPITAL**!",
                resource_typename.to_uppercase(),
            ),
            ("!**EDK2_RESOURCE_TYPENAME**!", resource_typename),
            (
                "!**EDK2_COLLECTION_DRIVER_FILEGUID**!",
                Uuid::new_v4().to_string(),
            ),
            (
                "!**EDK2_REDFISH_RESOURCE_URI**!",
                resource_uri_list(&entry.dependency_paths),
            ),
        ];

        let template_dir = self.config.edk2_template_path.join("CollectionTempFiles");
        let templates = load_templates(&template_dir);
        if templates.is_empty() {
            return Err(GeneratorError::TemplateNotFound {
                token: "Collection".to_string(),
                dir: template_dir,
            });
        }
        for template in templates {
            let out_name = if template.name.contains("CollectionInclude") {
                format!("{typename}Dxe.h")
            } else if template.name.contains("CollectionInf") {
                format!("{typename}Dxe.inf")
            } else if template.name.contains("CollectionDxe") {
                format!("{typename}Dxe.c")
            } else {
                continue;
            };
            let rendered = substitute(&template.lines, &keywords);
            fs::write(collection_dir.join(out_name), rendered.join("\n"))?;
        }

        info!("rendered collection driver {typename}");
        Ok(())
    }

    /// Touch-create the configured auxiliary component list files
    pub fn touch_component_files(&self) -> Result<()> {
        for fname in &self.config.edk2_component_filelist {
            let path = self.config.output_path.join(fname);
            if !path.exists() {
                fs::write(&path, "")?;
            }
        }
        Ok(())
    }

    /// The synthesized common header: schema identity defines plus the
    /// redpath array pattern derived from the discovering property name
    fn common_header(&self, identity: &ResourceIdentity, parent_prop_name: &str) -> String {
        let t = &identity.type_name;
        let upper = t.to_uppercase();
        let version = &identity.version;
        let parts = identity.version_parts();
        let part = |i: usize| parts.get(i).copied().unwrap_or("0");

        let mut content = String::from(COPYRIGHT);
        content.push_str(&format!(
            "#ifndef EFI_REDFISH_{upper}_COMMON_H_\n#define EFI_REDFISH_{upper}_COMMON_H_\n\n"
        ));
        content.push_str(&format!(
            "#include <RedfishJsonStructure/{t}/{version}/Efi{t}{}.h>\n",
            version.to_uppercase()
        ));
        content.push_str("#include <RedfishResourceCommon.h>\n\n");
        content.push_str(SCHEMA_INFO_COMMENT);
        content.push_str(&format!("#define RESOURCE_SCHEMA         \"{t}\"\n"));
        content.push_str(&format!("#define RESOURCE_SCHEMA_MAJOR   \"{}\"\n", part(0)));
        content.push_str(&format!("#define RESOURCE_SCHEMA_MINOR   \"{}\"\n", part(1)));
        content.push_str(&format!("#define RESOURCE_SCHEMA_ERRATA  \"{}\"\n", part(2)));
        content.push_str(&format!("#define RESOURCE_SCHEMA_VERSION \"{version}\"\n"));
        content.push_str(&format!(
            "#define REDPATH_ARRAY_PATTERN   L\"/{parent_prop_name}/\\\\{{.*\\\\}}/\"\n"
        ));
        content.push_str(&format!(
            "#define REDPATH_ARRAY_PREFIX    L\"/{parent_prop_name}/\"\n"
        ));
        content.push_str(&format!(
            "#define RESOURCE_SCHEMA_FULL    \"x-uefi-redfish-{t}.{version}\"\n"
        ));
        content.push_str("\n#endif\n");
        content
    }

    fn common_source_keywords(
        &self,
        identity: &ResourceIdentity,
        bundle: &CodeFragmentBundle,
    ) -> Vec<(&'static str, String)> {
        let t = &identity.type_name;
        let upper = t.to_uppercase();
        let version_upper = identity.version.to_uppercase();

        let namespace = format!(
            "  EFI_REDFISH_{upper}_{version_upper}     *{t};\n  EFI_REDFISH_{upper}_{version_upper}_CS  *{t}Cs;"
        );

        let mut provision_declarations = String::new();
        for declaration in &bundle.provision_declarations {
            provision_declarations.push_str(&format!("  {declaration}\n"));
        }
        provision_declarations.push('\n');

        let mut consume_declarations = String::new();
        for declaration in &bundle.consume_declarations {
            consume_declarations.push_str(&format!("  {declaration}\n"));
        }

        let etag = if bundle.has_etag {
            format!("{t}Cs->odata_etag")
        } else {
            "NULL".to_string()
        };

        vec![
            (
                "!**EDK2_COMMON_DRIVER_HEADER_CONTENT**!",
                format!("#include \"{t}Common.h\""),
            ),
            (
                "!**EDK2_RESOURCE_TITLE**!",
                format!("#{t}.{}.{t}", identity.version),
            ),
            ("!**EDK2_RESOURCE_NAMESPACE**!", namespace),
            (
                "!**EDK2_RESOURCE_ASSIGNMENT**!",
                format!("  {t}Cs = {t}->{t};"),
            ),
            ("!**EDK2_RESOURCE_TYPE**!", t.clone()),
            (
                "!**EDK2_RESOURCE_PROP_HANDLE_CODE**!",
                bundle.consume_code.clone(),
            ),
            (
                "!**EDK2_RESOURCE_PROP_PROVISION_CODE**!",
                bundle.provision_code.clone(),
            ),
            ("!**EDK2_FEATURE_DRIVER_CHECK_ETAG**!", etag),
            (
                "!**EDK2_PROVISION_VARIABLE_DECLARATION**!",
                provision_declarations,
            ),
            (
                "!**EDK2_CONSUME_VARIABLE_DECLARATION**!",
                consume_declarations,
            ),
        ]
    }

    /// The common-source template: name carries "Common" but not
    /// "Collection"
    fn find_feature_template(&self, token: &str) -> Result<Template> {
        load_templates(&self.config.edk2_template_path)
            .into_iter()
            .find(|t| t.name.contains(token) && !t.name.contains("Collection"))
            .ok_or_else(|| GeneratorError::TemplateNotFound {
                token: token.to_string(),
                dir: self.config.edk2_template_path.clone(),
            })
    }

    /// Driver templates: everything that is neither a Common nor a
    /// Collection template
    fn feature_driver_templates(&self) -> Vec<Template> {
        load_templates(&self.config.edk2_template_path)
            .into_iter()
            .filter(|t| !t.name.contains("Common") && !t.name.contains("Collection"))
            .filter(|t| t.name.contains("Dxe") || t.name.contains("Inf"))
            .collect()
    }
}

/// Semicolon-joined discovery paths, with the service-root prefix stripped
/// since no feature driver manages the ServiceRoot schema itself
fn resource_uri_list(dependency_paths: &[String]) -> String {
    dependency_paths
        .iter()
        .map(|p| p.strip_prefix("ServiceRoot/").unwrap_or(p).to_string())
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_in(dir: &Path) -> GeneratorConfig {
        let template_dir = dir.join("template");
        fs::create_dir_all(template_dir.join("CollectionTempFiles")).unwrap();
        serde_json::from_str(
            &json!({
                "import_from": dir.join("schemas"),
                "output_path": dir.join("out"),
                "RootSchema": "ServiceRoot.v1_0_0.json",
                "edk2_template_path": template_dir,
                "edk2_component_filelist": ["Drivers.inc"]
            })
            .to_string(),
        )
        .unwrap()
    }

    fn write_templates(config: &GeneratorConfig) {
        let dir = &config.edk2_template_path;
        fs::write(
            dir.join("RedfishFeatureCommon.temp"),
            "!**EDK2_COMMON_DRIVER_HEADER_CONTENT**!\n\
             !**EDK2_CONSUME_VARIABLE_DECLARATION**!\n\
             !**EDK2_RESOURCE_PROP_HANDLE_CODE**!\n\
             CheckEtag (!**EDK2_FEATURE_DRIVER_CHECK_ETAG**!);\n",
        )
        .unwrap();
        fs::write(
            dir.join("RedfishFeatureDxe.temp"),
            "// !**EDK2_FEATURE_DRIVER_BASENAME**! includes !**EDK2_COMMON_DRIVER_NAME**!\n",
        )
        .unwrap();
        fs::write(
            dir.join("RedfishFeatureInf.temp"),
            "FILE_GUID = !**EDK2_FEATURE_DRIVER_FILEGUID**!\n",
        )
        .unwrap();
        fs::write(
            dir.join("CollectionTempFiles").join("CollectionDxe.temp"),
            "// !**EDK2_COLLECTION_TYPENAME**! at !**EDK2_REDFISH_RESOURCE_URI**!\n",
        )
        .unwrap();
        fs::write(
            dir.join("CollectionTempFiles").join("CollectionInclude.temp"),
            "#define !**EDK2_COLLECTION_TYPENAME_CAPITAL**!\n",
        )
        .unwrap();
        fs::write(
            dir.join("CollectionTempFiles").join("CollectionInf.temp"),
            "FILE_GUID = !**EDK2_COLLECTION_DRIVER_FILEGUID**!\n",
        )
        .unwrap();
    }

    #[test]
    fn test_substitute_replaces_all_tokens_per_line() {
        let lines = vec!["A !**X**! B !**X**! C !**Y**!".to_string()];
        let out = substitute(
            &lines,
            &[("!**X**!", "1".to_string()), ("!**Y**!", "2".to_string())],
        );
        assert_eq!(out, vec!["A 1 B 1 C 2"]);
    }

    #[test]
    fn test_resource_uri_list_strips_service_root() {
        let deps = vec![
            "ServiceRoot/Managers/{}".to_string(),
            "Chassis/Managers/{}".to_string(),
        ];
        assert_eq!(resource_uri_list(&deps), "Managers/{};Chassis/Managers/{}");
    }

    #[test]
    fn test_render_feature_writes_artifact_set() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_templates(&config);
        let renderer = TemplateRenderer::new(&config);

        let bundle = CodeFragmentBundle {
            consume_code: "  // consume\n".to_string(),
            provision_code: "  // provision\n".to_string(),
            consume_declarations: vec!["CHAR8                         *AsciiStringValue;".to_string()],
            provision_declarations: vec![],
            has_etag: true,
        };
        renderer
            .render_feature("Manager.v1_0_0.json", &bundle, "Managers")
            .unwrap();

        let base = config
            .output_path
            .join("RedfishFeatureDrivers")
            .join("Manager")
            .join("v1_0_0");
        let header = fs::read_to_string(base.join("Common").join("ManagerCommon.h")).unwrap();
        assert!(header.contains("#define RESOURCE_SCHEMA         \"Manager\""));
        assert!(header.contains("#define RESOURCE_SCHEMA_MAJOR   \"1\""));
        assert!(header.contains("#define RESOURCE_SCHEMA_VERSION \"v1_0_0\""));
        assert!(header.contains("#define REDPATH_ARRAY_PREFIX    L\"/Managers/\""));
        assert!(header.contains("EfiManagerV1_0_0.h"));

        let common = fs::read_to_string(base.join("Common").join("ManagerCommon.c")).unwrap();
        assert!(common.contains("#include \"ManagerCommon.h\""));
        assert!(common.contains("  CHAR8                         *AsciiStringValue;"));
        assert!(common.contains("CheckEtag (ManagerCs->odata_etag);"));

        let inf = fs::read_to_string(base.join("Dxe").join("ManagerDxe.inf")).unwrap();
        assert!(inf.starts_with("FILE_GUID = "));
        assert!(!inf.contains("!**"));

        let dxe = fs::read_to_string(base.join("Dxe").join("ManagerDxe.c")).unwrap();
        assert!(dxe.contains("ManagerDxe includes ManagerCommon"));
    }

    #[test]
    fn test_render_feature_without_etag_uses_null() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_templates(&config);
        let renderer = TemplateRenderer::new(&config);

        let bundle = CodeFragmentBundle::default();
        renderer
            .render_feature("Manager.v1_0_0.json", &bundle, "Managers")
            .unwrap();
        let common = fs::read_to_string(
            config
                .output_path
                .join("RedfishFeatureDrivers/Manager/v1_0_0/Common/ManagerCommon.c"),
        )
        .unwrap();
        assert!(common.contains("CheckEtag (NULL);"));
    }

    #[test]
    fn test_render_collection_writes_artifact_set() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_templates(&config);
        let renderer = TemplateRenderer::new(&config);

        let entry = CollectionEntry {
            driver_path: "http://redfish.dmtf.org/schemas/v1/ManagerCollection.json".to_string(),
            dependency_paths: vec!["ServiceRoot/Managers/{}".to_string()],
            resource_type_name: "ManagerCollection".to_string(),
        };
        renderer.render_collection(&entry).unwrap();

        let base = config
            .output_path
            .join("RedfishFeatureDrivers")
            .join("ManagerCollectionDxe");
        let dxe = fs::read_to_string(base.join("ManagerCollectionDxe.c")).unwrap();
        assert!(dxe.contains("ManagerCollection at Managers/{}"));
        let header = fs::read_to_string(base.join("ManagerCollectionDxe.h")).unwrap();
        assert!(header.contains("MANAGERCOLLECTION"));
        assert!(base.join("ManagerCollectionDxe.inf").exists());
    }

    #[test]
    fn test_missing_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        // no templates written
        let renderer = TemplateRenderer::new(&config);
        let result = renderer.render_feature("Manager.v1_0_0.json", &CodeFragmentBundle::default(), "Managers");
        assert!(matches!(
            result,
            Err(GeneratorError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_touch_component_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::create_dir_all(&config.output_path).unwrap();
        let marker = config.output_path.join("Drivers.inc");
        fs::write(&marker, "keep me").unwrap();

        let renderer = TemplateRenderer::new(&config);
        renderer.touch_component_files().unwrap();
        // existing files are never overwritten
        assert_eq!(fs::read_to_string(&marker).unwrap(), "keep me");
    }
}
