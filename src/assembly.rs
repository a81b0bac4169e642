use std::{
    ffi::OsStr,
    fmt, fs,
    path::{Path, PathBuf},
};

use dotscope::prelude::{CilObject, CustomAttributeRaw, MemberRefRaw, TableId, TypeRefRaw, ValidationConfig};
use glob::glob;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    module::ResourceModule,
};

const REFLECTION_NAMESPACE: &str = "System.Reflection";
const CUSTOM_ATTRIBUTE_PROLOG: [u8; 2] = [0x01, 0x00];
const NULL_STRING: u8 = 0xFF;

/// Identity taken from the `Assembly` metadata table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyName {
    pub name: String,
    pub version: [u16; 4],
    pub culture: String,
}

impl fmt::Display for AssemblyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, build, revision] = self.version;
        let culture = if self.culture.is_empty() {
            "neutral"
        } else {
            &self.culture
        };
        write!(
            f,
            "{}, Version={major}.{minor}.{build}.{revision}, Culture={culture}",
            self.name
        )
    }
}

/// Descriptive `System.Reflection` attributes applied to the assembly.
///
/// Attributes the assembly does not carry stay empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyInfo {
    pub title: String,
    pub description: String,
    pub company: String,
    pub product: String,
    pub copyright: String,
}

impl AssemblyInfo {
    fn field_mut(&mut self, attribute: &str) -> Option<&mut String> {
        match attribute {
            "AssemblyTitleAttribute" => Some(&mut self.title),
            "AssemblyDescriptionAttribute" => Some(&mut self.description),
            "AssemblyCompanyAttribute" => Some(&mut self.company),
            "AssemblyProductAttribute" => Some(&mut self.product),
            "AssemblyCopyrightAttribute" => Some(&mut self.copyright),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
struct EmbeddedResource {
    name: String,
    data: Vec<u8>,
}

/// A .NET assembly loaded for inspection only. No code in it is ever run.
#[derive(Clone, Debug)]
pub struct Assembly {
    location: Option<PathBuf>,
    name: Option<AssemblyName>,
    info: AssemblyInfo,
    resources: Vec<EmbeddedResource>,
}

impl Assembly {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let mut assembly = Assembly::from_bytes(data)?;
        assembly.location = Some(path.to_path_buf());
        log::info!(
            "loaded assembly {} from {path:?} ({} embedded resources)",
            assembly.full_name(),
            assembly.resources.len()
        );
        Ok(assembly)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let object = CilObject::from_mem_with_validation(data, ValidationConfig::minimal())
            .map_err(|e| Error::NotAnAssembly(e.to_string()))?;

        let name = object.assembly().map(|assembly| AssemblyName {
            name: assembly.name.clone(),
            version: [
                version_part(assembly.major_version),
                version_part(assembly.minor_version),
                version_part(assembly.build_number),
                version_part(assembly.revision_number),
            ],
            culture: assembly.culture.clone().unwrap_or_default(),
        });

        Ok(Assembly {
            location: None,
            name,
            info: read_info(&object),
            resources: embedded_resources(&object),
        })
    }

    pub fn name(&self) -> Option<&AssemblyName> {
        self.name.as_ref()
    }

    pub fn info(&self) -> &AssemblyInfo {
        &self.info
    }

    /// Display name in the `Name, Version=..., Culture=...` form.
    ///
    /// Modules without an `Assembly` row fall back to their file name.
    pub fn full_name(&self) -> String {
        match (&self.name, &self.location) {
            (Some(name), _) => name.to_string(),
            (None, Some(path)) => path
                .file_name()
                .and_then(OsStr::to_str)
                .unwrap_or_default()
                .to_owned(),
            (None, None) => String::new(),
        }
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }
}

impl ResourceModule for Assembly {
    fn resource_names(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.name.clone()).collect()
    }

    fn open_resource(&self, name: &str) -> Option<&[u8]> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.data.as_slice())
    }
}

fn version_part<T>(part: T) -> u16
where
    u16: TryFrom<T>,
{
    u16::try_from(part).unwrap_or(u16::MAX)
}

/// Copies out the resources stored in this file, in manifest order.
fn embedded_resources(object: &CilObject) -> Vec<EmbeddedResource> {
    let resources = object.resources();
    let mut manifest: Vec<_> = resources.iter().map(|entry| entry.value().clone()).collect();
    manifest.sort_by_key(|resource| resource.rid);

    let mut embedded = Vec::with_capacity(manifest.len());
    for resource in manifest {
        if resource.source.is_some() {
            log::debug!("skipping linked resource {}", resource.name);
            continue;
        }
        match resources.get_data(&resource) {
            Some(data) => embedded.push(EmbeddedResource {
                name: resource.name.clone(),
                data: data.to_vec(),
            }),
            None => log::warn!("resource {} lies outside the image", resource.name),
        }
    }
    embedded
}

/// Collects the string arguments of the descriptive attributes on the `Assembly` row.
fn read_info(object: &CilObject) -> AssemblyInfo {
    let mut info = AssemblyInfo::default();
    let (Some(tables), Some(strings), Some(blobs)) = (object.tables(), object.strings(), object.blob())
    else {
        return info;
    };
    let (Some(attributes), Some(members), Some(types)) = (
        tables.table::<CustomAttributeRaw>(),
        tables.table::<MemberRefRaw>(),
        tables.table::<TypeRefRaw>(),
    ) else {
        return info;
    };

    for attribute in attributes.iter() {
        if attribute.parent.tag != TableId::Assembly || attribute.constructor.tag != TableId::MemberRef {
            continue;
        }
        let Some(constructor) = members.get(attribute.constructor.row) else {
            continue;
        };
        if constructor.class.tag != TableId::TypeRef {
            continue;
        }
        let Some(type_ref) = types.get(constructor.class.row) else {
            continue;
        };
        let (Ok(namespace), Ok(type_name)) = (
            strings.get(type_ref.type_namespace as usize),
            strings.get(type_ref.type_name as usize),
        ) else {
            continue;
        };
        if namespace != REFLECTION_NAMESPACE {
            continue;
        }
        let Some(field) = info.field_mut(type_name) else {
            continue;
        };
        match blobs.get(attribute.value as usize).ok().and_then(string_argument) {
            Some(value) => *field = value,
            None => log::debug!("{type_name} carries no readable string argument"),
        }
    }
    info
}

/// Reads the single string argument of a custom attribute value blob.
fn string_argument(blob: &[u8]) -> Option<String> {
    let rest = blob.strip_prefix(&CUSTOM_ATTRIBUTE_PROLOG)?;
    let (&first, rest) = rest.split_first()?;
    if first == NULL_STRING {
        return None;
    }
    let (len, rest) = match first {
        0x00..=0x7F => (usize::from(first), rest),
        0x80..=0xBF => {
            let (&second, rest) = rest.split_first()?;
            ((usize::from(first & 0x3F) << 8) | usize::from(second), rest)
        }
        _ => {
            let (bytes, rest) = rest.split_first_chunk::<3>()?;
            let len = u32::from_be_bytes([first & 0x1F, bytes[0], bytes[1], bytes[2]]);
            (len as usize, rest)
        }
    };
    let text = rest.get(..len)?;
    String::from_utf8(text.to_vec()).ok()
}

/// Expands a glob pattern into the `.dll`/`.exe` files it matches.
pub fn find_assemblies(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).map_err(|e| Error::Unsupported(format!("bad pattern: {e}")))?;
    Ok(paths
        .filter_map(std::result::Result::ok)
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(OsStr::to_str)
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dll") || ext.eq_ignore_ascii_case("exe"))
        })
        .collect())
}
