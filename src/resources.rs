use std::io::{Cursor, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
    error::{Result, malformed},
    nrbf::Document,
    utils::binary_utils::{read_7bit_int, read_bytes, read_prefixed_string, read_prefixed_utf16},
};

pub const RESOURCE_MAGIC: u32 = 0xBEEF_CACE;
const READER_TYPE_PREFIX: &str = "System.Resources.ResourceReader";
const TYPE_CODE_STRING: i32 = 0x01;
const TYPE_CODE_LAST_PRIMITIVE: i32 = 0x10;
const TYPE_CODE_BYTE_ARRAY: i32 = 0x20;
const TYPE_CODE_STREAM: i32 = 0x21;
const TYPE_CODE_USER_TYPES: i32 = 0x40;

/// A value read from a resource table.
#[derive(Clone, Debug)]
pub enum ResourceValue {
    Null,
    String(String),
    /// Any other primitive; only its type code is kept.
    Primitive(i32),
    /// A `byte[]` or stream value.
    Bytes(Vec<u8>),
    /// A serialized object together with its declared type name.
    Object { type_name: String, document: Document },
}

impl ResourceValue {
    /// The serialized class name, e.g. `System.Drawing.Bitmap`, for object values.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            ResourceValue::Object { document, .. } => document.root().map(|root| root.name()),
            _ => None,
        }
    }
}

/// A parsed resource table. Values are decoded on demand by [`ResourceTable::entries`].
#[derive(Debug)]
pub struct ResourceTable<'a> {
    data: &'a [u8],
    version: i32,
    type_names: Vec<String>,
    name_positions: Vec<i32>,
    name_section: u64,
    data_section: u64,
}

impl<'a> ResourceTable<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != RESOURCE_MAGIC {
            malformed!("bad resource table magic {magic:#x}");
        }
        let header_version = reader.read_i32::<LittleEndian>()?;
        let skip = reader.read_i32::<LittleEndian>()?;
        if header_version > 1 {
            reader.seek(SeekFrom::Current(i64::from(skip)))?;
        } else {
            let reader_type = read_prefixed_string(&mut reader)?;
            if !reader_type.starts_with(READER_TYPE_PREFIX) {
                malformed!("unsupported resource reader {reader_type}");
            }
            let _set_type = read_prefixed_string(&mut reader)?;
        }

        let version = reader.read_i32::<LittleEndian>()?;
        if version != 1 && version != 2 {
            malformed!("unsupported resource set version {version}");
        }
        let count = reader.read_i32::<LittleEndian>()?;
        let type_count = reader.read_i32::<LittleEndian>()?;
        if count < 0 || type_count < 0 {
            malformed!("negative resource or type count");
        }
        let mut type_names = Vec::new();
        for _ in 0..type_count {
            type_names.push(read_prefixed_string(&mut reader)?);
        }

        // Name hashes are aligned to 8 bytes, padded with "PAD".
        let misalignment = reader.position() & 7;
        if misalignment != 0 {
            reader.seek(SeekFrom::Current((8 - misalignment) as i64))?;
        }
        reader.seek(SeekFrom::Current(i64::from(count) * 4))?;
        let mut name_positions = Vec::new();
        for _ in 0..count {
            name_positions.push(reader.read_i32::<LittleEndian>()?);
        }
        let data_section = reader.read_i32::<LittleEndian>()?;
        let Ok(data_section) = u64::try_from(data_section) else {
            malformed!("negative data section offset");
        };
        if data_section > data.len() as u64 {
            malformed!("data section starts past the end of the table");
        }

        Ok(ResourceTable {
            data,
            version,
            type_names,
            name_positions,
            name_section: reader.position(),
            data_section,
        })
    }

    pub fn len(&self) -> usize {
        self.name_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_positions.is_empty()
    }

    /// Reads entry `index` as `(key, value)`.
    pub fn entry(&self, index: usize) -> Result<(String, ResourceValue)> {
        let Some(&position) = self.name_positions.get(index) else {
            malformed!("resource index {index} out of range");
        };
        let mut reader = Cursor::new(self.data);
        reader.seek(SeekFrom::Start(self.name_section + position as u32 as u64))?;
        let key = read_prefixed_utf16(&mut reader)?;
        let value_offset = reader.read_i32::<LittleEndian>()?;
        let Ok(value_offset) = u64::try_from(value_offset) else {
            malformed!("negative value offset for {key}");
        };
        reader.seek(SeekFrom::Start(self.data_section + value_offset))?;
        let value = self.read_value(&mut reader)?;
        Ok((key, value))
    }

    /// Every entry in table order. Entries that fail to decode are reported individually.
    pub fn entries(&self) -> impl Iterator<Item = Result<(String, ResourceValue)>> + '_ {
        (0..self.len()).map(|index| self.entry(index))
    }

    fn read_value(&self, reader: &mut Cursor<&[u8]>) -> Result<ResourceValue> {
        let code = read_7bit_int(reader)?;
        if self.version == 1 {
            if code == -1 {
                return Ok(ResourceValue::Null);
            }
            let type_name = self.type_name(code)?;
            return self.read_object(reader, type_name);
        }
        match code {
            0 => Ok(ResourceValue::Null),
            TYPE_CODE_STRING => Ok(ResourceValue::String(read_prefixed_string(reader)?)),
            TYPE_CODE_BYTE_ARRAY | TYPE_CODE_STREAM => {
                let len = reader.read_i32::<LittleEndian>()?;
                let Ok(len) = usize::try_from(len) else {
                    malformed!("negative byte array length");
                };
                Ok(ResourceValue::Bytes(read_bytes(reader, len)?))
            }
            c if c <= TYPE_CODE_LAST_PRIMITIVE && c > 0 => Ok(ResourceValue::Primitive(c)),
            c if c >= TYPE_CODE_USER_TYPES => {
                let type_name = self.type_name(c - TYPE_CODE_USER_TYPES)?;
                self.read_object(reader, type_name)
            }
            c => malformed!("unknown resource type code {c:#x}"),
        }
    }

    fn type_name(&self, index: i32) -> Result<String> {
        match usize::try_from(index).ok().and_then(|i| self.type_names.get(i)) {
            Some(name) => Ok(name.clone()),
            None => malformed!("type index {index} out of range"),
        }
    }

    fn read_object(&self, reader: &mut Cursor<&[u8]>, type_name: String) -> Result<ResourceValue> {
        let start = reader.position() as usize;
        let document = Document::parse(&self.data[start..])?;
        Ok(ResourceValue::Object {
            type_name,
            document,
        })
    }
}
