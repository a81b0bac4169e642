//! Reader for the .NET binary serialization stream (MS-NRBF).
//!
//! Resource tables store non-primitive values such as `System.Drawing.Bitmap`
//! or `System.Windows.Forms.ImageListStreamer` as serialized object graphs.
//! Only the record kinds that can occur in such a graph are understood;
//! remoting method-call records are rejected.

use std::{
    collections::HashMap,
    io::{Cursor, Read},
};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
    error::{Result, malformed},
    utils::binary_utils::{read_bytes, read_prefixed_string},
};

const SERIALIZED_STREAM_HEADER: u8 = 0;
const CLASS_WITH_ID: u8 = 1;
const SYSTEM_CLASS_WITH_MEMBERS: u8 = 2;
const CLASS_WITH_MEMBERS: u8 = 3;
const SYSTEM_CLASS_WITH_MEMBERS_AND_TYPES: u8 = 4;
const CLASS_WITH_MEMBERS_AND_TYPES: u8 = 5;
const BINARY_OBJECT_STRING: u8 = 6;
const BINARY_ARRAY: u8 = 7;
const MEMBER_PRIMITIVE_TYPED: u8 = 8;
const MEMBER_REFERENCE: u8 = 9;
const OBJECT_NULL: u8 = 10;
const MESSAGE_END: u8 = 11;
const BINARY_LIBRARY: u8 = 12;
const OBJECT_NULL_MULTIPLE_256: u8 = 13;
const OBJECT_NULL_MULTIPLE: u8 = 14;
const ARRAY_SINGLE_PRIMITIVE: u8 = 15;
const ARRAY_SINGLE_OBJECT: u8 = 16;
const ARRAY_SINGLE_STRING: u8 = 17;

const PRIMITIVE_BYTE: u8 = 2;
const PRIMITIVE_NULL: u8 = 17;
const MAX_DEPTH: usize = 64;
const MAX_PREALLOCATION: usize = 1 << 16;
/// Upper bound on the array elements one graph may hold, null runs included.
const MAX_ELEMENTS: usize = 1 << 20;

/// A primitive member or array element.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Boolean(bool),
    Byte(u8),
    Char(char),
    Decimal(String),
    Double(f64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    SByte(i8),
    Single(f32),
    TimeSpan(i64),
    DateTime(u64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    String(String),
}

/// A member value. Non-primitive values point into the object table.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Primitive(Primitive),
    Reference(i32),
}

/// An object stored in the graph's object table.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Class(ClassObject),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassObject {
    name: String,
    members: Vec<(String, Value)>,
}

impl ClassObject {
    /// Fully qualified type name, e.g. `System.Drawing.Bitmap`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self, member: &str) -> Option<&Value> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| value)
    }
}

/// A fully read object graph.
#[derive(Clone, Debug)]
pub struct Document {
    root_id: i32,
    objects: HashMap<i32, Object>,
}

impl Document {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Reader::new(data).read_document()
    }

    /// The root object, if it is a class instance.
    pub fn root(&self) -> Option<&ClassObject> {
        match self.objects.get(&self.root_id) {
            Some(Object::Class(class)) => Some(class),
            _ => None,
        }
    }

    pub fn resolve(&self, value: &Value) -> Option<&Object> {
        match value {
            Value::Reference(id) => self.objects.get(id),
            _ => None,
        }
    }

    /// Returns the `byte[]` stored in `member` of `class`.
    pub fn bytes(&self, class: &ClassObject, member: &str) -> Option<&[u8]> {
        match self.resolve(class.value(member)?)? {
            Object::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the class instance stored in `member` of `class`.
    pub fn class(&self, class: &ClassObject, member: &str) -> Option<&ClassObject> {
        match self.resolve(class.value(member)?)? {
            Object::Class(inner) => Some(inner),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
enum MemberType {
    Primitive(u8),
    String,
    Object,
    SystemClass,
    Class,
    ObjectArray,
    StringArray,
    PrimitiveArray,
}

#[derive(Clone, Debug)]
struct ClassInfo {
    name: String,
    member_names: Vec<String>,
    member_types: Option<Vec<MemberType>>,
}

enum Element {
    Value(Value),
    Nulls(usize),
}

struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
    classes: HashMap<i32, ClassInfo>,
    objects: HashMap<i32, Object>,
    depth: usize,
    elements: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader {
            cursor: Cursor::new(data),
            classes: HashMap::new(),
            objects: HashMap::new(),
            depth: 0,
            elements: 0,
        }
    }

    fn read_document(mut self) -> Result<Document> {
        if self.cursor.read_u8()? != SERIALIZED_STREAM_HEADER {
            malformed!("serialization stream does not start with a header record");
        }
        let root_id = self.cursor.read_i32::<LittleEndian>()?;
        let _header_id = self.cursor.read_i32::<LittleEndian>()?;
        let major = self.cursor.read_i32::<LittleEndian>()?;
        let minor = self.cursor.read_i32::<LittleEndian>()?;
        if (major, minor) != (1, 0) {
            malformed!("unsupported serialization stream version {major}.{minor}");
        }

        loop {
            let tag = self.cursor.read_u8()?;
            if tag == MESSAGE_END {
                break;
            }
            self.read_element(tag)?;
        }

        Ok(Document {
            root_id,
            objects: self.objects,
        })
    }

    fn read_value(&mut self) -> Result<Value> {
        let tag = self.cursor.read_u8()?;
        match self.read_element(tag)? {
            Element::Value(value) => Ok(value),
            Element::Nulls(_) => malformed!("null run outside of an array"),
        }
    }

    fn read_element(&mut self, tag: u8) -> Result<Element> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            malformed!("object graph nested deeper than {MAX_DEPTH}");
        }
        let element = self.read_record(tag);
        self.depth -= 1;
        element
    }

    fn read_record(&mut self, tag: u8) -> Result<Element> {
        let value = match tag {
            CLASS_WITH_ID => {
                let object_id = self.cursor.read_i32::<LittleEndian>()?;
                let metadata_id = self.cursor.read_i32::<LittleEndian>()?;
                let Some(info) = self.classes.get(&metadata_id).cloned() else {
                    malformed!("class record refers to unknown metadata {metadata_id}");
                };
                self.read_class(object_id, info)?
            }
            SYSTEM_CLASS_WITH_MEMBERS | CLASS_WITH_MEMBERS => {
                let (object_id, name, member_names) = self.read_class_info()?;
                if tag == CLASS_WITH_MEMBERS {
                    let _library_id = self.cursor.read_i32::<LittleEndian>()?;
                }
                let info = ClassInfo {
                    name,
                    member_names,
                    member_types: None,
                };
                self.classes.insert(object_id, info.clone());
                self.read_class(object_id, info)?
            }
            SYSTEM_CLASS_WITH_MEMBERS_AND_TYPES | CLASS_WITH_MEMBERS_AND_TYPES => {
                let (object_id, name, member_names) = self.read_class_info()?;
                let member_types = self.read_member_types(member_names.len())?;
                if tag == CLASS_WITH_MEMBERS_AND_TYPES {
                    let _library_id = self.cursor.read_i32::<LittleEndian>()?;
                }
                let info = ClassInfo {
                    name,
                    member_names,
                    member_types: Some(member_types),
                };
                self.classes.insert(object_id, info.clone());
                self.read_class(object_id, info)?
            }
            BINARY_OBJECT_STRING => {
                let object_id = self.cursor.read_i32::<LittleEndian>()?;
                let value = read_prefixed_string(&mut self.cursor)?;
                self.store(object_id, Object::String(value))
            }
            BINARY_ARRAY => self.read_binary_array()?,
            MEMBER_PRIMITIVE_TYPED => {
                let primitive_type = self.cursor.read_u8()?;
                self.read_primitive(primitive_type)?
            }
            MEMBER_REFERENCE => Value::Reference(self.cursor.read_i32::<LittleEndian>()?),
            OBJECT_NULL => Value::Null,
            BINARY_LIBRARY => {
                let _library_id = self.cursor.read_i32::<LittleEndian>()?;
                let _library_name = read_prefixed_string(&mut self.cursor)?;
                // A library record always precedes the record that uses it.
                let next = self.cursor.read_u8()?;
                return self.read_element(next);
            }
            OBJECT_NULL_MULTIPLE_256 => return Ok(Element::Nulls(usize::from(self.cursor.read_u8()?))),
            OBJECT_NULL_MULTIPLE => {
                let count = self.cursor.read_i32::<LittleEndian>()?;
                let Ok(count) = usize::try_from(count) else {
                    malformed!("negative null run {count}");
                };
                return Ok(Element::Nulls(count));
            }
            ARRAY_SINGLE_PRIMITIVE => {
                let object_id = self.cursor.read_i32::<LittleEndian>()?;
                let length = self.read_length()?;
                let primitive_type = self.cursor.read_u8()?;
                let object = if primitive_type == PRIMITIVE_BYTE {
                    Object::Bytes(read_bytes(&mut self.cursor, length)?)
                } else {
                    Object::Array(self.read_primitive_items(primitive_type, length)?)
                };
                self.store(object_id, object)
            }
            ARRAY_SINGLE_OBJECT | ARRAY_SINGLE_STRING => {
                let object_id = self.cursor.read_i32::<LittleEndian>()?;
                let length = self.read_length()?;
                let items = self.read_record_items(length)?;
                self.store(object_id, Object::Array(items))
            }
            SERIALIZED_STREAM_HEADER | MESSAGE_END => malformed!("unexpected record {tag}"),
            other => malformed!("unsupported record type {other}"),
        };
        Ok(Element::Value(value))
    }

    fn store(&mut self, object_id: i32, object: Object) -> Value {
        self.objects.insert(object_id, object);
        Value::Reference(object_id)
    }

    fn read_length(&mut self) -> Result<usize> {
        let length = self.cursor.read_i32::<LittleEndian>()?;
        match usize::try_from(length) {
            Ok(length) => Ok(length),
            Err(_) => malformed!("negative array length {length}"),
        }
    }

    fn read_class_info(&mut self) -> Result<(i32, String, Vec<String>)> {
        let object_id = self.cursor.read_i32::<LittleEndian>()?;
        let name = read_prefixed_string(&mut self.cursor)?;
        let count = self.read_length()?;
        let mut member_names = Vec::with_capacity(count.min(MAX_PREALLOCATION));
        for _ in 0..count {
            member_names.push(read_prefixed_string(&mut self.cursor)?);
        }
        Ok((object_id, name, member_names))
    }

    fn read_member_types(&mut self, count: usize) -> Result<Vec<MemberType>> {
        let mut kinds = Vec::with_capacity(count.min(MAX_PREALLOCATION));
        for _ in 0..count {
            kinds.push(self.cursor.read_u8()?);
        }
        kinds
            .into_iter()
            .map(|kind| -> Result<MemberType> {
                Ok(match kind {
                    0 => MemberType::Primitive(self.cursor.read_u8()?),
                    1 => MemberType::String,
                    2 => MemberType::Object,
                    3 => {
                        let _class_name = read_prefixed_string(&mut self.cursor)?;
                        MemberType::SystemClass
                    }
                    4 => {
                        let _class_name = read_prefixed_string(&mut self.cursor)?;
                        let _library_id = self.cursor.read_i32::<LittleEndian>()?;
                        MemberType::Class
                    }
                    5 => MemberType::ObjectArray,
                    6 => MemberType::StringArray,
                    7 => {
                        let _element_type = self.cursor.read_u8()?;
                        MemberType::PrimitiveArray
                    }
                    other => malformed!("unknown binary type {other}"),
                })
            })
            .collect()
    }

    fn read_class(&mut self, object_id: i32, info: ClassInfo) -> Result<Value> {
        let mut members = Vec::with_capacity(info.member_names.len());
        for (index, name) in info.member_names.iter().enumerate() {
            let value = match info.member_types.as_ref().map(|types| &types[index]) {
                Some(MemberType::Primitive(primitive_type)) => self.read_primitive(*primitive_type)?,
                _ => self.read_value()?,
            };
            members.push((name.clone(), value));
        }
        let class = ClassObject {
            name: info.name,
            members,
        };
        Ok(self.store(object_id, Object::Class(class)))
    }

    fn read_binary_array(&mut self) -> Result<Value> {
        let object_id = self.cursor.read_i32::<LittleEndian>()?;
        let array_type = self.cursor.read_u8()?;
        let rank = self.read_length()?;
        let mut total: usize = 1;
        for _ in 0..rank {
            let length = self.read_length()?;
            total = match total.checked_mul(length) {
                Some(total) => total,
                None => malformed!("array dimensions overflow"),
            };
        }
        // Offset array kinds carry lower bounds.
        if matches!(array_type, 3..=5) {
            for _ in 0..rank {
                let _lower_bound = self.cursor.read_i32::<LittleEndian>()?;
            }
        }
        let element_type = self.read_member_types(1)?.remove(0);
        let items = match element_type {
            MemberType::Primitive(primitive_type) => self.read_primitive_items(primitive_type, total)?,
            _ => self.read_record_items(total)?,
        };
        Ok(self.store(object_id, Object::Array(items)))
    }

    /// Charges `length` elements against the graph's budget and reserves room for them.
    fn allocate(&mut self, length: usize) -> Result<Vec<Value>> {
        if length > MAX_ELEMENTS - self.elements {
            malformed!("array of {length} elements exceeds the limit of {MAX_ELEMENTS}");
        }
        self.elements += length;
        let mut items = Vec::new();
        if items.try_reserve_exact(length).is_err() {
            malformed!("cannot allocate {length} array elements");
        }
        Ok(items)
    }

    fn read_primitive_items(&mut self, primitive_type: u8, length: usize) -> Result<Vec<Value>> {
        // Null primitives occupy no bytes, so the input cannot vouch for the length.
        if primitive_type == PRIMITIVE_NULL && length > 0 {
            malformed!("array of {length} null primitives");
        }
        let mut items = self.allocate(length)?;
        for _ in 0..length {
            items.push(self.read_primitive(primitive_type)?);
        }
        Ok(items)
    }

    fn read_record_items(&mut self, length: usize) -> Result<Vec<Value>> {
        let mut items = self.allocate(length)?;
        while items.len() < length {
            let tag = self.cursor.read_u8()?;
            match self.read_element(tag)? {
                Element::Value(value) => items.push(value),
                Element::Nulls(count) => {
                    if items.len() + count > length {
                        malformed!("null run overflows array of {length}");
                    }
                    items.extend(std::iter::repeat_n(Value::Null, count));
                }
            }
        }
        Ok(items)
    }

    fn read_primitive(&mut self, primitive_type: u8) -> Result<Value> {
        let c = &mut self.cursor;
        let primitive = match primitive_type {
            1 => Primitive::Boolean(c.read_u8()? != 0),
            2 => Primitive::Byte(c.read_u8()?),
            3 => Primitive::Char(read_utf8_char(c)?),
            5 => Primitive::Decimal(read_prefixed_string(c)?),
            6 => Primitive::Double(c.read_f64::<LittleEndian>()?),
            7 => Primitive::Int16(c.read_i16::<LittleEndian>()?),
            8 => Primitive::Int32(c.read_i32::<LittleEndian>()?),
            9 => Primitive::Int64(c.read_i64::<LittleEndian>()?),
            10 => Primitive::SByte(c.read_i8()?),
            11 => Primitive::Single(c.read_f32::<LittleEndian>()?),
            12 => Primitive::TimeSpan(c.read_i64::<LittleEndian>()?),
            13 => Primitive::DateTime(c.read_u64::<LittleEndian>()?),
            14 => Primitive::UInt16(c.read_u16::<LittleEndian>()?),
            15 => Primitive::UInt32(c.read_u32::<LittleEndian>()?),
            16 => Primitive::UInt64(c.read_u64::<LittleEndian>()?),
            PRIMITIVE_NULL => return Ok(Value::Null),
            18 => Primitive::String(read_prefixed_string(c)?),
            other => malformed!("unknown primitive type {other}"),
        };
        Ok(Value::Primitive(primitive))
    }
}

fn read_utf8_char<R: Read>(reader: &mut R) -> Result<char> {
    let first = reader.read_u8()?;
    let len = match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => malformed!("invalid UTF-8 lead byte {first:#x}"),
    };
    let mut buffer = [first, 0, 0, 0];
    reader.read_exact(&mut buffer[1..len])?;
    match std::str::from_utf8(&buffer[..len]).ok().and_then(|s| s.chars().next()) {
        Some(ch) => Ok(ch),
        None => malformed!("invalid UTF-8 char"),
    }
}
