#![allow(dead_code)]

//! Builders for the binary fixtures the integration tests feed the extractor.

use std::io::Cursor;

use ico::{IconDir, IconDirEntry, IconImage, ResourceType};
use image::{
    DynamicImage, Frame, GrayImage, ImageFormat, Luma, Rgba, RgbaImage, codecs::gif::GifEncoder,
};

pub const BITMAP_TYPE: &str =
    "System.Drawing.Bitmap, System.Drawing, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b03f5f7f11d50a3a";
pub const ICON_TYPE: &str =
    "System.Drawing.Icon, System.Drawing, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b03f5f7f11d50a3a";
pub const IMAGE_LIST_TYPE: &str = "System.Windows.Forms.ImageListStreamer, System.Windows.Forms, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089";

fn write_7bit(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// A length-prefixed UTF-8 string as written by `BinaryWriter.Write(string)`.
pub fn prefixed(out: &mut Vec<u8>, s: &str) {
    write_7bit(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn i32_le(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn u16_le(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

// ---------------------------------------------------------------------------
// Encoded images

pub fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color))
}

pub fn encode(image: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    let image = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).to_rgb8())
    } else {
        DynamicImage::ImageRgba8(image.clone())
    };
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&solid(width, height, [10, 120, 200, 255]), ImageFormat::Png)
}

pub fn gif_bytes(frames: usize) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        let frames = (0..frames).map(|i| Frame::new(solid(8, 8, [(i * 60) as u8, 0, 0, 255])));
        encoder.encode_frames(frames).unwrap();
    }
    out
}

fn icon_directory(kind: ResourceType, sizes: &[u32], hotspot: Option<(u16, u16)>) -> Vec<u8> {
    let mut dir = IconDir::new(kind);
    for &size in sizes {
        let mut image = IconImage::from_rgba_data(size, size, solid(size, size, [0, 200, 0, 255]).into_raw());
        if kind == ResourceType::Cursor {
            image.set_cursor_hotspot(hotspot);
        }
        dir.add_entry(IconDirEntry::encode(&image).unwrap());
    }
    let mut out = Vec::new();
    dir.write(&mut out).unwrap();
    out
}

pub fn icon_bytes(sizes: &[u32]) -> Vec<u8> {
    icon_directory(ResourceType::Icon, sizes, None)
}

pub fn cursor_bytes(size: u32, hotspot: (u16, u16)) -> Vec<u8> {
    icon_directory(ResourceType::Cursor, &[size], Some(hotspot))
}

pub fn wav_bytes() -> Vec<u8> {
    let mut out = b"RIFF".to_vec();
    u32_le(&mut out, 36);
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&[0; 28]);
    out
}

// ---------------------------------------------------------------------------
// Image lists

const ILC_MASK: u16 = 0x0001;
const ILC_COLOR24: u16 = 0x0018;
const ILC_COLOR32: u16 = 0x0020;
const COLUMNS: u32 = 4;

fn rle(data: &[u8]) -> Vec<u8> {
    let mut out = b"MSFt".to_vec();
    let mut index = 0;
    while index < data.len() {
        let value = data[index];
        let mut run = 1;
        while run < 255 && index + run < data.len() && data[index + run] == value {
            run += 1;
        }
        out.push(run as u8);
        out.push(value);
        index += run;
    }
    out
}

fn grid_of(images: &[RgbaImage]) -> (u32, u32, RgbaImage, GrayImage) {
    let (cx, cy) = images.first().map_or((16, 16), |i| i.dimensions());
    let rows = (images.len() as u32).div_ceil(COLUMNS).max(1);
    let mut grid = RgbaImage::new(cx * COLUMNS, cy * rows);
    let mut mask = GrayImage::new(cx * COLUMNS, cy * rows);
    for (index, image) in images.iter().enumerate() {
        let x = (index as u32 % COLUMNS) * cx;
        let y = (index as u32 / COLUMNS) * cy;
        image::imageops::replace(&mut grid, image, i64::from(x), i64::from(y));
        mask.put_pixel(x, y, Luma([255]));
    }
    (cx, cy, grid, mask)
}

fn list_header(count: usize, cx: u32, cy: u32, flags: u16) -> Vec<u8> {
    let mut out = Vec::new();
    u16_le(&mut out, 0x4C49);
    u16_le(&mut out, 0x0101);
    u16_le(&mut out, count as u16);
    u16_le(&mut out, count as u16 + 4);
    u16_le(&mut out, 4);
    u16_le(&mut out, cx as u16);
    u16_le(&mut out, cy as u16);
    u32_le(&mut out, 0xFFFF_FFFF);
    u16_le(&mut out, flags);
    out.extend_from_slice(&[0xFF; 8]);
    out
}

fn mask_bytes(mask: &GrayImage) -> Vec<u8> {
    let mut bmp = Cursor::new(Vec::new());
    mask.write_to(&mut bmp, ImageFormat::Bmp).unwrap();
    bmp.into_inner()
}

/// Serializes `images` the way an `ImageListStreamer` stores them.
///
/// A masked list is written with a 24-bit color bitmap plus a mask that hides
/// the top-left pixel of every image.
pub fn image_list_bytes(images: &[RgbaImage], masked: bool, compressed: bool) -> Vec<u8> {
    let (cx, cy, grid, mask) = grid_of(images);
    let flags = if masked { ILC_COLOR24 | ILC_MASK } else { ILC_COLOR32 };
    let mut out = list_header(images.len(), cx, cy, flags);
    if masked {
        let rgb = DynamicImage::ImageRgba8(grid).to_rgb8();
        let mut bmp = Cursor::new(Vec::new());
        rgb.write_to(&mut bmp, ImageFormat::Bmp).unwrap();
        out.extend_from_slice(&bmp.into_inner());
        out.extend_from_slice(&mask_bytes(&mask));
    } else {
        out.extend_from_slice(&encode(&grid, ImageFormat::Bmp));
    }

    if compressed { rle(&out) } else { out }
}

/// A 32-bit `BI_RGB` bitmap behind a 40-byte info header, bottom row first,
/// with alpha in the fourth byte of every pixel.
pub fn bgra_bitmap_bytes(image: &RgbaImage) -> Vec<u8> {
    let pixels = image.width() * image.height() * 4;
    let mut out = b"BM".to_vec();
    u32_le(&mut out, 54 + pixels);
    u32_le(&mut out, 0);
    u32_le(&mut out, 54);
    u32_le(&mut out, 40);
    i32_le(&mut out, image.width() as i32);
    i32_le(&mut out, image.height() as i32);
    u16_le(&mut out, 1);
    u16_le(&mut out, 32);
    u32_le(&mut out, 0);
    out.extend_from_slice(&[0; 20]);
    for row in image.rows().rev() {
        for pixel in row {
            let [r, g, b, a] = pixel.0;
            out.extend_from_slice(&[b, g, r, a]);
        }
    }
    out
}

/// Serializes `images` as a 32-bit list the way the common controls write it:
/// the color grid is a `BI_RGB` bitmap whose fourth byte is alpha.
pub fn image_list_bgra_bytes(images: &[RgbaImage], masked: bool) -> Vec<u8> {
    let (cx, cy, grid, mask) = grid_of(images);
    let flags = if masked { ILC_COLOR32 | ILC_MASK } else { ILC_COLOR32 };
    let mut out = list_header(images.len(), cx, cy, flags);
    out.extend_from_slice(&bgra_bitmap_bytes(&grid));
    if masked {
        out.extend_from_slice(&mask_bytes(&mask));
    }
    out
}

// ---------------------------------------------------------------------------
// Binary serialization (MS-NRBF)

/// A serialized object of `class` whose single member holds `bytes`.
///
/// The byte array follows the class record and is linked by reference, the
/// layout `BinaryFormatter` produces for bitmaps, icons and image lists.
pub fn serialized_object(class: &str, library: &str, member: &str, bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![0];
    for value in [1, -1, 1, 0] {
        i32_le(&mut out, value);
    }
    out.push(12);
    i32_le(&mut out, 2);
    prefixed(&mut out, library);
    out.push(5);
    i32_le(&mut out, 1);
    prefixed(&mut out, class);
    i32_le(&mut out, 1);
    prefixed(&mut out, member);
    out.push(7);
    out.push(2);
    i32_le(&mut out, 2);
    out.push(9);
    i32_le(&mut out, 3);
    out.push(15);
    i32_le(&mut out, 3);
    i32_le(&mut out, bytes.len() as i32);
    out.push(2);
    out.extend_from_slice(bytes);
    out.push(11);
    out
}

pub fn serialized_bitmap(encoded: &[u8]) -> Vec<u8> {
    serialized_object("System.Drawing.Bitmap", "System.Drawing", "Data", encoded)
}

pub fn serialized_icon(icon: &[u8]) -> Vec<u8> {
    serialized_object("System.Drawing.Icon", "System.Drawing", "IconData", icon)
}

pub fn serialized_image_list(list: &[u8]) -> Vec<u8> {
    serialized_object(
        "System.Windows.Forms.ImageListStreamer",
        "System.Windows.Forms",
        "Data",
        list,
    )
}

// ---------------------------------------------------------------------------
// Resource tables

enum Entry {
    String(String),
    Bytes(Vec<u8>),
    Object(usize, Vec<u8>),
}

/// Writes version 2 `.resources` tables.
#[derive(Default)]
pub struct ResourcesBuilder {
    types: Vec<String>,
    entries: Vec<(String, Entry)>,
}

impl ResourcesBuilder {
    pub fn new() -> Self {
        ResourcesBuilder::default()
    }

    pub fn with_string(mut self, key: &str, value: &str) -> Self {
        self.entries.push((key.to_owned(), Entry::String(value.to_owned())));
        self
    }

    pub fn with_bytes(mut self, key: &str, value: &[u8]) -> Self {
        self.entries.push((key.to_owned(), Entry::Bytes(value.to_vec())));
        self
    }

    pub fn with_object(mut self, key: &str, type_name: &str, serialized: Vec<u8>) -> Self {
        let index = match self.types.iter().position(|t| t == type_name) {
            Some(index) => index,
            None => {
                self.types.push(type_name.to_owned());
                self.types.len() - 1
            }
        };
        self.entries.push((key.to_owned(), Entry::Object(index, serialized)));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut data = Vec::new();
        let mut data_offsets = Vec::new();
        for (_, entry) in &self.entries {
            data_offsets.push(data.len() as i32);
            match entry {
                Entry::String(s) => {
                    write_7bit(&mut data, 1);
                    prefixed(&mut data, s);
                }
                Entry::Bytes(b) => {
                    write_7bit(&mut data, 0x20);
                    i32_le(&mut data, b.len() as i32);
                    data.extend_from_slice(b);
                }
                Entry::Object(index, serialized) => {
                    write_7bit(&mut data, 0x40 + *index as u32);
                    data.extend_from_slice(serialized);
                }
            }
        }

        let mut names = Vec::new();
        let mut name_positions = Vec::new();
        for ((key, _), offset) in self.entries.iter().zip(&data_offsets) {
            name_positions.push(names.len() as i32);
            let utf16: Vec<u8> = key.encode_utf16().flat_map(u16::to_le_bytes).collect();
            write_7bit(&mut names, utf16.len() as u32);
            names.extend_from_slice(&utf16);
            i32_le(&mut names, *offset);
        }

        let mut reader_header = Vec::new();
        prefixed(
            &mut reader_header,
            "System.Resources.ResourceReader, mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
        );
        prefixed(&mut reader_header, "System.Resources.RuntimeResourceSet");

        let mut out = Vec::new();
        u32_le(&mut out, 0xBEEF_CACE);
        i32_le(&mut out, 1);
        i32_le(&mut out, reader_header.len() as i32);
        out.extend_from_slice(&reader_header);
        i32_le(&mut out, 2);
        i32_le(&mut out, self.entries.len() as i32);
        i32_le(&mut out, self.types.len() as i32);
        for type_name in &self.types {
            prefixed(&mut out, type_name);
        }
        let pad = b"PAD";
        let mut i = 0;
        while out.len() % 8 != 0 {
            out.push(pad[i % 3]);
            i += 1;
        }
        for (index, _) in self.entries.iter().enumerate() {
            i32_le(&mut out, index as i32);
        }
        for position in &name_positions {
            i32_le(&mut out, *position);
        }
        let data_section = out.len() + 4 + names.len();
        i32_le(&mut out, data_section as i32);
        out.extend_from_slice(&names);
        out.extend_from_slice(&data);
        out
    }
}

// ---------------------------------------------------------------------------
// Assemblies

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: u32 = 0x2000;
const SECTION_RVA: u32 = 0x2000;
const PE_OFFSET: usize = 0x80;
const OPTIONAL_HEADER_SIZE: usize = 224;
const CLI_HEADER_SIZE: usize = 72;

const MODULE: u32 = 0x00;
const TYPE_REF: u32 = 0x01;
const TYPE_DEF: u32 = 0x02;
const MEMBER_REF: u32 = 0x0A;
const CUSTOM_ATTRIBUTE: u32 = 0x0C;
const ASSEMBLY: u32 = 0x20;
const ASSEMBLY_REF: u32 = 0x23;
const FILE: u32 = 0x26;
const MANIFEST_RESOURCE: u32 = 0x28;

/// `HASTHIS`, one parameter, returns void, takes a string.
const STRING_CTOR_SIGNATURE: [u8; 4] = [0x20, 0x01, 0x01, 0x0E];
const MSCORLIB_TOKEN: [u8; 8] = [0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89];

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

struct Heaps {
    strings: Vec<u8>,
    blobs: Vec<u8>,
}

impl Heaps {
    fn new() -> Self {
        Heaps {
            strings: vec![0],
            blobs: vec![0],
        }
    }

    fn string(&mut self, s: &str) -> u16 {
        let index = self.strings.len() as u16;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        index
    }

    fn blob(&mut self, bytes: &[u8]) -> u16 {
        let index = self.blobs.len() as u16;
        compressed(&mut self.blobs, bytes.len());
        self.blobs.extend_from_slice(bytes);
        index
    }
}

/// ECMA-335 compressed unsigned integer, up to 14 bits.
fn compressed(out: &mut Vec<u8>, value: usize) {
    if value < 0x80 {
        out.push(value as u8);
    } else {
        out.extend_from_slice(&(0x8000 | value as u16).to_be_bytes());
    }
}

/// Custom attribute value blob holding one string argument and no named ones.
fn string_attribute_value(value: &str) -> Vec<u8> {
    let mut out = vec![0x01, 0x00];
    compressed(&mut out, value.len());
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(&[0, 0]);
    out
}

/// One metadata table: its number, row count and packed rows.
struct Table {
    id: u32,
    rows: u32,
    data: Vec<u8>,
}

impl Table {
    fn new(id: u32) -> Self {
        Table {
            id,
            rows: 0,
            data: Vec::new(),
        }
    }

    fn row(&mut self, columns: &[Column]) {
        self.rows += 1;
        for column in columns {
            match *column {
                Column::U16(value) => u16_le(&mut self.data, value),
                Column::U32(value) => u32_le(&mut self.data, value),
            }
        }
    }
}

enum Column {
    U16(u16),
    U32(u32),
}

use Column::{U16, U32};

/// Writes a small PE32 .NET assembly holding embedded manifest resources.
pub struct AssemblyBuilder {
    name: Option<String>,
    version: [u16; 4],
    attributes: Vec<(String, String)>,
    resources: Vec<(String, Option<Vec<u8>>)>,
}

impl AssemblyBuilder {
    pub fn new(name: &str) -> Self {
        AssemblyBuilder {
            name: Some(name.to_owned()),
            version: [1, 0, 0, 0],
            attributes: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// A module without an `Assembly` row, such as a netmodule.
    pub fn nameless() -> Self {
        AssemblyBuilder {
            name: None,
            version: [0; 4],
            attributes: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: [u16; 4]) -> Self {
        self.version = version;
        self
    }

    /// Applies a `System.Reflection` attribute such as `AssemblyTitleAttribute`.
    pub fn with_attribute(mut self, type_name: &str, value: &str) -> Self {
        self.attributes.push((type_name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_resource(mut self, name: &str, data: &[u8]) -> Self {
        self.resources.push((name.to_owned(), Some(data.to_vec())));
        self
    }

    /// A resource that lives in another file of the assembly.
    pub fn with_linked_resource(mut self, name: &str) -> Self {
        self.resources.push((name.to_owned(), None));
        self
    }

    fn module_name(&self) -> String {
        match &self.name {
            Some(name) => format!("{name}.dll"),
            None => "Parts.netmodule".to_owned(),
        }
    }

    fn resource_section(&self) -> (Vec<u8>, Vec<u32>) {
        let mut section = Vec::new();
        let mut offsets = Vec::new();
        for (_, data) in &self.resources {
            match data {
                Some(data) => {
                    offsets.push(section.len() as u32);
                    u32_le(&mut section, data.len() as u32);
                    section.extend_from_slice(data);
                    while section.len() % 8 != 0 {
                        section.push(0);
                    }
                }
                None => offsets.push(0),
            }
        }
        (section, offsets)
    }

    fn tables(&self, heaps: &mut Heaps, offsets: &[u32]) -> Vec<Table> {
        let mut module = Table::new(MODULE);
        let module_name = heaps.string(&self.module_name());
        module.row(&[U16(0), U16(module_name), U16(1), U16(0), U16(0)]);

        let mut type_def = Table::new(TYPE_DEF);
        let module_type = heaps.string("<Module>");
        type_def.row(&[U32(0), U16(module_type), U16(0), U16(0), U16(1), U16(1)]);

        // Attributes hang off the `Assembly` row, so a nameless module carries none.
        let attributes = if self.name.is_some() {
            self.attributes.as_slice()
        } else {
            &[]
        };
        let mut type_ref = Table::new(TYPE_REF);
        let mut member_ref = Table::new(MEMBER_REF);
        let mut custom_attribute = Table::new(CUSTOM_ATTRIBUTE);
        let mut assembly_ref = Table::new(ASSEMBLY_REF);
        if !attributes.is_empty() {
            let mscorlib = heaps.string("mscorlib");
            let token = heaps.blob(&MSCORLIB_TOKEN);
            assembly_ref.row(&[
                U16(4),
                U16(0),
                U16(0),
                U16(0),
                U32(0),
                U16(token),
                U16(mscorlib),
                U16(0),
                U16(0),
            ]);
            let namespace = heaps.string("System.Reflection");
            let constructor = heaps.string(".ctor");
            let signature = heaps.blob(&STRING_CTOR_SIGNATURE);
            for (index, (type_name, value)) in attributes.iter().enumerate() {
                let row = index as u16 + 1;
                let name = heaps.string(type_name);
                // ResolutionScope: AssemblyRef row 1.
                type_ref.row(&[U16((1 << 2) | 2), U16(name), U16(namespace)]);
                // MemberRefParent: TypeRef.
                member_ref.row(&[U16((row << 3) | 1), U16(constructor), U16(signature)]);
                let value = heaps.blob(&string_attribute_value(value));
                // HasCustomAttribute: Assembly row 1; CustomAttributeType: MemberRef.
                custom_attribute.row(&[U16((1 << 5) | 14), U16((row << 3) | 3), U16(value)]);
            }
        }

        let mut assembly = Table::new(ASSEMBLY);
        if let Some(name) = &self.name {
            let name = heaps.string(name);
            let [major, minor, build, revision] = self.version;
            assembly.row(&[
                U32(0x8004),
                U16(major),
                U16(minor),
                U16(build),
                U16(revision),
                U32(0),
                U16(0),
                U16(name),
                U16(0),
            ]);
        }

        let mut file = Table::new(FILE);
        let mut manifest = Table::new(MANIFEST_RESOURCE);
        for ((name, data), offset) in self.resources.iter().zip(offsets) {
            let name = heaps.string(name);
            // Implementation: 0 for embedded data, else a File row.
            let implementation = match data {
                Some(_) => 0,
                None => {
                    let file_name = heaps.string(&format!("linked{}.bin", file.rows + 1));
                    let hash = heaps.blob(&[0; 20]);
                    file.row(&[U32(1), U16(file_name), U16(hash)]);
                    (file.rows as u16) << 2
                }
            };
            manifest.row(&[U32(*offset), U32(1), U16(name), U16(implementation)]);
        }

        vec![
            module,
            type_ref,
            type_def,
            member_ref,
            custom_attribute,
            assembly,
            assembly_ref,
            file,
            manifest,
        ]
    }

    fn table_stream(tables: &[Table]) -> Vec<u8> {
        let present: Vec<&Table> = tables.iter().filter(|t| t.rows > 0).collect();
        let valid = present.iter().fold(0u64, |mask, t| mask | 1 << t.id);
        let mut out = Vec::new();
        u32_le(&mut out, 0);
        out.push(2);
        out.push(0);
        out.push(0);
        out.push(1);
        out.extend_from_slice(&valid.to_le_bytes());
        out.extend_from_slice(&(1u64 << CUSTOM_ATTRIBUTE).to_le_bytes());
        for table in &present {
            u32_le(&mut out, table.rows);
        }
        for table in &present {
            out.extend_from_slice(&table.data);
        }
        pad4(&mut out);
        out
    }

    fn metadata(&self, offsets: &[u32]) -> Vec<u8> {
        let mut heaps = Heaps::new();
        let tables = Self::table_stream(&self.tables(&mut heaps, offsets));
        let Heaps {
            mut strings,
            mut blobs,
        } = heaps;
        pad4(&mut strings);
        pad4(&mut blobs);
        let user_strings = vec![0; 4];
        let guids = (1..=16).collect::<Vec<u8>>();

        let streams: [(&[u8], &[u8]); 5] = [
            (b"#~\0\0", &tables),
            (b"#Strings\0\0\0\0", &strings),
            (b"#US\0", &user_strings),
            (b"#GUID\0\0\0", &guids),
            (b"#Blob\0\0\0", &blobs),
        ];

        let version = b"v4.0.30319\0\0";
        let mut root = Vec::new();
        u32_le(&mut root, 0x424A_5342);
        u16_le(&mut root, 1);
        u16_le(&mut root, 1);
        u32_le(&mut root, 0);
        u32_le(&mut root, version.len() as u32);
        root.extend_from_slice(version);
        u16_le(&mut root, 0);
        u16_le(&mut root, streams.len() as u16);
        let headers_len: usize = streams.iter().map(|(name, _)| 8 + name.len()).sum();
        let mut offset = root.len() + headers_len;
        for (name, data) in &streams {
            u32_le(&mut root, offset as u32);
            u32_le(&mut root, data.len() as u32);
            root.extend_from_slice(name);
            offset += data.len();
        }
        for (_, data) in &streams {
            root.extend_from_slice(data);
        }
        root
    }

    pub fn build(&self) -> Vec<u8> {
        let (resources, offsets) = self.resource_section();
        let metadata = self.metadata(&offsets);
        let metadata_rva = SECTION_RVA + CLI_HEADER_SIZE as u32;
        let resources_rva = metadata_rva + metadata.len() as u32;

        let mut section = Vec::new();
        u32_le(&mut section, CLI_HEADER_SIZE as u32);
        u16_le(&mut section, 2);
        u16_le(&mut section, 5);
        u32_le(&mut section, metadata_rva);
        u32_le(&mut section, metadata.len() as u32);
        u32_le(&mut section, 1);
        u32_le(&mut section, 0);
        if resources.is_empty() {
            u32_le(&mut section, 0);
            u32_le(&mut section, 0);
        } else {
            u32_le(&mut section, resources_rva);
            u32_le(&mut section, resources.len() as u32);
        }
        section.resize(CLI_HEADER_SIZE, 0);
        section.extend_from_slice(&metadata);
        section.extend_from_slice(&resources);
        let virtual_size = section.len() as u32;
        while section.len() % FILE_ALIGNMENT != 0 {
            section.push(0);
        }

        let mut out = vec![0u8; PE_OFFSET];
        out[..2].copy_from_slice(b"MZ");
        out[0x3C..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());
        out.extend_from_slice(b"PE\0\0");
        u16_le(&mut out, 0x14C);
        u16_le(&mut out, 1);
        out.extend_from_slice(&[0; 12]);
        u16_le(&mut out, OPTIONAL_HEADER_SIZE as u16);
        u16_le(&mut out, 0x2102);

        let mut optional = vec![0u8; OPTIONAL_HEADER_SIZE];
        let mut put = |at: usize, bytes: &[u8]| optional[at..at + bytes.len()].copy_from_slice(bytes);
        put(0, &0x10Bu16.to_le_bytes());
        put(2, &[8, 0]);
        put(4, &(section.len() as u32).to_le_bytes());
        put(20, &SECTION_RVA.to_le_bytes());
        put(28, &0x0040_0000u32.to_le_bytes());
        put(32, &SECTION_ALIGNMENT.to_le_bytes());
        put(36, &(FILE_ALIGNMENT as u32).to_le_bytes());
        put(40, &4u16.to_le_bytes());
        put(48, &4u16.to_le_bytes());
        let image_size = SECTION_RVA + virtual_size.div_ceil(SECTION_ALIGNMENT) * SECTION_ALIGNMENT;
        put(56, &image_size.to_le_bytes());
        put(60, &(FILE_ALIGNMENT as u32).to_le_bytes());
        put(68, &3u16.to_le_bytes());
        put(70, &0x8540u16.to_le_bytes());
        put(72, &0x0010_0000u32.to_le_bytes());
        put(76, &0x1000u32.to_le_bytes());
        put(80, &0x0010_0000u32.to_le_bytes());
        put(84, &0x1000u32.to_le_bytes());
        put(92, &16u32.to_le_bytes());
        let cli_directory = 96 + 14 * 8;
        put(cli_directory, &SECTION_RVA.to_le_bytes());
        put(cli_directory + 4, &(CLI_HEADER_SIZE as u32).to_le_bytes());
        out.extend_from_slice(&optional);

        out.extend_from_slice(b".text\0\0\0");
        u32_le(&mut out, virtual_size);
        u32_le(&mut out, SECTION_RVA);
        u32_le(&mut out, section.len() as u32);
        u32_le(&mut out, FILE_ALIGNMENT as u32);
        out.extend_from_slice(&[0; 12]);
        u32_le(&mut out, 0x6000_0020);
        out.resize(FILE_ALIGNMENT, 0);
        out.extend_from_slice(&section);
        out
    }
}
