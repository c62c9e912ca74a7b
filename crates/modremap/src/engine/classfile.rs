//! Constant-pool level class file rewriting.
//!
//! Renamed symbols are never edited in place: new `Utf8` and `NameAndType`
//! entries are appended and the referencing slots repointed, so Utf8 values
//! shared with attribute payloads stay valid. `Code` and other attribute
//! bodies are carried over verbatim.
//!
//! Utf8 entries are held as raw bytes and only decoded when a name or
//! descriptor is consulted: the class file format stores Modified UTF-8, so
//! a string constant may legally contain byte sequences (an encoded NUL,
//! surrogate pairs) that are not valid standard UTF-8.

use std::collections::HashMap;
use std::ops::Range;
use thiserror::Error;

use super::TypeHierarchy;
use crate::mapping::MappingSet;

#[derive(Debug, Error)]
pub enum ClassRewriteError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header")]
    InvalidMagic,
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("invalid UTF-8 in constant pool name: {0}")]
    Utf8Decode(#[from] std::str::Utf8Error),
    #[error("constant pool overflow while renaming")]
    PoolOverflow,
}

/// Super-type references of a single class, used to build the inheritance
/// graph consulted during member resolution.
#[derive(Debug, Clone)]
pub struct ClassSupers {
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
}

pub fn parse_supers(bytes: &[u8]) -> Result<ClassSupers, ClassRewriteError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let _minor = reader.read_u2()?;
    let _major = reader.read_u2()?;
    let pool = ConstantPool::parse(&mut reader)?;

    let _access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;

    let name = pool.class_name(this_class)?;
    let superclass = if super_class == 0 {
        None
    } else {
        Some(pool.class_name(super_class)?)
    };

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        let index = reader.read_u2()?;
        interfaces.push(pool.class_name(index)?);
    }

    Ok(ClassSupers {
        name,
        superclass,
        interfaces,
    })
}

pub(crate) struct RewrittenClass {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub(crate) fn rewrite_class(
    bytes: &[u8],
    mapping: &MappingSet,
    hierarchy: &TypeHierarchy,
) -> Result<RewrittenClass, ClassRewriteError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let minor = reader.read_u2()?;
    let major = reader.read_u2()?;
    let mut pool = ConstantPool::parse(&mut reader)?;

    let access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;
    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        interfaces.push(reader.read_u2()?);
    }

    let mut fields = read_members(&mut reader)?;
    let mut methods = read_members(&mut reader)?;
    let class_attributes = &bytes[reader.offset()..];

    let this_name = pool.class_name(this_class)?;

    // Snapshot the pre-rewrite name of every Class entry; owner resolution
    // below must see source-namespace names even after entries are repointed.
    let mut class_entries: Vec<(u16, String)> = Vec::new();
    for index in 1..pool.slot_count() {
        if let PoolEntry::Class { name } = pool.entry(index)? {
            class_entries.push((index, pool.utf8(*name)?.to_string()));
        }
    }
    let owners: HashMap<u16, String> = class_entries.iter().cloned().collect();

    let slot_count = pool.slot_count();
    for index in 1..slot_count {
        let entry = pool.entry(index)?.clone();
        match &entry {
            PoolEntry::FieldRef {
                class,
                name_and_type,
            }
            | PoolEntry::MethodRef {
                class,
                name_and_type,
            }
            | PoolEntry::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                let Some(owner) = owners.get(class) else {
                    return Err(ClassRewriteError::InvalidConstantIndex { index: *class });
                };
                let (name_index, descriptor_index) = pool.name_and_type(*name_and_type)?;
                let name = pool.utf8(name_index)?.to_string();
                let descriptor = pool.utf8(descriptor_index)?.to_string();

                // Array owners only ever expose Object members; nothing to rename.
                let mapped_name = if owner.starts_with('[') {
                    None
                } else if matches!(&entry, PoolEntry::FieldRef { .. }) {
                    hierarchy.resolve_field(mapping, owner, &name, &descriptor)
                } else {
                    hierarchy.resolve_method(mapping, owner, &name, &descriptor)
                };
                let mapped_descriptor = mapping.map_descriptor(&descriptor);
                let new_name = mapped_name.unwrap_or(&name);

                if new_name != name || mapped_descriptor != descriptor {
                    let name_utf8 = pool.push_utf8(new_name)?;
                    let descriptor_utf8 = pool.push_utf8(&mapped_descriptor)?;
                    let target = pool.push_name_and_type(name_utf8, descriptor_utf8)?;
                    pool.set_ref_target(index, target)?;
                }
            }
            PoolEntry::MethodType { descriptor } => {
                let value = pool.utf8(*descriptor)?.to_string();
                let mapped = mapping.map_descriptor(&value);
                if mapped != value {
                    let utf8 = pool.push_utf8(&mapped)?;
                    pool.set_method_type(index, utf8)?;
                }
            }
            PoolEntry::Dynamic { name_and_type, .. }
            | PoolEntry::InvokeDynamic { name_and_type, .. } => {
                let (name_index, descriptor_index) = pool.name_and_type(*name_and_type)?;
                let value = pool.utf8(descriptor_index)?.to_string();
                let mapped = mapping.map_descriptor(&value);
                if mapped != value {
                    let descriptor_utf8 = pool.push_utf8(&mapped)?;
                    let target = pool.push_name_and_type(name_index, descriptor_utf8)?;
                    pool.set_dynamic_target(index, target)?;
                }
            }
            _ => {}
        }
    }

    for (index, name) in &class_entries {
        let mapped = if name.starts_with('[') {
            let remapped = mapping.map_descriptor(name);
            (remapped != *name).then_some(remapped)
        } else {
            mapping.map_class(name).map(str::to_string)
        };
        if let Some(new_name) = mapped {
            let utf8 = pool.push_utf8(&new_name)?;
            pool.set_class_name(*index, utf8)?;
        }
    }

    for field in &mut fields {
        let name = pool.utf8(field.name)?.to_string();
        let descriptor = pool.utf8(field.descriptor)?.to_string();
        if let Some(target) = hierarchy.resolve_field(mapping, &this_name, &name, &descriptor) {
            if target != name {
                field.name = pool.push_utf8(target)?;
            }
        }
        let mapped = mapping.map_descriptor(&descriptor);
        if mapped != descriptor {
            field.descriptor = pool.push_utf8(&mapped)?;
        }
    }

    // resolve_method walks the super-type graph, so an override of a renamed
    // parent method picks up the parent's new name.
    for method in &mut methods {
        let name = pool.utf8(method.name)?.to_string();
        let descriptor = pool.utf8(method.descriptor)?.to_string();
        if let Some(target) = hierarchy.resolve_method(mapping, &this_name, &name, &descriptor) {
            if target != name {
                method.name = pool.push_utf8(target)?;
            }
        }
        let mapped = mapping.map_descriptor(&descriptor);
        if mapped != descriptor {
            method.descriptor = pool.push_utf8(&mapped)?;
        }
    }

    let mapped_name = mapping
        .map_class(&this_name)
        .unwrap_or(this_name.as_str())
        .to_string();

    let mut out = Vec::with_capacity(bytes.len() + 64);
    out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
    push_u2(&mut out, minor);
    push_u2(&mut out, major);
    pool.serialize(&mut out);
    push_u2(&mut out, access_flags);
    push_u2(&mut out, this_class);
    push_u2(&mut out, super_class);
    push_u2(&mut out, interfaces_count);
    for interface in &interfaces {
        push_u2(&mut out, *interface);
    }
    serialize_members(&mut out, &fields, bytes);
    serialize_members(&mut out, &methods, bytes);
    out.extend_from_slice(class_attributes);

    Ok(RewrittenClass {
        name: mapped_name,
        bytes: out,
    })
}

struct Member {
    access: u16,
    name: u16,
    descriptor: u16,
    /// Raw attribute bytes, including the leading attributes_count.
    attributes: Range<usize>,
}

fn read_members(reader: &mut ClassReader<'_>) -> Result<Vec<Member>, ClassRewriteError> {
    let count = reader.read_u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access = reader.read_u2()?;
        let name = reader.read_u2()?;
        let descriptor = reader.read_u2()?;
        let attributes_start = reader.offset();
        let attributes_count = reader.read_u2()?;
        skip_attributes(reader, attributes_count)?;
        members.push(Member {
            access,
            name,
            descriptor,
            attributes: attributes_start..reader.offset(),
        });
    }
    Ok(members)
}

fn serialize_members(out: &mut Vec<u8>, members: &[Member], source: &[u8]) {
    push_u2(out, members.len() as u16);
    for member in members {
        push_u2(out, member.access);
        push_u2(out, member.name);
        push_u2(out, member.descriptor);
        out.extend_from_slice(&source[member.attributes.clone()]);
    }
}

fn skip_attributes(reader: &mut ClassReader<'_>, count: u16) -> Result<(), ClassRewriteError> {
    for _ in 0..count {
        reader.read_u2()?; // attribute_name_index
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

fn push_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[derive(Debug, Clone, PartialEq)]
enum PoolEntry {
    Utf8(Vec<u8>),
    Integer([u8; 4]),
    Float([u8; 4]),
    Long([u8; 8]),
    Double([u8; 8]),
    Class { name: u16 },
    String { value: u16 },
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType { descriptor: u16 },
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module { name: u16 },
    Package { name: u16 },
    /// Index 0 and the high halves of Long/Double slots.
    Placeholder,
}

struct ConstantPool {
    entries: Vec<PoolEntry>,
    utf8_index: HashMap<Vec<u8>, u16>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassRewriteError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(PoolEntry::Placeholder); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    PoolEntry::Utf8(reader.read_slice(length)?.to_vec())
                }
                3 => PoolEntry::Integer(reader.read_array::<4>()?),
                4 => PoolEntry::Float(reader.read_array::<4>()?),
                5 => PoolEntry::Long(reader.read_array::<8>()?),
                6 => PoolEntry::Double(reader.read_array::<8>()?),
                7 => PoolEntry::Class {
                    name: reader.read_u2()?,
                },
                8 => PoolEntry::String {
                    value: reader.read_u2()?,
                },
                9 => PoolEntry::FieldRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                10 => PoolEntry::MethodRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                11 => PoolEntry::InterfaceMethodRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                12 => PoolEntry::NameAndType {
                    name: reader.read_u2()?,
                    descriptor: reader.read_u2()?,
                },
                15 => PoolEntry::MethodHandle {
                    kind: reader.read_u1()?,
                    reference: reader.read_u2()?,
                },
                16 => PoolEntry::MethodType {
                    descriptor: reader.read_u2()?,
                },
                17 => PoolEntry::Dynamic {
                    bootstrap: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                18 => PoolEntry::InvokeDynamic {
                    bootstrap: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                19 => PoolEntry::Module {
                    name: reader.read_u2()?,
                },
                20 => PoolEntry::Package {
                    name: reader.read_u2()?,
                },
                other => return Err(ClassRewriteError::UnsupportedConstant { tag: other }),
            };

            let double_width = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
            entries.push(entry);
            index += 1;
            if double_width {
                entries.push(PoolEntry::Placeholder);
                index += 1;
            }
        }

        let mut utf8_index = HashMap::new();
        for (position, entry) in entries.iter().enumerate() {
            if let PoolEntry::Utf8(value) = entry {
                utf8_index.entry(value.clone()).or_insert(position as u16);
            }
        }

        Ok(Self {
            entries,
            utf8_index,
        })
    }

    fn slot_count(&self) -> u16 {
        self.entries.len() as u16
    }

    fn entry(&self, index: u16) -> Result<&PoolEntry, ClassRewriteError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassRewriteError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassRewriteError> {
        match self.entry(index)? {
            PoolEntry::Utf8(value) => Ok(std::str::from_utf8(value)?),
            _ => Err(ClassRewriteError::InvalidConstantIndex { index }),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, ClassRewriteError> {
        match self.entry(index)? {
            PoolEntry::Class { name } => Ok(self.utf8(*name)?.to_string()),
            _ => Err(ClassRewriteError::InvalidConstantIndex { index }),
        }
    }

    fn name_and_type(&self, index: u16) -> Result<(u16, u16), ClassRewriteError> {
        match self.entry(index)? {
            PoolEntry::NameAndType { name, descriptor } => Ok((*name, *descriptor)),
            _ => Err(ClassRewriteError::InvalidConstantIndex { index }),
        }
    }

    fn push_utf8(&mut self, value: &str) -> Result<u16, ClassRewriteError> {
        if let Some(index) = self.utf8_index.get(value.as_bytes()) {
            return Ok(*index);
        }
        if self.entries.len() >= usize::from(u16::MAX) {
            return Err(ClassRewriteError::PoolOverflow);
        }
        let index = self.entries.len() as u16;
        self.entries.push(PoolEntry::Utf8(value.as_bytes().to_vec()));
        self.utf8_index.insert(value.as_bytes().to_vec(), index);
        Ok(index)
    }

    fn push_name_and_type(&mut self, name: u16, descriptor: u16) -> Result<u16, ClassRewriteError> {
        if self.entries.len() >= usize::from(u16::MAX) {
            return Err(ClassRewriteError::PoolOverflow);
        }
        let index = self.entries.len() as u16;
        self.entries.push(PoolEntry::NameAndType { name, descriptor });
        Ok(index)
    }

    fn set_class_name(&mut self, index: u16, utf8: u16) -> Result<(), ClassRewriteError> {
        match self.entries.get_mut(index as usize) {
            Some(PoolEntry::Class { name }) => {
                *name = utf8;
                Ok(())
            }
            _ => Err(ClassRewriteError::InvalidConstantIndex { index }),
        }
    }

    fn set_ref_target(&mut self, index: u16, target: u16) -> Result<(), ClassRewriteError> {
        match self.entries.get_mut(index as usize) {
            Some(PoolEntry::FieldRef { name_and_type, .. })
            | Some(PoolEntry::MethodRef { name_and_type, .. })
            | Some(PoolEntry::InterfaceMethodRef { name_and_type, .. }) => {
                *name_and_type = target;
                Ok(())
            }
            _ => Err(ClassRewriteError::InvalidConstantIndex { index }),
        }
    }

    fn set_method_type(&mut self, index: u16, utf8: u16) -> Result<(), ClassRewriteError> {
        match self.entries.get_mut(index as usize) {
            Some(PoolEntry::MethodType { descriptor }) => {
                *descriptor = utf8;
                Ok(())
            }
            _ => Err(ClassRewriteError::InvalidConstantIndex { index }),
        }
    }

    fn set_dynamic_target(&mut self, index: u16, target: u16) -> Result<(), ClassRewriteError> {
        match self.entries.get_mut(index as usize) {
            Some(PoolEntry::Dynamic { name_and_type, .. })
            | Some(PoolEntry::InvokeDynamic { name_and_type, .. }) => {
                *name_and_type = target;
                Ok(())
            }
            _ => Err(ClassRewriteError::InvalidConstantIndex { index }),
        }
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        push_u2(out, self.entries.len() as u16);
        for entry in &self.entries[1..] {
            match entry {
                PoolEntry::Utf8(value) => {
                    out.push(1);
                    push_u2(out, value.len() as u16);
                    out.extend_from_slice(value);
                }
                PoolEntry::Integer(raw) => {
                    out.push(3);
                    out.extend_from_slice(raw);
                }
                PoolEntry::Float(raw) => {
                    out.push(4);
                    out.extend_from_slice(raw);
                }
                PoolEntry::Long(raw) => {
                    out.push(5);
                    out.extend_from_slice(raw);
                }
                PoolEntry::Double(raw) => {
                    out.push(6);
                    out.extend_from_slice(raw);
                }
                PoolEntry::Class { name } => {
                    out.push(7);
                    push_u2(out, *name);
                }
                PoolEntry::String { value } => {
                    out.push(8);
                    push_u2(out, *value);
                }
                PoolEntry::FieldRef {
                    class,
                    name_and_type,
                } => {
                    out.push(9);
                    push_u2(out, *class);
                    push_u2(out, *name_and_type);
                }
                PoolEntry::MethodRef {
                    class,
                    name_and_type,
                } => {
                    out.push(10);
                    push_u2(out, *class);
                    push_u2(out, *name_and_type);
                }
                PoolEntry::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    out.push(11);
                    push_u2(out, *class);
                    push_u2(out, *name_and_type);
                }
                PoolEntry::NameAndType { name, descriptor } => {
                    out.push(12);
                    push_u2(out, *name);
                    push_u2(out, *descriptor);
                }
                PoolEntry::MethodHandle { kind, reference } => {
                    out.push(15);
                    out.push(*kind);
                    push_u2(out, *reference);
                }
                PoolEntry::MethodType { descriptor } => {
                    out.push(16);
                    push_u2(out, *descriptor);
                }
                PoolEntry::Dynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    out.push(17);
                    push_u2(out, *bootstrap);
                    push_u2(out, *name_and_type);
                }
                PoolEntry::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    out.push(18);
                    push_u2(out, *bootstrap);
                    push_u2(out, *name_and_type);
                }
                PoolEntry::Module { name } => {
                    out.push(19);
                    push_u2(out, *name);
                }
                PoolEntry::Package { name } => {
                    out.push(20);
                    push_u2(out, *name);
                }
                PoolEntry::Placeholder => {}
            }
        }
    }
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn expect_magic(&mut self) -> Result<(), ClassRewriteError> {
        const MAGIC: u32 = 0xCAFEBABE;
        if self.read_u4()? != MAGIC {
            return Err(ClassRewriteError::InvalidMagic);
        }
        Ok(())
    }

    fn read_u1(&mut self) -> Result<u8, ClassRewriteError> {
        if self.pos >= self.data.len() {
            return Err(ClassRewriteError::UnexpectedEof);
        }
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    fn read_u2(&mut self) -> Result<u16, ClassRewriteError> {
        if self.pos + 2 > self.data.len() {
            return Err(ClassRewriteError::UnexpectedEof);
        }
        let value = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    fn read_u4(&mut self) -> Result<u32, ClassRewriteError> {
        if self.pos + 4 > self.data.len() {
            return Err(ClassRewriteError::UnexpectedEof);
        }
        let value = u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(value)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ClassRewriteError> {
        let slice = self.read_slice(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassRewriteError> {
        if self.pos + len > self.data.len() {
            return Err(ClassRewriteError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassRewriteError> {
        if self.pos + len > self.data.len() {
            return Err(ClassRewriteError::UnexpectedEof);
        }
        self.pos += len;
        Ok(())
    }
}
