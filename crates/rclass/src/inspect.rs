//! Class File Inspection
//!
//! Reads back the parts of a class file that matter for `R` classes: names,
//! access flags, fields with their constant values, inner classes and the
//! `int[]` initialisers of `<clinit>`. Used by tooling and tests.

use std::collections::BTreeMap;
use bytes::Buf;

/// Class file decoding errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("class file is truncated")]
    Truncated,
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported constant pool tag {0}")]
    UnsupportedTag(u8),
    #[error("invalid constant pool index {0}")]
    BadIndex(u16),
    #[error("invalid modified UTF-8 constant")]
    BadUtf8,
    #[error("unsupported opcode {0:#04x} in <clinit>")]
    UnsupportedOpcode(u8),
    #[error("inconsistent operand stack in <clinit>")]
    BadStack,
}

type Result<T> = std::result::Result<T, ClassFormatError>;

#[derive(Debug, Clone)]
enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Class(u16),
    NameAndType(u16),
    MemberRef(u16),
    Other,
}

struct Input<'a> {
    buf: &'a [u8],
}

impl<'a> Input<'a> {
    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            Err(ClassFormatError::Truncated)
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSummary {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    /// Value of an `int` `ConstantValue` attribute
    pub constant: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassSummary {
    pub inner: String,
    pub outer: Option<String>,
    pub name: Option<String>,
    pub access: u16,
}

/// Decoded view of a class file
#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub major_version: u16,
    pub minor_version: u16,
    pub access: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub fields: Vec<FieldSummary>,
    pub methods: Vec<MethodSummary>,
    pub inner_classes: Vec<InnerClassSummary>,
    pub source_file: Option<String>,
    pool: Vec<PoolEntry>,
}

impl ClassSummary {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut input = Input { buf: bytes };

        let magic = input.u32()?;
        if magic != 0xCAFE_BABE {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor_version = input.u16()?;
        let major_version = input.u16()?;
        let pool = read_pool(&mut input)?;

        let mut summary = ClassSummary {
            major_version,
            minor_version,
            access: 0,
            name: String::new(),
            super_name: None,
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            source_file: None,
            pool,
        };

        summary.access = input.u16()?;
        let this_class = input.u16()?;
        summary.name = summary.class_name(this_class)?;
        let super_class = input.u16()?;
        summary.super_name = summary.optional_class(super_class)?;

        let interfaces = input.u16()?;
        input.take(interfaces as usize * 2)?;

        for _ in 0..input.u16()? {
            let access = input.u16()?;
            let name = summary.utf8(input.u16()?)?;
            let descriptor = summary.utf8(input.u16()?)?;
            let mut constant = None;
            for _ in 0..input.u16()? {
                let attribute = summary.utf8(input.u16()?)?;
                let length = input.u32()? as usize;
                let mut body = Input { buf: input.take(length)? };
                if attribute == "ConstantValue" {
                    if let PoolEntry::Integer(value) = summary.entry(body.u16()?)? {
                        constant = Some(*value);
                    }
                }
            }
            summary.fields.push(FieldSummary {
                access,
                name,
                descriptor,
                constant,
            });
        }

        for _ in 0..input.u16()? {
            let access = input.u16()?;
            let name = summary.utf8(input.u16()?)?;
            let descriptor = summary.utf8(input.u16()?)?;
            let mut code = Vec::new();
            for _ in 0..input.u16()? {
                let attribute = summary.utf8(input.u16()?)?;
                let length = input.u32()? as usize;
                let mut body = Input { buf: input.take(length)? };
                if attribute == "Code" {
                    body.u16()?;
                    body.u16()?;
                    let code_length = body.u32()? as usize;
                    code = body.take(code_length)?.to_vec();
                }
            }
            summary.methods.push(MethodSummary {
                access,
                name,
                descriptor,
                code,
            });
        }

        for _ in 0..input.u16()? {
            let attribute = summary.utf8(input.u16()?)?;
            let length = input.u32()? as usize;
            let mut body = Input { buf: input.take(length)? };
            match attribute.as_str() {
                "SourceFile" => summary.source_file = Some(summary.utf8(body.u16()?)?),
                "InnerClasses" => {
                    for _ in 0..body.u16()? {
                        let inner = summary.class_name(body.u16()?)?;
                        let outer = summary.optional_class(body.u16()?)?;
                        let name_index = body.u16()?;
                        let name = if name_index == 0 {
                            None
                        } else {
                            Some(summary.utf8(name_index)?)
                        };
                        let access = body.u16()?;
                        summary.inner_classes.push(InnerClassSummary {
                            inner,
                            outer,
                            name,
                            access,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(summary)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSummary> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodSummary> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Values assigned to static `int[]` fields by `<clinit>`
    ///
    /// Understands the straight-line array initialisers javac emits.
    pub fn static_int_arrays(&self) -> Result<BTreeMap<String, Vec<i32>>> {
        #[derive(Clone, Copy)]
        enum Slot {
            Int(i32),
            Array(usize),
        }

        let mut arrays: Vec<Vec<i32>> = Vec::new();
        let mut result = BTreeMap::new();
        let Some(clinit) = self.method("<clinit>") else {
            return Ok(result);
        };

        let mut code = Input { buf: &clinit.code };
        let mut stack: Vec<Slot> = Vec::new();
        let pop = |stack: &mut Vec<Slot>| stack.pop().ok_or(ClassFormatError::BadStack);

        while code.buf.has_remaining() {
            let opcode = code.u8()?;
            match opcode {
                0x02..=0x08 => stack.push(Slot::Int(opcode as i32 - 0x03)),
                0x10 => stack.push(Slot::Int(code.u8()? as i8 as i32)),
                0x11 => stack.push(Slot::Int(code.u16()? as i16 as i32)),
                0x12 | 0x13 => {
                    let index = if opcode == 0x12 {
                        code.u8()? as u16
                    } else {
                        code.u16()?
                    };
                    match self.entry(index)? {
                        PoolEntry::Integer(value) => stack.push(Slot::Int(*value)),
                        _ => return Err(ClassFormatError::BadIndex(index)),
                    }
                }
                0xbc => {
                    code.u8()?;
                    let Slot::Int(length) = pop(&mut stack)? else {
                        return Err(ClassFormatError::BadStack);
                    };
                    arrays.push(vec![0; length.max(0) as usize]);
                    stack.push(Slot::Array(arrays.len() - 1));
                }
                0x59 => {
                    let top = *stack.last().ok_or(ClassFormatError::BadStack)?;
                    stack.push(top);
                }
                0x4f => {
                    let (Slot::Int(value), Slot::Int(index), Slot::Array(array)) =
                        (pop(&mut stack)?, pop(&mut stack)?, pop(&mut stack)?)
                    else {
                        return Err(ClassFormatError::BadStack);
                    };
                    let slot = arrays[array]
                        .get_mut(index as usize)
                        .ok_or(ClassFormatError::BadStack)?;
                    *slot = value;
                }
                0xb3 => {
                    let index = code.u16()?;
                    let Slot::Array(array) = pop(&mut stack)? else {
                        return Err(ClassFormatError::BadStack);
                    };
                    result.insert(self.member_name(index)?, arrays[array].clone());
                }
                0xb1 => break,
                other => return Err(ClassFormatError::UnsupportedOpcode(other)),
            }
        }

        Ok(result)
    }

    fn entry(&self, index: u16) -> Result<&PoolEntry> {
        index
            .checked_sub(1)
            .and_then(|i| self.pool.get(i as usize))
            .ok_or(ClassFormatError::BadIndex(index))
    }

    fn utf8(&self, index: u16) -> Result<String> {
        match self.entry(index)? {
            PoolEntry::Utf8(value) => Ok(value.clone()),
            _ => Err(ClassFormatError::BadIndex(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<String> {
        match self.entry(index)? {
            PoolEntry::Class(name) => self.utf8(*name),
            _ => Err(ClassFormatError::BadIndex(index)),
        }
    }

    fn optional_class(&self, index: u16) -> Result<Option<String>> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    fn member_name(&self, index: u16) -> Result<String> {
        let PoolEntry::MemberRef(name_and_type) = self.entry(index)? else {
            return Err(ClassFormatError::BadIndex(index));
        };
        match self.entry(*name_and_type)? {
            PoolEntry::NameAndType(name) => self.utf8(*name),
            _ => Err(ClassFormatError::BadIndex(*name_and_type)),
        }
    }
}

fn read_pool(input: &mut Input<'_>) -> Result<Vec<PoolEntry>> {
    let count = input.u16()?;
    let mut pool = Vec::with_capacity(count as usize);

    while pool.len() + 1 < count as usize {
        let tag = input.u8()?;
        match tag {
            1 => {
                let length = input.u16()? as usize;
                pool.push(PoolEntry::Utf8(decode_modified_utf8(input.take(length)?)?));
            }
            3 => pool.push(PoolEntry::Integer(input.u32()? as i32)),
            4 => {
                input.take(4)?;
                pool.push(PoolEntry::Other);
            }
            // Long and double take two slots
            5 | 6 => {
                input.take(8)?;
                pool.push(PoolEntry::Other);
                pool.push(PoolEntry::Other);
            }
            7 => pool.push(PoolEntry::Class(input.u16()?)),
            8 | 16 | 19 | 20 => {
                input.take(2)?;
                pool.push(PoolEntry::Other);
            }
            9 | 10 | 11 => {
                input.u16()?;
                pool.push(PoolEntry::MemberRef(input.u16()?));
            }
            12 => {
                let name = input.u16()?;
                input.u16()?;
                pool.push(PoolEntry::NameAndType(name));
            }
            15 => {
                input.take(3)?;
                pool.push(PoolEntry::Other);
            }
            17 | 18 => {
                input.take(4)?;
                pool.push(PoolEntry::Other);
            }
            other => return Err(ClassFormatError::UnsupportedTag(other)),
        }
    }

    Ok(pool)
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let continuation = |offset: usize| -> Result<u16> {
            bytes
                .get(i + offset)
                .filter(|c| *c & 0xC0 == 0x80)
                .map(|c| (*c & 0x3F) as u16)
                .ok_or(ClassFormatError::BadUtf8)
        };
        match b {
            0x01..=0x7F => {
                units.push(b as u16);
                i += 1;
            }
            0xC0..=0xDF => {
                units.push(((b & 0x1F) as u16) << 6 | continuation(1)?);
                i += 2;
            }
            0xE0..=0xEF => {
                units.push(((b & 0x0F) as u16) << 12 | continuation(1)? << 6 | continuation(2)?);
                i += 3;
            }
            _ => return Err(ClassFormatError::BadUtf8),
        }
    }
    String::from_utf16(&units).map_err(|_| ClassFormatError::BadUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_file::{modified_utf8, ClassWriter, CodeBuilder, ACC_FINAL, ACC_PUBLIC, ACC_STATIC, ACC_SUPER};

    #[test]
    fn test_round_trip_of_written_class() {
        let mut writer =
            ClassWriter::new(52, ACC_PUBLIC | ACC_FINAL | ACC_SUPER, "com/example/R$string", "java/lang/Object").unwrap();
        writer.add_int_constant(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "title", 0x7f140000).unwrap();
        writer.add_field(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "all", "[I").unwrap();
        writer.add_default_constructor(ACC_PUBLIC).unwrap();

        let fieldref = writer.pool().fieldref("com/example/R$string", "all", "[I").unwrap();
        let mut code = CodeBuilder::new(4, 0);
        code.push_int(writer.pool(), 2).unwrap();
        code.new_int_array();
        code.dup();
        code.push_int(writer.pool(), 0).unwrap();
        code.push_int(writer.pool(), 0x7f140000).unwrap();
        code.iastore();
        code.dup();
        code.push_int(writer.pool(), 1).unwrap();
        code.push_int(writer.pool(), -7).unwrap();
        code.iastore();
        code.putstatic(fieldref).return_void();
        writer.add_method(ACC_STATIC, "<clinit>", "()V", code).unwrap();
        writer.add_source_file("R.java").unwrap();

        let summary = ClassSummary::parse(&writer.finish()).unwrap();
        assert_eq!(summary.name, "com/example/R$string");
        assert_eq!(summary.super_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(summary.field("title").unwrap().constant, Some(0x7f140000));
        assert_eq!(summary.field("all").unwrap().descriptor, "[I");
        assert_eq!(summary.source_file.as_deref(), Some("R.java"));
        assert!(summary.method("<init>").is_some());

        let arrays = summary.static_int_arrays().unwrap();
        assert_eq!(arrays["all"], vec![0x7f140000, -7]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(ClassSummary::parse(b"nope").unwrap_err(), ClassFormatError::BadMagic(0x6e6f7065));
        assert_eq!(
            ClassSummary::parse(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]).unwrap_err(),
            ClassFormatError::Truncated
        );
    }

    #[test]
    fn test_modified_utf8_round_trip() {
        let text = "a\0é\u{1F600}";
        assert_eq!(decode_modified_utf8(&modified_utf8(text)).unwrap(), text);
    }
}
