//! Class File Writer
//!
//! Minimal JVM class file encoder: a deduplicating constant pool, int
//! constant fields, simple methods and the `SourceFile` and `InnerClasses`
//! attributes. Enough to express the classes javac produces for `R`.

use std::collections::HashMap;
use bytes::{BufMut, Bytes, BytesMut};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;

const MAGIC: u32 = 0xCAFE_BABE;
const MAX_CODE_LENGTH: usize = 0xFFFF;

/// Class file encoding errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("constant pool exceeds 65535 entries")]
    ConstantPoolOverflow,
    #[error("string constant of {0} bytes is too long")]
    StringTooLong(usize),
    #[error("code of method {0} exceeds 65535 bytes")]
    CodeTooLarge(String),
    #[error("too many {0}")]
    TooManyMembers(&'static str),
}

pub type Result<T> = std::result::Result<T, SynthesisError>;

mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const CLASS: u8 = 7;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const NAME_AND_TYPE: u8 = 12;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Constant {
    Utf8(String),
    Integer(i32),
    Class(u16),
    NameAndType(u16, u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
}

/// Constant pool interning each constant once
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: HashMap<Constant, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, constant: Constant) -> Result<u16> {
        if let Some(index) = self.index.get(&constant) {
            return Ok(*index);
        }
        // Index 0 is reserved, the count field holds len + 1
        let index = u16::try_from(self.entries.len() + 1)
            .ok()
            .filter(|i| *i < u16::MAX)
            .ok_or(SynthesisError::ConstantPoolOverflow)?;
        self.entries.push(constant.clone());
        self.index.insert(constant, index);
        Ok(index)
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16> {
        let encoded = modified_utf8(value).len();
        if encoded > u16::MAX as usize {
            return Err(SynthesisError::StringTooLong(encoded));
        }
        self.add(Constant::Utf8(value.to_string()))
    }

    pub fn integer(&mut self, value: i32) -> Result<u16> {
        self.add(Constant::Integer(value))
    }

    /// Class constant from an internal name (`com/example/R$string`)
    pub fn class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.utf8(internal_name)?;
        self.add(Constant::Class(name))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.add(Constant::NameAndType(name, descriptor))
    }

    pub fn fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.class(class)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        self.add(Constant::Fieldref(class, name_and_type))
    }

    pub fn methodref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.class(class)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        self.add(Constant::Methodref(class, name_and_type))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn write(&self, out: &mut BytesMut) {
        out.put_u16(self.entries.len() as u16 + 1);
        for constant in &self.entries {
            match constant {
                Constant::Utf8(value) => {
                    let encoded = modified_utf8(value);
                    out.put_u8(tag::UTF8);
                    out.put_u16(encoded.len() as u16);
                    out.put_slice(&encoded);
                }
                Constant::Integer(value) => {
                    out.put_u8(tag::INTEGER);
                    out.put_i32(*value);
                }
                Constant::Class(name) => {
                    out.put_u8(tag::CLASS);
                    out.put_u16(*name);
                }
                Constant::NameAndType(name, descriptor) => {
                    out.put_u8(tag::NAME_AND_TYPE);
                    out.put_u16(*name);
                    out.put_u16(*descriptor);
                }
                Constant::Fieldref(class, name_and_type) => {
                    out.put_u8(tag::FIELDREF);
                    out.put_u16(*class);
                    out.put_u16(*name_and_type);
                }
                Constant::Methodref(class, name_and_type) => {
                    out.put_u8(tag::METHODREF);
                    out.put_u16(*class);
                    out.put_u16(*name_and_type);
                }
            }
        }
    }
}

/// Java's modified UTF-8: NUL as two bytes, supplementary characters as surrogate pairs
pub fn modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Bytecode of one method body
#[derive(Debug, Default)]
pub struct CodeBuilder {
    code: BytesMut,
    max_stack: u16,
    max_locals: u16,
}

impl CodeBuilder {
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Self {
            code: BytesMut::new(),
            max_stack,
            max_locals,
        }
    }

    pub fn aload_0(&mut self) -> &mut Self {
        self.code.put_u8(0x2a);
        self
    }

    pub fn dup(&mut self) -> &mut Self {
        self.code.put_u8(0x59);
        self
    }

    pub fn iastore(&mut self) -> &mut Self {
        self.code.put_u8(0x4f);
        self
    }

    pub fn return_void(&mut self) -> &mut Self {
        self.code.put_u8(0xb1);
        self
    }

    /// `newarray int`
    pub fn new_int_array(&mut self) -> &mut Self {
        self.code.put_u8(0xbc);
        self.code.put_u8(10);
        self
    }

    pub fn invokespecial(&mut self, methodref: u16) -> &mut Self {
        self.code.put_u8(0xb7);
        self.code.put_u16(methodref);
        self
    }

    pub fn putstatic(&mut self, fieldref: u16) -> &mut Self {
        self.code.put_u8(0xb3);
        self.code.put_u16(fieldref);
        self
    }

    /// Push an int with the shortest instruction
    pub fn push_int(&mut self, pool: &mut ConstantPool, value: i32) -> Result<&mut Self> {
        match value {
            -1..=5 => self.code.put_u8((0x03 + value) as u8),
            -128..=127 => {
                self.code.put_u8(0x10);
                self.code.put_i8(value as i8);
            }
            -32768..=32767 => {
                self.code.put_u8(0x11);
                self.code.put_i16(value as i16);
            }
            _ => {
                let index = pool.integer(value)?;
                if index <= 0xFF {
                    self.code.put_u8(0x12);
                    self.code.put_u8(index as u8);
                } else {
                    self.code.put_u8(0x13);
                    self.code.put_u16(index);
                }
            }
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Entry of the `InnerClasses` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner: String,
    pub outer: String,
    pub name: String,
    pub access: u16,
}

/// Incremental class file builder
pub struct ClassWriter {
    major_version: u16,
    pool: ConstantPool,
    access: u16,
    this_class: u16,
    super_class: u16,
    super_name: String,
    fields: BytesMut,
    field_count: u16,
    methods: BytesMut,
    method_count: u16,
    attributes: BytesMut,
    attribute_count: u16,
}

impl ClassWriter {
    pub fn new(major_version: u16, access: u16, internal_name: &str, super_name: &str) -> Result<Self> {
        let mut pool = ConstantPool::new();
        let this_class = pool.class(internal_name)?;
        let super_class = pool.class(super_name)?;
        Ok(Self {
            major_version,
            pool,
            access,
            this_class,
            super_class,
            super_name: super_name.to_string(),
            fields: BytesMut::new(),
            field_count: 0,
            methods: BytesMut::new(),
            method_count: 0,
            attributes: BytesMut::new(),
            attribute_count: 0,
        })
    }

    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    fn bump(count: &mut u16, what: &'static str) -> Result<()> {
        *count = count.checked_add(1).ok_or(SynthesisError::TooManyMembers(what))?;
        Ok(())
    }

    /// Field without attributes
    pub fn add_field(&mut self, access: u16, name: &str, descriptor: &str) -> Result<()> {
        let name = self.pool.utf8(name)?;
        let descriptor = self.pool.utf8(descriptor)?;
        Self::bump(&mut self.field_count, "fields")?;
        self.fields.put_u16(access);
        self.fields.put_u16(name);
        self.fields.put_u16(descriptor);
        self.fields.put_u16(0);
        Ok(())
    }

    /// `int` field with a `ConstantValue` attribute
    pub fn add_int_constant(&mut self, access: u16, name: &str, value: i32) -> Result<()> {
        let name = self.pool.utf8(name)?;
        let descriptor = self.pool.utf8("I")?;
        let attribute = self.pool.utf8("ConstantValue")?;
        let constant = self.pool.integer(value)?;
        Self::bump(&mut self.field_count, "fields")?;
        self.fields.put_u16(access);
        self.fields.put_u16(name);
        self.fields.put_u16(descriptor);
        self.fields.put_u16(1);
        self.fields.put_u16(attribute);
        self.fields.put_u32(2);
        self.fields.put_u16(constant);
        Ok(())
    }

    /// Method with a `Code` attribute and no exception handlers
    pub fn add_method(&mut self, access: u16, name: &str, descriptor: &str, code: CodeBuilder) -> Result<()> {
        if code.len() > MAX_CODE_LENGTH {
            return Err(SynthesisError::CodeTooLarge(name.to_string()));
        }
        let name_index = self.pool.utf8(name)?;
        let descriptor = self.pool.utf8(descriptor)?;
        let attribute = self.pool.utf8("Code")?;
        Self::bump(&mut self.method_count, "methods")?;

        self.methods.put_u16(access);
        self.methods.put_u16(name_index);
        self.methods.put_u16(descriptor);
        self.methods.put_u16(1);
        self.methods.put_u16(attribute);
        self.methods.put_u32(12 + code.len() as u32);
        self.methods.put_u16(code.max_stack);
        self.methods.put_u16(code.max_locals);
        self.methods.put_u32(code.len() as u32);
        self.methods.put_slice(&code.code);
        self.methods.put_u16(0);
        self.methods.put_u16(0);
        Ok(())
    }

    /// Public no-arg constructor calling `super()`
    pub fn add_default_constructor(&mut self, access: u16) -> Result<()> {
        let super_init = self.pool.methodref(&self.super_name, "<init>", "()V")?;
        let mut code = CodeBuilder::new(1, 1);
        code.aload_0().invokespecial(super_init).return_void();
        self.add_method(access, "<init>", "()V", code)
    }

    pub fn add_source_file(&mut self, file_name: &str) -> Result<()> {
        let attribute = self.pool.utf8("SourceFile")?;
        let file = self.pool.utf8(file_name)?;
        Self::bump(&mut self.attribute_count, "attributes")?;
        self.attributes.put_u16(attribute);
        self.attributes.put_u32(2);
        self.attributes.put_u16(file);
        Ok(())
    }

    pub fn add_inner_classes(&mut self, entries: &[InnerClassEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let count = u16::try_from(entries.len()).map_err(|_| SynthesisError::TooManyMembers("inner classes"))?;
        let attribute = self.pool.utf8("InnerClasses")?;

        let mut body = BytesMut::with_capacity(2 + entries.len() * 8);
        body.put_u16(count);
        for entry in entries {
            body.put_u16(self.pool.class(&entry.inner)?);
            body.put_u16(self.pool.class(&entry.outer)?);
            body.put_u16(self.pool.utf8(&entry.name)?);
            body.put_u16(entry.access);
        }

        Self::bump(&mut self.attribute_count, "attributes")?;
        self.attributes.put_u16(attribute);
        self.attributes.put_u32(body.len() as u32);
        self.attributes.put_slice(&body);
        Ok(())
    }

    /// Assemble the class file
    pub fn finish(self) -> Bytes {
        let mut out = BytesMut::with_capacity(
            64 + self.fields.len() + self.methods.len() + self.attributes.len() + self.pool.len() * 8,
        );
        out.put_u32(MAGIC);
        out.put_u16(0);
        out.put_u16(self.major_version);
        self.pool.write(&mut out);
        out.put_u16(self.access);
        out.put_u16(self.this_class);
        out.put_u16(self.super_class);
        out.put_u16(0);
        out.put_u16(self.field_count);
        out.put_slice(&self.fields);
        out.put_u16(self.method_count);
        out.put_slice(&self.methods);
        out.put_u16(self.attribute_count);
        out.put_slice(&self.attributes);
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_pool_dedupes() {
        let mut pool = ConstantPool::new();
        let a = pool.class("java/lang/Object").unwrap();
        let b = pool.class("java/lang/Object").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 2);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.integer(7).unwrap(), 3);
        assert_eq!(pool.integer(7).unwrap(), 3);
    }

    #[test]
    fn test_modified_utf8() {
        assert_eq!(modified_utf8("abc"), b"abc");
        assert_eq!(modified_utf8("\0"), vec![0xC0, 0x80]);
        assert_eq!(modified_utf8("é"), vec![0xC3, 0xA9]);
        // U+1F600 becomes two three-byte surrogates
        assert_eq!(modified_utf8("\u{1F600}"), vec![0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]);
    }

    #[test]
    fn test_push_int_encodings() {
        let mut pool = ConstantPool::new();
        let mut code = CodeBuilder::new(1, 0);
        code.push_int(&mut pool, 3).unwrap();
        code.push_int(&mut pool, -1).unwrap();
        code.push_int(&mut pool, 100).unwrap();
        code.push_int(&mut pool, 1000).unwrap();
        code.push_int(&mut pool, 0x7f010000).unwrap();
        assert_eq!(
            &code.code[..],
            &[0x06, 0x02, 0x10, 100, 0x11, 0x03, 0xe8, 0x12, 0x01][..]
        );
    }

    #[test]
    fn test_class_header() {
        let writer = ClassWriter::new(52, ACC_PUBLIC | ACC_FINAL | ACC_SUPER, "a/R", "java/lang/Object").unwrap();
        let bytes = writer.finish();
        assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 52]);
        // Two class constants and their names
        assert_eq!(&bytes[8..10], &[0, 5]);
    }

    #[test]
    fn test_code_too_large() {
        let mut writer = ClassWriter::new(52, ACC_PUBLIC, "a/Big", "java/lang/Object").unwrap();
        let mut code = CodeBuilder::new(1, 0);
        for _ in 0..=MAX_CODE_LENGTH {
            code.dup();
        }
        let err = writer.add_method(ACC_STATIC, "<clinit>", "()V", code).unwrap_err();
        assert_eq!(err, SynthesisError::CodeTooLarge("<clinit>".into()));
    }
}
