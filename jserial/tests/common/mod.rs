#![allow(dead_code)]

//! Writes serialization streams byte by byte for tests

pub const BASE_HANDLE: u32 = 0x7E0000;

/// A field declaration: type code, name, and class name for object fields
pub type Field<'a> = (u8, &'a str, Option<&'a str>);

pub struct StreamBuilder {
    bytes: Vec<u8>,
}

impl StreamBuilder {
    /// Start a stream with a valid header
    pub fn new() -> Self {
        Self {
            bytes: vec![0xAC, 0xED, 0x00, 0x05],
        }
    }

    /// A string with a 16 bit length and no tag
    pub fn utf(mut self, text: &str) -> Self {
        self.bytes
            .extend_from_slice(&(text.len() as u16).to_be_bytes());
        self.bytes.extend_from_slice(text.as_bytes());
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn null(self) -> Self {
        self.raw(&[0x70])
    }

    pub fn reference(self, handle: u32) -> Self {
        self.raw(&[0x71]).raw(&handle.to_be_bytes())
    }

    pub fn string(self, text: &str) -> Self {
        self.raw(&[0x74]).utf(text)
    }

    pub fn reset(self) -> Self {
        self.raw(&[0x79])
    }

    pub fn end_block(self) -> Self {
        self.raw(&[0x78])
    }

    pub fn block(self, data: &[u8]) -> Self {
        self.raw(&[0x77, data.len() as u8]).raw(data)
    }

    /// Start a new object; follow with its class descriptor and values
    pub fn object(self) -> Self {
        self.raw(&[0x73])
    }

    /// A class descriptor up to its annotation; follow with the annotation, an end block, and
    /// the superclass
    pub fn class_desc(self, name: &str, uid: u64, flags: u8, fields: &[Field]) -> Self {
        let mut builder = self
            .raw(&[0x72])
            .utf(name)
            .raw(&uid.to_be_bytes())
            .raw(&[flags])
            .raw(&(fields.len() as u16).to_be_bytes());
        for (code, field, class_name) in fields {
            builder = builder.raw(&[*code]).utf(field);
            if let Some(class_name) = class_name {
                builder = builder.utf(class_name);
            }
        }
        builder
    }

    /// A class descriptor with an empty annotation and no superclass
    pub fn simple_class_desc(self, name: &str, flags: u8, fields: &[Field]) -> Self {
        self.class_desc(name, 1, flags, fields).end_block().null()
    }

    pub fn int(self, value: i32) -> Self {
        self.raw(&value.to_be_bytes())
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
