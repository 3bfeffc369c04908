/*!
 Data structures used to represent the contents of a Java object serialization stream.
*/

use crate::util::{mutf8, stream::handles::HandleTable};

/// Index of a decoded node in [`Stream::nodes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The grammar rules that can start at a tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `TC_NULL`
    NullReference,
    /// `TC_REFERENCE`, a handle of an object that was already read
    Reference,
    /// `TC_CLASSDESC`
    ClassDesc,
    /// `TC_OBJECT`
    Object,
    /// `TC_STRING`, with a 16 bit length
    String,
    /// `TC_ARRAY`
    Array,
    /// `TC_CLASS`
    Class,
    /// `TC_BLOCKDATA`, with an 8 bit length
    BlockData,
    /// `TC_RESET`
    Reset,
    /// `TC_BLOCKDATALONG`, with a 32 bit length
    BlockDataLong,
    /// `TC_EXCEPTION`
    Exception,
    /// `TC_LONGSTRING`, with a 64 bit length
    LongString,
    /// `TC_PROXYCLASSDESC`
    ProxyClassDesc,
    /// `TC_ENUM`
    Enum,
}

impl Grammar {
    /// The tag byte that starts this grammar in the stream
    pub const fn tag(self) -> u8 {
        match self {
            Grammar::NullReference => 0x70,
            Grammar::Reference => 0x71,
            Grammar::ClassDesc => 0x72,
            Grammar::Object => 0x73,
            Grammar::String => 0x74,
            Grammar::Array => 0x75,
            Grammar::Class => 0x76,
            Grammar::BlockData => 0x77,
            Grammar::Reset => 0x79,
            Grammar::BlockDataLong => 0x7A,
            Grammar::Exception => 0x7B,
            Grammar::LongString => 0x7C,
            Grammar::ProxyClassDesc => 0x7D,
            Grammar::Enum => 0x7E,
        }
    }
}

/// Sets of grammars that are legal in the same position of the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// A slot that describes a class: a new descriptor, `null`, or a reference to a descriptor
    ClassDesc,
    /// Anything that can be stored in an object field
    Object,
    /// Anything that can appear in a content sequence: objects and block data
    Content,
}

impl Family {
    /// The candidate grammars, in the order they are tried
    pub const fn candidates(self) -> &'static [Grammar] {
        match self {
            Family::ClassDesc => &[
                Grammar::ClassDesc,
                Grammar::ProxyClassDesc,
                Grammar::NullReference,
                Grammar::Reference,
            ],
            Family::Object => &[
                Grammar::Object,
                Grammar::Class,
                Grammar::Array,
                Grammar::String,
                Grammar::LongString,
                Grammar::Enum,
                Grammar::ClassDesc,
                Grammar::ProxyClassDesc,
                Grammar::Reference,
                Grammar::NullReference,
                Grammar::Exception,
                Grammar::Reset,
            ],
            Family::Content => &[
                Grammar::Object,
                Grammar::Class,
                Grammar::Array,
                Grammar::String,
                Grammar::LongString,
                Grammar::Enum,
                Grammar::ClassDesc,
                Grammar::ProxyClassDesc,
                Grammar::Reference,
                Grammar::NullReference,
                Grammar::Exception,
                Grammar::Reset,
                Grammar::BlockData,
                Grammar::BlockDataLong,
            ],
        }
    }

    /// Select the first candidate that starts with `tag`
    pub fn select(self, tag: u8) -> Option<Grammar> {
        self.candidates()
            .iter()
            .find(|grammar| grammar.tag() == tag)
            .copied()
    }

    /// Human readable name used in error messages
    pub const fn describe(self) -> &'static str {
        match self {
            Family::ClassDesc => "class descriptor",
            Family::Object => "object",
            Family::Content => "content",
        }
    }
}

/// The flags byte of a class descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassDescFlags(pub u8);

impl ClassDescFlags {
    /// `SC_WRITE_METHOD`, the class wrote extra data after its fields
    pub const WRITE_METHOD: u8 = 0x01;
    /// `SC_SERIALIZABLE`
    pub const SERIALIZABLE: u8 = 0x02;
    /// `SC_EXTERNALIZABLE`
    pub const EXTERNALIZABLE: u8 = 0x04;
    /// `SC_BLOCK_DATA`, externalizable data is written in block data mode
    pub const BLOCK_DATA: u8 = 0x08;
    /// `SC_ENUM`
    pub const ENUM: u8 = 0x10;

    fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn has_write_method(self) -> bool {
        self.has(Self::WRITE_METHOD)
    }

    pub fn is_serializable(self) -> bool {
        self.has(Self::SERIALIZABLE)
    }

    pub fn is_externalizable(self) -> bool {
        self.has(Self::EXTERNALIZABLE)
    }

    pub fn has_block_data(self) -> bool {
        self.has(Self::BLOCK_DATA)
    }

    pub fn is_enum(self) -> bool {
        self.has(Self::ENUM)
    }
}

/// Primitive field types and their fixed widths in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Primitive {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'B' => Some(Self::Byte),
            b'C' => Some(Self::Char),
            b'D' => Some(Self::Double),
            b'F' => Some(Self::Float),
            b'I' => Some(Self::Int),
            b'J' => Some(Self::Long),
            b'S' => Some(Self::Short),
            b'Z' => Some(Self::Boolean),
            _ => None,
        }
    }

    /// The number of bytes a value of this type takes in the stream
    pub const fn width(self) -> usize {
        match self {
            Primitive::Byte | Primitive::Boolean => 1,
            Primitive::Char | Primitive::Short => 2,
            Primitive::Float | Primitive::Int => 4,
            Primitive::Double | Primitive::Long => 8,
        }
    }
}

/// How the value of a field is read when the object that owns it is decoded
///
/// A field's data is not stored next to its descriptor, so the rule is kept on the
/// [`FieldDesc`] and applied later, in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Read a fixed-width number
    Primitive(Primitive),
    /// Read a node from the [`Family::Object`] grammars
    Object,
}

impl FieldRule {
    /// Get the rule for a field type code, i.e. `I` or `L`
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'L' | b'[' => Some(Self::Object),
            other => Primitive::from_code(other).map(Self::Primitive),
        }
    }
}

/// Describes one serializable field of a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    /// The type code, i.e. `I` for `int` or `L` for an object
    pub type_code: u8,
    /// The name of the field
    pub name: String,
    /// For object and array fields, the JVM type signature of the field
    pub class_name: Option<String>,
    /// How to read this field's value
    pub rule: FieldRule,
}

/// A decoded field or array element
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(i8),
    /// A UTF-16 code unit
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    /// A node read from the stream, which may be `null` or a back-reference
    Object(NodeId),
}

/// Describes a class whose instances appear in the stream
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDesc {
    pub handle: u32,
    /// The fully qualified name of the class, i.e. `java.util.HashMap`
    pub name: String,
    /// The `serialVersionUID` of the class
    pub serial_version_uid: u64,
    pub flags: ClassDescFlags,
    /// Serializable fields, in the order their values are written
    pub fields: Vec<FieldDesc>,
    /// Data written by `annotateClass`
    pub annotation: Vec<NodeId>,
    /// The descriptor of the parent class, if the slot was present in the stream
    pub super_class: Option<NodeId>,
}

/// Describes a dynamic proxy class
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyClassDesc {
    pub handle: u32,
    /// Names of the interfaces the proxy implements
    pub interfaces: Vec<String>,
    /// Data written by `annotateProxyClass`
    pub annotation: Vec<NodeId>,
    pub super_class: Option<NodeId>,
}

/// An instance of a class
#[derive(Debug, Clone, PartialEq)]
pub struct JavaObject {
    pub handle: u32,
    /// The node describing the class of this object
    pub class_desc: NodeId,
    /// One value per field of the class descriptor, in field order
    pub values: Vec<Value>,
    /// Data the class wrote with `writeObject` or `writeExternal`
    pub annotation: Option<Vec<NodeId>>,
}

/// An array of primitives or objects
#[derive(Debug, Clone, PartialEq)]
pub struct JavaArray {
    pub handle: u32,
    pub class_desc: NodeId,
    pub elements: Vec<Value>,
}

/// String data, stored as the raw modified UTF-8 bytes from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaString {
    pub handle: u32,
    /// Whether the string used a 64 bit length prefix
    pub long: bool,
    pub data: Vec<u8>,
}

impl JavaString {
    /// Decode the string data, if it is valid modified UTF-8
    pub fn decode(&self) -> Option<String> {
        mutf8::decode(&self.data)
    }

    /// Decode the string data, replacing invalid sequences
    pub fn to_string_lossy(&self) -> String {
        self.decode()
            .unwrap_or_else(|| String::from_utf8_lossy(&self.data).into_owned())
    }
}

/// A reference to a [`java.lang.Class`](https://docs.oracle.com/javase/8/docs/api/java/lang/Class.html) object
#[derive(Debug, Clone, PartialEq)]
pub struct JavaClass {
    pub handle: u32,
    pub class_desc: NodeId,
}

/// A constant of an `enum` type
#[derive(Debug, Clone, PartialEq)]
pub struct JavaEnum {
    pub handle: u32,
    pub class_desc: NodeId,
    /// The name of the constant
    pub constant: String,
}

/// Opaque bytes written by a class's custom serialization logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    /// Whether the block used a 32 bit length prefix
    pub long: bool,
    pub data: Vec<u8>,
}

/// A reference to an object that was already read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackReference {
    /// The handle as written in the stream
    pub handle: u32,
    /// The node the handle was assigned to
    pub target: NodeId,
}

/// A node decoded from the stream
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `null`
    Null,
    Reference(BackReference),
    ClassDesc(ClassDesc),
    ProxyClassDesc(ProxyClassDesc),
    Object(JavaObject),
    String(JavaString),
    Array(JavaArray),
    Class(JavaClass),
    Enum(JavaEnum),
    BlockData(BlockData),
    /// The writer discarded all assigned handles
    Reset,
    /// The writer failed and serialized the `Throwable` that caused it
    Exception(NodeId),
}

impl Node {
    /// Human readable name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Reference(_) => "reference",
            Node::ClassDesc(_) => "class descriptor",
            Node::ProxyClassDesc(_) => "proxy class descriptor",
            Node::Object(_) => "object",
            Node::String(_) => "string",
            Node::Array(_) => "array",
            Node::Class(_) => "class",
            Node::Enum(_) => "enum",
            Node::BlockData(_) => "block data",
            Node::Reset => "reset",
            Node::Exception(_) => "exception",
        }
    }

    /// The handle assigned to this node, if it is a kind that receives one
    pub fn handle(&self) -> Option<u32> {
        match self {
            Node::ClassDesc(desc) => Some(desc.handle),
            Node::ProxyClassDesc(desc) => Some(desc.handle),
            Node::Object(object) => Some(object.handle),
            Node::String(string) => Some(string.handle),
            Node::Array(array) => Some(array.handle),
            Node::Class(class) => Some(class.handle),
            Node::Enum(constant) => Some(constant.handle),
            Node::Null
            | Node::Reference(_)
            | Node::BlockData(_)
            | Node::Reset
            | Node::Exception(_) => None,
        }
    }
}

/// Get a node, looking through a back-reference to the node it refers to
pub(crate) fn follow(nodes: &[Node], id: NodeId) -> Option<&Node> {
    match nodes.get(id.0)? {
        Node::Reference(reference) => nodes.get(reference.target.0),
        node => Some(node),
    }
}

/// A fully decoded serialization stream
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub(crate) magic: u16,
    pub(crate) version: u16,
    /// Every node read from the stream
    pub(crate) nodes: Vec<Node>,
    /// The top-level content sequence
    pub(crate) contents: Vec<NodeId>,
    /// The handle table as it was when the stream ended
    pub(crate) handles: HandleTable,
}

impl Stream {
    pub fn magic(&self) -> u16 {
        self.magic
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// The top-level content of the stream, in order
    pub fn contents(&self) -> &[NodeId] {
        &self.contents
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get a node exactly as it was read
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Get a node, looking through back-references
    pub fn resolve(&self, id: NodeId) -> Option<&Node> {
        follow(&self.nodes, id)
    }

    /// Get the node a handle refers to, if the handle was assigned after the last reset
    pub fn lookup(&self, handle: u32) -> Option<NodeId> {
        self.handles.resolve(handle)
    }

    /// Get the plain class descriptor in a class descriptor slot
    pub fn class_desc(&self, id: NodeId) -> Option<&ClassDesc> {
        match self.resolve(id)? {
            Node::ClassDesc(desc) => Some(desc),
            _ => None,
        }
    }

    /// Get the fully qualified class name of an object
    pub fn class_name(&self, object: &JavaObject) -> Option<&str> {
        self.class_desc(object.class_desc)
            .map(|desc| desc.name.as_str())
    }

    /// Pair each field name of an object's class with the value read for it
    pub fn fields<'a>(&'a self, object: &'a JavaObject) -> Vec<(&'a str, &'a Value)> {
        match self.class_desc(object.class_desc) {
            Some(desc) => desc
                .fields
                .iter()
                .map(|field| field.name.as_str())
                .zip(object.values.iter())
                .collect(),
            None => vec![],
        }
    }
}
