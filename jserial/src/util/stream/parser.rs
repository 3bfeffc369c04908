/*!
 Contains logic to decode a Java object serialization stream, as written by
 [`ObjectOutputStream`](https://docs.oracle.com/javase/8/docs/api/java/io/ObjectOutputStream.html).

 Grammar referenced from the
 [Object Serialization Stream Protocol](https://docs.oracle.com/javase/8/docs/platform/serialization/spec/protocol.html).
*/

use tracing::{debug, trace};

use crate::{
    error::stream::{StreamError, StreamErrorKind},
    util::{
        mutf8,
        stream::{
            cursor::Cursor,
            handles::HandleTable,
            models::{
                follow, BackReference, BlockData, ClassDesc, ClassDescFlags, Family, FieldDesc,
                FieldRule, Grammar, JavaArray, JavaClass, JavaEnum, JavaObject, JavaString, Node,
                NodeId, Primitive, ProxyClassDesc, Stream, Value,
            },
            options::ReaderOptions,
        },
    },
};

/// Every stream starts with these bytes
pub const STREAM_MAGIC: u16 = 0xACED;
/// The only protocol version this reader understands
pub const STREAM_VERSION: u16 = 5;
/// Indicates the end of a content sequence; not a node itself
const TC_ENDBLOCKDATA: u8 = 0x78;

/// The layout a class descriptor gives to the objects that use it
#[derive(Debug)]
struct Layout {
    flags: ClassDescFlags,
    fields: Vec<FieldDesc>,
}

/// Contains logic and data used to decode a serialization stream
#[derive(Debug)]
pub struct ObjectStreamReader<'a> {
    /// The stream we want to parse
    cursor: Cursor<'a>,
    /// Handles assigned to objects so far, used to resolve back-references
    handles: HandleTable,
    /// Every node read so far; nodes refer to each other by index into this list
    nodes: Vec<Node>,
    options: ReaderOptions,
    /// How many grammars we are currently nested inside of
    depth: usize,
}

impl<'a> ObjectStreamReader<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self::with_options(stream, ReaderOptions::default())
    }

    pub fn with_options(stream: &'a [u8], options: ReaderOptions) -> Self {
        Self {
            cursor: Cursor::new(stream),
            handles: HandleTable::new(),
            nodes: vec![],
            options,
            depth: 0,
        }
    }

    /// Validate the magic number and protocol version
    pub(crate) fn validate_header(&mut self) -> Result<(u16, u16), StreamError> {
        let magic = self.cursor.read_u16()?;
        if magic != STREAM_MAGIC {
            return Err(self.cursor.error(StreamErrorKind::MalformedHeader {
                field: "magic",
                found: magic,
                expected: STREAM_MAGIC,
            }));
        }

        let version = self.cursor.read_u16()?;
        if version != STREAM_VERSION {
            return Err(self.cursor.error(StreamErrorKind::MalformedHeader {
                field: "version",
                found: version,
                expected: STREAM_VERSION,
            }));
        }

        debug!(magic, version, "Valid stream header");
        Ok((magic, version))
    }

    /// Decode the whole stream
    ///
    /// The result holds every node in the stream; the top-level content is available from
    /// [`Stream::contents`]:
    ///
    /// ```txt
    /// Object(JavaObject { handle: 0x7e0001, class_desc: NodeId(0), .. })  // A new object
    /// ClassDesc(ClassDesc { handle: 0x7e0000, name: "Foo", .. })          // Its class, read first
    /// ```
    pub fn parse(mut self) -> Result<Stream, StreamError> {
        let (magic, version) = self.validate_header()?;
        let contents = self.read_contents()?;

        debug!(
            nodes = self.nodes.len(),
            contents = contents.len(),
            "Finished reading stream"
        );

        Ok(Stream {
            magic,
            version,
            nodes: self.nodes,
            contents,
            handles: self.handles,
        })
    }

    /// Read content nodes until the end of a block or the end of the stream
    fn read_contents(&mut self) -> Result<Vec<NodeId>, StreamError> {
        let mut out_v = vec![];

        while let Some(tag) = self.cursor.peek_byte() {
            if tag == TC_ENDBLOCKDATA {
                self.cursor.read_u8()?;
                break;
            }
            out_v.push(self.resolve_required(Family::Content)?);
        }

        Ok(out_v)
    }

    /// Decode the grammar in `family` that the next byte selects, or [`None`] if no grammar matches
    fn resolve(&mut self, family: Family) -> Result<Option<NodeId>, StreamError> {
        let Some(grammar) = self.cursor.peek_byte().and_then(|tag| family.select(tag)) else {
            return Ok(None);
        };

        if self.depth >= self.options.max_depth {
            return Err(self
                .cursor
                .error(StreamErrorKind::DepthLimitExceeded(self.options.max_depth)));
        }

        self.depth += 1;
        let result = self.read_grammar(grammar);
        self.depth -= 1;
        result.map(Some)
    }

    /// Decode the grammar in `family` that the next byte selects, failing if none matches
    fn resolve_required(&mut self, family: Family) -> Result<NodeId, StreamError> {
        if let Some(id) = self.resolve(family)? {
            return Ok(id);
        }

        Err(match self.cursor.peek_byte() {
            Some(tag) => self.cursor.error(StreamErrorKind::UnrecognizedTag {
                tag,
                context: family.describe(),
            }),
            None => self.cursor.error(StreamErrorKind::TruncatedInput {
                needed: 1,
                available: 0,
            }),
        })
    }

    fn read_grammar(&mut self, grammar: Grammar) -> Result<NodeId, StreamError> {
        trace!(offset = self.cursor.position(), ?grammar, "Reading node");

        // Skip the tag
        self.cursor.read_u8()?;

        match grammar {
            Grammar::NullReference => Ok(self.push(Node::Null)),
            Grammar::Reference => self.read_reference(),
            Grammar::ClassDesc => self.read_class_desc(),
            Grammar::Object => self.read_object(),
            Grammar::String => self.read_string(false),
            Grammar::Array => self.read_array(),
            Grammar::Class => self.read_class(),
            Grammar::BlockData => self.read_block_data(false),
            Grammar::Reset => {
                self.reset_handles();
                Ok(self.push(Node::Reset))
            }
            Grammar::BlockDataLong => self.read_block_data(true),
            Grammar::Exception => self.read_exception(),
            Grammar::LongString => self.read_string(true),
            Grammar::ProxyClassDesc => self.read_proxy_class_desc(),
            Grammar::Enum => self.read_enum(),
        }
    }

    /// Add a node that does not receive a handle
    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Add a node and assign it the next handle
    ///
    /// The node may be incomplete; callers fill in the rest of it once its children are read,
    /// so anything inside it that refers back to it sees the partially built node.
    fn assign(&mut self, build: impl FnOnce(u32) -> Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        let handle = self.handles.assign(id);
        self.nodes.push(build(handle));
        trace!(handle, node = id.0, "Assigned handle");
        id
    }

    fn reset_handles(&mut self) {
        debug!(
            offset = self.cursor.position(),
            discarded = self.handles.len(),
            "Resetting handles"
        );
        self.handles.reset();
    }

    fn unsupported(&self, feature: impl Into<String>) -> StreamError {
        self.cursor
            .error(StreamErrorKind::UnsupportedFeature(feature.into()))
    }

    /// Read a string with a 16 bit length that is stored inline, i.e. a class name
    fn read_name(&mut self) -> Result<String, StreamError> {
        let bytes = self.cursor.read_utf()?;
        mutf8::decode(bytes).ok_or_else(|| self.cursor.error(StreamErrorKind::InvalidString))
    }

    fn read_reference(&mut self) -> Result<NodeId, StreamError> {
        let handle = self.cursor.read_u32()?;
        let target = self
            .handles
            .resolve(handle)
            .ok_or_else(|| self.cursor.error(StreamErrorKind::UnresolvedReference(handle)))?;
        Ok(self.push(Node::Reference(BackReference { handle, target })))
    }

    fn read_class_desc(&mut self) -> Result<NodeId, StreamError> {
        let name = self.read_name()?;
        let serial_version_uid = self.cursor.read_u64()?;
        let flags = ClassDescFlags(self.cursor.read_u8()?);
        let field_count = self.cursor.read_u16()?;
        let fields = (0..field_count)
            .map(|_| self.read_field_desc())
            .collect::<Result<Vec<_>, _>>()?;

        trace!(%name, flags = flags.0, fields = fields.len(), "Read class descriptor");

        let id = self.assign(|handle| {
            Node::ClassDesc(ClassDesc {
                handle,
                name,
                serial_version_uid,
                flags,
                fields,
                annotation: vec![],
                super_class: None,
            })
        });

        let annotation = self.read_contents()?;
        let super_class = self.resolve(Family::ClassDesc)?;
        if let Some(Node::ClassDesc(desc)) = self.nodes.get_mut(id.0) {
            desc.annotation = annotation;
            desc.super_class = super_class;
        }

        Ok(id)
    }

    fn read_field_desc(&mut self) -> Result<FieldDesc, StreamError> {
        let type_code = self.cursor.read_u8()?;
        let rule = FieldRule::from_code(type_code).ok_or_else(|| {
            self.cursor.error(StreamErrorKind::UnrecognizedTag {
                tag: type_code,
                context: "field type",
            })
        })?;
        let name = self.read_name()?;
        let class_name = match rule {
            FieldRule::Object => Some(self.read_name()?),
            FieldRule::Primitive(_) => None,
        };

        Ok(FieldDesc {
            type_code,
            name,
            class_name,
            rule,
        })
    }

    fn read_proxy_class_desc(&mut self) -> Result<NodeId, StreamError> {
        let id = self.assign(|handle| {
            Node::ProxyClassDesc(ProxyClassDesc {
                handle,
                interfaces: vec![],
                annotation: vec![],
                super_class: None,
            })
        });

        let count = self.cursor.read_u32()?;
        let interfaces = (0..count)
            .map(|_| self.read_name())
            .collect::<Result<Vec<_>, _>>()?;
        let annotation = self.read_contents()?;
        let super_class = self.resolve(Family::ClassDesc)?;

        if let Some(Node::ProxyClassDesc(desc)) = self.nodes.get_mut(id.0) {
            desc.interfaces = interfaces;
            desc.annotation = annotation;
            desc.super_class = super_class;
        }

        Ok(id)
    }

    /// Get the flags and fields from a class descriptor slot. Because reading values mutates self,
    /// holding a reference into the node list is disallowed; thus, we return a clone of the cached data.
    fn layout(&self, class_desc: NodeId) -> Result<Layout, StreamError> {
        match follow(&self.nodes, class_desc) {
            Some(Node::ClassDesc(desc)) => Ok(Layout {
                flags: desc.flags,
                fields: desc.fields.clone(),
            }),
            // Proxy instances carry no fields of their own
            Some(Node::ProxyClassDesc(_)) => Ok(Layout {
                flags: ClassDescFlags(ClassDescFlags::SERIALIZABLE),
                fields: vec![],
            }),
            Some(other) => Err(self.unsupported(format!("{} as a class descriptor", other.kind()))),
            None => Err(self.unsupported("missing class descriptor")),
        }
    }

    /// Get the superclass slot of a class descriptor slot
    fn super_class_of(&self, class_desc: NodeId) -> Option<NodeId> {
        match follow(&self.nodes, class_desc)? {
            Node::ClassDesc(desc) => desc.super_class,
            Node::ProxyClassDesc(desc) => desc.super_class,
            _ => None,
        }
    }

    /// Values are only read from the object's own class. If a serializable ancestor also wrote data,
    /// that data would precede ours in the stream, so refuse to guess at its layout.
    fn check_inherited_fields(&self, class_desc: NodeId) -> Result<(), StreamError> {
        let mut current = self.super_class_of(class_desc);
        let mut steps = 0;

        while let Some(id) = current {
            // Guard against a superclass chain that refers back to itself
            steps += 1;
            if steps > self.nodes.len() {
                break;
            }

            match follow(&self.nodes, id) {
                Some(Node::ClassDesc(desc)) => {
                    if desc.flags.is_serializable()
                        && (!desc.fields.is_empty() || desc.flags.has_write_method())
                    {
                        return Err(
                            self.unsupported(format!("data inherited from {}", desc.name))
                        );
                    }
                    current = desc.super_class;
                }
                Some(Node::ProxyClassDesc(desc)) => current = desc.super_class,
                _ => break,
            }
        }

        Ok(())
    }

    fn read_object(&mut self) -> Result<NodeId, StreamError> {
        let class_desc = self.resolve_required(Family::ClassDesc)?;
        let id = self.assign(|handle| {
            Node::Object(JavaObject {
                handle,
                class_desc,
                values: vec![],
                annotation: None,
            })
        });

        let layout = self.layout(class_desc)?;
        let mut values = vec![];
        let mut annotation = None;

        if layout.flags.is_serializable() {
            self.check_inherited_fields(class_desc)?;
            values = layout
                .fields
                .iter()
                .map(|field| self.read_value(field.rule))
                .collect::<Result<Vec<_>, _>>()?;
            if layout.flags.has_write_method() {
                annotation = Some(self.read_contents()?);
            }
        } else if layout.flags.is_externalizable() {
            if !layout.flags.has_block_data() {
                return Err(self.unsupported("externalizable data without block data"));
            }
            annotation = Some(self.read_contents()?);
        }

        if let Some(Node::Object(object)) = self.nodes.get_mut(id.0) {
            object.values = values;
            object.annotation = annotation;
        }

        Ok(id)
    }

    fn read_value(&mut self, rule: FieldRule) -> Result<Value, StreamError> {
        match rule {
            FieldRule::Primitive(primitive) => self.read_primitive(primitive),
            FieldRule::Object => Ok(Value::Object(self.resolve_required(Family::Object)?)),
        }
    }

    /// Read a primitive value of the width its type code implies
    fn read_primitive(&mut self, primitive: Primitive) -> Result<Value, StreamError> {
        let raw = self.cursor.read_be(primitive.width())?;
        Ok(match primitive {
            Primitive::Byte => Value::Byte(raw as u8 as i8),
            Primitive::Char => Value::Char(raw as u16),
            Primitive::Double => Value::Double(f64::from_bits(raw)),
            Primitive::Float => Value::Float(f32::from_bits(raw as u32)),
            Primitive::Int => Value::Int(raw as u32 as i32),
            Primitive::Long => Value::Long(raw as i64),
            Primitive::Short => Value::Short(raw as u16 as i16),
            Primitive::Boolean => Value::Boolean(raw != 0),
        })
    }

    /// Array class names are JVM type signatures, i.e. `[I` or `[Ljava.lang.String;`,
    /// so the character after the `[` tells us how each element is stored
    fn element_rule(&self, class_desc: NodeId) -> Result<FieldRule, StreamError> {
        let Some(Node::ClassDesc(desc)) = follow(&self.nodes, class_desc) else {
            return Err(self.unsupported("array without a class descriptor"));
        };

        let rule = match desc.name.as_bytes() {
            [b'[', code, ..] => FieldRule::from_code(*code),
            _ => None,
        };
        rule.ok_or_else(|| self.unsupported(format!("array elements of {}", desc.name)))
    }

    fn read_array(&mut self) -> Result<NodeId, StreamError> {
        let class_desc = self.resolve_required(Family::ClassDesc)?;
        let id = self.assign(|handle| {
            Node::Array(JavaArray {
                handle,
                class_desc,
                elements: vec![],
            })
        });

        let size = self.cursor.read_u32()?;
        let rule = self.element_rule(class_desc)?;

        // The size comes from the stream, so do not trust it for the allocation
        let mut elements = Vec::with_capacity((size as usize).min(self.cursor.remaining()));
        for _ in 0..size {
            elements.push(self.read_value(rule)?);
        }

        if let Some(Node::Array(array)) = self.nodes.get_mut(id.0) {
            array.elements = elements;
        }

        Ok(id)
    }

    fn read_class(&mut self) -> Result<NodeId, StreamError> {
        let class_desc = self.resolve_required(Family::ClassDesc)?;
        Ok(self.assign(|handle| Node::Class(JavaClass { handle, class_desc })))
    }

    fn read_enum(&mut self) -> Result<NodeId, StreamError> {
        let class_desc = self.resolve_required(Family::ClassDesc)?;
        let id = self.assign(|handle| {
            Node::Enum(JavaEnum {
                handle,
                class_desc,
                constant: String::new(),
            })
        });

        let name = self.read_name()?;
        if let Some(Node::Enum(constant)) = self.nodes.get_mut(id.0) {
            constant.constant = name;
        }

        Ok(id)
    }

    fn read_string(&mut self, long: bool) -> Result<NodeId, StreamError> {
        let id = self.assign(|handle| {
            Node::String(JavaString {
                handle,
                long,
                data: vec![],
            })
        });

        let data = if long {
            self.cursor.read_long_utf()?
        } else {
            self.cursor.read_utf()?
        };
        if let Some(Node::String(string)) = self.nodes.get_mut(id.0) {
            string.data = data.to_vec();
        }

        Ok(id)
    }

    fn read_block_data(&mut self, long: bool) -> Result<NodeId, StreamError> {
        let length = if long {
            self.cursor.read_u32()? as usize
        } else {
            usize::from(self.cursor.read_u8()?)
        };
        let data = self.cursor.read_exact(length)?.to_vec();
        Ok(self.push(Node::BlockData(BlockData { long, data })))
    }

    fn read_exception(&mut self) -> Result<NodeId, StreamError> {
        self.reset_handles();
        let throwable = self.resolve_required(Family::Object)?;
        self.reset_handles();
        Ok(self.push(Node::Exception(throwable)))
    }
}
