/*!
 Turn decoded Java objects into native values.

 A [`Registry`] maps fully qualified class names to [`Handler`]s. Each top-level object in a
 [`Stream`] is folded into an [`Instance`]: its field values are converted, then the handler
 registered for its class builds the native representation, usually by reading the data the
 class wrote with `writeObject`.

 Classes without a handler fall back to a map of their field values.

 Objects and arrays that are referenced more than once are converted once and copied
 afterwards. The total number of values produced is capped by [`Registry::with_max_values`].
*/

pub mod array_list;
pub mod date;
pub mod hash_map;

use std::{collections::HashMap, io::Read};

use base64::{prelude::BASE64_STANDARD, Engine};
use json::{from, object, JsonValue};
use tracing::{debug, warn};

use crate::{
    error::materialize::MaterializeError,
    util::stream::{
        models::{JavaObject, Node, NodeId, Stream, Value},
        parser::ObjectStreamReader,
    },
};

/// A Java object converted to native data
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// The class name without its package, i.e. `HashMap`
    pub class_name: String,
    /// The fully qualified class name, i.e. `java.util.HashMap`
    pub qualified_name: String,
    /// Field names mapped to their converted values, plus anything a handler read from the class data
    pub fields: JsonValue,
    /// The native representation built by the class's [`Handler`]
    pub value: JsonValue,
}

/// Populates an [`Instance`] from the object it was built from
pub type Extend =
    fn(&mut Materializer<'_>, &JavaObject, &mut Instance) -> Result<(), MaterializeError>;

/// Describes how to build the native value for instances of a class
#[derive(Clone, Copy)]
pub struct Handler {
    /// Build the empty native value
    pub base: fn() -> JsonValue,
    /// Fill in the native value
    pub extend: Extend,
}

impl Handler {
    /// Used for classes that are not registered: the value is the field map itself
    pub const GENERIC: Handler = Handler {
        base: JsonValue::new_object,
        extend: copy_fields,
    };
}

fn copy_fields(
    _: &mut Materializer<'_>,
    _: &JavaObject,
    instance: &mut Instance,
) -> Result<(), MaterializeError> {
    instance.value = instance.fields.clone();
    Ok(())
}

/// Default limit for [`Registry::with_max_values`]
pub const DEFAULT_MAX_VALUES: usize = 1 << 20;

/// Maps fully qualified class names to the [`Handler`] used for their instances
#[derive(Clone)]
pub struct Registry {
    handlers: HashMap<String, Handler>,
    /// How many native values a single stream may produce
    max_values: usize,
}

impl Default for Registry {
    /// A registry with handlers for the built-in collection and date types
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(hash_map::CLASS_NAME, hash_map::HANDLER);
        registry.register(array_list::CLASS_NAME, array_list::HANDLER);
        registry.register(date::CLASS_NAME, date::HANDLER);
        registry
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry without any handlers
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            max_values: DEFAULT_MAX_VALUES,
        }
    }

    /// Set the maximum number of native values materializing a stream may produce
    #[must_use]
    pub fn with_max_values(mut self, max_values: usize) -> Self {
        self.max_values = max_values;
        self
    }

    /// Use `handler` for instances of `class_name`, returning the handler it replaced
    pub fn register(&mut self, class_name: impl Into<String>, handler: Handler) -> Option<Handler> {
        self.handlers.insert(class_name.into(), handler)
    }

    pub fn get(&self, class_name: &str) -> Option<Handler> {
        self.handlers.get(class_name).copied()
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.handlers.contains_key(class_name)
    }

    /// Materialize every top-level object in the stream, in order
    ///
    /// Any other kind of top-level content, including a back-reference, fails with
    /// [`MaterializeError::UnexpectedContentKind`].
    pub fn materialize(&self, stream: &Stream) -> Result<Vec<Instance>, MaterializeError> {
        let mut materializer = Materializer::new(stream, self);

        stream
            .contents()
            .iter()
            .enumerate()
            .map(|(index, id)| {
                match stream.node(*id) {
                    Some(Node::Object(object)) => materializer.instance(*id, object),
                    Some(other) => Err(MaterializeError::UnexpectedContentKind {
                        index,
                        kind: other.kind(),
                    }),
                    None => Err(MaterializeError::UnexpectedContentKind {
                        index,
                        kind: "missing node",
                    }),
                }
            })
            .collect()
    }
}

/// Converts nodes of a single stream into native values
pub struct Materializer<'a> {
    stream: &'a Stream,
    registry: &'a Registry,
    /// Objects and arrays currently being converted, used to break cycles
    visiting: Vec<NodeId>,
    /// Finished objects and arrays, with the number of values each one produced
    converted: HashMap<NodeId, (JsonValue, usize)>,
    /// Number of values produced so far
    emitted: usize,
}

impl<'a> Materializer<'a> {
    pub fn new(stream: &'a Stream, registry: &'a Registry) -> Self {
        Self {
            stream,
            registry,
            visiting: vec![],
            converted: HashMap::new(),
            emitted: 0,
        }
    }

    /// The stream the nodes come from
    pub fn stream(&self) -> &'a Stream {
        self.stream
    }

    /// Fold an object's fields and build its native value with the handler for its class
    pub fn instance(
        &mut self,
        id: NodeId,
        object: &'a JavaObject,
    ) -> Result<Instance, MaterializeError> {
        let stream = self.stream;
        let qualified_name = stream
            .class_name(object)
            .map(str::to_string)
            .unwrap_or_default();
        let class_name = qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&qualified_name)
            .to_string();

        let handler = self.registry.get(&qualified_name).unwrap_or_else(|| {
            debug!(class = %qualified_name, "No handler registered, using field values");
            Handler::GENERIC
        });

        self.visiting.push(id);
        let result = self.build(handler, object, class_name, qualified_name);
        self.visiting.pop();
        result
    }

    fn build(
        &mut self,
        handler: Handler,
        object: &'a JavaObject,
        class_name: String,
        qualified_name: String,
    ) -> Result<Instance, MaterializeError> {
        let stream = self.stream;
        let mut fields = object! {};
        for (name, value) in stream.fields(object) {
            fields[name] = self.convert_value(value)?;
        }

        let mut instance = Instance {
            class_name,
            qualified_name,
            fields,
            value: (handler.base)(),
        };
        (handler.extend)(self, object, &mut instance)?;
        Ok(instance)
    }

    /// Convert a field or array element to a native value
    pub fn convert_value(&mut self, value: &Value) -> Result<JsonValue, MaterializeError> {
        if let Value::Object(id) = value {
            return self.convert(*id);
        }

        self.charge(1)?;
        Ok(match value {
            Value::Byte(byte) => from(*byte),
            Value::Char(unit) => from(String::from_utf16_lossy(&[*unit])),
            Value::Double(double) => from(*double),
            Value::Float(float) => from(*float),
            Value::Int(int) => from(*int),
            Value::Long(long) => from(*long),
            Value::Short(short) => from(*short),
            Value::Boolean(boolean) => from(*boolean),
            Value::Object(_) => JsonValue::Null,
        })
    }

    /// Convert any node to a native value
    pub fn convert(&mut self, id: NodeId) -> Result<JsonValue, MaterializeError> {
        let stream = self.stream;
        let Some(node) = stream.node(id) else {
            return Ok(JsonValue::Null);
        };

        match node {
            Node::Reference(reference) => self.convert(reference.target),
            Node::Class(class) => self.convert(class.class_desc),
            Node::Exception(throwable) => self.convert(*throwable),
            Node::Object(object) => self.shared(id, object.handle, |materializer| {
                Ok(materializer.instance(id, object)?.value)
            }),
            Node::Array(array) => self.shared(id, array.handle, |materializer| {
                materializer.visiting.push(id);
                let elements = array
                    .elements
                    .iter()
                    .map(|element| materializer.convert_value(element))
                    .collect::<Result<Vec<_>, _>>();
                materializer.visiting.pop();
                Ok(JsonValue::Array(elements?))
            }),
            leaf => {
                self.charge(1)?;
                Ok(match leaf {
                    Node::String(string) => from(string.to_string_lossy()),
                    Node::Enum(constant) => from(constant.constant.as_str()),
                    Node::ClassDesc(desc) => from(desc.name.as_str()),
                    Node::ProxyClassDesc(desc) => JsonValue::Array(
                        desc.interfaces
                            .iter()
                            .map(|name| from(name.as_str()))
                            .collect(),
                    ),
                    Node::BlockData(block) => from(BASE64_STANDARD.encode(&block.data)),
                    _ => JsonValue::Null,
                })
            }
        }
    }

    /// Convert an object or array once, then reuse the result wherever it is referenced again
    fn shared(
        &mut self,
        id: NodeId,
        handle: u32,
        build: impl FnOnce(&mut Self) -> Result<JsonValue, MaterializeError>,
    ) -> Result<JsonValue, MaterializeError> {
        if let Some(cost) = self.converted.get(&id).map(|(_, cost)| *cost) {
            self.charge(cost)?;
            return Ok(self
                .converted
                .get(&id)
                .map(|(value, _)| value.clone())
                .unwrap_or(JsonValue::Null));
        }

        if self.is_visiting(id, handle) {
            self.charge(1)?;
            return Ok(JsonValue::Null);
        }

        let start = self.emitted;
        self.charge(1)?;
        let value = build(self)?;
        let cost = self.emitted.saturating_sub(start);
        self.converted.insert(id, (value.clone(), cost));
        Ok(value)
    }

    /// Count values toward the registry's limit
    fn charge(&mut self, count: usize) -> Result<(), MaterializeError> {
        self.emitted = self.emitted.saturating_add(count);
        if self.emitted > self.registry.max_values {
            return Err(MaterializeError::TooManyValues(self.registry.max_values));
        }
        Ok(())
    }

    fn is_visiting(&self, id: NodeId, handle: u32) -> bool {
        let cyclic = self.visiting.contains(&id);
        if cyclic {
            warn!(handle, "Object refers to itself, rendering as null");
        }
        cyclic
    }

    /// Get the bytes of a block data node, looking through back-references
    pub fn block_data(&self, id: NodeId) -> Option<&'a [u8]> {
        match self.stream.resolve(id)? {
            Node::BlockData(block) => Some(&block.data),
            _ => None,
        }
    }
}

/// Decode a stream and materialize its top-level objects with the default [`Registry`]
pub fn unserialize(bytes: &[u8]) -> Result<Vec<Instance>, MaterializeError> {
    let stream = ObjectStreamReader::new(bytes).parse()?;
    Registry::default().materialize(&stream)
}

/// Read a whole stream from `reader`, then [`unserialize`] it
pub fn unserialize_reader<R: Read>(mut reader: R) -> Result<Vec<Instance>, MaterializeError> {
    let mut bytes = vec![];
    reader.read_to_end(&mut bytes)?;
    unserialize(&bytes)
}

/// Read a big-endian `u32` from block data
pub(crate) fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let end = at.checked_add(4)?;
    bytes.get(at..end)?.try_into().ok().map(u32::from_be_bytes)
}

/// Read a big-endian `i64` from block data
pub(crate) fn read_i64(bytes: &[u8], at: usize) -> Option<i64> {
    let end = at.checked_add(8)?;
    bytes.get(at..end)?.try_into().ok().map(i64::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use std::env::current_dir;
    use std::fs::File;

    use json::JsonValue;

    use crate::{
        error::materialize::MaterializeError,
        java_types::{read_i64, read_u32, unserialize, unserialize_reader, Registry},
        util::stream::parser::ObjectStreamReader,
    };

    #[test]
    fn test_generic_handler() {
        let bytes = include_bytes!("../../test_data/javaserial/Primitives");
        let stream = ObjectStreamReader::new(bytes).parse().unwrap();
        let instances = Registry::empty().materialize(&stream).unwrap();

        assert_eq!(instances.len(), 2);

        let first = &instances[0];
        assert_eq!(first.class_name, "Sample");
        assert_eq!(first.qualified_name, "com.example.Sample");
        assert_eq!(first.fields["b"].as_i8(), Some(-5));
        assert_eq!(first.fields["c"].as_str(), Some("A"));
        assert_eq!(first.fields["d"].as_f64(), Some(2.5));
        assert_eq!(first.fields["f"].as_f32(), Some(-1.5));
        assert_eq!(first.fields["i"].as_i32(), Some(100_000));
        assert_eq!(first.fields["j"].as_i64(), Some(-9_000_000_000));
        assert_eq!(first.fields["s"].as_i16(), Some(-300));
        assert_eq!(first.fields["z"].as_bool(), Some(true));
        assert_eq!(first.fields["name"].as_str(), Some("Kiwi"));
        assert_eq!(first.value, first.fields);

        let second = &instances[1];
        assert_eq!(second.fields["c"].as_str(), Some("\u{263A}"));
        assert_eq!(second.fields["z"].as_bool(), Some(false));
        assert!(second.fields["name"].is_null());
    }

    #[test]
    fn test_unserialize_reader() {
        let path = current_dir()
            .unwrap()
            .as_path()
            .join("test_data/javaserial/Primitives");
        let file = File::open(path).unwrap();
        let instances = unserialize_reader(file).unwrap();

        assert_eq!(instances.len(), 2);
    }

    #[test]
    fn cant_unserialize_top_level_array() {
        let bytes = include_bytes!("../../test_data/javaserial/Arrays");
        let error = unserialize(bytes).unwrap_err();

        assert!(matches!(
            error,
            MaterializeError::UnexpectedContentKind {
                index: 0,
                kind: "array"
            }
        ));
    }

    #[test]
    fn cant_unserialize_bad_header() {
        let error = unserialize(&[0x00, 0x00, 0x00, 0x05]).unwrap_err();

        assert!(matches!(error, MaterializeError::Stream(_)));
    }

    #[test]
    fn test_unserialize_empty() {
        let instances = unserialize(&[0xAC, 0xED, 0x00, 0x05]).unwrap();

        assert!(instances.is_empty());
    }

    #[test]
    fn test_registry_contents() {
        let registry = Registry::default();
        assert!(registry.contains("java.util.HashMap"));
        assert!(registry.contains("java.util.ArrayList"));
        assert!(registry.contains("java.util.Date"));
        assert!(!registry.contains("com.example.Sample"));

        assert!(!Registry::empty().contains("java.util.HashMap"));
    }

    #[test]
    fn test_read_block_numbers() {
        let bytes = [0, 0, 0, 16, 0, 0, 0, 2];

        assert_eq!(read_u32(&bytes, 0), Some(16));
        assert_eq!(read_u32(&bytes, 4), Some(2));
        assert_eq!(read_u32(&bytes, 5), None);
        assert_eq!(read_u32(&bytes, usize::MAX), None);
        assert_eq!(read_i64(&bytes, 0), Some(0x0000_0010_0000_0002));
        assert_eq!(read_i64(&bytes, 1), None);
    }

    #[test]
    fn test_block_data_renders_as_base64() {
        let bytes = [0xAC, 0xED, 0x00, 0x05, 0x77, 0x03, 0x01, 0x02, 0x03];
        let stream = ObjectStreamReader::new(&bytes).parse().unwrap();
        let registry = Registry::default();
        let mut materializer = super::Materializer::new(&stream, &registry);

        assert_eq!(
            materializer.convert(stream.contents()[0]).unwrap(),
            JsonValue::from("AQID")
        );
    }
}
