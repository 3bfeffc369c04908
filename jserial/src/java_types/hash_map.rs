/*!
 Instances of [`java.util.HashMap`](https://docs.oracle.com/javase/8/docs/api/java/util/HashMap.html).

 After its fields, a `HashMap` writes a block holding its bucket capacity and entry count,
 followed by each key and then its value.
*/

use json::{from, JsonValue};
use tracing::warn;

use crate::{
    error::materialize::MaterializeError,
    java_types::{read_u32, Handler, Instance, Materializer},
    util::stream::models::JavaObject,
};

pub const CLASS_NAME: &str = "java.util.HashMap";

pub const HANDLER: Handler = Handler {
    base: JsonValue::new_object,
    extend,
};

fn malformed(reason: &str) -> MaterializeError {
    MaterializeError::MalformedAnnotation {
        class: CLASS_NAME.to_string(),
        reason: reason.to_string(),
    }
}

fn extend(
    materializer: &mut Materializer<'_>,
    object: &JavaObject,
    instance: &mut Instance,
) -> Result<(), MaterializeError> {
    let annotation = object.annotation.as_deref().unwrap_or_default();
    let Some((header, entries)) = annotation.split_first() else {
        return Err(malformed("missing size block"));
    };

    let block = materializer
        .block_data(*header)
        .ok_or_else(|| malformed("first item is not block data"))?;
    let (Some(capacity), Some(size)) = (read_u32(block, 0), read_u32(block, 4)) else {
        return Err(malformed("size block is too short"));
    };
    instance.fields["capacity"] = from(capacity);
    instance.fields["size"] = from(size);

    if entries.len() % 2 != 0 {
        return Err(malformed("key without a value"));
    }
    if entries.len() / 2 != size as usize {
        warn!(
            size,
            entries = entries.len() / 2,
            "HashMap size does not match its entries"
        );
    }

    for pair in entries.chunks_exact(2) {
        let key = materializer.convert(pair[0])?;
        let value = materializer.convert(pair[1])?;

        // Keys that are not strings are stored by their JSON text
        let key = match key.as_str() {
            Some(text) => text.to_string(),
            None => key.dump(),
        };
        instance.value[key.as_str()] = value;
    }

    Ok(())
}
