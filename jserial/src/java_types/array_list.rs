/*!
 Instances of [`java.util.ArrayList`](https://docs.oracle.com/javase/8/docs/api/java/util/ArrayList.html).

 The `size` field is written normally, then a block holding the capacity, then each element.
*/

use json::{from, JsonValue};
use tracing::warn;

use crate::{
    error::materialize::MaterializeError,
    java_types::{read_u32, Handler, Instance, Materializer},
    util::stream::models::JavaObject,
};

pub const CLASS_NAME: &str = "java.util.ArrayList";

pub const HANDLER: Handler = Handler {
    base: JsonValue::new_array,
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
    let Some((header, items)) = annotation.split_first() else {
        return Err(malformed("missing capacity block"));
    };

    let capacity = materializer
        .block_data(*header)
        .and_then(|block| read_u32(block, 0))
        .ok_or_else(|| malformed("first item is not a capacity block"))?;
    instance.fields["capacity"] = from(capacity);

    let elements = items
        .iter()
        .map(|id| materializer.convert(*id))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(size) = instance.fields["size"].as_usize() {
        if size != elements.len() {
            warn!(size, elements = elements.len(), "ArrayList size does not match its elements");
        }
    }

    instance.value = JsonValue::Array(elements);
    Ok(())
}
