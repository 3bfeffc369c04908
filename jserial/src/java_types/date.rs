/*!
 Instances of [`java.util.Date`](https://docs.oracle.com/javase/8/docs/api/java/util/Date.html).

 A `Date` has no serializable fields; it writes its time as milliseconds since the Unix epoch.
*/

use chrono::DateTime;
use json::{from, JsonValue};

use crate::{
    error::materialize::MaterializeError,
    java_types::{read_i64, Handler, Instance, Materializer},
    util::stream::models::JavaObject,
};

pub const CLASS_NAME: &str = "java.util.Date";

pub const HANDLER: Handler = Handler { base, extend };

fn base() -> JsonValue {
    JsonValue::Null
}

fn malformed(reason: &str) -> MaterializeError {
    MaterializeError::MalformedAnnotation {
        class: CLASS_NAME.to_string(),
        reason: reason.to_string(),
    }
}

/// Render epoch milliseconds as an RFC 3339 timestamp in UTC
pub fn format_millis(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|date| date.to_rfc3339())
}

fn extend(
    materializer: &mut Materializer<'_>,
    object: &JavaObject,
    instance: &mut Instance,
) -> Result<(), MaterializeError> {
    let millis = object
        .annotation
        .as_deref()
        .and_then(|annotation| annotation.first())
        .and_then(|id| materializer.block_data(*id))
        .and_then(|block| read_i64(block, 0))
        .ok_or_else(|| malformed("missing time block"))?;

    instance.fields["time"] = from(millis);
    instance.value = from(format_millis(millis).ok_or_else(|| malformed("time is out of range"))?);
    Ok(())
}
