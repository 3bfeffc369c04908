/*!
 Errors that can happen when decoding or materializing Java serialization data.
*/

pub mod materialize;
pub mod stream;
