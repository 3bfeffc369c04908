/*!
 This module defines common utilities used to decode serialization streams.
*/

pub mod mutf8;
pub mod stream;
