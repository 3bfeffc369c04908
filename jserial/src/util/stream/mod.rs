/*!
 Contains logic and data structures used to decode Java object serialization streams.

 ## Overview

 The format is a binary protocol written by Java's `ObjectOutputStream`. A stream is a magic number,
 a version, and a sequence of tagged nodes: class descriptors, objects, arrays, strings, enum
 constants, and opaque block data written by classes with custom serialization logic.

 Each object, class descriptor, array, string, and enum constant receives a handle the first time
 it is seen. Later occurrences of the same object are written only as a back-reference to that
 handle, so the reader keeps a [`handles::HandleTable`] for the lifetime of the stream.

 ## Features

 - Pure Rust implementation with no dependency on a JVM
 - Robust error handling for malformed or truncated streams, reporting the byte offset of the failure
*/

pub mod cursor;
pub mod handles;
pub mod models;
pub mod options;
pub mod parser;
