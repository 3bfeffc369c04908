/*!
 Options that control how a stream is read.
*/

/// Default limit for [`ReaderOptions::max_depth`]
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Options for reading serialization streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// How deeply nodes may nest inside each other before the stream is rejected
    pub max_depth: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum nesting depth
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
