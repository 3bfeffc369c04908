/*!
 The table of handles assigned to objects as they are read from the stream.
*/

use crate::util::stream::models::NodeId;

/// The first handle assigned in a stream; later handles count up from here
pub const BASE_WIRE_HANDLE: u32 = 0x7E_0000;

/// As we parse the stream, build a table of seen objects to reference in the future
///
/// The first time an object is seen it is present in the stream literally,
/// but afterwards it is only referenced by its handle, in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleTable {
    entries: Vec<NodeId>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle the next call to [`HandleTable::assign`] will return
    pub fn next_handle(&self) -> u32 {
        BASE_WIRE_HANDLE.wrapping_add(self.entries.len() as u32)
    }

    /// Record `node` and get its handle
    pub fn assign(&mut self, node: NodeId) -> u32 {
        let handle = self.next_handle();
        self.entries.push(node);
        handle
    }

    /// Get the node a handle was assigned to, if the handle was assigned since the last reset
    pub fn resolve(&self, handle: u32) -> Option<NodeId> {
        let index = handle.checked_sub(BASE_WIRE_HANDLE)?;
        self.entries.get(index as usize).copied()
    }

    /// Discard every assigned handle
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
