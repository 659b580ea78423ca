//! Generation-tagged resource handles.
//!
//! A `ResourceHandle` is a `slotmap` key: a slot index plus the version
//! stamped into that slot when the handle was issued. Removing an entry
//! bumps the slot version, so every handle issued before the removal
//! stops resolving even after the slot is reused.

use slotmap::{new_key_type, Key};

new_key_type! {
    /// Opaque handle to a resource registered in a `ResourceRegistry`
    pub struct ResourceHandle;
}

impl ResourceHandle {
    /// Index of the slot this handle points at
    pub fn slot_index(&self) -> u32 {
        (self.data().as_ffi() & 0xFFFF_FFFF) as u32
    }

    /// Generation stamped into the handle when it was issued
    pub fn generation(&self) -> u32 {
        (self.data().as_ffi() >> 32) as u32
    }
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
