//! Whole-allocator consistency checks shared by scenarios and storms.

use segalloc_core::Allocator;

/// Free extents plus checked-out chunks must tile `[start, end)` exactly.
///
/// Returns a description of the first gap or overlap found.
pub fn check_partition(allocator: &Allocator) -> Result<(), String> {
    let mut extents = allocator.free_extents();
    extents.extend(allocator.outstanding_chunks());
    extents.sort_unstable_by_key(|c| c.address);

    let mut cursor = allocator.start_address();
    for chunk in &extents {
        if chunk.address < cursor {
            return Err(format!("chunk {chunk} overlaps extent ending at {cursor:#x}"));
        }
        if chunk.address > cursor {
            return Err(format!("gap [{cursor:#x}, {:#x}) is unaccounted", chunk.address));
        }
        cursor = chunk.end();
    }
    if cursor != allocator.end_address() {
        return Err(format!(
            "extents end at {cursor:#x}, range ends at {:#x}",
            allocator.end_address()
        ));
    }
    Ok(())
}

/// Free plus outstanding bytes must equal the capacity.
pub fn check_conservation(allocator: &Allocator) -> Result<(), String> {
    let free = allocator.free_byte_count();
    let outstanding = allocator.outstanding_byte_count();
    if free + outstanding != allocator.capacity() {
        return Err(format!(
            "free {free} + outstanding {outstanding} != capacity {}",
            allocator.capacity()
        ));
    }
    Ok(())
}
