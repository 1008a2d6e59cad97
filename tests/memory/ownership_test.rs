/*!
 * Ownership Tests
 * Explicit allocation, one-shot free and use-after-free detection
 */

use relaxnative::memory::MemoryError;
use relaxnative::{alloc, alloc_with, free, AllocOptions, NativeBuffer, NativePointer, Ownership, Value};

#[test]
fn test_alloc_reports_size_and_address() {
    let buffer = alloc(64).unwrap();
    assert_eq!(buffer.size().unwrap(), 64);
    assert_ne!(buffer.address().unwrap(), 0);
    assert_eq!(buffer.address().unwrap() % 16, 0, "allocations are 16-byte aligned");
    assert_eq!(buffer.ownership(), Ownership::Caller);
    assert_eq!(buffer.to_vec().unwrap(), vec![0u8; 64], "allocations start zeroed");
    buffer.free().unwrap();
}

#[test]
fn test_zero_size_rejected() {
    let err = alloc(0).unwrap_err();
    assert_eq!(err.name(), "TypeError");
}

#[test]
fn test_fractional_size_rejected() {
    assert!(NativeBuffer::alloc_f64(3.5, AllocOptions::default()).is_err());
    assert!(NativeBuffer::alloc_f64(-1.0, AllocOptions::default()).is_err());
    let buffer = NativeBuffer::alloc_f64(8.0, AllocOptions::auto_free()).unwrap();
    assert_eq!(buffer.size().unwrap(), 8);
}

#[test]
fn test_write_then_read_back() {
    let buffer = alloc(8).unwrap();
    buffer.write(&[1, 2, 3], 2).unwrap();
    assert_eq!(buffer.bytes(0, None).unwrap(), vec![0, 0, 1, 2, 3, 0, 0, 0]);
    assert_eq!(buffer.u8(2, Some(3)).unwrap(), vec![1, 2, 3]);

    let err = buffer.write(&[0; 4], 6).unwrap_err();
    assert_eq!(err.name(), "RangeError");
    free(&buffer).unwrap();
}

#[test]
fn test_free_is_exactly_once() {
    let buffer = alloc(16).unwrap();
    buffer.free().unwrap();

    let second = buffer.free().unwrap_err();
    assert_eq!(second, MemoryError::DoubleFree);
    assert_eq!(second.name(), "InvalidFreeError");
    assert_eq!(second.to_string(), "Double-free: NativeBuffer already freed");
}

#[test]
fn test_every_operation_after_free_fails() {
    let buffer = alloc(16).unwrap();
    let clone = buffer.clone();
    buffer.free().unwrap();

    assert!(clone.is_freed());
    assert_eq!(clone.address().unwrap_err().name(), "UseAfterFreeError");
    assert_eq!(clone.size().unwrap_err().name(), "UseAfterFreeError");
    assert_eq!(clone.write(&[1], 0).unwrap_err().name(), "UseAfterFreeError");
    assert_eq!(clone.u32(0, None).unwrap_err().name(), "UseAfterFreeError");
    assert_eq!(clone.to_vec().unwrap_err(), MemoryError::UseAfterFree);
}

#[test]
fn test_metadata_survives_free() {
    let buffer = alloc_with(8, AllocOptions::auto_free()).unwrap();
    buffer.free().unwrap();

    // Metadata accessors keep answering; region accessors do not
    assert_eq!(buffer.ownership(), Ownership::Caller);
    assert!(buffer.auto_free());
    assert!(buffer.is_freed());
    assert_eq!(buffer.info().unwrap_err().name(), "UseAfterFreeError");
}

#[test]
fn test_typed_views_check_alignment_and_bounds() {
    let buffer = alloc(16).unwrap();
    buffer.write_slice::<u32>(0, &[7, 8, 9, 10]).unwrap();

    assert_eq!(buffer.u32(4, None).unwrap(), vec![8, 9, 10]);
    assert_eq!(buffer.u32(4, Some(2)).unwrap(), vec![8, 9]);

    let misaligned = buffer.u32(2, None).unwrap_err();
    assert_eq!(misaligned.name(), "RangeError");
    assert_eq!(misaligned.to_string(), "offset must be aligned to 4 bytes (got 2)");

    assert_eq!(buffer.f64(8, Some(2)).unwrap_err().name(), "RangeError");
    assert_eq!(buffer.u8(17, None).unwrap_err().name(), "RangeError");
    assert!(buffer.u8(16, None).unwrap().is_empty());
    buffer.free().unwrap();
}

#[test]
fn test_native_pointer_cannot_be_freed() {
    let pointer = NativePointer::borrowed(0x1000).unwrap();
    assert_eq!(pointer.address(), 0x1000);
    assert_eq!(pointer.ownership(), Ownership::Borrowed);

    let err = free(&pointer).unwrap_err();
    assert_eq!(err, MemoryError::ForeignPointer);
    assert_eq!(err.name(), "InvalidFreeError");

    assert_eq!(NativePointer::borrowed(0).unwrap_err().name(), "NullPointerError");
}

#[test]
fn test_free_dispatches_on_value_kind() {
    let buffer = alloc(4).unwrap();
    free(&Value::from(&buffer)).unwrap();
    assert!(buffer.is_freed());

    assert_eq!(free(&Value::I32(1)).unwrap_err().name(), "TypeError");
}

#[test]
fn test_debug_string() {
    let buffer = alloc_with(32, AllocOptions::auto_free()).unwrap();
    let rendered = buffer.to_debug_string();
    assert!(rendered.starts_with("NativeBuffer(address=0x"));
    assert!(rendered.ends_with("size=32, ownership=caller, autoFree)"));

    buffer.free().unwrap();
    assert_eq!(buffer.to_debug_string(), "NativeBuffer(size=32, freed)");
}

#[test]
fn test_auto_free_releases_on_drop() {
    let buffer = alloc_with(128, AllocOptions::auto_free()).unwrap();
    assert!(buffer.auto_free());
    let alias = buffer.clone();
    drop(buffer);
    // The allocation lives as long as any handle does
    assert_eq!(alias.size().unwrap(), 128);
}
