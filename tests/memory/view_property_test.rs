/*!
 * View Property Tests
 * Size, round-trip and range properties over arbitrary inputs
 */

use proptest::prelude::*;
use relaxnative::alloc;

proptest! {
    #[test]
    fn prop_alloc_size_matches(size in 1usize..4096) {
        let buffer = alloc(size).unwrap();
        prop_assert_eq!(buffer.size().unwrap(), size);
        buffer.free().unwrap();
    }

    #[test]
    fn prop_write_read_round_trip(
        bytes in proptest::collection::vec(any::<u8>(), 1..256),
        slack in 0usize..64,
    ) {
        let buffer = alloc(bytes.len() + slack).unwrap();
        buffer.write(&bytes, slack).unwrap();
        prop_assert_eq!(buffer.bytes(slack, Some(bytes.len())).unwrap(), bytes);
        buffer.free().unwrap();
    }

    #[test]
    fn prop_misaligned_f64_views_are_range_errors(offset in 0usize..64) {
        let buffer = alloc(64).unwrap();
        let result = buffer.f64(offset, None);
        if offset % 8 == 0 {
            prop_assert_eq!(result.unwrap().len(), (64 - offset) / 8);
        } else {
            prop_assert_eq!(result.unwrap_err().name(), "RangeError");
        }
        buffer.free().unwrap();
    }

    #[test]
    fn prop_oversized_views_are_range_errors(extra in 1usize..16) {
        let buffer = alloc(32).unwrap();
        let err = buffer.u16(0, Some(16 + extra)).unwrap_err();
        prop_assert_eq!(err.name(), "RangeError");
        buffer.free().unwrap();
    }
}
