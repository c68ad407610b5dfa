/// Run-time version of the library as (major, minor, micro).
pub fn version() -> (u32, u32, u32) {
    (
        env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
        env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
    )
}

/// Smallest power of two that is greater than or equal to `val`, `None` above `1 << 31`.
/// Texture uploads typically need this when the image size is not already a power of two.
pub fn next_power_of_two(val: u32) -> Option<u32> {
    val.max(1).checked_next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(version(), (1, 6, 0));
    }

    #[test]
    fn powers_of_two() {
        assert_eq!(next_power_of_two(0), Some(1));
        assert_eq!(next_power_of_two(1), Some(1));
        assert_eq!(next_power_of_two(3), Some(4));
        assert_eq!(next_power_of_two(256), Some(256));
        assert_eq!(next_power_of_two(257), Some(512));
        assert_eq!(next_power_of_two(1 << 31), Some(1 << 31));
        assert_eq!(next_power_of_two((1 << 31) + 1), None);
    }
}
