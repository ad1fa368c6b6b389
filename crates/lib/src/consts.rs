/// Application name used for data, cache, and store directories.
pub const APP_NAME: &str = "nativepack";

/// Length of the truncated object hash used in store paths.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Marker written into a package directory once it is fully committed.
pub const PACKAGE_COMPLETE_MARKER: &str = ".nativepack-complete";

/// Environment variable overriding the package store location.
pub const STORE_ENV: &str = "NATIVEPACK_STORE";

/// Environment variable overriding the build work directory.
pub const WORK_ENV: &str = "NATIVEPACK_WORK";

/// Fixed timestamp handed to external builds for reproducible archives.
/// 315532800 = January 1, 1980 00:00:00 UTC (ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";
