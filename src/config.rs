//! Configuration for building and mapping archives.

/// Tunables for [`crate::ArchiveBuilder`] and [`crate::SharedArchive`].
///
/// The defaults match what a runtime uses in production: four entries per dictionary bucket
/// and a full pointer-map check whenever an image is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Average number of entries per dictionary bucket; the bucket count of a dictionary is its
    /// entry count divided by this value (at least one bucket)
    pub bucket_size: usize,

    /// Check every marked reference field against the image bounds when mapping
    pub verify_pointers: bool,

    /// Largest image the builder will produce; offsets are 32 bits wide, so this can never
    /// exceed `u32::MAX`
    pub max_image_size: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bucket_size: 4,
            verify_pointers: true,
            max_image_size: u32::MAX as usize,
        }
    }
}

impl ArchiveConfig {
    /// Creates a configuration that skips pointer verification on map.
    ///
    /// **Warning**: Use only for images whose integrity was checked by other means (e.g. a
    /// checksum over the whole file).
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            verify_pointers: false,
            ..Self::default()
        }
    }

    /// Creates a configuration with one entry per bucket and pointer verification, trading
    /// image size for shorter bucket scans.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            bucket_size: 1,
            verify_pointers: true,
            ..Self::default()
        }
    }

    /// Sets the maximum image size, clamped to what 32-bit offsets can address.
    #[must_use]
    pub fn with_max_image_size(mut self, max_image_size: usize) -> Self {
        self.max_image_size = max_image_size.min(u32::MAX as usize);
        self
    }

    /// Sets the average number of entries per bucket (at least one).
    #[must_use]
    pub fn with_bucket_size(mut self, bucket_size: usize) -> Self {
        self.bucket_size = bucket_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let default = ArchiveConfig::default();
        assert_eq!(default.bucket_size, 4);
        assert!(default.verify_pointers);

        assert!(!ArchiveConfig::minimal().verify_pointers);
        assert_eq!(ArchiveConfig::strict().bucket_size, 1);
    }

    #[test]
    fn clamping() {
        let config = ArchiveConfig::default()
            .with_bucket_size(0)
            .with_max_image_size(usize::MAX);
        assert_eq!(config.bucket_size, 1);
        assert_eq!(config.max_image_size, u32::MAX as usize);
    }
}
