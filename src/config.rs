//! Configuration options for the segdex index.

use crate::sort::IndexSort;

/// Configuration options for opening an index.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create the index if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Error if the index already exists.
    /// Default: false
    pub error_if_exists: bool,

    /// Sort applied to documents inside every segment.
    /// Must match the sort of an existing index.
    /// Default: empty (insertion order)
    pub index_sort: IndexSort,

    /// Number of buffered documents that triggers an automatic flush.
    /// Default: 10000
    pub max_buffered_docs: usize,

    /// Approximate buffered bytes that trigger an automatic flush.
    /// Default: 16MB
    pub ram_buffer_size: usize,

    /// Number of segments above which a merge is triggered.
    /// Default: 10
    pub merge_factor: usize,

    /// Maximum number of segments merged in one pass.
    /// Default: 10
    pub max_merge_at_once: usize,

    /// Deleted-document ratio above which a segment is rewritten.
    /// Default: 0.33
    pub deletes_pct_allowed: f64,

    /// Run the merge policy after every flush.
    /// Default: true
    pub auto_merge: bool,

    /// Compression of the stored-field block.
    /// Default: CompressionType::default()
    pub compression: CompressionType,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            index_sort: IndexSort::none(),
            max_buffered_docs: 10_000,
            ram_buffer_size: 16 * 1024 * 1024, // 16MB
            merge_factor: 10,
            max_merge_at_once: 10,
            deletes_pct_allowed: 0.33,
            auto_merge: true,
            compression: CompressionType::default(),
        }
    }
}

/// Compression algorithms for the stored-field block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    #[cfg(feature = "snappy")]
    Snappy = 1,

    /// LZ4 compression (very fast, lower compression ratio).
    #[cfg(feature = "lz4-compression")]
    Lz4 = 2,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            #[cfg(feature = "lz4-compression")]
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

/// Per-segment write settings handed to the writer and the merger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentConfig {
    /// Sort applied when sealing a segment.
    pub sort: IndexSort,
    /// Compression of the stored-field block.
    pub compression: CompressionType,
}

impl SegmentConfig {
    /// Creates a segment config.
    pub fn new(sort: IndexSort, compression: CompressionType) -> Self {
        Self { sort, compression }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the index if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the index sort.
    pub fn index_sort(mut self, sort: IndexSort) -> Self {
        self.index_sort = sort;
        self
    }

    /// Sets the buffered document count that triggers a flush.
    pub fn max_buffered_docs(mut self, count: usize) -> Self {
        self.max_buffered_docs = count;
        self
    }

    /// Sets the buffered byte size that triggers a flush.
    pub fn ram_buffer_size(mut self, size: usize) -> Self {
        self.ram_buffer_size = size;
        self
    }

    /// Sets the segment count above which a merge is triggered.
    pub fn merge_factor(mut self, factor: usize) -> Self {
        self.merge_factor = factor;
        self
    }

    /// Enables or disables merging after flush.
    pub fn auto_merge(mut self, value: bool) -> Self {
        self.auto_merge = value;
        self
    }

    /// Sets the stored-field compression.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Returns the settings the writer and merger seal segments with.
    pub fn segment_config(&self) -> SegmentConfig {
        SegmentConfig::new(self.index_sort.clone(), self.compression)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_buffered_docs == 0 {
            return Err(crate::Error::invalid_argument("max_buffered_docs must be > 0"));
        }
        if self.max_buffered_docs > u32::MAX as usize {
            return Err(crate::Error::invalid_argument("max_buffered_docs must fit in u32"));
        }
        if self.ram_buffer_size == 0 {
            return Err(crate::Error::invalid_argument("ram_buffer_size must be > 0"));
        }
        if self.merge_factor < 2 {
            return Err(crate::Error::invalid_argument("merge_factor must be >= 2"));
        }
        if self.max_merge_at_once < 2 {
            return Err(crate::Error::invalid_argument("max_merge_at_once must be >= 2"));
        }
        if self.deletes_pct_allowed <= 0.0 || self.deletes_pct_allowed > 1.0 {
            return Err(crate::Error::invalid_argument(
                "deletes_pct_allowed must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::SortField;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert!(opts.create_if_missing);
        assert!(!opts.error_if_exists);
        assert!(opts.index_sort.is_empty());
        assert_eq!(opts.max_buffered_docs, 10_000);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new()
            .index_sort(IndexSort::new(vec![SortField::descending("dense_int")]))
            .max_buffered_docs(20)
            .merge_factor(4)
            .auto_merge(false)
            .compression(CompressionType::None);

        assert_eq!(opts.max_buffered_docs, 20);
        assert_eq!(opts.merge_factor, 4);
        assert!(!opts.auto_merge);

        let config = opts.segment_config();
        assert_eq!(config.sort.fields()[0].field(), "dense_int");
        assert_eq!(config.compression, CompressionType::None);
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        assert!(opts.validate().is_ok());

        opts.max_buffered_docs = 0;
        assert!(opts.validate().is_err());

        opts.max_buffered_docs = 100;
        opts.merge_factor = 1;
        assert!(opts.validate().is_err());

        opts.merge_factor = 10;
        opts.deletes_pct_allowed = 1.5;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_compression_from_u8() {
        assert_eq!(CompressionType::from_u8(0), Some(CompressionType::None));
        assert_eq!(CompressionType::from_u8(42), None);
    }
}
