//! Tunable knobs for the cache, pipelines, and scan pipeline, grouped into
//! one `Config` with named presets for common deployment shapes.

/// Engine-wide tuning configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Memory-tier LRU shard count for each derivative cache.
    pub cache_memory_shards: usize,
    /// Memory-tier total entry capacity for the thumbnail cache.
    pub thumbnail_memory_capacity: usize,
    /// Memory-tier total entry capacity for the preview cache.
    pub preview_memory_capacity: usize,
    /// Long-edge target size, in pixels, for generated thumbnails.
    pub thumbnail_target_px: u32,
    /// Long-edge target size, in pixels, for generated previews.
    pub preview_target_px: u32,
    /// Maximum concurrently in-flight thumbnail decode tasks.
    pub thumbnail_concurrency: usize,
    /// Maximum concurrently in-flight preview decode tasks.
    pub preview_concurrency: usize,
    /// Directory entries read per scan batch delivered to the coordinator.
    pub scan_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_memory_shards: 8,
            thumbnail_memory_capacity: 150,
            preview_memory_capacity: 50,
            thumbnail_target_px: 512,
            preview_target_px: 2560,
            thumbnail_concurrency: 4,
            preview_concurrency: 2,
            scan_batch_size: 50,
        }
    }
}

impl Config {
    /// Smaller memory footprint for constrained environments: fewer cached
    /// entries, lower concurrency, so peak resident memory stays small at
    /// the cost of more cache misses and slower bulk scans.
    pub fn low_memory() -> Self {
        Self {
            cache_memory_shards: 2,
            thumbnail_memory_capacity: 40,
            preview_memory_capacity: 10,
            thumbnail_concurrency: 2,
            preview_concurrency: 1,
            scan_batch_size: 25,
            ..Self::default()
        }
    }

    /// Larger caches and higher decode concurrency for a machine with
    /// plenty of cores and memory to spare, trading resource use for
    /// throughput on large libraries.
    pub fn high_throughput() -> Self {
        Self {
            cache_memory_shards: 16,
            thumbnail_memory_capacity: 600,
            preview_memory_capacity: 200,
            thumbnail_concurrency: 12,
            preview_concurrency: 6,
            scan_batch_size: 200,
            ..Self::default()
        }
    }
}
