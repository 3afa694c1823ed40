//! Runtime-configurable tuning parameters.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `AL_`) or by constructing a custom `GantryConfig`.

/// Tuning parameters for the device layer and the progress engine.
#[derive(Debug, Clone)]
pub struct GantryConfig {
    /// Number of library-internal device streams used to issue non-blocking
    /// collectives. Streams are handed out round-robin.
    pub stream_pool_size: usize,

    /// Create internal streams at the greatest device-stream priority.
    pub use_priority_stream: bool,

    /// Number of synchronization-flag slots to preallocate at init.
    pub sync_mem_prealloc: usize,

    /// Pin the progress thread to this core (Linux only).
    pub progress_affinity: Option<usize>,

    /// If non-zero, preallocate one pinned staging buffer of this many bytes
    /// per internal stream.
    pub pinned_prealloc_bytes: usize,

    /// Use stream memory operations for the device-side sync-flag wait.
    /// When false, a host callback inserted into the stream polls instead.
    pub use_stream_mem_ops: bool,
}

impl Default for GantryConfig {
    fn default() -> Self {
        Self {
            stream_pool_size: 5,
            use_priority_stream: false,
            sync_mem_prealloc: 1024,
            progress_affinity: None,
            pinned_prealloc_bytes: 0,
            use_stream_mem_ops: true,
        }
    }
}

impl GantryConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `AL_STREAM_POOL_SIZE`
    /// - `AL_USE_PRIORITY_STREAM` (presence-only)
    /// - `AL_SYNC_MEM_PREALLOC`
    /// - `AL_PROGRESS_AFFINITY`
    /// - `AL_PINNED_PREALLOC_BYTES`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("AL_STREAM_POOL_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    cfg.stream_pool_size = n;
                }
            }
        }
        if std::env::var_os("AL_USE_PRIORITY_STREAM").is_some() {
            cfg.use_priority_stream = true;
        }
        if let Ok(v) = std::env::var("AL_SYNC_MEM_PREALLOC") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.sync_mem_prealloc = n;
            }
        }
        if let Ok(v) = std::env::var("AL_PROGRESS_AFFINITY") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.progress_affinity = Some(n);
            }
        }
        if let Ok(v) = std::env::var("AL_PINNED_PREALLOC_BYTES") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.pinned_prealloc_bytes = n;
            }
        }

        cfg
    }
}
