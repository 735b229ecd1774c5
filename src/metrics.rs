//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

/// アロケータのメトリクス.
#[derive(Debug, Clone)]
pub struct AllocatorMetrics {
    pub(crate) allocated_pages_from_free_list: Counter,
    pub(crate) allocated_pages_from_split: Counter,
    pub(crate) allocated_pages_from_growth: Counter,
    pub(crate) released_pages: Counter,
    pub(crate) split_pages: Counter,
    pub(crate) double_frees: Counter,
    pub(crate) growth_refusals: Counter,
    pub(crate) file_size_bytes: Gauge,
}
impl AllocatorMetrics {
    /// 割り当てたページの数.
    ///
    /// 返り値のタプルの要素は、それぞれ`source="free_list"`、`source="split"`、`source="growth"`に対応する.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// filealloc_allocator_allocated_pages_total { source="free_list|split|growth" } <COUNTER>
    /// ```
    pub fn allocated_pages(&self) -> (u64, u64, u64) {
        (
            self.allocated_pages_from_free_list.value() as u64,
            self.allocated_pages_from_split.value() as u64,
            self.allocated_pages_from_growth.value() as u64,
        )
    }

    /// 解放したページの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// filealloc_allocator_released_pages_total <COUNTER>
    /// ```
    pub fn released_pages(&self) -> u64 {
        self.released_pages.value() as u64
    }

    /// 分割によって切り出されてフリーリストに追加されたページの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// filealloc_allocator_split_pages_total <COUNTER>
    /// ```
    pub fn split_pages(&self) -> u64 {
        self.split_pages.value() as u64
    }

    /// 拒否された二重解放の回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// filealloc_allocator_double_frees_total <COUNTER>
    /// ```
    pub fn double_frees(&self) -> u64 {
        self.double_frees.value() as u64
    }

    /// ファイルの拡張が必要だったが、許可されていなかったために割当を行わなかった回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// filealloc_allocator_growth_refusals_total <COUNTER>
    /// ```
    pub fn growth_refusals(&self) -> u64 {
        self.growth_refusals.value() as u64
    }

    /// ファイルの論理的な終端位置.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// filealloc_allocator_file_size_bytes <GAUGE>
    /// ```
    pub fn file_size_bytes(&self) -> u64 {
        self.file_size_bytes.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("filealloc").subsystem("allocator");
        AllocatorMetrics {
            allocated_pages_from_free_list: builder
                .counter("allocated_pages_total")
                .help("Number of allocated pages")
                .label("source", "free_list")
                .finish()
                .expect("Never fails"),
            allocated_pages_from_split: builder
                .counter("allocated_pages_total")
                .help("Number of allocated pages")
                .label("source", "split")
                .finish()
                .expect("Never fails"),
            allocated_pages_from_growth: builder
                .counter("allocated_pages_total")
                .help("Number of allocated pages")
                .label("source", "growth")
                .finish()
                .expect("Never fails"),
            released_pages: builder
                .counter("released_pages_total")
                .help("Number of released pages")
                .finish()
                .expect("Never fails"),
            split_pages: builder
                .counter("split_pages_total")
                .help("Number of pages carved off by splitting")
                .finish()
                .expect("Never fails"),
            double_frees: builder
                .counter("double_frees_total")
                .help("Number of refused double frees")
                .finish()
                .expect("Never fails"),
            growth_refusals: builder
                .counter("growth_refusals_total")
                .help("Number of allocations refused because growth was disallowed")
                .finish()
                .expect("Never fails"),
            file_size_bytes: builder
                .gauge("file_size_bytes")
                .help("Logical end of the file")
                .finish()
                .expect("Never fails"),
        }
    }
}
