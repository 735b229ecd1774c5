use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use crate::allocator::Allocator;
use crate::block::BlockSize;
use crate::metrics::AllocatorMetrics;
use crate::nvm::NonVolatileMemory;
use crate::rank::Rank;
use crate::region::{FreeListDirectory, FreePageCounts, HEADER_REGION_SIZE};
use crate::{ErrorKind, Result};

/// `Allocator`のビルダ.
#[derive(Debug, Clone)]
pub struct AllocatorBuilder {
    repair: bool,
    splitting: bool,
    logger: Logger,
    metrics: MetricBuilder,
}
impl AllocatorBuilder {
    /// 新しい`AllocatorBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        AllocatorBuilder {
            repair: false,
            splitting: true,
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
        }
    }

    /// 修復モードでオープンするかどうかを設定する.
    ///
    /// 修復モードは、範囲外を指すフリーリストの先頭を破棄した上でオープンを継続するためのものだが、
    /// 現時点では実装されていない.
    /// 有効にした状態で既存のファイルを開こうとすると、`ErrorKind::Unsupported`エラーが返される.
    ///
    /// デフォルト値は`false`.
    pub fn repair(&mut self, enabled: bool) -> &mut Self {
        self.repair = enabled;
        self
    }

    /// ページの分割を行うかどうかを設定する.
    ///
    /// `true`の場合には、要求ランクのフリーリストが空であれば、より大きなランクの空きページを分割して割り当てる.
    /// `false`の場合には、要求ランクのフリーリストが空であれば、常にファイルを拡張する.
    ///
    /// デフォルト値は`true`.
    pub fn splitting(&mut self, enabled: bool) -> &mut Self {
        self.splitting = enabled;
        self
    }

    /// アロケータ用の logger を登録する
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// `nvm`を管理するアロケータを構築する.
    ///
    /// `nvm`のサイズが管理領域に満たない場合には、空の管理領域を書き込んで初期化する.
    /// そうでなければ、保存済みのディレクトリおよび統計情報を読み込む.
    ///
    /// # Errors
    ///
    /// - ディレクトリが範囲外ないし境界に揃っていない位置を指している場合は`ErrorKind::StorageCorrupted`
    /// - 修復モードが有効な状態で既存のファイルを開いた場合は`ErrorKind::Unsupported`
    pub fn open<N>(&self, mut nvm: N) -> Result<Allocator<N>>
    where
        N: NonVolatileMemory,
    {
        let metrics = AllocatorMetrics::new(&self.metrics);
        let size = track!(nvm.size())?;
        if size < HEADER_REGION_SIZE {
            info!(self.logger, "Initializes header region"; "size" => size);
            let directory = FreeListDirectory::new();
            let counts = FreePageCounts::new();
            track!(directory.store(&mut nvm))?;
            track!(counts.store(&mut nvm))?;
            return Ok(Allocator::new(
                nvm,
                directory,
                counts,
                HEADER_REGION_SIZE,
                self.splitting,
                self.logger.clone(),
                metrics,
            ));
        }

        track_assert!(
            !self.repair,
            ErrorKind::Unsupported,
            "Repair mode is not supported"
        );

        let directory = track!(FreeListDirectory::load(&mut nvm))?;
        let counts = track!(FreePageCounts::load(&mut nvm))?;
        for rank in Rank::iter() {
            let head = match directory.head(rank) {
                None => continue,
                Some(head) => head,
            };
            let in_bounds = head
                .checked_add(rank.size())
                .map_or(false, |end| end <= size);
            if !(in_bounds && BlockSize::min().is_aligned(head)) {
                warn!(self.logger, "Free list head is out of bounds";
                      "rank" => rank.as_u8(), "head" => head, "eof" => size);
                track_panic!(
                    ErrorKind::StorageCorrupted,
                    "Corrupted file: rank={}, head={}, eof={}",
                    rank.as_u8(),
                    head,
                    size
                );
            }
        }

        info!(self.logger, "Opened"; "eof" => size);
        Ok(Allocator::new(
            nvm,
            directory,
            counts,
            size,
            self.splitting,
            self.logger.clone(),
            metrics,
        ))
    }
}
impl Default for AllocatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
