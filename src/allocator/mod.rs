//! ファイル上の可変長ブロックのアロケータ.
//!
//! # 割当戦略
//!
//! 要求サイズ(ヘッダ込み)を格納可能な最小のランクを求め、以下の順で割当を試みる:
//!
//! 1. そのランクのフリーリストの先頭ページ
//! 2. より大きなランクのフリーリストを昇順に探索し、最初に見つかった空きページを分割したもの
//! 3. ファイル末尾に追加した新しいページ (拡張が許可されている場合のみ)
//!
//! 分割によって生じたページは、解放後も結合されることはない.
//!
//! # 書き込み順序
//!
//! 各操作は、依存関係のある書き込みの間に同期(`NonVolatileMemory::sync`)を挟んで実行される.
//! そのため、どの時点でプロセスやシステムがクラッシュしたとしても、
//! 永続化された状態は操作の各段階の前後いずれかとなり、
//! 同じ領域が二重に割り当てられる状態になることはない
//! (最悪でも、修復を行うまで到達不能な空き領域が残るだけとなる).
pub use self::builder::AllocatorBuilder;

use slog::Logger;

use crate::block::{BlockSize, BufferPool};
use crate::metrics::AllocatorMetrics;
use crate::nvm::NonVolatileMemory;
use crate::page::{PageHeader, PAGE_HEADER_SIZE};
use crate::rank::{Rank, MIN_PAGE_SIZE, RANKS};
use crate::region::{FreeListDirectory, FreePageCounts, HEADER_REGION_SIZE};
use crate::{ErrorKind, Result};

mod builder;

/// 割当結果.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// 割当に成功した.
    ///
    /// 値は、利用者が使用可能な領域(ページヘッダの直後)の開始位置.
    Allocated(u64),

    /// 要求サイズが、最大ランクのページに収まらない.
    TooLarge,

    /// 割当にはファイルの拡張が必要だが、拡張が許可されていない.
    NeedsGrowth,
}
impl Allocation {
    /// 割当に成功している場合には、その位置を返す.
    pub fn offset(&self) -> Option<u64> {
        if let Allocation::Allocated(offset) = *self {
            Some(offset)
        } else {
            None
        }
    }
}

/// ファイル(`NonVolatileMemory`)内の領域の割当と解放を担当するアロケータ.
///
/// 管理情報(フリーリストのディレクトリ、ランク毎の空きページ数)は全て同じファイル内に永続化されており、
/// インスタンスはそのキャッシュとファイルの論理的な終端位置を保持する.
///
/// # 注意
///
/// 内部で排他制御は行っていないため、複数のスレッドから同時に操作してはならない.
///
/// # Error Handlings
///
/// `ErrorKind::{InvalidOffset, DoubleFree}`以外のエラーが返された場合には、
/// キャッシュとファイルの内容が一致していない可能性があるので、
/// 以後はこのインスタンスの使用を中止して、開き直すのが望ましい.
#[derive(Debug)]
pub struct Allocator<N> {
    nvm: N,
    directory: FreeListDirectory,
    counts: FreePageCounts,
    eof: u64,
    splitting: bool,
    logger: Logger,
    metrics: AllocatorMetrics,
}
impl<N> Allocator<N>
where
    N: NonVolatileMemory,
{
    pub(crate) fn new(
        nvm: N,
        directory: FreeListDirectory,
        counts: FreePageCounts,
        eof: u64,
        splitting: bool,
        logger: Logger,
        metrics: AllocatorMetrics,
    ) -> Self {
        metrics.file_size_bytes.set(eof as f64);
        Allocator {
            nvm,
            directory,
            counts,
            eof,
            splitting,
            logger,
            metrics,
        }
    }

    /// デフォルト設定で、アロケータを構築する.
    pub fn open(nvm: N) -> Result<Self> {
        track!(AllocatorBuilder::new().open(nvm))
    }

    /// `size`バイトの領域を割り当てる.
    ///
    /// `no_grow`が`true`の場合には、ファイルの拡張が必要になった時点で`Allocation::NeedsGrowth`が返される.
    ///
    /// 要求サイズが大きすぎる場合には`Allocation::TooLarge`が返される.
    pub fn alloc(&mut self, size: usize, no_grow: bool) -> Result<Allocation> {
        let rank = match (size as u64)
            .checked_add(PAGE_HEADER_SIZE)
            .and_then(Rank::for_size)
        {
            None => return Ok(Allocation::TooLarge),
            Some(rank) => rank.allocatable(),
        };

        if let Some(page) = track!(self.unlink_head(rank, rank))? {
            self.metrics.allocated_pages_from_free_list.increment();
            debug!(self.logger, "Allocated from free list"; "page" => page, "rank" => rank.as_u8());
            return Ok(Allocation::Allocated(page + PAGE_HEADER_SIZE));
        }

        if self.splitting {
            let larger = rank
                .iter_from()
                .skip(1)
                .find(|&r| self.directory.head(r).is_some());
            if let Some(larger) = larger {
                if let Some(page) = track!(self.unlink_head(larger, rank))? {
                    track!(self.split(page, larger, rank))?;
                    self.metrics.allocated_pages_from_split.increment();
                    debug!(self.logger, "Allocated by splitting";
                           "page" => page, "rank" => larger.as_u8(), "used_rank" => rank.as_u8());
                    return Ok(Allocation::Allocated(page + PAGE_HEADER_SIZE));
                }
            }
        }

        if no_grow {
            self.metrics.growth_refusals.increment();
            return Ok(Allocation::NeedsGrowth);
        }
        let page = track!(self.append_page(rank))?;
        self.metrics.allocated_pages_from_growth.increment();
        debug!(self.logger, "Allocated by growth";
               "page" => page, "rank" => rank.as_u8(), "eof" => self.eof);
        Ok(Allocation::Allocated(page + PAGE_HEADER_SIZE))
    }

    /// `alloc`で割り当てた領域を解放する.
    ///
    /// 解放されたページは、分割前のサイズではなく、その時点の物理的なサイズのまま
    /// 対応するランクのフリーリストに追加される.
    ///
    /// # Errors
    ///
    /// - `offset`が割当済みの領域を指していない場合は`ErrorKind::InvalidOffset`
    /// - `offset`が既に解放済みの場合は`ErrorKind::DoubleFree`
    ///
    /// いずれの場合も、状態は変更されない.
    pub fn free(&mut self, offset: u64) -> Result<()> {
        let page = track!(self.page_offset(offset))?;
        let header = track!(self.read_page_header_at(page))?;
        if header.is_free() {
            self.metrics.double_frees.increment();
            warn!(self.logger, "Double free"; "offset" => offset);
            track_panic!(ErrorKind::DoubleFree, "offset={}", offset);
        }
        let rank = header.rank;

        // ページヘッダ => ディレクトリ => 統計情報、の順で永続化する.
        // 途中でクラッシュしても、ページはリストから到達不能な状態に留まる.
        let next = self.directory.head(rank).unwrap_or(0);
        track!(self.write_page_header(page, &PageHeader::free(rank, next)))?;

        self.directory.set_head(rank, page);
        track!(self.directory.store_slot(&mut self.nvm, rank))?;

        self.counts.increment(rank);
        track!(self.counts.store_count(&mut self.nvm, rank))?;

        self.metrics.released_pages.increment();
        debug!(self.logger, "Released"; "page" => page, "rank" => rank.as_u8());
        Ok(())
    }

    /// `offset`に割り当てられている領域の、利用可能なサイズを返す.
    ///
    /// # Errors
    ///
    /// `offset`が割当済みの領域を指していない場合は`ErrorKind::InvalidOffset`が返される.
    pub fn usable_size(&mut self, offset: u64) -> Result<u64> {
        let page = track!(self.page_offset(offset))?;
        let header = track!(self.read_page_header_at(page))?;
        track_assert!(
            !header.is_free(),
            ErrorKind::InvalidOffset,
            "Not allocated: offset={}",
            offset
        );
        Ok(header.used_rank.size() - PAGE_HEADER_SIZE)
    }

    /// 空き領域の概算サイズを返す.
    ///
    /// 統計情報に基づく値であり、正確さは保証されない.
    pub fn approx_free_space(&self) -> u64 {
        self.approx_free_space_from(Rank::MIN)
    }

    /// `min_size`バイト以上の割当に利用可能な、空き領域の概算サイズを返す.
    pub fn approx_free_space_for(&self, min_size: usize) -> u64 {
        match (min_size as u64)
            .checked_add(PAGE_HEADER_SIZE)
            .and_then(Rank::for_size)
        {
            None => 0,
            Some(rank) => self.approx_free_space_from(rank),
        }
    }

    fn approx_free_space_from(&self, min_rank: Rank) -> u64 {
        min_rank.iter_from().fold(0u64, |total, rank| {
            let bytes = self
                .counts
                .get(rank)
                .saturating_mul(rank.size() - PAGE_HEADER_SIZE);
            total.saturating_add(bytes)
        })
    }

    /// ファイルの論理的な終端位置を返す.
    pub fn file_size(&self) -> u64 {
        self.eof
    }

    /// ランク毎の空きページ数を返す.
    pub fn free_page_counts(&self) -> [u64; RANKS] {
        self.counts.as_array()
    }

    /// 指定ランクのフリーリストを辿って、含まれるページの位置を先頭から順に返す.
    ///
    /// # Errors
    ///
    /// リストの途中で、空きページではないページや循環が見つかった場合には
    /// `ErrorKind::InconsistentState`が返される.
    pub fn free_list(&mut self, rank: Rank) -> Result<Vec<u64>> {
        let max_pages = self.eof / MIN_PAGE_SIZE;
        let mut pages = Vec::new();
        let mut next = self.directory.head(rank);
        while let Some(page) = next {
            track_assert!(
                (pages.len() as u64) < max_pages,
                ErrorKind::InconsistentState,
                "Cyclic free list: rank={}",
                rank.as_u8()
            );
            track!(self.check_page_bounds(page, rank))?;
            let header = track!(self.read_page_header(page))?;
            track_assert!(
                header.is_free() && header.rank == rank,
                ErrorKind::InconsistentState,
                "page={}, header={:?}",
                page,
                header
            );
            pages.push(page);
            next = if header.next < HEADER_REGION_SIZE {
                None
            } else {
                Some(header.next)
            };
        }
        Ok(pages)
    }

    /// アロケータのメトリクスを返す.
    pub fn metrics(&self) -> &AllocatorMetrics {
        &self.metrics
    }

    /// 管理対象の`NonVolatileMemory`への参照を返す.
    pub fn nvm(&self) -> &N {
        &self.nvm
    }

    /// 管理対象の`NonVolatileMemory`への可変参照を返す.
    ///
    /// 割り当てた領域へのデータの読み書きに使用する.
    /// 割当範囲外(ページヘッダや管理領域)への書き込みを行ってはならない.
    pub fn nvm_mut(&mut self) -> &mut N {
        &mut self.nvm
    }

    /// アロケータを破棄して、管理対象の`NonVolatileMemory`を返す.
    pub fn into_nvm(self) -> N {
        self.nvm
    }

    /// 指定ランクのフリーリストの先頭ページを取り外して、割当済み状態にする.
    ///
    /// リストが空の場合には`None`が返される.
    fn unlink_head(&mut self, rank: Rank, used_rank: Rank) -> Result<Option<u64>> {
        let page = match self.directory.head(rank) {
            None => return Ok(None),
            Some(page) => page,
        };
        let header = track!(self.read_page_header(page))?;
        track_assert_eq!(
            header.rank,
            rank,
            ErrorKind::InconsistentState,
            "page={}",
            page
        );
        if header.next >= HEADER_REGION_SIZE {
            track!(self.check_page_bounds(header.next, rank))?;
        }
        if !header.is_free() {
            // ページヘッダの更新後、ディレクトリの更新前にクラッシュした場合に起こり得る
            warn!(self.logger, "Free list head is not marked as free";
                  "page" => page, "rank" => rank.as_u8());
        }

        track!(self.write_page_header(page, &PageHeader::allocated(rank, used_rank)))?;

        self.directory.set_head(rank, header.next);
        track!(self.directory.store_slot(&mut self.nvm, rank))?;

        self.counts.decrement(rank);
        track!(self.counts.store_count(&mut self.nvm, rank))?;
        Ok(Some(page))
    }

    /// 割当済みのページの余剰部分を、より小さなページとして切り出してフリーリストに追加する.
    ///
    /// 分割後のページのランクは、可能な限り`used_rank`に近付けられる.
    fn split(&mut self, page: u64, rank: Rank, used_rank: Rank) -> Result<()> {
        let used_rank = used_rank.allocatable();
        let mut rank = rank;
        if rank.is_odd() {
            while let Some(smaller) = rank.checked_sub(2) {
                if smaller < used_rank || smaller.as_u8() == 1 {
                    break;
                }
                track!(self.carve_tail(page, smaller, used_rank, smaller.size(), smaller))?;
                rank = smaller;
            }
        } else {
            while let Some(smaller) = rank.checked_sub(2) {
                if smaller < used_rank {
                    break;
                }
                track!(self.carve_tail(page, smaller, used_rank, smaller.size(), smaller))?;
                rank = smaller;
            }

            // size(rank - 1) + size(rank - 4) = size(rank)
            if rank.as_u8() >= 4 && rank.checked_sub(1) == Some(used_rank) {
                if let Some(quarter) = rank.checked_sub(4) {
                    track!(self.carve_tail(page, used_rank, used_rank, used_rank.size(), quarter))?;
                }
            }
        }
        Ok(())
    }

    /// `page`の`tail_start`以降を`tail_rank`の空きページとして切り出し、
    /// `page`のランクを`parent_rank`に縮める.
    fn carve_tail(
        &mut self,
        page: u64,
        parent_rank: Rank,
        used_rank: Rank,
        tail_start: u64,
        tail_rank: Rank,
    ) -> Result<()> {
        let tail = page + tail_start;

        // 切り出したページ => 元のページ => ディレクトリ => 統計情報、の順で永続化する.
        // 元のページを縮める前に、切り出したページがリストから到達可能になることはない.
        let next = self.directory.head(tail_rank).unwrap_or(0);
        track!(self.write_page_header(tail, &PageHeader::free(tail_rank, next)))?;
        track!(self.write_page_header(page, &PageHeader::allocated(parent_rank, used_rank)))?;

        self.directory.set_head(tail_rank, tail);
        track!(self.directory.store_slot(&mut self.nvm, tail_rank))?;

        self.counts.increment(tail_rank);
        track!(self.counts.store_count(&mut self.nvm, tail_rank))?;

        self.metrics.split_pages.increment();
        debug!(self.logger, "Split off";
               "page" => page, "rank" => parent_rank.as_u8(),
               "tail" => tail, "tail_rank" => tail_rank.as_u8());
        Ok(())
    }

    /// ファイル末尾に、割当済み状態の新しいページを追加する.
    fn append_page(&mut self, rank: Rank) -> Result<u64> {
        let page = BlockSize::min().ceil_align(self.eof);
        let end = page + rank.size();

        // 先にファイルをページの終端まで拡張しておく
        track!(self.nvm.write_at(&[0], end - 1))?;
        track!(self.write_page_header(page, &PageHeader::allocated(rank, rank)))?;

        self.eof = end;
        self.metrics.file_size_bytes.set(end as f64);
        Ok(page)
    }

    /// 利用者から渡されたオフセットを検証して、対応するページの位置を返す.
    fn page_offset(&self, offset: u64) -> Result<u64> {
        let page = track_assert_some!(
            offset.checked_sub(PAGE_HEADER_SIZE),
            ErrorKind::InvalidOffset,
            "offset={}",
            offset
        );
        track_assert!(
            page >= HEADER_REGION_SIZE
                && BlockSize::min().is_aligned(page)
                && page + PAGE_HEADER_SIZE <= self.eof,
            ErrorKind::InvalidOffset,
            "offset={}, eof={}",
            offset,
            self.eof
        );
        Ok(page)
    }

    fn check_page_bounds(&self, page: u64, rank: Rank) -> Result<()> {
        track_assert!(
            page >= HEADER_REGION_SIZE
                && BlockSize::min().is_aligned(page)
                && page.saturating_add(rank.size()) <= self.eof,
            ErrorKind::InconsistentState,
            "page={}, rank={}, eof={}",
            page,
            rank.as_u8(),
            self.eof
        );
        Ok(())
    }

    /// 利用者から渡されたオフセットに対応するページヘッダを読み込む.
    ///
    /// ヘッダとして構造的に妥当でない場合や、ページがファイル終端を越える場合には
    /// `ErrorKind::InvalidOffset`が返される.
    fn read_page_header_at(&mut self, page: u64) -> Result<PageHeader> {
        let mut buf = BufferPool::global().get(PAGE_HEADER_SIZE as usize);
        track!(self.nvm.read_at(&mut buf, page))?;
        track_assert!(
            PageHeader::is_well_formed(&buf),
            ErrorKind::InvalidOffset,
            "No page header: page={}",
            page
        );
        let header = track!(PageHeader::read_from(&buf[..]))?;
        track_assert!(
            page.saturating_add(header.rank.size()) <= self.eof,
            ErrorKind::InvalidOffset,
            "Page exceeds eof: page={}, rank={}, eof={}",
            page,
            header.rank.as_u8(),
            self.eof
        );
        Ok(header)
    }

    fn read_page_header(&mut self, page: u64) -> Result<PageHeader> {
        let mut buf = BufferPool::global().get(PAGE_HEADER_SIZE as usize);
        track!(self.nvm.read_at(&mut buf, page))?;
        track!(PageHeader::read_from(&buf[..]), "page={}", page)
    }

    fn write_page_header(&mut self, page: u64, header: &PageHeader) -> Result<()> {
        let mut buf = BufferPool::global().get(PAGE_HEADER_SIZE as usize);
        track!(header.write_to(&mut buf[..]))?;
        track!(self.nvm.write_at(&buf, page))?;
        track!(self.nvm.sync())?;
        Ok(())
    }
}
