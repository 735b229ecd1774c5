//! ファイル先頭の管理領域.
//!
//! 先頭512バイトには、フリーリストのディレクトリと、ランク毎の空きページ数の統計情報が置かれる.
//! 整数は全てビッグエンディアン.
//!
//! ```text
//! offset  size  content
//! ------  ----  ---------------------------------------------
//!      0    16  (reserved)
//!     16   240  ディレクトリ: ランク毎のフリーリストの先頭位置 (u64 x 30)
//!    256    16  (reserved)
//!    272   240  統計情報: ランク毎の空きページ数 (u64 x 30)
//! ```
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::block::BufferPool;
use crate::nvm::NonVolatileMemory;
use crate::rank::{Rank, MIN_PAGE_SIZE, RANKS};
use crate::Result;

/// 管理領域全体のサイズ.
///
/// 最初のページは、この位置から始まる.
pub const HEADER_REGION_SIZE: u64 = MIN_PAGE_SIZE;

/// 各領域の先頭に置かれる予約済みバイト列のサイズ.
const RESERVED_SIZE: u64 = 16;

/// ディレクトリ領域の開始位置.
pub const DIRECTORY_OFFSET: u64 = RESERVED_SIZE;

/// 統計情報領域(先頭の予約済み部分を含む)の開始位置.
pub const STATISTICS_REGION_OFFSET: u64 = 256;

/// 統計情報の開始位置.
pub const STATISTICS_OFFSET: u64 = STATISTICS_REGION_OFFSET + RESERVED_SIZE;

const TABLE_SIZE: usize = 8 * RANKS;

/// フリーリストのディレクトリ.
///
/// ランク毎に、フリーリストの先頭ページの位置を保持する.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeListDirectory {
    heads: [u64; RANKS],
}
impl FreeListDirectory {
    /// 全てのリストが空のディレクトリを生成する.
    pub fn new() -> Self {
        FreeListDirectory { heads: [0; RANKS] }
    }

    /// 指定ランクのフリーリストの先頭位置を返す.
    ///
    /// 値が最初のページ位置未満の場合は、リストが空であるとみなされ`None`が返される.
    pub fn head(&self, rank: Rank) -> Option<u64> {
        let head = self.heads[rank.as_index()];
        if head < HEADER_REGION_SIZE {
            None
        } else {
            Some(head)
        }
    }

    /// 指定ランクのスロットの値を、そのまま返す.
    pub fn raw_head(&self, rank: Rank) -> u64 {
        self.heads[rank.as_index()]
    }

    /// 指定ランクのフリーリストの先頭位置を更新する.
    pub fn set_head(&mut self, rank: Rank, head: u64) {
        self.heads[rank.as_index()] = head;
    }

    /// ディレクトリを`writer`に書き込む.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        for &head in self.heads.iter() {
            track_io!(writer.write_u64::<BigEndian>(head))?;
        }
        Ok(())
    }

    /// ディレクトリを`reader`から読み込む.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut heads = [0; RANKS];
        for head in heads.iter_mut() {
            *head = track_io!(reader.read_u64::<BigEndian>())?;
        }
        Ok(FreeListDirectory { heads })
    }

    /// `nvm`からディレクトリを読み込む.
    pub fn load<N: NonVolatileMemory>(nvm: &mut N) -> Result<Self> {
        let mut buf = BufferPool::global().get(TABLE_SIZE);
        track!(nvm.read_at(&mut buf, DIRECTORY_OFFSET))?;
        track!(Self::read_from(&buf[..]))
    }

    /// ディレクトリ全体を`nvm`に書き込んで、同期する.
    pub fn store<N: NonVolatileMemory>(&self, nvm: &mut N) -> Result<()> {
        let mut buf = BufferPool::global().get(TABLE_SIZE);
        track!(self.write_to(&mut buf[..]))?;
        track!(nvm.write_at(&buf, DIRECTORY_OFFSET))?;
        track!(nvm.sync())?;
        Ok(())
    }

    /// 指定ランクのスロットのみを`nvm`に書き込んで、同期する.
    pub fn store_slot<N: NonVolatileMemory>(&self, nvm: &mut N, rank: Rank) -> Result<()> {
        track!(store_u64(nvm, slot_offset(DIRECTORY_OFFSET, rank), self.raw_head(rank)))
    }
}
impl Default for FreeListDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// ランク毎の空きページ数.
///
/// 参考情報であり、割当の正しさには影響しない.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreePageCounts {
    counts: [u64; RANKS],
}
impl FreePageCounts {
    /// 全ての値がゼロの統計情報を生成する.
    pub fn new() -> Self {
        FreePageCounts { counts: [0; RANKS] }
    }

    /// 指定ランクの空きページ数を返す.
    pub fn get(&self, rank: Rank) -> u64 {
        self.counts[rank.as_index()]
    }

    /// 全ランクの空きページ数を返す.
    pub fn as_array(&self) -> [u64; RANKS] {
        self.counts
    }

    /// 指定ランクの空きページ数を一つ増やす.
    pub fn increment(&mut self, rank: Rank) {
        let count = &mut self.counts[rank.as_index()];
        *count = count.saturating_add(1);
    }

    /// 指定ランクの空きページ数を一つ減らす.
    pub fn decrement(&mut self, rank: Rank) {
        let count = &mut self.counts[rank.as_index()];
        *count = count.saturating_sub(1);
    }

    /// 統計情報を`writer`に書き込む.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        for &count in self.counts.iter() {
            track_io!(writer.write_u64::<BigEndian>(count))?;
        }
        Ok(())
    }

    /// 統計情報を`reader`から読み込む.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut counts = [0; RANKS];
        for count in counts.iter_mut() {
            *count = track_io!(reader.read_u64::<BigEndian>())?;
        }
        Ok(FreePageCounts { counts })
    }

    /// `nvm`から統計情報を読み込む.
    pub fn load<N: NonVolatileMemory>(nvm: &mut N) -> Result<Self> {
        let mut buf = BufferPool::global().get(TABLE_SIZE);
        track!(nvm.read_at(&mut buf, STATISTICS_OFFSET))?;
        track!(Self::read_from(&buf[..]))
    }

    /// 統計情報領域全体(先頭の予約済み部分を含む)を`nvm`に書き込んで、同期する.
    pub fn store<N: NonVolatileMemory>(&self, nvm: &mut N) -> Result<()> {
        let reserved = RESERVED_SIZE as usize;
        let mut buf = BufferPool::global().get(reserved + TABLE_SIZE);
        track!(self.write_to(&mut buf[reserved..]))?;
        track!(nvm.write_at(&buf, STATISTICS_REGION_OFFSET))?;
        track!(nvm.sync())?;
        Ok(())
    }

    /// 指定ランクの値のみを`nvm`に書き込んで、同期する.
    pub fn store_count<N: NonVolatileMemory>(&self, nvm: &mut N, rank: Rank) -> Result<()> {
        track!(store_u64(nvm, slot_offset(STATISTICS_OFFSET, rank), self.get(rank)))
    }
}
impl Default for FreePageCounts {
    fn default() -> Self {
        Self::new()
    }
}

fn slot_offset(table_offset: u64, rank: Rank) -> u64 {
    table_offset + 8 * rank.as_index() as u64
}

fn store_u64<N: NonVolatileMemory>(nvm: &mut N, offset: u64, value: u64) -> Result<()> {
    let mut buf = [0; 8];
    BigEndian::write_u64(&mut buf, value);
    track!(nvm.write_at(&buf, offset))?;
    track!(nvm.sync())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::nvm::MemoryNvm;

    fn rank(r: u8) -> Rank {
        Rank::new(r).unwrap()
    }

    #[test]
    fn layout_fills_header_region() {
        assert_eq!(DIRECTORY_OFFSET + TABLE_SIZE as u64, STATISTICS_REGION_OFFSET);
        assert_eq!(STATISTICS_OFFSET + TABLE_SIZE as u64, HEADER_REGION_SIZE);
    }

    #[test]
    fn directory_works() -> TestResult {
        let mut dir = FreeListDirectory::new();
        assert_eq!(dir.head(rank(3)), None);

        dir.set_head(rank(3), 1536);
        dir.set_head(rank(29), 100); // 最初のページ位置未満は空扱い
        assert_eq!(dir.head(rank(3)), Some(1536));
        assert_eq!(dir.head(rank(29)), None);
        assert_eq!(dir.raw_head(rank(29)), 100);

        let mut nvm = MemoryNvm::default();
        track!(dir.store(&mut nvm))?;
        assert_eq!(nvm.as_bytes().len() as u64, STATISTICS_REGION_OFFSET);
        assert_eq!(&nvm.as_bytes()[..16], &[0; 16][..]);
        assert_eq!(&nvm.as_bytes()[16 + 24..16 + 32], &[0, 0, 0, 0, 0, 0, 6, 0][..]);
        assert_eq!(track!(FreeListDirectory::load(&mut nvm))?, dir);

        // スロット単位の更新
        dir.set_head(rank(0), 512);
        track!(dir.store_slot(&mut nvm, rank(0)))?;
        assert_eq!(track!(FreeListDirectory::load(&mut nvm))?, dir);
        Ok(())
    }

    #[test]
    fn statistics_works() -> TestResult {
        let mut stats = FreePageCounts::new();
        stats.increment(rank(2));
        stats.increment(rank(2));
        stats.decrement(rank(2));
        stats.decrement(rank(5)); // ゼロ未満にはならない
        assert_eq!(stats.get(rank(2)), 1);
        assert_eq!(stats.get(rank(5)), 0);

        let mut nvm = MemoryNvm::default();
        track!(stats.store(&mut nvm))?;
        assert_eq!(nvm.as_bytes().len() as u64, HEADER_REGION_SIZE);
        assert_eq!(
            &nvm.as_bytes()[STATISTICS_REGION_OFFSET as usize..STATISTICS_OFFSET as usize],
            &[0; 16][..]
        );
        assert_eq!(track!(FreePageCounts::load(&mut nvm))?, stats);

        stats.increment(rank(29));
        track!(stats.store_count(&mut nvm, rank(29)))?;
        let loaded = track!(FreePageCounts::load(&mut nvm))?;
        assert_eq!(loaded.as_array()[29], 1);
        assert_eq!(loaded, stats);
        Ok(())
    }
}
