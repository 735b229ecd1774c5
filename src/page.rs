//! ページヘッダ.
//!
//! 全てのページ(空き・割当済みを問わず)の先頭には、以下の16バイトのヘッダが置かれる.
//! 整数は全てビッグエンディアン.
//!
//! ```text
//! offset  size  field
//! ------  ----  -----------------------------------------------
//!      0     8  next       同じランクのフリーリスト中の次のページの位置 (無い場合は`0`)
//!      8     1  rank       ページの物理的なサイズクラス
//!      9     1  used_rank  利用者に引き渡されたサイズクラス (`used_rank <= rank`)
//!     10     1  status     0 = 割当済み(リスト外), 1 = 空き(リスト内)
//!     11     1  (padding)
//!     12     4  (padding)
//! ```
//!
//! パディングには常にゼロが書き込まれ、読み込み時には無視される.
use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Write};

use crate::rank::{Rank, RANKS};
use crate::{ErrorKind, Result};

/// ページヘッダのサイズ(バイト単位).
pub const PAGE_HEADER_SIZE: u64 = 16;

/// ページの状態.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// 割当済み(フリーリストに繋がっていない).
    Allocated = 0,

    /// 空き(フリーリストに繋がっている).
    Free = 1,
}

/// ページヘッダ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    /// 同じランクのフリーリスト中の次のページの位置.
    ///
    /// 次のページが存在しない場合は`0`.
    pub next: u64,

    /// ページの物理的なサイズクラス.
    pub rank: Rank,

    /// 利用者に引き渡されたサイズクラス.
    ///
    /// 分割途中のページでは`rank`よりも小さくなる.
    pub used_rank: Rank,

    /// ページの状態.
    pub status: PageStatus,
}
impl PageHeader {
    /// 割当済み状態のヘッダを生成する.
    pub fn allocated(rank: Rank, used_rank: Rank) -> Self {
        PageHeader {
            next: 0,
            rank,
            used_rank,
            status: PageStatus::Allocated,
        }
    }

    /// `next`の前に繋がれる、空き状態のヘッダを生成する.
    pub fn free(rank: Rank, next: u64) -> Self {
        PageHeader {
            next,
            rank,
            used_rank: rank,
            status: PageStatus::Free,
        }
    }

    /// ページが空き状態かどうかを判定する.
    pub fn is_free(&self) -> bool {
        self.status == PageStatus::Free
    }

    /// ヘッダを`writer`に書き込む.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut buf = [0; PAGE_HEADER_SIZE as usize];
        BigEndian::write_u64(&mut buf[0..8], self.next);
        buf[8] = self.rank.as_u8();
        buf[9] = self.used_rank.as_u8();
        buf[10] = self.status as u8;
        track_io!(writer.write_all(&buf))?;
        Ok(())
    }

    /// ヘッダを`reader`から読み込む.
    ///
    /// # Errors
    ///
    /// ランクや状態が範囲外の値の場合は`ErrorKind::InconsistentState`が返される.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0; PAGE_HEADER_SIZE as usize];
        track_io!(reader.read_exact(&mut buf))?;

        let next = BigEndian::read_u64(&buf[0..8]);
        let rank = track_assert_some!(
            Rank::new(buf[8]),
            ErrorKind::InconsistentState,
            "Too large rank: {}",
            buf[8]
        );
        let used_rank = track_assert_some!(
            Rank::new(buf[9]),
            ErrorKind::InconsistentState,
            "Too large used rank: {}",
            buf[9]
        );
        track_assert!(
            used_rank <= rank,
            ErrorKind::InconsistentState,
            "used_rank={:?}, rank={:?}",
            used_rank,
            rank
        );
        let status = match buf[10] {
            0 => PageStatus::Allocated,
            1 => PageStatus::Free,
            s => track_panic!(ErrorKind::InconsistentState, "Unknown page status: {}", s),
        };
        Ok(PageHeader {
            next,
            rank,
            used_rank,
            status,
        })
    }

    /// `bytes`が、構造的に妥当なヘッダかどうかを判定する.
    ///
    /// ランクが範囲内で`used_rank <= rank`を満たし、状態が既知の値であることのみを確認する.
    /// 任意の位置を指すオフセットを、ヘッダを読み込む前に弾くために用いられる.
    pub fn is_well_formed(bytes: &[u8]) -> bool {
        bytes.len() >= PAGE_HEADER_SIZE as usize
            && (bytes[8] as usize) < RANKS
            && bytes[9] <= bytes[8]
            && bytes[10] <= PageStatus::Free as u8
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    fn rank(r: u8) -> Rank {
        Rank::new(r).unwrap()
    }

    #[test]
    fn it_works() -> TestResult {
        let header = PageHeader {
            next: 0x1234_5600,
            rank: rank(6),
            used_rank: rank(3),
            status: PageStatus::Allocated,
        };

        let mut buf = Vec::new();
        track!(header.write_to(&mut buf))?;
        assert_eq!(
            buf,
            [0, 0, 0, 0, 0x12, 0x34, 0x56, 0, 6, 3, 0, 0, 0, 0, 0, 0]
        );
        assert!(PageHeader::is_well_formed(&buf));

        let h = track!(PageHeader::read_from(&buf[..]))?;
        assert_eq!(h, header);
        Ok(())
    }

    #[test]
    fn free_header_has_full_used_rank() -> TestResult {
        let header = PageHeader::free(rank(4), 1024);
        assert!(header.is_free());
        assert_eq!(header.used_rank, header.rank);

        let mut buf = Vec::new();
        track!(header.write_to(&mut buf))?;
        assert_eq!(buf[10], 1);
        assert_eq!(track!(PageHeader::read_from(&buf[..]))?, header);
        Ok(())
    }

    #[test]
    fn padding_is_ignored() -> TestResult {
        let mut buf = Vec::new();
        track!(PageHeader::free(rank(2), 512).write_to(&mut buf))?;
        for b in &mut buf[11..] {
            *b = 0xFF;
        }
        assert!(PageHeader::is_well_formed(&buf));
        assert_eq!(
            track!(PageHeader::read_from(&buf[..]))?,
            PageHeader::free(rank(2), 512)
        );
        Ok(())
    }

    #[test]
    fn corrupted_fields_are_rejected() -> TestResult {
        let mut buf = Vec::new();
        track!(PageHeader::allocated(rank(2), rank(2)).write_to(&mut buf))?;

        // 範囲外のランク
        let mut broken = buf.clone();
        broken[8] = 30;
        assert!(!PageHeader::is_well_formed(&broken));
        let e = PageHeader::read_from(&broken[..]).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InconsistentState));

        // used_rank > rank
        let mut broken = buf.clone();
        broken[9] = 3;
        assert!(!PageHeader::is_well_formed(&broken));
        let e = PageHeader::read_from(&broken[..]).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InconsistentState));

        // 未知の状態
        let mut broken = buf.clone();
        broken[10] = 2;
        assert!(!PageHeader::is_well_formed(&broken));
        let e = PageHeader::read_from(&broken[..]).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InconsistentState));

        assert!(!PageHeader::is_well_formed(&buf[..15]));
        Ok(())
    }
}
