//! ページのサイズクラス(ランク).
//!
//! ランク`r`のページサイズは、偶数ランクでは`512 * 2^(r/2)`、
//! 奇数ランクでは`1.5 * 512 * 2^(r/2)`となる.
//! つまり隣接するランク同士は、交互に`x1.5`と`x4/3`倍の関係にある.
//!
//! ```text
//! rank: 0    1    2     3     4     5     6     ...
//! size: 512  768  1024  1536  2048  3072  4096  ...
//! ```

/// ランクの数.
pub const RANKS: usize = 30;

/// 最小のページサイズ(バイト単位).
///
/// 全てのページの開始位置は、このサイズの倍数となる.
pub const MIN_PAGE_SIZE: u64 = 512;

const MIN_ODD_PAGE_SIZE: u64 = MIN_PAGE_SIZE + MIN_PAGE_SIZE / 2;

/// ページのサイズクラス.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(u8);
impl Rank {
    /// 最小のランク.
    pub const MIN: Rank = Rank(0);

    /// 最大のランク.
    pub const MAX: Rank = Rank(RANKS as u8 - 1);

    /// 指定された値を持つ`Rank`インスタンスを生成する.
    ///
    /// `rank`が`RANKS`以上の場合には`None`が返される.
    pub fn new(rank: u8) -> Option<Self> {
        if (rank as usize) < RANKS {
            Some(Rank(rank))
        } else {
            None
        }
    }

    /// `size`バイトを格納可能な最小のランクを返す.
    ///
    /// `size`が最大ランクのサイズを超えている場合には`None`が返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use filealloc::rank::Rank;
    ///
    /// assert_eq!(Rank::for_size(1).map(|r| r.as_u8()), Some(0));
    /// assert_eq!(Rank::for_size(513).map(|r| r.as_u8()), Some(1));
    /// assert_eq!(Rank::for_size(1024).map(|r| r.as_u8()), Some(2));
    /// assert_eq!(Rank::for_size(u64::max_value()), None);
    /// ```
    pub fn for_size(size: u64) -> Option<Self> {
        Self::iter().find(|r| size <= r.size())
    }

    /// このランクのページサイズ(ヘッダ込み)を返す.
    pub fn size(self) -> u64 {
        let shift = u32::from(self.0 >> 1);
        if self.is_odd() {
            MIN_ODD_PAGE_SIZE << shift
        } else {
            MIN_PAGE_SIZE << shift
        }
    }

    /// 割当に利用可能なランクに変換する.
    ///
    /// ランク`1`はそれ以上分割できないため使用されず、ランク`2`で代替される.
    pub fn allocatable(self) -> Self {
        if self.0 == 1 {
            Rank(2)
        } else {
            self
        }
    }

    /// 奇数ランクかどうかを判定する.
    pub fn is_odd(self) -> bool {
        self.0 & 1 == 1
    }

    /// ランク値を`u8`に変換して返す.
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// ランク値を`usize`に変換して返す.
    pub fn as_index(self) -> usize {
        self.0 as usize
    }

    /// `n`だけ小さいランクを返す.
    pub(crate) fn checked_sub(self, n: u8) -> Option<Self> {
        self.0.checked_sub(n).map(Rank)
    }

    /// 全てのランクを昇順に返すイテレータ.
    pub fn iter() -> impl Iterator<Item = Rank> {
        (0..RANKS as u8).map(Rank)
    }

    /// このランク以降の全てのランクを昇順に返すイテレータ.
    pub(crate) fn iter_from(self) -> impl Iterator<Item = Rank> {
        (self.0..RANKS as u8).map(Rank)
    }
}
